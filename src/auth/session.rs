use rand::{distributions::Alphanumeric, thread_rng, Rng};

/// Length of generated API tokens.
pub const API_TOKEN_LENGTH: usize = 64;

/// Generate a cryptographically secure random API token.
pub fn generate_api_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(API_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_api_token() {
        let token1 = generate_api_token();
        let token2 = generate_api_token();

        assert_eq!(token1.len(), API_TOKEN_LENGTH);
        assert_ne!(token1, token2);
        assert!(token1.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
