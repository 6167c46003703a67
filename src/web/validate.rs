//! Request validation shared by the API handlers.

use serde::{Deserialize, Deserializer};

use super::ApiError;
use crate::db::Page;

pub const MAX_NAME_LENGTH: usize = 32;
pub const MAX_DESCRIPTION_LENGTH: usize = 1024;
pub const MAX_POSITION: i64 = 99_999;
pub const MAX_TOPIC_LENGTH: usize = 150;
pub const MAX_POST_LENGTH: usize = 256_000;
pub const MAX_NOTE_LENGTH: usize = 10_000;

/// Largest combined length of two merged posts, leaving room for the separator.
pub const MAX_MERGED_LENGTH: usize = MAX_POST_LENGTH - 3;

/// Page sizes accepted by paginated listings.
pub const PAGE_LIMITS: [i64; 3] = [25, 50, 100];

/// Reject strings longer than `max` characters.
pub fn max_length(field: &str, value: &str, max: usize) -> Result<(), ApiError> {
    if value.chars().count() > max {
        return Err(ApiError::bad_request(format!(
            "{field} must be at most {max} characters long."
        )));
    }
    Ok(())
}

/// Reject empty (or whitespace-only) required strings.
pub fn non_empty(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{field} cannot be empty.")));
    }
    Ok(())
}

pub fn position(value: i64) -> Result<i64, ApiError> {
    if !(0..=MAX_POSITION).contains(&value) {
        return Err(ApiError::bad_request(format!(
            "position must be between 0 and {MAX_POSITION}."
        )));
    }
    Ok(value)
}

/// Query parameters of paginated listings.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub include_dead: bool,
}

impl PageQuery {
    /// Build a [`Page`]. Deleted rows are included only when both requested
    /// and `may_include_dead`.
    pub fn to_page(&self, may_include_dead: bool) -> Result<Page, ApiError> {
        let page = self.page.unwrap_or(1);
        if page < 0 {
            return Err(ApiError::bad_request("page must be at least 1."));
        }

        let limit = self.limit.unwrap_or(50);
        if !PAGE_LIMITS.contains(&limit) {
            return Err(ApiError::bad_request("limit must be one of 25, 50, 100."));
        }

        Ok(Page {
            page: page.max(1),
            limit,
            include_dead: self.include_dead && may_include_dead,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct IncludeDeadQuery {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub include_dead: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolLike {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// Accept JSON booleans as well as query-string spellings such as `1`,
/// `true`, `yes`, `0`, `false` and `no`.
pub fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match BoolLike::deserialize(deserializer)? {
        BoolLike::Bool(b) => Ok(b),
        BoolLike::Int(i) => Ok(i != 0),
        BoolLike::Text(s) => parse_bool(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid boolean: {s}"))),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`).
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
