pub mod middleware;
pub mod session;

pub use middleware::{MaybeViewer, Viewer};
pub use session::generate_api_token;
