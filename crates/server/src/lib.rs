pub mod app;
pub mod browser;
pub mod error;
pub mod registry;

pub use app::{router, AppState};
pub use error::ApiError;
