pub mod error;
pub mod monte_carlo;
pub mod structure;
pub mod types;

pub use error::UscanError;
pub use types::*;

/// Standard result type for all uscan operations
pub type UscanResult<T> = Result<T, UscanError>;
