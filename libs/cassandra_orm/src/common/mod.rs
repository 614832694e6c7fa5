//! Error taxonomy and retry policy shared by every layer of the crate

pub mod error;
pub mod retry;

pub use error::{OrmError, OrmResult, StoreError, StoreErrorKind, TypeError};
pub use retry::RetryConfig;
