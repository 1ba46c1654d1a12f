//! Common types, protocol definitions, and errors shared across `school-api` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
