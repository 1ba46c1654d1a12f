//! Record types served by the API.

pub mod teacher;

pub use teacher::Teacher;
