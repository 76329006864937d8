//! Core library for the agent engine
//!
//! This crate contains the pieces shared by every part of the engine:
//! - The common error type
//! - Chat history model and persistence

pub mod error;
pub mod history;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
