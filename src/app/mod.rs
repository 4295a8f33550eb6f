//! Command-line application

pub mod cli;
pub mod commands;
pub mod error;
pub mod startup;

pub use error::{AppError, AppResult};
