//! Command-line interface
//!
//! A demonstration driver over the local adapters.

pub mod commands;

pub use commands::{Command, Opt};
