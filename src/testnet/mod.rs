//! Test doubles for the orchestrators
//!
//! Scripted wallet, ledger node, content store and backend, so workflow tests
//! can drive every failure branch without sled or real signatures.

pub mod test_utils;

pub use test_utils::*;
