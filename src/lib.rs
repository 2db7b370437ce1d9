//! Tabguard diagnostics CLI
//!
//! Exposes the command layer for integration testing.

pub mod cli;
