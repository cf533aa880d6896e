//! SmartAcca: AI-verified daily football accumulator.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod bet;
pub mod config;
pub mod data;
pub mod engine;
pub mod llm;
pub mod storage;
pub mod types;
