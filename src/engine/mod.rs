//! Core engine: analyse fixtures, pick the accumulator, resolve results.

pub mod accumulator;
pub mod analyst;
pub mod enricher;
pub mod jobs;
pub mod matcher;
pub mod resolver;
pub mod scheduler;
