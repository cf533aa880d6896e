//! Integration suite: the job pipeline end to end against in-memory
//! sources, a scripted AI backend and an in-memory SQLite store.

mod mock_sources;
mod pipeline;
