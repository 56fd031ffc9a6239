//! Core orchestration for protosync.
//!
//! Ties module collection, index mapping synchronization, and schema
//! compilation into the end-to-end `generate` workflow.

pub mod compiler;
pub mod pipeline;
pub mod snapshot;
pub mod sync;

#[cfg(test)]
mod testing;
