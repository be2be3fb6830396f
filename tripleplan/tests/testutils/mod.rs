//! Test utilities for TriplePlan integration tests
//!
//! - TestFixture: an in-memory store plus a compiler configuration; compiles
//!   documents with the memory collaborators and runs the plans
//! - sample_data_generator: random edge graphs for path comparisons

#![allow(dead_code)]

pub mod sample_data_generator;
pub mod test_fixture;
