//! Shared test infrastructure

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod test_repo;

pub use assertions::*;
pub use test_repo::TestRepo;
