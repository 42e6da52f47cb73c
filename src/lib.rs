//! Judging core for algorithm submissions: compiles a submission once, runs
//! it against ordered JSON test cases in a private workspace and folds the
//! per-test outcomes into one verdict.

pub mod config;
pub mod core;
pub mod native;

#[cfg(test)]
mod stubs;
