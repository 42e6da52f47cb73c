pub mod coordinator;
pub mod domain;
pub mod error;
pub mod evaluator;
pub mod pipeline;
pub mod pool;
pub mod traits;
pub mod verdict;
pub mod workspace;
