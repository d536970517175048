pub mod chain;
pub mod filters;
pub mod indexer;
pub mod storage;
pub mod sync;
pub mod transformations;
