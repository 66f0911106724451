pub mod indexing;
pub mod storage;
