pub mod indexing;
pub mod media_probe;
pub mod staging;
pub mod worker;
