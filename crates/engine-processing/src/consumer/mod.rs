pub mod batcher;
pub mod router;
pub mod uploader;
pub mod writer;
