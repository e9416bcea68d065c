pub mod digest;
pub mod metadata_store;
pub mod object_store;
pub mod shard;
pub mod storage_service;
