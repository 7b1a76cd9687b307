// src/storage/mod.rs
pub mod backup_store;

pub use backup_store::RedisBackupStore;
