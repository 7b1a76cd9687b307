// src/lib.rs
pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod rpc;
pub mod services;
pub mod storage;
pub mod traits;
