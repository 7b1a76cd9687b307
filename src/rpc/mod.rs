// src/rpc/mod.rs
pub mod cdrs;
pub mod client;
pub mod peer;
pub mod rater;
pub mod signaling;
