// src/services/mod.rs
pub mod backup;
pub mod debit;
pub mod engine;
pub mod guardian;
pub mod index;
pub mod registry;
pub mod replicator;
pub mod terminator;

pub use engine::SessionEngine;
