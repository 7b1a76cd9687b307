// src/models/mod.rs
pub mod event;
pub mod session;

pub use event::{fields, request_types, Event};
pub use session::{CallDescriptor, EventCost, ExternalSession, Session, SessionRun};
