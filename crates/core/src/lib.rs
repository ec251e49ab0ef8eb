//! Domain logic for the call and campaign synchronization engine.
//!
//! Everything in this crate is pure: no I/O, no persistence, no HTTP.
//! The engine crate (`callsync-sync`) wires these pieces to the upstream
//! gateways and the persistence store.

pub mod call_log;
pub mod campaign;
pub mod error;
pub mod fields;
pub mod incoming;
pub mod phone;
pub mod recording;
pub mod status;
pub mod types;
