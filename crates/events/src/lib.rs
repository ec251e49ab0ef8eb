//! Change notifications for synchronized records.
//!
//! - [`DomainEvent`]: the envelope published whenever the engine creates or
//!   updates a campaign, call line or inbound call.
//! - [`EventSink`]: the publish capability the engine is handed.
//! - [`EventBus`]: in-process fan-out sink backed by `tokio::sync::broadcast`.
//!
//! Delivery is best-effort. Nothing in the engine depends on an event
//! having been received.

pub mod bus;

pub use bus::{names, DomainEvent, EventBus, EventSink};
