//! Background worker that keeps the campaign cache fresh.
//!
//! Configuration comes from the environment ([`config::WorkerConfig`]);
//! periodic loops live in [`background`].

pub mod background;
pub mod config;
