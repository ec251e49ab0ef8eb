//! Gateway adapters for the two upstream platforms.
//!
//! - [`campaign::CampaignGateway`]: the campaign / voice-AI management API
//!   (campaign list and detail, global call-log feed, campaign actions).
//! - [`carrier::CarrierGateway`]: the telephony carrier (call search,
//!   call detail, recording download).
//!
//! Each adapter call is one bounded-timeout request. Adapters never retry;
//! callers that want retries wrap a call in [`retry::retry_with_backoff`].

pub mod campaign;
pub mod carrier;
pub mod error;
pub mod retry;

pub use campaign::{CampaignApi, CampaignGateway, SubmitMethod};
pub use carrier::{CallSearch, CarrierApi, CarrierCall, CarrierGateway};
pub use error::GatewayError;
pub use retry::{retry_with_backoff, RetryPolicy};
