//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod activity_log_repo;
pub mod call_line_repo;
pub mod campaign_repo;
pub mod incoming_call_repo;

pub use activity_log_repo::ActivityLogRepo;
pub use call_line_repo::CallLineRepo;
pub use campaign_repo::CampaignRepo;
pub use incoming_call_repo::IncomingCallRepo;
