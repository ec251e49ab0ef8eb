//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A create DTO for inserts
//! - An update DTO (all `Option` fields) for field-merging patches

pub mod activity_log;
pub mod call_line;
pub mod campaign;
pub mod incoming_call;
