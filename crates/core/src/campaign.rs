//! Canonical view of an upstream campaign snapshot.
//!
//! [`CampaignSnapshot::from_value`] maps the ~20 heterogeneously-named
//! fields of a campaign list/detail payload onto canonical attributes.
//! Every attribute except the external id is optional: absent means
//! "upstream did not say", and the reconciler leaves the cached value alone.

use serde::Serialize;
use serde_json::Value;

use crate::fields::FieldChain;
use crate::phone::PhoneNormalizer;
use crate::status::CampaignStatus;
use crate::types::Timestamp;

/// External id synonyms, highest priority first.
///
/// Upstream does not document which of these wins when several are present;
/// this order is a fixed guess, not a contract.
pub const EXTERNAL_ID: FieldChain = FieldChain::new(
    "external_id",
    &[
        "id",
        "bulk_call_id",
        "bulkCallId",
        "campaign_id",
        "campaignId",
        "batch_id",
        "batchId",
    ],
);
pub const NAME: FieldChain =
    FieldChain::new("name", &["name", "campaign_name", "bulk_call_name", "title"]);
pub const STATUS: FieldChain =
    FieldChain::new("status", &["status", "campaign_status", "bulk_call_status", "state"]);
pub const ORIGIN_NUMBER: FieldChain = FieldChain::new(
    "origin_number",
    &["from_number", "fromNumber", "caller_id", "agent_phone_number", "phone_number_from"],
);
pub const AGENT_NAME: FieldChain =
    FieldChain::new("agent_name", &["agent_name", "bot_name", "assistant_name", "agent.name"]);
pub const TOTAL_CALLS: FieldChain = FieldChain::new(
    "total_calls",
    &["total_calls_to_dispatch", "total_calls", "total_count"],
);
pub const CALLS_MADE: FieldChain = FieldChain::new(
    "calls_made",
    &["total_calls_made", "calls_made", "dispatched_calls", "calls_dispatched"],
);
pub const PICKED_UP: FieldChain = FieldChain::new(
    "picked_up_calls",
    &["picked_up_calls", "total_picked_up", "answered_calls", "pickedUp"],
);
pub const COMPLETED_CALLS: FieldChain = FieldChain::new(
    "completed_calls",
    &["completed_calls", "total_completed", "successful_calls"],
);
pub const FAILED_CALLS: FieldChain =
    FieldChain::new("failed_calls", &["failed_calls", "total_failed", "failed_count"]);
pub const BUSY_CALLS: FieldChain =
    FieldChain::new("busy_calls", &["busy_calls", "total_busy", "busy_count"]);
pub const NO_ANSWER_CALLS: FieldChain = FieldChain::new(
    "no_answer_calls",
    &["no_answer_calls", "not_answered_calls", "total_no_answer", "no_answer_count"],
);
pub const TRANSFER_CALLS: FieldChain = FieldChain::new(
    "transfer_calls",
    &["transfer_calls", "transferred_calls", "total_transfers"],
);
pub const LOW_INTERACTION_CALLS: FieldChain = FieldChain::new(
    "low_interaction_calls",
    &["low_interaction_calls", "low_interaction", "total_low_interaction"],
);
pub const COST: FieldChain =
    FieldChain::new("cost", &["total_cost", "cost", "amount_spent", "total_amount"]);
pub const SCHEDULED_AT: FieldChain = FieldChain::new(
    "scheduled_at",
    &["scheduled_at", "scheduled_time", "start_time", "schedule_time"],
);
pub const UPSTREAM_CREATED_AT: FieldChain =
    FieldChain::new("created_at", &["created_at", "createdAt", "created_on"]);
pub const CONTACT_LIST: FieldChain =
    FieldChain::new("contact_list", &["contact_list", "contacts", "contactList"]);
pub const PHONE_NUMBERS: FieldChain =
    FieldChain::new("phone_numbers", &["phone_numbers", "numbers", "phoneNumbers"]);
/// Number of one entry in a contact list.
pub const CONTACT_NUMBER: FieldChain = FieldChain::new(
    "contact_number",
    &[
        "phone_number",
        "contact_number",
        "to_number",
        "recipient_phone_number",
        "number",
        "mobile",
        "to",
    ],
);

/// Aggregate counters. `None` means the snapshot did not carry the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CampaignCounters {
    pub total: Option<i64>,
    pub made: Option<i64>,
    pub picked_up: Option<i64>,
    pub completed: Option<i64>,
    pub failed: Option<i64>,
    pub busy: Option<i64>,
    pub no_answer: Option<i64>,
    pub transfer: Option<i64>,
    pub low_interaction: Option<i64>,
}

/// Canonical attributes extracted from one upstream campaign payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignSnapshot {
    pub external_id: String,
    pub name: Option<String>,
    /// `None` when the payload carried no status at all.
    pub status: Option<CampaignStatus>,
    pub origin_number: Option<String>,
    pub agent_name: Option<String>,
    /// Canonical contact numbers, deduplicated, in first-seen order.
    /// `None` when the payload carried neither a contact list nor a number array.
    pub contact_numbers: Option<Vec<String>>,
    pub counters: CampaignCounters,
    pub cost: Option<f64>,
    pub scheduled_at: Option<Timestamp>,
    pub upstream_created_at: Option<Timestamp>,
}

impl CampaignSnapshot {
    /// Map a raw payload. Returns `None` when no external id resolves;
    /// such records cannot be reconciled and are skipped by the caller.
    pub fn from_value(record: &Value, phones: &PhoneNormalizer) -> Option<Self> {
        let external_id = EXTERNAL_ID.text(record)?;

        Some(Self {
            external_id,
            name: NAME.text(record),
            status: STATUS.text(record).map(|s| CampaignStatus::unify(&s)),
            origin_number: ORIGIN_NUMBER
                .text(record)
                .map(|n| phones.normalize(&n))
                .filter(|n| !n.is_empty()),
            agent_name: AGENT_NAME.text(record),
            contact_numbers: contact_numbers(record, phones),
            counters: CampaignCounters {
                total: TOTAL_CALLS.count(record),
                made: CALLS_MADE.count(record),
                picked_up: PICKED_UP.count(record),
                completed: COMPLETED_CALLS.count(record),
                failed: FAILED_CALLS.count(record),
                busy: BUSY_CALLS.count(record),
                no_answer: NO_ANSWER_CALLS.count(record),
                transfer: TRANSFER_CALLS.count(record),
                low_interaction: LOW_INTERACTION_CALLS.count(record),
            },
            cost: COST.float(record).filter(|c| *c >= 0.0),
            scheduled_at: SCHEDULED_AT.timestamp(record),
            upstream_created_at: UPSTREAM_CREATED_AT.timestamp(record),
        })
    }

    /// Status to persist, defaulting to pending when upstream sent none.
    pub fn effective_status(&self) -> CampaignStatus {
        self.status.unwrap_or(CampaignStatus::Pending)
    }
}

/// Canonical contact numbers from a contact list (objects or bare strings)
/// or a phone-number array.
pub fn contact_numbers(record: &Value, phones: &PhoneNormalizer) -> Option<Vec<String>> {
    let entries = CONTACT_LIST
        .array(record)
        .or_else(|| PHONE_NUMBERS.array(record))?;

    let mut numbers: Vec<String> = Vec::with_capacity(entries.len());
    for entry in entries {
        let raw = match entry {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Object(_) => CONTACT_NUMBER.text(entry),
            _ => None,
        };
        let Some(canonical) = raw.map(|r| phones.normalize(&r)) else {
            continue;
        };
        if !canonical.is_empty() && !numbers.contains(&canonical) {
            numbers.push(canonical);
        }
    }
    Some(numbers)
}

/// Union `additional` into `base`, preserving order. Returns `true` if
/// `base` grew.
pub fn merge_numbers(base: &mut Vec<String>, additional: &[String]) -> bool {
    let before = base.len();
    for number in additional {
        if !number.is_empty() && !base.contains(number) {
            base.push(number.clone());
        }
    }
    base.len() != before
}
