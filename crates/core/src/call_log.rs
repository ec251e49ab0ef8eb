//! Call-log feed entries and campaign attribution.
//!
//! The campaign platform's call-log feed is global: rows carry no reliable
//! campaign key, so a row is attributed to a campaign heuristically (see
//! [`CampaignTarget::attribute`]).

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use crate::fields::FieldChain;
use crate::phone::PhoneNormalizer;
use crate::status::{CallLineStatus, Interaction};
use crate::types::Timestamp;

pub const CALL_ID: FieldChain = FieldChain::new(
    "call_id",
    &["id", "call_id", "callId", "execution_id", "call_sid", "sid"],
);
pub const FROM_NUMBER: FieldChain = FieldChain::new(
    "from_number",
    &[
        "from_number",
        "from",
        "caller_number",
        "agent_number",
        "telephony_data.from_number",
    ],
);
pub const TO_NUMBER: FieldChain = FieldChain::new(
    "to_number",
    &[
        "to_number",
        "to",
        "user_number",
        "recipient_phone_number",
        "phone_number",
        "telephony_data.to_number",
    ],
);
pub const CALL_TIME: FieldChain = FieldChain::new(
    "call_time",
    &[
        "call_time",
        "start_time",
        "initiated_at",
        "created_at",
        "timestamp",
        "called_at",
    ],
);
pub const DURATION: FieldChain = FieldChain::new(
    "duration",
    &[
        "duration",
        "call_duration",
        "conversation_duration",
        "duration_seconds",
        "telephony_data.duration",
    ],
);
pub const CALL_STATUS: FieldChain =
    FieldChain::new("status", &["status", "call_status", "hangup_reason"]);
pub const INTERACTION: FieldChain =
    FieldChain::new("interaction", &["interaction", "interaction_type", "engagement"]);
pub const TRANSFERRED: FieldChain =
    FieldChain::new("transferred", &["transferred", "is_transferred", "call_transferred"]);
pub const TRANSCRIPT: FieldChain =
    FieldChain::new("transcript", &["transcript", "transcription", "conversation"]);
pub const AGENT_NAME: FieldChain =
    FieldChain::new("agent_name", &["agent_name", "bot_name", "assistant_name", "agent.name"]);
pub const CAMPAIGN_HINT: FieldChain = FieldChain::new(
    "campaign_hint",
    &["bulk_call_id", "campaign_id", "batch_id", "bulkCallId"],
);
pub const RECORDING_URL: FieldChain = FieldChain::new(
    "recording_url",
    &[
        "recording_url",
        "recording",
        "recordingUrl",
        "telephony_data.recording_url",
    ],
);
pub const LATENCY_MS: FieldChain =
    FieldChain::new("latency_ms", &["latency_ms", "avg_latency_ms", "latency"]);
pub const QUALITY: FieldChain =
    FieldChain::new("quality", &["quality", "call_quality", "quality_score"]);

/// One row of the global call-log feed, in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallLogEntry {
    pub external_call_id: String,
    /// Canonical origin number (empty when unknown).
    pub from_number: String,
    /// Canonical destination number (empty when unknown).
    pub to_number: String,
    pub call_time: Option<Timestamp>,
    pub duration_secs: Option<i32>,
    pub status: Option<CallLineStatus>,
    pub interaction: Option<Interaction>,
    pub transcript: Option<String>,
    pub agent_name: Option<String>,
    pub campaign_hint: Option<String>,
    pub recording_url: Option<String>,
    pub latency_ms: Option<i64>,
    pub quality: Option<f64>,
}

impl CallLogEntry {
    /// Parse a feed row. Returns `None` when the row has no call id.
    pub fn from_value(row: &Value, phones: &PhoneNormalizer) -> Option<Self> {
        let external_call_id = CALL_ID.text(row)?;
        let status = CALL_STATUS.text(row).map(|s| CallLineStatus::unify(&s));
        let duration_secs = duration_secs(row);
        let interaction = INTERACTION
            .text(row)
            .and_then(|s| Interaction::parse(&s))
            .or_else(|| {
                status.map(|st| {
                    Interaction::derive(
                        st,
                        duration_secs.unwrap_or(0),
                        TRANSFERRED.flag(row).unwrap_or(false),
                    )
                })
            });

        Some(Self {
            external_call_id,
            from_number: FROM_NUMBER
                .text(row)
                .map(|n| phones.normalize(&n))
                .unwrap_or_default(),
            to_number: TO_NUMBER
                .text(row)
                .map(|n| phones.normalize(&n))
                .unwrap_or_default(),
            call_time: CALL_TIME.timestamp(row),
            duration_secs,
            status,
            interaction,
            transcript: transcript(row),
            agent_name: AGENT_NAME.text(row),
            campaign_hint: CAMPAIGN_HINT.text(row),
            recording_url: RECORDING_URL.text(row).filter(|u| u.starts_with("http")),
            latency_ms: LATENCY_MS.int(row),
            quality: QUALITY.float(row),
        })
    }

    /// Latency/quality/linkage details kept as JSON metadata on the line.
    pub fn metadata(&self) -> Value {
        let mut meta = serde_json::Map::new();
        if let Some(latency) = self.latency_ms {
            meta.insert("latency_ms".into(), latency.into());
        }
        if let Some(quality) = self.quality {
            meta.insert("quality".into(), quality.into());
        }
        if let Some(agent) = &self.agent_name {
            meta.insert("agent_name".into(), agent.clone().into());
        }
        if let Some(hint) = &self.campaign_hint {
            meta.insert("campaign_hint".into(), hint.clone().into());
        }
        if !self.from_number.is_empty() {
            meta.insert("from_number".into(), self.from_number.clone().into());
        }
        Value::Object(meta)
    }
}

/// Call duration in whole seconds, rounding fractional values.
pub fn duration_secs(row: &Value) -> Option<i32> {
    DURATION
        .float(row)
        .filter(|d| *d >= 0.0 && *d <= i32::MAX as f64)
        .map(|d| d.round() as i32)
}

/// Transcript text. Structured transcripts (arrays of turns) are kept as JSON text.
pub fn transcript(row: &Value) -> Option<String> {
    match TRANSCRIPT.first(row)? {
        Value::String(s) => Some(s.trim().to_string()),
        other @ (Value::Array(_) | Value::Object(_)) => Some(other.to_string()),
        _ => None,
    }
}

/// Why a log entry was attributed to a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchReason {
    /// Destination is one of the campaign's contact numbers.
    ContactNumber,
    /// Contact set unknown; origin equals the campaign's dialing number.
    OriginNumber,
}

/// What a campaign looks like to the log matcher.
#[derive(Debug, Clone, Default)]
pub struct CampaignTarget {
    /// Canonical contact numbers.
    pub contacts: HashSet<String>,
    /// Canonical origin number, if configured.
    pub origin_number: Option<String>,
    pub agent_name: Option<String>,
}

impl CampaignTarget {
    /// Build a target from raw campaign attributes, canonicalizing numbers.
    pub fn new<'a>(
        contacts: impl IntoIterator<Item = &'a String>,
        origin_number: Option<&str>,
        agent_name: Option<&str>,
        phones: &PhoneNormalizer,
    ) -> Self {
        Self {
            contacts: contacts
                .into_iter()
                .map(|n| phones.normalize(n))
                .filter(|n| !n.is_empty())
                .collect(),
            origin_number: origin_number
                .map(|n| phones.normalize(n))
                .filter(|n| !n.is_empty()),
            agent_name: agent_name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        }
    }

    /// A target with neither contacts nor an origin number can never match.
    pub fn is_unmatchable(&self) -> bool {
        self.contacts.is_empty() && self.origin_number.is_none()
    }

    /// Attribute `entry` to this campaign. First rule that applies wins:
    ///
    /// 1. the destination is in the contact set (only when the set is non-empty);
    /// 2. otherwise the origin equals the campaign's origin number;
    ///
    /// and a differing bot/agent name on both sides vetoes either rule.
    pub fn attribute(&self, entry: &CallLogEntry) -> Option<MatchReason> {
        let matched = if !self.contacts.is_empty() {
            self.contacts
                .contains(&entry.to_number)
                .then_some(MatchReason::ContactNumber)
        } else {
            self.origin_number
                .as_deref()
                .filter(|origin| !entry.from_number.is_empty() && *origin == entry.from_number)
                .map(|_| MatchReason::OriginNumber)
        };
        let reason = matched?;

        if let (Some(ours), Some(theirs)) = (&self.agent_name, &entry.agent_name) {
            if !ours.eq_ignore_ascii_case(theirs.trim()) {
                return None;
            }
        }

        Some(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn phones() -> PhoneNormalizer {
        PhoneNormalizer::default()
    }

    fn entry(row: Value) -> CallLogEntry {
        CallLogEntry::from_value(&row, &phones()).unwrap()
    }

    fn target(contacts: &[&str], origin: Option<&str>, agent: Option<&str>) -> CampaignTarget {
        let contacts: Vec<String> = contacts.iter().map(|c| c.to_string()).collect();
        CampaignTarget::new(&contacts, origin, agent, &phones())
    }

    #[test]
    fn parses_feed_row() {
        let e = entry(json!({
            "id": "c-1",
            "from_number": "+918045678901",
            "to_number": "09876543210",
            "created_at": "2024-05-01T10:30:00Z",
            "duration": "42.6",
            "status": "completed",
            "transcript": [{"role": "agent", "text": "hi"}],
            "agent_name": "Asha",
            "latency_ms": 820
        }));
        assert_eq!(e.external_call_id, "c-1");
        assert_eq!(e.from_number, "8045678901");
        assert_eq!(e.to_number, "9876543210");
        assert_eq!(e.duration_secs, Some(43));
        assert_eq!(e.status, Some(CallLineStatus::Completed));
        assert_eq!(e.interaction, Some(Interaction::Completed));
        assert!(e.transcript.as_ref().unwrap().contains("\"hi\""));
        assert_eq!(e.metadata()["latency_ms"], 820);
    }

    #[test]
    fn row_without_id_is_rejected() {
        assert!(CallLogEntry::from_value(&json!({"to_number": "1"}), &phones()).is_none());
    }

    #[test]
    fn explicit_interaction_label_wins() {
        let e = entry(json!({"id": 1, "status": "completed", "duration": 3, "interaction": "transfer"}));
        assert_eq!(e.interaction, Some(Interaction::Transfer));
    }

    #[test]
    fn no_status_means_no_interaction_claim() {
        let e = entry(json!({"id": 1, "duration": 3}));
        assert_eq!(e.interaction, None);
    }

    #[test]
    fn contact_set_match() {
        let t = target(&["9876543210", "9123456789"], Some("8045678901"), None);
        let hit = entry(json!({"id": 1, "to": "+91 98765 43210"}));
        let miss = entry(json!({"id": 2, "to": "9000000000", "from": "8045678901"}));
        assert_eq!(t.attribute(&hit), Some(MatchReason::ContactNumber));
        // Origin fallback is not used while the contact set is known.
        assert_eq!(t.attribute(&miss), None);
    }

    #[test]
    fn origin_fallback_when_contacts_unknown() {
        let t = target(&[], Some("08045678901"), None);
        let hit = entry(json!({"id": 1, "to": "9000000000", "from": "+918045678901"}));
        let miss = entry(json!({"id": 2, "to": "9000000000", "from": "8000000000"}));
        let blank = entry(json!({"id": 3, "to": "9000000000"}));
        assert_eq!(t.attribute(&hit), Some(MatchReason::OriginNumber));
        assert_eq!(t.attribute(&miss), None);
        assert_eq!(t.attribute(&blank), None);
    }

    #[test]
    fn differing_agent_name_vetoes() {
        let t = target(&["9876543210"], None, Some("Asha"));
        let same = entry(json!({"id": 1, "to": "9876543210", "agent_name": "asha"}));
        let other = entry(json!({"id": 2, "to": "9876543210", "agent_name": "Ravi"}));
        let unnamed = entry(json!({"id": 3, "to": "9876543210"}));
        assert!(t.attribute(&same).is_some());
        assert!(t.attribute(&other).is_none());
        assert!(t.attribute(&unnamed).is_some());
    }

    #[test]
    fn unmatchable_target() {
        assert!(target(&[], None, None).is_unmatchable());
        assert!(!target(&["9876543210"], None, None).is_unmatchable());
    }
}
