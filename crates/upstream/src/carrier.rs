//! Adapter for the telephony carrier API.
//!
//! The carrier reports calls with `PascalCase` fields, timestamps in its
//! own local time zone and cursor pagination through
//! `Metadata.NextPageUri`. The call-search date filter uses a vendor
//! encoding (`gte:<time>;lte:<time>` with spaces as `%20`), so query
//! strings are assembled by hand rather than form-encoded.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use callsync_core::fields::{parse_timestamp, FieldChain};
use callsync_core::recording::RecordingCandidate;
use callsync_core::types::Timestamp;
use chrono::{FixedOffset, NaiveDateTime, TimeZone, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::Url;
use serde::Serialize;
use serde_json::Value;

use crate::error::{error_from_response, json_body, GatewayError};

/// Call search endpoint, relative to the account base path.
pub const CALLS_PATH: &str = "Calls.json";

/// Upper bound on pages followed in one search.
const MAX_SEARCH_PAGES: usize = 20;

/// Default page size requested from the carrier.
pub const DEFAULT_SEARCH_PAGE_SIZE: u32 = 50;

/// Timestamp layout the carrier uses in filters and payloads.
const CARRIER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SID: FieldChain = FieldChain::new("sid", &["Sid", "sid", "CallSid"]);
const FROM: FieldChain = FieldChain::new("from", &["From", "from"]);
const TO: FieldChain = FieldChain::new("to", &["To", "to", "PhoneNumber"]);
const STATUS: FieldChain = FieldChain::new("status", &["Status", "status"]);
const DIRECTION: FieldChain = FieldChain::new("direction", &["Direction", "direction"]);
const START_TIME: FieldChain = FieldChain::new("start_time", &["StartTime", "DateCreated", "start_time"]);
const END_TIME: FieldChain = FieldChain::new("end_time", &["EndTime", "end_time"]);
const DURATION: FieldChain = FieldChain::new("duration", &["Duration", "duration", "ConversationDuration"]);
const RECORDING_URL: FieldChain = FieldChain::new("recording_url", &["RecordingUrl", "recording_url"]);

/// One call as reported by the carrier. Numbers are verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarrierCall {
    pub sid: String,
    pub from: String,
    pub to: String,
    pub status: Option<String>,
    pub direction: Option<String>,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub duration_secs: Option<i32>,
    pub recording_url: Option<String>,
}

impl CarrierCall {
    /// Parse one entry of `Calls[]`. Entries without a sid are dropped.
    pub fn from_value(record: &Value, offset: FixedOffset) -> Option<Self> {
        let time = |chain: &FieldChain| {
            chain
                .text(record)
                .and_then(|raw| parse_carrier_time(&raw, offset))
        };
        Some(Self {
            sid: SID.text(record)?,
            from: FROM.text(record).unwrap_or_default(),
            to: TO.text(record).unwrap_or_default(),
            status: STATUS.text(record),
            direction: DIRECTION.text(record),
            start_time: time(&START_TIME),
            end_time: time(&END_TIME),
            duration_secs: DURATION
                .int(record)
                .filter(|d| *d >= 0)
                .and_then(|d| i32::try_from(d).ok()),
            recording_url: RECORDING_URL.text(record),
        })
    }

    pub fn as_candidate(&self) -> RecordingCandidate {
        RecordingCandidate {
            call_id: self.sid.clone(),
            start_time: self.start_time,
            recording_url: self.recording_url.clone(),
        }
    }
}

/// Parameters of a call search. Numbers are passed through as given.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSearch {
    pub from: Option<String>,
    pub to: Option<String>,
    /// Inclusive UTC window on the call's creation time.
    pub window: (Timestamp, Timestamp),
    pub page_size: u32,
}

impl CallSearch {
    pub fn new(window: (Timestamp, Timestamp)) -> Self {
        Self {
            from: None,
            to: None,
            window,
            page_size: DEFAULT_SEARCH_PAGE_SIZE,
        }
    }

    pub fn from_number(mut self, number: impl Into<String>) -> Self {
        self.from = Some(number.into());
        self
    }

    pub fn to_number(mut self, number: impl Into<String>) -> Self {
        self.to = Some(number.into());
        self
    }

    /// Query parameters with the window rendered in carrier-local time.
    pub fn params(&self, offset: FixedOffset) -> Vec<(&'static str, String)> {
        let mut params = Vec::with_capacity(4);
        if let Some(from) = &self.from {
            params.push(("From", from.clone()));
        }
        if let Some(to) = &self.to {
            params.push(("To", to.clone()));
        }
        params.push(("DateCreated", date_created_filter(self.window, offset)));
        params.push(("PageSize", self.page_size.to_string()));
        params
    }
}

/// `gte:<start>;lte:<end>` in carrier-local time.
pub fn date_created_filter(window: (Timestamp, Timestamp), offset: FixedOffset) -> String {
    let local = |ts: Timestamp| ts.with_timezone(&offset).format(CARRIER_TIME_FORMAT);
    format!("gte:{};lte:{}", local(window.0), local(window.1))
}

/// Parse a carrier timestamp. Offset-less values are carrier-local.
pub fn parse_carrier_time(raw: &str, offset: FixedOffset) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, CARRIER_TIME_FORMAT) {
        return offset
            .from_local_datetime(&naive)
            .single()
            .map(|ts| ts.with_timezone(&Utc));
    }
    parse_timestamp(raw)
}

/// All calls on one response page.
pub fn parse_calls(payload: &Value, offset: FixedOffset) -> Vec<CarrierCall> {
    payload
        .get("Calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|c| CarrierCall::from_value(c, offset))
                .collect()
        })
        .unwrap_or_default()
}

/// The cursor for the next page, if any.
pub fn next_page_uri(payload: &Value) -> Option<String> {
    payload
        .get("Metadata")
        .and_then(|m| m.get("NextPageUri"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|uri| !uri.is_empty())
        .map(str::to_string)
}

/// Query value bytes the carrier takes literally: unreserved characters plus
/// the `:` `;` `,` separators of its filter syntax.
const CARRIER_QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b':')
    .remove(b';')
    .remove(b',');

/// Percent-encode a query value the way the carrier expects. Spaces become
/// `%20`, never `+`.
pub fn encode_query_value(value: &str) -> String {
    utf8_percent_encode(value, CARRIER_QUERY).to_string()
}

/// Carrier access.
#[async_trait]
pub trait CarrierGateway: Send + Sync {
    /// `GET <base>/<path>?<params>`, parsed as JSON.
    async fn fetch(&self, path: &str, params: &[(&str, String)]) -> Result<Value, GatewayError>;

    /// Follow an opaque `NextPageUri`, resolved against the base path.
    async fn fetch_next(&self, next_page_uri: &str) -> Result<Value, GatewayError>;

    /// Download a recording.
    async fn fetch_recording(&self, url: &str) -> Result<Vec<u8>, GatewayError>;

    /// The carrier's local time zone.
    fn utc_offset(&self) -> FixedOffset;

    /// Search calls, following pagination until the cursor runs out.
    async fn search_calls(&self, search: &CallSearch) -> Result<Vec<CarrierCall>, GatewayError> {
        let offset = self.utc_offset();
        let mut payload = self.fetch(CALLS_PATH, &search.params(offset)).await?;
        let mut calls = Vec::new();

        for page in 1..=MAX_SEARCH_PAGES {
            calls.extend(parse_calls(&payload, offset));
            let Some(next) = next_page_uri(&payload) else {
                break;
            };
            if page == MAX_SEARCH_PAGES {
                tracing::warn!(pages = page, "Carrier search truncated at page limit");
                break;
            }
            payload = self.fetch_next(&next).await?;
        }

        Ok(calls)
    }

    /// A single call by sid.
    async fn call_detail(&self, sid: &str) -> Result<CarrierCall, GatewayError> {
        let payload = self.fetch(&format!("Calls/{}.json", sid.trim()), &[]).await?;
        payload
            .get("Call")
            .and_then(|call| CarrierCall::from_value(call, self.utc_offset()))
            .ok_or_else(|| GatewayError::Decode("response carries no Call object".into()))
    }
}

/// HTTP client for one carrier account.
pub struct CarrierApi {
    client: reqwest::Client,
    base: Url,
    api_key: String,
    api_token: String,
    offset: FixedOffset,
}

impl CarrierApi {
    /// * `base_url` - Account base path, e.g.
    ///   `https://api.carrier.example/v1/Accounts/acme`. Relative paths and
    ///   next-page cursors resolve against it.
    pub fn new(
        base_url: &str,
        api_key: String,
        api_token: String,
        offset: FixedOffset,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Network(format!("failed to build HTTP client: {e}")))?;
        Self::with_client(client, base_url, api_key, api_token, offset)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        api_key: String,
        api_token: String,
        offset: FixedOffset,
    ) -> Result<Self, GatewayError> {
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .map_err(|e| GatewayError::Rejected {
                status: 0,
                body: format!("invalid carrier base URL: {e}"),
            })?;
        Ok(Self {
            client,
            base,
            api_key,
            api_token,
            offset,
        })
    }

    fn resolve(&self, reference: &str) -> Result<Url, GatewayError> {
        self.base.join(reference).map_err(|e| GatewayError::Rejected {
            status: 0,
            body: format!("invalid carrier URL {reference}: {e}"),
        })
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, GatewayError> {
        let started = Instant::now();
        let path = url.path().to_string();
        tracing::debug!(path = %path, "Carrier API request");

        let response = self
            .client
            .get(url)
            .basic_auth(&self.api_key, Some(&self.api_token))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(path = %path, error = %e, "Carrier API request failed");
                GatewayError::from(e)
            })?;

        let status = response.status();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if !status.is_success() {
            let err = error_from_response(response).await;
            tracing::warn!(path = %path, status = status.as_u16(), elapsed_ms, error = %err, "Carrier API error");
            return Err(err);
        }
        tracing::debug!(path = %path, status = status.as_u16(), elapsed_ms, "Carrier API response");
        Ok(response)
    }
}

#[async_trait]
impl CarrierGateway for CarrierApi {
    async fn fetch(&self, path: &str, params: &[(&str, String)]) -> Result<Value, GatewayError> {
        let mut url = self.resolve(path.trim_start_matches('/'))?;
        if !params.is_empty() {
            let query = params
                .iter()
                .map(|(key, value)| format!("{key}={}", encode_query_value(value)))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query));
        }
        json_body(self.get(url).await?).await
    }

    async fn fetch_next(&self, next_page_uri: &str) -> Result<Value, GatewayError> {
        let url = self.resolve(next_page_uri)?;
        json_body(self.get(url).await?).await
    }

    async fn fetch_recording(&self, url: &str) -> Result<Vec<u8>, GatewayError> {
        let url = self.resolve(url)?;
        let response = self.get(url).await?;
        Ok(response.bytes().await?.to_vec())
    }

    fn utc_offset(&self) -> FixedOffset {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    #[test]
    fn date_filter_is_carrier_local() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 45, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 0).unwrap();
        assert_eq!(
            date_created_filter((start, end), ist()),
            "gte:2024-05-01 15:15:00;lte:2024-05-01 15:45:00"
        );
    }

    #[test]
    fn vendor_encoding_keeps_separators_and_escapes_spaces() {
        assert_eq!(
            encode_query_value("gte:2024-05-01 15:15:00;lte:2024-05-01 15:45:00"),
            "gte:2024-05-01%2015:15:00;lte:2024-05-01%2015:45:00"
        );
        assert_eq!(encode_query_value("+919876543210"), "%2B919876543210");
    }

    #[test]
    fn vendor_encoding_escapes_reserved_and_non_ascii() {
        assert_eq!(encode_query_value("a_b.c~d-e"), "a_b.c~d-e");
        assert_eq!(encode_query_value("x&y=z/é"), "x%26y%3Dz%2F%C3%A9");
    }

    #[test]
    fn parses_call_in_local_time() {
        let call = CarrierCall::from_value(
            &json!({
                "Sid": "abc",
                "From": "09876543210",
                "To": "08045678901",
                "Status": "completed",
                "StartTime": "2024-05-01 15:28:00",
                "Duration": "42",
                "RecordingUrl": "https://recordings.example/abc.mp3"
            }),
            ist(),
        )
        .unwrap();
        assert_eq!(call.start_time, Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, 58, 0).unwrap()));
        assert_eq!(call.duration_secs, Some(42));
        assert!(call.as_candidate().has_recording());
    }

    #[test]
    fn drops_entries_without_sid() {
        let payload = json!({"Calls": [{"From": "1"}, {"Sid": "x"}]});
        let calls = parse_calls(&payload, ist());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].sid, "x");
    }

    #[test]
    fn next_page_uri_ignores_blank() {
        assert_eq!(
            next_page_uri(&json!({"Metadata": {"NextPageUri": "Calls.json?After=x"}})).as_deref(),
            Some("Calls.json?After=x")
        );
        assert_eq!(next_page_uri(&json!({"Metadata": {"NextPageUri": ""}})), None);
        assert_eq!(next_page_uri(&json!({"Metadata": {"NextPageUri": null}})), None);
    }
}
