//! In-process fakes for the two gateways, plus engine wiring.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use callsync_events::EventBus;
use callsync_sync::{MemoryStore, SyncEngine, SyncSettings};
use callsync_upstream::{
    CallSearch, CampaignGateway, CarrierCall, CarrierGateway, GatewayError, SubmitMethod,
};
use chrono::FixedOffset;
use serde_json::{json, Value};

pub const CAMPAIGNS: &str = "/bulk-calls";
pub const CALL_LOGS: &str = "/call-logs";

pub fn detail_path(external_id: &str) -> String {
    format!("{CAMPAIGNS}/{external_id}")
}

// ---------------------------------------------------------------------------
// Campaign API
// ---------------------------------------------------------------------------

/// Serves canned pages per path. Page `n` of a path is the `n-1`th
/// response registered for it; past the end an empty page is returned.
#[derive(Default)]
pub struct FakeCampaignGateway {
    pages: Mutex<HashMap<String, Vec<Result<Value, GatewayError>>>>,
    submit_responses: Mutex<HashMap<String, Result<Value, GatewayError>>>,
    fetches: Mutex<Vec<(String, u32)>>,
    submits: Mutex<Vec<(String, Option<Value>, SubmitMethod)>>,
}

impl FakeCampaignGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, path: &str, response: Result<Value, GatewayError>) -> Self {
        self.pages
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push(response);
        self
    }

    pub fn on_submit(self, path: &str, response: Result<Value, GatewayError>) -> Self {
        self.submit_responses
            .lock()
            .unwrap()
            .insert(path.to_string(), response);
        self
    }

    /// `(path, page)` of every fetch, in order.
    pub fn fetches(&self) -> Vec<(String, u32)> {
        self.fetches.lock().unwrap().clone()
    }

    pub fn fetch_count(&self, path: &str) -> usize {
        self.fetches().iter().filter(|(p, _)| p == path).count()
    }

    pub fn submits(&self) -> Vec<(String, Option<Value>, SubmitMethod)> {
        self.submits.lock().unwrap().clone()
    }
}

#[async_trait]
impl CampaignGateway for FakeCampaignGateway {
    async fn fetch(&self, path: &str, params: &[(&str, String)]) -> Result<Value, GatewayError> {
        let page = params
            .iter()
            .find(|(k, _)| *k == "pageno")
            .and_then(|(_, v)| v.parse::<u32>().ok())
            .unwrap_or(1);
        self.fetches.lock().unwrap().push((path.to_string(), page));

        self.pages
            .lock()
            .unwrap()
            .get(path)
            .and_then(|responses| responses.get(page as usize - 1))
            .cloned()
            .unwrap_or_else(|| Ok(json!({ "data": [] })))
    }

    async fn submit(
        &self,
        path: &str,
        payload: Option<&Value>,
        method: SubmitMethod,
    ) -> Result<Value, GatewayError> {
        self.submits
            .lock()
            .unwrap()
            .push((path.to_string(), payload.cloned(), method));
        self.submit_responses
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_else(|| Ok(json!({ "success": true })))
    }
}

// ---------------------------------------------------------------------------
// Carrier API
// ---------------------------------------------------------------------------

/// Answers call searches from a queue; once drained every search is empty.
#[derive(Default)]
pub struct FakeCarrier {
    results: Mutex<VecDeque<Result<Vec<CarrierCall>, GatewayError>>>,
    searches: Mutex<Vec<CallSearch>>,
}

impl FakeCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, result: Result<Vec<CarrierCall>, GatewayError>) -> Self {
        self.results.lock().unwrap().push_back(result);
        self
    }

    pub fn searches(&self) -> Vec<CallSearch> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl CarrierGateway for FakeCarrier {
    async fn fetch(&self, _path: &str, _params: &[(&str, String)]) -> Result<Value, GatewayError> {
        Err(GatewayError::NotFound)
    }

    async fn fetch_next(&self, _next_page_uri: &str) -> Result<Value, GatewayError> {
        Err(GatewayError::NotFound)
    }

    async fn fetch_recording(&self, url: &str) -> Result<Vec<u8>, GatewayError> {
        Ok(format!("audio:{url}").into_bytes())
    }

    fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(330 * 60).unwrap()
    }

    async fn search_calls(&self, search: &CallSearch) -> Result<Vec<CarrierCall>, GatewayError> {
        self.searches.lock().unwrap().push(search.clone());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub fn carrier_call(
    sid: &str,
    from: &str,
    to: &str,
    start: chrono::DateTime<chrono::Utc>,
    recording_url: Option<&str>,
) -> CarrierCall {
    CarrierCall {
        sid: sid.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        status: Some("completed".into()),
        direction: Some("inbound".into()),
        start_time: Some(start),
        end_time: None,
        duration_secs: Some(30),
        recording_url: recording_url.map(str::to_string),
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub struct Harness {
    pub engine: SyncEngine,
    pub store: Arc<MemoryStore>,
    pub events: Arc<EventBus>,
    pub campaigns: Arc<FakeCampaignGateway>,
    pub carrier: Arc<FakeCarrier>,
}

pub fn harness(campaigns: FakeCampaignGateway, carrier: FakeCarrier) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let events = Arc::new(EventBus::default());
    let campaigns = Arc::new(campaigns);
    let carrier = Arc::new(carrier);
    let engine = SyncEngine::new(
        store.clone(),
        events.clone(),
        campaigns.clone(),
        carrier.clone(),
        SyncSettings::default(),
    );
    Harness {
        engine,
        store,
        events,
        campaigns,
        carrier,
    }
}
