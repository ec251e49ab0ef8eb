//! Recording resolution, call-log attribution and inbound call sync
//! against in-process gateway fakes.

mod common;

use callsync_sync::call_logs::LogSweep;
use callsync_sync::SyncStore;
use callsync_upstream::GatewayError;
use chrono::{Duration, TimeZone, Utc};
use common::{carrier_call, harness, FakeCampaignGateway, FakeCarrier, CALL_LOGS};
use serde_json::json;

fn t() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

// ---------------------------------------------------------------------------
// Recording resolver
// ---------------------------------------------------------------------------

#[tokio::test]
async fn recording_closest_to_call_time_wins() {
    let carrier = FakeCarrier::new().then(Ok(vec![
        carrier_call("CA-late", "09876543210", "08045678901", t() + Duration::minutes(10), Some("https://rec/late.mp3")),
        carrier_call("CA-early", "09876543210", "08045678901", t() - Duration::minutes(2), Some("https://rec/early.mp3")),
    ]));
    let h = harness(FakeCampaignGateway::new(), carrier);

    let url = h
        .engine
        .resolve_recording("+91 98765 43210", "8045678901", t())
        .await;
    assert_eq!(url.as_deref(), Some("https://rec/early.mp3"));

    // Carrier From/To are inverted: the contact is queried as From.
    let searches = h.carrier.searches();
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0].from.as_deref(), Some("09876543210"));
    assert_eq!(searches[0].to.as_deref(), Some("08045678901"));
    assert_eq!(
        searches[0].window,
        (t() - Duration::minutes(15), t() + Duration::minutes(15))
    );
}

#[tokio::test]
async fn recording_search_retries_unswapped_once() {
    let carrier = FakeCarrier::new().then(Ok(Vec::new())).then(Ok(vec![carrier_call(
        "CA-1",
        "08045678901",
        "09876543210",
        t() + Duration::minutes(1),
        Some("https://rec/1.mp3"),
    )]));
    let h = harness(FakeCampaignGateway::new(), carrier);

    let url = h.engine.resolve_recording("9876543210", "8045678901", t()).await;
    assert_eq!(url.as_deref(), Some("https://rec/1.mp3"));

    let searches = h.carrier.searches();
    assert_eq!(searches.len(), 2);
    assert_eq!(searches[1].from.as_deref(), Some("08045678901"));
    assert_eq!(searches[1].to.as_deref(), Some("09876543210"));
}

#[tokio::test]
async fn recording_miss_and_carrier_failure_yield_none() {
    let carrier = FakeCarrier::new().then(Err(GatewayError::ServerError {
        status: 502,
        body: "bad gateway".into(),
    }));
    let h = harness(FakeCampaignGateway::new(), carrier);

    let url = h.engine.resolve_recording("9876543210", "8045678901", t()).await;
    assert_eq!(url, None);
    assert_eq!(h.carrier.searches().len(), 2);
}

#[tokio::test]
async fn batch_resolution_keeps_request_order() {
    use callsync_sync::recordings::RecordingRequest;

    let carrier = FakeCarrier::new()
        .then(Ok(vec![carrier_call("CA-1", "1", "2", t(), Some("https://rec/a.mp3"))]))
        .then(Ok(vec![carrier_call("CA-2", "1", "2", t(), Some("https://rec/b.mp3"))]));
    let h = harness(FakeCampaignGateway::new(), carrier);

    let request = |n: &str| RecordingRequest {
        destination: n.to_string(),
        origin: "8045678901".to_string(),
        approx: t(),
    };
    let urls = h
        .engine
        .resolve_recordings(vec![request("9876543210"), request("9123456789")])
        .await;
    assert_eq!(urls.len(), 2);
    assert!(urls.iter().all(Option::is_some));

    let bytes = h.engine.fetch_recording("https://rec/a.mp3").await.unwrap();
    assert_eq!(bytes, b"audio:https://rec/a.mp3".to_vec());
}

// ---------------------------------------------------------------------------
// Call-log matcher
// ---------------------------------------------------------------------------

fn completed_campaign() -> serde_json::Value {
    json!({
        "id": "77",
        "status": "completed",
        "from_number": "08045678901",
        "contact_list": [
            {"phone_number": "9876543210"},
            {"phone_number": "9123456789"}
        ]
    })
}

#[tokio::test]
async fn log_sweep_attributes_only_campaign_contacts() {
    let logs = json!({
        "call_log_data": [
            {
                "id": "c-A",
                "to_number": "+919876543210",
                "from_number": "08045678901",
                "status": "completed",
                "duration": 40,
                "created_at": "2024-05-01T10:00:00Z"
            },
            {"id": "c-B", "to_number": "09123456789", "status": "no-answer"},
            {"id": "c-C", "to_number": "9000000000", "status": "completed"},
            {"id": "c-A", "to_number": "9876543210", "status": "completed"}
        ]
    });
    let h = harness(
        FakeCampaignGateway::new().page(CALL_LOGS, Ok(logs)),
        FakeCarrier::new(),
    );
    h.engine.reconcile_campaigns(&[completed_campaign()], 1).await;
    let campaign = h.store.find_campaign_by_external_id("77").await.unwrap().unwrap();

    let sweep = LogSweep {
        campaign_id: campaign.id,
        campaign: &campaign,
        page_size: 50,
        max_pages: 5,
    };
    let first = h.engine.sync_call_lines_from_logs(sweep).await;
    assert_eq!(first.matched, 2);
    assert_eq!(first.upserted, 2);
    assert_eq!(first.pages, 1);
    assert_eq!(first.error, None);

    // A repeated sweep finds the same calls and writes nothing new.
    let second = h.engine.sync_call_lines_from_logs(sweep).await;
    assert_eq!(second.matched, 2);
    assert_eq!(second.upserted, 0);
    assert_eq!(second.updated, 0);

    let mut lines = h.store.list_lines(campaign.id).await.unwrap();
    lines.sort_by(|a, b| a.destination_number.cmp(&b.destination_number));
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].destination_number, "9123456789");
    assert_eq!(lines[0].status, "no-answer");
    assert_eq!(lines[1].destination_number, "9876543210");
    assert_eq!(lines[1].external_call_id.as_deref(), Some("c-A"));
    assert_eq!(lines[1].duration_secs, 40);
    assert_eq!(lines[1].metadata["from_number"], "8045678901");
}

#[tokio::test]
async fn failed_log_page_keeps_partial_results() {
    let page_one = json!({
        "records": [
            {"id": "c-A", "to_number": "9876543210", "status": "completed"},
            {"id": "c-B", "to_number": "9123456789", "status": "busy"}
        ]
    });
    let h = harness(
        FakeCampaignGateway::new()
            .page(CALL_LOGS, Ok(page_one))
            .page(CALL_LOGS, Err(GatewayError::RateLimited { retry_after: None })),
        FakeCarrier::new(),
    );
    h.engine.reconcile_campaigns(&[completed_campaign()], 1).await;
    let campaign = h.store.find_campaign_by_external_id("77").await.unwrap().unwrap();

    let summary = h
        .engine
        .sync_call_lines_from_logs(LogSweep {
            campaign_id: campaign.id,
            campaign: &campaign,
            page_size: 2,
            max_pages: 5,
        })
        .await;
    assert_eq!(summary.matched, 2);
    assert_eq!(summary.upserted, 2);
    assert_eq!(summary.pages, 1);
    assert!(summary.error.is_some());
    assert_eq!(h.campaigns.fetch_count(CALL_LOGS), 2);
}

#[tokio::test]
async fn campaign_without_contacts_or_origin_is_not_swept() {
    let h = harness(FakeCampaignGateway::new(), FakeCarrier::new());
    h.engine
        .reconcile_campaigns(&[json!({"id": "5", "status": "completed"})], 1)
        .await;
    let campaign = h.store.find_campaign_by_external_id("5").await.unwrap().unwrap();

    let summary = h
        .engine
        .sync_call_lines_from_logs(LogSweep {
            campaign_id: campaign.id,
            campaign: &campaign,
            page_size: 50,
            max_pages: 5,
        })
        .await;
    assert_eq!(summary.matched, 0);
    assert_eq!(h.campaigns.fetch_count(CALL_LOGS), 0);
}

// ---------------------------------------------------------------------------
// Call-line reconciler
// ---------------------------------------------------------------------------

#[tokio::test]
async fn contact_borrows_only_from_its_own_call() {
    let logs = json!({
        "call_log_data": [
            {
                "id": "c-A",
                "to_number": "9876543210",
                "status": "no-answer",
                "created_at": "2024-05-01T10:00:00Z"
            },
            {
                "id": "c-X",
                "to_number": "9876543210",
                "status": "completed",
                "duration": 60,
                "transcript": "X talk",
                "created_at": "2024-05-01T12:00:00Z"
            }
        ]
    });
    let h = harness(
        FakeCampaignGateway::new().page(CALL_LOGS, Ok(logs)),
        FakeCarrier::new(),
    );
    h.engine.reconcile_campaigns(&[completed_campaign()], 1).await;
    let campaign = h.store.find_campaign_by_external_id("77").await.unwrap().unwrap();
    h.engine
        .sync_call_lines_from_logs(LogSweep {
            campaign_id: campaign.id,
            campaign: &campaign,
            page_size: 50,
            max_pages: 5,
        })
        .await;

    let touched = h
        .engine
        .reconcile_lines(&[json!({"phone_number": "9876543210", "call_id": "c-A"})], &campaign)
        .await;
    assert_eq!(touched, 0);

    let lines = h.store.list_lines(campaign.id).await.unwrap();
    assert_eq!(lines.len(), 2);
    let a = lines.iter().find(|l| l.external_call_id.as_deref() == Some("c-A")).unwrap();
    assert_eq!(a.status, "no-answer");
    assert_eq!(a.call_time, Some(t()));
    assert_eq!(a.transcript, None);
    let x = lines.iter().find(|l| l.external_call_id.as_deref() == Some("c-X")).unwrap();
    assert_eq!(x.transcript.as_deref(), Some("X talk"));
}

#[tokio::test]
async fn contact_without_call_id_adopts_latest_call() {
    let logs = json!({
        "call_log_data": [
            {"id": "c-A", "to_number": "9876543210", "status": "no-answer", "created_at": "2024-05-01T10:00:00Z"},
            {"id": "c-X", "to_number": "9876543210", "status": "completed", "created_at": "2024-05-01T12:00:00Z"}
        ]
    });
    let h = harness(
        FakeCampaignGateway::new().page(CALL_LOGS, Ok(logs)),
        FakeCarrier::new(),
    );
    h.engine.reconcile_campaigns(&[completed_campaign()], 1).await;
    let campaign = h.store.find_campaign_by_external_id("77").await.unwrap().unwrap();
    h.engine
        .sync_call_lines_from_logs(LogSweep {
            campaign_id: campaign.id,
            campaign: &campaign,
            page_size: 50,
            max_pages: 5,
        })
        .await;

    let touched = h
        .engine
        .reconcile_lines(
            &[json!({"phone_number": "9876543210", "transcript": "hello"})],
            &campaign,
        )
        .await;
    assert_eq!(touched, 1);

    let lines = h.store.list_lines(campaign.id).await.unwrap();
    assert_eq!(lines.len(), 2);
    let x = lines.iter().find(|l| l.external_call_id.as_deref() == Some("c-X")).unwrap();
    assert_eq!(x.transcript.as_deref(), Some("hello"));
    let a = lines.iter().find(|l| l.external_call_id.as_deref() == Some("c-A")).unwrap();
    assert_eq!(a.transcript, None);
}

#[tokio::test]
async fn new_contacts_extend_existing_campaign_set() {
    let h = harness(FakeCampaignGateway::new(), FakeCarrier::new());
    h.engine.reconcile_campaigns(&[completed_campaign()], 1).await;
    let campaign = h.store.find_campaign_by_external_id("77").await.unwrap().unwrap();
    assert_eq!(campaign.contact_numbers.len(), 2);

    let touched = h
        .engine
        .reconcile_lines(
            &[json!({"phone_number": "9876543210"}), json!("+91 90000 00001")],
            &campaign,
        )
        .await;
    assert_eq!(touched, 2);
    // No call time on either contact: nothing to search recordings around.
    assert!(h.carrier.searches().is_empty());

    let stored = h.store.find_campaign(campaign.id).await.unwrap().unwrap();
    assert_eq!(stored.contact_numbers.len(), 3);
    assert!(stored.contact_numbers.contains(&"9876543210".to_string()));
    assert!(stored.contact_numbers.contains(&"9123456789".to_string()));
    assert!(stored.contact_numbers.contains(&"9000000001".to_string()));
}

#[tokio::test]
async fn resolved_recording_is_stored_on_line() {
    let carrier = FakeCarrier::new().then(Ok(vec![carrier_call(
        "CA-9",
        "09876543210",
        "08045678901",
        t() + Duration::minutes(1),
        Some("https://rec/9.mp3"),
    )]));
    let h = harness(FakeCampaignGateway::new(), carrier);
    h.engine.reconcile_campaigns(&[completed_campaign()], 1).await;
    let campaign = h.store.find_campaign_by_external_id("77").await.unwrap().unwrap();

    let touched = h
        .engine
        .reconcile_lines(
            &[json!({
                "phone_number": "9876543210",
                "call_id": "c-R",
                "status": "completed",
                "start_time": "2024-05-01T10:00:00Z"
            })],
            &campaign,
        )
        .await;
    assert_eq!(touched, 1);
    assert_eq!(h.carrier.searches().len(), 1);

    let lines = h.store.list_lines(campaign.id).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].external_call_id.as_deref(), Some("c-R"));
    assert_eq!(lines[0].recording_url.as_deref(), Some("https://rec/9.mp3"));
}

// ---------------------------------------------------------------------------
// Inbound calls
// ---------------------------------------------------------------------------

#[tokio::test]
async fn inbound_sync_discards_self_calls_and_upserts_by_id() {
    let real = carrier_call("CA1", "+919876543210", "08045678901", t(), Some("https://rec/in.mp3"));
    let loopback = carrier_call("CA2", "08045678901", "+918045678901", t(), None);
    let carrier = FakeCarrier::new()
        .then(Ok(vec![real.clone(), loopback]))
        .then(Ok(vec![real]));
    let h = harness(FakeCampaignGateway::new(), carrier);
    let mut events = h.events.subscribe();

    let since = t() - Duration::hours(24);
    let summary = h
        .engine
        .sync_incoming_calls("+91 80 4567 8901", since, t())
        .await
        .unwrap();
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.stored, 1);
    assert_eq!(summary.discarded, 1);

    let search = &h.carrier.searches()[0];
    assert_eq!(search.to.as_deref(), Some("08045678901"));
    assert_eq!(search.from, None);
    assert_eq!(search.window, (since, t()));

    h.engine
        .sync_incoming_calls("8045678901", since, t())
        .await
        .unwrap();
    let stored = h.store.incoming_calls();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].from_number, "9876543210");
    assert_eq!(stored[0].to_number, "8045678901");

    assert_eq!(events.try_recv().unwrap().name, "incoming_call.created");
    assert_eq!(events.try_recv().unwrap().name, "incoming_call.updated");
}

#[tokio::test]
async fn inbound_sync_surfaces_carrier_failure() {
    let carrier = FakeCarrier::new().then(Err(GatewayError::AuthError { status: 401 }));
    let h = harness(FakeCampaignGateway::new(), carrier);

    let result = h.engine.sync_incoming_calls("8045678901", t(), t()).await;
    assert!(result.is_err());
}
