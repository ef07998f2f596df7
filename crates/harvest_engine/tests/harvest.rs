use std::sync::Arc;
use std::time::Duration;

use harvest_core::{ColumnSpec, ErrorCause, MissingCardPolicy, ProgressEvent};
use harvest_engine::{
    ConcurrencyMode, DelayRange, EnrichConfig, Endpoints, FetchConfig, HarvestConfig, HarvestHandle,
    HarvestRequest, Harvester, PacingConfig, RetryPolicy, SellerFilters,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SELLER: &str = "777";

fn config_for(server: &MockServer) -> HarvestConfig {
    HarvestConfig {
        fetch: FetchConfig {
            retry: RetryPolicy {
                max_attempts: 2,
                backoff_base: Duration::from_millis(1),
                jitter_max: Duration::ZERO,
            },
            request_timeout: Duration::from_secs(2),
            ..FetchConfig::default()
        },
        endpoints: Endpoints::rooted_at(&server.uri()),
        enrich: EnrichConfig {
            scheme: "http".to_string(),
            card_timeout: Duration::from_millis(500),
            probe_timeout: Duration::from_millis(500),
            probe_ceiling: 2,
            probe_host_pattern: format!("{}/basket-{{nn}}", server.address()),
        },
        pacing: PacingConfig::none(),
        ..HarvestConfig::default()
    }
}

fn products(ids: impl IntoIterator<Item = u64>) -> Value {
    let products: Vec<Value> = ids
        .into_iter()
        .map(|id| json!({"id": id, "name": format!("Товар {id}"), "vendorCode": format!("VC-{id}")}))
        .collect();
    json!({ "data": { "products": products } })
}

async fn mount_route_map(server: &MockServer) {
    let body = json!({
        "recommend": {
            "mediabasket_route_map": [{
                "hosts": [{"vol_range_from": 0, "vol_range_to": 99_999, "host": server.address().to_string()}]
            }]
        }
    });
    Mock::given(method("GET"))
        .and(path("/api/v3/upstreams"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_total(server: &MockServer, total: u64) {
    Mock::given(method("GET"))
        .and(path("/sellers/v8/filters"))
        .and(query_param("supplier", SELLER))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"total": total}})))
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, page: u64, body: Value) {
    Mock::given(method("GET"))
        .and(path("/sellers/v4/catalog"))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_cards(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/vol\d+/part\d+/\d+/info/ru/card\.json$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "description": "Описание товара",
            "options": [
                {"name": "Состав", "value": "хлопок"},
                {"name": "Цвет", "value": "синий"}
            ]
        })))
        .mount(server)
        .await;
}

async fn collect(harvester: Harvester, request: HarvestRequest) -> Vec<ProgressEvent> {
    harvest_logging::initialize_for_tests();
    let mut rx = Arc::new(harvester).spawn(request, CancellationToken::new());
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn columns() -> ColumnSpec {
    ColumnSpec::from_names(["Артикул WB", "Артикул продавца", "Наименование", "Состав"])
}

fn progress_count(events: &[ProgressEvent]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, ProgressEvent::Progress { .. }))
        .count()
}

fn kind(event: &ProgressEvent) -> &'static str {
    match event {
        ProgressEvent::Log { .. } => "log",
        ProgressEvent::Start { .. } => "start",
        ProgressEvent::Progress { .. } => "progress",
        ProgressEvent::Result { .. } => "result",
        ProgressEvent::Error { .. } => "error",
    }
}

#[tokio::test]
async fn events_follow_the_run_lifecycle() {
    let server = MockServer::start().await;
    mount_route_map(&server).await;
    mount_total(&server, 2).await;
    mount_page(&server, 1, products([146972802, 12345])).await;
    mount_cards(&server).await;

    let request = HarvestRequest::new(SELLER, columns());
    let events = collect(Harvester::new(config_for(&server)).unwrap(), request).await;

    let kinds: Vec<&str> = events.iter().map(kind).collect();
    assert_eq!(
        kinds,
        vec!["log", "start", "progress", "progress", "log", "log", "result"]
    );
    assert_eq!(
        events[2],
        ProgressEvent::Progress {
            current: 1,
            total: 2,
            message: "[1/2] Товар 146972802".to_string(),
        }
    );

    let ProgressEvent::Result { columns, records } = events.last().unwrap() else {
        panic!("expected a result");
    };
    assert_eq!(
        columns,
        &vec![
            "Артикул WB".to_string(),
            "Артикул продавца".to_string(),
            "Наименование".to_string(),
            "Состав".to_string(),
        ]
    );
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].text("Артикул WB").as_deref(), Some("146972802"));
    assert_eq!(records[0].text("Артикул продавца").as_deref(), Some("VC-146972802"));
    assert_eq!(records[1].text("Состав").as_deref(), Some("хлопок"));
}

#[tokio::test]
async fn zero_total_ends_with_single_no_items_error() {
    let server = MockServer::start().await;
    mount_route_map(&server).await;
    mount_total(&server, 0).await;

    let events = collect(
        Harvester::new(config_for(&server)).unwrap(),
        HarvestRequest::new(SELLER, columns()),
    )
    .await;

    assert_eq!(progress_count(&events), 0);
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Error {
            cause: ErrorCause::NoItemsFound,
            ..
        })
    ));
}

#[tokio::test]
async fn failed_page_is_skipped_and_run_completes() {
    let server = MockServer::start().await;
    mount_route_map(&server).await;
    mount_total(&server, 150).await;
    mount_page(&server, 1, products(1..=100)).await;
    Mock::given(method("GET"))
        .and(path("/sellers/v4/catalog"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;
    mount_cards(&server).await;

    let events = collect(
        Harvester::new(config_for(&server)).unwrap(),
        HarvestRequest::new(SELLER, columns()),
    )
    .await;

    assert_eq!(progress_count(&events), 100);
    assert!(events.iter().any(|event| matches!(
        event,
        ProgressEvent::Log { message } if message.starts_with("Skipping page 2")
    )));
    let ProgressEvent::Result { records, .. } = events.last().unwrap() else {
        panic!("expected a result, got {:?}", events.last());
    };
    assert_eq!(records.len(), 100);
    assert_eq!(records[99].text("Артикул WB").as_deref(), Some("100"));
}

#[tokio::test]
async fn route_map_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/upstreams"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    mount_total(&server, 10).await;

    let events = collect(
        Harvester::new(config_for(&server)).unwrap(),
        HarvestRequest::new(SELLER, columns()),
    )
    .await;

    let kinds: Vec<&str> = events.iter().map(kind).collect();
    assert_eq!(kinds, vec!["log", "error"]);
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Error {
            cause: ErrorCause::Upstream,
            ..
        })
    ));
}

#[tokio::test]
async fn cancelled_run_reports_cancelled_without_requests() {
    let server = MockServer::start().await;
    let harvester = Harvester::new(config_for(&server)).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut rx = Arc::new(harvester).spawn(HarvestRequest::new(SELLER, columns()), cancel);
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(matches!(
        events.last(),
        Some(ProgressEvent::Error {
            cause: ErrorCause::Cancelled,
            ..
        })
    ));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn cancelling_mid_run_ends_with_cancelled_and_no_result() {
    let server = MockServer::start().await;
    mount_route_map(&server).await;
    mount_total(&server, 5).await;
    mount_page(&server, 1, products(1..=5)).await;
    mount_cards(&server).await;

    let config = HarvestConfig {
        concurrency: ConcurrencyMode::Sequential,
        pacing: PacingConfig {
            between_items: DelayRange::millis(200, 200),
            between_pages: DelayRange::zero(),
        },
        ..config_for(&server)
    };
    harvest_logging::initialize_for_tests();
    let cancel = CancellationToken::new();
    let mut rx = Arc::new(Harvester::new(config).unwrap())
        .spawn(HarvestRequest::new(SELLER, columns()), cancel.clone());

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        if matches!(event, ProgressEvent::Progress { .. }) {
            cancel.cancel();
        }
        events.push(event);
    }

    let terminals: Vec<&ProgressEvent> = events.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(terminals.len(), 1);
    assert!(matches!(
        terminals[0],
        ProgressEvent::Error {
            cause: ErrorCause::Cancelled,
            ..
        }
    ));
    assert!(matches!(events.last(), Some(ProgressEvent::Error { .. })));
    assert!(!events
        .iter()
        .any(|event| matches!(event, ProgressEvent::Result { .. })));
    assert!(progress_count(&events) < 5);
}

#[tokio::test]
async fn bounded_mode_keeps_listing_order_in_result() {
    let server = MockServer::start().await;
    mount_route_map(&server).await;
    mount_total(&server, 12).await;
    mount_page(&server, 1, products(101..=112)).await;
    mount_cards(&server).await;

    let config = HarvestConfig {
        concurrency: ConcurrencyMode::Bounded { workers: 4 },
        ..config_for(&server)
    };
    let events = collect(
        Harvester::new(config).unwrap(),
        HarvestRequest::new(SELLER, columns()),
    )
    .await;

    let currents: Vec<u64> = events
        .iter()
        .filter_map(|event| match event {
            ProgressEvent::Progress { current, .. } => Some(*current),
            _ => None,
        })
        .collect();
    assert_eq!(currents, (1..=12).collect::<Vec<_>>());

    let ProgressEvent::Result { records, .. } = events.last().unwrap() else {
        panic!("expected a result");
    };
    let ids: Vec<String> = records
        .iter()
        .filter_map(|record| record.text("Артикул WB"))
        .collect();
    let expected: Vec<String> = (101..=112).map(|id: u64| id.to_string()).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn missing_card_policy_controls_items_without_cards() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/upstreams"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    mount_total(&server, 2).await;
    mount_page(&server, 1, products([1, 2])).await;

    let included = collect(
        Harvester::new(config_for(&server)).unwrap(),
        HarvestRequest::new(SELLER, columns()),
    )
    .await;
    let ProgressEvent::Result { records, .. } = included.last().unwrap() else {
        panic!("expected a result");
    };
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].text("Состав").as_deref(), Some(""));
    assert_eq!(records[0].text("Наименование").as_deref(), Some("Товар 1"));

    let config = HarvestConfig {
        missing_cards: MissingCardPolicy::Exclude,
        ..config_for(&server)
    };
    let excluded = collect(
        Harvester::new(config).unwrap(),
        HarvestRequest::new(SELLER, columns()),
    )
    .await;
    let ProgressEvent::Result { records, .. } = excluded.last().unwrap() else {
        panic!("expected a result");
    };
    assert!(records.is_empty());
}

#[tokio::test]
async fn empty_column_spec_discovers_card_options() {
    let server = MockServer::start().await;
    mount_route_map(&server).await;
    mount_total(&server, 1).await;
    mount_page(&server, 1, products([5])).await;
    mount_cards(&server).await;

    let events = collect(
        Harvester::new(config_for(&server)).unwrap(),
        HarvestRequest::new(SELLER, ColumnSpec::default()),
    )
    .await;

    let ProgressEvent::Result { columns, records } = events.last().unwrap() else {
        panic!("expected a result");
    };
    assert_eq!(columns.first().map(String::as_str), Some("Артикул продавца"));
    assert_eq!(columns.last().map(String::as_str), Some("Цвет"));
    assert_eq!(records[0].text("Цвет").as_deref(), Some("синий"));
}

#[tokio::test]
async fn filters_reach_the_listing_endpoints() {
    let server = MockServer::start().await;
    mount_route_map(&server).await;
    Mock::given(method("GET"))
        .and(path("/sellers/v8/filters"))
        .and(query_param("fbrand", "42"))
        .and(query_param("xsubject", "105"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"total": 1}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sellers/v4/catalog"))
        .and(query_param("fbrand", "42"))
        .and(query_param("xsubject", "105"))
        .respond_with(ResponseTemplate::new(200).set_body_json(products([9])))
        .expect(1)
        .mount(&server)
        .await;
    mount_cards(&server).await;

    let request = HarvestRequest::new(SELLER, columns())
        .with_filters(SellerFilters::default().with_brand("42").with_subject("105"));
    let events = collect(Harvester::new(config_for(&server)).unwrap(), request).await;
    assert_eq!(kind(events.last().unwrap()), "result");
}

#[test]
fn handle_streams_events_from_a_background_runtime() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime.block_on(async {
        let server = MockServer::start().await;
        mount_route_map(&server).await;
        mount_total(&server, 1).await;
        mount_page(&server, 1, products([3])).await;
        mount_cards(&server).await;
        server
    });

    let harvester = Arc::new(Harvester::new(config_for(&server)).unwrap());
    let handle = HarvestHandle::start(harvester, HarvestRequest::new(SELLER, columns()));
    let mut events = Vec::new();
    while let Some(event) = handle.recv_timeout(Duration::from_secs(10)) {
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }

    assert_eq!(kind(events.last().unwrap()), "result");
    runtime.block_on(async move { drop(server) });
}
