//! API integration tests
//!
//! These tests drive the router with in-memory requests and verify the
//! synchronous response and the background recording of open events.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use async_trait::async_trait;
use ezinstall::api::{self, AppState, OpenResponse};
use ezinstall::models::{EventId, NewOpenEvent, OpenEvent};
use ezinstall::recorder::EventRecorder;
use ezinstall::region::{RegionError, RegionIndex, RegionResolver};
use ezinstall::storage::{SqliteStorage, Storage};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::{Layer, ServiceExt};

/// Region index backed by a fixed map
struct StaticIndex(HashMap<&'static str, &'static str>);

impl RegionIndex for StaticIndex {
    fn lookup(&self, ip: &str) -> Result<Option<String>, RegionError> {
        Ok(self.0.get(ip).map(|r| r.to_string()))
    }
}

fn test_resolver() -> RegionResolver {
    let index = StaticIndex(HashMap::from([
        ("114.114.114.114", "中国|0|江苏省|南京市|0"),
        ("203.0.113.7", "中国|0|香港|0|0"),
        ("8.8.8.8", "美国|0|0|0|Level3"),
    ]));
    RegionResolver::new(Arc::new(index))
}

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1, "open_record")
        .await
        .unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

/// Store whose dedup check never completes
struct StallingStorage;

#[async_trait]
impl Storage for StallingStorage {
    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn count_since(&self, _app_name: &str, _ip: &str, _since: i64) -> anyhow::Result<u64> {
        std::future::pending().await
    }

    async fn insert(&self, _event: &NewOpenEvent) -> anyhow::Result<EventId> {
        std::future::pending().await
    }

    async fn latest(&self, _app_name: &str, _ip: &str) -> anyhow::Result<Option<OpenEvent>> {
        Ok(None)
    }
}

/// Helper layer to inject ConnectInfo for tests
#[derive(Clone)]
struct TestConnectInfoLayer;

impl<S> Layer<S> for TestConnectInfoLayer {
    type Service = TestConnectInfoMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TestConnectInfoMiddleware { inner }
    }
}

#[derive(Clone)]
struct TestConnectInfoMiddleware<S> {
    inner: S,
}

impl<S, B> tower::Service<Request<B>> for TestConnectInfoMiddleware<S>
where
    S: tower::Service<Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let addr = SocketAddr::from(([127, 0, 0, 1], 12345));
        req.extensions_mut()
            .insert(axum::extract::connect_info::ConnectInfo(addr));
        self.inner.call(req)
    }
}

fn create_app(storage: Arc<dyn Storage>) -> Router {
    let state = Arc::new(AppState {
        resolver: test_resolver(),
        recorder: Arc::new(EventRecorder::new(storage, 24 * 60 * 60)),
        trust_proxy_headers: true,
    });
    api::create_router(state).layer(TestConnectInfoLayer)
}

async fn send(app: Router, request: Request<Body>) -> OpenResponse {
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Wait for background recording to reach `expected` events
async fn wait_for_events(storage: &Arc<dyn Storage>, app_name: &str, ip: &str, expected: u64) -> u64 {
    let mut count = 0;
    for _ in 0..50 {
        count = storage.count_since(app_name, ip, 0).await.unwrap();
        if count >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    count
}

#[tokio::test]
async fn test_open_records_event_in_background() {
    let storage = create_test_storage().await;
    let app = create_app(storage.clone());

    let request = Request::builder()
        .uri("/?channelId=c1&appName=app1")
        .header("x-real-ip", "114.114.114.114")
        .header("origin", "https://sub.example.com/path")
        .body(Body::empty())
        .unwrap();

    let response = send(app, request).await;
    assert_eq!(response.code, 0);
    assert_eq!(response.msg, "success");
    assert_eq!(response.data.country, "中国");
    assert!(response.is_china_county);
    assert!(response.is_china_inland);
    assert!(response.is_china);

    assert_eq!(wait_for_events(&storage, "app1", "114.114.114.114", 1).await, 1);

    let stored = storage
        .latest("app1", "114.114.114.114")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.event.channel_id, "c1");
    assert_eq!(stored.event.ip, "114.114.114.114");
    assert_eq!(stored.event.origin, "sub.example.com");
    assert_eq!(stored.event.region.province, "江苏省");
    assert!(stored.event.is_country_china);
    assert!(stored.event.is_china_inland);
}

#[tokio::test]
async fn test_repeat_open_is_deduplicated() {
    let storage = create_test_storage().await;

    for _ in 0..3 {
        let request = Request::builder()
            .method("POST")
            .uri("/?channelId=c1&appName=app1")
            .header("x-forwarded-for", "8.8.8.8")
            .body(Body::empty())
            .unwrap();
        send(create_app(storage.clone()), request).await;
        wait_for_events(&storage, "app1", "8.8.8.8", 1).await;
    }

    // Give any stray task a chance to land before counting
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(storage.count_since("app1", "8.8.8.8", 0).await.unwrap(), 1);
}

#[tokio::test]
async fn test_response_does_not_wait_for_recording() {
    let app = create_app(Arc::new(StallingStorage));
    let request = Request::builder()
        .uri("/?channelId=c1&appName=app1")
        .header("x-real-ip", "114.114.114.114")
        .body(Body::empty())
        .unwrap();

    let response = tokio::time::timeout(Duration::from_secs(2), send(app, request))
        .await
        .expect("response waited on the store");
    assert_eq!(response.code, 0);
    assert_eq!(response.data.province, "江苏省");
    assert!(response.is_china_inland);
}

#[tokio::test]
async fn test_repeated_query_keys_use_first_value() {
    let storage = create_test_storage().await;

    let request = Request::builder()
        .uri("/?channelId=c1&channelId=c2&appName=app1&appName=app2")
        .header("x-real-ip", "114.114.114.114")
        .body(Body::empty())
        .unwrap();
    let response = send(create_app(storage.clone()), request).await;
    assert_eq!(response.code, 0);
    assert_eq!(response.data.country, "中国");

    assert_eq!(wait_for_events(&storage, "app1", "114.114.114.114", 1).await, 1);
    let stored = storage
        .latest("app1", "114.114.114.114")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.event.channel_id, "c1");
    assert_eq!(storage.count_since("app2", "114.114.114.114", 0).await.unwrap(), 0);
}

#[tokio::test]
async fn test_malformed_query_still_answers() {
    let storage = create_test_storage().await;
    let request = Request::builder()
        .uri("/?appName&channelId=%zz&=x&&")
        .header("x-real-ip", "8.8.8.8")
        .body(Body::empty())
        .unwrap();

    let response = send(create_app(storage), request).await;
    assert_eq!(response.code, 0);
    assert_eq!(response.data.country, "美国");
}

#[tokio::test]
async fn test_missing_tags_skip_recording() {
    let storage = create_test_storage().await;

    for uri in ["/", "/?channelId=c1", "/?appName=app1", "/?channelId=&appName=app1"] {
        let request = Request::builder()
            .uri(uri)
            .header("x-real-ip", "8.8.8.8")
            .body(Body::empty())
            .unwrap();
        let response = send(create_app(storage.clone()), request).await;
        assert_eq!(response.code, 0, "{uri}");
        assert_eq!(response.data.country, "美国", "{uri}");
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(storage.count_since("app1", "8.8.8.8", 0).await.unwrap(), 0);
}

#[tokio::test]
async fn test_outlying_region_flags() {
    let storage = create_test_storage().await;
    let request = Request::builder()
        .uri("/")
        .header("x-real-ip", "203.0.113.7:5555")
        .body(Body::empty())
        .unwrap();

    let response = send(create_app(storage), request).await;
    assert_eq!(response.data.province, "香港");
    assert!(response.is_china_county);
    assert!(!response.is_china_inland);
    assert!(!response.is_china);
}

#[tokio::test]
async fn test_forwarded_chain_falls_back_to_later_hop() {
    let storage = create_test_storage().await;
    let request = Request::builder()
        .uri("/?channelId=c9&appName=app9")
        .header("x-forwarded-for", "10.0.0.1:80, 8.8.8.8")
        .body(Body::empty())
        .unwrap();

    let response = send(create_app(storage.clone()), request).await;
    assert_eq!(response.data.isp, "Level3");
    assert!(!response.is_china_county);
    assert!(!response.is_china);

    // The whole chain is the recorded ip
    assert_eq!(wait_for_events(&storage, "app9", "10.0.0.1,8.8.8.8", 1).await, 1);
}

#[tokio::test]
async fn test_unresolved_ip_returns_empty_region() {
    let storage = create_test_storage().await;
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();

    // Falls back to the injected peer address, which the index does not know
    let response = send(create_app(storage), request).await;
    assert_eq!(response.code, 0);
    assert!(response.data.is_empty());
    assert!(!response.is_china_county);
    assert!(!response.is_china_inland);
}

#[tokio::test]
async fn test_response_field_names() {
    let storage = create_test_storage().await;
    let request = Request::builder()
        .uri("/")
        .header("x-real-ip", "114.114.114.114")
        .body(Body::empty())
        .unwrap();

    let response = create_app(storage).oneshot(request).await.unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    for key in ["code", "msg", "data", "isChinaCounty", "isChinaInland", "isChina"] {
        assert!(json.get(key).is_some(), "missing {key}");
    }
    for key in ["country", "district", "province", "city", "isp"] {
        assert!(json["data"].get(key).is_some(), "missing data.{key}");
    }
}

#[tokio::test]
async fn test_cors_preflight() {
    let storage = create_test_storage().await;
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/")
        .header("origin", "https://sub.example.com")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();

    let response = create_app(storage).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_health_check() {
    let storage = create_test_storage().await;
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = create_app(storage).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
