use bitget_mcp::capability::{CapabilityGroup, CapabilityStatus};
use bitget_mcp::config::{Config, Credentials};
use bitget_mcp::error::ErrorKind;
use bitget_mcp::http::BitgetClient;
use bitget_mcp::types::QueryParams;
use httpmock::{Method::GET, MockServer};
use serde_json::json;

const PRIMARY: &str = "/api/v2/earn/product/list";
const SAVINGS: &str = "/api/v2/earn/saving/product/list";

fn client(server: &MockServer) -> anyhow::Result<BitgetClient> {
    let cfg = Config::new(server.base_url()).with_credentials(Credentials {
        api_key: "key".into(),
        secret_key: "secret".into(),
        passphrase: "pass".into(),
    });
    Ok(BitgetClient::new(cfg)?)
}

#[tokio::test(flavor = "multi_thread")]
async fn probe_falls_through_404_and_caches_second_candidate() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let primary = server
        .mock_async(|when, then| {
            when.method(GET).path(PRIMARY);
            then.status(404).body("Not Found");
        })
        .await;
    let savings = server
        .mock_async(|when, then| {
            when.method(GET).path(SAVINGS).query_param("coin", "USDT");
            then.status(200).json_body(json!({"code": "00000", "data": []}));
        })
        .await;
    let client = client(&server)?;
    let group = CapabilityGroup::earn();

    group.ensure_supported(&client).await?;
    assert_eq!(group.status(), CapabilityStatus::Supported);
    assert_eq!(group.cached_endpoint("products").as_deref(), Some(SAVINGS));
    primary.assert_hits_async(1).await;
    savings.assert_hits_async(1).await;

    // Supported short-circuits; resolve goes straight to the cached path.
    group.ensure_supported(&client).await?;
    let c = &client;
    let res = group
        .resolve("products", |path| async move {
            c.private_get(&path, QueryParams::new().push("coin", "USDT"), None).await
        })
        .await?;
    assert_eq!(res.endpoint, format!("GET {SAVINGS}"));
    primary.assert_hits_async(1).await;
    savings.assert_hits_async(2).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn all_404_marks_unsupported_and_stops_probing() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let any = server
        .mock_async(|when, then| {
            when.method(GET).path_contains("/api/v2/earn/");
            then.status(404).json_body(json!({"code": "404", "msg": "Not Found"}));
        })
        .await;
    let client = client(&server)?;
    let group = CapabilityGroup::earn();

    let err = group.ensure_supported(&client).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BitgetApiError);
    assert_eq!(err.code(), Some("EARN_UNAVAILABLE"));
    assert_eq!(group.status(), CapabilityStatus::Unsupported);
    any.assert_hits_async(2).await;

    let err = group.ensure_supported(&client).await.unwrap_err();
    assert_eq!(err.code(), Some("EARN_UNAVAILABLE"));
    any.assert_hits_async(2).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn non_404_failure_propagates_and_leaves_status_unknown() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let primary = server
        .mock_async(|when, then| {
            when.method(GET).path(PRIMARY);
            then.status(500).body("upstream exploded");
        })
        .await;
    let savings = server
        .mock_async(|when, then| {
            when.method(GET).path(SAVINGS);
            then.status(200).json_body(json!({"code": "00000", "data": []}));
        })
        .await;
    let client = client(&server)?;
    let group = CapabilityGroup::earn();

    let err = group.ensure_supported(&client).await.unwrap_err();
    assert_eq!(err.code(), Some("500"));
    assert_eq!(group.status(), CapabilityStatus::Unknown);
    assert!(group.cached_endpoint("products").is_none());
    primary.assert_hits_async(1).await;
    savings.assert_hits_async(0).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_warmups_share_one_probe() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let primary = server
        .mock_async(|when, then| {
            when.method(GET).path(PRIMARY);
            then.status(200)
                .delay(std::time::Duration::from_millis(50))
                .json_body(json!({"code": "00000", "data": []}));
        })
        .await;
    let client = client(&server)?;
    let group = CapabilityGroup::earn();

    let (a, b) = tokio::join!(group.warmup(&client), group.warmup(&client));
    assert_eq!(a, CapabilityStatus::Supported);
    assert_eq!(b, CapabilityStatus::Supported);
    assert_eq!(group.warmup(&client).await, CapabilityStatus::Supported);
    primary.assert_hits_async(1).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn warmup_swallows_errors() -> anyhow::Result<()> {
    let server = MockServer::start_async().await;
    let primary = server
        .mock_async(|when, then| {
            when.method(GET).path(PRIMARY);
            then.status(200).json_body(json!({"code": "40018", "msg": "Invalid IP"}));
        })
        .await;
    let client = client(&server)?;
    let group = CapabilityGroup::earn();

    assert_eq!(group.warmup(&client).await, CapabilityStatus::Unknown);
    assert_eq!(group.warmup(&client).await, CapabilityStatus::Unknown);
    primary.assert_hits_async(1).await;
    Ok(())
}
