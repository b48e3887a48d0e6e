use super::*;
use serde_json::json;
use tao_watcher::plugins::notifiers::WxPusherNotifier;
use tao_watcher::price_history::PriceHistoryStore;
use tao_watcher::product_manager::PriceMonitor;
use tao_watcher::report::SimplePushReporter;
use tao_watcher::Product;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const PUSH_PATH: &str = "/api/send/message/simple-push";

fn reporter_for(config: &AppConfig, server: &MockServer) -> SimplePushReporter {
    let notifier = WxPusherNotifier::new(format!("{}{}", server.uri(), PUSH_PATH));
    SimplePushReporter::from_config(config, Box::new(notifier))
}

#[tokio::test]
async fn test_monitor_pass_pushes_report() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(PUSH_PATH))
        .and(body_partial_json(json!({"spt": "SPT_cli", "contentType": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let mut config = get_test_config(dir.path());
    config.wx_push.default_spt = "SPT_default".to_string();

    let url = "https://item.taobao.com/item.htm?id=7";
    let page = FakePage::new().with_page(url, &item_page("1.50"));
    let mut monitor = PriceMonitor::from_config(&config).with_reporter(reporter_for(&config, &server));

    let summary = monitor
        .monitor_prices(&page, &[Product::new("贴纸", url)], true, Some("SPT_cli"))
        .await;

    assert_eq!(summary.report_sent, Some(true));

    let requests: Vec<Request> = server.received_requests().await.unwrap_or_default();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body)?;
    let content = body["content"].as_str().unwrap_or_default();
    assert!(content.contains("贴纸"));
    // 1.50 is below the low price threshold: 1.50 * 1.5 rounded up to 2.3
    assert!(content.contains("2.3"));
    assert!(body["summary"].as_str().unwrap_or_default().starts_with("淘宝价格监控报告"));
    Ok(())
}

#[tokio::test]
async fn test_report_falls_back_to_default_token() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"spt": "SPT_default"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let mut config = get_test_config(dir.path());
    config.wx_push.default_spt = "SPT_default".to_string();

    let history = PriceHistoryStore::in_dir(config.data_dir());
    let sent = reporter_for(&config, &server)
        .send_price_report(None, &history, &[])
        .await;

    assert!(sent);
    Ok(())
}

#[tokio::test]
async fn test_push_without_any_token_sends_nothing() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let config = get_test_config(dir.path());
    let url = "https://item.taobao.com/item.htm?id=8";
    let page = FakePage::new().with_page(url, &item_page("20.00"));
    let mut monitor = PriceMonitor::from_config(&config).with_reporter(reporter_for(&config, &server));

    let summary = monitor
        .monitor_prices(&page, &[Product::new("挂件", url)], true, None)
        .await;

    assert_eq!(summary.report_sent, Some(false));
    assert!(summary.history_saved);
    Ok(())
}

#[tokio::test]
async fn test_rejected_push_is_reported_as_failure() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false, "msg": "spt无效"})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir()?;
    let config = get_test_config(dir.path());
    let history = PriceHistoryStore::in_dir(config.data_dir());

    let sent = reporter_for(&config, &server)
        .send_price_report(Some("SPT_bad"), &history, &[])
        .await;

    assert!(!sent);
    Ok(())
}
