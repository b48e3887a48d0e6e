use super::*;
use tao_watcher::catalog;
use tao_watcher::price_history::PriceHistoryStore;
use tao_watcher::price_logger::PriceLogger;
use tao_watcher::product_manager::{PriceMonitor, ProductOutcome};
use tao_watcher::Product;

const LISTING: &str = r#"
<html><body>
  <div class="cardContainer--x1">
    <a href="https://item.taobao.com/item.htm?id=1001&spm=a1z10">
      <div class="title--abc">原创亚克力立牌</div>
    </a>
  </div>
  <div class="cardContainer--x1">
    <a href="https://item.taobao.com/item.htm?id=1002">
      <div class="title--abc">限定徽章</div>
    </a>
  </div>
</body></html>
"#;

#[tokio::test]
async fn test_extracted_catalog_feeds_monitor() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = get_test_config(dir.path());

    let html_file = dir.path().join("favorites.html");
    std::fs::write(&html_file, LISTING)?;
    let output = catalog::default_output_path(config.data_dir());
    catalog::extract_product_file(&html_file, &output)?;

    let latest = catalog::latest_product_file(&config.data_dir().join(catalog::EXTRACTED_DIR))?;
    assert_eq!(latest, output);
    let products = catalog::read_products(&latest)?;
    assert_eq!(
        products,
        vec![
            Product::new("原创亚克力立牌", "https://item.taobao.com/item.htm?id=1001"),
            Product::new("限定徽章", "https://item.taobao.com/item.htm?id=1002"),
        ]
    );

    let page = FakePage::new()
        .with_page("https://item.taobao.com/item.htm?id=1001", &item_page("35.00"))
        .with_page("https://item.taobao.com/item.htm?id=1002", SOLD_OUT_PAGE);

    let mut monitor = PriceMonitor::from_config(&config);
    let summary = monitor.monitor_prices(&page, &products, false, None).await;

    assert_eq!(summary.recorded(), 1);
    assert_eq!(summary.new_items(), 1);
    assert!(matches!(summary.results[1].outcome, ProductOutcome::ExtractFailed));
    assert!(summary.history_saved);
    assert_eq!(summary.report_sent, None);

    let history = PriceHistoryStore::in_dir(config.data_dir());
    assert_eq!(history.len(), 1);
    assert_eq!(history.get("1001").map(|r| r.price.as_str()), Some("35.00"));
    Ok(())
}

#[tokio::test]
async fn test_second_pass_detects_change() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = get_test_config(dir.path());
    let url = "https://item.taobao.com/item.htm?id=556";
    let products = vec![Product::new("吧唧", url)];

    let first = FakePage::new().with_page(url, &item_page("10.00"));
    PriceMonitor::from_config(&config)
        .monitor_prices(&first, &products, false, None)
        .await;

    // a fresh monitor reloads the history written by the first pass
    let second = FakePage::new().with_page(url, &item_page("8.50"));
    let mut monitor = PriceMonitor::from_config(&config);
    let summary = monitor.monitor_prices(&second, &products, false, None).await;

    assert_eq!(summary.changes.len(), 1);
    let change = &summary.changes[0];
    assert_eq!(change.id, "556");
    assert_eq!(change.old_price, "10.00");
    assert_eq!(change.new_price, "8.50");
    assert_eq!(change.change_rate, "-15.0%");
    assert_eq!(monitor.history().get("556").map(|r| r.price.as_str()), Some("8.50"));

    let log = std::fs::read_to_string(PriceLogger::in_dir(config.data_dir()).path())?;
    assert!(log.contains("吧唧 (ID: 556)"));
    assert!(log.contains("price change: 10.00 → 8.50"));
    Ok(())
}

#[tokio::test]
async fn test_bad_products_do_not_stop_the_pass() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = get_test_config(dir.path());
    let good = "https://item.taobao.com/item.htm?id=42";
    let products = vec![
        Product::new("no id", "https://item.taobao.com/item.htm"),
        Product::new("offline", "https://item.taobao.com/item.htm?id=41"),
        Product::new("good", good),
    ];
    let page = FakePage::new().with_page(good, &item_page("19.90"));

    let mut monitor = PriceMonitor::from_config(&config);
    let summary = monitor.monitor_prices(&page, &products, false, None).await;

    assert_eq!(summary.results.len(), 3);
    assert!(matches!(summary.results[0].outcome, ProductOutcome::SkippedNoId));
    assert!(matches!(summary.results[1].outcome, ProductOutcome::LoadFailed { .. }));
    assert!(matches!(summary.results[2].outcome, ProductOutcome::Recorded { .. }));

    // two attempts for the offline item, one for the good one
    let visited = page.visited.lock().unwrap().clone();
    assert_eq!(visited.iter().filter(|u| u.ends_with("id=41")).count(), 2);
    assert_eq!(visited.iter().filter(|u| u.as_str() == good).count(), 1);
    Ok(())
}
