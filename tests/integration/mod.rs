// Shared fixtures for the end-to-end tests

pub mod job_pipeline_tests;
pub mod monitor_pass_tests;
pub mod report_push_tests;

use async_trait::async_trait;
use scraper::Html;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tao_watcher::config::{AppConfig, ClaimConfig, HarvestConfig, MonitorConfig};
use tao_watcher::scraper::{BrowserCookie, PageDriver};
use tao_watcher::{AppError, Result};

/// In-memory browser: every known url serves a fixed document.
#[derive(Default)]
pub struct FakePage {
    pages: HashMap<String, String>,
    cookies: Vec<BrowserCookie>,
    current: Mutex<Option<String>>,
    pub visited: Mutex<Vec<String>>,
    pub scripts: Mutex<Vec<String>>,
    pub clicks: Mutex<Vec<String>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push(BrowserCookie::new(name, value));
        self
    }

    fn current_html(&self) -> Result<String> {
        let current = self.current.lock().unwrap();
        current
            .as_ref()
            .and_then(|url| self.pages.get(url))
            .cloned()
            .ok_or_else(|| AppError::Browser("no page loaded".to_string()))
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.visited.lock().unwrap().push(url.to_string());
        if url != "about:blank" && !self.pages.contains_key(url) {
            return Err(AppError::browser("Navigation failed", "net::ERR_NAME_NOT_RESOLVED"));
        }
        *self.current.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    async fn html(&self) -> Result<String> {
        self.current_html()
    }

    async fn body_text(&self) -> Result<String> {
        let html = self.current_html()?;
        Ok(Html::parse_document(&html).root_element().text().collect::<Vec<_>>().join(" "))
    }

    async fn evaluate(&self, script: &str) -> Result<Option<String>> {
        self.scripts.lock().unwrap().push(script.to_string());
        Ok(None)
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>> {
        Ok(self.cookies.clone())
    }

    async fn clear_cookies(&self) -> Result<()> {
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        self.clicks.lock().unwrap().push(selector.to_string());
        Ok(true)
    }
}

/// Config rooted in `dir` with every wait set to zero.
pub fn get_test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.directories.data_dir = dir.join("data");
    config.directories.browser_data_dir = dir.join("browser");
    config.directories.records_dir = dir.join("records");
    config.monitor = MonitorConfig {
        retry_delay_ms: 0,
        settle_min_ms: 0,
        settle_jitter_ms: 0,
        pacing_min_ms: 0,
        pacing_max_ms: 0,
        error_pause_min_ms: 0,
        error_pause_max_ms: 0,
        save_debug_info: false,
        ..MonitorConfig::default()
    };
    config.harvest = HarvestConfig {
        max_wait_secs: 5,
        grace_secs: 0,
        ..HarvestConfig::default()
    };
    config.claim = ClaimConfig {
        initial_settle_ms: 0,
        post_run_wait_ms: 0,
        ..ClaimConfig::default()
    };
    config
}

pub fn item_page(price: &str) -> String {
    format!(
        r#"<html><body>
             <h1>原创亚克力立牌</h1>
             <div class="Price--root"><span>¥</span><span class="text">{price}</span></div>
           </body></html>"#
    )
}

pub const SOLD_OUT_PAGE: &str = "<html><body><p>宝贝已下架</p></body></html>";
