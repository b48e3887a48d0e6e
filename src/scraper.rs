use async_trait::async_trait;
use headless_chrome::protocol::cdp::{Network, Page};
use headless_chrome::{Browser, LaunchOptions, Tab};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;

use crate::config::{BrowserConfig, MonitorConfig};
use crate::utils::error::{AppError, Result};

// Chrome is kept alive between the hourly claim attempts
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
}

impl BrowserCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The browser operations the workflows need from a single controlled tab.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Loads `url` and waits for the navigation to finish.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Full markup of the current document.
    async fn html(&self) -> Result<String>;

    /// Visible text of `<body>`.
    async fn body_text(&self) -> Result<String>;

    /// Runs `script` in the page. Strings come back as-is, `null`/`undefined` as
    /// `None`, anything else as its JSON text.
    async fn evaluate(&self, script: &str) -> Result<Option<String>>;

    /// PNG capture of the viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn cookies(&self) -> Result<Vec<BrowserCookie>>;

    async fn clear_cookies(&self) -> Result<()>;

    async fn reload(&self) -> Result<()>;

    /// Clicks the first element matching `selector`; `false` when nothing matches.
    async fn click(&self, selector: &str) -> Result<bool>;
}

/// One Chrome process with one tab. Dropping it terminates the browser.
pub struct ChromeSession {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeSession {
    /// Starts Chrome according to `config`. `headless` overrides the configured flag,
    /// `user_data_dir` keeps a persistent profile (login state) between runs.
    pub fn launch(
        config: &BrowserConfig,
        user_data_dir: Option<&Path>,
        headless: Option<bool>,
    ) -> Result<Self> {
        let headless = headless.unwrap_or(config.headless);
        let mut launch_options: LaunchOptions = LaunchOptions::default_builder()
            .headless(headless)
            .sandbox(false) // Often needed in containerized environments
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .args(vec![
                OsStr::new("--disable-infobars"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
            ])
            .build()
            .map_err(|e| AppError::browser("Failed to create launch options", e))?;

        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(std::path::PathBuf::from(chrome_path));
        }
        if let Some(dir) = user_data_dir {
            std::fs::create_dir_all(dir)?;
            launch_options.user_data_dir = Some(dir.to_path_buf());
        }

        let browser =
            Browser::new(launch_options).map_err(|e| AppError::browser("Failed to launch browser", e))?;
        let tab = browser
            .new_tab()
            .map_err(|e| AppError::browser("Failed to create tab", e))?;

        tab.set_user_agent(&config.user_agent, None, None)
            .map_err(|e| AppError::browser("Failed to set user agent", e))?;
        tab.set_default_timeout(Duration::from_secs(config.page_timeout_secs));

        tracing::info!(headless, "Browser started");
        Ok(Self {
            _browser: browser,
            tab,
        })
    }
}

impl ChromeSession {
    /// Runs a blocking tab call on the blocking pool, so the caller's task can
    /// still be cancelled while Chrome is busy.
    async fn with_tab<T, F>(&self, action: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&Tab) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        off_runtime(Arc::clone(&self.tab), action, f).await
    }
}

/// Moves `f(&resource)` onto the blocking pool and maps both the join error and
/// the call's own error to [`AppError::Browser`].
async fn off_runtime<R, T, F>(resource: Arc<R>, action: &'static str, f: F) -> Result<T>
where
    R: Send + Sync + ?Sized + 'static,
    F: FnOnce(&R) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&resource))
        .await
        .map_err(|e| AppError::browser(action, e))?
        .map_err(|e| AppError::browser(action, e))
}

#[async_trait]
impl PageDriver for ChromeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        let url = url.to_string();
        self.with_tab("Navigation failed", move |tab| {
            tab.navigate_to(&url)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn html(&self) -> Result<String> {
        self.with_tab("Failed to get page content", |tab| tab.get_content())
            .await
    }

    async fn body_text(&self) -> Result<String> {
        self.with_tab("Failed to read body text", |tab| {
            tab.find_element("body")?.get_inner_text()
        })
        .await
    }

    async fn evaluate(&self, script: &str) -> Result<Option<String>> {
        let script = script.to_string();
        let result = self
            .with_tab("Script evaluation failed", move |tab| tab.evaluate(&script, false))
            .await?;

        Ok(match result.value {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        })
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.with_tab("Screenshot capture failed", |tab| {
            tab.capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
        })
        .await
    }

    async fn cookies(&self) -> Result<Vec<BrowserCookie>> {
        let cookies = self
            .with_tab("Failed to read cookies", |tab| tab.get_cookies())
            .await?;
        Ok(cookies
            .into_iter()
            .map(|c| BrowserCookie::new(c.name, c.value))
            .collect())
    }

    async fn clear_cookies(&self) -> Result<()> {
        self.with_tab("Failed to clear cookies", |tab| {
            tab.call_method(Network::ClearBrowserCookies(None))?;
            Ok(())
        })
        .await
    }

    async fn reload(&self) -> Result<()> {
        self.with_tab("Reload failed", |tab| {
            tab.reload(false, None)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        let selector = selector.to_string();
        self.with_tab("Click failed", move |tab| match tab.find_element(&selector) {
            Ok(element) => {
                element.click()?;
                Ok(true)
            }
            Err(e) => {
                tracing::debug!(selector = %selector, "No element to click: {}", e);
                Ok(false)
            }
        })
        .await
    }
}

/// Navigates with a fixed number of attempts, then waits a randomized settle time
/// so late-loading price widgets can render.
pub async fn load_page_with_retry(
    page: &dyn PageDriver,
    url: &str,
    config: &MonitorConfig,
) -> Result<()> {
    let retries = config.max_retries.max(1) as usize - 1;
    let strategy = FixedInterval::from_millis(config.retry_delay_ms).take(retries);

    let mut attempt = 0u32;
    Retry::spawn(strategy, || {
        attempt += 1;
        let current = attempt;
        async move {
            page.navigate(url).await.inspect_err(|e| {
                tracing::warn!(attempt = current, max = config.max_retries, "Page load failed: {}", e);
            })
        }
    })
    .await?;

    let settle = settle_delay(config);
    tracing::debug!(settle_ms = settle.as_millis() as u64, "Waiting for page to settle");
    tokio::time::sleep(settle).await;
    Ok(())
}

fn settle_delay(config: &MonitorConfig) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=config.settle_jitter_ms);
    Duration::from_millis(config.settle_min_ms + jitter)
}

/// Random duration in `[min_ms, max_ms]`.
pub fn random_delay(min_ms: u64, max_ms: u64) -> Duration {
    let ms = rand::thread_rng().gen_range(min_ms..=max_ms.max(min_ms));
    Duration::from_millis(ms)
}
