use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Local, NaiveDateTime, TimeZone};
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;

use crate::config::ClaimConfig;
use crate::job_store::{ClaimLog, ClaimLogEntry, JobStore};
use crate::models::{first_in_state, JobRecord, JobState, STATE_PROPS_CLAIMED};
use crate::scraper::PageDriver;
use crate::utils::error::Result;
use crate::utils::text::TIMESTAMP_FORMAT;

pub const POPUP_MESSAGE_PREFIX: &str = "网页消息：";
pub const NO_POPUP: &str = "没有找到弹窗";
pub const POPUP_ERROR_PREFIX: &str = "弹窗内容异常: ";
pub const POPUP_ID_PREFIX: &str = "amsopenFrame_";
pub const POPUP_CONFIRM_SELECTOR: &str =
    ".amsdialog_content .amsdialog_footer .amsdialog_btn.amsdialog_bconfirm";

pub const CLAIM_SUCCESS: &str = "success";
pub const CLAIM_FAILED: &str = "failed";

static POPUP: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"div[id^="amsopenFrame_"]"#).expect("popup selector parses")
});
static POPUP_CONTENT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".amsdialog_content .amsdialog_cmain").expect("popup content selector parses")
});

/// Start of the next wall-clock hour strictly after `now`.
pub fn next_hour_boundary(now: NaiveDateTime) -> NaiveDateTime {
    let hour = ChronoDuration::hours(1);
    match now.duration_trunc(hour) {
        Ok(start) => start + hour,
        Err(_) => now + hour,
    }
}

fn local_from_naive(naive: NaiveDateTime) -> DateTime<Local> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}

/// Sleeps until the next top of the hour in local time.
pub async fn sleep_until_next_hour() {
    let now = Local::now();
    let target = local_from_naive(next_hour_boundary(now.naive_local()));
    let wait = (target - now).to_std().unwrap_or_default();
    tracing::info!(
        "Next claim attempt at {} (in {}s)",
        target.format(TIMESTAMP_FORMAT),
        wait.as_secs()
    );
    tokio::time::sleep(wait).await;
}

/// The dialog read off a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupRead {
    pub message: String,
    /// Scoped selector of the confirm button of the chosen dialog.
    pub close_selector: Option<String>,
}

/// Picks the dialog whose millisecond id suffix is closest to `now_ms`.
/// Dialogs whose id does not end in a number are ignored.
pub fn read_popup(html: &str, now_ms: i64) -> PopupRead {
    let doc = Html::parse_document(html);

    let chosen = doc
        .select(&POPUP)
        .filter_map(|el| {
            let id = el.value().id()?;
            let stamp = id.strip_prefix(POPUP_ID_PREFIX)?.parse::<i64>().ok()?;
            Some((el, id.to_string(), (stamp - now_ms).abs()))
        })
        .min_by_key(|(_, _, distance)| *distance);

    let Some((popup, id, _)) = chosen else {
        return PopupRead {
            message: NO_POPUP.to_string(),
            close_selector: None,
        };
    };

    let close_selector = Some(format!("#{} {}", id, POPUP_CONFIRM_SELECTOR));
    match popup.select(&POPUP_CONTENT).next() {
        Some(content) => PopupRead {
            message: format!("{}{}", POPUP_MESSAGE_PREFIX, element_text(&content)),
            close_selector,
        },
        None => PopupRead {
            message: format!("{}{} has no content", POPUP_ERROR_PREFIX, id),
            close_selector,
        },
    }
}

fn element_text(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Outcome of one scheduled script run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimAttempt {
    pub message: String,
    pub success: bool,
}

/// Replays a harvested session and runs the job's script at every top of the hour
/// until the page confirms the reward.
pub struct RewardClaimer {
    config: ClaimConfig,
    key_cookies: Vec<String>,
    store: Box<dyn JobStore>,
    claim_log: ClaimLog,
}

impl RewardClaimer {
    pub fn new(
        config: ClaimConfig,
        key_cookies: Vec<String>,
        store: Box<dyn JobStore>,
        claim_log: ClaimLog,
    ) -> Self {
        Self {
            config,
            key_cookies,
            store,
            claim_log,
        }
    }

    /// First job with credentials whose reward has not been claimed.
    pub fn next_ready(&self) -> Result<Option<(usize, JobRecord)>> {
        let jobs = self.store.load()?;
        Ok(first_in_state(&jobs, JobState::ReadyToClaim).map(|row| (row, jobs[row].clone())))
    }

    /// Opens the job page with its stored cookies and clears any greeting dialog.
    pub async fn prepare(&self, page: &dyn PageDriver, job: &JobRecord) -> Result<()> {
        page.navigate(&job.url).await?;
        if let Err(e) = page.clear_cookies().await {
            tracing::warn!("Could not clear cookies: {}", e);
        }

        for (name, value) in job.cookie_pairs(&self.key_cookies) {
            page.evaluate(&cookie_script(name, value)).await?;
            tracing::debug!(cookie = name, "Cookie injected");
        }

        page.reload().await?;
        tokio::time::sleep(Duration::from_millis(self.config.initial_settle_ms)).await;

        let greeting = self.read_and_dismiss_popup(page).await;
        tracing::info!("{}", greeting);
        Ok(())
    }

    /// Runs the job script once and records the result. On success the job row is
    /// marked as claimed.
    pub async fn claim_once(
        &self,
        page: &dyn PageDriver,
        row: usize,
        job: &JobRecord,
    ) -> Result<ClaimAttempt> {
        if let Err(e) = page.evaluate(&job.js_code).await {
            tracing::warn!("Claim script failed: {}", e);
        }
        tokio::time::sleep(Duration::from_millis(self.config.post_run_wait_ms)).await;

        let message = self.read_and_dismiss_popup(page).await;
        let success = message.contains(&self.config.success_marker);
        tracing::info!(success, "{}", message);

        self.claim_log.append(&ClaimLogEntry {
            time: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            url: job.url.clone(),
            js_code: job.js_code.clone(),
            message: message.clone(),
            state: if success { CLAIM_SUCCESS } else { CLAIM_FAILED }.to_string(),
            cookie: job.cookie.clone(),
        })?;

        if success {
            self.mark_claimed(row, job)?;
        }

        Ok(ClaimAttempt { message, success })
    }

    /// Claims the next ready job, retrying every hour. `Ok(false)` when no job is ready.
    pub async fn run(&self, page: &dyn PageDriver) -> Result<bool> {
        let Some((row, job)) = self.next_ready()? else {
            tracing::info!("No job is ready to claim");
            return Ok(false);
        };
        tracing::info!(row = row + 2, url = %job.url, "Claiming reward");

        self.prepare(page, &job).await?;

        let mut attempts = 0u32;
        loop {
            sleep_until_next_hour().await;
            attempts += 1;
            let attempt = self.claim_once(page, row, &job).await?;
            if attempt.success {
                tracing::info!(attempts, "Reward claimed");
                return Ok(true);
            }
            tracing::info!(attempts, "Claim not confirmed, retrying next hour");
        }
    }

    async fn read_and_dismiss_popup(&self, page: &dyn PageDriver) -> String {
        let html = match page.html().await {
            Ok(html) => html,
            Err(e) => return format!("{}{}", POPUP_ERROR_PREFIX, e),
        };

        let popup = read_popup(&html, Local::now().timestamp_millis());
        if let Some(selector) = &popup.close_selector {
            match page.click(selector).await {
                Ok(true) => tracing::debug!("Dialog closed"),
                Ok(false) => tracing::debug!("Dialog has no confirm button"),
                Err(e) => return format!("{}{}", POPUP_ERROR_PREFIX, e),
            }
        }
        popup.message
    }

    /// Rows are matched by position first, then by url and script in case the
    /// file was edited while waiting.
    fn mark_claimed(&self, row: usize, job: &JobRecord) -> Result<()> {
        let mut jobs = self.store.load()?;
        let same = |candidate: &JobRecord| candidate.url == job.url && candidate.js_code == job.js_code;
        let target = if jobs.get(row).is_some_and(same) {
            Some(row)
        } else {
            jobs.iter().position(same)
        };

        match target {
            Some(index) => {
                jobs[index].state2 = STATE_PROPS_CLAIMED.to_string();
                self.store.save(&jobs)?;
            }
            None => tracing::warn!(url = %job.url, "Claimed job is no longer in the record file"),
        }
        Ok(())
    }
}

fn cookie_script(name: &str, value: &str) -> String {
    format!(
        "document.cookie = '{}={}; path=/'",
        name.replace('\'', "\\'"),
        value.replace('\'', "\\'")
    )
}
