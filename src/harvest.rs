use chrono::Local;
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::HarvestConfig;
use crate::job_store::JobStore;
use crate::models::{
    first_in_state, JobState, STATE_COOKIE_OBTAINED, STATE_GETTING_COOKIE, STATE_HARVEST_INTERRUPTED,
    STATE_MISSING_REQUIRED, STATE_NO_KEY_COOKIES,
};
use crate::scraper::{BrowserCookie, PageDriver};
use crate::utils::error::Result;
use crate::utils::text::TIMESTAMP_FORMAT;

/// What happened to the harvested job row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    pub row: usize,
    pub url: String,
    pub state1: String,
    pub cookie: String,
}

/// Key cookies with a value, in browser order; the first occurrence of a name wins.
pub fn select_key_cookies(cookies: &[BrowserCookie], keys: &[String]) -> Vec<(String, String)> {
    let mut seen = BTreeSet::new();
    cookies
        .iter()
        .filter(|c| !c.value.is_empty() && keys.contains(&c.name))
        .filter(|c| seen.insert(c.name.clone()))
        .map(|c| (c.name.clone(), c.value.clone()))
        .collect()
}

pub fn compose_cookie_string(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// `state1` and stored cookie string for the final cookie jar.
pub fn classify_harvest(pairs: &[(String, String)], required: &str) -> (String, String) {
    if pairs.is_empty() {
        return (STATE_NO_KEY_COOKIES.to_string(), String::new());
    }
    let state = if pairs.iter().any(|(name, _)| name == required) {
        STATE_COOKIE_OBTAINED.to_string()
    } else if required == "access_token" {
        STATE_MISSING_REQUIRED.to_string()
    } else {
        format!("Missing {}", required)
    };
    (state, compose_cookie_string(pairs))
}

fn now_stamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Fills in the credentials of the next job that has a url but no cookie yet.
/// The user logs in through the opened browser window.
pub struct CookieHarvester {
    config: HarvestConfig,
    store: Box<dyn JobStore>,
}

impl CookieHarvester {
    pub fn new(config: HarvestConfig, store: Box<dyn JobStore>) -> Self {
        Self { config, store }
    }

    /// `Ok(None)` when no job is waiting for a cookie. Ctrl-C ends the login wait
    /// early; the job row is still closed and saved.
    pub async fn harvest_next(&self, page: &dyn PageDriver) -> Result<Option<HarvestReport>> {
        self.harvest_next_until(page, async {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("Ctrl-C handler unavailable, harvest cannot be interrupted");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Same as [`harvest_next`](Self::harvest_next), but stops waiting for the
    /// login as soon as `interrupt` completes.
    pub async fn harvest_next_until(
        &self,
        page: &dyn PageDriver,
        interrupt: impl Future<Output = ()>,
    ) -> Result<Option<HarvestReport>> {
        let mut jobs = self.store.load()?;
        let Some(row) = first_in_state(&jobs, JobState::AwaitingCookie) else {
            tracing::info!("No job with a url and an empty cookie");
            return Ok(None);
        };
        let url = jobs[row].url.clone();
        tracing::info!(row = row + 2, url = %url, "Harvesting cookies");

        jobs[row].start_time = now_stamp();
        jobs[row].state1 = STATE_GETTING_COOKIE.to_string();
        self.store.save(&jobs)?;

        let collected = tokio::select! {
            result = self.collect_cookies(page, &url) => Some(result),
            _ = interrupt => None,
        };

        let (state1, cookie) = match collected {
            Some(Ok(cookies)) => {
                let pairs = select_key_cookies(&cookies, &self.config.key_cookies);
                let missing: Vec<&str> = self
                    .config
                    .key_cookies
                    .iter()
                    .filter(|key| !pairs.iter().any(|(name, _)| name == *key))
                    .map(String::as_str)
                    .collect();
                tracing::info!(
                    found = pairs.len(),
                    expected = self.config.key_cookies.len(),
                    "Key cookies collected"
                );
                if !missing.is_empty() {
                    tracing::warn!("Missing key cookies: {}", missing.join(", "));
                }
                classify_harvest(&pairs, &self.config.required_cookie)
            }
            Some(Err(e)) => {
                tracing::error!("Cookie harvest failed: {:?}", e);
                (format!("Error: {}", e), String::new())
            }
            None => {
                tracing::warn!(row = row + 2, "Harvest interrupted, closing the job row");
                (STATE_HARVEST_INTERRUPTED.to_string(), String::new())
            }
        };

        jobs[row].state1 = state1.clone();
        jobs[row].cookie = cookie.clone();
        jobs[row].end_time = now_stamp();
        self.store.save(&jobs)?;
        tracing::info!(row = row + 2, state = %state1, "Job record updated");

        Ok(Some(HarvestReport {
            row,
            url,
            state1,
            cookie,
        }))
    }

    /// Opens `url` with an empty cookie jar and waits until the required cookie
    /// shows up or the wait budget runs out, then returns the final jar.
    async fn collect_cookies(&self, page: &dyn PageDriver, url: &str) -> Result<Vec<BrowserCookie>> {
        page.navigate("about:blank").await?;
        if let Err(e) = page.clear_cookies().await {
            tracing::warn!("Could not clear cookies: {}", e);
        }
        page.navigate(url).await?;

        let max_wait = Duration::from_secs(self.config.max_wait_secs);
        let poll = Duration::from_secs(self.config.poll_interval_secs);
        let started = Instant::now();
        let mut found = BTreeSet::new();
        let mut logged_in = false;

        while started.elapsed() < max_wait {
            for cookie in page.cookies().await? {
                if self.config.key_cookies.contains(&cookie.name) && found.insert(cookie.name.clone()) {
                    tracing::info!(cookie = %cookie.name, "New key cookie");
                }
            }

            if found.contains(&self.config.required_cookie) {
                tracing::info!(
                    "{} obtained, waiting {}s for the remaining cookies",
                    self.config.required_cookie,
                    self.config.grace_secs
                );
                logged_in = true;
                tokio::time::sleep(Duration::from_secs(self.config.grace_secs)).await;
                break;
            }

            tokio::time::sleep(poll).await;
            let waited = started.elapsed().as_secs();
            if waited > 0 && waited % 10 == 0 {
                tracing::info!(waited_secs = waited, found = ?found, "Still waiting for login");
            }
        }

        if !logged_in {
            tracing::warn!(
                "Login not detected within {}s, keeping the cookies present now",
                self.config.max_wait_secs
            );
        }

        page.cookies().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_store::memory::{MemoryJobStore, SharedStore};
    use crate::models::JobRecord;
    use crate::scraper::MockPageDriver;
    use crate::utils::error::AppError;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::sync::Arc;

    fn keys() -> Vec<String> {
        HarvestConfig::default().key_cookies
    }

    fn fast_config() -> HarvestConfig {
        HarvestConfig {
            max_wait_secs: 5,
            poll_interval_secs: 1,
            grace_secs: 0,
            ..HarvestConfig::default()
        }
    }

    fn cookie(name: &str, value: &str) -> BrowserCookie {
        BrowserCookie::new(name, value)
    }

    #[test]
    fn test_select_key_cookies_first_occurrence_wins() {
        let cookies = vec![
            cookie("openid", "o1"),
            cookie("_ga", "tracking"),
            cookie("access_token", ""),
            cookie("access_token", "t1"),
            cookie("openid", "o2"),
            cookie("appid", "101"),
        ];

        let pairs = select_key_cookies(&cookies, &keys());

        assert_eq!(compose_cookie_string(&pairs), "openid=o1; access_token=t1; appid=101");
    }

    #[test]
    fn test_classify_harvest() {
        let full = vec![
            ("openid".to_string(), "o".to_string()),
            ("access_token".to_string(), "t".to_string()),
        ];
        assert_eq!(
            classify_harvest(&full, "access_token"),
            (STATE_COOKIE_OBTAINED.to_string(), "openid=o; access_token=t".to_string())
        );

        let partial = vec![("openid".to_string(), "o".to_string())];
        assert_eq!(
            classify_harvest(&partial, "access_token"),
            (STATE_MISSING_REQUIRED.to_string(), "openid=o".to_string())
        );

        assert_eq!(
            classify_harvest(&[], "access_token"),
            (STATE_NO_KEY_COOKIES.to_string(), String::new())
        );
    }

    #[tokio::test]
    async fn test_harvest_fills_first_pending_job() {
        let mut done = JobRecord::new("https://act.example.com/done", "go()");
        done.cookie = "access_token=old".to_string();
        let pending = JobRecord::new("https://act.example.com/pending", "go()");
        let store = Arc::new(MemoryJobStore::with_jobs(vec![done, pending]));

        let mut seq = Sequence::new();
        let mut page = MockPageDriver::new();
        page.expect_navigate()
            .with(eq("about:blank"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        page.expect_clear_cookies()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        page.expect_navigate()
            .with(eq("https://act.example.com/pending"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        page.expect_cookies().returning(|| {
            Ok(vec![
                BrowserCookie::new("openid", "o1"),
                BrowserCookie::new("access_token", "t1"),
                BrowserCookie::new("acctype", "qq"),
            ])
        });

        let harvester = CookieHarvester::new(fast_config(), Box::new(SharedStore(store.clone())));
        let report = harvester.harvest_next(&page).await.unwrap().unwrap();

        assert_eq!(report.row, 1);
        assert_eq!(report.state1, STATE_COOKIE_OBTAINED);
        let jobs = store.snapshot();
        assert_eq!(jobs[1].cookie, "openid=o1; access_token=t1; acctype=qq");
        assert!(!jobs[1].start_time.is_empty());
        assert!(!jobs[1].end_time.is_empty());
        assert_eq!(jobs[0].cookie, "access_token=old");
        // once when the harvest starts, once with the result
        assert_eq!(*store.saves.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_harvest_error_clears_cookie() {
        let store = Arc::new(MemoryJobStore::with_jobs(vec![JobRecord::new(
            "https://act.example.com/a",
            "go()",
        )]));
        let mut page = MockPageDriver::new();
        page.expect_navigate().returning(|url| {
            if url == "about:blank" {
                Ok(())
            } else {
                Err(AppError::Browser("net::ERR_ABORTED".to_string()))
            }
        });
        page.expect_clear_cookies()
            .returning(|| Err(AppError::Browser("no target".to_string())));

        let harvester = CookieHarvester::new(fast_config(), Box::new(SharedStore(store.clone())));
        let report = harvester.harvest_next(&page).await.unwrap().unwrap();

        assert_eq!(report.state1, "Error: Browser error: net::ERR_ABORTED");
        let jobs = store.snapshot();
        assert_eq!(jobs[0].cookie, "");
        assert_eq!(jobs[0].state1, report.state1);
        assert!(!jobs[0].end_time.is_empty());
    }

    #[tokio::test]
    async fn test_harvest_timeout_keeps_partial_cookies() {
        let store = Arc::new(MemoryJobStore::with_jobs(vec![JobRecord::new(
            "https://act.example.com/a",
            "go()",
        )]));
        let mut page = MockPageDriver::new();
        page.expect_navigate().returning(|_| Ok(()));
        page.expect_clear_cookies().returning(|| Ok(()));
        page.expect_cookies()
            .returning(|| Ok(vec![BrowserCookie::new("openid", "o1")]));

        let config = HarvestConfig {
            max_wait_secs: 0,
            ..fast_config()
        };
        let harvester = CookieHarvester::new(config, Box::new(SharedStore(store.clone())));
        let report = harvester.harvest_next(&page).await.unwrap().unwrap();

        assert_eq!(report.state1, STATE_MISSING_REQUIRED);
        assert_eq!(store.snapshot()[0].cookie, "openid=o1");
    }

    #[tokio::test]
    async fn test_interrupted_harvest_still_closes_job_row() {
        let store = Arc::new(MemoryJobStore::with_jobs(vec![JobRecord::new(
            "https://act.example.com/a",
            "go()",
        )]));
        let mut page = MockPageDriver::new();
        page.expect_navigate().returning(|_| Ok(()));
        page.expect_clear_cookies().returning(|| Ok(()));
        page.expect_cookies()
            .returning(|| Ok(vec![BrowserCookie::new("openid", "o1")]));

        let harvester = CookieHarvester::new(fast_config(), Box::new(SharedStore(store.clone())));
        let started = std::time::Instant::now();
        let report = harvester
            .harvest_next_until(&page, tokio::time::sleep(Duration::from_millis(50)))
            .await
            .unwrap()
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.state1, STATE_HARVEST_INTERRUPTED);
        let jobs = store.snapshot();
        assert_eq!(jobs[0].state1, STATE_HARVEST_INTERRUPTED);
        assert!(!jobs[0].start_time.is_empty());
        assert!(!jobs[0].end_time.is_empty());
        assert_eq!(jobs[0].cookie, "");
        assert_eq!(jobs[0].state(), JobState::AwaitingCookie);
        assert_eq!(*store.saves.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_nothing_to_harvest() {
        let store = Arc::new(MemoryJobStore::with_jobs(vec![JobRecord::default()]));
        let page = MockPageDriver::new();

        let harvester = CookieHarvester::new(fast_config(), Box::new(SharedStore(store.clone())));

        assert!(harvester.harvest_next(&page).await.unwrap().is_none());
        assert_eq!(*store.saves.lock().unwrap(), 0);
    }
}
