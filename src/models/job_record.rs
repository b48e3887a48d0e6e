use serde::{Deserialize, Serialize};

/// Column order of the job record file.
pub const JOB_COLUMNS: [&str; 8] = [
    "startTime", "endTime", "url", "jsCode", "state1", "state2", "state3", "cookie",
];

/// `state1` while a harvest is in progress.
pub const STATE_GETTING_COOKIE: &str = "Getting cookie";
pub const STATE_COOKIE_OBTAINED: &str = "Successfully obtained cookie";
pub const STATE_MISSING_REQUIRED: &str = "Missing access_token";
pub const STATE_NO_KEY_COOKIES: &str = "No key cookies obtained";
/// `state1` when the user stopped the harvest before it finished. The cookie stays
/// empty, so the job is picked up again on the next run.
pub const STATE_HARVEST_INTERRUPTED: &str = "Interrupted";
/// `state2` once the reward has been claimed.
pub const STATE_PROPS_CLAIMED: &str = "Successfully obtained props";

/// One row of the job record file. Empty cells are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobRecord {
    pub start_time: String,
    pub end_time: String,
    pub url: String,
    pub js_code: String,
    pub state1: String,
    pub state2: String,
    pub state3: String,
    pub cookie: String,
}

/// Where a job sits in the harvest -> claim pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// No url, nothing to do.
    Empty,
    /// Has a url but no credentials yet.
    AwaitingCookie,
    /// Credentials harvested, reward not claimed yet.
    ReadyToClaim,
    Claimed,
}

impl JobRecord {
    pub fn new(url: impl Into<String>, js_code: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            js_code: js_code.into(),
            ..Default::default()
        }
    }

    pub fn state(&self) -> JobState {
        if !self.cookie.trim().is_empty() {
            if self.state2 == STATE_PROPS_CLAIMED {
                JobState::Claimed
            } else {
                JobState::ReadyToClaim
            }
        } else if !self.url.trim().is_empty() {
            JobState::AwaitingCookie
        } else {
            JobState::Empty
        }
    }

    /// `name=value` pairs of the stored cookie string restricted to `keys`.
    pub fn cookie_pairs<'a>(&'a self, keys: &[String]) -> Vec<(&'a str, &'a str)> {
        self.cookie
            .split("; ")
            .filter_map(|pair| pair.split_once('='))
            .map(|(name, value)| (name.trim(), value))
            .filter(|(name, _)| keys.iter().any(|key| key == name))
            .collect()
    }
}

/// Index of the first job in `state`.
pub fn first_in_state(jobs: &[JobRecord], state: JobState) -> Option<usize> {
    jobs.iter().position(|job| job.state() == state)
}
