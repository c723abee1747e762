//! Target configuration model.

use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::probe::CheckSuite;

/// Lower bound for a target's poll interval, in seconds.
pub const MIN_CHECK_INTERVAL: f64 = 30.0;

/// Upper bound for a target's poll interval, in seconds.
pub const MAX_CHECK_INTERVAL: f64 = 86_400.0;

/// Placeholder title given to targets created without any fields.
pub const NEW_TARGET_TITLE: &str = "New Check";

const DEFAULT_BRANCH: &str = "main";

/// Read an optional field, folding `None` to `default`.
pub fn with_default<T: Clone>(value: &Option<T>, default: T) -> T {
    value.clone().unwrap_or(default)
}

/// Store a value, keeping `None` when it equals the default.
pub fn store_minimal<T: PartialEq>(value: T, default: &T) -> Option<T> {
    if &value == default {
        None
    } else {
        Some(value)
    }
}

/// Configuration for a single monitored repository branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConfig {
    id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_check_interval"
    )]
    check_interval: Option<f64>,
    /// Last-known suite, mirrored from the status cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CheckSuite>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetConfig {
    /// Create an empty target with a fresh identifier.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            enabled: None,
            title: None,
            org: None,
            repo: None,
            branch: None,
            check_interval: None,
            status: None,
        }
    }

    /// Create an empty target carrying the placeholder title.
    pub fn placeholder() -> Self {
        let mut config = Self::new();
        config.title = Some(NEW_TARGET_TITLE.to_string());
        config
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Rebind this record to `id`, keeping every other field.
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn enabled_defaulted(&self) -> bool {
        with_default(&self.enabled, false)
    }

    pub fn set_enabled_defaulted(&mut self, enabled: bool) {
        self.enabled = store_minimal(enabled, &false);
    }

    pub fn title_defaulted(&self) -> String {
        with_default(&self.title, String::new())
    }

    pub fn set_title_defaulted(&mut self, title: &str) {
        self.title = store_minimal(title.to_string(), &String::new());
    }

    pub fn set_org(&mut self, org: &str) {
        self.org = store_minimal(org.to_string(), &String::new());
    }

    pub fn set_repo(&mut self, repo: &str) {
        self.repo = store_minimal(repo.to_string(), &String::new());
    }

    pub fn set_branch(&mut self, branch: &str) {
        self.branch = store_minimal(branch.to_string(), &String::new());
    }

    /// Raw stored interval; finite and within bounds when present.
    pub fn check_interval(&self) -> Option<f64> {
        self.check_interval
    }

    /// The poll interval in seconds, between [`MIN_CHECK_INTERVAL`] and [`MAX_CHECK_INTERVAL`].
    pub fn check_interval_defaulted(&self) -> f64 {
        with_default(&self.check_interval, MIN_CHECK_INTERVAL)
            .clamp(MIN_CHECK_INTERVAL, MAX_CHECK_INTERVAL)
    }

    pub fn set_check_interval_defaulted(&mut self, seconds: f64) {
        self.check_interval = clamp_interval(seconds);
    }

    /// Display label: the title, else `org/repo/branch` with absent parts skipped.
    pub fn display_title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }

        [&self.org, &self.repo, &self.branch]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Whether a check-suites URL can be derived for this target.
    pub fn is_fetchable(&self) -> bool {
        self.org.is_some()
    }

    /// Build `{base}/repos/{org}/{repo}/commits/{branch}/check-suites`.
    ///
    /// `repo` falls back to `org` and `branch` to `main`. Returns `None`
    /// when `org` is absent or `base` cannot carry a path.
    pub fn service_url(&self, base: &Url) -> Option<Url> {
        let org = self.org.as_deref()?;
        let repo = self.repo.as_deref().unwrap_or(org);
        let branch = self.branch.as_deref().unwrap_or(DEFAULT_BRANCH);

        let mut url = base.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(["repos", org, repo, "commits", branch, "check-suites"]);
        Some(url)
    }
}

// Non-finite input does not survive a JSON round trip, so it reads as the default
fn clamp_interval(seconds: f64) -> Option<f64> {
    if !seconds.is_finite() {
        return None;
    }
    store_minimal(
        seconds.clamp(MIN_CHECK_INTERVAL, MAX_CHECK_INTERVAL),
        &MIN_CHECK_INTERVAL,
    )
}

fn deserialize_check_interval<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let stored = Option::<f64>::deserialize(deserializer)?;
    Ok(stored.and_then(clamp_interval))
}
