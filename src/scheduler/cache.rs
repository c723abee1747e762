//! Latest fetch result per target.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::probe::{decode_report, CheckSuiteReport, DecodeError, FetchError, Summary};

type ContentHash = [u8; 32];

enum Entry {
    Body {
        body: Bytes,
        hash: ContentHash,
        received_at: DateTime<Utc>,
    },
    Failed {
        error: FetchError,
        failed_at: DateTime<Utc>,
    },
}

/// A target's status as presented to consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckStatus {
    /// A fetch is in flight and nothing is cached yet.
    Pending,
    Ok {
        checked_at: DateTime<Utc>,
        summary: Summary,
        report: CheckSuiteReport,
    },
    /// The body arrived but did not decode.
    Invalid {
        checked_at: DateTime<Utc>,
        error: String,
    },
    Failed {
        checked_at: DateTime<Utc>,
        error: String,
        offline: bool,
        http_status: Option<u16>,
    },
}

/// Raw bodies keyed by target, with decodes memoized by content hash.
///
/// A decode is computed at most once per distinct body. Memoized decodes
/// are dropped once no entry holds a body with that hash.
#[derive(Default)]
pub struct StatusStore {
    entries: HashMap<Uuid, Entry>,
    decoded: HashMap<ContentHash, Result<CheckSuiteReport, DecodeError>>,
    decode_count: usize,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the entry for `id` ahead of a new fetch.
    pub fn start_check(&mut self, id: Uuid) {
        self.entries.remove(&id);
    }

    /// Store a freshly received body for `id`.
    pub fn complete_check(&mut self, id: Uuid, body: Bytes) {
        let hash: ContentHash = Sha256::digest(&body).into();
        self.entries.insert(
            id,
            Entry::Body {
                body,
                hash,
                received_at: Utc::now(),
            },
        );
        self.prune();
    }

    /// Record a fetch that produced no usable body.
    pub fn fail_check(&mut self, id: Uuid, error: FetchError) {
        self.entries.insert(
            id,
            Entry::Failed {
                error,
                failed_at: Utc::now(),
            },
        );
        self.prune();
    }

    /// Drop the entries for `ids`.
    pub fn remove(&mut self, ids: &HashSet<Uuid>) {
        self.entries.retain(|id, _| !ids.contains(id));
        self.prune();
    }

    /// The raw body last received for `id`.
    pub fn read(&self, id: &Uuid) -> Option<Bytes> {
        match self.entries.get(id)? {
            Entry::Body { body, .. } => Some(body.clone()),
            Entry::Failed { .. } => None,
        }
    }

    /// The failure recorded for `id`, if its last fetch failed.
    pub fn failure(&self, id: &Uuid) -> Option<&FetchError> {
        match self.entries.get(id)? {
            Entry::Failed { error, .. } => Some(error),
            Entry::Body { .. } => None,
        }
    }

    /// Decode the body cached for `id`, reusing an earlier decode of the same bytes.
    pub fn read_decoded(&mut self, id: &Uuid) -> Option<Result<CheckSuiteReport, DecodeError>> {
        let (body, hash) = match self.entries.get(id)? {
            Entry::Body { body, hash, .. } => (body, *hash),
            Entry::Failed { .. } => return None,
        };

        if !self.decoded.contains_key(&hash) {
            self.decode_count += 1;
            let result = decode_report(body);
            self.decoded.insert(hash, result);
        }
        self.decoded.get(&hash).cloned()
    }

    /// Consumer view of the entry for `id`.
    pub fn status(&mut self, id: &Uuid) -> Option<CheckStatus> {
        let checked_at = match self.entries.get(id)? {
            Entry::Failed { error, failed_at } => return Some(failure_status(error, *failed_at)),
            Entry::Body { received_at, .. } => *received_at,
        };

        Some(match self.read_decoded(id)? {
            Ok(report) => CheckStatus::Ok {
                checked_at,
                summary: report.summary(),
                report,
            },
            Err(e) => CheckStatus::Invalid {
                checked_at,
                error: e.to_string(),
            },
        })
    }

    /// Number of decodes performed so far.
    pub fn decode_count(&self) -> usize {
        self.decode_count
    }

    fn prune(&mut self) {
        let live: HashSet<ContentHash> = self
            .entries
            .values()
            .filter_map(|entry| match entry {
                Entry::Body { hash, .. } => Some(*hash),
                Entry::Failed { .. } => None,
            })
            .collect();
        self.decoded.retain(|hash, _| live.contains(hash));
    }
}

fn failure_status(error: &FetchError, checked_at: DateTime<Utc>) -> CheckStatus {
    let http_status = match error {
        FetchError::Http { status, .. } => Some(*status),
        _ => None,
    };
    CheckStatus::Failed {
        checked_at,
        error: error.to_string(),
        offline: error.is_offline(),
        http_status,
    }
}
