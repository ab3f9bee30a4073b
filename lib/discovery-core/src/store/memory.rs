//! In-process store with the same semantics as the Redis backend

use super::{KeyValueStore, ScanBatch, WriteOp};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

#[derive(Clone, Debug, Default)]
struct Entry {
    fields: HashMap<String, Vec<u8>>,
    expires_at: Option<Instant>,
    /// Creation order, used as the scan cursor
    seq: u64,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

/// MemoryStore keeps hashes in a map and expires them lazily.
///
/// Scans walk the matching keys in creation order and the cursor is one past
/// the last key returned, so keys deleted mid-scan never shift the cursor.
/// With [`MemoryStore::with_repeated_scan_keys`] each batch also repeats the
/// last key of the previous one, the way a Redis scan may return a key more
/// than once.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    repeat_scan_keys: bool,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repeated_scan_keys() -> Self {
        Self {
            repeat_scan_keys: true,
            ..Self::default()
        }
    }

    /// Remaining time to live of a key
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let inner = self.inner.read().await;
        inner
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|deadline| deadline - now)
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        let now = Instant::now();
        let inner = self.inner.read().await;
        inner.entries.get(key).map_or(false, |e| e.is_live(now))
    }

    /// Number of live keys
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let inner = self.inner.read().await;
        inner.entries.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn purge_expired(&self) {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.is_live(now));
        let purged = before - inner.entries.len();
        if purged > 0 {
            debug!("Expired {} keys", purged);
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn pipeline(&self, ops: Vec<WriteOp>) -> Result<()> {
        self.purge_expired().await;
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        let Inner { entries, next_seq } = &mut *inner;
        for op in ops {
            match op {
                WriteOp::HSet { key, field, value } => {
                    let entry = entries.entry(key).or_insert_with(|| {
                        *next_seq += 1;
                        Entry {
                            seq: *next_seq,
                            ..Entry::default()
                        }
                    });
                    entry.fields.insert(field, value);
                }
                WriteOp::Expire { key, ttl } => {
                    if let Some(entry) = entries.get_mut(&key) {
                        entry.expires_at = Some(now + ttl);
                    }
                }
            }
        }
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let inner = self.inner.read().await;
        Ok(inner
            .entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.fields.get(field).cloned()))
    }

    async fn del(&self, key: &str) -> Result<u64> {
        self.purge_expired().await;
        let mut inner = self.inner.write().await;
        Ok(inner.entries.remove(key).map_or(0, |_| 1))
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> Result<ScanBatch> {
        let now = Instant::now();
        let inner = self.inner.read().await;
        let mut matching: Vec<(u64, &String)> = inner
            .entries
            .iter()
            .filter(|(k, e)| e.is_live(now) && glob_match(pattern, k))
            .map(|(k, e)| (e.seq, k))
            .collect();
        matching.sort();

        let limit = count.max(1);
        let from = if self.repeat_scan_keys {
            cursor.saturating_sub(1)
        } else {
            cursor
        };
        let mut keys = Vec::new();
        let mut fresh = 0;
        let mut last_seq = None;
        let mut exhausted = true;
        for (seq, key) in matching {
            if seq < from {
                continue;
            }
            if fresh == limit {
                exhausted = false;
                break;
            }
            keys.push(key.clone());
            if seq >= cursor {
                fresh += 1;
                last_seq = Some(seq);
            }
        }

        let cursor = match (exhausted, last_seq) {
            (false, Some(seq)) => seq + 1,
            _ => 0,
        };
        Ok(ScanBatch { cursor, keys })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GlobToken {
    Star,
    One,
    Literal(char),
}

fn tokenize_glob(pattern: &str) -> Vec<GlobToken> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '*' => GlobToken::Star,
            '?' => GlobToken::One,
            '\\' => GlobToken::Literal(chars.next().unwrap_or('\\')),
            c => GlobToken::Literal(c),
        });
    }
    tokens
}

/// Match a key against a Redis-style glob supporting `*`, `?` and `\` escapes.
///
/// Iterative; on a mismatch it retries from the most recent `*` only.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let tokens = tokenize_glob(pattern);
    let key: Vec<char> = key.chars().collect();
    let (mut p, mut k) = (0, 0);
    // (token index of the last star, key index it currently absorbs up to)
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        match tokens.get(p) {
            Some(GlobToken::Star) => {
                backtrack = Some((p, k));
                p += 1;
                continue;
            }
            Some(GlobToken::One) => {
                p += 1;
                k += 1;
                continue;
            }
            Some(GlobToken::Literal(c)) if *c == key[k] => {
                p += 1;
                k += 1;
                continue;
            }
            _ => {}
        }
        match backtrack {
            Some((star, absorbed)) => {
                p = star + 1;
                k = absorbed + 1;
                backtrack = Some((star, absorbed + 1));
            }
            None => return false,
        }
    }

    tokens[p..].iter().all(|t| *t == GlobToken::Star)
}
