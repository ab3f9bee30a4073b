//! Exactly-once iteration over a cursor-based prefix scan
//!
//! A store scan may hand back the same key in more than one batch. The
//! helper here remembers every key it has seen so that the per-key action
//! runs once per distinct key, and reports the distinct count so callers can
//! tell "nothing matched" apart from "something matched and then failed".

use crate::store::KeyValueStore;
use crate::CoreError;
use std::collections::HashSet;
use std::future::Future;
use tracing::{debug, warn};

/// Keys requested per scan round trip
pub const SCAN_BATCH_SIZE: usize = 10;

/// Result of a scan-and-apply pass
#[derive(Debug)]
pub struct ScanOutcome<T> {
    /// Distinct keys visited
    pub visited: usize,
    /// Successful action results, in visit order
    pub values: Vec<T>,
    /// First failure, from either an action or the scan itself
    pub error: Option<CoreError>,
}

impl<T> ScanOutcome<T> {
    /// Turn the outcome into a plain result, dropping the count
    pub fn into_result(self) -> crate::Result<Vec<T>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.values),
        }
    }
}

/// Scan every key matching `pattern` and apply `action` to each distinct key.
///
/// Action failures are recorded (first one wins) and the scan continues. A
/// failure of the scan itself stops iteration immediately.
pub async fn scan_and_apply<T, F, Fut>(
    store: &dyn KeyValueStore,
    pattern: &str,
    mut action: F,
) -> ScanOutcome<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut values = Vec::new();
    let mut first_error: Option<CoreError> = None;
    let mut cursor = 0u64;

    loop {
        let batch = match store.scan(cursor, pattern, SCAN_BATCH_SIZE).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Scan of {} failed after {} keys: {}", pattern, seen.len(), e);
                return ScanOutcome {
                    visited: seen.len(),
                    values,
                    error: Some(e),
                };
            }
        };

        for key in batch.keys {
            if !seen.insert(key.clone()) {
                continue;
            }
            match action(key).await {
                Ok(value) => values.push(value),
                Err(e) => {
                    debug!("Action failed during scan of {}: {}", pattern, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        cursor = batch.cursor;
        if cursor == 0 {
            break;
        }
    }

    ScanOutcome {
        visited: seen.len(),
        values,
        error: first_error,
    }
}
