//! Duplicate detection for imported records.
//!
//! A candidate is a duplicate when it carries a stored identity that an
//! existing record also carries, or when its type-specific fingerprint
//! matches an existing record's. Fingerprints are a heuristic: records that
//! agree on the fingerprint fields but differ elsewhere still count as
//! duplicates, and imports never overwrite.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use std::hash::Hash;

use crate::records::*;

/// A record with a type-specific duplicate fingerprint.
pub trait Fingerprint: BackupRecord {
    type Key: Eq + Hash + Send + Sync;

    fn fingerprint(&self) -> Self::Key;
}

impl Fingerprint for Task {
    type Key = (String, Option<NaiveDateTime>, Option<i64>);

    fn fingerprint(&self) -> Self::Key {
        (self.title.clone(), self.due_date, self.category_id)
    }
}

impl Fingerprint for Course {
    type Key = (String, i64);

    fn fingerprint(&self) -> Self::Key {
        (self.name.clone(), self.semester_id)
    }
}

impl Fingerprint for Event {
    type Key = (String, NaiveDateTime);

    fn fingerprint(&self) -> Self::Key {
        (self.title.clone(), self.start_time)
    }
}

impl Fingerprint for Routine {
    type Key = (String, String);

    fn fingerprint(&self) -> Self::Key {
        let cycle = serde_json::to_string(&self.cycle).unwrap_or_default();
        (self.title.clone(), cycle)
    }
}

impl Fingerprint for Subscription {
    type Key = (String, NaiveDate);

    fn fingerprint(&self) -> Self::Key {
        (self.name.clone(), self.start_date)
    }
}

impl Fingerprint for TimerSession {
    type Key = (NaiveDateTime, u32, Option<i64>);

    fn fingerprint(&self) -> Self::Key {
        (self.start_time, self.duration_minutes, self.task_id)
    }
}

impl Fingerprint for Semester {
    type Key = (String, NaiveDate, NaiveDate);

    fn fingerprint(&self) -> Self::Key {
        (self.name.clone(), self.start_date, self.end_date)
    }
}

impl Fingerprint for Preference {
    type Key = String;

    fn fingerprint(&self) -> Self::Key {
        self.key.clone()
    }
}

/// Decide whether `candidate` already exists in `existing`.
pub fn is_duplicate<T: Fingerprint>(candidate: &T, existing: &[T]) -> bool {
    DuplicateOracle::new(existing).is_duplicate(candidate)
}

/// Index over a store snapshot answering duplicate queries.
///
/// Records accepted during an import are remembered, so a file that repeats
/// a record inserts it only once.
pub struct DuplicateOracle<T: Fingerprint> {
    identities: HashSet<i64>,
    fingerprints: HashSet<T::Key>,
}

impl<T: Fingerprint> DuplicateOracle<T> {
    pub fn new(existing: &[T]) -> Self {
        let mut oracle = DuplicateOracle {
            identities: HashSet::with_capacity(existing.len()),
            fingerprints: HashSet::with_capacity(existing.len()),
        };
        for record in existing {
            oracle.remember(record);
        }
        oracle
    }

    pub fn is_duplicate(&self, candidate: &T) -> bool {
        if let Some(id) = candidate.identity() {
            if self.identities.contains(&id) {
                return true;
            }
        }
        self.fingerprints.contains(&candidate.fingerprint())
    }

    pub fn remember(&mut self, record: &T) {
        if let Some(id) = record.identity() {
            self.identities.insert(id);
        }
        self.fingerprints.insert(record.fingerprint());
    }

    /// Split candidates into new records and a duplicate count.
    pub fn partition(&mut self, candidates: Vec<T>) -> (Vec<T>, usize) {
        let mut fresh = Vec::with_capacity(candidates.len());
        let mut duplicates = 0;
        for candidate in candidates {
            if self.is_duplicate(&candidate) {
                duplicates += 1;
            } else {
                self.remember(&candidate);
                fresh.push(candidate);
            }
        }
        (fresh, duplicates)
    }
}
