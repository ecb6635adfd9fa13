//! N+1 query detection for association loads.
//!
//! The preload resolver fetches each association once per tree level, for
//! the whole owner batch. When application code instead runs a preloading
//! query per owner (typically inside a loop), the same association is
//! fetched over and over. The tracker counts fetches per
//! `(owner table, association)` and warns once the count reaches a
//! threshold.
//!
//! # Example
//!
//! ```ignore
//! // Warns on the third iteration: every pass fetches "Subordinates" again.
//! for id in manager_ids {
//!     session
//!         .table("employee")
//!         .filter(Cond::eq("`id`", id))
//!         .preload(Preload::new("Subordinates"))
//!         .get()?;
//! }
//!
//! // One fetch for every manager at once.
//! session
//!     .table("employee")
//!     .filter(Cond::in_list("`id`", manager_ids))
//!     .preload(Preload::new("Subordinates"))
//!     .find()?;
//! ```

use std::collections::HashMap;

/// How many recent fetches are kept for the warning detail.
const RECENT_LIMIT: usize = 64;

/// Counts association fetches per `(owner table, association)`.
#[derive(Debug)]
pub struct N1QueryTracker {
    counts: HashMap<(&'static str, &'static str), usize>,
    threshold: usize,
    enabled: bool,
    recent: Vec<LoadEvent>,
}

impl Default for N1QueryTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// One association fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadEvent {
    /// Table declaring the association
    pub owner_table: &'static str,
    /// Association field name
    pub association: &'static str,
    /// Owner records the fetch covered
    pub owners: usize,
    /// Referenced records the fetch returned
    pub fetched: usize,
}

/// Summary of recorded fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct N1Stats {
    /// Total association fetches
    pub total_loads: usize,
    /// Distinct associations fetched
    pub associations_loaded: usize,
    /// Associations whose fetch count reached the threshold
    pub potential_n1: usize,
}

impl N1QueryTracker {
    /// A tracker with the default threshold of 3.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            threshold: 3,
            enabled: true,
            recent: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Record one fetch of `association` for a batch of `owners`.
    ///
    /// Warns when the count for the pair reaches the threshold. The warning
    /// fires once per pair until [`reset`](Self::reset).
    pub fn record_load(&mut self, event: LoadEvent) {
        if !self.enabled {
            return;
        }

        let key = (event.owner_table, event.association);
        let count = self.counts.entry(key).or_insert(0);
        *count += 1;
        let count = *count;

        if self.recent.len() == RECENT_LIMIT {
            self.recent.remove(0);
        }
        self.recent.push(event);

        if count == self.threshold {
            self.emit_warning(key, count);
        }
    }

    fn emit_warning(&self, (owner_table, association): (&'static str, &'static str), count: usize) {
        let single_owner = self
            .recent
            .iter()
            .filter(|e| e.owner_table == owner_table && e.association == association)
            .filter(|e| e.owners <= 1)
            .count();

        tracing::warn!(
            target: "rowmap::n1",
            owner_table,
            association,
            fetches = count,
            single_owner_fetches = single_owner,
            threshold = self.threshold,
            "N+1 query pattern: association fetched once per owner; preload the whole batch in one query"
        );
    }

    /// Forget all counts, e.g. at the start of a new request.
    pub fn reset(&mut self) {
        self.counts.clear();
        self.recent.clear();
    }

    /// Fetches recorded for one association.
    #[must_use]
    pub fn count_for(&self, owner_table: &str, association: &str) -> usize {
        self.counts
            .iter()
            .find(|((t, a), _)| *t == owner_table && *a == association)
            .map_or(0, |(_, n)| *n)
    }

    #[must_use]
    pub fn stats(&self) -> N1Stats {
        N1Stats {
            total_loads: self.counts.values().sum(),
            associations_loaded: self.counts.len(),
            potential_n1: self.counts.values().filter(|n| **n >= self.threshold).count(),
        }
    }

    /// The most recent fetches, oldest first.
    #[must_use]
    pub fn recent(&self) -> &[LoadEvent] {
        &self.recent
    }
}
