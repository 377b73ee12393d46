// src/tracker.rs
//! Per-source incremental selection of feed entries.
//!
//! A source with no persisted entries is in its bootstrap state and only the
//! newest entry is taken, so first contact with a channel never backfills its
//! whole history. After that, an entry is new when its id was never stored
//! and it was published strictly after the newest stored entry. The number
//! of entries taken per cycle is capped; survivors are returned oldest-first
//! so downstream summaries read in publish order.

use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::model::{RawFeedEntry, Source};

pub const DEFAULT_MAX_NEW_PER_CYCLE: usize = 5;

/// The read side of the state store that selection needs.
#[async_trait::async_trait]
pub trait StateQuery: Send + Sync {
    async fn entry_exists(&self, entry_id: &str) -> Result<bool>;
    async fn latest_timestamp_for_source(&self, source_name: &str) -> Result<Option<DateTime<Utc>>>;
    async fn is_source_bootstrap(&self, source_name: &str) -> Result<bool>;
}

#[derive(Debug, Clone, Copy)]
pub struct Tracker {
    max_new_per_cycle: usize,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NEW_PER_CYCLE)
    }
}

impl Tracker {
    /// A cap of 0 is treated as 1.
    pub fn new(max_new_per_cycle: usize) -> Self {
        Self {
            max_new_per_cycle: max_new_per_cycle.max(1),
        }
    }

    pub fn max_new_per_cycle(&self) -> usize {
        self.max_new_per_cycle
    }

    /// Decide which of `entries` to process for `source`, in processing order.
    pub async fn select<Q: StateQuery + ?Sized>(
        &self,
        entries: &[RawFeedEntry],
        source: &Source,
        state: &Q,
    ) -> Result<Vec<RawFeedEntry>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let bootstrap = state.is_source_bootstrap(&source.name).await?;
        if bootstrap {
            return Ok(self.select_pure(entries, true, None, &HashSet::new()));
        }

        let last_max = state.latest_timestamp_for_source(&source.name).await?;
        let mut seen = HashSet::new();
        for e in entries {
            if state.entry_exists(&e.id).await? {
                seen.insert(e.id.clone());
            }
        }
        Ok(self.select_pure(entries, false, last_max, &seen))
    }

    /// Side-effect-free core of [`Tracker::select`].
    pub fn select_pure(
        &self,
        entries: &[RawFeedEntry],
        bootstrap: bool,
        last_max: Option<DateTime<Utc>>,
        seen: &HashSet<String>,
    ) -> Vec<RawFeedEntry> {
        // Newest-first; stable so equal timestamps keep feed order.
        let mut newest_first: Vec<(usize, &RawFeedEntry, DateTime<Utc>)> = entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.published_at().map(|t| (i, e, t)))
            .collect();
        newest_first.sort_by(|a, b| b.2.cmp(&a.2));

        if bootstrap {
            return match newest_first.first() {
                Some((_, e, _)) => vec![(*e).clone()],
                // No parseable timestamp at all: the feed's own first item.
                None => entries.first().cloned().into_iter().collect(),
            };
        }

        let mut picked: Vec<(usize, &RawFeedEntry, DateTime<Utc>)> = Vec::new();
        for (i, e, ts) in newest_first {
            if picked.len() >= self.max_new_per_cycle {
                break;
            }
            // a feed that repeats an id must not yield it twice
            if seen.contains(&e.id) || picked.iter().any(|(_, p, _)| p.id == e.id) {
                continue;
            }
            if let Some(max) = last_max {
                if ts <= max {
                    continue;
                }
            }
            picked.push((i, e, ts));
        }

        // Oldest-first for processing; ties in feed order.
        picked.sort_by(|a, b| a.2.cmp(&b.2).then(a.0.cmp(&b.0)));
        picked.into_iter().map(|(_, e, _)| e.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(id: &str, ts: &str) -> RawFeedEntry {
        RawFeedEntry {
            id: id.into(),
            title: format!("title {id}"),
            published: ts.into(),
            description: String::new(),
            link: None,
        }
    }

    #[test]
    fn bootstrap_without_any_timestamp_takes_first_feed_item() {
        let t = Tracker::default();
        let out = t.select_pure(&[e("a", "junk"), e("b", "")], true, None, &HashSet::new());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, "a");
    }

    #[test]
    fn repeated_ids_are_returned_once() {
        let t = Tracker::default();
        let entries = [
            e("a", "2024-01-02T00:00:00Z"),
            e("a", "2024-01-02T00:00:00Z"),
        ];
        let out = t.select_pure(&entries, false, None, &HashSet::new());
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn zero_cap_is_clamped() {
        assert_eq!(Tracker::new(0).max_new_per_cycle(), 1);
    }
}
