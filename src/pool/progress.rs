//! Per-group progress accounting for the worker pool.

use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Receives one report per processed work item.
///
/// Called concurrently from every worker.
pub trait ProgressSink<K>: Send + Sync {
    /// An item of `group` completed.
    fn increment(&self, group: &K);

    /// An item of `group` failed with `error`.
    fn failed(&self, group: &K, error: &dyn fmt::Display) {
        let _ = (group, error);
    }
}

/// Discards all reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl<K> ProgressSink<K> for NoProgress {
    fn increment(&self, _group: &K) {}
}

#[derive(Debug, Default)]
struct GroupCount {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

/// Atomic completed/failed counters per group.
#[derive(Debug)]
pub struct GroupCounters<K: Eq + Hash> {
    groups: DashMap<K, GroupCount>,
}

impl<K: Eq + Hash> Default for GroupCounters<K> {
    fn default() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> GroupCounters<K> {
    /// Creates empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Completed items of `group`.
    #[must_use]
    pub fn completed(&self, group: &K) -> usize {
        self.groups
            .get(group)
            .map_or(0, |count| count.completed.load(Ordering::SeqCst))
    }

    /// Failed items of `group`.
    #[must_use]
    pub fn failures(&self, group: &K) -> usize {
        self.groups
            .get(group)
            .map_or(0, |count| count.failed.load(Ordering::SeqCst))
    }

    /// Groups that have seen at least one report.
    #[must_use]
    pub fn groups(&self) -> Vec<K> {
        self.groups.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl<K: Eq + Hash + Clone + Send + Sync> ProgressSink<K> for GroupCounters<K> {
    fn increment(&self, group: &K) {
        self.groups
            .entry(group.clone())
            .or_default()
            .completed
            .fetch_add(1, Ordering::SeqCst);
    }

    fn failed(&self, group: &K, _error: &dyn fmt::Display) {
        self.groups
            .entry(group.clone())
            .or_default()
            .failed
            .fetch_add(1, Ordering::SeqCst);
    }
}

const BAR_TEMPLATE: &str = "{prefix:>16} [{bar:40}] {pos}/{len} {msg}";

/// One terminal progress bar per group.
///
/// Register groups with their expected size up front; unregistered groups
/// get a bar without a length on first report.
#[derive(Debug)]
pub struct BarProgress<K: Eq + Hash> {
    multi: MultiProgress,
    bars: DashMap<K, (ProgressBar, AtomicUsize)>,
}

impl<K: Eq + Hash + Clone + fmt::Display> BarProgress<K> {
    /// Draws to stderr.
    #[must_use]
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    /// Draws nothing; for tests and non-interactive runs.
    #[must_use]
    pub fn hidden() -> Self {
        Self::with_draw_target(ProgressDrawTarget::hidden())
    }

    fn with_draw_target(target: ProgressDrawTarget) -> Self {
        Self {
            multi: MultiProgress::with_draw_target(target),
            bars: DashMap::new(),
        }
    }

    /// Adds a bar for `group` expecting `total` items.
    pub fn register(&self, group: K, total: u64) {
        let bar = self.multi.add(ProgressBar::new(total));
        bar.set_style(bar_style());
        bar.set_prefix(group.to_string());
        self.bars.insert(group, (bar, AtomicUsize::new(0)));
    }

    /// Position of the bar for `group`.
    #[must_use]
    pub fn position(&self, group: &K) -> u64 {
        self.bars.get(group).map_or(0, |entry| entry.0.position())
    }

    /// Failed items reported for `group`.
    #[must_use]
    pub fn failures(&self, group: &K) -> usize {
        self.bars
            .get(group)
            .map_or(0, |entry| entry.1.load(Ordering::SeqCst))
    }

    /// Groups that have a bar.
    #[must_use]
    pub fn groups(&self) -> Vec<K> {
        self.bars.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Finishes every bar, leaving the final state on screen.
    pub fn finish(&self) {
        for entry in self.bars.iter() {
            entry.value().0.finish();
        }
    }

    fn report(&self, group: &K, failed: bool) {
        let entry = self.bars.entry(group.clone()).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::no_length());
            bar.set_style(bar_style());
            bar.set_prefix(group.to_string());
            (bar, AtomicUsize::new(0))
        });
        let (bar, failures) = entry.value();
        if failed {
            let count = failures.fetch_add(1, Ordering::SeqCst) + 1;
            bar.set_message(format!("{count} failed"));
        }
        bar.inc(1);
    }
}

impl<K: Eq + Hash + Clone + fmt::Display> Default for BarProgress<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone + fmt::Display + Send + Sync> ProgressSink<K> for BarProgress<K> {
    fn increment(&self, group: &K) {
        self.report(group, false);
    }

    fn failed(&self, group: &K, _error: &dyn fmt::Display) {
        self.report(group, true);
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_counters_track_groups_independently() {
        let counters = GroupCounters::new();
        counters.increment(&"a");
        counters.increment(&"a");
        counters.failed(&"b", &"boom");
        assert_eq!(counters.completed(&"a"), 2);
        assert_eq!(counters.failures(&"a"), 0);
        assert_eq!(counters.failures(&"b"), 1);
        assert_eq!(counters.completed(&"missing"), 0);

        let mut groups = counters.groups();
        groups.sort_unstable();
        assert_eq!(groups, vec!["a", "b"]);
    }

    #[test]
    fn test_bar_progress_counts_registered_and_adhoc_groups() {
        let bars = BarProgress::hidden();
        bars.register("album-1".to_string(), 3);
        bars.increment(&"album-1".to_string());
        bars.failed(&"album-1".to_string(), &"timeout");
        bars.increment(&"wall".to_string());
        assert_eq!(bars.position(&"album-1".to_string()), 2);
        assert_eq!(bars.position(&"wall".to_string()), 1);
        assert_eq!(bars.failures(&"album-1".to_string()), 1);
        assert_eq!(bars.failures(&"wall".to_string()), 0);
        let mut groups = bars.groups();
        groups.sort_unstable();
        assert_eq!(groups, vec!["album-1".to_string(), "wall".to_string()]);
        bars.finish();
    }

    #[test]
    fn test_no_progress_accepts_anything() {
        let sink: &dyn ProgressSink<u32> = &NoProgress;
        sink.increment(&1);
        sink.failed(&1, &"ignored");
    }
}
