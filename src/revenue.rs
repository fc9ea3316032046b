//! Revenue views: tenant-scoped and party-scoped aggregations with explicit
//! time bucketing (C7).
//!
//! Grounded on the teacher's calendar-bucket helpers in its reporting
//! layer: `chrono` does the calendar math, never the current time — every
//! bucket key is derived from a stored `timestamp`, never from "now".

use crate::ids::{AgentId, ClubId, EntrySource, HandId, TableId};
use crate::store::{Entry, LedgerStore};
use crate::view::TimeWindow;
use chrono::{DateTime, Datelike, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
}

impl Granularity {
    /// Deterministic bucket key derived from a millisecond timestamp,
    /// `spec.md §4.7`: `YYYY-MM-DDTHH`, `YYYY-MM-DD`, `W<...>`, `YYYY-MM`.
    pub fn bucket_key(&self, timestamp_ms: i64) -> String {
        let dt: DateTime<Utc> = DateTime::from_timestamp_millis(timestamp_ms).unwrap_or_default();
        match self {
            Granularity::Hour => dt.format("%Y-%m-%dT%H").to_string(),
            Granularity::Day => dt.format("%Y-%m-%d").to_string(),
            Granularity::Week => {
                let week_start = dt.date_naive() - chrono::Duration::days(dt.weekday().num_days_from_monday() as i64);
                format!("W{}", week_start.format("%Y-%m-%d"))
            }
            Granularity::Month => dt.format("%Y-%m").to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Table,
    Club,
    Time(Granularity),
    Source,
}

fn group_key(entry: &Entry, group_by: GroupBy) -> String {
    match group_by {
        GroupBy::Table => entry.table_id.as_ref().map(|t| t.to_string()).unwrap_or_default(),
        GroupBy::Club => entry.club_id.as_ref().map(|c| c.to_string()).unwrap_or_default(),
        GroupBy::Time(granularity) => granularity.bucket_key(entry.timestamp),
        GroupBy::Source => entry.source.as_str().to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RevenueGroup {
    pub key: String,
    pub total: i64,
    pub entry_count: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlatformRevenueSummary {
    pub total: i64,
    pub by_source: BTreeMap<&'static str, i64>,
    pub groups: Vec<RevenueGroup>,
}

pub struct PlatformRevenueView<'a> {
    store: &'a LedgerStore,
}

impl<'a> PlatformRevenueView<'a> {
    pub fn new(store: &'a LedgerStore) -> Self {
        Self { store }
    }

    /// Every recognised source is zero-initialised in `by_source`, groups
    /// sorted lexicographically by key, `(timestamp, entry_id)` as the
    /// secondary order within a group.
    pub fn summarize(&self, group_by: Option<GroupBy>, window: TimeWindow) -> PlatformRevenueSummary {
        let mut by_source: BTreeMap<&'static str, i64> = EntrySource::ALL.iter().map(|s| (s.as_str(), 0)).collect();
        let mut total = 0i64;
        let mut groups: BTreeMap<String, RevenueGroup> = BTreeMap::new();

        let mut matching: Vec<&Entry> = self
            .store
            .get_all_entries()
            .iter()
            .filter(|e| matches!(&e.affected_party, crate::ids::AttributedParty::Platform(_)) && window.contains(e.timestamp))
            .collect();
        matching.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.entry_id.cmp(&b.entry_id)));

        for entry in matching {
            total += entry.delta;
            *by_source.entry(entry.source.as_str()).or_insert(0) += entry.delta;
            if let Some(gb) = group_by {
                let key = group_key(entry, gb);
                let group = groups.entry(key.clone()).or_insert_with(|| RevenueGroup { key, total: 0, entry_count: 0 });
                group.total += entry.delta;
                group.entry_count += 1;
            }
        }

        PlatformRevenueSummary {
            total,
            by_source,
            groups: groups.into_values().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClubRevenueSummary {
    pub total_rake: i64,
    pub total_time_fees: i64,
    pub total_other: i64,
    pub groups: Vec<RevenueGroup>,
}

pub struct ClubRevenueView<'a> {
    store: &'a LedgerStore,
    club_id: ClubId,
}

impl<'a> ClubRevenueView<'a> {
    pub fn new(store: &'a LedgerStore, club_id: ClubId) -> Self {
        Self { store, club_id }
    }

    /// Must return nothing not owned by this club, `spec.md §4.7`.
    /// `total_rake` folds both `RAKE` and `RAKE_SHARE_CLUB` — see the
    /// double-counting design note in `spec.md §9`: this view's
    /// `total_rake` and `LedgerView::club_summary`'s
    /// `total_rake_collected` are deliberately different sums over the
    /// same entries, documented here so the two are never conflated.
    pub fn summarize(&self, group_by: Option<GroupBy>, window: TimeWindow) -> ClubRevenueSummary {
        let mut summary = ClubRevenueSummary::default();
        let mut groups: BTreeMap<String, RevenueGroup> = BTreeMap::new();

        for entry in self.store.get_all_entries() {
            if !window.contains(entry.timestamp) {
                continue;
            }
            let owned_by_club = entry.club_id.as_ref() == Some(&self.club_id)
                || matches!(&entry.affected_party, crate::ids::AttributedParty::Club(id) if id == &self.club_id);
            if !owned_by_club {
                continue;
            }

            use crate::ids::SettlementCategory::{Rake, RakeShareClub};
            let bucket = match (entry.source, entry.category) {
                (EntrySource::HandSettlement, Some(Rake | RakeShareClub)) => &mut summary.total_rake,
                (EntrySource::TimeFee, _) if entry.delta > 0 => &mut summary.total_time_fees,
                _ => &mut summary.total_other,
            };
            *bucket += entry.delta;

            if let Some(gb) = group_by {
                let key = group_key(entry, gb);
                let group = groups.entry(key.clone()).or_insert_with(|| RevenueGroup { key, total: 0, entry_count: 0 });
                group.total += entry.delta;
                group.entry_count += 1;
            }
        }

        summary.groups = groups.into_values().collect();
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AgentCommissionSummary {
    pub total_commission: i64,
    pub per_agent: BTreeMap<String, i64>,
}

pub struct AgentCommissionView<'a> {
    store: &'a LedgerStore,
}

impl<'a> AgentCommissionView<'a> {
    pub fn new(store: &'a LedgerStore) -> Self {
        Self { store }
    }

    pub fn for_agent(&self, agent_id: &AgentId, window: TimeWindow) -> i64 {
        self.store
            .get_all_entries()
            .iter()
            .filter(|e| matches!(&e.affected_party, crate::ids::AttributedParty::Agent(id) if id == agent_id) && window.contains(e.timestamp))
            .map(|e| e.delta)
            .sum()
    }

    /// All-agents rollup, summing per-agent totals non-recursively — no
    /// hierarchical agent chains, `spec.md §4.7`. Sorted by agent id
    /// because the backing map is a `BTreeMap`.
    pub fn rollup(&self, window: TimeWindow) -> AgentCommissionSummary {
        let mut per_agent: BTreeMap<String, i64> = BTreeMap::new();
        for entry in self.store.get_all_entries() {
            if !window.contains(entry.timestamp) {
                continue;
            }
            if let crate::ids::AttributedParty::Agent(agent_id) = &entry.affected_party {
                *per_agent.entry(agent_id.to_string()).or_insert(0) += entry.delta;
            }
        }
        let total_commission = per_agent.values().sum();
        AgentCommissionSummary { total_commission, per_agent }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RakeBreakdownTotals {
    pub club_share: i64,
    pub agent_share: i64,
    pub platform_share: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub entry_id: String,
    pub timestamp: i64,
    pub hand_id: String,
    pub state_version: String,
    pub rake_amount: i64,
    pub breakdown: Option<RakeBreakdownTotals>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineComparison {
    pub matches: bool,
    pub entry_count: usize,
    pub matching_entries: usize,
    pub first_difference_at: Option<usize>,
    pub differences: Vec<String>,
}

pub struct TableRakeTimelineView<'a> {
    store: &'a LedgerStore,
}

impl<'a> TableRakeTimelineView<'a> {
    pub fn new(store: &'a LedgerStore) -> Self {
        Self { store }
    }

    /// Groups rake-category entries by `hand_id`, one timeline entry per
    /// hand with the earliest `entry_id`/`timestamp`, `spec.md §4.7`.
    pub fn timeline(&self, table_id: &TableId, window: TimeWindow) -> Vec<TimelineEntry> {
        use crate::ids::SettlementCategory::{Rake, RakeShareAgent, RakeShareClub, RakeSharePlatform};

        let mut by_hand: BTreeMap<HandId, Vec<&Entry>> = BTreeMap::new();
        for entry in self.store.get_all_entries() {
            if entry.source != EntrySource::HandSettlement || !window.contains(entry.timestamp) {
                continue;
            }
            if entry.table_id.as_ref() != Some(table_id) {
                continue;
            }
            if !matches!(entry.category, Some(Rake | RakeShareAgent | RakeSharePlatform | RakeShareClub)) {
                continue;
            }
            if let Some(hand_id) = &entry.hand_id {
                by_hand.entry(hand_id.clone()).or_default().push(entry);
            }
        }

        let mut timeline = Vec::new();
        for (hand_id, mut entries) in by_hand {
            entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.entry_id.cmp(&b.entry_id)));
            let first = entries[0];
            let rake_amount = entries
                .iter()
                .find(|e| e.category == Some(Rake))
                .map(|e| e.delta)
                .unwrap_or(0);

            let mut breakdown = RakeBreakdownTotals::default();
            let mut has_breakdown = false;
            for entry in &entries {
                match entry.category {
                    Some(RakeShareClub) => {
                        breakdown.club_share += entry.delta;
                        has_breakdown = true;
                    }
                    Some(RakeShareAgent) => {
                        breakdown.agent_share += entry.delta;
                        has_breakdown = true;
                    }
                    Some(RakeSharePlatform) => {
                        breakdown.platform_share += entry.delta;
                        has_breakdown = true;
                    }
                    _ => {}
                }
            }

            timeline.push(TimelineEntry {
                entry_id: first.entry_id.to_string(),
                timestamp: first.timestamp,
                hand_id: hand_id.to_string(),
                state_version: first.state_version.to_string(),
                rake_amount,
                breakdown: has_breakdown.then_some(breakdown),
            });
        }
        timeline
    }

    /// Re-derives a timeline for the same table/window and diffs it
    /// against `timeline`, the substrate for replay verification,
    /// `spec.md §4.7`/§8 property 9.
    pub fn verify_timeline(&self, table_id: &TableId, window: TimeWindow, timeline: &[TimelineEntry]) -> TimelineComparison {
        let rederived = self.timeline(table_id, window);
        Self::compare_timelines(&rederived, timeline)
    }

    pub fn compare_timelines(t1: &[TimelineEntry], t2: &[TimelineEntry]) -> TimelineComparison {
        let entry_count = t1.len().max(t2.len());
        let mut matching_entries = 0;
        let mut first_difference_at = None;
        let mut differences = Vec::new();

        for idx in 0..entry_count {
            match (t1.get(idx), t2.get(idx)) {
                (Some(a), Some(b)) if a == b => matching_entries += 1,
                (Some(a), Some(b)) => {
                    differences.push(format!("hand {} differs from {}", a.hand_id, b.hand_id));
                    first_difference_at.get_or_insert(idx);
                }
                _ => {
                    differences.push(format!("timeline length mismatch at index {}", idx));
                    first_difference_at.get_or_insert(idx);
                }
            }
        }

        TimelineComparison {
            matches: differences.is_empty(),
            entry_count,
            matching_entries,
            first_difference_at,
            differences,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::StateVersion;
    use crate::recorder::{PotWinner, RakeBreakdown, Recorder, RecorderConfig, SettlementAttribution};
    use crate::store::{StoreConfig, SteppingClock};

    fn store_with_settlement() -> LedgerStore {
        let mut store = LedgerStore::new(StoreConfig::default());
        let mut recorder = Recorder::new(RecorderConfig::default());
        let clock = SteppingClock::starting_at(1_700_000_000_000, 1);
        recorder
            .record_settlement(
                &mut store,
                SettlementAttribution {
                    hand_id: HandId::new("h1"),
                    table_id: TableId::new("t1"),
                    club_id: ClubId::new("c1"),
                    state_version: StateVersion::new("v1"),
                    pot_winners: vec![PotWinner { player_id: crate::ids::PlayerId::new("p1"), amount: 90, pot_type: "main".to_string() }],
                    rake_total: 10,
                    rake_breakdown: Some(RakeBreakdown {
                        club_share: 7,
                        platform_share: 1,
                        agent_share: Some(2),
                        agent_id: Some(AgentId::new("a1")),
                    }),
                    uncalled_returns: Vec::new(),
                },
                &clock,
            )
            .unwrap();
        store
    }

    #[test]
    fn club_revenue_only_sees_own_club() {
        let store = store_with_settlement();
        let view = ClubRevenueView::new(&store, ClubId::new("c1"));
        let summary = view.summarize(None, TimeWindow::ALL);
        assert_eq!(summary.total_rake, 10 + 7);

        let other = ClubRevenueView::new(&store, ClubId::new("c2"));
        let other_summary = other.summarize(None, TimeWindow::ALL);
        assert_eq!(other_summary.total_rake, 0);
        assert_eq!(other_summary.total_other, 0);
    }

    #[test]
    fn agent_rollup_sums_non_recursively() {
        let store = store_with_settlement();
        let view = AgentCommissionView::new(&store);
        let rollup = view.rollup(TimeWindow::ALL);
        assert_eq!(rollup.per_agent.get("a1"), Some(&2));
        assert_eq!(rollup.total_commission, 2);
    }

    #[test]
    fn timeline_round_trips_through_verify() {
        let store = store_with_settlement();
        let view = TableRakeTimelineView::new(&store);
        let timeline = view.timeline(&TableId::new("t1"), TimeWindow::ALL);
        let comparison = view.verify_timeline(&TableId::new("t1"), TimeWindow::ALL, &timeline);
        assert!(comparison.matches);
    }
}
