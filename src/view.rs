//! Read-only query & aggregation layer (C4).
//!
//! `LedgerView` only ever borrows the store (`&'a LedgerStore`), the same
//! read-only-reference shape the teacher's reporting code takes over a
//! `&Ledger`. Every aggregation here is a single pass over the filtered
//! entry set per call — no caching, because replay determinism matters more
//! than query speed at this layer.

use crate::ids::{AgentId, AttributedParty, ClubId, EntrySource, HandId, PartyType, PlayerId, SettlementCategory, TableId};
use crate::store::{Entry, LedgerStore};
use std::collections::BTreeMap;

/// `[from_timestamp, to_timestamp]`, inclusive. `TimeWindow::ALL` spans all
/// time (the "undefined window" case from `spec.md §4.7`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from_timestamp: i64,
    pub to_timestamp: i64,
}

impl TimeWindow {
    pub const ALL: TimeWindow = TimeWindow {
        from_timestamp: i64::MIN,
        to_timestamp: i64::MAX,
    };

    pub fn new(from_timestamp: i64, to_timestamp: i64) -> Self {
        Self { from_timestamp, to_timestamp }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.from_timestamp && timestamp <= self.to_timestamp
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        TimeWindow::ALL
    }
}

/// AND-conjunctive filter set for [`LedgerView::query`].
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    pub party_type: Option<PartyType>,
    pub player_id: Option<PlayerId>,
    pub club_id: Option<ClubId>,
    pub agent_id: Option<AgentId>,
    pub table_id: Option<TableId>,
    pub hand_id: Option<HandId>,
    pub source: Option<EntrySource>,
    pub category: Option<SettlementCategory>,
    pub from_timestamp: Option<i64>,
    pub to_timestamp: Option<i64>,
    pub from_sequence: Option<u64>,
    pub to_sequence: Option<u64>,
    pub batch_id: Option<crate::ids::LedgerBatchId>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl QueryParams {
    fn matches(&self, entry: &Entry) -> bool {
        if let Some(pt) = self.party_type {
            if entry.affected_party.party_type() != pt {
                return false;
            }
        }
        if let Some(player_id) = &self.player_id {
            match &entry.affected_party {
                AttributedParty::Player(id) if id == player_id => {}
                _ => return false,
            }
        }
        if let Some(club_id) = &self.club_id {
            let matches_context = entry.club_id.as_ref() == Some(club_id);
            let matches_party = matches!(&entry.affected_party, AttributedParty::Club(id) if id == club_id);
            if !(matches_context || matches_party) {
                return false;
            }
        }
        if let Some(agent_id) = &self.agent_id {
            match &entry.affected_party {
                AttributedParty::Agent(id) if id == agent_id => {}
                _ => return false,
            }
        }
        if let Some(table_id) = &self.table_id {
            if entry.table_id.as_ref() != Some(table_id) {
                return false;
            }
        }
        if let Some(hand_id) = &self.hand_id {
            if entry.hand_id.as_ref() != Some(hand_id) {
                return false;
            }
        }
        if let Some(source) = self.source {
            if entry.source != source {
                return false;
            }
        }
        if let Some(category) = self.category {
            if entry.category != Some(category) {
                return false;
            }
        }
        if let Some(from) = self.from_timestamp {
            if entry.timestamp < from {
                return false;
            }
        }
        if let Some(to) = self.to_timestamp {
            if entry.timestamp > to {
                return false;
            }
        }
        if let Some(from) = self.from_sequence {
            if entry.sequence < from {
                return false;
            }
        }
        if let Some(to) = self.to_sequence {
            if entry.sequence > to {
                return false;
            }
        }
        if let Some(batch_id) = &self.batch_id {
            if entry.batch_id.as_ref() != Some(batch_id) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartySummary {
    pub total_credit: i64,
    pub total_debit: i64,
    pub net_attribution: i64,
    pub entry_count: u64,
    pub observed_from: Option<i64>,
    pub observed_to: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableSummary {
    pub total_pot_winnings: i64,
    pub total_rake: i64,
    pub rake_by_party: BTreeMap<String, i64>,
    pub unique_hands: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClubSummary {
    pub total_rake_collected: i64,
    pub total_time_fees: i64,
    pub agent_commissions: BTreeMap<String, i64>,
    pub platform_share: i64,
    pub net_club_revenue: i64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AgentSummary {
    pub total_commission: i64,
    pub per_club: BTreeMap<String, i64>,
    pub unique_hand_count: u64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HandAnalysis {
    pub per_player: BTreeMap<String, i64>,
    pub per_club: BTreeMap<String, i64>,
    pub per_agent: BTreeMap<String, i64>,
    pub platform: i64,
    pub net_balance: i64,
}

/// A flattened row for reporting export.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub entry_id: String,
    pub sequence: u64,
    pub timestamp: i64,
    pub source: &'static str,
    pub category: Option<&'static str>,
    pub party_key: String,
    pub delta: i64,
    pub table_id: Option<String>,
    pub hand_id: Option<String>,
    pub club_id: Option<String>,
    pub batch_id: Option<String>,
    pub description: String,
}

pub struct LedgerView<'a> {
    store: &'a LedgerStore,
}

impl<'a> LedgerView<'a> {
    pub fn new(store: &'a LedgerStore) -> Self {
        Self { store }
    }

    /// Matches are returned in store order (append/sequence order), per
    /// `spec.md §4.4`. The `(timestamp, entry_id)` secondary ordering from
    /// `spec.md §4.2`/`§4.7` is for derived views (e.g. the revenue reports),
    /// not for this query — and `entry_id` sorts as a raw string anyway
    /// (`"lent_<ms>_<counter>"`), so it isn't even a valid timestamp
    /// tie-break once a counter crosses a digit width within one millisecond.
    pub fn query(&self, params: &QueryParams) -> Vec<&'a Entry> {
        let matched: Vec<&Entry> = self
            .store
            .get_all_entries()
            .iter()
            .filter(|e| params.matches(e))
            .collect();
        let offset = params.offset.unwrap_or(0);
        if offset >= matched.len() {
            return Vec::new();
        }
        let matched = &matched[offset..];
        match params.limit {
            Some(limit) => matched[..limit.min(matched.len())].to_vec(),
            None => matched.to_vec(),
        }
    }

    fn in_window(entry: &Entry, window: TimeWindow) -> bool {
        window.contains(entry.timestamp)
    }

    pub fn party_summary(&self, party: &AttributedParty, window: TimeWindow) -> PartySummary {
        let mut total_credit = 0i64;
        let mut total_debit = 0i64;
        let mut entry_count = 0u64;
        let mut observed_from = None;
        let mut observed_to = None;

        for entry in self.store.get_all_entries() {
            if &entry.affected_party != party || !Self::in_window(entry, window) {
                continue;
            }
            if entry.delta >= 0 {
                total_credit += entry.delta;
            } else {
                total_debit += entry.delta;
            }
            entry_count += 1;
            observed_from = Some(observed_from.map_or(entry.timestamp, |v: i64| v.min(entry.timestamp)));
            observed_to = Some(observed_to.map_or(entry.timestamp, |v: i64| v.max(entry.timestamp)));
        }

        PartySummary {
            total_credit,
            total_debit,
            net_attribution: total_credit + total_debit,
            entry_count,
            observed_from,
            observed_to,
        }
    }

    pub fn table_summary(&self, table_id: &TableId, window: TimeWindow) -> TableSummary {
        let mut summary = TableSummary::default();
        let mut hands = std::collections::HashSet::new();

        for entry in self.store.get_all_entries() {
            if entry.source != EntrySource::HandSettlement {
                continue;
            }
            if entry.table_id.as_ref() != Some(table_id) || !Self::in_window(entry, window) {
                continue;
            }
            if let Some(hand_id) = &entry.hand_id {
                hands.insert(hand_id.clone());
            }
            match entry.category {
                Some(SettlementCategory::PotWin) => summary.total_pot_winnings += entry.delta,
                Some(SettlementCategory::Rake) => summary.total_rake += entry.delta,
                Some(
                    SettlementCategory::RakeShareClub
                    | SettlementCategory::RakeShareAgent
                    | SettlementCategory::RakeSharePlatform,
                ) => {
                    *summary.rake_by_party.entry(entry.affected_party.key()).or_insert(0) += entry.delta;
                }
                _ => {}
            }
        }
        summary.unique_hands = hands.len() as u64;
        summary
    }

    /// Club revenue per `spec.md §4.4`. `net_club_revenue` consumes `RAKE`
    /// and `TIME_FEE` credits exactly once each — see the double-counting
    /// design note in `spec.md §9` for why `RAKE_SHARE_CLUB` is tracked
    /// separately by the revenue view rather than folded in here.
    pub fn club_summary(&self, club_id: &ClubId, window: TimeWindow) -> ClubSummary {
        let mut summary = ClubSummary::default();

        for entry in self.store.get_all_entries() {
            if !Self::in_window(entry, window) {
                continue;
            }
            match entry.source {
                EntrySource::HandSettlement => {
                    if entry.club_id.as_ref() != Some(club_id) {
                        continue;
                    }
                    match entry.category {
                        Some(SettlementCategory::Rake) => summary.total_rake_collected += entry.delta,
                        Some(SettlementCategory::RakeShareAgent) => {
                            if let AttributedParty::Agent(agent_id) = &entry.affected_party {
                                *summary.agent_commissions.entry(agent_id.to_string()).or_insert(0) += entry.delta;
                            }
                        }
                        Some(SettlementCategory::RakeSharePlatform) => {
                            summary.platform_share += entry.delta;
                        }
                        _ => {}
                    }
                }
                EntrySource::TimeFee => {
                    if matches!(&entry.affected_party, AttributedParty::Club(id) if id == club_id) && entry.delta > 0 {
                        summary.total_time_fees += entry.delta;
                    }
                }
                _ => {}
            }
        }

        let total_agent_commission: i64 = summary.agent_commissions.values().sum();
        summary.net_club_revenue =
            summary.total_rake_collected + summary.total_time_fees - total_agent_commission - summary.platform_share;
        summary
    }

    pub fn agent_summary(&self, agent_id: &AgentId, window: TimeWindow) -> AgentSummary {
        let mut summary = AgentSummary::default();
        let mut hands = std::collections::HashSet::new();

        for entry in self.store.get_all_entries() {
            if !Self::in_window(entry, window) {
                continue;
            }
            if !matches!(&entry.affected_party, AttributedParty::Agent(id) if id == agent_id) {
                continue;
            }
            summary.total_commission += entry.delta;
            if let Some(club_id) = &entry.club_id {
                *summary.per_club.entry(club_id.to_string()).or_insert(0) += entry.delta;
            }
            if let Some(hand_id) = &entry.hand_id {
                hands.insert(hand_id.clone());
            }
        }
        summary.unique_hand_count = hands.len() as u64;
        summary
    }

    pub fn analyze_hand(&self, hand_id: &HandId) -> HandAnalysis {
        let mut analysis = HandAnalysis::default();

        for entry in self.store.get_all_entries() {
            if entry.hand_id.as_ref() != Some(hand_id) {
                continue;
            }
            analysis.net_balance += entry.delta;
            match &entry.affected_party {
                AttributedParty::Player(id) => {
                    *analysis.per_player.entry(id.to_string()).or_insert(0) += entry.delta;
                }
                AttributedParty::Club(id) => {
                    *analysis.per_club.entry(id.to_string()).or_insert(0) += entry.delta;
                }
                AttributedParty::Agent(id) => {
                    *analysis.per_agent.entry(id.to_string()).or_insert(0) += entry.delta;
                }
                AttributedParty::Platform(_) => {
                    analysis.platform += entry.delta;
                }
            }
        }
        analysis
    }

    pub fn export_for_reporting(&self, params: &QueryParams) -> Vec<ReportRow> {
        self.query(params)
            .into_iter()
            .map(|entry| ReportRow {
                entry_id: entry.entry_id.to_string(),
                sequence: entry.sequence,
                timestamp: entry.timestamp,
                source: entry.source.as_str(),
                category: entry.category.map(|c| c.as_str()),
                party_key: entry.affected_party.key(),
                delta: entry.delta,
                table_id: entry.table_id.as_ref().map(|t| t.to_string()),
                hand_id: entry.hand_id.as_ref().map(|t| t.to_string()),
                club_id: entry.club_id.as_ref().map(|t| t.to_string()),
                batch_id: entry.batch_id.as_ref().map(|t| t.to_string()),
                description: entry.description.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::StateVersion;
    use crate::recorder::{Recorder, RecorderConfig, SettlementAttribution, PotWinner, RakeBreakdown};
    use crate::store::{StoreConfig, SteppingClock};

    fn setup() -> LedgerStore {
        let mut store = LedgerStore::new(StoreConfig::default());
        let mut recorder = Recorder::new(RecorderConfig::default());
        let clock = SteppingClock::starting_at(0, 1);
        recorder
            .record_settlement(
                &mut store,
                SettlementAttribution {
                    hand_id: HandId::new("h1"),
                    table_id: TableId::new("t1"),
                    club_id: ClubId::new("c1"),
                    state_version: StateVersion::new("v1"),
                    pot_winners: vec![PotWinner {
                        player_id: PlayerId::new("p1"),
                        amount: 90,
                        pot_type: "main".to_string(),
                    }],
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
    fn club_summary_matches_scenario_s1() {
        let store = setup();
        let view = LedgerView::new(&store);
        let summary = view.club_summary(&ClubId::new("c1"), TimeWindow::ALL);
        assert_eq!(summary.total_rake_collected, 10);
        assert_eq!(summary.agent_commissions.get("a1"), Some(&2));
        assert_eq!(summary.platform_share, 1);
        assert_eq!(summary.net_club_revenue, 7);
    }

    #[test]
    fn analyze_hand_reports_raw_sum() {
        let store = setup();
        let view = LedgerView::new(&store);
        let analysis = view.analyze_hand(&HandId::new("h1"));
        assert_eq!(analysis.net_balance, 90 + 10 + 2 + 1 + 7);
    }

    #[test]
    fn query_respects_club_context_or_party() {
        let store = setup();
        let view = LedgerView::new(&store);
        let results = view.query(&QueryParams {
            club_id: Some(ClubId::new("c1")),
            ..Default::default()
        });
        assert_eq!(results.len(), 5);
    }
}
