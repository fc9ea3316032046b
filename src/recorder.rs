//! Deterministic derivation of entry batches from settlement/time-fee/
//! adjustment/bonus descriptors, with idempotency (C3).
//!
//! Grounded on the teacher's `backtest_v2::ledger::Ledger::apply_entry`
//! dedup-via-`HashSet` pattern: a dedup key is computed up front, checked
//! against a set owned by this layer (not the store), and only inserted on
//! a successful append. The recorder itself performs no arithmetic beyond
//! collecting and signing the inputs it's handed — all math happened
//! upstream in the settlement engine.

use crate::ids::{
    AgentId, AttributedParty, ClubId, EntrySource, HandId, PlatformId, PlayerId, SettlementCategory,
    StateVersion, TableId,
};
use crate::store::{Batch, Clock, Entry, EntryInput, LedgerStore, StoreError};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::{debug, warn};

// =============================================================================
// INPUT DESCRIPTORS
// =============================================================================

#[derive(Debug, Clone)]
pub struct PotWinner {
    pub player_id: PlayerId,
    pub amount: i64,
    pub pot_type: String,
}

#[derive(Debug, Clone)]
pub struct UncalledReturn {
    pub player_id: PlayerId,
    pub amount: i64,
}

#[derive(Debug, Clone)]
pub struct RakeBreakdown {
    pub club_share: i64,
    pub platform_share: i64,
    pub agent_share: Option<i64>,
    pub agent_id: Option<AgentId>,
}

#[derive(Debug, Clone)]
pub struct SettlementAttribution {
    pub hand_id: HandId,
    pub table_id: TableId,
    pub club_id: ClubId,
    pub state_version: StateVersion,
    pub pot_winners: Vec<PotWinner>,
    pub rake_total: i64,
    pub rake_breakdown: Option<RakeBreakdown>,
    pub uncalled_returns: Vec<UncalledReturn>,
}

#[derive(Debug, Clone)]
pub struct TimeFeeAttribution {
    pub table_id: TableId,
    pub club_id: ClubId,
    pub player_id: PlayerId,
    pub state_version: StateVersion,
    pub fee_amount: i64,
}

#[derive(Debug, Clone)]
pub struct AdjustmentAttribution {
    pub affected_party: AttributedParty,
    pub delta: i64,
    pub state_version: StateVersion,
    pub reason: String,
    pub table_id: Option<TableId>,
    pub club_id: Option<ClubId>,
}

#[derive(Debug, Clone)]
pub struct BonusAttribution {
    pub player_id: PlayerId,
    pub amount: i64,
    pub state_version: StateVersion,
    pub club_id: Option<ClubId>,
    pub description: String,
}

// =============================================================================
// CONFIG
// =============================================================================

/// Recorder configuration, defaults per `spec.md §6`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RecorderConfig {
    #[serde(default = "default_true")]
    pub enable_duplicate_detection: bool,
    #[serde(default = "default_platform_id")]
    pub default_platform_id: String,
}

fn default_true() -> bool {
    true
}

fn default_platform_id() -> String {
    "platform".to_string()
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enable_duplicate_detection: true,
            default_platform_id: default_platform_id(),
        }
    }
}

// =============================================================================
// ERRORS / RESULT
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RecorderError {
    Duplicate { key: String },
    EmptyReason,
    InvalidSettlement { detail: String },
    Store(StoreError),
}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderError::Duplicate { key } => write!(f, "duplicate recording for key {}", key),
            RecorderError::EmptyReason => write!(f, "adjustment reason must not be empty"),
            RecorderError::InvalidSettlement { detail } => write!(f, "invalid settlement input: {}", detail),
            RecorderError::Store(e) => write!(f, "store error: {}", e),
        }
    }
}

impl std::error::Error for RecorderError {}

impl From<StoreError> for RecorderError {
    fn from(e: StoreError) -> Self {
        RecorderError::Store(e)
    }
}

/// Every recorder operation that can be rejected by dedup returns this
/// instead of a bare `Result`, so a caller replaying a known-duplicate
/// input can distinguish "nothing happened, as expected" from a real error.
#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome<T> {
    pub is_duplicate: bool,
    pub result: Option<T>,
}

impl<T> RecordOutcome<T> {
    fn ok(value: T) -> Self {
        Self {
            is_duplicate: false,
            result: Some(value),
        }
    }

    fn duplicate() -> Self {
        Self {
            is_duplicate: true,
            result: None,
        }
    }
}

// =============================================================================
// RECORDER
// =============================================================================

pub struct Recorder {
    config: RecorderConfig,
    recorded_settlements: HashSet<String>,
    recorded_time_fees: HashSet<String>,
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            recorded_settlements: HashSet::new(),
            recorded_time_fees: HashSet::new(),
        }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    fn settlement_key(hand_id: &HandId) -> String {
        format!("settlement:{}", hand_id)
    }

    fn time_fee_key(table_id: &TableId, player_id: &PlayerId, minute_bucket: i64) -> String {
        format!("time_fee:{}:{}:{}", table_id, player_id, minute_bucket)
    }

    /// `record_settlement`, `spec.md §4.3`. No arithmetic beyond collecting
    /// and signing the caller's numbers; derivation order for rake shares
    /// is part of the wire contract (agent, then platform, then club).
    pub fn record_settlement(
        &mut self,
        store: &mut LedgerStore,
        attribution: SettlementAttribution,
        clock: &dyn Clock,
    ) -> Result<RecordOutcome<(Batch, Vec<Entry>)>, RecorderError> {
        let key = Self::settlement_key(&attribution.hand_id);
        if self.config.enable_duplicate_detection && self.recorded_settlements.contains(&key) {
            debug!(key = %key, "duplicate settlement rejected");
            return Ok(RecordOutcome::duplicate());
        }

        let inputs = self.build_settlement_inputs(&attribution)?;
        let (batch, entries) = store.append_batch(EntrySource::HandSettlement, inputs, clock)?;

        if self.config.enable_duplicate_detection {
            self.recorded_settlements.insert(key);
        }
        Ok(RecordOutcome::ok((batch, entries)))
    }

    fn build_settlement_inputs(
        &self,
        attribution: &SettlementAttribution,
    ) -> Result<Vec<EntryInput>, RecorderError> {
        let mut inputs = Vec::new();
        let ctx = |description: String,
                   category: SettlementCategory,
                   party: AttributedParty,
                   delta: i64|
         -> EntryInput {
            EntryInput {
                source: EntrySource::HandSettlement,
                category: Some(category),
                affected_party: party,
                delta,
                state_version: attribution.state_version.clone(),
                table_id: Some(attribution.table_id.clone()),
                hand_id: Some(attribution.hand_id.clone()),
                club_id: Some(attribution.club_id.clone()),
                batch_id: None,
                description,
                metadata: None,
            }
        };

        for winner in &attribution.pot_winners {
            inputs.push(ctx(
                format!("pot win ({})", winner.pot_type),
                SettlementCategory::PotWin,
                AttributedParty::Player(winner.player_id.clone()),
                winner.amount,
            ));
        }

        for ret in &attribution.uncalled_returns {
            inputs.push(ctx(
                "uncalled bet returned".to_string(),
                SettlementCategory::UncalledReturn,
                AttributedParty::Player(ret.player_id.clone()),
                ret.amount,
            ));
        }

        if attribution.rake_total > 0 {
            inputs.push(ctx(
                "rake collected".to_string(),
                SettlementCategory::Rake,
                AttributedParty::Club(attribution.club_id.clone()),
                attribution.rake_total,
            ));
        }

        if let Some(breakdown) = &attribution.rake_breakdown {
            if breakdown.club_share > 0 && breakdown.club_share < attribution.rake_total {
                if let (Some(agent_share), Some(agent_id)) = (breakdown.agent_share, &breakdown.agent_id) {
                    if agent_share > 0 {
                        inputs.push(ctx(
                            "rake share: agent".to_string(),
                            SettlementCategory::RakeShareAgent,
                            AttributedParty::Agent(agent_id.clone()),
                            agent_share,
                        ));
                    }
                }
                if breakdown.platform_share > 0 {
                    inputs.push(ctx(
                        "rake share: platform".to_string(),
                        SettlementCategory::RakeSharePlatform,
                        AttributedParty::Platform(PlatformId::new(self.config.default_platform_id.clone())),
                        breakdown.platform_share,
                    ));
                }
                inputs.push(ctx(
                    "rake share: club".to_string(),
                    SettlementCategory::RakeShareClub,
                    AttributedParty::Club(attribution.club_id.clone()),
                    breakdown.club_share,
                ));
            }
        }

        if inputs.is_empty() {
            return Err(RecorderError::InvalidSettlement {
                detail: "settlement produces no entries (no winners, returns, or rake)".to_string(),
            });
        }

        Ok(inputs)
    }

    /// `record_time_fee`, `spec.md §4.3`: two entries, one batch, dedup on
    /// table/player/minute-bucket.
    pub fn record_time_fee(
        &mut self,
        store: &mut LedgerStore,
        attribution: TimeFeeAttribution,
        clock: &dyn Clock,
    ) -> Result<RecordOutcome<(Batch, Vec<Entry>)>, RecorderError> {
        let minute_bucket = clock.now_millis() / 60_000;
        let key = Self::time_fee_key(&attribution.table_id, &attribution.player_id, minute_bucket);
        if self.config.enable_duplicate_detection && self.recorded_time_fees.contains(&key) {
            debug!(key = %key, "duplicate time fee rejected");
            return Ok(RecordOutcome::duplicate());
        }

        let debit = EntryInput {
            source: EntrySource::TimeFee,
            category: None,
            affected_party: AttributedParty::Player(attribution.player_id.clone()),
            delta: -attribution.fee_amount,
            state_version: attribution.state_version.clone(),
            table_id: Some(attribution.table_id.clone()),
            hand_id: None,
            club_id: Some(attribution.club_id.clone()),
            batch_id: None,
            description: "time fee charged".to_string(),
            metadata: None,
        };
        let credit = EntryInput {
            source: EntrySource::TimeFee,
            category: None,
            affected_party: AttributedParty::Club(attribution.club_id.clone()),
            delta: attribution.fee_amount,
            state_version: attribution.state_version,
            table_id: Some(attribution.table_id),
            hand_id: None,
            club_id: Some(attribution.club_id),
            batch_id: None,
            description: "time fee collected".to_string(),
            metadata: None,
        };

        let (batch, entries) = store.append_batch(EntrySource::TimeFee, vec![debit, credit], clock)?;

        if self.config.enable_duplicate_detection {
            self.recorded_time_fees.insert(key);
        }
        Ok(RecordOutcome::ok((batch, entries)))
    }

    /// `record_adjustment`, `spec.md §4.3`: exactly one entry, requires a
    /// non-empty reason.
    pub fn record_adjustment(
        &mut self,
        store: &mut LedgerStore,
        attribution: AdjustmentAttribution,
        clock: &dyn Clock,
    ) -> Result<Entry, RecorderError> {
        if attribution.reason.trim().is_empty() {
            warn!("adjustment rejected: empty reason");
            return Err(RecorderError::EmptyReason);
        }
        let input = EntryInput {
            source: EntrySource::Adjustment,
            category: None,
            affected_party: attribution.affected_party,
            delta: attribution.delta,
            state_version: attribution.state_version,
            table_id: attribution.table_id,
            hand_id: None,
            club_id: attribution.club_id,
            batch_id: None,
            description: attribution.reason,
            metadata: None,
        };
        Ok(store.append_entry(input, clock)?)
    }

    /// `record_bonus`, `spec.md §4.3`: exactly one credit entry on a player.
    pub fn record_bonus(
        &mut self,
        store: &mut LedgerStore,
        attribution: BonusAttribution,
        clock: &dyn Clock,
    ) -> Result<Entry, RecorderError> {
        let input = EntryInput {
            source: EntrySource::Bonus,
            category: None,
            affected_party: AttributedParty::Player(attribution.player_id),
            delta: attribution.amount,
            state_version: attribution.state_version,
            table_id: None,
            hand_id: None,
            club_id: attribution.club_id,
            batch_id: None,
            description: attribution.description,
            metadata: None,
        };
        Ok(store.append_entry(input, clock)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StoreConfig, SteppingClock};

    fn settlement(hand: &str) -> SettlementAttribution {
        SettlementAttribution {
            hand_id: HandId::new(hand),
            table_id: TableId::new("t1"),
            club_id: ClubId::new("c1"),
            state_version: StateVersion::new("v1"),
            pot_winners: vec![PotWinner {
                player_id: PlayerId::new("p1"),
                amount: 100,
                pot_type: "main".to_string(),
            }],
            rake_total: 10,
            rake_breakdown: Some(RakeBreakdown {
                club_share: 6,
                platform_share: 3,
                agent_share: Some(1),
                agent_id: Some(AgentId::new("a1")),
            }),
            uncalled_returns: Vec::new(),
        }
    }

    #[test]
    fn settlement_emission_order_is_agent_platform_club() {
        let mut store = LedgerStore::new(StoreConfig::default());
        let mut recorder = Recorder::new(RecorderConfig::default());
        let clock = SteppingClock::starting_at(0, 1);
        let outcome = recorder
            .record_settlement(&mut store, settlement("h1"), &clock)
            .unwrap();
        let (_, entries) = outcome.result.unwrap();
        let categories: Vec<_> = entries.iter().filter_map(|e| e.category).collect();
        assert_eq!(
            categories,
            vec![
                SettlementCategory::PotWin,
                SettlementCategory::Rake,
                SettlementCategory::RakeShareAgent,
                SettlementCategory::RakeSharePlatform,
                SettlementCategory::RakeShareClub,
            ]
        );
    }

    #[test]
    fn duplicate_settlement_rejected() {
        let mut store = LedgerStore::new(StoreConfig::default());
        let mut recorder = Recorder::new(RecorderConfig::default());
        let clock = SteppingClock::starting_at(0, 1);
        recorder.record_settlement(&mut store, settlement("h1"), &clock).unwrap();
        let before = store.get_all_entries().len();
        let outcome = recorder
            .record_settlement(&mut store, settlement("h1"), &clock)
            .unwrap();
        assert!(outcome.is_duplicate);
        assert_eq!(store.get_all_entries().len(), before);
    }

    #[test]
    fn time_fee_emits_balanced_pair() {
        let mut store = LedgerStore::new(StoreConfig::default());
        let mut recorder = Recorder::new(RecorderConfig::default());
        let clock = SteppingClock::starting_at(0, 1);
        let outcome = recorder
            .record_time_fee(
                &mut store,
                TimeFeeAttribution {
                    table_id: TableId::new("t1"),
                    club_id: ClubId::new("c1"),
                    player_id: PlayerId::new("p1"),
                    state_version: StateVersion::new("v1"),
                    fee_amount: 5,
                },
                &clock,
            )
            .unwrap();
        let (batch, _) = outcome.result.unwrap();
        assert_eq!(batch.net_delta, 0);
    }

    #[test]
    fn adjustment_requires_reason() {
        let mut store = LedgerStore::new(StoreConfig::default());
        let mut recorder = Recorder::new(RecorderConfig::default());
        let clock = SteppingClock::starting_at(0, 1);
        let err = recorder
            .record_adjustment(
                &mut store,
                AdjustmentAttribution {
                    affected_party: AttributedParty::Player(PlayerId::new("p1")),
                    delta: 10,
                    state_version: StateVersion::new("v1"),
                    reason: "   ".to_string(),
                    table_id: None,
                    club_id: None,
                },
                &clock,
            )
            .unwrap_err();
        assert_eq!(err, RecorderError::EmptyReason);
    }
}
