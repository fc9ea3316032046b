//! Branded identifiers and the core attribution vocabulary (C1).
//!
//! Every domain id is a thin newtype around `String` so the compiler keeps
//! a `ClubId` from being passed where an `AgentId` is expected, even though
//! both are "just strings" on the wire. `AttributedParty` is the tagged
//! union described in the data model: avoid stringly-typed `party_type`
//! fields anywhere except at the serialised edge.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! branded_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

branded_id!(LedgerEntryId);
branded_id!(LedgerBatchId);
branded_id!(PlayerId);
branded_id!(ClubId);
branded_id!(AgentId);
branded_id!(TableId);
branded_id!(HandId);
branded_id!(PlatformId);
branded_id!(StateVersion);
branded_id!(ViolationId);

/// The tagged union of parties value can be attributed to.
///
/// This is the "runtime-tagged variant" design note from `spec.md §9`: a sum
/// type, not a `(party_type: String, party_id: String)` pair. Reconstruct a
/// `"<type>:<id>"` style string only at the external interface (see
/// [`AttributedParty::key`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "party_type", rename_all = "snake_case")]
pub enum AttributedParty {
    Player(PlayerId),
    Club(ClubId),
    Agent(AgentId),
    Platform(PlatformId),
}

impl AttributedParty {
    /// Stable `"<party_type>:<id>"` key used for grouping/aggregation maps
    /// (e.g. `table_summary`'s `rake_by_party`).
    pub fn key(&self) -> String {
        match self {
            AttributedParty::Player(id) => format!("player:{}", id.as_str()),
            AttributedParty::Club(id) => format!("club:{}", id.as_str()),
            AttributedParty::Agent(id) => format!("agent:{}", id.as_str()),
            AttributedParty::Platform(id) => format!("platform:{}", id.as_str()),
        }
    }

    pub fn party_type(&self) -> PartyType {
        match self {
            AttributedParty::Player(_) => PartyType::Player,
            AttributedParty::Club(_) => PartyType::Club,
            AttributedParty::Agent(_) => PartyType::Agent,
            AttributedParty::Platform(_) => PartyType::Platform,
        }
    }
}

/// Stringly-typed party discriminant, used only at query boundaries where a
/// caller needs to filter by type without supplying an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyType {
    Player,
    Club,
    Agent,
    Platform,
}

/// Source of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntrySource {
    HandSettlement,
    TimeFee,
    TournamentPayout,
    Rebuy,
    Adjustment,
    Bonus,
    TopUp,
}

impl EntrySource {
    pub const ALL: [EntrySource; 7] = [
        EntrySource::HandSettlement,
        EntrySource::TimeFee,
        EntrySource::TournamentPayout,
        EntrySource::Rebuy,
        EntrySource::Adjustment,
        EntrySource::Bonus,
        EntrySource::TopUp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntrySource::HandSettlement => "HAND_SETTLEMENT",
            EntrySource::TimeFee => "TIME_FEE",
            EntrySource::TournamentPayout => "TOURNAMENT_PAYOUT",
            EntrySource::Rebuy => "REBUY",
            EntrySource::Adjustment => "ADJUSTMENT",
            EntrySource::Bonus => "BONUS",
            EntrySource::TopUp => "TOP_UP",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<EntrySource> {
        EntrySource::ALL.into_iter().find(|src| src.as_str() == s)
    }

    /// Sources whose batches are expected to conserve (Σ delta == 0), per
    /// `spec.md §4.5` I2. Hand settlements are attribution-only and exempt
    /// (documented at length in `spec.md §4.3`/`§9`).
    pub fn is_conservation_expected(&self) -> bool {
        matches!(self, EntrySource::TimeFee)
    }
}

/// Category, only meaningful for `HAND_SETTLEMENT` entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementCategory {
    PotWin,
    Rake,
    RakeShareClub,
    RakeShareAgent,
    RakeSharePlatform,
    UncalledReturn,
}

impl SettlementCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementCategory::PotWin => "POT_WIN",
            SettlementCategory::Rake => "RAKE",
            SettlementCategory::RakeShareClub => "RAKE_SHARE_CLUB",
            SettlementCategory::RakeShareAgent => "RAKE_SHARE_AGENT",
            SettlementCategory::RakeSharePlatform => "RAKE_SHARE_PLATFORM",
            SettlementCategory::UncalledReturn => "UNCALLED_RETURN",
        }
    }
}

/// A closed, boundary-sanitised metadata value (`spec.md §9`: "dynamic
/// object metadata becomes a typed map with a closed key set plus an opaque
/// bag sanitised by the boundary guard").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Bool(bool),
    Null,
}

/// Sentinel `previous_hash` for the first entry in a store.
pub const GENESIS_HASH: &str = "genesis";

fn counter_next(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::Relaxed)
}

static ENTRY_COUNTER: AtomicU64 = AtomicU64::new(1);
static BATCH_COUNTER: AtomicU64 = AtomicU64::new(1);
static VIOLATION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// `"lent_<ms>_<counter>"` per `spec.md §6`.
pub fn next_entry_id(timestamp_ms: i64) -> LedgerEntryId {
    LedgerEntryId::new(format!("lent_{}_{}", timestamp_ms, counter_next(&ENTRY_COUNTER)))
}

/// `"lbat_<ms>_<counter>"` per `spec.md §6`.
pub fn next_batch_id(timestamp_ms: i64) -> LedgerBatchId {
    LedgerBatchId::new(format!("lbat_{}_{}", timestamp_ms, counter_next(&BATCH_COUNTER)))
}

/// `"viol_<ms>_<counter>"` per `spec.md §6`.
pub fn next_violation_id(timestamp_ms: i64) -> ViolationId {
    ViolationId::new(format!("viol_{}_{}", timestamp_ms, counter_next(&VIOLATION_COUNTER)))
}

/// Test-only helper resetting the generated-id counters back to 1, per
/// `spec.md §6`: "Counters reset through a test-only helper."
pub fn reset_id_counters_for_test() {
    ENTRY_COUNTER.store(1, Ordering::Relaxed);
    BATCH_COUNTER.store(1, Ordering::Relaxed);
    VIOLATION_COUNTER.store(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn party_key_is_stable() {
        let p = AttributedParty::Club(ClubId::new("c1"));
        assert_eq!(p.key(), "club:c1");
    }

    #[test]
    fn conservation_expected_only_for_time_fee() {
        assert!(EntrySource::TimeFee.is_conservation_expected());
        assert!(!EntrySource::HandSettlement.is_conservation_expected());
        assert!(!EntrySource::Bonus.is_conservation_expected());
    }

    #[test]
    fn id_format_matches_wire_contract() {
        reset_id_counters_for_test();
        let id = next_entry_id(1_000);
        assert!(id.as_str().starts_with("lent_1000_"));
    }
}
