//! End-to-end scenarios and cross-cutting invariants exercised against the
//! public API surface, rather than internal module state.

use attribution_ledger::ids::{EntrySource, SettlementCategory, StateVersion};
use attribution_ledger::invariants::{InvariantChecker, InvariantId};
use attribution_ledger::recorder::{PotWinner, RakeBreakdown, Recorder, RecorderConfig, SettlementAttribution, TimeFeeAttribution};
use attribution_ledger::store::{Clock, LedgerStore, StoreConfig, StoreSnapshot, SystemClock};
use attribution_ledger::view::{LedgerView, TimeWindow};

fn settlement_s1() -> SettlementAttribution {
    SettlementAttribution {
        hand_id: "h1".into(),
        table_id: "t1".into(),
        club_id: "c1".into(),
        state_version: StateVersion::new("v1"),
        pot_winners: vec![PotWinner { player_id: "p1".into(), amount: 90, pot_type: "main".to_string() }],
        rake_total: 10,
        rake_breakdown: Some(RakeBreakdown {
            club_share: 7,
            platform_share: 1,
            agent_share: Some(2),
            agent_id: Some("a1".into()),
        }),
        uncalled_returns: Vec::new(),
    }
}

#[test]
fn s1_balanced_settlement() {
    let mut store = LedgerStore::new(StoreConfig::default());
    let mut recorder = Recorder::new(RecorderConfig::default());
    let clock = SystemClock;

    let outcome = recorder.record_settlement(&mut store, settlement_s1(), &clock).unwrap();
    assert!(!outcome.is_duplicate);
    let (_batch, entries) = outcome.result.unwrap();

    assert_eq!(entries.len(), 5);
    let categories: Vec<SettlementCategory> = entries.iter().map(|e| e.category.unwrap()).collect();
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
    let deltas: Vec<i64> = entries.iter().map(|e| e.delta).collect();
    assert_eq!(deltas, vec![90, 10, 2, 1, 7]);

    let checker = InvariantChecker::new(&store);
    let report = checker.check_all(&Default::default(), clock.now_millis());
    assert!(report.all_passed);

    let view = LedgerView::new(&store);
    let summary = view.club_summary(&"c1".into(), TimeWindow::ALL);
    assert_eq!(summary.total_rake_collected, 10);
    assert_eq!(summary.agent_commissions.get("a1"), Some(&2));
    assert_eq!(summary.platform_share, 1);
    assert_eq!(summary.net_club_revenue, 7);
}

#[test]
fn s2_time_fee_conservation() {
    let mut store = LedgerStore::new(StoreConfig::default());
    let mut recorder = Recorder::new(RecorderConfig::default());
    let clock = SystemClock;

    let attribution = TimeFeeAttribution {
        table_id: "t1".into(),
        club_id: "c1".into(),
        player_id: "p1".into(),
        state_version: StateVersion::new("v2"),
        fee_amount: 50,
    };
    let outcome = recorder.record_time_fee(&mut store, attribution, &clock).unwrap();
    let (batch, entries) = outcome.result.unwrap();

    let deltas: Vec<i64> = entries.iter().map(|e| e.delta).collect();
    assert_eq!(deltas, vec![-50, 50]);
    assert_eq!(batch.net_delta, 0);

    let checker = InvariantChecker::new(&store);
    let result = checker.check_batch_conservation(&batch.batch_id, clock.now_millis()).unwrap();
    assert!(result.passed);
}

#[test]
fn s3_duplicate_settlement_adds_no_entries() {
    let mut store = LedgerStore::new(StoreConfig::default());
    let mut recorder = Recorder::new(RecorderConfig::default());
    let clock = SystemClock;

    let first = recorder.record_settlement(&mut store, settlement_s1(), &clock).unwrap();
    assert!(!first.is_duplicate);
    let count_after_first = store.get_all_entries().len();

    let second = recorder.record_settlement(&mut store, settlement_s1(), &clock).unwrap();
    assert!(second.is_duplicate);
    assert!(second.result.is_none());
    assert_eq!(store.get_all_entries().len(), count_after_first);
}

#[test]
fn s4_tampered_entry_fails_verification() {
    let mut store = LedgerStore::new(StoreConfig::default());
    let mut recorder = Recorder::new(RecorderConfig::default());
    let clock = SystemClock;

    let outcome = recorder.record_settlement(&mut store, settlement_s1(), &clock).unwrap();
    let (_batch, entries) = outcome.result.unwrap();
    let target_id = entries[0].entry_id.clone();

    let mut snapshot: StoreSnapshot = store.export();
    for entry in snapshot.entries.iter_mut() {
        if entry.entry_id == target_id {
            entry.delta = entry.delta + 1;
        }
    }
    let tampered_store = LedgerStore::import(StoreConfig::default(), snapshot);

    assert_eq!(tampered_store.verify_entry(&target_id).unwrap(), false);
}

#[test]
fn s5_negative_balance_violation() {
    let mut store = LedgerStore::new(StoreConfig::default());
    let clock = SystemClock;

    let input = attribution_ledger::store::EntryInput {
        source: EntrySource::Adjustment,
        category: None,
        affected_party: attribution_ledger::ids::AttributedParty::Player("p1".into()),
        delta: -100,
        state_version: StateVersion::new("v1"),
        table_id: None,
        hand_id: None,
        club_id: None,
        batch_id: None,
        description: "manual correction".to_string(),
        metadata: None,
    };
    store.append_entry(input, &clock).unwrap();

    let checker = InvariantChecker::new(&store);
    let result = checker.check_non_negative_balance(clock.now_millis());
    assert!(!result.passed);
    assert_eq!(result.invariant, InvariantId::NonNegativeBalance);

    let violation = result.violation.unwrap();
    match violation.context {
        attribution_ledger::invariants::ViolationContext::NegativeBalance { party_id, resulting_balance } => {
            assert_eq!(party_id, "player:p1");
            assert_eq!(resulting_balance, -100);
        }
        other => panic!("unexpected violation context: {:?}", other),
    }
}

#[test]
fn empty_store_passes_and_summarizes_to_zero() {
    let store = LedgerStore::new(StoreConfig::default());
    let checker = InvariantChecker::new(&store);
    let report = checker.check_all(&Default::default(), 0);
    assert!(report.all_passed);

    let view = LedgerView::new(&store);
    let summary = view.club_summary(&"nonexistent".into(), TimeWindow::ALL);
    assert_eq!(summary.total_rake_collected, 0);
    assert_eq!(summary.net_club_revenue, 0);
}

#[test]
fn max_entries_boundary() {
    let mut store = LedgerStore::new(StoreConfig { enable_hash_chain: true, max_entries: 1, require_integer_deltas: true });
    let clock = SystemClock;

    let input = attribution_ledger::store::EntryInput {
        source: EntrySource::Bonus,
        category: None,
        affected_party: attribution_ledger::ids::AttributedParty::Player("p1".into()),
        delta: 10,
        state_version: StateVersion::new("v1"),
        table_id: None,
        hand_id: None,
        club_id: None,
        batch_id: None,
        description: "bonus".to_string(),
        metadata: None,
    };
    store.append_entry(input.clone(), &clock).unwrap();

    let second = store.append_entry(input, &clock);
    assert!(matches!(second, Err(attribution_ledger::store::StoreError::CapacityExceeded { max_entries: 1 })));
}

#[test]
fn snapshot_round_trips_through_a_file() {
    let mut store = LedgerStore::new(StoreConfig::default());
    let mut recorder = Recorder::new(RecorderConfig::default());
    let clock = SystemClock;
    recorder.record_settlement(&mut store, settlement_s1(), &clock).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.json");
    std::fs::write(&path, serde_json::to_string_pretty(&store.export()).unwrap()).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let snapshot: StoreSnapshot = serde_json::from_str(&contents).unwrap();
    let restored = LedgerStore::import(StoreConfig::default(), snapshot);

    assert_eq!(restored.get_all_entries().len(), store.get_all_entries().len());
    let report = restored.verify_integrity(None);
    assert!(report.is_valid);
}
