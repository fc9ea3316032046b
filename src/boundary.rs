//! External-value boundary guard (C6).
//!
//! Pure validators, no mutation, no store access. Grounded on the
//! teacher's `production_grade.rs` enforcement-gate shape: a closed set of
//! rules, each producing a typed violation rather than aborting on the
//! first hit, so a caller sees every problem with one input in one pass.

use crate::ids::{EntrySource, MetadataValue};
use crate::recorder::{AdjustmentAttribution, BonusAttribution, SettlementAttribution, TimeFeeAttribution};
use crate::store::EntryInput;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Case-insensitive substring match, closed set, `spec.md §6`.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "payment", "pay", "payout", "deposit", "withdraw", "withdrawal", "transfer", "send", "receive",
    "wallet", "balance", "account", "bank", "card", "credit", "currency", "exchange", "rate",
    "conversion", "convert", "forex", "crypto", "blockchain", "chain", "usdt", "usdc", "bitcoin",
    "btc", "eth", "token", "coin", "nft", "web3", "defi", "swap", "gateway", "processor", "merchant",
    "stripe", "paypal", "venmo",
];

/// Forbidden metadata key names, `spec.md §6`.
pub const FORBIDDEN_METADATA_FIELDS: &[&str] = &[
    "paymentId", "transactionId", "walletAddress", "accountNumber", "cardNumber", "bankAccount",
    "cryptoAddress", "blockchainTx", "externalRef", "externalId",
];

/// Internal-only field names stripped by [`sanitize_output`].
const INTERNAL_FIELD_PREFIXES: &[&str] = &["_internal", "_debug", "_raw"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Violation {
    NonIntegerValue { field: String },
    ForbiddenConcept { field: String, term: String },
    InvalidSource { value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub violations: Vec<Violation>,
}

impl ValidationResult {
    fn from_violations(violations: Vec<Violation>) -> Self {
        Self { is_valid: violations.is_empty(), violations }
    }
}

/// `{strict_mode}`, default `true`, `spec.md §6`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BoundaryConfig {
    #[serde(default = "default_true")]
    pub strict_mode: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self { strict_mode: true }
    }
}

fn scan_text(field: &str, text: &str, violations: &mut Vec<Violation>) {
    let lower = text.to_lowercase();
    for keyword in FORBIDDEN_KEYWORDS {
        if lower.contains(keyword) {
            violations.push(Violation::ForbiddenConcept {
                field: field.to_string(),
                term: keyword.to_string(),
            });
        }
    }
}

fn scan_metadata(metadata: &BTreeMap<String, MetadataValue>, config: &BoundaryConfig, violations: &mut Vec<Violation>) {
    for (key, value) in metadata {
        if FORBIDDEN_METADATA_FIELDS.iter().any(|f| f.eq_ignore_ascii_case(key)) {
            violations.push(Violation::ForbiddenConcept {
                field: format!("metadata.{}", key),
                term: key.clone(),
            });
        }
        if config.strict_mode {
            if let MetadataValue::String(s) = value {
                scan_text(&format!("metadata.{}", key), s, violations);
            }
        }
    }
}

fn check_non_negative(field: &str, amount: i64, violations: &mut Vec<Violation>) {
    if amount < 0 {
        violations.push(Violation::ForbiddenConcept {
            field: field.to_string(),
            term: "negative-amount".to_string(),
        });
    }
}

/// Validate a raw `EntryInput` before it's handed to the store. Not every
/// boundary rule applies equally at this layer — the rules about rake
/// breakdown sums and pot/fee positivity are checked upstream on the
/// settlement/time-fee descriptors, since by the time an `EntryInput`
/// exists the sign is meaningful (debits are legitimately negative).
pub fn validate_entry_input(input: &EntryInput, config: &BoundaryConfig) -> ValidationResult {
    let mut violations = Vec::new();

    if !EntrySource::ALL.contains(&input.source) {
        violations.push(Violation::InvalidSource { value: format!("{:?}", input.source) });
    }

    if config.strict_mode {
        scan_text("description", &input.description, &mut violations);
        if let Some(metadata) = &input.metadata {
            scan_metadata(metadata, config, &mut violations);
        }
    }

    ValidationResult::from_violations(violations)
}

/// Validate a settlement descriptor before recording: positivity of
/// amounts and, in strict mode, the rake-breakdown sum check.
pub fn validate_settlement(attribution: &SettlementAttribution, config: &BoundaryConfig) -> ValidationResult {
    let mut violations = Vec::new();

    for winner in &attribution.pot_winners {
        check_non_negative("pot_winners.amount", winner.amount, &mut violations);
        if config.strict_mode {
            scan_text("pot_winners.pot_type", &winner.pot_type, &mut violations);
        }
    }
    for ret in &attribution.uncalled_returns {
        check_non_negative("uncalled_returns.amount", ret.amount, &mut violations);
    }
    check_non_negative("rake_total", attribution.rake_total, &mut violations);

    if let Some(breakdown) = &attribution.rake_breakdown {
        check_non_negative("rake_breakdown.club_share", breakdown.club_share, &mut violations);
        check_non_negative("rake_breakdown.platform_share", breakdown.platform_share, &mut violations);
        if let Some(agent_share) = breakdown.agent_share {
            check_non_negative("rake_breakdown.agent_share", agent_share, &mut violations);
        }
        if config.strict_mode {
            let sum = breakdown.club_share + breakdown.platform_share + breakdown.agent_share.unwrap_or(0);
            if sum != attribution.rake_total {
                violations.push(Violation::ForbiddenConcept {
                    field: "rake_breakdown".to_string(),
                    term: "value created/destroyed".to_string(),
                });
            }
        }
    }

    ValidationResult::from_violations(violations)
}

pub fn validate_time_fee(attribution: &TimeFeeAttribution, _config: &BoundaryConfig) -> ValidationResult {
    let mut violations = Vec::new();
    check_non_negative("fee_amount", attribution.fee_amount, &mut violations);
    ValidationResult::from_violations(violations)
}

pub fn validate_adjustment(attribution: &AdjustmentAttribution, config: &BoundaryConfig) -> ValidationResult {
    let mut violations = Vec::new();
    if config.strict_mode {
        scan_text("reason", &attribution.reason, &mut violations);
    }
    ValidationResult::from_violations(violations)
}

pub fn validate_bonus(attribution: &BonusAttribution, config: &BoundaryConfig) -> ValidationResult {
    let mut violations = Vec::new();
    check_non_negative("amount", attribution.amount, &mut violations);
    if config.strict_mode {
        scan_text("description", &attribution.description, &mut violations);
    }
    ValidationResult::from_violations(violations)
}

/// Deep-clone output sanitiser: strips `_internal`/`_debug`/`_raw`-prefixed
/// keys recursively before export, `spec.md §4.6`.
pub fn sanitize_metadata(metadata: &BTreeMap<String, MetadataValue>) -> BTreeMap<String, MetadataValue> {
    metadata
        .iter()
        .filter(|(key, _)| !INTERNAL_FIELD_PREFIXES.iter().any(|prefix| key.starts_with(prefix)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{AgentId, ClubId, HandId, PlayerId, StateVersion, TableId};
    use crate::recorder::{PotWinner, RakeBreakdown};

    #[test]
    fn forbidden_keyword_detected() {
        let mut violations = Vec::new();
        scan_text("description", "wallet top-up bonus", &mut violations);
        assert!(violations.iter().any(|v| matches!(v, Violation::ForbiddenConcept { term, .. } if term == "wallet")));
    }

    #[test]
    fn rake_breakdown_sum_mismatch_flagged() {
        let attribution = SettlementAttribution {
            hand_id: HandId::new("h1"),
            table_id: TableId::new("t1"),
            club_id: ClubId::new("c1"),
            state_version: StateVersion::new("v1"),
            pot_winners: vec![PotWinner { player_id: PlayerId::new("p1"), amount: 90, pot_type: "main".to_string() }],
            rake_total: 10,
            rake_breakdown: Some(RakeBreakdown {
                club_share: 5,
                platform_share: 1,
                agent_share: Some(1),
                agent_id: Some(AgentId::new("a1")),
            }),
            uncalled_returns: Vec::new(),
        };
        let result = validate_settlement(&attribution, &BoundaryConfig::default());
        assert!(!result.is_valid);
    }

    #[test]
    fn negative_amount_rejected() {
        let result = validate_time_fee(
            &TimeFeeAttribution {
                table_id: TableId::new("t1"),
                club_id: ClubId::new("c1"),
                player_id: PlayerId::new("p1"),
                state_version: StateVersion::new("v1"),
                fee_amount: -5,
            },
            &BoundaryConfig::default(),
        );
        assert!(!result.is_valid);
    }

    #[test]
    fn sanitize_strips_internal_fields() {
        let mut metadata = BTreeMap::new();
        metadata.insert("_internal_note".to_string(), MetadataValue::String("x".to_string()));
        metadata.insert("public_note".to_string(), MetadataValue::String("y".to_string()));
        let cleaned = sanitize_metadata(&metadata);
        assert_eq!(cleaned.len(), 1);
        assert!(cleaned.contains_key("public_note"));
    }
}
