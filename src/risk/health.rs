//! Health scoring (C8): `correlation`, `distribution`, `attribution`,
//! `alignment`, weighted into an `overall_score`, `spec.md §4.8`.

use super::{clamp, health_id, EntityRollup};
use crate::checksum::{checksum_of, Canon};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Critical,
    High,
    Medium,
    Low,
}

impl RiskLevel {
    fn from_overall(overall: i64) -> RiskLevel {
        if overall < 20 {
            RiskLevel::Critical
        } else if overall < 40 {
            RiskLevel::High
        } else if overall < 70 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub health_id: String,
    pub entity_id: String,
    pub period: String,
    pub correlation: i64,
    pub distribution: i64,
    pub attribution: i64,
    pub alignment: i64,
    pub overall_score: i64,
    pub risk_level: RiskLevel,
    pub checksum: String,
}

/// Declared weights for the overall-score blend, out of 10000.
const WEIGHT_CORRELATION: i64 = 3000;
const WEIGHT_DISTRIBUTION: i64 = 2500;
const WEIGHT_ATTRIBUTION: i64 = 2500;
const WEIGHT_ALIGNMENT: i64 = 2000;

fn correlation_score(rollup: &EntityRollup) -> i64 {
    let f = &rollup.flow_data;
    if f.total_flows == 0 {
        return 50;
    }
    let bad = f.orphan + f.partial + f.missing;
    clamp(100 - (bad * 100 / f.total_flows), 0, 100)
}

fn distribution_score(rollup: &EntityRollup) -> i64 {
    let f = &rollup.flow_data;
    if f.counterparties.is_empty() {
        return 50;
    }
    if f.counterparties.len() == 1 {
        return 20;
    }
    let total: i64 = f.counterparties.values().sum();
    if total == 0 {
        return 50;
    }
    let n = f.counterparties.len() as i64;
    let sum_sq_bp: i64 = f
        .counterparties
        .values()
        .map(|&count| {
            let share_bp = count * 10_000 / total;
            share_bp * share_bp / 10_000
        })
        .sum();
    let min_hhi = 10_000 / n;

    if sum_sq_bp <= min_hhi {
        return 100;
    }
    if sum_sq_bp >= 10_000 {
        return 0;
    }
    100 - (sum_sq_bp - min_hhi) * 100 / (10_000 - min_hhi)
}

fn attribution_score(rollup: &EntityRollup) -> i64 {
    let a = &rollup.attribution_data;
    let completeness = clamp(100 - a.zero_rate_bp / 100, 0, 100);
    let balance = match a.max_single_party_bp {
        bp if bp < 6000 => 100,
        bp if bp < 7000 => 80,
        bp if bp < 8000 => 60,
        bp if bp < 9000 => 40,
        _ => 20,
    };
    (6 * completeness + 4 * balance) / 10
}

fn alignment_score(rollup: &EntityRollup) -> i64 {
    let r = &rollup.recharge_data;
    let link_rate_pct = clamp(r.link_rate_bp / 100, 0, 100);
    let deviation = (r.amount_ratio_bp - 10_000).abs();
    let amount_alignment = clamp(100 - deviation / 100, 0, 100);
    (7 * link_rate_pct + 3 * amount_alignment) / 10
}

fn canon(rollup: &EntityRollup, correlation: i64, distribution: i64, attribution: i64, alignment: i64) -> Canon {
    Canon::object([
        ("entity_id", Canon::Str(rollup.entity_id.clone())),
        ("period", Canon::Str(rollup.period.clone())),
        ("correlation", Canon::Int(correlation)),
        ("distribution", Canon::Int(distribution)),
        ("attribution", Canon::Int(attribution)),
        ("alignment", Canon::Int(alignment)),
    ])
}

/// Compute a deterministic health score for one entity's rollup over one
/// period. `timestamp_ms` is the only clock-derived input, supplied by the
/// caller — this function never reads a clock itself.
pub fn score(rollup: &EntityRollup, timestamp_ms: i64) -> HealthScore {
    let correlation = correlation_score(rollup);
    let distribution = distribution_score(rollup);
    let attribution = attribution_score(rollup);
    let alignment = alignment_score(rollup);

    let overall_score = (WEIGHT_CORRELATION * correlation
        + WEIGHT_DISTRIBUTION * distribution
        + WEIGHT_ATTRIBUTION * attribution
        + WEIGHT_ALIGNMENT * alignment)
        / 10_000;

    let checksum = checksum_of("hs", &canon(rollup, correlation, distribution, attribution, alignment));

    HealthScore {
        health_id: health_id(&rollup.entity_id, &rollup.period, timestamp_ms),
        entity_id: rollup.entity_id.clone(),
        period: rollup.period.clone(),
        correlation,
        distribution,
        attribution,
        alignment,
        overall_score,
        risk_level: RiskLevel::from_overall(overall_score),
        checksum,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{AttributionData, EntityType, FlowData, RechargeData};
    use std::collections::BTreeMap;

    fn rollup() -> EntityRollup {
        let mut counterparties = BTreeMap::new();
        counterparties.insert("cp1".to_string(), 30);
        counterparties.insert("cp2".to_string(), 30);
        counterparties.insert("cp3".to_string(), 20);
        counterparties.insert("cp4".to_string(), 20);

        EntityRollup {
            entity_id: "p1".to_string(),
            entity_type: EntityType::Player,
            period: "2026-07".to_string(),
            flow_data: FlowData {
                total_flows: 100,
                matched: 90,
                partial: 5,
                orphan: 3,
                missing: 2,
                counterparties,
            },
            attribution_data: AttributionData { zero_rate_bp: 0, max_single_party_bp: 3000 },
            recharge_data: RechargeData { link_rate_bp: 10_000, amount_ratio_bp: 10_000 },
            agent_commission_bp: None,
            rake_share_bp: None,
            current_period_flow_count: 100,
            previous_period_flow_count: Some(80),
        }
    }

    #[test]
    fn correlation_matches_scenario_s6() {
        assert_eq!(correlation_score(&rollup()), 90);
    }

    #[test]
    fn identical_inputs_produce_identical_checksums() {
        let r = rollup();
        let a = score(&r, 1_700_000_000_000);
        let b = score(&r, 1_700_000_000_000);
        assert_eq!(a.checksum, b.checksum);
        assert_eq!(a.overall_score, b.overall_score);
    }

    #[test]
    fn no_flows_defaults_to_fifty() {
        let mut r = rollup();
        r.flow_data = FlowData::default();
        assert_eq!(correlation_score(&r), 50);
        assert_eq!(distribution_score(&r), 50);
    }

    #[test]
    fn single_counterparty_scores_twenty() {
        let mut r = rollup();
        let mut cp = BTreeMap::new();
        cp.insert("only".to_string(), 100);
        r.flow_data.counterparties = cp;
        assert_eq!(distribution_score(&r), 20);
    }
}
