//! Anomaly classification (C8): eight detector variants over one entity's
//! rollup, each producing at most one descriptor, `spec.md §4.8`.

use super::{anomaly_id, assert_no_forbidden_terms, EntityRollup, EntityType, Severity, MIN_CONFIDENCE};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    FlowConcentration,
    AttributionSkew,
    AgentOverExtraction,
    RechargeMismatch,
    HighOrphanRate,
    AttributionGap,
    VolumeSpike,
    TableWashPattern,
}

impl AnomalyKind {
    fn slug(&self) -> &'static str {
        match self {
            AnomalyKind::FlowConcentration => "flow_concentration",
            AnomalyKind::AttributionSkew => "attribution_skew",
            AnomalyKind::AgentOverExtraction => "agent_over_extraction",
            AnomalyKind::RechargeMismatch => "recharge_mismatch",
            AnomalyKind::HighOrphanRate => "high_orphan_rate",
            AnomalyKind::AttributionGap => "attribution_gap",
            AnomalyKind::VolumeSpike => "volume_spike",
            AnomalyKind::TableWashPattern => "table_wash_pattern",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyDescriptor {
    pub anomaly_id: String,
    pub kind: AnomalyKind,
    pub entity_id: String,
    pub severity: Severity,
    pub confidence: i64,
    pub message: String,
}

fn band(value: i64, critical: i64, alert: i64, warning: i64) -> Option<(Severity, i64)> {
    if value >= critical {
        Some((Severity::Critical, 90))
    } else if value >= alert {
        Some((Severity::Alert, 75))
    } else if value >= warning {
        Some((Severity::Warning, 58))
    } else {
        None
    }
}

fn make(kind: AnomalyKind, rollup: &EntityRollup, severity: Severity, confidence: i64, message: String, timestamp_ms: i64) -> AnomalyDescriptor {
    debug_assert!(assert_no_forbidden_terms(&message), "anomaly message must not use forbidden terminology");
    AnomalyDescriptor {
        anomaly_id: anomaly_id(kind.slug(), &rollup.entity_id, &rollup.period, timestamp_ms),
        kind,
        entity_id: rollup.entity_id.clone(),
        severity,
        confidence,
        message,
    }
}

fn top_counterparty_share_bp(rollup: &EntityRollup) -> i64 {
    let total: i64 = rollup.flow_data.counterparties.values().sum();
    if total == 0 {
        return 0;
    }
    rollup.flow_data.counterparties.values().copied().max().unwrap_or(0) * 10_000 / total
}

fn detect_flow_concentration(rollup: &EntityRollup, timestamp_ms: i64) -> Option<AnomalyDescriptor> {
    let share_bp = top_counterparty_share_bp(rollup);
    let (severity, confidence) = band(share_bp, 8000, 6000, 4000)?;
    Some(make(
        AnomalyKind::FlowConcentration,
        rollup,
        severity,
        confidence,
        format!("top counterparty holds {}bp of flows", share_bp),
        timestamp_ms,
    ))
}

fn detect_attribution_skew(rollup: &EntityRollup, timestamp_ms: i64) -> Option<AnomalyDescriptor> {
    let bp = rollup.attribution_data.max_single_party_bp;
    let (severity, confidence) = band(bp, 9000, 8000, 7000)?;
    Some(make(
        AnomalyKind::AttributionSkew,
        rollup,
        severity,
        confidence,
        format!("attribution concentrated at {}bp on a single party", bp),
        timestamp_ms,
    ))
}

fn detect_agent_over_extraction(rollup: &EntityRollup, timestamp_ms: i64) -> Option<AnomalyDescriptor> {
    let (commission, rake_share) = (rollup.agent_commission_bp?, rollup.rake_share_bp?);
    if rake_share <= 0 {
        return None;
    }
    let ratio_bp = commission * 10_000 / rake_share;
    let (severity, confidence) = band(ratio_bp, 15_000, 12_000, 10_500)?;
    Some(make(
        AnomalyKind::AgentOverExtraction,
        rollup,
        severity,
        confidence,
        format!("agent commission is {}bp of its expected rake share", ratio_bp),
        timestamp_ms,
    ))
}

fn detect_recharge_mismatch(rollup: &EntityRollup, timestamp_ms: i64) -> Option<AnomalyDescriptor> {
    let deviation = (rollup.recharge_data.amount_ratio_bp - 10_000).abs();
    let (severity, confidence) = band(deviation, 3000, 2000, 1000)?;
    Some(make(
        AnomalyKind::RechargeMismatch,
        rollup,
        severity,
        confidence,
        format!("recharge amount ratio deviates {}bp from parity", deviation),
        timestamp_ms,
    ))
}

fn detect_high_orphan_rate(rollup: &EntityRollup, timestamp_ms: i64) -> Option<AnomalyDescriptor> {
    let f = &rollup.flow_data;
    if f.total_flows == 0 {
        return None;
    }
    let orphan_bp = f.orphan * 10_000 / f.total_flows;
    let (severity, confidence) = band(orphan_bp, 2000, 1000, 500)?;
    Some(make(
        AnomalyKind::HighOrphanRate,
        rollup,
        severity,
        confidence,
        format!("orphan rate is {}bp of flows", orphan_bp),
        timestamp_ms,
    ))
}

fn detect_attribution_gap(rollup: &EntityRollup, timestamp_ms: i64) -> Option<AnomalyDescriptor> {
    let bp = rollup.attribution_data.zero_rate_bp;
    let (severity, confidence) = band(bp, 3000, 1500, 700)?;
    Some(make(
        AnomalyKind::AttributionGap,
        rollup,
        severity,
        confidence,
        format!("zero-attribution rate is {}bp", bp),
        timestamp_ms,
    ))
}

fn detect_volume_spike(rollup: &EntityRollup, timestamp_ms: i64) -> Option<AnomalyDescriptor> {
    let previous = rollup.previous_period_flow_count?;
    if previous <= 0 {
        return None;
    }
    let delta_bp = (rollup.current_period_flow_count - previous) * 10_000 / previous;
    let (severity, confidence) = band(delta_bp, 10_000, 5000, 2500)?;
    Some(make(
        AnomalyKind::VolumeSpike,
        rollup,
        severity,
        confidence,
        format!("flow volume rose {}bp period-over-period", delta_bp),
        timestamp_ms,
    ))
}

/// Wash-trading-shaped pattern: a table whose flows concentrate on exactly
/// two counterparties trading back and forth. Only meaningful for `TABLE`
/// entities, `spec.md §4.8`.
fn detect_table_wash_pattern(rollup: &EntityRollup, timestamp_ms: i64) -> Option<AnomalyDescriptor> {
    if rollup.entity_type != EntityType::Table {
        return None;
    }
    if rollup.flow_data.counterparties.len() != 2 {
        return None;
    }
    let share_bp = top_counterparty_share_bp(rollup);
    let (severity, confidence) = band(share_bp, 7000, 6000, 5000)?;
    Some(make(
        AnomalyKind::TableWashPattern,
        rollup,
        severity,
        confidence,
        format!("table flows concentrate {}bp across two counterparties", share_bp),
        timestamp_ms,
    ))
}

/// Runs every applicable detector, drops anything below `MIN_CONFIDENCE`,
/// sorts severity-descending then confidence-descending, `spec.md §4.8`.
pub fn classify(rollup: &EntityRollup, timestamp_ms: i64) -> Vec<AnomalyDescriptor> {
    let mut descriptors: Vec<AnomalyDescriptor> = [
        detect_flow_concentration(rollup, timestamp_ms),
        detect_attribution_skew(rollup, timestamp_ms),
        detect_agent_over_extraction(rollup, timestamp_ms),
        detect_recharge_mismatch(rollup, timestamp_ms),
        detect_high_orphan_rate(rollup, timestamp_ms),
        detect_attribution_gap(rollup, timestamp_ms),
        detect_volume_spike(rollup, timestamp_ms),
        detect_table_wash_pattern(rollup, timestamp_ms),
    ]
    .into_iter()
    .flatten()
    .filter(|d| d.confidence >= MIN_CONFIDENCE)
    .collect();

    descriptors.sort_by(|a, b| a.severity.cmp(&b.severity).then(b.confidence.cmp(&a.confidence)));
    descriptors
}

pub fn count_by_severity(descriptors: &[AnomalyDescriptor]) -> std::collections::BTreeMap<Severity, u64> {
    let mut counts = std::collections::BTreeMap::new();
    for d in descriptors {
        *counts.entry(d.severity).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{AttributionData, FlowData, RechargeData};
    use std::collections::BTreeMap;

    fn base_rollup() -> EntityRollup {
        EntityRollup {
            entity_id: "p1".to_string(),
            entity_type: EntityType::Player,
            period: "2026-07".to_string(),
            flow_data: FlowData::default(),
            attribution_data: AttributionData::default(),
            recharge_data: RechargeData { link_rate_bp: 10_000, amount_ratio_bp: 10_000 },
            agent_commission_bp: None,
            rake_share_bp: None,
            current_period_flow_count: 0,
            previous_period_flow_count: None,
        }
    }

    #[test]
    fn clean_rollup_yields_no_anomalies() {
        let descriptors = classify(&base_rollup(), 0);
        assert!(descriptors.is_empty());
    }

    #[test]
    fn high_orphan_rate_detected() {
        let mut rollup = base_rollup();
        rollup.flow_data = FlowData { total_flows: 100, matched: 70, partial: 5, orphan: 25, missing: 0, counterparties: BTreeMap::new() };
        let descriptors = classify(&rollup, 0);
        assert!(descriptors.iter().any(|d| d.kind == AnomalyKind::HighOrphanRate));
    }

    #[test]
    fn severity_sort_is_critical_first() {
        let mut rollup = base_rollup();
        rollup.attribution_data = AttributionData { zero_rate_bp: 3500, max_single_party_bp: 9500 };
        let descriptors = classify(&rollup, 0);
        assert_eq!(descriptors[0].severity, Severity::Critical);
    }

    #[test]
    fn table_wash_only_applies_to_tables() {
        let mut rollup = base_rollup();
        let mut cp = BTreeMap::new();
        cp.insert("a".to_string(), 80);
        cp.insert("b".to_string(), 20);
        rollup.flow_data.counterparties = cp;
        assert!(classify(&rollup, 0).iter().all(|d| d.kind != AnomalyKind::TableWashPattern));

        rollup.entity_type = EntityType::Table;
        assert!(classify(&rollup, 0).iter().any(|d| d.kind == AnomalyKind::TableWashPattern));
    }
}
