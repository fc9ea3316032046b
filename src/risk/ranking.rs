//! Risk ranking (C8): inverts health into a risk score, penalises for open
//! anomalies, and ranks entities within a reconciliation period,
//! `spec.md §4.8`.

use super::anomaly::AnomalyDescriptor;
use super::health::HealthScore;
use super::{ranking_id, EntityType, Severity, HIGH_RISK_THRESHOLD};
use serde::{Deserialize, Serialize};

const WEIGHT_HEALTH: i64 = 6000;
const WEIGHT_ANOMALY: i64 = 2500;
const ANOMALY_PENALTY_CAP: i64 = 30;

fn anomaly_penalty(descriptor: &AnomalyDescriptor) -> i64 {
    match descriptor.severity {
        Severity::Critical => 15,
        Severity::Alert => 8,
        Severity::Warning => 3,
        Severity::Info => 1,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntity {
    pub entity_id: String,
    pub risk_score: i64,
    pub rank: u64,
    pub critical_anomaly_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRanking {
    pub ranking_id: String,
    pub period: String,
    pub entries: Vec<RankedEntity>,
    pub high_risk_count: u64,
}

struct ScoredEntity<'a> {
    health: &'a HealthScore,
    anomalies: &'a [AnomalyDescriptor],
}

fn score_entity(entity: &ScoredEntity) -> (i64, u64) {
    let risk_from_health = 100 - entity.health.overall_score;
    let capped_penalty: i64 = entity
        .anomalies
        .iter()
        .map(anomaly_penalty)
        .sum::<i64>()
        .min(ANOMALY_PENALTY_CAP);
    let critical_count = entity.anomalies.iter().filter(|a| a.severity == Severity::Critical).count() as u64;

    let weighted = (WEIGHT_HEALTH * risk_from_health + WEIGHT_ANOMALY * capped_penalty) / 10_000;
    let critical_bonus = (1500 * critical_count as i64 * 10) / 10_000;

    (weighted + critical_bonus, critical_count)
}

/// Ranks entities descending by risk score, tie-breaking ascending by
/// entity id for stability, `spec.md §4.8`.
pub fn rank(
    entity_type: EntityType,
    period: &str,
    healths: &[HealthScore],
    anomalies_by_entity: &std::collections::BTreeMap<String, Vec<AnomalyDescriptor>>,
    timestamp_ms: i64,
) -> RiskRanking {
    let empty: Vec<AnomalyDescriptor> = Vec::new();
    let mut scored: Vec<(i64, u64, &HealthScore)> = healths
        .iter()
        .map(|h| {
            let anomalies = anomalies_by_entity.get(&h.entity_id).unwrap_or(&empty);
            let (score, critical_count) = score_entity(&ScoredEntity { health: h, anomalies });
            (score, critical_count, h)
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.2.entity_id.cmp(&b.2.entity_id)));

    let high_risk_threshold = 100 - HIGH_RISK_THRESHOLD;
    let mut high_risk_count = 0u64;
    let entries: Vec<RankedEntity> = scored
        .into_iter()
        .enumerate()
        .map(|(idx, (score, critical_count, health))| {
            if score >= high_risk_threshold {
                high_risk_count += 1;
            }
            RankedEntity {
                entity_id: health.entity_id.clone(),
                risk_score: score,
                rank: (idx + 1) as u64,
                critical_anomaly_count: critical_count,
            }
        })
        .collect();

    RiskRanking {
        ranking_id: ranking_id(entity_type, period, timestamp_ms),
        period: period.to_string(),
        entries,
        high_risk_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::health::RiskLevel;
    use std::collections::BTreeMap;

    fn health(entity_id: &str, overall: i64) -> HealthScore {
        HealthScore {
            health_id: format!("hs_{}", entity_id),
            entity_id: entity_id.to_string(),
            period: "2026-07".to_string(),
            correlation: overall,
            distribution: overall,
            attribution: overall,
            alignment: overall,
            overall_score: overall,
            risk_level: RiskLevel::Low,
            checksum: "hs_deadbeef".to_string(),
        }
    }

    #[test]
    fn ranks_descending_by_risk_with_tiebreak() {
        let healths = vec![health("p2", 50), health("p1", 50)];
        let ranking = rank(EntityType::Player, "2026-07", &healths, &BTreeMap::new(), 0);
        assert_eq!(ranking.entries[0].entity_id, "p1");
        assert_eq!(ranking.entries[0].rank, 1);
        assert_eq!(ranking.entries[1].rank, 2);
    }

    #[test]
    fn worse_health_ranks_higher_risk() {
        let healths = vec![health("healthy", 90), health("sick", 10)];
        let ranking = rank(EntityType::Player, "2026-07", &healths, &BTreeMap::new(), 0);
        assert_eq!(ranking.entries[0].entity_id, "sick");
    }
}
