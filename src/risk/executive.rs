//! Executive dashboard (C8): rolls per-entity-type health averages into one
//! system-health figure, surfaces the worst offenders, and diffs risk
//! rankings period over period, `spec.md §4.8`.

use super::health::HealthScore;
use super::ranking::RankedEntity;
use super::EntityType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Fixed weights for the system-health composite, out of 100.
const WEIGHT_PLAYERS: i64 = 25;
const WEIGHT_TABLES: i64 = 25;
const WEIGHT_CLUBS: i64 = 30;
const WEIGHT_AGENTS: i64 = 20;

const CRITICAL_ITEM_CAP: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalItem {
    pub entity_id: String,
    pub risk_score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveDashboard {
    pub period: String,
    pub system_health_score: i64,
    pub health_by_type: BTreeMap<&'static str, i64>,
    pub critical_items: Vec<CriticalItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRankingDelta {
    pub period: String,
    pub previous_period: String,
    pub newly_high_risk: Vec<String>,
    pub no_longer_high_risk: Vec<String>,
}

fn average_overall(healths: &[&HealthScore]) -> i64 {
    if healths.is_empty() {
        return 50;
    }
    let sum: i64 = healths.iter().map(|h| h.overall_score).sum();
    sum / healths.len() as i64
}

/// Builds the system-health composite and the top critical items across all
/// entity types for one period.
pub fn build_dashboard(period: &str, healths_by_type: &BTreeMap<EntityType, Vec<HealthScore>>, all_rankings: &[RankedEntity]) -> ExecutiveDashboard {
    let avg_for = |entity_type: EntityType| -> i64 {
        let healths: Vec<&HealthScore> = healths_by_type.get(&entity_type).map(|v| v.iter().collect()).unwrap_or_default();
        average_overall(&healths)
    };

    let players = avg_for(EntityType::Player);
    let tables = avg_for(EntityType::Table);
    let clubs = avg_for(EntityType::Club);
    let agents = avg_for(EntityType::Agent);

    let system_health_score =
        (WEIGHT_PLAYERS * players + WEIGHT_TABLES * tables + WEIGHT_CLUBS * clubs + WEIGHT_AGENTS * agents) / 100;

    let mut health_by_type = BTreeMap::new();
    health_by_type.insert("player", players);
    health_by_type.insert("table", tables);
    health_by_type.insert("club", clubs);
    health_by_type.insert("agent", agents);

    let mut sorted_rankings: Vec<&RankedEntity> = all_rankings.iter().collect();
    sorted_rankings.sort_by(|a, b| b.risk_score.cmp(&a.risk_score).then(a.entity_id.cmp(&b.entity_id)));

    let critical_items = sorted_rankings
        .into_iter()
        .take(CRITICAL_ITEM_CAP)
        .map(|r| CriticalItem { entity_id: r.entity_id.clone(), risk_score: r.risk_score })
        .collect();

    ExecutiveDashboard { period: period.to_string(), system_health_score, health_by_type, critical_items }
}

/// Diffs two periods' high-risk entity sets, identifying entities that
/// crossed the threshold in either direction, `spec.md §4.8`.
pub fn compare_periods(
    current_period: &str,
    previous_period: &str,
    current_high_risk: &[String],
    previous_high_risk: &[String],
) -> RiskRankingDelta {
    let current: BTreeSet<&String> = current_high_risk.iter().collect();
    let previous: BTreeSet<&String> = previous_high_risk.iter().collect();

    let newly_high_risk: Vec<String> = current.difference(&previous).map(|s| s.to_string()).collect();
    let no_longer_high_risk: Vec<String> = previous.difference(&current).map(|s| s.to_string()).collect();

    RiskRankingDelta {
        period: current_period.to_string(),
        previous_period: previous_period.to_string(),
        newly_high_risk,
        no_longer_high_risk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::health::RiskLevel;

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

    fn ranked(entity_id: &str, risk_score: i64) -> RankedEntity {
        RankedEntity { entity_id: entity_id.to_string(), risk_score, rank: 0, critical_anomaly_count: 0 }
    }

    #[test]
    fn system_health_is_weighted_composite() {
        let mut by_type = BTreeMap::new();
        by_type.insert(EntityType::Player, vec![health("p1", 100)]);
        by_type.insert(EntityType::Table, vec![health("t1", 100)]);
        by_type.insert(EntityType::Club, vec![health("c1", 100)]);
        by_type.insert(EntityType::Agent, vec![health("a1", 100)]);

        let dashboard = build_dashboard("2026-07", &by_type, &[]);
        assert_eq!(dashboard.system_health_score, 100);
    }

    #[test]
    fn missing_entity_type_defaults_to_fifty() {
        let by_type = BTreeMap::new();
        let dashboard = build_dashboard("2026-07", &by_type, &[]);
        assert_eq!(dashboard.system_health_score, 50);
    }

    #[test]
    fn critical_items_capped_and_sorted() {
        let rankings: Vec<RankedEntity> = (0..15).map(|i| ranked(&format!("e{}", i), i)).collect();
        let by_type = BTreeMap::new();
        let dashboard = build_dashboard("2026-07", &by_type, &rankings);
        assert_eq!(dashboard.critical_items.len(), 10);
        assert_eq!(dashboard.critical_items[0].entity_id, "e14");
    }

    #[test]
    fn period_comparison_finds_deltas() {
        let delta = compare_periods(
            "2026-07",
            "2026-06",
            &["p1".to_string(), "p2".to_string()],
            &["p2".to_string(), "p3".to_string()],
        );
        assert_eq!(delta.newly_high_risk, vec!["p1".to_string()]);
        assert_eq!(delta.no_longer_high_risk, vec!["p3".to_string()]);
    }
}
