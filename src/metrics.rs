// 📈 Metrics Engine - Efficiency figures for one city
//
// Pure functions of (summary, population, registered electors).
// Every ratio has a zero guard: a zero or unknown denominator gives 0, never NaN.

use crate::ledger::CityCampaignSummary;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CityMetrics {
    /// money / votes
    pub cost_per_vote: f64,
    /// money / population
    pub cost_per_capita: f64,
    /// 100 × votes / registered electors
    pub conversion_rate: f64,
}

pub struct MetricsEngine;

impl MetricsEngine {
    pub fn derive(
        summary: &CityCampaignSummary,
        population: u64,
        registered_electors: u64,
    ) -> CityMetrics {
        CityMetrics {
            cost_per_vote: ratio(summary.money, summary.votes),
            cost_per_capita: ratio(summary.money, population),
            conversion_rate: 100.0 * ratio(summary.votes as f64, registered_electors),
        }
    }
}

fn ratio(numerator: f64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}
