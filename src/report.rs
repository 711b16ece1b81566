// 🏆 Strategic Report Builder - Rankings over active campaigns
//
// Steps:
//   1. keep active cities (votes != 0 or money != 0)
//   2. metrics + one-line demographic digest per city
//   3. numbers in the query → "exact match" flags (money or votes within tolerance)
//   4. top-N by money, by votes, by conversion rate
//   5. full money-ranked list only for small sets and list-style queries
//
// No error conditions: an empty snapshot gives an empty report.

use crate::cities::CityDirectory;
use crate::demographics::{CellValue, DemographicDigest, DemographicTable};
use crate::ledger::CampaignSnapshot;
use crate::metrics::{CityMetrics, MetricsEngine};
use crate::normalizer::CityKey;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Absolute tolerance for an "exact" numeric match against a query
pub const DEFAULT_MATCH_TOLERANCE: f64 = 1.0;

static DIGIT_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+").expect("digit-run pattern is valid"));

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportOptions {
    pub match_tolerance: f64,
    pub top_n: usize,
    /// Full list is only attached when active cities ≤ this
    pub full_list_max_cities: usize,
    /// Shortest digit run treated as a number in the query
    pub min_number_digits: usize,
    /// Query words that ask for a complete list
    pub full_list_keywords: Vec<String>,
    /// Query words that make a question campaign-related
    pub relevance_keywords: Vec<String>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            match_tolerance: DEFAULT_MATCH_TOLERANCE,
            top_n: 10,
            full_list_max_cities: 50,
            min_number_digits: 2,
            full_list_keywords: to_strings(&["quais", "lista", "todas", "melhor", "which", "list", "best"]),
            relevance_keywords: to_strings(&[
                "invest", "voto", "gast", "dinheiro", "quais", "onde", "cidade", "quanto",
                "relatório", "analis", "melhor", "público", "idade", "perfil", "vote", "money",
                "report", "city", "which", "best",
            ]),
        }
    }
}

fn to_strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

fn mentions_any(query: &str, keywords: &[String]) -> bool {
    let lower = query.to_lowercase();
    keywords
        .iter()
        .any(|k| !k.is_empty() && lower.contains(&k.to_lowercase()))
}

// ============================================================================
// NUMBER EXTRACTION
// ============================================================================

/// Numbers written in a query, Brazilian style separators.
///
/// Dots are dropped as thousands separators, commas become decimal points,
/// then every digit run of at least `min_digits` is read as a number.
/// "R$ 12.345,67" → [12345.0, 67.0]
pub fn extract_numbers(query: &str, min_digits: usize) -> Vec<f64> {
    let cleaned = query.replace('.', "").replace(',', ".");

    DIGIT_RUN
        .find_iter(&cleaned)
        .map(|m| m.as_str())
        .filter(|digits| digits.len() >= min_digits)
        .filter_map(|digits| digits.parse::<f64>().ok())
        .collect()
}

// ============================================================================
// REPORT TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignLine {
    pub city: CityKey,
    pub name: String,
    pub votes: u64,
    pub money: f64,
    pub population: u64,
    pub registered_electors: u64,
    pub metrics: CityMetrics,
    pub demographics: Option<DemographicDigest>,
}

impl CampaignLine {
    fn digest_text(&self) -> String {
        match &self.demographics {
            Some(d) => d.to_string(),
            None => "Demographics unavailable".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchField {
    Money,
    Votes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExactMatch {
    pub city: CityKey,
    pub name: String,
    pub field: MatchField,
    /// The city's value
    pub value: f64,
    /// The number found in the query
    pub query_value: f64,
    pub demographics: Option<DemographicDigest>,
}

impl ExactMatch {
    fn digest_text(&self) -> String {
        match &self.demographics {
            Some(d) => d.to_string(),
            None => "Demographics unavailable".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub active_cities: usize,
    pub total_invested: f64,
    pub total_votes: u64,
    pub query_numbers: Vec<f64>,
    pub exact_matches: Vec<ExactMatch>,
    pub top_money: Vec<CampaignLine>,
    pub top_votes: Vec<CampaignLine>,
    pub top_conversion: Vec<CampaignLine>,
    pub full_list: Option<Vec<CampaignLine>>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.active_cities == 0
    }

    pub fn is_money_match(&self, city: &CityKey) -> bool {
        self.has_match(city, MatchField::Money)
    }

    pub fn is_votes_match(&self, city: &CityKey) -> bool {
        self.has_match(city, MatchField::Votes)
    }

    fn has_match(&self, city: &CityKey, field: MatchField) -> bool {
        self.exact_matches
            .iter()
            .any(|m| &m.city == city && m.field == field)
    }

    /// Plain-text rendering for prompt context
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("--- STRATEGIC ANALYSIS DATA ---\n");
        let _ = writeln!(
            out,
            "Global summary: {} active cities. Total invested: R$ {}. Total votes: {}.",
            self.active_cities,
            format_money(self.total_invested),
            group_thousands(self.total_votes)
        );

        if !self.exact_matches.is_empty() {
            out.push_str("\nEXACT MATCH (value found in the question):\n");
            for m in &self.exact_matches {
                let value = match m.field {
                    MatchField::Money => format!("Investment R$ {}", format_money(m.value)),
                    MatchField::Votes => format!("Votes {}", group_thousands(m.value as u64)),
                };
                let _ = writeln!(out, "- {}: {} | {}", m.name, value, m.digest_text());
            }
        }

        if !self.top_money.is_empty() {
            let _ = writeln!(out, "\nTop {} by investment:", self.top_money.len());
            for l in &self.top_money {
                let _ = writeln!(
                    out,
                    "- {}: R$ {} | Votes: {} | Conv: {:.2}% | R$/vote: {:.2} | {}",
                    l.name,
                    format_money(l.money),
                    l.votes,
                    l.metrics.conversion_rate,
                    l.metrics.cost_per_vote,
                    l.digest_text()
                );
            }
        }

        if !self.top_conversion.is_empty() {
            let _ = writeln!(out, "\nTop {} by conversion:", self.top_conversion.len());
            for l in &self.top_conversion {
                let _ = writeln!(
                    out,
                    "- {}: Conv: {:.2}% | Invest: R$ {} | Votes: {} | {}",
                    l.name,
                    l.metrics.conversion_rate,
                    format_money(l.money),
                    l.votes,
                    l.digest_text()
                );
            }
        }

        if !self.top_votes.is_empty() {
            let _ = writeln!(out, "\nTop {} by votes:", self.top_votes.len());
            for l in &self.top_votes {
                let _ = writeln!(
                    out,
                    "- {}: Votes: {} | Invest: R$ {} | Conv: {:.2}% | {}",
                    l.name,
                    group_thousands(l.votes),
                    format_money(l.money),
                    l.metrics.conversion_rate,
                    l.digest_text()
                );
            }
        }

        if let Some(full) = &self.full_list {
            out.push_str("\nAll campaigns:\n");
            for l in full {
                let _ = writeln!(
                    out,
                    "- {}: R$ {} | Votes: {} | Conv: {:.2}% | {}",
                    l.name,
                    format_money(l.money),
                    l.votes,
                    l.metrics.conversion_rate,
                    l.digest_text()
                );
            }
        }

        out
    }
}

// ============================================================================
// BUILDER
// ============================================================================

pub struct StrategicReportBuilder<'a> {
    options: ReportOptions,
    directory: Option<&'a CityDirectory>,
}

impl<'a> StrategicReportBuilder<'a> {
    pub fn new(options: ReportOptions) -> Self {
        StrategicReportBuilder {
            options,
            directory: None,
        }
    }

    /// Attach populations and display names
    pub fn with_directory(mut self, directory: &'a CityDirectory) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn options(&self) -> &ReportOptions {
        &self.options
    }

    /// Whether the query is about campaigns at all.
    /// Callers may skip the report otherwise; build_report never gates on it.
    pub fn is_strategic_query(&self, query: &str) -> bool {
        mentions_any(query, &self.options.relevance_keywords)
    }

    pub fn wants_full_list(&self, query: &str) -> bool {
        mentions_any(query, &self.options.full_list_keywords)
    }

    pub fn build_report<V: CellValue>(
        &self,
        summaries: &CampaignSnapshot,
        demographics: &DemographicTable<V>,
        query: &str,
    ) -> Report {
        // 1 + 2. Active campaigns with metrics and digest
        let lines: Vec<CampaignLine> = summaries
            .iter()
            .filter(|(_, summary)| summary.is_active())
            .map(|(city, summary)| {
                let population = self.directory.map(|d| d.population(city)).unwrap_or(0);
                let registered_electors = demographics.registered_electors(city);
                let demographic = demographics.get(city);

                let name = self
                    .directory
                    .and_then(|d| d.name(city))
                    .map(str::to_string)
                    .or_else(|| demographic.map(|c| c.display_name.clone()))
                    .unwrap_or_else(|| city.to_string());

                CampaignLine {
                    city: city.clone(),
                    name,
                    votes: summary.votes,
                    money: summary.money,
                    population,
                    registered_electors,
                    metrics: MetricsEngine::derive(summary, population, registered_electors),
                    demographics: demographic.map(|c| c.digest()),
                }
            })
            .collect();

        // 3. Exact matches
        let query_numbers = extract_numbers(query, self.options.min_number_digits);
        let exact_matches = self.find_exact_matches(&lines, &query_numbers);

        // 4. Rankings (stable sorts keep CityKey order on ties)
        let mut by_money = lines.clone();
        by_money.sort_by(|a, b| b.money.total_cmp(&a.money));

        let mut by_votes = lines.clone();
        by_votes.sort_by(|a, b| b.votes.cmp(&a.votes));

        let mut by_conversion = lines.clone();
        by_conversion.sort_by(|a, b| {
            b.metrics
                .conversion_rate
                .total_cmp(&a.metrics.conversion_rate)
        });

        // 5. Full list for small sets
        let full_list = if !lines.is_empty()
            && lines.len() <= self.options.full_list_max_cities
            && self.wants_full_list(query)
        {
            Some(by_money.clone())
        } else {
            None
        };

        let top_n = self.options.top_n;
        Report {
            generated_at: Utc::now(),
            active_cities: lines.len(),
            total_invested: lines.iter().map(|l| l.money).sum(),
            total_votes: summaries.total_votes(),
            query_numbers,
            exact_matches,
            top_money: by_money.into_iter().take(top_n).collect(),
            top_votes: by_votes.into_iter().take(top_n).collect(),
            top_conversion: by_conversion.into_iter().take(top_n).collect(),
            full_list,
        }
    }

    // A zero field never matches: "exactly 00" is not a campaign figure
    fn find_exact_matches(&self, lines: &[CampaignLine], numbers: &[f64]) -> Vec<ExactMatch> {
        let tolerance = self.options.match_tolerance;
        let mut matches = Vec::new();

        for line in lines {
            let fields = [
                (MatchField::Money, line.money),
                (MatchField::Votes, line.votes as f64),
            ];
            for (field, value) in fields {
                if value == 0.0 {
                    continue;
                }
                if let Some(n) = numbers.iter().find(|n| (value - **n).abs() < tolerance) {
                    matches.push(ExactMatch {
                        city: line.city.clone(),
                        name: line.name.clone(),
                        field,
                        value,
                        query_value: *n,
                        demographics: line.demographics.clone(),
                    });
                }
            }
        }

        matches
    }
}

impl Default for StrategicReportBuilder<'_> {
    fn default() -> Self {
        Self::new(ReportOptions::default())
    }
}

// ============================================================================
// FORMATTING
// ============================================================================

fn group_digits(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// 1234567 → "1,234,567"
pub fn group_thousands(n: u64) -> String {
    group_digits(&n.to_string())
}

/// 1234.5 → "1,234.50"
pub fn format_money(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, group_digits(int_part), frac_part)
}

// ============================================================================
// TESTS
// ============================================================================
