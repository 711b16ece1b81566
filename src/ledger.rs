// ⚖️ Ledger Merger - Votes ledger + investment ledger → campaign snapshot
//
// The two ledgers are the only source of truth. A CampaignSnapshot is always
// rebuilt from scratch and has no mutators, so it is a pure function of the
// ledgers it came from:
//
//   summary[city].votes = Σ votes entries for city
//   summary[city].money = Σ investment amounts for city
//
// Entry order never changes the result. Money amounts are summed in sorted
// order so even floating-point rounding is order-independent.

use crate::error::{Error, Result};
use crate::normalizer::{normalize, CityKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::btree_map::{self, BTreeMap};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

// ============================================================================
// VOTES LEDGER
// ============================================================================

/// One year of votes for a city
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotesLedgerEntry {
    #[serde(alias = "ano")]
    pub year: i32,
    #[serde(alias = "votos")]
    pub votes: u64,
}

/// CityKey → yearly vote observations (additive, not running totals)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Vec<VotesLedgerEntry>>",
    into = "BTreeMap<String, Vec<VotesLedgerEntry>>"
)]
pub struct VotesLedger {
    cities: BTreeMap<CityKey, Vec<VotesLedgerEntry>>,
}

// Raw keys that normalize to the same CityKey are merged, not overwritten
impl From<BTreeMap<String, Vec<VotesLedgerEntry>>> for VotesLedger {
    fn from(raw: BTreeMap<String, Vec<VotesLedgerEntry>>) -> Self {
        let mut ledger = VotesLedger::default();
        for (name, entries) in raw {
            ledger.cities.entry(normalize(&name)).or_default().extend(entries);
        }
        ledger
    }
}

impl From<VotesLedger> for BTreeMap<String, Vec<VotesLedgerEntry>> {
    fn from(ledger: VotesLedger) -> Self {
        ledger
            .cities
            .into_iter()
            .map(|(key, entries)| (key.into(), entries))
            .collect()
    }
}

impl VotesLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from JSON. A missing file is an empty ledger; an unreadable or
    /// unparseable one is a structural error.
    pub fn load(path: &Path) -> Result<Self> {
        load_ledger(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_ledger(path, self)
    }

    /// Append one yearly observation
    pub fn record(&mut self, city: CityKey, year: i32, votes: u64) {
        self.cities
            .entry(city)
            .or_default()
            .push(VotesLedgerEntry { year, votes });
    }

    pub fn entries(&self, city: &CityKey) -> &[VotesLedgerEntry] {
        self.cities.get(city).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> btree_map::Iter<'_, CityKey, Vec<VotesLedgerEntry>> {
        self.cities.iter()
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}

// ============================================================================
// INVESTMENT LEDGER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentLedgerEntry {
    #[serde(rename = "cityId", default, deserialize_with = "city_id_or_none")]
    pub city_id: Option<CityKey>,

    #[serde(rename = "cityName", default)]
    pub city_name: String,

    #[serde(alias = "ano", default)]
    pub year: i32,

    #[serde(alias = "valor", default)]
    pub amount: f64,

    #[serde(default)]
    pub area: String,

    #[serde(rename = "type", alias = "tipo", default)]
    pub kind: String,

    #[serde(alias = "descricao", default)]
    pub description: String,
}

// null, missing and blank ids all mean "no city"
fn city_id_or_none<'de, D>(deserializer: D) -> std::result::Result<Option<CityKey>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.map(|s| normalize(&s)).filter(|k| !k.is_empty()))
}

impl InvestmentLedgerEntry {
    pub fn new(city_name: &str, year: i32, amount: f64) -> Self {
        let key = normalize(city_name);
        InvestmentLedgerEntry {
            city_id: if key.is_empty() { None } else { Some(key) },
            city_name: city_name.to_string(),
            year,
            amount,
            area: String::new(),
            kind: String::new(),
            description: String::new(),
        }
    }

    pub fn with_area(mut self, area: &str) -> Self {
        self.area = area.to_string();
        self
    }

    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = kind.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

/// Append-only list of investments. Several entries per city are expected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvestmentLedger {
    entries: Vec<InvestmentLedgerEntry>,
}

impl InvestmentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<InvestmentLedgerEntry>) -> Self {
        InvestmentLedger { entries }
    }

    pub fn load(path: &Path) -> Result<Self> {
        load_ledger(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_ledger(path, self)
    }

    pub fn push(&mut self, entry: InvestmentLedgerEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[InvestmentLedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn load_ledger<T>(path: &Path) -> Result<T>
where
    T: Default + serde::de::DeserializeOwned,
{
    if !path.exists() {
        warn!(path = %path.display(), "ledger file not found, starting empty");
        return Ok(T::default());
    }

    let text = fs::read_to_string(path).map_err(|e| Error::ledger(path, e))?;
    serde_json::from_str(&text).map_err(|e| Error::ledger(path, e))
}

fn save_ledger<T: Serialize>(path: &Path, ledger: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(ledger)?;
    fs::write(path, json)?;
    Ok(())
}

// ============================================================================
// CAMPAIGN SNAPSHOT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CityCampaignSummary {
    pub votes: u64,
    pub money: f64,
}

impl CityCampaignSummary {
    /// Active campaign: any recorded votes or investment
    pub fn is_active(&self) -> bool {
        self.votes != 0 || self.money != 0.0
    }
}

/// Immutable per-city summary derived from both ledgers.
/// Persisting it is a cache; rebuild is the only way to produce one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CampaignSnapshot {
    cities: BTreeMap<CityKey, CityCampaignSummary>,
}

impl CampaignSnapshot {
    pub fn get(&self, city: &CityKey) -> Option<&CityCampaignSummary> {
        self.cities.get(city)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, CityKey, CityCampaignSummary> {
        self.cities.iter()
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    pub fn total_votes(&self) -> u64 {
        self.cities.values().map(|s| s.votes).sum()
    }

    /// Canonical JSON: keys sorted, compact
    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// SHA-256 of the canonical JSON; equal ledgers give equal fingerprints
    pub fn fingerprint(&self) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.to_canonical_json()?.as_bytes());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

impl<'a> IntoIterator for &'a CampaignSnapshot {
    type Item = (&'a CityKey, &'a CityCampaignSummary);
    type IntoIter = btree_map::Iter<'a, CityKey, CityCampaignSummary>;

    fn into_iter(self) -> Self::IntoIter {
        self.cities.iter()
    }
}

// ============================================================================
// MERGER
// ============================================================================

/// Counters from one rebuild, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RebuildStats {
    pub vote_cities: usize,
    pub investment_entries: usize,
    pub skipped_investments: usize,
    pub cities: usize,
}

pub struct LedgerMerger;

impl LedgerMerger {
    pub fn new() -> Self {
        LedgerMerger
    }

    /// Full rebuild from both ledgers
    pub fn rebuild(&self, votes: &VotesLedger, investments: &InvestmentLedger) -> CampaignSnapshot {
        self.rebuild_with_stats(votes, investments).0
    }

    pub fn rebuild_with_stats(
        &self,
        votes: &VotesLedger,
        investments: &InvestmentLedger,
    ) -> (CampaignSnapshot, RebuildStats) {
        let mut cities: BTreeMap<CityKey, CityCampaignSummary> = BTreeMap::new();
        let mut stats = RebuildStats {
            vote_cities: votes.len(),
            investment_entries: investments.len(),
            ..RebuildStats::default()
        };

        // 1. Votes: sum of every yearly entry
        for (city, entries) in votes.iter() {
            let total: u64 = entries.iter().map(|e| e.votes).sum();
            cities.entry(city.clone()).or_default().votes = total;
        }

        // 2. Investments: accumulate, never overwrite
        let mut amounts: BTreeMap<CityKey, Vec<f64>> = BTreeMap::new();
        for entry in investments.entries() {
            match &entry.city_id {
                Some(city) => amounts.entry(city.clone()).or_default().push(entry.amount),
                None => stats.skipped_investments += 1,
            }
        }

        for (city, mut values) in amounts {
            values.sort_by(f64::total_cmp);
            cities.entry(city).or_default().money = values.iter().sum();
        }

        if stats.skipped_investments > 0 {
            warn!(
                skipped = stats.skipped_investments,
                "investment entries without a city id were ignored"
            );
        }

        stats.cities = cities.len();
        info!(
            cities = stats.cities,
            vote_cities = stats.vote_cities,
            investments = stats.investment_entries,
            "campaign snapshot rebuilt"
        );

        (CampaignSnapshot { cities }, stats)
    }
}

impl Default for LedgerMerger {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CityKey {
        normalize(name)
    }

    #[test]
    fn test_rebuild_sums_votes_and_money() {
        let votes: VotesLedger = serde_json::from_str(
            r#"{"curitiba": [{"year": 2020, "votes": 100}, {"year": 2024, "votes": 150}]}"#,
        )
        .unwrap();
        let investments: InvestmentLedger = serde_json::from_str(
            r#"[{"cityId": "curitiba", "amount": 1000}, {"cityId": "curitiba", "amount": 500}]"#,
        )
        .unwrap();

        let snapshot = LedgerMerger::new().rebuild(&votes, &investments);

        assert_eq!(snapshot.len(), 1);
        let curitiba = snapshot.get(&key("curitiba")).unwrap();
        assert_eq!(curitiba.votes, 250);
        assert_eq!(curitiba.money, 1500.0);
    }

    #[test]
    fn test_city_in_one_ledger_gets_zero_for_other() {
        let mut votes = VotesLedger::new();
        votes.record(key("Cascavel"), 2024, 80);

        let mut investments = InvestmentLedger::new();
        investments.push(InvestmentLedgerEntry::new("Londrina", 2024, 250.0));

        let snapshot = LedgerMerger::new().rebuild(&votes, &investments);

        assert_eq!(snapshot.get(&key("Cascavel")).unwrap().money, 0.0);
        assert_eq!(snapshot.get(&key("Londrina")).unwrap().votes, 0);
        assert_eq!(snapshot.get(&key("Londrina")).unwrap().money, 250.0);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let mut votes = VotesLedger::new();
        votes.record(key("Curitiba"), 2020, 100);
        votes.record(key("Maringá"), 2022, 40);

        let mut investments = InvestmentLedger::new();
        investments.push(InvestmentLedgerEntry::new("Curitiba", 2024, 0.1));
        investments.push(InvestmentLedgerEntry::new("Curitiba", 2024, 0.2));

        let merger = LedgerMerger::new();
        let first = merger.rebuild(&votes, &investments);
        let second = merger.rebuild(&votes, &investments);

        assert_eq!(first, second);
        assert_eq!(
            first.to_canonical_json().unwrap(),
            second.to_canonical_json().unwrap()
        );
        assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
    }

    #[test]
    fn test_rebuild_ignores_entry_order() {
        let amounts = [0.1, 1e16, 0.2, -1e16, 0.3, 7.77];

        let forward = InvestmentLedger::from_entries(
            amounts
                .iter()
                .map(|a| InvestmentLedgerEntry::new("Toledo", 2024, *a))
                .collect(),
        );
        let backward = InvestmentLedger::from_entries(
            amounts
                .iter()
                .rev()
                .map(|a| InvestmentLedgerEntry::new("Toledo", 2024, *a))
                .collect(),
        );

        let mut votes_a = VotesLedger::new();
        votes_a.record(key("Toledo"), 2020, 5);
        votes_a.record(key("Toledo"), 2024, 9);
        let mut votes_b = VotesLedger::new();
        votes_b.record(key("Toledo"), 2024, 9);
        votes_b.record(key("Toledo"), 2020, 5);

        let merger = LedgerMerger::new();
        let a = merger.rebuild(&votes_a, &forward);
        let b = merger.rebuild(&votes_b, &backward);

        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_eq!(a.get(&key("Toledo")).unwrap().votes, 14);
    }

    #[test]
    fn test_investment_without_city_is_skipped() {
        let investments: InvestmentLedger = serde_json::from_str(
            r#"[{"cityId": "", "amount": 10}, {"amount": 20}, {"cityId": null, "amount": 5}, {"cityId": "Toledo", "amount": 1}]"#,
        )
        .unwrap();

        let (snapshot, stats) =
            LedgerMerger::new().rebuild_with_stats(&VotesLedger::new(), &investments);

        assert_eq!(stats.skipped_investments, 3);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get(&key("toledo")).unwrap().money, 1.0);
    }

    #[test]
    fn test_legacy_field_names() {
        let votes: VotesLedger =
            serde_json::from_str(r#"{"sao-jose-dos-pinhais": [{"ano": 2024, "votos": 15000}]}"#)
                .unwrap();
        let investments: InvestmentLedger = serde_json::from_str(
            r#"[{"cityId": "sao_jose_dos_pinhais", "cityName": "São José dos Pinhais", "ano": 2024,
                 "valor": 300.5, "area": "Saúde", "tipo": "Emenda", "descricao": "UBS"}]"#,
        )
        .unwrap();

        let entry = &investments.entries()[0];
        assert_eq!(entry.kind, "Emenda");
        assert_eq!(entry.description, "UBS");

        let snapshot = LedgerMerger::new().rebuild(&votes, &investments);
        let city = snapshot.get(&key("São José dos Pinhais")).unwrap();
        assert_eq!(city.votes, 15000);
        assert_eq!(city.money, 300.5);
    }

    #[test]
    fn test_votes_keys_normalizing_together_are_merged() {
        let votes: VotesLedger = serde_json::from_str(
            r#"{"Curitiba": [{"year": 2020, "votes": 10}], "curitiba": [{"year": 2024, "votes": 5}]}"#,
        )
        .unwrap();

        assert_eq!(votes.len(), 1);
        assert_eq!(votes.entries(&key("curitiba")).len(), 2);
    }

    #[test]
    fn test_summary_is_active() {
        assert!(!CityCampaignSummary::default().is_active());
        assert!(CityCampaignSummary { votes: 0, money: 1.0 }.is_active());
        assert!(CityCampaignSummary { votes: 3, money: 0.0 }.is_active());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let ledger = VotesLedger::load(Path::new("/nonexistent/votos_data.json")).unwrap();
        assert!(ledger.is_empty());
    }
}
