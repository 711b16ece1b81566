// 👥 Demographic Aggregator - Per-city nested counters
//
// One aggregate per CityKey. While counting, values are u64 electors; after
// PercentageConverter they are f64 percentages. The value type is part of the
// aggregate's type, so a converted table cannot be converted again.
//
// Invariant (count form): total_electors == gender.masculine + feminine + unspecified

use crate::ingestion::RawRollRecord;
use crate::normalizer::{normalize, CityKey};
use crate::report::group_thousands;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::btree_map::{self, BTreeMap};
use std::fmt;

// ============================================================================
// CELL VALUES
// ============================================================================

/// Value stored in a demographic cell: u64 counts or f64 percentages
pub trait CellValue: Copy + Default + PartialEq + fmt::Debug + Serialize + DeserializeOwned {
    /// Share of the city's electorate, in percent
    fn share_of(self, total_electors: u64) -> f64;

    /// Number of electors represented by this cell
    fn headcount(self, total_electors: u64) -> f64;
}

impl CellValue for u64 {
    fn share_of(self, total_electors: u64) -> f64 {
        if total_electors == 0 {
            return 0.0;
        }
        100.0 * self as f64 / total_electors as f64
    }

    fn headcount(self, _total_electors: u64) -> f64 {
        self as f64
    }
}

impl CellValue for f64 {
    fn share_of(self, _total_electors: u64) -> f64 {
        self
    }

    fn headcount(self, total_electors: u64) -> f64 {
        self * total_electors as f64 / 100.0
    }
}

// ============================================================================
// GENDER
// ============================================================================

/// Per-row gender tag, also used to route the age-band cross-tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenderTag {
    Masculine,
    Feminine,
    Unspecified,
}

impl GenderTag {
    /// Classify a roll gender label ("MASCULINO", "FEMININO", "NÃO INFORMADO", ...)
    ///
    /// A missing or unrecognized label is Unspecified.
    pub fn from_label(label: Option<&str>) -> Self {
        let upper = match label {
            Some(l) => l.to_uppercase(),
            None => return GenderTag::Unspecified,
        };

        if upper.contains("MASC") {
            GenderTag::Masculine
        } else if upper.contains("FEM") {
            GenderTag::Feminine
        } else {
            GenderTag::Unspecified
        }
    }

    pub fn letter(&self) -> char {
        match self {
            GenderTag::Masculine => 'M',
            GenderTag::Feminine => 'F',
            GenderTag::Unspecified => 'N',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GenderBreakdown<V> {
    #[serde(alias = "masculino")]
    pub masculine: V,
    #[serde(alias = "feminino")]
    pub feminine: V,
    #[serde(alias = "nao_informado")]
    pub unspecified: V,
}

impl<V: CellValue> GenderBreakdown<V> {
    pub fn get(&self, tag: GenderTag) -> V {
        match tag {
            GenderTag::Masculine => self.masculine,
            GenderTag::Feminine => self.feminine,
            GenderTag::Unspecified => self.unspecified,
        }
    }

    fn slot_mut(&mut self, tag: GenderTag) -> &mut V {
        match tag {
            GenderTag::Masculine => &mut self.masculine,
            GenderTag::Feminine => &mut self.feminine,
            GenderTag::Unspecified => &mut self.unspecified,
        }
    }

    /// Convert every slot with the same function
    pub fn map<W>(&self, f: impl Fn(V) -> W) -> GenderBreakdown<W> {
        GenderBreakdown {
            masculine: f(self.masculine),
            feminine: f(self.feminine),
            unspecified: f(self.unspecified),
        }
    }
}

impl GenderBreakdown<u64> {
    pub fn add(&mut self, tag: GenderTag, electors: u64) {
        *self.slot_mut(tag) += electors;
    }

    pub fn sum(&self) -> u64 {
        self.masculine + self.feminine + self.unspecified
    }
}

impl GenderBreakdown<f64> {
    pub fn sum(&self) -> f64 {
        self.masculine + self.feminine + self.unspecified
    }
}

// ============================================================================
// AGE BANDS
// ============================================================================

/// Age band label, kept verbatim.
///
/// Ordered by the number the label starts with, so the pyramid reads from the
/// youngest band up: "16 anos" < "21 a 24 anos" < "100 anos ou mais".
/// Labels without a leading number come last, by text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgeBand(String);

impl AgeBand {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading number of the label, e.g. 25 for "25 a 34 anos"
    pub fn lower_bound(&self) -> Option<u32> {
        let label = self.0.trim_start();
        let end = label
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(label.len());
        label[..end].parse().ok()
    }

    fn sort_key(&self) -> (bool, Option<u32>, &str) {
        let bound = self.lower_bound();
        (bound.is_none(), bound, self.0.as_str())
    }
}

impl Ord for AgeBand {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for AgeBand {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for AgeBand {
    fn from(label: &str) -> Self {
        AgeBand(label.to_string())
    }
}

impl From<String> for AgeBand {
    fn from(label: String) -> Self {
        AgeBand(label)
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One age band of the population pyramid, split by the gender seen on the same row
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgeBandCell<V> {
    #[serde(rename = "M")]
    pub masculine: V,
    #[serde(rename = "F")]
    pub feminine: V,
    #[serde(rename = "N")]
    pub unspecified: V,
}

impl<V: CellValue> AgeBandCell<V> {
    pub fn map<W>(&self, f: impl Fn(V) -> W) -> AgeBandCell<W> {
        AgeBandCell {
            masculine: f(self.masculine),
            feminine: f(self.feminine),
            unspecified: f(self.unspecified),
        }
    }
}

impl AgeBandCell<u64> {
    pub fn add(&mut self, tag: GenderTag, electors: u64) {
        match tag {
            GenderTag::Masculine => self.masculine += electors,
            GenderTag::Feminine => self.feminine += electors,
            GenderTag::Unspecified => self.unspecified += electors,
        }
    }
}

// ============================================================================
// CITY AGGREGATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityDemographicAggregate<V> {
    #[serde(alias = "nome")]
    pub display_name: String,

    #[serde(alias = "total_eleitores")]
    pub total_electors: u64,

    #[serde(alias = "genero")]
    pub gender: GenderBreakdown<V>,

    /// age band → gender split (two-level mapping, never flattened), youngest first
    #[serde(alias = "faixa_etaria", default)]
    pub age_band: BTreeMap<AgeBand, AgeBandCell<V>>,

    #[serde(alias = "grau_instrucao", default)]
    pub education: BTreeMap<String, V>,

    #[serde(alias = "estado_civil", default)]
    pub marital_status: BTreeMap<String, V>,

    #[serde(alias = "cor_raca", default)]
    pub race: BTreeMap<String, V>,
}

impl CityDemographicAggregate<u64> {
    /// Zero-initialized aggregate, created on first sight of a city
    pub fn new(display_name: &str) -> Self {
        CityDemographicAggregate {
            display_name: display_name.to_string(),
            total_electors: 0,
            gender: GenderBreakdown::default(),
            age_band: BTreeMap::new(),
            education: BTreeMap::new(),
            marital_status: BTreeMap::new(),
            race: BTreeMap::new(),
        }
    }

    /// Route one row's elector count into every counter
    pub fn add_row(&mut self, electors: u64, row: &RawRollRecord<'_>) {
        self.total_electors += electors;

        let tag = GenderTag::from_label(row.gender.as_deref());
        self.gender.add(tag, electors);

        if let Some(band) = non_blank(row.age_band.as_deref()) {
            self.age_band
                .entry(AgeBand::from(band))
                .or_default()
                .add(tag, electors);
        }

        bump(&mut self.education, row.education.as_deref(), electors);
        bump(&mut self.marital_status, row.marital_status.as_deref(), electors);
        bump(&mut self.race, row.race.as_deref(), electors);
    }

    /// total_electors == sum(gender)
    pub fn is_consistent(&self) -> bool {
        self.total_electors == self.gender.sum()
    }
}

impl<V: CellValue> CityDemographicAggregate<V> {
    pub fn age_band_cell(&self, label: &str) -> Option<&AgeBandCell<V>> {
        self.age_band.get(&AgeBand::from(label))
    }

    /// Percentage of female electors
    pub fn female_share(&self) -> f64 {
        self.gender.feminine.share_of(self.total_electors)
    }

    /// Age band with the highest combined masculine + feminine share.
    /// Ties keep the youngest band.
    pub fn dominant_age_band(&self) -> Option<&str> {
        let mut best: Option<&str> = None;
        let mut best_share = -1.0;

        for (band, cell) in &self.age_band {
            let share = cell.masculine.share_of(self.total_electors)
                + cell.feminine.share_of(self.total_electors);
            if share > best_share {
                best_share = share;
                best = Some(band.as_str());
            }
        }

        best
    }

    pub fn digest(&self) -> DemographicDigest {
        DemographicDigest {
            total_electors: self.total_electors,
            female_pct: self.female_share(),
            dominant_age_band: self.dominant_age_band().map(str::to_string),
        }
    }
}

fn non_blank(label: Option<&str>) -> Option<&str> {
    label.map(str::trim).filter(|l| !l.is_empty())
}

// Labels are kept verbatim (trimmed), never normalized
fn bump(counter: &mut BTreeMap<String, u64>, label: Option<&str>, electors: u64) {
    if let Some(label) = non_blank(label) {
        *counter.entry(label.to_string()).or_insert(0) += electors;
    }
}

// ============================================================================
// DIGEST
// ============================================================================

/// One-line demographic summary attached to report entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemographicDigest {
    pub total_electors: u64,
    pub female_pct: f64,
    pub dominant_age_band: Option<String>,
}

impl fmt::Display for DemographicDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Electorate: {} | Women: {:.1}% | Main age band: {}",
            group_thousands(self.total_electors),
            self.female_pct,
            self.dominant_age_band.as_deref().unwrap_or("N/A")
        )
    }
}

// ============================================================================
// TABLE
// ============================================================================

/// State-wide sums across every city in a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StateTotals {
    pub cities: usize,
    pub total_electors: u64,
    pub masculine: u64,
    pub feminine: u64,
}

/// CityKey → aggregate. BTreeMap keeps serialization deterministic.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent, bound(deserialize = "V: CellValue"))]
pub struct DemographicTable<V> {
    cities: BTreeMap<CityKey, CityDemographicAggregate<V>>,
}

impl<V: CellValue> DemographicTable<V> {
    pub fn new() -> Self {
        DemographicTable {
            cities: BTreeMap::new(),
        }
    }

    pub fn from_map(cities: BTreeMap<CityKey, CityDemographicAggregate<V>>) -> Self {
        DemographicTable { cities }
    }

    pub fn get(&self, key: &CityKey) -> Option<&CityDemographicAggregate<V>> {
        self.cities.get(key)
    }

    /// Lookup by a free-text name, through the same normalizer as the roll
    pub fn find_by_name(&self, name: &str) -> Option<&CityDemographicAggregate<V>> {
        self.cities.get(&normalize(name))
    }

    pub fn digest(&self, key: &CityKey) -> Option<DemographicDigest> {
        self.get(key).map(CityDemographicAggregate::digest)
    }

    /// Registered electors for a city (0 when unknown)
    pub fn registered_electors(&self, key: &CityKey) -> u64 {
        self.get(key).map(|c| c.total_electors).unwrap_or(0)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, CityKey, CityDemographicAggregate<V>> {
        self.cities.iter()
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<CityKey, CityDemographicAggregate<V>> {
        self.cities
    }

    /// Sum electors and gender headcounts across the state.
    /// On a percentage table the gender headcounts are reconstructed
    /// from the rounded percentages, so they are approximate.
    pub fn state_totals(&self) -> StateTotals {
        let mut totals = StateTotals {
            cities: self.cities.len(),
            ..StateTotals::default()
        };
        let mut masculine = 0.0;
        let mut feminine = 0.0;

        for city in self.cities.values() {
            totals.total_electors += city.total_electors;
            masculine += city.gender.masculine.headcount(city.total_electors);
            feminine += city.gender.feminine.headcount(city.total_electors);
        }

        totals.masculine = masculine.round() as u64;
        totals.feminine = feminine.round() as u64;
        totals
    }
}

impl<'a, V> IntoIterator for &'a DemographicTable<V> {
    type Item = (&'a CityKey, &'a CityDemographicAggregate<V>);
    type IntoIter = btree_map::Iter<'a, CityKey, CityDemographicAggregate<V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.cities.iter()
    }
}

// ============================================================================
// AGGREGATOR
// ============================================================================

/// Owns the growing count-form map during one ingestion pass
#[derive(Debug, Default)]
pub struct DemographicAggregator {
    cities: BTreeMap<CityKey, CityDemographicAggregate<u64>>,
}

impl DemographicAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one retained row. The first display name seen for a key is kept.
    pub fn record(
        &mut self,
        key: CityKey,
        display_name: &str,
        electors: u64,
        row: &RawRollRecord<'_>,
    ) {
        self.cities
            .entry(key)
            .or_insert_with(|| CityDemographicAggregate::new(display_name))
            .add_row(electors, row);
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }

    pub fn into_table(self) -> DemographicTable<u64> {
        DemographicTable::from_map(self.cities)
    }
}
