// 🏙️ City Directory - Display names and populations
//
// Optional reference table (IBGE figures) keyed by CityKey. Used for
// cost-per-capita and for report display names. Population values arrive as
// numbers or numeric strings depending on how the file was produced.

use crate::error::{Error, Result};
use crate::normalizer::{normalize, CityKey};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CityRecord {
    #[serde(alias = "nome", default)]
    pub name: String,

    #[serde(alias = "habitantes", default, deserialize_with = "lenient_population")]
    pub population: u64,
}

fn lenient_population<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let population = match &value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => {
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            digits.parse().ok()
        }
        _ => None,
    };
    Ok(population.unwrap_or(0))
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CityDirectory {
    cities: BTreeMap<CityKey, CityRecord>,
}

impl CityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from JSON; a missing file gives an empty directory
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "city directory not found, populations unknown");
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(Error::from)
    }

    pub fn insert(&mut self, name: &str, population: u64) {
        self.cities.insert(
            normalize(name),
            CityRecord {
                name: name.to_string(),
                population,
            },
        );
    }

    pub fn get(&self, key: &CityKey) -> Option<&CityRecord> {
        self.cities.get(key)
    }

    /// Population, 0 when unknown
    pub fn population(&self, key: &CityKey) -> u64 {
        self.get(key).map(|c| c.population).unwrap_or(0)
    }

    pub fn name(&self, key: &CityKey) -> Option<&str> {
        self.get(key)
            .map(|c| c.name.as_str())
            .filter(|n| !n.is_empty())
    }

    pub fn len(&self) -> usize {
        self.cities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}
