//! Configuration loading
//!
//! A TOML file with every field optional. Resolution order for the file:
//! 1. explicit path (CLI `--config`)
//! 2. `CAMPAIGN_ATLAS_CONFIG` environment variable
//! 3. `campaign-atlas.toml` in the working directory
//! 4. built-in defaults

use crate::error::{Error, Result};
use crate::report::ReportOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "CAMPAIGN_ATLAS_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "campaign-atlas.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Raw electoral roll (delimited text)
    pub roll_source: PathBuf,
    /// Persisted per-city demographic table
    pub demographics: PathBuf,
    pub votes_ledger: PathBuf,
    pub investments_ledger: PathBuf,
    /// Cache of the rebuilt campaign summary
    pub campaign_summary: PathBuf,
    /// Optional names / populations table
    pub cities: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            roll_source: PathBuf::from("perfil_eleitorado.csv"),
            demographics: PathBuf::from("dados_eleitorais.json"),
            votes_ledger: PathBuf::from("votos_data.json"),
            investments_ledger: PathBuf::from("investments_data.json"),
            campaign_summary: PathBuf::from("campaign_data.json"),
            cities: PathBuf::from("cidades_pr.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Roll rows outside this region are skipped
    pub region_code: String,
    pub paths: PathsConfig,
    pub report: ReportOptions,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        AtlasConfig {
            region_code: "PR".to_string(),
            paths: PathsConfig::default(),
            report: ReportOptions::default(),
        }
    }
}

impl AtlasConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: AtlasConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Load following the resolution order; no file at all means defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::from_file(local);
        }

        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.region_code.trim().is_empty() {
            return Err(Error::Config("region_code must not be empty".to_string()));
        }
        if self.report.top_n == 0 {
            return Err(Error::Config("report.top_n must be at least 1".to_string()));
        }
        let tolerance = self.report.match_tolerance;
        if tolerance.is_nan() || tolerance < 0.0 {
            return Err(Error::Config(
                "report.match_tolerance must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AtlasConfig::default();
        assert_eq!(config.region_code, "PR");
        assert_eq!(config.report.match_tolerance, 1.0);
        assert_eq!(config.report.top_n, 10);
        assert_eq!(config.report.full_list_max_cities, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AtlasConfig::from_toml_str(
            r#"
            region_code = "SC"

            [paths]
            votes_ledger = "data/votes.json"

            [report]
            top_n = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.region_code, "SC");
        assert_eq!(config.paths.votes_ledger, PathBuf::from("data/votes.json"));
        assert_eq!(config.paths.investments_ledger, PathBuf::from("investments_data.json"));
        assert_eq!(config.report.top_n, 5);
        assert_eq!(config.report.min_number_digits, 2);
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            AtlasConfig::from_toml_str("region_code = \"  \""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            AtlasConfig::from_toml_str("[report]\ntop_n = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            AtlasConfig::from_toml_str("[report]\nmatch_tolerance = -1.0"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            AtlasConfig::from_toml_str("region_code = "),
            Err(Error::Config(_))
        ));
    }
}
