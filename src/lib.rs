// Campaign Atlas - Core Library
// Electoral roll aggregation and campaign ledger reconciliation.
// Exposes all modules for use in the CLI and tests.

pub mod normalizer;     // City name → CityKey
pub mod columns;        // Tolerant header aliases
pub mod ingestion;      // Streaming roll ingestion
pub mod demographics;   // Per-city nested counters
pub mod percentages;    // Counts → percentages
pub mod ledger;         // Votes + investment ledgers, snapshot rebuild
pub mod metrics;        // Cost per vote / capita, conversion rate
pub mod cities;         // Names and populations
pub mod report;         // Rankings and exact-match report
pub mod store;          // JSON persistence, snapshot swapping
pub mod config;
pub mod error;

// Re-export commonly used types
pub use normalizer::{normalize, CityKey};
pub use columns::{CanonicalField, ResolvedColumns};
pub use ingestion::{
    IngestionOutcome, IngestionStats, RawRollRecord, RollIngestionPipeline,
};
pub use demographics::{
    AgeBand, AgeBandCell, CellValue, CityDemographicAggregate, DemographicAggregator,
    DemographicDigest, DemographicTable, GenderBreakdown, GenderTag, StateTotals,
};
pub use percentages::PercentageConverter;
pub use ledger::{
    CampaignSnapshot, CityCampaignSummary, InvestmentLedger, InvestmentLedgerEntry,
    LedgerMerger, RebuildStats, VotesLedger, VotesLedgerEntry,
};
pub use metrics::{CityMetrics, MetricsEngine};
pub use cities::{CityDirectory, CityRecord};
pub use report::{
    CampaignLine, ExactMatch, MatchField, Report, ReportOptions, StrategicReportBuilder,
};
pub use store::{CampaignState, RefreshOutcome, SnapshotStore};
pub use config::AtlasConfig;
pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
