// 🗳️ Roll Ingestion Pipeline - Stream the electoral roll into city aggregates
//
// The roll can hold millions of rows, so it is never parsed into a Vec.
// One line buffer and one ByteRecord are reused for every row; the only
// growing state is the per-city aggregate map.
//
// A record never spans lines. A line with an unbalanced quote is counted as
// malformed and the next line starts a fresh record.
//
// Per row:
//   1. region filter (case-insensitive exact match)
//   2. blank municipality → skip
//   3. elector count, parse failure → 0 (row is kept)
//   4. gender tag, reused for the age-band cross-tab of the SAME row
//   5. education / marital status / race by verbatim label

use crate::columns::{CanonicalField, ResolvedColumns};
use crate::demographics::{DemographicAggregator, DemographicTable};
use crate::error::{Error, Result};
use crate::normalizer::normalize;
use csv::{ByteRecord, Reader, ReaderBuilder};
use serde::Serialize;
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

/// Buffer large enough to peek a full header line
const READ_BUFFER_BYTES: usize = 64 * 1024;

/// Per-line parser buffer; longer lines are refilled
const LINE_BUFFER_BYTES: usize = 1024;

// ============================================================================
// RAW RECORD
// ============================================================================

/// One row of the roll, borrowed from the reader's buffer.
/// Transient: consumed by the aggregator and dropped.
#[derive(Debug, Clone, Default)]
pub struct RawRollRecord<'a> {
    pub region_code: Option<Cow<'a, str>>,
    pub municipality: Option<Cow<'a, str>>,
    pub elector_count: Option<Cow<'a, str>>,
    pub gender: Option<Cow<'a, str>>,
    pub age_band: Option<Cow<'a, str>>,
    pub education: Option<Cow<'a, str>>,
    pub marital_status: Option<Cow<'a, str>>,
    pub race: Option<Cow<'a, str>>,
}

impl<'a> RawRollRecord<'a> {
    pub fn from_byte_record(record: &'a ByteRecord, columns: &ResolvedColumns) -> Self {
        let field = |f: CanonicalField| {
            columns
                .index(f)
                .and_then(|i| record.get(i))
                .map(decode_field)
        };

        RawRollRecord {
            region_code: field(CanonicalField::RegionCode),
            municipality: field(CanonicalField::Municipality),
            elector_count: field(CanonicalField::ElectorCount),
            gender: field(CanonicalField::Gender),
            age_band: field(CanonicalField::AgeBand),
            education: field(CanonicalField::Education),
            marital_status: field(CanonicalField::MaritalStatus),
            race: field(CanonicalField::Race),
        }
    }

    pub fn is_in_region(&self, region_code: &str) -> bool {
        self.region_code
            .as_deref()
            .map(|r| r.trim().eq_ignore_ascii_case(region_code))
            .unwrap_or(false)
    }

    /// Trimmed municipality name, None when blank
    pub fn municipality_name(&self) -> Option<&str> {
        self.municipality
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

/// UTF-8 when valid, otherwise each byte is read as Latin-1
pub fn decode_field(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| b as char).collect()),
    }
}

/// Parse an elector count, None when the text is not a non-negative integer
pub fn parse_elector_count(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()
}

/// Odd number of quote bytes: a quoted field is left open on this line
pub fn has_open_quote(line: &[u8]) -> bool {
    line.iter().filter(|b| **b == b'"').count() % 2 == 1
}

/// Semicolon when the header line contains one, comma otherwise
pub fn detect_delimiter(first_line: &[u8]) -> u8 {
    if first_line.contains(&b';') {
        b';'
    } else {
        b','
    }
}

// ============================================================================
// STATS
// ============================================================================

/// Diagnostics for one pass. Not part of the persisted output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestionStats {
    pub rows_seen: u64,
    pub rows_retained: u64,
    pub rows_outside_region: u64,
    pub blank_municipality_rows: u64,
    pub malformed_rows: u64,
    pub unparseable_counts: u64,
    pub delimiter: char,
    pub missing_fields: Vec<CanonicalField>,
}

impl IngestionStats {
    pub fn summary(&self) -> String {
        format!(
            "{} rows seen, {} retained ({} outside region, {} blank municipality, {} malformed, {} unparseable counts)",
            self.rows_seen,
            self.rows_retained,
            self.rows_outside_region,
            self.blank_municipality_rows,
            self.malformed_rows,
            self.unparseable_counts
        )
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    /// Count form; run PercentageConverter before persisting
    pub table: DemographicTable<u64>,
    pub stats: IngestionStats,
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Splits one physical line into fields
struct LineSplitter {
    builder: ReaderBuilder,
}

impl LineSplitter {
    fn new(delimiter: u8) -> Self {
        let mut builder = ReaderBuilder::new();
        builder
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .buffer_capacity(LINE_BUFFER_BYTES);
        LineSplitter { builder }
    }

    /// false for an empty line
    fn split(&self, line: &[u8], record: &mut ByteRecord) -> csv::Result<bool> {
        let mut reader: Reader<&[u8]> = self.builder.from_reader(line);
        reader.read_byte_record(record)
    }
}

pub struct RollIngestionPipeline {
    region_code: String,
}

impl RollIngestionPipeline {
    pub fn new(region_code: impl Into<String>) -> Self {
        RollIngestionPipeline {
            region_code: region_code.into().trim().to_string(),
        }
    }

    pub fn region_code(&self) -> &str {
        &self.region_code
    }

    /// Ingest a roll file from disk
    pub fn ingest_path(&self, path: &Path) -> Result<IngestionOutcome> {
        if !path.exists() {
            return Err(Error::MissingSource(path.to_path_buf()));
        }

        let file = File::open(path)?;
        info!(path = %path.display(), region = %self.region_code, "ingesting electoral roll");
        self.ingest_reader(file)
    }

    /// Ingest any delimited source. The delimiter is detected from the header line.
    pub fn ingest_reader<R: Read>(&self, source: R) -> Result<IngestionOutcome> {
        let mut buffered = BufReader::with_capacity(READ_BUFFER_BYTES, source);

        let delimiter = {
            let peek = buffered.fill_buf()?;
            let line_end = peek.iter().position(|b| *b == b'\n').unwrap_or(peek.len());
            detect_delimiter(&peek[..line_end])
        };

        let splitter = LineSplitter::new(delimiter);
        let mut line = Vec::new();
        let mut record = ByteRecord::new();

        // Header: first non-empty line
        loop {
            line.clear();
            if buffered.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            if splitter.split(&line, &mut record)? {
                break;
            }
        }

        let headers: Vec<String> = record
            .iter()
            .map(|h| decode_field(h).into_owned())
            .collect();
        let columns = ResolvedColumns::from_headers(&headers);

        let mut stats = IngestionStats {
            delimiter: delimiter as char,
            missing_fields: columns.missing(),
            ..IngestionStats::default()
        };

        for field in &stats.missing_fields {
            if field.is_required() {
                warn!(field = field.name(), "required column absent; no rows can be retained");
            } else {
                warn!(field = field.name(), "column absent; counter will not be populated");
            }
        }

        let mut aggregator = DemographicAggregator::new();

        loop {
            line.clear();
            if buffered.read_until(b'\n', &mut line)? == 0 {
                break;
            }

            if has_open_quote(&line) {
                stats.rows_seen += 1;
                stats.malformed_rows += 1;
                debug!(row = stats.rows_seen, "skipping row with an unbalanced quote");
                continue;
            }

            match splitter.split(&line, &mut record) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    stats.rows_seen += 1;
                    stats.malformed_rows += 1;
                    debug!(error = %e, "skipping malformed row");
                    continue;
                }
            }

            stats.rows_seen += 1;
            let row = RawRollRecord::from_byte_record(&record, &columns);

            if !row.is_in_region(&self.region_code) {
                stats.rows_outside_region += 1;
                continue;
            }

            let name = match row.municipality_name() {
                Some(name) => name,
                None => {
                    stats.blank_municipality_rows += 1;
                    continue;
                }
            };

            let key = normalize(name);
            if key.is_empty() {
                stats.blank_municipality_rows += 1;
                continue;
            }

            let electors = match row.elector_count.as_deref() {
                Some(raw) => parse_elector_count(raw).unwrap_or_else(|| {
                    stats.unparseable_counts += 1;
                    debug!(value = raw, city = %key, "unparseable elector count, using 0");
                    0
                }),
                None => 0,
            };

            aggregator.record(key, name, electors, &row);
            stats.rows_retained += 1;
        }

        info!(
            rows_seen = stats.rows_seen,
            rows_retained = stats.rows_retained,
            cities = aggregator.len(),
            "roll ingestion finished"
        );

        Ok(IngestionOutcome {
            table: aggregator.into_table(),
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::normalize;

    const ROLL: &str = "\
DT_GERACAO;SG_UF;NM_MUNICIPIO;DS_GENERO;DS_FAIXA_ETARIA;DS_GRAU_ESCOLARIDADE;DS_ESTADO_CIVIL;DS_COR_RACA;QT_ELEITORES_PERFIL
2024-08-01;PR;CURITIBA;MASCULINO;25-34;SUPERIOR COMPLETO;SOLTEIRO;BRANCA;100
2024-08-01;pr;Curitiba;FEMININO;25-34;MÉDIO COMPLETO;CASADO;PARDA;50
2024-08-01;PR;CURITIBA;NÃO INFORMADO;35-44;MÉDIO COMPLETO;SOLTEIRO;BRANCA;25
2024-08-01;SC;JOINVILLE;MASCULINO;25-34;SUPERIOR COMPLETO;SOLTEIRO;BRANCA;999
2024-08-01;PR;;FEMININO;25-34;SUPERIOR COMPLETO;SOLTEIRO;BRANCA;7
2024-08-01;PR;São José dos Pinhais;FEMININO;60-69;SUPERIOR COMPLETO;VIÚVO;AMARELA;abc
";

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter(b"SG_UF;NM_MUNICIPIO"), b';');
        assert_eq!(detect_delimiter(b"uf,municipio"), b',');
    }

    #[test]
    fn test_decode_field_latin1_fallback() {
        assert_eq!(decode_field("MÉDIO".as_bytes()), "MÉDIO");
        // "MÉDIO" in Latin-1
        assert_eq!(decode_field(&[0x4d, 0xc9, 0x44, 0x49, 0x4f]), "MÉDIO");
    }

    #[test]
    fn test_parse_elector_count() {
        assert_eq!(parse_elector_count(" 42 "), Some(42));
        assert_eq!(parse_elector_count("abc"), None);
        assert_eq!(parse_elector_count("-3"), None);
        assert_eq!(parse_elector_count(""), None);
    }

    #[test]
    fn test_ingest_filters_region_and_counts() {
        let pipeline = RollIngestionPipeline::new("PR");
        let outcome = pipeline.ingest_reader(ROLL.as_bytes()).unwrap();
        let stats = &outcome.stats;

        assert_eq!(stats.rows_seen, 6);
        assert_eq!(stats.rows_retained, 4);
        assert_eq!(stats.rows_outside_region, 1);
        assert_eq!(stats.blank_municipality_rows, 1);
        assert_eq!(stats.unparseable_counts, 1);
        assert_eq!(stats.delimiter, ';');
        assert!(stats.missing_fields.is_empty());

        let table = &outcome.table;
        assert_eq!(table.len(), 2);
        assert!(table.find_by_name("Joinville").is_none());

        let curitiba = table.get(&normalize("Curitiba")).unwrap();
        assert_eq!(curitiba.display_name, "CURITIBA");
        assert_eq!(curitiba.total_electors, 175);
        assert_eq!(curitiba.gender.masculine, 100);
        assert_eq!(curitiba.gender.feminine, 50);
        assert_eq!(curitiba.gender.unspecified, 25);
        assert_eq!(curitiba.age_band_cell("25-34").unwrap().masculine, 100);
        assert_eq!(curitiba.age_band_cell("25-34").unwrap().feminine, 50);
        assert_eq!(curitiba.age_band_cell("35-44").unwrap().unspecified, 25);
        assert_eq!(curitiba.education["MÉDIO COMPLETO"], 75);
        assert_eq!(curitiba.race["BRANCA"], 125);
        assert!(curitiba.is_consistent());

        // Unparseable count keeps the row with 0 electors
        let sjp = table.find_by_name("SÃO JOSÉ DOS PINHAIS").unwrap();
        assert_eq!(sjp.total_electors, 0);
        assert_eq!(sjp.marital_status["VIÚVO"], 0);
    }

    #[test]
    fn test_ingest_comma_source_with_lowercase_aliases() {
        let roll = "uf,municipio,qt_eleitores,genero\nPR,Londrina,10,FEMININO\nPR,Londrina,5,MASCULINO\n";
        let outcome = RollIngestionPipeline::new("pr").ingest_reader(roll.as_bytes()).unwrap();

        assert_eq!(outcome.stats.delimiter, ',');
        assert!(outcome.stats.missing_fields.contains(&CanonicalField::AgeBand));

        let londrina = outcome.table.find_by_name("londrina").unwrap();
        assert_eq!(londrina.total_electors, 15);
        // Absent columns leave their counters empty
        assert!(londrina.age_band.is_empty());
        assert!(londrina.education.is_empty());
    }

    #[test]
    fn test_missing_gender_column_counts_as_unspecified() {
        let roll = "SG_UF;NM_MUNICIPIO;QT_ELEITORES;DS_FAIXA_ETARIA\nPR;Toledo;30;25-34\n";
        let outcome = RollIngestionPipeline::new("PR").ingest_reader(roll.as_bytes()).unwrap();

        let toledo = outcome.table.find_by_name("Toledo").unwrap();
        assert_eq!(toledo.gender.unspecified, 30);
        assert_eq!(toledo.age_band_cell("25-34").unwrap().unspecified, 30);
        assert!(toledo.is_consistent());
    }

    #[test]
    fn test_missing_region_column_retains_nothing() {
        let roll = "NM_MUNICIPIO;QT_ELEITORES\nToledo;30\nCascavel;20\n";
        let outcome = RollIngestionPipeline::new("PR").ingest_reader(roll.as_bytes()).unwrap();

        assert_eq!(outcome.stats.rows_seen, 2);
        assert_eq!(outcome.stats.rows_retained, 0);
        assert!(outcome.table.is_empty());
    }

    #[test]
    fn test_short_rows_are_tolerated() {
        let roll = "SG_UF;NM_MUNICIPIO;QT_ELEITORES;DS_GENERO\nPR;Toledo\nPR;Toledo;4;FEMININO\n";
        let outcome = RollIngestionPipeline::new("PR").ingest_reader(roll.as_bytes()).unwrap();

        let toledo = outcome.table.find_by_name("Toledo").unwrap();
        assert_eq!(outcome.stats.rows_retained, 2);
        assert_eq!(toledo.total_electors, 4);
        assert_eq!(toledo.gender.feminine, 4);
    }

    #[test]
    fn test_unbalanced_quote_skips_only_that_row() {
        let roll = "SG_UF;NM_MUNICIPIO;QT_ELEITORES;DS_GENERO\n\
                    PR;Toledo;10;FEMININO\n\
                    PR;\"Cascavel;20;MASCULINO\n\
                    PR;Londrina;30;FEMININO\n\
                    \"PR\";\"Maringá\";\"40\";\"FEMININO\"\n";
        let outcome = RollIngestionPipeline::new("PR").ingest_reader(roll.as_bytes()).unwrap();
        let stats = &outcome.stats;

        assert_eq!(stats.rows_seen, 4);
        assert_eq!(stats.malformed_rows, 1);
        assert_eq!(stats.rows_retained, 3);

        let keys: Vec<&str> = outcome.table.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["londrina", "maringa", "toledo"]);
        assert_eq!(outcome.table.find_by_name("Londrina").unwrap().total_electors, 30);
        assert_eq!(outcome.table.find_by_name("Maringá").unwrap().total_electors, 40);
    }

    #[test]
    fn test_has_open_quote() {
        assert!(has_open_quote(b"PR;\"Cascavel;20\n"));
        assert!(!has_open_quote(b"\"PR\";\"Pato \"\"Branco\"\"\";5\n"));
        assert!(!has_open_quote(b"PR;Toledo;10\n"));
    }

    #[test]
    fn test_empty_source() {
        let outcome = RollIngestionPipeline::new("PR").ingest_reader("".as_bytes()).unwrap();
        assert_eq!(outcome.stats.rows_seen, 0);
        assert!(outcome.table.is_empty());
    }

    #[test]
    fn test_missing_file_is_structural() {
        let result = RollIngestionPipeline::new("PR").ingest_path(Path::new("/nonexistent/roll.csv"));
        assert!(matches!(result, Err(Error::MissingSource(_))));
    }
}
