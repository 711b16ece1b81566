// 🧭 Column Resolver - Tolerant header detection
//
// Upstream roll files change header casing and naming between years.
// Each canonical field has an ordered list of accepted names; the first one
// present in the header row wins. Resolution happens once per file.

use serde::{Deserialize, Serialize};

// ============================================================================
// CANONICAL FIELDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanonicalField {
    RegionCode,
    Municipality,
    ElectorCount,
    Gender,
    AgeBand,
    Education,
    MaritalStatus,
    Race,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 8] = [
        CanonicalField::RegionCode,
        CanonicalField::Municipality,
        CanonicalField::ElectorCount,
        CanonicalField::Gender,
        CanonicalField::AgeBand,
        CanonicalField::Education,
        CanonicalField::MaritalStatus,
        CanonicalField::Race,
    ];

    /// Accepted header names, most preferred first
    pub fn candidates(&self) -> &'static [&'static str] {
        match self {
            CanonicalField::RegionCode => &["SG_UF", "sg_uf", "UF", "uf"],
            CanonicalField::Municipality => {
                &["NM_MUNICIPIO", "nm_municipio", "MUNICIPIO", "municipio"]
            }
            CanonicalField::ElectorCount => &[
                "QT_ELEITORES_PERFIL",
                "qt_eleitores_perfil",
                "QT_ELEITORES",
                "qt_eleitores",
            ],
            CanonicalField::Gender => &["DS_GENERO", "ds_genero", "GENERO", "genero"],
            CanonicalField::AgeBand => &[
                "DS_FAIXA_ETARIA",
                "ds_faixa_etaria",
                "FAIXA_ETARIA",
                "faixa_etaria",
            ],
            CanonicalField::Education => &[
                "DS_GRAU_ESCOLARIDADE",
                "ds_grau_escolaridade",
                "GRAU_INSTRUCAO",
                "grau_instrucao",
            ],
            CanonicalField::MaritalStatus => &[
                "DS_ESTADO_CIVIL",
                "ds_estado_civil",
                "ESTADO_CIVIL",
                "estado_civil",
            ],
            CanonicalField::Race => &["DS_COR_RACA", "ds_cor_raca", "COR_RACA", "cor_raca"],
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CanonicalField::RegionCode => "region code",
            CanonicalField::Municipality => "municipality",
            CanonicalField::ElectorCount => "elector count",
            CanonicalField::Gender => "gender",
            CanonicalField::AgeBand => "age band",
            CanonicalField::Education => "education",
            CanonicalField::MaritalStatus => "marital status",
            CanonicalField::Race => "race",
        }
    }

    /// Fields without which no row can be retained
    pub fn is_required(&self) -> bool {
        matches!(
            self,
            CanonicalField::RegionCode | CanonicalField::Municipality
        )
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

/// Position of the first candidate alias present in `available`.
/// Names are compared with a leading BOM and surrounding spaces removed.
pub fn resolve_index<S: AsRef<str>>(available: &[S], field: CanonicalField) -> Option<usize> {
    field.candidates().iter().find_map(|candidate| {
        available
            .iter()
            .position(|name| strip_bom(name.as_ref()).trim() == *candidate)
    })
}

/// The first candidate alias present in `available`, as written there
pub fn resolve<'a, S: AsRef<str>>(available: &'a [S], field: CanonicalField) -> Option<&'a str> {
    resolve_index(available, field).map(|i| available[i].as_ref())
}

/// Column positions for one file, computed from its header row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedColumns {
    region_code: Option<usize>,
    municipality: Option<usize>,
    elector_count: Option<usize>,
    gender: Option<usize>,
    age_band: Option<usize>,
    education: Option<usize>,
    marital_status: Option<usize>,
    race: Option<usize>,
}

impl ResolvedColumns {
    /// Resolve every canonical field against a header row
    pub fn from_headers<S: AsRef<str>>(headers: &[S]) -> Self {
        let mut columns = ResolvedColumns::default();

        for field in CanonicalField::ALL {
            *columns.slot_mut(field) = resolve_index(headers, field);
        }

        columns
    }

    pub fn index(&self, field: CanonicalField) -> Option<usize> {
        match field {
            CanonicalField::RegionCode => self.region_code,
            CanonicalField::Municipality => self.municipality,
            CanonicalField::ElectorCount => self.elector_count,
            CanonicalField::Gender => self.gender,
            CanonicalField::AgeBand => self.age_band,
            CanonicalField::Education => self.education,
            CanonicalField::MaritalStatus => self.marital_status,
            CanonicalField::Race => self.race,
        }
    }

    pub fn has(&self, field: CanonicalField) -> bool {
        self.index(field).is_some()
    }

    /// Fields with no matching alias in this file
    pub fn missing(&self) -> Vec<CanonicalField> {
        CanonicalField::ALL
            .into_iter()
            .filter(|f| !self.has(*f))
            .collect()
    }

    fn slot_mut(&mut self, field: CanonicalField) -> &mut Option<usize> {
        match field {
            CanonicalField::RegionCode => &mut self.region_code,
            CanonicalField::Municipality => &mut self.municipality,
            CanonicalField::ElectorCount => &mut self.elector_count,
            CanonicalField::Gender => &mut self.gender,
            CanonicalField::AgeBand => &mut self.age_band,
            CanonicalField::Education => &mut self.education,
            CanonicalField::MaritalStatus => &mut self.marital_status,
            CanonicalField::Race => &mut self.race,
        }
    }
}

fn strip_bom(header: &str) -> &str {
    header.strip_prefix('\u{feff}').unwrap_or(header)
}
