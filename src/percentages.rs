// 📊 Percentage Converter - Counts → shares of the city electorate
//
// Flat categories (gender, education, marital status, race) are rounded to
// 1 decimal. Age-band × gender cells are rounded to 2 decimals and divided by
// the city TOTAL, not the band subtotal, so the whole pyramid sums to ~100%.
//
// Rounding: half away from zero (f64::round) on the scaled binary value.
//
// Conversion consumes a DemographicTable<u64> and returns a DemographicTable<f64>;
// there is no way back and no way to convert twice.

use crate::demographics::{CityDemographicAggregate, DemographicTable};
use std::collections::BTreeMap;
use tracing::debug;

/// Decimal places for gender / education / marital status / race
pub const FLAT_DECIMALS: i32 = 1;

/// Decimal places for age-band × gender cells
pub const PYRAMID_DECIMALS: i32 = 2;

/// Round to `decimals` places, ties away from zero
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// 100 × count / total, rounded. A zero total yields 0.
pub fn percentage(count: u64, total: u64, decimals: i32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(100.0 * count as f64 / total as f64, decimals)
}

pub struct PercentageConverter;

impl PercentageConverter {
    /// Convert a whole count table
    pub fn convert(table: DemographicTable<u64>) -> DemographicTable<f64> {
        let mut skipped = 0usize;
        let converted: BTreeMap<_, _> = table
            .into_inner()
            .into_iter()
            .map(|(key, city)| {
                if city.total_electors == 0 {
                    skipped += 1;
                }
                (key, Self::convert_city(city))
            })
            .collect();

        debug!(
            cities = converted.len(),
            zero_electorate = skipped,
            "converted demographic counts to percentages"
        );

        DemographicTable::from_map(converted)
    }

    /// Convert one city. Cities with no electors stay all-zero.
    pub fn convert_city(city: CityDemographicAggregate<u64>) -> CityDemographicAggregate<f64> {
        let total = city.total_electors;

        if total == 0 {
            return CityDemographicAggregate {
                display_name: city.display_name,
                total_electors: 0,
                gender: city.gender.map(|v| v as f64),
                age_band: city
                    .age_band
                    .iter()
                    .map(|(band, cell)| (band.clone(), cell.map(|v| v as f64)))
                    .collect(),
                education: as_float(city.education),
                marital_status: as_float(city.marital_status),
                race: as_float(city.race),
            };
        }

        let flat = |count: u64| percentage(count, total, FLAT_DECIMALS);
        let pyramid = |count: u64| percentage(count, total, PYRAMID_DECIMALS);

        CityDemographicAggregate {
            gender: city.gender.map(flat),
            age_band: city
                .age_band
                .iter()
                .map(|(band, cell)| (band.clone(), cell.map(pyramid)))
                .collect(),
            education: flat_map(city.education, &flat),
            marital_status: flat_map(city.marital_status, &flat),
            race: flat_map(city.race, &flat),
            display_name: city.display_name,
            total_electors: total,
        }
    }
}

fn flat_map(
    counter: BTreeMap<String, u64>,
    flat: &impl Fn(u64) -> f64,
) -> BTreeMap<String, f64> {
    counter
        .into_iter()
        .map(|(label, count)| (label, flat(count)))
        .collect()
}

fn as_float(counter: BTreeMap<String, u64>) -> BTreeMap<String, f64> {
    counter
        .into_iter()
        .map(|(label, count)| (label, count as f64))
        .collect()
}
