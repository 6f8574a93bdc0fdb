//! Per-year coverage and imputation accounting for the working panel.
//!
//! For each variable, availability is the percentage of panel rows that year with a non-missing
//! value; the imputed share is the percentage of the *available* observations whose imputation
//! flag is set. Cells are `None` ("undefined") when a year has no available observations for a
//! flagged variable, or when the variable carries no flag at all.

use std::collections::BTreeMap;

use log::debug;
use polars::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::schema::{aliases_for, pick_first, PanelKeys};
use crate::COL;

/// One measured quantity for coverage/imputation reporting: a display label, the resolved value
/// column (absent when the current data vintage lacks it) and the resolved imputation-flag
/// column. Constructed once per report run from the working panel's column set; immutable
/// afterwards.
#[derive(Debug, Clone)]
pub struct VariableDescriptor {
    pub label: String,
    pub value_column: Option<String>,
    pub flag_column: Option<String>,
}

impl VariableDescriptor {
    fn resolved(label: &str, df: &DataFrame, value: &str, flag: Option<&str>) -> Self {
        let columns = df.get_column_names();
        let resolve = |canonical: &str| {
            aliases_for(canonical)
                .and_then(|candidates| pick_first(&columns, candidates))
                .map(|c| c.to_string())
        };
        Self {
            label: label.to_string(),
            value_column: resolve(value),
            flag_column: flag.and_then(resolve),
        }
    }
}

/// The standard variable map of the missingness report, resolved against the working panel.
///
/// "Real short rate" is statically declared: the derivation stage guarantees the column exists
/// (possibly all-null), so the variable reports 0% coverage instead of disappearing when it
/// cannot be computed.
pub fn standard_descriptors(df: &DataFrame) -> Vec<VariableDescriptor> {
    vec![
        VariableDescriptor::resolved("log Z-score", df, COL::LOGZ, None),
        VariableDescriptor::resolved(
            "Tier-1 capital ratio",
            df,
            COL::CAPITAL,
            Some(COL::IMPUTED_TIER1),
        ),
        VariableDescriptor::resolved("NPL ratio", df, COL::NPL, Some(COL::IMPUTED_NPL)),
        VariableDescriptor::resolved("GDP growth", df, COL::GDP_G, None),
        VariableDescriptor::resolved("Unemployment", df, COL::UNEMP, None),
        VariableDescriptor::resolved("Inflation", df, COL::INFL, None),
        VariableDescriptor {
            label: "Real short rate".to_string(),
            value_column: Some(COL::REAL_RATE.to_string()),
            flag_column: None,
        },
        VariableDescriptor::resolved("Credit growth", df, COL::CRED_G, None),
        VariableDescriptor::resolved("Credit-to-GDP gap", df, COL::CREDGAP, None),
    ]
}

/// The coverage and imputation matrices, indexed by (variable label, year).
#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub labels: Vec<String>,
    pub years: Vec<i32>,
    /// Percentage of rows with a non-missing value, per (label, year).
    pub availability: Vec<Vec<Option<f64>>>,
    /// Percentage of available observations flagged as imputed, per (label, year). `None` for
    /// unflagged variables and for years with no available observations.
    pub imputed_share: Vec<Vec<Option<f64>>>,
    /// Whether each variable carried an imputation flag.
    pub flagged: Vec<bool>,
}

impl CoverageReport {
    pub fn flagged_labels(&self) -> Vec<&str> {
        self.labels
            .iter()
            .zip(&self.flagged)
            .filter_map(|(label, flagged)| flagged.then_some(label.as_str()))
            .collect()
    }

    pub fn unflagged_labels(&self) -> Vec<&str> {
        self.labels
            .iter()
            .zip(&self.flagged)
            .filter_map(|(label, flagged)| (!flagged).then_some(label.as_str()))
            .collect()
    }

    /// The availability matrix as a dataframe: one row per variable, one column per year.
    pub fn availability_df(&self) -> Result<DataFrame> {
        let mut series = vec![Series::new("variable", self.labels.clone())];
        for (idx, year) in self.years.iter().enumerate() {
            let values: Vec<Option<f64>> = self.availability.iter().map(|row| row[idx]).collect();
            series.push(Series::new(&year.to_string(), values));
        }
        Ok(DataFrame::new(series)?)
    }
}

#[derive(Default)]
struct YearAccumulator {
    rows: usize,
    available: usize,
    imputed: f64,
}

/// Compute the coverage and imputation matrices for the given descriptors. Descriptors whose
/// value column is absent from the panel are skipped entirely, keeping the matrices limited to
/// variables actually available in the current data vintage.
pub fn coverage_by_year(
    df: &DataFrame,
    keys: &PanelKeys,
    descriptors: &[VariableDescriptor],
) -> Result<CoverageReport> {
    let year_series = df.column(&keys.year)?.cast(&DataType::Int32)?;
    let years_column = year_series.i32()?;

    let mut sorted_years: Vec<i32> = years_column.into_iter().flatten().collect();
    sorted_years.sort_unstable();
    sorted_years.dedup();

    let mut labels = Vec::new();
    let mut availability = Vec::new();
    let mut imputed_share = Vec::new();
    let mut flagged = Vec::new();

    let column_names = df.get_column_names();
    for descriptor in descriptors {
        let Some(value_column) = descriptor
            .value_column
            .as_deref()
            .filter(|c| column_names.iter().any(|name| name == c))
        else {
            debug!("skipping {:?}: value column not present", descriptor.label);
            continue;
        };

        let values = df.column(value_column)?.cast(&DataType::Float64)?;
        let flag = descriptor
            .flag_column
            .as_deref()
            .filter(|c| column_names.iter().any(|name| name == c))
            .map(|c| df.column(c)?.cast(&DataType::Float64))
            .transpose()?;

        let mut by_year: BTreeMap<i32, YearAccumulator> = BTreeMap::new();
        let flag_values: Vec<Option<f64>> = match &flag {
            Some(series) => series.f64()?.into_iter().collect(),
            None => vec![None; df.height()],
        };
        for ((year, value), flag_value) in years_column
            .into_iter()
            .zip(values.f64()?)
            .zip(flag_values)
        {
            let Some(year) = year else { continue };
            let acc = by_year.entry(year).or_default();
            acc.rows += 1;
            if value.is_some() {
                acc.available += 1;
                // Missing flag means not imputed.
                acc.imputed += flag_value.unwrap_or(0.0);
            }
        }

        let mut avail_row = Vec::with_capacity(sorted_years.len());
        let mut imputed_row = Vec::with_capacity(sorted_years.len());
        for year in &sorted_years {
            match by_year.get(year) {
                Some(acc) if acc.rows > 0 => {
                    avail_row.push(Some(100.0 * acc.available as f64 / acc.rows as f64));
                    imputed_row.push(match (&flag, acc.available) {
                        (Some(_), available) if available > 0 => {
                            Some(100.0 * acc.imputed / available as f64)
                        }
                        _ => None,
                    });
                }
                _ => {
                    avail_row.push(None);
                    imputed_row.push(None);
                }
            }
        }

        labels.push(descriptor.label.clone());
        availability.push(avail_row);
        imputed_share.push(imputed_row);
        flagged.push(flag.is_some());
    }

    Ok(CoverageReport {
        labels,
        years: sorted_years,
        availability,
        imputed_share,
        flagged,
    })
}
