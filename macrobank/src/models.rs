//! Fixed-effects regressions on the cleaned panel.
//!
//! Two-way fixed effects via country and year dummies, estimated by ordinary least squares with
//! CR1 cluster-robust standard errors, clustered by country. One fit per available outcome; the
//! right-hand side is the subset of the baseline regressors present in the panel.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::PathBuf;

use anyhow::anyhow;
use log::{info, warn};
use nalgebra::{DMatrix, DVector};
use polars::prelude::*;
use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::schema::PanelKeys;
use crate::COL;

pub const FE_TABLE_FILE: &str = "Table8_FE_Parsimonious.csv";

/// Baseline right-hand side.
pub const BASE_REGRESSORS: &[&str] = &[
    COL::GDP_G,
    COL::UNEMP,
    COL::INFL,
    COL::REAL_RATE,
    COL::L1_CRED_G,
    COL::CREDGAP,
];

/// Outcomes fitted when present in the panel.
pub const OUTCOMES: &[&str] = &[COL::LOGZ, COL::NPL, COL::CAPITAL];

#[derive(Debug, Clone, Serialize)]
pub struct FeTerm {
    pub term: String,
    pub coef: f64,
    pub se: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeFit {
    pub outcome: String,
    pub n: usize,
    pub r2: f64,
    pub adj_r2: f64,
    pub terms: Vec<FeTerm>,
}

/// Fit every available outcome on the available baseline regressors. Outcomes that fail to fit
/// (too few observations, singular design) are skipped with a warning rather than aborting the
/// run.
pub fn run_fe_models(df: &DataFrame, keys: &PanelKeys) -> Result<Vec<FeFit>> {
    let names = df.get_column_names();
    let regressors: Vec<&str> = BASE_REGRESSORS
        .iter()
        .copied()
        .filter(|r| names.iter().any(|c| c == r))
        .collect();
    let outcomes: Vec<&str> = OUTCOMES
        .iter()
        .copied()
        .filter(|o| names.iter().any(|c| c == o))
        .collect();

    let mut fits = Vec::new();
    for outcome in outcomes {
        match fit_fe(df, keys, outcome, &regressors) {
            Ok(fit) => {
                info!(
                    "FE {}: N={} R2={:.3}",
                    fit.outcome, fit.n, fit.r2
                );
                fits.push(fit);
            }
            Err(err) => warn!("skipping FE fit for {outcome}: {err}"),
        }
    }
    Ok(fits)
}

/// Fit one outcome: OLS of `outcome` on the regressors plus country and year dummies, standard
/// errors clustered by country (CR1 small-sample correction).
pub fn fit_fe(
    df: &DataFrame,
    keys: &PanelKeys,
    outcome: &str,
    regressors: &[&str],
) -> Result<FeFit> {
    let country = df.column(&keys.country)?.cast(&DataType::String)?;
    let country = country.str()?;
    let year = df.column(&keys.year)?.cast(&DataType::Int32)?;
    let year = year.i32()?;

    let y_col = df.column(outcome)?.cast(&DataType::Float64)?;
    let y_col = y_col.f64()?;
    let regressor_cols = regressors
        .iter()
        .map(|r| df.column(r)?.cast(&DataType::Float64))
        .collect::<PolarsResult<Vec<_>>>()?;

    // Complete cases only: the outcome and every regressor non-missing.
    let mut rows: Vec<(String, i32, f64, Vec<f64>)> = Vec::new();
    for idx in 0..df.height() {
        let (Some(c), Some(yr), Some(y)) = (country.get(idx), year.get(idx), y_col.get(idx))
        else {
            continue;
        };
        let mut xs = Vec::with_capacity(regressor_cols.len());
        for series in &regressor_cols {
            match series.f64()?.get(idx) {
                Some(v) => xs.push(v),
                None => break,
            }
        }
        if xs.len() == regressor_cols.len() {
            rows.push((c.to_string(), yr, y, xs));
        }
    }

    let countries: Vec<String> = rows
        .iter()
        .map(|(c, ..)| c.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let years: Vec<i32> = rows
        .iter()
        .map(|(_, yr, ..)| *yr)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let n = rows.len();
    // Intercept + regressors + (C-1) country dummies + (Y-1) year dummies.
    let k = 1 + regressors.len() + countries.len().saturating_sub(1) + years.len().saturating_sub(1);
    if n <= k {
        return Err(anyhow!("{n} complete observations for {k} parameters").into());
    }

    let mut terms: Vec<String> = vec!["Intercept".to_string()];
    terms.extend(regressors.iter().map(|r| r.to_string()));
    terms.extend(countries.iter().skip(1).map(|c| format!("C(country)[{c}]")));
    terms.extend(years.iter().skip(1).map(|yr| format!("C(year)[{yr}]")));

    let mut design = DMatrix::<f64>::zeros(n, k);
    let mut y = DVector::<f64>::zeros(n);
    for (row_idx, (c, yr, y_value, xs)) in rows.iter().enumerate() {
        y[row_idx] = *y_value;
        design[(row_idx, 0)] = 1.0;
        for (j, x) in xs.iter().enumerate() {
            design[(row_idx, 1 + j)] = *x;
        }
        let base = 1 + regressors.len();
        if let Some(pos) = countries.iter().position(|level| level == c) {
            if pos > 0 {
                design[(row_idx, base + pos - 1)] = 1.0;
            }
        }
        let base = base + countries.len().saturating_sub(1);
        if let Some(pos) = years.iter().position(|level| level == yr) {
            if pos > 0 {
                design[(row_idx, base + pos - 1)] = 1.0;
            }
        }
    }

    let xtx = design.transpose() * &design;
    let xty = design.transpose() * &y;
    let xtx_inv = xtx
        .clone()
        .try_inverse()
        .ok_or_else(|| anyhow!("singular design matrix for {outcome}"))?;
    let beta = &xtx_inv * xty;

    let fitted = &design * &beta;
    let residuals = &y - &fitted;

    // CR1: meat is the sum of per-cluster score outer products.
    let n_clusters = countries.len();
    if n_clusters < 2 {
        return Err(anyhow!("need at least two clusters, got {n_clusters}").into());
    }
    let mut meat = DMatrix::<f64>::zeros(k, k);
    for cluster in &countries {
        let mut score = DVector::<f64>::zeros(k);
        for (row_idx, (c, ..)) in rows.iter().enumerate() {
            if c == cluster {
                score += design.row(row_idx).transpose() * residuals[row_idx];
            }
        }
        meat += &score * score.transpose();
    }
    let correction = (n_clusters as f64 / (n_clusters as f64 - 1.0))
        * ((n as f64 - 1.0) / (n as f64 - k as f64));
    let covariance = &xtx_inv * meat * &xtx_inv * correction;

    let y_mean = y.mean();
    let ss_total: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
    let ss_resid: f64 = residuals.iter().map(|v| v.powi(2)).sum();
    let r2 = if ss_total > 0.0 {
        1.0 - ss_resid / ss_total
    } else {
        f64::NAN
    };
    let adj_r2 = 1.0 - (1.0 - r2) * (n as f64 - 1.0) / (n as f64 - k as f64);

    let terms = terms
        .into_iter()
        .enumerate()
        .map(|(j, term)| FeTerm {
            term,
            coef: beta[j],
            se: covariance[(j, j)].max(0.0).sqrt(),
        })
        .collect();

    Ok(FeFit {
        outcome: outcome.to_string(),
        n,
        r2,
        adj_r2,
        terms,
    })
}

/// Write the long coefficient table (outcome, term, coef, se) under `<output_dir>/tables/`.
pub fn write_fe_table(fits: &[FeFit], config: &Config) -> Result<PathBuf> {
    let tables_dir = config.tables_dir();
    fs::create_dir_all(&tables_dir)?;
    let path = tables_dir.join(FE_TABLE_FILE);

    let mut outcome = Vec::new();
    let mut term = Vec::new();
    let mut coef = Vec::new();
    let mut se = Vec::new();
    for fit in fits {
        for t in &fit.terms {
            outcome.push(fit.outcome.clone());
            term.push(t.term.clone());
            coef.push(t.coef);
            se.push(t.se);
        }
    }
    let mut table = DataFrame::new(vec![
        Series::new("outcome", outcome),
        Series::new("term", term),
        Series::new("coef", coef),
        Series::new("se", se),
    ])?;
    let mut file = File::create(&path)?;
    CsvWriter::new(&mut file).finish(&mut table)?;
    info!("wrote {}", path.display());
    Ok(path)
}
