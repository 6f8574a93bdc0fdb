//! Derived fields: the real short rate, the log bank-Z-score and the per-country lag.
//!
//! Each derivation has an explicit absence policy. A field that cannot be computed from any
//! available source becomes an all-null column (or is simply left absent for the lag), never an
//! error: downstream consumers treat missing derived fields as a valid state.

use log::{debug, warn};
use polars::prelude::*;

use crate::error::Result;
use crate::merge::left_join_unique;
use crate::schema::{aliases_for, pick_first, resolve_keys, PanelKeys};
use crate::COL;

/// Attach the real short rate to a harmonized master panel.
///
/// Preference order: a rate column already on the master; a rate column from the supplementary
/// real-rate table (merged on country+year); the row-wise fallback `policy − inflation`; an
/// all-null column when none of these are available.
pub fn with_real_rate(master: DataFrame, keys: &PanelKeys, rr: Option<&DataFrame>) -> Result<DataFrame> {
    let has = |df: &DataFrame, name: &str| df.get_column_names().iter().any(|c| *c == name);

    if has(&master, COL::REAL_RATE) {
        return Ok(master);
    }

    if let Some(rr) = rr {
        let rr_keys = resolve_keys(rr)?;
        let rr_columns = rr.get_column_names();
        let candidates = aliases_for(COL::REAL_RATE).expect("real_rate is in the alias table");
        if let Some(rate_col) = pick_first(&rr_columns, candidates) {
            debug!("taking {} from the real-rate table", rate_col);
            let rate_col = rate_col.to_string();
            return left_join_unique(
                master,
                keys,
                rr,
                &rr_keys,
                &[(rate_col.as_str(), COL::REAL_RATE)],
            );
        }
        // A real-rate file without a rate column is allowed; fall through to the computed
        // fallback.
        warn!("real-rate table has no recognizable rate column");
    }

    if has(&master, COL::POLICY_RATE) && has(&master, COL::INFL) {
        debug!("computing real rate as policy - inflation");
        return Ok(master
            .lazy()
            .with_column(
                (col(COL::POLICY_RATE).cast(DataType::Float64)
                    - col(COL::INFL).cast(DataType::Float64))
                .alias(COL::REAL_RATE),
            )
            .collect()?);
    }

    debug!("real rate unavailable from any source; propagating nulls");
    let mut master = master;
    master.with_column(Series::full_null(
        COL::REAL_RATE,
        master.height(),
        &DataType::Float64,
    ))?;
    Ok(master)
}

/// Attach the log Z-score: `ln(bank_z)` where `bank_z > 0`, null otherwise. Non-positive or
/// missing Z maps cleanly to null, protecting the logarithm from domain errors. When the panel
/// already carries `logz` (some vintages ship it in logs), it is used verbatim; when it carries
/// neither `logz` nor `bank_z`, the panel is returned unchanged.
pub fn with_log_z(df: DataFrame) -> Result<DataFrame> {
    let names = df.get_column_names();
    if names.iter().any(|c| *c == COL::LOGZ) {
        return Ok(df);
    }
    if !names.iter().any(|c| *c == COL::BANK_Z) {
        return Ok(df);
    }
    let z = col(COL::BANK_Z).cast(DataType::Float64);
    Ok(df
        .lazy()
        .with_column(
            when(z.clone().gt(lit(0.0)))
                .then(z.log(std::f64::consts::E))
                .otherwise(lit(NULL))
                .alias(COL::LOGZ),
        )
        .collect()?)
}

/// Attach the lag-1 value of `target` within each country's partition, sorted by year.
///
/// Policy: row-previous, not calendar-previous. With non-contiguous years the lag is the value
/// from the immediately preceding row of the same country; a gap year does not invalidate it.
/// The first observation of each country gets null. Left unchanged when `target` is absent or
/// `output` already exists.
pub fn with_lag(df: DataFrame, keys: &PanelKeys, target: &str, output: &str) -> Result<DataFrame> {
    let names = df.get_column_names();
    if !names.iter().any(|c| *c == target) || names.iter().any(|c| *c == output) {
        return Ok(df);
    }
    Ok(df
        .lazy()
        .sort(
            [keys.country.as_str(), keys.year.as_str()],
            SortMultipleOptions::default(),
        )
        .with_column(
            col(target)
                .shift(lit(1))
                .over([col(keys.country.as_str())])
                .alias(output),
        )
        .collect()?)
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;

    fn keys() -> PanelKeys {
        PanelKeys::canonical()
    }

    #[test]
    fn test_log_z_guards_domain() -> anyhow::Result<()> {
        let df = df!(
            "country" => &["DE", "DE", "DE", "DE"],
            "year" => &[2000i32, 2001, 2002, 2003],
            "bank_z" => &[Some(4.0), Some(0.0), Some(-1.0), None]
        )?;
        let out = with_log_z(df)?;
        let logz: Vec<Option<f64>> = out.column("logz")?.f64()?.into_iter().collect();
        assert_eq!(logz[0], Some(4.0f64.ln()));
        assert_eq!(&logz[1..], &[None, None, None]);
        Ok(())
    }

    #[test]
    fn test_log_z_passthrough_when_present() -> anyhow::Result<()> {
        let df = df!(
            "country" => &["DE"],
            "year" => &[2000i32],
            "logz" => &[1.5],
            "bank_z" => &[100.0]
        )?;
        let out = with_log_z(df.clone())?;
        assert_eq!(out, df);
        Ok(())
    }

    #[test]
    fn test_lag_is_row_previous_within_country() -> anyhow::Result<()> {
        // Years are non-contiguous: the lag takes the prior row, not the prior calendar year.
        let df = df!(
            "country" => &["AT", "AT", "AT", "BE", "BE"],
            "year" => &[2000i32, 2001, 2003, 2000, 2001],
            "cred_g" => &[1.0, 2.0, 3.0, 10.0, 20.0]
        )?;
        let out = with_lag(df, &keys(), "cred_g", "l1_cred_g")?;
        let lag: Vec<Option<f64>> = out.column("l1_cred_g")?.f64()?.into_iter().collect();
        assert_eq!(
            lag,
            vec![None, Some(1.0), Some(2.0), None, Some(10.0)],
            "lag must not cross country boundaries"
        );
        Ok(())
    }

    #[test]
    fn test_lag_sorts_unsorted_input() -> anyhow::Result<()> {
        let df = df!(
            "country" => &["AT", "AT", "AT"],
            "year" => &[2003i32, 2000, 2001],
            "cred_g" => &[3.0, 1.0, 2.0]
        )?;
        let out = with_lag(df, &keys(), "cred_g", "l1_cred_g")?;
        let lag: Vec<Option<f64>> = out.column("l1_cred_g")?.f64()?.into_iter().collect();
        assert_eq!(lag, vec![None, Some(1.0), Some(2.0)]);
        Ok(())
    }

    #[test]
    fn test_lag_skipped_when_target_absent() -> anyhow::Result<()> {
        let df = df!("country" => &["AT"], "year" => &[2000i32])?;
        let out = with_lag(df.clone(), &keys(), "cred_g", "l1_cred_g")?;
        assert_eq!(out, df);
        Ok(())
    }

    #[test]
    fn test_real_rate_from_supplementary_table() -> anyhow::Result<()> {
        let master = df!(
            "country" => &["DE", "FR"],
            "year" => &[2000i32, 2000],
            "npl" => &[1.0, 2.0]
        )?;
        let rr = df!(
            "iso3" => &["DE"],
            "year" => &[2000i32],
            "real_short_rate" => &[0.25]
        )?;
        let out = with_real_rate(master, &keys(), Some(&rr))?;
        let rate: Vec<Option<f64>> = out.column("real_rate")?.f64()?.into_iter().collect();
        assert_eq!(rate, vec![Some(0.25), None]);
        Ok(())
    }

    #[test]
    fn test_real_rate_fallback_policy_minus_inflation() -> anyhow::Result<()> {
        let master = df!(
            "country" => &["DE", "FR"],
            "year" => &[2000i32, 2000],
            "policy_rate" => &[3.0, 3.0],
            "infl" => &[1.0, 2.5]
        )?;
        let out = with_real_rate(master, &keys(), None)?;
        let rate: Vec<Option<f64>> = out.column("real_rate")?.f64()?.into_iter().collect();
        assert_eq!(rate, vec![Some(2.0), Some(0.5)]);
        Ok(())
    }

    #[test]
    fn test_real_rate_unavailable_is_all_null() -> anyhow::Result<()> {
        let master = df!(
            "country" => &["DE", "FR"],
            "year" => &[2000i32, 2000],
            "npl" => &[1.0, 2.0]
        )?;
        let out = with_real_rate(master, &keys(), None)?;
        assert_eq!(out.column("real_rate")?.null_count(), 2);
        Ok(())
    }
}
