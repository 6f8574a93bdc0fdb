//! Pipeline orchestration: load, harmonize, merge, derive, clean and persist the panel.

use log::{debug, info};
use polars::prelude::*;

use crate::config::Config;
use crate::coverage::{coverage_by_year, standard_descriptors, CoverageReport};
use crate::derive::{with_lag, with_log_z, with_real_rate};
use crate::error::Result;
use crate::harmonize::harmonize;
use crate::merge::{assert_unique_keys, left_join_unique};
use crate::schema::{aliases_for, pick_first, resolve_keys, PanelKeys};
use crate::source::{self, WrittenPanel};
use crate::COL;

/// Type for the macrobank pipeline and API.
pub struct Macrobank {
    pub config: Config,
}

/// The merged, derived panel with its resolved keys. Keys are canonical after harmonization.
#[derive(Debug)]
pub struct WorkingPanel {
    pub df: DataFrame,
    pub keys: PanelKeys,
}

/// What a successful build produced.
#[derive(Debug)]
pub struct BuildSummary {
    pub rows: usize,
    pub columns: usize,
    pub written: WrittenPanel,
}

impl Default for Macrobank {
    fn default() -> Self {
        Self::new()
    }
}

impl Macrobank {
    /// Set up the pipeline with default configuration.
    pub fn new() -> Self {
        Self::new_with_config(Config::default())
    }

    /// Set up the pipeline with custom configuration.
    pub fn new_with_config(config: Config) -> Self {
        debug!("config: {config:?}");
        Self { config }
    }

    /// Build the merged working panel: master (harmonized) plus the optional real-rate and
    /// Z-score tables, with all derived fields attached. The result always carries a `real_rate`
    /// column (possibly all-null) and has unique (country, year) keys.
    pub fn build_working_panel(&self) -> Result<WorkingPanel> {
        let master = source::load_master(&self.config)?;
        let mut df = harmonize(master)?;
        let keys = PanelKeys::canonical();

        if let Some(z_slice) = source::load_z_slice(&self.config)? {
            df = merge_z_slice(df, &keys, &z_slice)?;
        }
        df = with_log_z(df)?;

        let real_rate = source::load_real_rate(&self.config)?;
        df = with_real_rate(df, &keys, real_rate.as_ref())?;

        df = with_lag(df, &keys, COL::CRED_G, COL::L1_CRED_G)?;

        assert_unique_keys(&df, &keys)?;
        info!(
            "working panel: {} rows, {} columns",
            df.height(),
            df.width()
        );
        Ok(WorkingPanel { df, keys })
    }

    /// The coverage/imputation report over the working panel's standard variable map.
    pub fn coverage_report(&self, panel: &WorkingPanel) -> Result<CoverageReport> {
        let descriptors = standard_descriptors(&panel.df);
        coverage_by_year(&panel.df, &panel.keys, &descriptors)
    }

    /// The cleaned, analysis-ready panel: the working panel minus rows missing any core outcome
    /// present in the data.
    pub fn clean_panel(&self) -> Result<WorkingPanel> {
        let panel = self.build_working_panel()?;
        let df = drop_missing_outcomes(panel.df)?;
        Ok(WorkingPanel {
            df,
            keys: panel.keys,
        })
    }

    /// Run the full build: working panel, cleaning, persistence.
    pub fn build(&self) -> Result<BuildSummary> {
        let panel = self.clean_panel()?;
        let mut df = panel.df;
        let written = source::write_panel(&mut df, &self.config)?;
        Ok(BuildSummary {
            rows: df.height(),
            columns: df.width(),
            written,
        })
    }
}

/// Attach the Z-score slice when the master carries neither `logz` nor `bank_z`. The slice's Z
/// column may already be in logs (`log_z` and friends) or raw (`bank_z_score` and friends); it is
/// merged under the matching canonical name so the log derivation downstream applies only where
/// needed.
fn merge_z_slice(df: DataFrame, keys: &PanelKeys, z_slice: &DataFrame) -> Result<DataFrame> {
    let names = df.get_column_names();
    if names.iter().any(|c| *c == COL::LOGZ || *c == COL::BANK_Z) {
        debug!("master already carries a Z column; skipping the Z slice");
        return Ok(df);
    }
    let z_keys = resolve_keys(z_slice)?;
    let z_columns = z_slice.get_column_names();

    let log_candidates = aliases_for(COL::LOGZ).expect("logz is in the alias table");
    let raw_candidates = aliases_for(COL::BANK_Z).expect("bank_z is in the alias table");
    let (source_col, target) = match pick_first(&z_columns, log_candidates) {
        Some(col) => (col.to_string(), COL::LOGZ),
        None => match pick_first(&z_columns, raw_candidates) {
            Some(col) => (col.to_string(), COL::BANK_Z),
            None => {
                debug!("Z slice has no recognizable Z column; skipping");
                return Ok(df);
            }
        },
    };
    left_join_unique(df, keys, z_slice, &z_keys, &[(source_col.as_str(), target)])
}

/// Drop rows missing any of the core outcomes that are present in the panel. With no core
/// outcome present the panel passes through unchanged.
fn drop_missing_outcomes(df: DataFrame) -> Result<DataFrame> {
    let present: Vec<&str> = {
        let names = df.get_column_names();
        COL::CORE_OUTCOMES
            .iter()
            .copied()
            .filter(|outcome| names.iter().any(|c| c == outcome))
            .collect()
    };
    if present.is_empty() {
        return Ok(df);
    }
    let keep = present
        .iter()
        .copied()
        .map(|c| col(c).is_not_null())
        .reduce(|acc, e| acc.and(e))
        .expect("present is non-empty");
    let before = df.height();
    let df = df.lazy().filter(keep).collect()?;
    debug!(
        "cleaning dropped {} of {} rows on outcomes {:?}",
        before - df.height(),
        before,
        present
    );
    Ok(df)
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;

    use polars::df;
    use tempfile::TempDir;

    use super::*;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut f = File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    fn config_for(dir: &TempDir) -> Config {
        Config {
            data_dir: dir.path().to_path_buf(),
            output_dir: dir.path().join("out"),
            save_parquet: false,
        }
    }

    /// Master panel per the end-to-end scenario: two countries, three years each, no
    /// supplementary files, no policy/inflation pair.
    fn write_e2e_master(dir: &TempDir) {
        write_file(
            dir.path(),
            "Euro_B_stability_master.csv",
            "country,year,capital_adequacy_ratio_filled,npl_ratio,bank_z_score\n\
             DE,2000,12.0,2.0,20.0\n\
             DE,2001,12.5,2.1,21.0\n\
             DE,2002,13.0,2.2,22.0\n\
             FR,2000,11.0,3.0,15.0\n\
             FR,2001,11.5,3.1,16.0\n\
             FR,2002,12.0,3.2,17.0\n",
        );
    }

    #[test]
    fn test_end_to_end_real_rate_undefined_but_reported() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        write_e2e_master(&dir);
        let macrobank = Macrobank::new_with_config(config_for(&dir));

        let panel = macrobank.build_working_panel()?;
        assert_eq!(panel.df.height(), 6);
        // Derived real rate exists but is entirely undefined.
        assert_eq!(panel.df.column("real_rate")?.null_count(), 6);
        // Log Z derived from the raw Z score.
        assert_eq!(panel.df.column("logz")?.null_count(), 0);

        let report = macrobank.coverage_report(&panel)?;
        let row = report
            .labels
            .iter()
            .position(|l| l == "Real short rate")
            .expect("statically declared variable must not be dropped");
        assert_eq!(report.years, vec![2000, 2001, 2002]);
        for cell in &report.availability[row] {
            assert_eq!(*cell, Some(0.0));
        }
        Ok(())
    }

    #[test]
    fn test_build_writes_clean_panel() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        write_e2e_master(&dir);
        let macrobank = Macrobank::new_with_config(config_for(&dir));
        let summary = macrobank.build()?;
        assert_eq!(summary.rows, 6);
        assert!(summary.written.csv.exists());
        Ok(())
    }

    #[test]
    fn test_missing_master_aborts_with_all_candidates() {
        let dir = TempDir::new().unwrap();
        let macrobank = Macrobank::new_with_config(config_for(&dir));
        let err = macrobank.build_working_panel().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Euro_B_stability_enhanced.csv"));
        assert!(msg.contains("Euro_B_stability_with_controls.csv"));
        assert!(msg.contains("Euro_B_stability_master.csv"));
    }

    #[test]
    fn test_real_rate_table_and_z_slice_merge() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        write_file(
            dir.path(),
            "Euro_B_stability_master.csv",
            "country,year,npl_ratio,capital\nDE,2000,2.0,12.0\nFR,2000,3.0,11.0\n",
        );
        write_file(
            dir.path(),
            "master_real_rate.csv",
            "iso3,year,real_short_rate\nDE,2000,0.5\n",
        );
        write_file(
            dir.path(),
            "T1_FE_Specs_bank_z_score.csv",
            "country,year,bank_z_score\nDE,2000,20.0\nFR,2000,-1.0\n",
        );
        let macrobank = Macrobank::new_with_config(config_for(&dir));
        let panel = macrobank.build_working_panel()?;

        let rate: Vec<Option<f64>> = panel.df.column("real_rate")?.f64()?.into_iter().collect();
        assert_eq!(rate, vec![Some(0.5), None]);
        let logz: Vec<Option<f64>> = panel.df.column("logz")?.f64()?.into_iter().collect();
        assert_eq!(logz[0], Some(20.0f64.ln()));
        assert_eq!(logz[1], None, "non-positive Z must map to undefined");
        Ok(())
    }

    #[test]
    fn test_cleaning_drops_rows_missing_present_outcomes() -> anyhow::Result<()> {
        let df = df!(
            "country" => &["DE", "DE", "FR"],
            "year" => &[2000i32, 2001, 2000],
            "npl" => &[Some(1.0), None, Some(2.0)],
            "capital" => &[Some(12.0), Some(11.0), Some(10.0)]
        )?;
        let out = drop_missing_outcomes(df)?;
        assert_eq!(out.height(), 2);
        Ok(())
    }

    #[test]
    fn test_lag_present_in_working_panel() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        write_file(
            dir.path(),
            "Euro_B_stability_master.csv",
            "country,year,npl,credit_growth\nDE,2000,1.0,5.0\nDE,2001,1.1,6.0\n",
        );
        let macrobank = Macrobank::new_with_config(config_for(&dir));
        let panel = macrobank.build_working_panel()?;
        let lag: Vec<Option<f64>> = panel.df.column("l1_cred_g")?.f64()?.into_iter().collect();
        assert_eq!(lag, vec![None, Some(5.0)]);
        Ok(())
    }
}
