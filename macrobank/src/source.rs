//! Loading the candidate source files and persisting the processed panel.
//!
//! The master panel exists in several vintages; loading prefers the most enhanced variant and
//! degrades to the base master file. Supplementary tables (real-rate, Z-score slice) are
//! optional: their absence is a valid state, not an error.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use log::{debug, info};
use polars::prelude::*;

use crate::config::Config;
use crate::error::{MacrobankError, Result};

/// Candidate master files, most enhanced variant first.
pub const MASTER_CANDIDATES: &[&str] = &[
    "Euro_B_stability_enhanced.csv",
    "Euro_B_stability_with_controls.csv",
    "Euro_B_stability_master.csv",
];

pub const REAL_RATE_FILE: &str = "master_real_rate.csv";
pub const Z_SLICE_FILE: &str = "T1_FE_Specs_bank_z_score.csv";

pub const PANEL_CSV: &str = "panel_sample.csv";
pub const PANEL_PARQUET: &str = "panel_sample.parquet";

fn read_csv(path: &Path) -> Result<DataFrame> {
    debug!("reading {}", path.display());
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(500))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Return the parsed contents of the first candidate path that exists, or `SourceNotFound`
/// naming every path tried.
pub fn load_first_available(candidates: &[PathBuf]) -> Result<DataFrame> {
    for path in candidates {
        if path.exists() {
            return read_csv(path);
        }
    }
    Err(MacrobankError::SourceNotFound {
        tried: candidates.to_vec(),
    })
}

/// Load the master panel from the configured data directory.
pub fn load_master(config: &Config) -> Result<DataFrame> {
    let candidates: Vec<PathBuf> = MASTER_CANDIDATES
        .iter()
        .map(|name| config.data_dir.join(name))
        .collect();
    load_first_available(&candidates)
}

fn load_optional(path: PathBuf) -> Result<Option<DataFrame>> {
    if path.exists() {
        Ok(Some(read_csv(&path)?))
    } else {
        debug!("optional source {} not present", path.display());
        Ok(None)
    }
}

/// Load the real short-rate table if present.
pub fn load_real_rate(config: &Config) -> Result<Option<DataFrame>> {
    load_optional(config.data_dir.join(REAL_RATE_FILE))
}

/// Load the bank Z-score slice if present.
pub fn load_z_slice(config: &Config) -> Result<Option<DataFrame>> {
    load_optional(config.data_dir.join(Z_SLICE_FILE))
}

/// Paths of the persisted panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenPanel {
    pub csv: PathBuf,
    pub parquet: Option<PathBuf>,
}

/// Persist the cleaned panel under `<output_dir>/processed/`, as CSV always and additionally as
/// Parquet when the config flag is set.
pub fn write_panel(df: &mut DataFrame, config: &Config) -> Result<WrittenPanel> {
    let processed = config.processed_dir();
    fs::create_dir_all(&processed)?;

    let csv_path = processed.join(PANEL_CSV);
    let mut file = File::create(&csv_path)?;
    CsvWriter::new(&mut file).finish(df)?;
    info!(
        "wrote {} with {} rows and {} columns",
        csv_path.display(),
        df.height(),
        df.width()
    );

    let parquet = if config.save_parquet {
        let parquet_path = processed.join(PANEL_PARQUET);
        let file = File::create(&parquet_path)?;
        ParquetWriter::new(file).finish(df)?;
        info!("wrote {}", parquet_path.display());
        Some(parquet_path)
    } else {
        None
    };

    Ok(WrittenPanel {
        csv: csv_path,
        parquet,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::TempDir;

    use super::*;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_fallback_returns_first_existing() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        // Only the third candidate exists.
        write_file(dir.path(), "c.csv", "country,year,npl\nDE,2000,1.5\n");
        let candidates = vec![
            dir.path().join("a.csv"),
            dir.path().join("b.csv"),
            dir.path().join("c.csv"),
        ];
        let df = load_first_available(&candidates)?;
        assert_eq!(df.height(), 1);
        assert!(df.column("npl").is_ok());
        Ok(())
    }

    #[test]
    fn test_fallback_prefers_earlier_candidates() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        write_file(dir.path(), "a.csv", "country,year,npl\nDE,2000,1.0\nFR,2000,2.0\n");
        write_file(dir.path(), "c.csv", "country,year,npl\nDE,2000,9.0\n");
        let candidates = vec![
            dir.path().join("a.csv"),
            dir.path().join("b.csv"),
            dir.path().join("c.csv"),
        ];
        let df = load_first_available(&candidates)?;
        assert_eq!(df.height(), 2);
        Ok(())
    }

    #[test]
    fn test_none_existing_is_source_not_found_listing_all() {
        let candidates = vec![
            PathBuf::from("/nonexistent/a.csv"),
            PathBuf::from("/nonexistent/b.csv"),
            PathBuf::from("/nonexistent/c.csv"),
        ];
        let err = load_first_available(&candidates).unwrap_err();
        let msg = err.to_string();
        for name in ["a.csv", "b.csv", "c.csv"] {
            assert!(msg.contains(name), "expected {name} in: {msg}");
        }
    }

    #[test]
    fn test_optional_sources_absent_is_none() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(load_real_rate(&config)?.is_none());
        assert!(load_z_slice(&config)?.is_none());
        Ok(())
    }

    #[test]
    fn test_write_panel_csv_only_by_default() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let config = Config {
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let mut df = polars::df!(
            "country" => &["DE", "FR"],
            "year" => &[2000i32, 2000],
            "npl" => &[1.0, 2.0]
        )?;
        let written = write_panel(&mut df, &config)?;
        assert!(written.csv.exists());
        assert!(written.parquet.is_none());
        let round_trip = load_first_available(&[written.csv])?;
        assert_eq!(round_trip.height(), 2);
        Ok(())
    }

    #[test]
    fn test_write_panel_with_parquet_flag() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let config = Config {
            output_dir: dir.path().to_path_buf(),
            save_parquet: true,
            ..Default::default()
        };
        let mut df = polars::df!(
            "country" => &["DE"],
            "year" => &[2000i32],
            "npl" => &[1.0]
        )?;
        let written = write_panel(&mut df, &config)?;
        assert!(written.parquet.as_ref().is_some_and(|p| p.exists()));
        Ok(())
    }
}
