use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory containing the candidate input CSVs.
    pub data_dir: PathBuf,
    /// Directory under which `processed/`, `figures/` and `tables/` are written.
    pub output_dir: PathBuf,
    /// When set, the processed panel is additionally written as Parquet.
    pub save_parquet: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: "data".into(),
            output_dir: "out".into(),
            save_parquet: false,
        }
    }
}

impl Config {
    pub fn processed_dir(&self) -> PathBuf {
        self.output_dir.join("processed")
    }

    pub fn figures_dir(&self) -> PathBuf {
        self.output_dir.join("figures")
    }

    pub fn tables_dir(&self) -> PathBuf {
        self.output_dir.join("tables")
    }
}
