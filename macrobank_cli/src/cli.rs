use std::fs::File;
use std::path::{Path, PathBuf};

use clap::{command, Args, Parser, Subcommand};
use enum_dispatch::enum_dispatch;
use log::info;
use macrobank::config::Config;
use macrobank::models::{run_fe_models, write_fe_table};
use macrobank::{figures, Macrobank};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::EnumString;

use crate::display::{display_build_summary, display_coverage_summary, display_fe_fits};
use crate::error::MacrobankCliResult;

/// Defines the output formats the coverage report can be produced in.
#[derive(Clone, Debug, Deserialize, Serialize, EnumString, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum OutputFormat {
    Table,
    Csv,
    Json,
}

fn write_csv_output<U>(mut data: DataFrame, output_file: Option<U>) -> MacrobankCliResult<()>
where
    U: AsRef<Path>,
{
    if let Some(output_file) = output_file {
        let mut f = File::create(output_file)?;
        CsvWriter::new(&mut f).finish(&mut data)?;
    } else {
        let mut stdout_lock = std::io::stdout().lock();
        CsvWriter::new(&mut stdout_lock).finish(&mut data)?;
    }
    Ok(())
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    fn run(&self, config: Config) -> MacrobankCliResult<()>;
}

/// Config fields that can be overridden from the command line. A flag that is not given leaves
/// the corresponding config-file (or default) value in place.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(long, help = "Directory containing the input CSVs")]
    data_dir: Option<PathBuf>,
    #[arg(long, help = "Directory to write processed data, figures and tables to")]
    output_dir: Option<PathBuf>,
    #[arg(
        long,
        default_value_t = false,
        help = "Also write the processed panel as Parquet"
    )]
    parquet: bool,
}

impl ConfigArgs {
    fn apply(&self, mut config: Config) -> Config {
        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = output_dir.clone();
        }
        if self.parquet {
            config.save_parquet = true;
        }
        config
    }
}

/// The `build` command assembles, cleans and writes the analysis panel.
#[derive(Args, Debug)]
pub struct BuildCommand {
    #[command(flatten)]
    config_args: ConfigArgs,
}

impl RunCommand for BuildCommand {
    fn run(&self, config: Config) -> MacrobankCliResult<()> {
        let macrobank = Macrobank::new_with_config(self.config_args.apply(config));
        let summary = macrobank.build()?;
        display_build_summary(&summary);
        Ok(())
    }
}

/// The `coverage` command reports per-year availability and imputation shares.
#[derive(Args, Debug)]
pub struct CoverageCommand {
    #[arg(
        short = 'f',
        long,
        value_name = "table|csv|json",
        default_value = "table",
        help = "Output format for the report"
    )]
    output_format: OutputFormat,
    #[arg(short = 'o', long, help = "Output file to place the results")]
    output_file: Option<String>,
    #[arg(
        long,
        default_value_t = 5,
        help = "Number of trailing years shown in the table"
    )]
    years: usize,
    #[command(flatten)]
    config_args: ConfigArgs,
}

impl RunCommand for CoverageCommand {
    fn run(&self, config: Config) -> MacrobankCliResult<()> {
        let macrobank = Macrobank::new_with_config(self.config_args.apply(config));
        let panel = macrobank.build_working_panel()?;
        let report = macrobank.coverage_report(&panel)?;
        match self.output_format {
            OutputFormat::Table => display_coverage_summary(&report, self.years),
            OutputFormat::Csv => write_csv_output(report.availability_df()?, self.output_file.as_ref())?,
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&report)?;
                match &self.output_file {
                    Some(path) => std::fs::write(path, json)?,
                    None => println!("{json}"),
                }
            }
        }
        Ok(())
    }
}

/// The `figures` command renders the missingness heatmap and the per-variable band charts.
#[derive(Args, Debug)]
pub struct FiguresCommand {
    #[command(flatten)]
    config_args: ConfigArgs,
}

impl RunCommand for FiguresCommand {
    fn run(&self, config: Config) -> MacrobankCliResult<()> {
        let macrobank = Macrobank::new_with_config(self.config_args.apply(config));
        let panel = macrobank.build_working_panel()?;
        let report = macrobank.coverage_report(&panel)?;
        let written = figures::write_figures(&panel, &report, &macrobank.config)?;
        for path in &written {
            println!("Wrote {}", path.display());
        }
        info!("{} figures written", written.len());
        Ok(())
    }
}

/// The `models` command fits the fixed-effects regressions and writes the coefficient table.
#[derive(Args, Debug)]
pub struct ModelsCommand {
    #[command(flatten)]
    config_args: ConfigArgs,
}

impl RunCommand for ModelsCommand {
    fn run(&self, config: Config) -> MacrobankCliResult<()> {
        let macrobank = Macrobank::new_with_config(self.config_args.apply(config));
        let panel = macrobank.clean_panel()?;
        let fits = run_fe_models(&panel.df, &panel.keys)?;
        if fits.is_empty() {
            println!("No outcome could be fitted on this panel");
            return Ok(());
        }
        display_fe_fits(&fits);
        let path = write_fe_table(&fits, &macrobank.config)?;
        println!("Wrote {}", path.display());
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Commands contains the list of subcommands avaliable for use in the CLI.
/// Each command should implmement the RunCommand trait and specify the list
/// of required args for that command.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Assemble, clean and write the analysis panel
    Build(BuildCommand),
    /// Report per-year data availability and imputation shares
    Coverage(CoverageCommand),
    /// Render the missingness heatmap and per-variable charts
    Figures(FiguresCommand),
    /// Fit the fixed-effects models and write the coefficient table
    Models(ModelsCommand),
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::str::FromStr;

    use tempfile::TempDir;

    use super::*;

    fn write_master(dir: &TempDir) {
        let path = dir.path().join("Euro_B_stability_master.csv");
        let mut f = File::create(path).unwrap();
        writeln!(f, "country,year,npl_ratio,capital,bank_z_score").unwrap();
        writeln!(f, "DE,2000,2.0,12.0,20.0").unwrap();
        writeln!(f, "DE,2001,2.1,12.5,21.0").unwrap();
        writeln!(f, "FR,2000,3.0,11.0,15.0").unwrap();
        writeln!(f, "FR,2001,3.1,11.5,16.0").unwrap();
    }

    fn config_args(dir: &TempDir) -> ConfigArgs {
        ConfigArgs {
            data_dir: Some(dir.path().to_path_buf()),
            output_dir: Some(dir.path().join("out")),
            parquet: false,
        }
    }

    #[test]
    fn test_output_format_is_case_insensitive() {
        assert_eq!(OutputFormat::from_str("CSV").unwrap(), OutputFormat::Csv);
        assert_eq!(OutputFormat::from_str("json").unwrap(), OutputFormat::Json);
        assert!(OutputFormat::from_str("yaml").is_err());
    }

    #[test]
    fn test_build_command_writes_panel() {
        let dir = TempDir::new().unwrap();
        write_master(&dir);
        let command = BuildCommand {
            config_args: config_args(&dir),
        };
        command.run(Config::default()).unwrap();
        assert!(dir
            .path()
            .join("out/processed/panel_sample.csv")
            .exists());
    }

    #[test]
    fn test_coverage_command_writes_csv() {
        let dir = TempDir::new().unwrap();
        write_master(&dir);
        let output = dir.path().join("availability.csv");
        let command = CoverageCommand {
            output_format: OutputFormat::Csv,
            output_file: Some(output.to_string_lossy().to_string()),
            years: 5,
            config_args: config_args(&dir),
        };
        command.run(Config::default()).unwrap();
        let contents = std::fs::read_to_string(output).unwrap();
        assert!(contents.starts_with("variable,2000,2001"));
    }

    #[test]
    fn test_models_command_writes_table() {
        let dir = TempDir::new().unwrap();
        // Enough rows and a regressor so at least one fit succeeds.
        let path = dir.path().join("Euro_B_stability_master.csv");
        let mut f = File::create(path).unwrap();
        writeln!(f, "country,year,npl_ratio,gdp_growth").unwrap();
        for (i, country) in ["DE", "FR", "IT"].iter().enumerate() {
            for year in 2000i32..2006 {
                // Not additively separable in country and year, so the regressor is not
                // collinear with the dummies.
                let x = ((year * 31 + i as i32 * 17) % 23) as f64;
                writeln!(f, "{country},{year},{},{}", 1.0 + 0.5 * x, x).unwrap();
            }
        }
        let command = ModelsCommand {
            config_args: config_args(&dir),
        };
        command.run(Config::default()).unwrap();
        assert!(dir
            .path()
            .join("out/tables/Table8_FE_Parsimonious.csv")
            .exists());
    }
}
