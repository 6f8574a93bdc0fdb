//! Descriptive figures: per-year median/IQR band charts and the two-panel missingness heatmap.
//!
//! The statistics are part of the core contract; the SVG emission is a thin collaborator over
//! the quantile tables and the coverage matrices.

use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::PathBuf;

use log::{info, warn};
use polars::prelude::*;

use crate::config::Config;
use crate::coverage::CoverageReport;
use crate::error::Result;
use crate::panel::WorkingPanel;
use crate::schema::PanelKeys;
use crate::COL;

pub const MISSINGNESS_FILE: &str = "Figure4_Missingness.svg";
pub const AVAILABILITY_CSV: &str = "availability_by_year.csv";

/// One median/IQR band chart: title, y-axis label, output file, panel variable.
pub struct BandSpec {
    pub title: &'static str,
    pub ylabel: &'static str,
    pub file_name: &'static str,
    pub variable: &'static str,
}

/// The standard chart list. Variables absent from the panel are skipped at render time.
pub fn standard_band_specs() -> Vec<BandSpec> {
    vec![
        BandSpec {
            title: "EA median + IQR — log Z-score",
            ylabel: "log Z",
            file_name: "figure_5a_logZ.svg",
            variable: COL::LOGZ,
        },
        BandSpec {
            title: "EA median + IQR — NPL ratio (%)",
            ylabel: "percent",
            file_name: "figure_5b_NPL.svg",
            variable: COL::NPL,
        },
        BandSpec {
            title: "EA median + IQR — Tier-1 capital (%)",
            ylabel: "capital",
            file_name: "figure_5c_Capital.svg",
            variable: COL::CAPITAL,
        },
        BandSpec {
            title: "EA median + IQR — Real GDP growth (%)",
            ylabel: "percent",
            file_name: "figure_6a_GDPg.svg",
            variable: COL::GDP_G,
        },
        BandSpec {
            title: "EA median + IQR — Unemployment (%)",
            ylabel: "percent",
            file_name: "figure_6b_Unemp.svg",
            variable: COL::UNEMP,
        },
        BandSpec {
            title: "EA median + IQR — Inflation (%)",
            ylabel: "percent",
            file_name: "figure_6c_Inflation.svg",
            variable: COL::INFL,
        },
        BandSpec {
            title: "EA median + IQR — Real short rate (pp)",
            ylabel: "pp",
            file_name: "figure_6d_RealRate.svg",
            variable: COL::REAL_RATE,
        },
        BandSpec {
            title: "EA median + IQR — L1 Credit growth (%)",
            ylabel: "percent",
            file_name: "figure_6e_L1CreditGrowth.svg",
            variable: COL::L1_CRED_G,
        },
        BandSpec {
            title: "EA median + IQR — Credit-to-GDP gap (pp)",
            ylabel: "pp",
            file_name: "figure_6f_CreditGap.svg",
            variable: COL::CREDGAP,
        },
    ]
}

/// Per-year across-country quantiles (25/50/75) of one variable, rows with missing values
/// excluded, sorted ascending by year.
pub fn median_iqr(df: &DataFrame, keys: &PanelKeys, variable: &str) -> Result<DataFrame> {
    Ok(df
        .clone()
        .lazy()
        .drop_nulls(Some(vec![col(variable)]))
        .group_by([col(keys.year.as_str())])
        .agg([
            col(variable)
                .quantile(lit(0.25), QuantileInterpolOptions::Linear)
                .alias("q25"),
            col(variable).median().alias("median"),
            col(variable)
                .quantile(lit(0.75), QuantileInterpolOptions::Linear)
                .alias("q75"),
        ])
        .sort([keys.year.as_str()], SortMultipleOptions::default())
        .collect()?)
}

/// Render every available band chart plus the missingness heatmap into the figures directory,
/// and write the availability matrix alongside as CSV. Returns the paths written.
pub fn write_figures(
    panel: &WorkingPanel,
    report: &CoverageReport,
    config: &Config,
) -> Result<Vec<PathBuf>> {
    let figures_dir = config.figures_dir();
    fs::create_dir_all(&figures_dir)?;
    let mut written = Vec::new();

    let heatmap_path = figures_dir.join(MISSINGNESS_FILE);
    fs::write(&heatmap_path, render_missingness(report))?;
    info!("wrote {}", heatmap_path.display());
    written.push(heatmap_path);

    let availability_path = figures_dir.join(AVAILABILITY_CSV);
    let mut availability = report.availability_df()?;
    let mut file = fs::File::create(&availability_path)?;
    CsvWriter::new(&mut file).finish(&mut availability)?;
    written.push(availability_path);

    let column_names = panel.df.get_column_names();
    for spec in standard_band_specs() {
        if !column_names.iter().any(|c| *c == spec.variable) {
            warn!("{} not in panel; skipping {}", spec.variable, spec.file_name);
            continue;
        }
        let stats = median_iqr(&panel.df, &panel.keys, spec.variable)?;
        if stats.height() == 0 {
            warn!(
                "{} has no observations; skipping {}",
                spec.variable, spec.file_name
            );
            continue;
        }
        let path = figures_dir.join(spec.file_name);
        fs::write(&path, render_band_chart(&stats, &panel.keys, &spec)?)?;
        info!("wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

const CHART_W: f64 = 800.0;
const CHART_H: f64 = 360.0;
const MARGIN_L: f64 = 60.0;
const MARGIN_R: f64 = 20.0;
const MARGIN_T: f64 = 40.0;
const MARGIN_B: f64 = 45.0;

/// Minimal deferred-element SVG canvas.
struct SvgCanvas {
    width: f64,
    height: f64,
    body: String,
}

impl SvgCanvas {
    fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            body: String::new(),
        }
    }

    fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str) {
        let _ = writeln!(
            self.body,
            r#"<rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" fill="{fill}"/>"#
        );
    }

    fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, stroke: &str) {
        let _ = writeln!(
            self.body,
            r#"<line x1="{x1:.2}" y1="{y1:.2}" x2="{x2:.2}" y2="{y2:.2}" stroke="{stroke}" stroke-width="1"/>"#
        );
    }

    fn polyline(&mut self, points: &[(f64, f64)], stroke: &str, width: f64) {
        let coords = points
            .iter()
            .map(|(x, y)| format!("{x:.2},{y:.2}"))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(
            self.body,
            r#"<polyline points="{coords}" fill="none" stroke="{stroke}" stroke-width="{width}"/>"#
        );
    }

    fn polygon(&mut self, points: &[(f64, f64)], fill: &str, opacity: f64) {
        let coords = points
            .iter()
            .map(|(x, y)| format!("{x:.2},{y:.2}"))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(
            self.body,
            r#"<polygon points="{coords}" fill="{fill}" fill-opacity="{opacity}"/>"#
        );
    }

    fn text(&mut self, x: f64, y: f64, size: f64, anchor: &str, content: &str) {
        let escaped = content
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;");
        let _ = writeln!(
            self.body,
            r#"<text x="{x:.2}" y="{y:.2}" font-family="sans-serif" font-size="{size}" text-anchor="{anchor}">{escaped}</text>"#
        );
    }

    fn finish(self) -> String {
        format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{:.0}\" height=\"{:.0}\" viewBox=\"0 0 {:.0} {:.0}\">\n{}</svg>\n",
            self.width, self.height, self.width, self.height, self.body
        )
    }
}

/// A median line with a shaded IQR band over years.
fn render_band_chart(stats: &DataFrame, keys: &PanelKeys, spec: &BandSpec) -> Result<String> {
    let years = stats.column(&keys.year)?.cast(&DataType::Float64)?;
    let years: Vec<f64> = years.f64()?.into_iter().flatten().collect();
    let q25: Vec<f64> = stats.column("q25")?.f64()?.into_iter().flatten().collect();
    let median: Vec<f64> = stats
        .column("median")?
        .f64()?
        .into_iter()
        .flatten()
        .collect();
    let q75: Vec<f64> = stats.column("q75")?.f64()?.into_iter().flatten().collect();

    let (x_min, x_max) = padded_range(&years, 0.5);
    let mut y_all = q25.clone();
    y_all.extend_from_slice(&q75);
    let (y_min, y_max) = padded_range(&y_all, 1.0);

    let x = |v: f64| MARGIN_L + (v - x_min) / (x_max - x_min) * (CHART_W - MARGIN_L - MARGIN_R);
    let y = |v: f64| CHART_H - MARGIN_B - (v - y_min) / (y_max - y_min) * (CHART_H - MARGIN_T - MARGIN_B);

    let mut canvas = SvgCanvas::new(CHART_W, CHART_H);
    canvas.rect(0.0, 0.0, CHART_W, CHART_H, "white");

    // Frame and gridlines.
    canvas.line(MARGIN_L, MARGIN_T, MARGIN_L, CHART_H - MARGIN_B, "#333");
    canvas.line(
        MARGIN_L,
        CHART_H - MARGIN_B,
        CHART_W - MARGIN_R,
        CHART_H - MARGIN_B,
        "#333",
    );
    for tick in 0..=4 {
        let value = y_min + (y_max - y_min) * tick as f64 / 4.0;
        let ty = y(value);
        canvas.line(MARGIN_L, ty, CHART_W - MARGIN_R, ty, "#ddd");
        canvas.text(MARGIN_L - 6.0, ty + 3.0, 10.0, "end", &format!("{value:.1}"));
    }
    for &year in &years {
        canvas.text(
            x(year),
            CHART_H - MARGIN_B + 14.0,
            9.0,
            "middle",
            &format!("{year:.0}"),
        );
    }

    // IQR band: q75 forward, q25 back.
    let mut band: Vec<(f64, f64)> = years
        .iter()
        .zip(&q75)
        .map(|(&yr, &v)| (x(yr), y(v)))
        .collect();
    band.extend(
        years
            .iter()
            .zip(&q25)
            .rev()
            .map(|(&yr, &v)| (x(yr), y(v))),
    );
    canvas.polygon(&band, "#4682b4", 0.25);

    let median_points: Vec<(f64, f64)> = years
        .iter()
        .zip(&median)
        .map(|(&yr, &v)| (x(yr), y(v)))
        .collect();
    canvas.polyline(&median_points, "#1f4e79", 2.0);

    canvas.text(CHART_W / 2.0, MARGIN_T - 16.0, 14.0, "middle", spec.title);
    canvas.text(14.0, CHART_H / 2.0, 11.0, "middle", spec.ylabel);
    canvas.text(
        CHART_W / 2.0,
        CHART_H - 8.0,
        11.0,
        "middle",
        "Year",
    );
    Ok(canvas.finish())
}

fn padded_range(values: &[f64], min_span: f64) -> (f64, f64) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() {
        return (0.0, min_span);
    }
    if (max - min).abs() < f64::EPSILON {
        (min - min_span / 2.0, max + min_span / 2.0)
    } else {
        (min, max)
    }
}

fn heat_color(value: f64) -> String {
    // White at 0% to steel blue at 100%.
    let t = (value / 100.0).clamp(0.0, 1.0);
    let r = (255.0 + (70.0 - 255.0) * t) as u8;
    let g = (255.0 + (130.0 - 255.0) * t) as u8;
    let b = (255.0 + (180.0 - 255.0) * t) as u8;
    format!("rgb({r},{g},{b})")
}

/// The two-panel missingness heatmap: availability on the left, imputed share among available on
/// the right. Undefined cells are grey; low availability (< 80%) and non-trivial imputation
/// (>= 5%) are annotated with their value.
pub fn render_missingness(report: &CoverageReport) -> String {
    const CELL_W: f64 = 22.0;
    const CELL_H: f64 = 22.0;
    const LABEL_W: f64 = 140.0;
    const PANEL_GAP: f64 = 40.0;
    const TOP: f64 = 60.0;

    let n_years = report.years.len() as f64;
    let n_labels = report.labels.len() as f64;
    let panel_w = LABEL_W + n_years * CELL_W;
    let width = 2.0 * panel_w + PANEL_GAP + 20.0;
    let height = TOP + n_labels * CELL_H + 60.0;

    let mut canvas = SvgCanvas::new(width, height);
    canvas.rect(0.0, 0.0, width, height, "white");
    canvas.text(
        width / 2.0,
        20.0,
        14.0,
        "middle",
        "Figure 4 — Missingness heatmap (coverage and imputation flags)",
    );

    let panels = [
        (0.0, &report.availability, "Availability (% non-missing)", 80.0, true),
        (
            panel_w + PANEL_GAP,
            &report.imputed_share,
            "Imputed share among available (%)",
            5.0,
            false,
        ),
    ];
    for (offset, matrix, title, threshold, annotate_below) in panels {
        canvas.text(offset + panel_w / 2.0, TOP - 18.0, 12.0, "middle", title);
        for (row, label) in report.labels.iter().enumerate() {
            let cy = TOP + row as f64 * CELL_H;
            canvas.text(offset + LABEL_W - 6.0, cy + CELL_H / 2.0 + 3.0, 10.0, "end", label);
            for (idx, cell) in matrix[row].iter().enumerate() {
                let cx = offset + LABEL_W + idx as f64 * CELL_W;
                match cell {
                    Some(value) => {
                        canvas.rect(cx, cy, CELL_W, CELL_H, &heat_color(*value));
                        let annotate = if annotate_below {
                            *value < threshold
                        } else {
                            *value >= threshold
                        };
                        if annotate {
                            canvas.text(
                                cx + CELL_W / 2.0,
                                cy + CELL_H / 2.0 + 3.0,
                                7.0,
                                "middle",
                                &format!("{value:.0}"),
                            );
                        }
                    }
                    None => canvas.rect(cx, cy, CELL_W, CELL_H, "#e0e0e0"),
                }
            }
        }
        for (idx, year) in report.years.iter().enumerate() {
            let cx = offset + LABEL_W + idx as f64 * CELL_W + CELL_W / 2.0;
            let cy = TOP + n_labels * CELL_H + 12.0;
            canvas.text(cx, cy, 8.0, "middle", &year.to_string());
        }
    }
    canvas.finish()
}
