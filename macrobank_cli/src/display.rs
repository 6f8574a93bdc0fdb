use comfy_table::{presets::NOTHING, *};
use itertools::izip;

use macrobank::coverage::CoverageReport;
use macrobank::models::FeFit;
use macrobank::panel::BuildSummary;

fn styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_style(comfy_table::TableComponent::BottomBorder, '─')
        .set_style(comfy_table::TableComponent::MiddleHeaderIntersections, '─')
        .set_style(comfy_table::TableComponent::HeaderLines, '─')
        .set_style(comfy_table::TableComponent::BottomBorderIntersections, '─')
        .set_style(comfy_table::TableComponent::TopBorder, '─')
        .set_style(comfy_table::TableComponent::TopBorderIntersections, '─');
    table
}

fn percent(cell: Option<f64>) -> String {
    match cell {
        Some(value) => format!("{value:.0}%"),
        None => "".to_string(),
    }
}

pub fn display_build_summary(summary: &BuildSummary) {
    println!(
        "Wrote {} rows x {} columns to {}",
        summary.rows,
        summary.columns,
        summary.written.csv.display()
    );
    if let Some(parquet) = &summary.written.parquet {
        println!("Also wrote {}", parquet.display());
    }
}

/// Print per-variable availability for the last `max_years` years of the panel, then which
/// variables carry an imputation flag.
pub fn display_coverage_summary(report: &CoverageReport, max_years: usize) {
    let start = report.years.len().saturating_sub(max_years);
    let shown_years = &report.years[start..];

    let mut table = styled_table();
    let mut header = vec![Cell::new("Variable").add_attribute(Attribute::Bold)];
    header.extend(
        shown_years
            .iter()
            .map(|year| Cell::new(year).add_attribute(Attribute::Bold)),
    );
    table.set_header(header);

    for (label, availability) in izip!(&report.labels, &report.availability) {
        let mut row = vec![label.clone()];
        row.extend(availability[start..].iter().copied().map(percent));
        table.add_row(row);
    }
    println!("\n{}", table);

    let flagged = report.flagged_labels();
    if !flagged.is_empty() {
        println!("With imputation flags: {}", flagged.join(", "));
    }
    let unflagged = report.unflagged_labels();
    if !unflagged.is_empty() {
        println!("Without imputation flags: {}", unflagged.join(", "));
    }
}

pub fn display_fe_fits(fits: &[FeFit]) {
    for fit in fits {
        let mut table = styled_table();
        table.set_header(vec![
            Cell::new("Term").add_attribute(Attribute::Bold),
            Cell::new("Coef").add_attribute(Attribute::Bold),
            Cell::new("SE").add_attribute(Attribute::Bold),
        ]);
        for term in &fit.terms {
            // Dummy coefficients are nuisance parameters; keep the display to the substantive
            // terms.
            if term.term.starts_with("C(") {
                continue;
            }
            table.add_row(vec![
                term.term.clone(),
                format!("{:.4}", term.coef),
                format!("{:.4}", term.se),
            ]);
        }
        println!(
            "\nOutcome: {} (N = {}, R2 = {:.3}, adj. R2 = {:.3})",
            fit.outcome, fit.n, fit.r2, fit.adj_r2
        );
        println!("{}", table);
    }
}
