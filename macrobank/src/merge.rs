//! Left-join machinery for attaching supplementary tables to the master panel.
//!
//! Every secondary table is reduced to its two keys plus the columns actually needed, with the
//! needed columns renamed to clearly-scoped output names, before joining. Secondary keys must be
//! unique: duplicate keys would silently multiply master rows, so they are a hard error and the
//! caller must deduplicate or aggregate first.

use std::collections::HashSet;

use polars::prelude::*;

use crate::error::{MacrobankError, Result};
use crate::schema::PanelKeys;

/// Fail with a `Schema` error if `df` contains duplicate or null (country, year) pairs. The
/// casts are non-strict, so an unparsable year surfaces here as a null key rather than as a
/// spurious duplicate.
pub fn assert_unique_keys(df: &DataFrame, keys: &PanelKeys) -> Result<()> {
    let country = df.column(&keys.country)?.cast(&DataType::String)?;
    let year = df.column(&keys.year)?.cast(&DataType::Int64)?;
    let mut seen = HashSet::with_capacity(df.height());
    for (c, y) in country.str()?.into_iter().zip(year.i64()?) {
        let (Some(c), Some(y)) = (c, y) else {
            return Err(MacrobankError::schema(
                format!(
                    "Null or unparsable ({}, {}) key: ({:?}, {:?})",
                    keys.country, keys.year, c, y
                ),
                &df.get_column_names(),
            ));
        };
        if !seen.insert((c.to_string(), y)) {
            return Err(MacrobankError::schema(
                format!(
                    "Duplicate ({}, {}) key: ({}, {})",
                    keys.country, keys.year, c, y
                ),
                &df.get_column_names(),
            ));
        }
    }
    Ok(())
}

/// Left-join `columns` of a secondary table onto the master, keyed on (country, year).
///
/// `columns` maps each needed secondary column to its scoped output name. Preserves every master
/// row exactly once: secondary keys are checked for uniqueness up front and the post-join row
/// count is checked against the master's.
pub fn left_join_unique(
    master: DataFrame,
    master_keys: &PanelKeys,
    secondary: &DataFrame,
    secondary_keys: &PanelKeys,
    columns: &[(&str, &str)],
) -> Result<DataFrame> {
    let master_names = master
        .get_column_names()
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>();
    for (_, output) in columns {
        if master_names.iter().any(|c| c == output) {
            return Err(MacrobankError::schema(
                format!("Output column {output} collides with the master panel"),
                &master.get_column_names(),
            ));
        }
    }

    // Minimal projection: the two keys plus the needed columns only.
    let mut selection = vec![secondary_keys.country.as_str(), secondary_keys.year.as_str()];
    selection.extend(columns.iter().map(|(source, _)| *source));
    let mut projected = secondary.select(selection)?;

    if secondary_keys.country != master_keys.country {
        projected.rename(&secondary_keys.country, &master_keys.country)?;
    }
    if secondary_keys.year != master_keys.year {
        projected.rename(&secondary_keys.year, &master_keys.year)?;
    }
    for (source, output) in columns {
        projected.rename(source, output)?;
    }
    // Align the year dtype with the master so the join keys compare equal.
    let year = projected
        .column(&master_keys.year)?
        .cast(master.column(&master_keys.year)?.dtype())?;
    projected.with_column(year)?;

    assert_unique_keys(&projected, master_keys)?;

    let joined = master.join(
        &projected,
        [master_keys.country.as_str(), master_keys.year.as_str()],
        [master_keys.country.as_str(), master_keys.year.as_str()],
        JoinArgs::new(JoinType::Left),
    )?;

    if joined.height() != master.height() {
        return Err(MacrobankError::schema(
            format!(
                "Left join changed the master row count ({} -> {})",
                master.height(),
                joined.height()
            ),
            &joined.get_column_names(),
        ));
    }
    Ok(joined)
}
