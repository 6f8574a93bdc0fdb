//! Column harmonization: normalize raw column names, map known aliases onto the canonical short
//! schema, and reduce the table to the expected field allow-list.

use log::debug;
use polars::prelude::*;

use crate::error::{MacrobankError, Result};
use crate::schema::alias_table;
use crate::COL;

/// Lower-case and trim every column name in place.
fn normalize_column_names(df: &mut DataFrame) -> Result<()> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|c| c.to_string())
        .collect();
    for name in names {
        let normalized = name.trim().to_lowercase();
        if normalized != name {
            df.rename(&name, &normalized)?;
        }
    }
    Ok(())
}

/// Rename known aliases to their canonical names. A rename only fires when the canonical name is
/// absent, which both avoids collisions and makes the operation idempotent: the canonical name is
/// the head of every alias list, so an already-harmonized table is left untouched.
fn apply_alias_renames(df: &mut DataFrame) -> Result<()> {
    for field in alias_table() {
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .collect();
        if names.iter().any(|c| c == field.canonical) {
            continue;
        }
        if let Some(alias) = field
            .aliases
            .iter()
            .find(|alias| names.iter().any(|c| c == *alias))
        {
            debug!("renaming {} -> {}", alias, field.canonical);
            df.rename(alias, field.canonical)?;
        }
    }
    Ok(())
}

/// Harmonize a raw source table onto the canonical panel schema.
///
/// Normalizes names, applies the alias map, keeps only the expected fields (in the allow-list's
/// order) and casts the year key to integers. Fails with a `Schema` error when the canonical
/// country/year columns are still absent afterwards. Idempotent by construction.
pub fn harmonize(mut df: DataFrame) -> Result<DataFrame> {
    normalize_column_names(&mut df)?;
    apply_alias_renames(&mut df)?;

    let present: Vec<&str> = {
        let names = df.get_column_names();
        COL::EXPECTED
            .iter()
            .copied()
            .filter(|expected| names.iter().any(|c| c == expected))
            .collect()
    };
    if !present.contains(&COL::COUNTRY) || !present.contains(&COL::YEAR) {
        return Err(MacrobankError::schema(
            "Missing country/year after harmonization",
            &df.get_column_names(),
        ));
    }
    let mut df = df.select(present)?;

    let year = df.column(COL::YEAR)?.cast(&DataType::Int32)?;
    df.with_column(year)?;
    Ok(df)
}
