//! The versioned schema candidate table: one canonical field name per measured quantity, each
//! with an ordered list of accepted raw aliases. Every component that needs to locate a column
//! (key resolution, harmonization, derivation fallbacks, imputation flags) goes through this
//! table, so there is exactly one set of column conventions in the pipeline.

use nonempty::{nonempty, NonEmpty};
use polars::prelude::DataFrame;

use crate::error::{MacrobankError, Result};
use crate::COL;

/// A canonical field and its accepted raw spellings, most preferred first. The canonical name
/// itself is always the head of the list so that resolution is idempotent.
#[derive(Debug, Clone)]
pub struct FieldAliases {
    pub canonical: &'static str,
    pub aliases: NonEmpty<&'static str>,
}

/// The full alias table, in the canonical output order of the panel.
pub fn alias_table() -> Vec<FieldAliases> {
    vec![
        FieldAliases {
            canonical: COL::COUNTRY,
            aliases: country_candidates(),
        },
        FieldAliases {
            canonical: COL::YEAR,
            aliases: year_candidates(),
        },
        FieldAliases {
            canonical: COL::LOGZ,
            aliases: nonempty![COL::LOGZ, "log_z", "ln_z"],
        },
        FieldAliases {
            canonical: COL::BANK_Z,
            aliases: nonempty![COL::BANK_Z, "bank_z_score", "z_score"],
        },
        FieldAliases {
            canonical: COL::NPL,
            aliases: nonempty![COL::NPL, "npl_ratio_filled", "npl_ratio", "npls"],
        },
        FieldAliases {
            canonical: COL::CAPITAL,
            aliases: nonempty![
                COL::CAPITAL,
                "capital_adequacy_ratio_filled",
                "tier1_ratio_filled",
                "tier1_ratio"
            ],
        },
        FieldAliases {
            canonical: COL::GDP_G,
            aliases: nonempty![COL::GDP_G, "gdp_growth", "rgdp_growth"],
        },
        FieldAliases {
            canonical: COL::UNEMP,
            aliases: nonempty![COL::UNEMP, "unemployment", "unemp_rate"],
        },
        FieldAliases {
            canonical: COL::INFL,
            aliases: nonempty![COL::INFL, "inflation", "hicp_inflation"],
        },
        FieldAliases {
            canonical: COL::POLICY_RATE,
            aliases: nonempty![COL::POLICY_RATE, "ecb_refi_rate", "policy"],
        },
        FieldAliases {
            canonical: COL::REAL_RATE,
            aliases: nonempty![COL::REAL_RATE, "real_short_rate", "real_policy_rate"],
        },
        FieldAliases {
            canonical: COL::CRED_G,
            aliases: nonempty![COL::CRED_G, "credit_growth", "cred_growth", "credit_g"],
        },
        FieldAliases {
            canonical: COL::CREDGAP,
            aliases: nonempty![COL::CREDGAP, "credit_to_gdp_gap", "credit_gap", "credit_gdp_gap"],
        },
        FieldAliases {
            canonical: COL::IMPUTED_TIER1,
            aliases: nonempty![COL::IMPUTED_TIER1, "imputed_tier_1"],
        },
        FieldAliases {
            canonical: COL::IMPUTED_NPL,
            aliases: nonempty![COL::IMPUTED_NPL, "imputed_npls"],
        },
    ]
}

pub fn country_candidates() -> NonEmpty<&'static str> {
    nonempty![COL::COUNTRY, "country_id", "iso3", "iso", "iso2", "country_code"]
}

pub fn year_candidates() -> NonEmpty<&'static str> {
    nonempty![COL::YEAR]
}

/// Aliases accepted for one canonical field.
pub fn aliases_for(canonical: &str) -> Option<NonEmpty<&'static str>> {
    alias_table()
        .into_iter()
        .find(|f| f.canonical == canonical)
        .map(|f| f.aliases)
}

/// Return the first candidate present among `columns`, comparing case-insensitively on trimmed
/// names. The returned name is the column's spelling as it appears in the table.
pub fn pick_first<'a, I, C>(columns: &'a [I], candidates: C) -> Option<&'a str>
where
    I: AsRef<str>,
    C: IntoIterator,
    C::Item: AsRef<str>,
{
    for candidate in candidates {
        let wanted = candidate.as_ref().trim().to_lowercase();
        if let Some(found) = columns
            .iter()
            .find(|c| c.as_ref().trim().to_lowercase() == wanted)
        {
            return Some(found.as_ref());
        }
    }
    None
}

/// The resolved identifying columns of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelKeys {
    pub country: String,
    pub year: String,
}

impl PanelKeys {
    /// The canonical key pair of a harmonized panel.
    pub fn canonical() -> Self {
        Self {
            country: COL::COUNTRY.to_string(),
            year: COL::YEAR.to_string(),
        }
    }
}

/// Identify the country and year columns of `df` from the prioritized candidate lists. Every
/// downstream join depends on these two keys, so failure here is a hard `Schema` error carrying
/// the full observed column list.
pub fn resolve_keys(df: &DataFrame) -> Result<PanelKeys> {
    let columns = df.get_column_names();
    let country = pick_first(&columns, country_candidates());
    let year = pick_first(&columns, year_candidates());
    match (country, year) {
        (Some(country), Some(year)) => Ok(PanelKeys {
            country: country.to_string(),
            year: year.to_string(),
        }),
        _ => Err(MacrobankError::schema(
            "Could not identify country/year keys",
            &columns,
        )),
    }
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;

    #[test]
    fn test_pick_first_is_prioritized() {
        let columns = ["iso3", "country", "year"];
        assert_eq!(pick_first(&columns, country_candidates()), Some("country"));
        let columns = ["iso3", "iso2", "year"];
        assert_eq!(pick_first(&columns, country_candidates()), Some("iso3"));
    }

    #[test]
    fn test_pick_first_is_case_normalized() {
        let columns = ["Country ", "YEAR"];
        assert_eq!(pick_first(&columns, country_candidates()), Some("Country "));
        assert_eq!(pick_first(&columns, year_candidates()), Some("YEAR"));
    }

    #[test]
    fn test_pick_first_no_match() {
        let columns = ["region", "period"];
        assert_eq!(pick_first(&columns, country_candidates()), None);
    }

    #[test]
    fn test_resolve_keys() -> anyhow::Result<()> {
        let df = df!(
            "iso2" => &["DE", "FR"],
            "YEAR" => &[2000i32, 2001],
            "npl" => &[1.0, 2.0]
        )?;
        let keys = resolve_keys(&df)?;
        assert_eq!(keys.country, "iso2");
        assert_eq!(keys.year, "YEAR");
        Ok(())
    }

    #[test]
    fn test_resolve_keys_missing_is_schema_error() -> anyhow::Result<()> {
        let df = df!("region" => &["DE"], "npl" => &[1.0])?;
        let err = resolve_keys(&df).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("region"), "message should list observed columns: {msg}");
        Ok(())
    }

    #[test]
    fn test_alias_heads_are_canonical() {
        for field in alias_table() {
            assert_eq!(field.canonical, *field.aliases.first());
        }
    }
}
