//! This module stores the canonical column names of the working panel, which are used when
//! harmonizing the raw source files and when serialising the panel to disk. Note that these must
//! be synchronised with the alias table in the `schema` module!

pub const COUNTRY: &str = "country";
pub const YEAR: &str = "year";

pub const LOGZ: &str = "logz";
pub const BANK_Z: &str = "bank_z";
pub const NPL: &str = "npl";
pub const CAPITAL: &str = "capital";

pub const GDP_G: &str = "gdp_g";
pub const UNEMP: &str = "unemp";
pub const INFL: &str = "infl";
pub const POLICY_RATE: &str = "policy_rate";
pub const REAL_RATE: &str = "real_rate";
pub const CRED_G: &str = "cred_g";
pub const CREDGAP: &str = "credgap";
pub const L1_CRED_G: &str = "l1_cred_g";

pub const IMPUTED_TIER1: &str = "imputed_tier1";
pub const IMPUTED_NPL: &str = "imputed_npl";

/// The allow-list of canonical fields retained in the working panel, in output order. Columns not
/// on this list are dropped during harmonization; columns on this list but absent from the source
/// are simply not present in the panel.
pub const EXPECTED: &[&str] = &[
    COUNTRY,
    YEAR,
    LOGZ,
    BANK_Z,
    NPL,
    CAPITAL,
    GDP_G,
    UNEMP,
    INFL,
    POLICY_RATE,
    REAL_RATE,
    CRED_G,
    CREDGAP,
    IMPUTED_TIER1,
    IMPUTED_NPL,
];

/// Outcomes a row must carry (where present in the panel) to survive the final cleaning pass.
pub const CORE_OUTCOMES: &[&str] = &[LOGZ, NPL, CAPITAL];
