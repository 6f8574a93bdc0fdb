use macrobank::error::MacrobankError;
use polars::error::PolarsError;

#[derive(thiserror::Error, Debug)]
pub enum MacrobankCliError {
    #[error("Anyhow error")]
    Anyhow(#[from] anyhow::Error),
    #[error("serde JSON error")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("polars error")]
    PolarsError(#[from] PolarsError),
    #[error("macrobank error")]
    MacrobankError(#[from] MacrobankError),
    #[error("std IO error")]
    IOError(#[from] std::io::Error),
}

pub type MacrobankCliResult<T> = Result<T, MacrobankCliError>;
