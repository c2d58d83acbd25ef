//! Vendor fetch errors
//!
//! Every variant is local to one account: protocol clients log it and yield
//! zero records for that account this cycle.

use thiserror::Error;

/// SkyBitz error code for "too many requests".
pub const SKYBITZ_RATE_LIMIT_CODE: &str = "97";

#[derive(Error, Debug)]
pub enum FetchError {
    /// Connect failure, timeout, or broken body stream
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    /// Vendor asked us to slow down (SkyBitz code 97 or HTTP 429)
    #[error("rate limited by vendor")]
    RateLimited,

    /// Vendor-reported application error code other than rate limiting
    #[error("vendor error code {code}")]
    Vendor { code: String },

    #[error("malformed payload: {0}")]
    Decode(String),
}

impl FetchError {
    /// Only the vendor's rate-limit signal is worth retrying.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited)
    }

    /// Map a SkyBitz `<e>` value to an error. `None`, empty and `0` are success.
    pub fn from_vendor_code(code: Option<&str>) -> Option<Self> {
        match code.map(str::trim) {
            None | Some("") | Some("0") => None,
            Some(SKYBITZ_RATE_LIMIT_CODE) => Some(FetchError::RateLimited),
            Some(other) => Some(FetchError::Vendor {
                code: other.to_string(),
            }),
        }
    }
}

impl From<quick_xml::DeError> for FetchError {
    fn from(err: quick_xml::DeError) -> Self {
        FetchError::Decode(format!("failed to deserialize XML: {err}"))
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(format!("failed to deserialize JSON: {err}"))
    }
}
