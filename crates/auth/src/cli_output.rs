//! Parsing `az account get-access-token` output.
//!
//! Depending on the CLI version, `expiresOn` is SQL-style local time
//! (`2024-05-01 13:45:10.123456`), ISO-8601, or absent, and newer versions
//! add `expires_on` as POSIX seconds. Everything is normalized to UTC.

use {
    chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc},
    secrecy::SecretString,
    serde::Deserialize,
};

use crate::types::TokenResult;

/// Naive layouts tried after RFC 3339, interpreted in the local time zone.
const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S %p",
];

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("output is not an access token document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("accessToken is empty")]
    EmptyToken,

    #[error("no usable expiry (expiresOn = {0:?})")]
    Expiry(Option<String>),
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    #[serde(rename = "accessToken")]
    access_token: String,

    #[serde(rename = "expiresOn", default)]
    expires_on_text: Option<String>,

    #[serde(rename = "expires_on", default)]
    expires_on_epoch: Option<serde_json::Value>,
}

/// Parse the JSON the CLI prints for `get-access-token`.
pub fn parse_access_token(stdout: &str) -> Result<TokenResult, OutputError> {
    let resp: AccessTokenResponse = serde_json::from_str(stdout.trim())?;

    let token = resp.access_token.trim();
    if token.is_empty() {
        return Err(OutputError::EmptyToken);
    }

    let expires_on = resp
        .expires_on_epoch
        .as_ref()
        .and_then(parse_epoch)
        .or_else(|| resp.expires_on_text.as_deref().and_then(parse_expiry))
        .ok_or(OutputError::Expiry(resp.expires_on_text))?;

    Ok(TokenResult {
        access_token: SecretString::new(token.to_string()),
        expires_on,
    })
}

/// Parse an expiry timestamp in any of the shapes the CLI has emitted.
pub fn parse_expiry(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_epoch(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    let secs = match value {
        serde_json::Value::Number(n) => n.as_i64()?,
        serde_json::Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp(secs, 0)
}
