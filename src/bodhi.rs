//! Client for the update-gating service's buildroot override API.
// SPDX-License-Identifier: GPL-2.0-or-later

use std::time::Duration;

use chrono::NaiveDateTime;
use serde_derive::Deserialize;

use crate::errors::{FedpkgError, Result};

const EXPIRATION_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A buildroot override as the service reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct Override {
    pub nvr: String,
    #[serde(default)]
    pub notes: String,
    pub expiration_date: String,
}

impl Override {
    pub fn expiration(&self) -> Result<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.expiration_date, EXPIRATION_FORMAT).map_err(|e| {
            FedpkgError::remote(
                format!("Bodhi returned an unparseable expiration date for {}", self.nvr),
                e,
            )
        })
    }
}

#[derive(Debug, Deserialize)]
struct OverrideList {
    #[allow(dead_code)]
    total: u64,
    overrides: Vec<Override>,
}

/// The mutating surface the override flow needs. `clear_session` supports
/// the one-shot auth-expiry retry.
pub trait UpdateGating {
    fn list_overrides(&self, build: &str) -> Result<Vec<Override>>;
    fn save_override(&mut self, nvr: &str, duration: i64, notes: &str) -> Result<Override>;
    fn extend_override(
        &mut self,
        current: &Override,
        new_expiration: NaiveDateTime,
    ) -> Result<Override>;
    fn clear_session(&mut self);
}

pub struct BodhiClient {
    http: reqwest::blocking::Client,
    base_url: String,
    username: String,
    // The csrf token is fetched lazily and may go stale; clear_session
    // drops it so the next mutation re-authenticates.
    csrf_token: Option<String>,
}

impl BodhiClient {
    pub fn new(base_url: &str, username: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .cookie_store(true)
            .build()
            .map_err(|e| FedpkgError::remote("Failed to construct the Bodhi client", e))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            csrf_token: None,
        })
    }

    fn csrf(&mut self) -> Result<String> {
        if let Some(token) = &self.csrf_token {
            return Ok(token.clone());
        }
        #[derive(Deserialize)]
        struct Csrf {
            csrf_token: String,
        }
        let what = "The connection to Bodhi failed while fetching a csrf token";
        let rv = self
            .http
            .get(format!("{}/csrf", self.base_url))
            .header("Accept", "application/json")
            .send()
            .map_err(|e| FedpkgError::remote(what, e))?;
        if !rv.status().is_success() {
            return Err(FedpkgError::remote(what, rv.status()));
        }
        let csrf: Csrf = rv.json().map_err(|e| FedpkgError::remote(what, e))?;
        self.csrf_token = Some(csrf.csrf_token.clone());
        Ok(csrf.csrf_token)
    }

    fn post_override(&mut self, data: serde_json::Value) -> Result<Override> {
        let what = "The connection to Bodhi failed while saving the override";
        let rv = self
            .http
            .post(format!("{}/overrides/", self.base_url))
            .json(&data)
            .send()
            .map_err(|e| FedpkgError::remote(what, e))?;
        let status = rv.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            // A readonly/stale csrf token surfaces as a 403; the caller
            // clears the session and retries once.
            return Err(FedpkgError::AuthExpired);
        }
        if !status.is_success() {
            let text = rv.text().unwrap_or_default();
            return Err(FedpkgError::remote(what, format!("{status}: {text}")));
        }
        rv.json().map_err(|e| FedpkgError::remote(what, e))
    }
}

impl UpdateGating for BodhiClient {
    fn list_overrides(&self, build: &str) -> Result<Vec<Override>> {
        let what = "The connection to Bodhi failed while listing overrides";
        let rv = self
            .http
            .get(format!("{}/overrides/", self.base_url))
            .query(&[("builds", build)])
            .header("Accept", "application/json")
            .send()
            .map_err(|e| FedpkgError::remote(what, e))?;
        if !rv.status().is_success() {
            return Err(FedpkgError::remote(what, rv.status()));
        }
        let list: OverrideList = rv.json().map_err(|e| FedpkgError::remote(what, e))?;
        Ok(list.overrides)
    }

    fn save_override(&mut self, nvr: &str, duration: i64, notes: &str) -> Result<Override> {
        let csrf_token = self.csrf()?;
        self.post_override(serde_json::json!({
            "nvr": nvr,
            "duration": duration,
            "notes": notes,
            "csrf_token": csrf_token,
        }))
    }

    fn extend_override(
        &mut self,
        current: &Override,
        new_expiration: NaiveDateTime,
    ) -> Result<Override> {
        let csrf_token = self.csrf()?;
        self.post_override(serde_json::json!({
            "nvr": current.nvr,
            "notes": current.notes,
            "expiration_date": new_expiration.format(EXPIRATION_FORMAT).to_string(),
            "edited": current.nvr,
            "csrf_token": csrf_token,
        }))
    }

    fn clear_session(&mut self) {
        tracing::debug!("Clearing cached Bodhi credentials for {}", self.username);
        self.csrf_token = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiration_parsing() -> Result<()> {
        let o = Override {
            nvr: "pkg-1-1.fc33".to_string(),
            notes: String::new(),
            expiration_date: "2020-04-01 12:30:00".to_string(),
        };
        let parsed = o.expiration()?;
        assert_eq!(parsed.format(EXPIRATION_FORMAT).to_string(), o.expiration_date);

        let bad = Override {
            expiration_date: "April 1st".to_string(),
            ..o
        };
        assert!(bad.expiration().is_err());
        Ok(())
    }

    #[test]
    fn test_override_list_deserialization() -> Result<()> {
        let list: OverrideList = serde_json::from_str(indoc::indoc! {r#"
            {
              "total": 1,
              "overrides": [
                {
                  "nvr": "nethack-3.6.6-1.fc33",
                  "notes": "No explanation given...",
                  "expiration_date": "2020-04-01 00:00:00"
                }
              ]
            }
        "#})
        .unwrap();
        assert_eq!(list.overrides.len(), 1);
        assert_eq!(list.overrides[0].nvr, "nethack-3.6.6-1.fc33");
        Ok(())
    }
}
