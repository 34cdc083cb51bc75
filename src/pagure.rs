//! Ticketing client: files issues on the releng scm-requests tracker.
// SPDX-License-Identifier: GPL-2.0-or-later

use std::time::Duration;

use serde_derive::Deserialize;

use crate::errors::{FedpkgError, Result};

const REQUESTS_REPO: &str = "releng/fedora-scm-requests";

/// How tickets get filed; implemented by [`PagureClient`] and by test
/// recorders.
pub trait Ticketing {
    /// File an issue and return its browsable URL.
    fn create_issue(&self, title: &str, body: &str) -> Result<String>;
}

pub struct PagureClient {
    http: reqwest::blocking::Client,
    base_url: String,
    token: String,
    cli_name: String,
}

#[derive(Debug, Deserialize)]
struct NewIssueResponse {
    issue: IssueRef,
}

#[derive(Debug, Deserialize)]
struct IssueRef {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct PagureError {
    error: String,
}

impl PagureClient {
    pub fn new(base_url: &str, token: &str, cli_name: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| FedpkgError::remote("Failed to construct the Pagure client", e))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            cli_name: cli_name.to_string(),
        })
    }
}

impl Ticketing for PagureClient {
    fn create_issue(&self, title: &str, body: &str) -> Result<String> {
        let url = format!("{}/api/0/{REQUESTS_REPO}/new_issue", self.base_url);
        let what = "The connection to Pagure failed while trying to create a new issue";
        let rv = self
            .http
            .post(url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/json")
            .json(&serde_json::json!({
                "title": title,
                "issue_content": body,
            }))
            .send()
            .map_err(|e| FedpkgError::remote(what, e))?;
        if !rv.status().is_success() {
            // Surface the API's own error message when it sent one, with a
            // hint for the common expired-token case.
            let text = rv.text().unwrap_or_default();
            let message = serde_json::from_str::<PagureError>(&text)
                .map(|e| e.error)
                .unwrap_or(text);
            let mut what =
                "The following error occurred while creating a new issue in Pagure".to_string();
            if message.to_lowercase().contains("invalid or expired token") {
                what.push_str(&format!(
                    "\nFor invalid or expired token refer to \"{} request-repo -h\" \
                     to set a token in your user configuration.",
                    self.cli_name
                ));
            }
            return Err(FedpkgError::remote(what, message));
        }
        let resp: NewIssueResponse = rv.json().map_err(|e| FedpkgError::remote(what, e))?;
        Ok(format!(
            "{}/{REQUESTS_REPO}/issue/{}",
            self.base_url, resp.issue.id
        ))
    }
}
