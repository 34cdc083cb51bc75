//! Client for the release-metadata service (PDC): active releases,
//! service-level types, stream branches.
// SPDX-License-Identifier: GPL-2.0-or-later

use std::collections::BTreeMap;
use std::time::Duration;

use serde_derive::Deserialize;

use crate::errors::{FedpkgError, Result};
use crate::release::StreamBranch;
use crate::request::ReleaseAuthority;
use crate::sl::SlAuthority;

#[derive(Debug, Deserialize)]
struct Page {
    results: Vec<serde_json::Value>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductVersion {
    short: String,
    version: String,
}

#[derive(Debug, Deserialize)]
struct CountedResponse {
    count: u64,
}

pub struct PdcClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl PdcClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| FedpkgError::remote("Failed to construct the PDC client", e))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/rest_api/v1/{}/", self.base_url, name.trim_matches('/'))
    }

    /// Walk a paginated endpoint, following `next` links until exhausted.
    /// Query args are baked into the next URL by the server, so they are
    /// only sent on the first request.
    fn query_paginated(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        what: &str,
    ) -> Result<Vec<serde_json::Value>> {
        let mut results = Vec::new();
        let mut url = self.endpoint(endpoint);
        let mut params = Some(params);
        loop {
            let mut req = self.http.get(&url);
            if let Some(params) = params.take() {
                req = req.query(params);
            }
            let rv = req.send().map_err(|e| {
                FedpkgError::remote(format!("The connection to PDC failed while {what}"), e)
            })?;
            if !rv.status().is_success() {
                let status = rv.status();
                let text = rv.text().unwrap_or_default();
                return Err(FedpkgError::remote(
                    format!("The following error occurred while {what} in PDC"),
                    format!("{status}: {text}"),
                ));
            }
            let page: Page = rv.json().map_err(|e| {
                FedpkgError::remote(format!("The connection to PDC failed while {what}"), e)
            })?;
            results.extend(page.results);
            match page.next {
                Some(next) => url = next,
                None => return Ok(results),
            }
        }
    }

    /// The active release branches, keyed by product family. Versions that
    /// are not numeric (rawhide) are skipped; EPEL 6 keeps its legacy `el`
    /// prefix.
    pub fn release_branches(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let raw = self.query_paginated(
            "product-versions",
            &[
                ("fields", "short"),
                ("fields", "version"),
                ("active", "true"),
            ],
            "trying to get the active release branches",
        )?;
        let mut releases: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for item in raw {
            let pv: ProductVersion = match serde_json::from_value(item) {
                Ok(pv) => pv,
                Err(_) => continue,
            };
            if !pv.version.chars().all(|c| c.is_ascii_digit()) || pv.version.is_empty() {
                continue;
            }
            let prefix = match pv.short.as_str() {
                "epel" if pv.version == "6" => "el",
                "epel" => "epel",
                "fedora" => "f",
                _ => continue,
            };
            releases
                .entry(pv.short)
                .or_default()
                .push(format!("{prefix}{}", pv.version));
        }
        Ok(releases)
    }

    /// A package's stream branches. The endpoint also reports regular
    /// release branches, which are filtered out here.
    pub fn stream_branches(&self, package_name: &str) -> Result<Vec<StreamBranch>> {
        let raw = self.query_paginated(
            "component-branches",
            &[
                ("global_component", package_name),
                ("fields", "name"),
                ("fields", "active"),
            ],
            "trying to get the stream branches",
        )?;
        let mut branches = Vec::new();
        for item in raw {
            let branch: StreamBranch = match serde_json::from_value(item) {
                Ok(b) => b,
                Err(_) => continue,
            };
            if is_release_like(&branch.name) {
                continue;
            }
            branches.push(branch);
        }
        Ok(branches)
    }
}

// Branch names the component-branches endpoint reports that are not stream
// branches: master, release branches, epel7 (a regular release there), and
// playground branches (built via their own -candidate targets).
fn is_release_like(name: &str) -> bool {
    use crate::release::{classify, BranchKind};
    match classify(name) {
        BranchKind::Rawhide | BranchKind::Fedora(_) | BranchKind::EpelPlayground(_) => true,
        BranchKind::Epel(7) => true,
        // el\d+ style names are release branches; epel8+ stream-style
        // branches do not take the el prefix.
        BranchKind::Epel(_) => name.starts_with("el"),
        _ => false,
    }
}

impl ReleaseAuthority for PdcClient {
    fn release_branches(&self) -> Result<BTreeMap<String, Vec<String>>> {
        PdcClient::release_branches(self)
    }
}

impl SlAuthority for PdcClient {
    fn sl_type_exists(&self, name: &str) -> Result<bool> {
        let what = "The connection to PDC failed while trying to validate \
                    the passed in service level";
        let rv = self
            .http
            .get(self.endpoint("component-sla-types"))
            .query(&[("name", name)])
            .send()
            .map_err(|e| FedpkgError::remote(what, e))?;
        if !rv.status().is_success() {
            return Err(FedpkgError::remote(what, rv.status()));
        }
        let counted: CountedResponse = rv.json().map_err(|e| FedpkgError::remote(what, e))?;
        Ok(counted.count == 1)
    }
}
