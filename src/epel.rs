//! EPEL branch eligibility: a package that is already fully available in
//! the primary Enterprise Linux distribution may not get a parallel EPEL
//! branch.
// SPDX-License-Identifier: GPL-2.0-or-later

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde_derive::Deserialize;

use crate::errors::{FedpkgError, Result};

const ARCH_DATA_URL_TEMPLATE: &str =
    "https://infrastructure.fedoraproject.org/repo/json/pkg_el{version}.json";

/// Architecture footprint of one EL distribution version, as published by
/// Fedora infrastructure.
#[derive(Debug, Clone, Deserialize)]
pub struct EpelArchData {
    pub arches: BTreeSet<String>,
    pub packages: BTreeMap<String, EpelPackage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EpelPackage {
    pub arch: BTreeSet<String>,
}

/// Where the arch data comes from; injected so the policy engine can be
/// exercised without the network.
pub trait ArchDataSource {
    fn fetch(&self, el_version: u32) -> Result<EpelArchData>;
}

/// Fetches the published JSON from Fedora infrastructure.
pub struct InfraArchData;

impl ArchDataSource for InfraArchData {
    fn fetch(&self, el_version: u32) -> Result<EpelArchData> {
        let url = ARCH_DATA_URL_TEMPLATE.replace("{version}", &el_version.to_string());
        let what = "The connection to infrastructure.fedoraproject.org failed while \
                    trying to determine if this is a valid EPEL package";
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| FedpkgError::remote(what, e))?;
        let rv = client
            .get(&url)
            .send()
            .map_err(|e| FedpkgError::remote(what, e))?;
        if !rv.status().is_success() {
            return Err(FedpkgError::remote(what, rv.status()));
        }
        rv.json().map_err(|e| FedpkgError::remote(what, e))
    }
}

/// Extract the EL major version from a branch name like `epel7` (the digit
/// run in the name).
pub fn el_version(branch: &str) -> Result<u32> {
    let digits: String = branch.chars().filter(|c| c.is_ascii_digit()).collect();
    digits
        .parse()
        .map_err(|_| FedpkgError::InvalidBranchName(format!("no EL version in branch {branch}")))
}

/// Check whether `name` may acquire an EPEL branch for `branch`.
///
/// A package absent from the EL arch data passes. One that is noarch-only,
/// or that covers every supported arch, is already fully served by the
/// primary distribution and is rejected.
pub fn check_eligibility(name: &str, branch: &str, data: &EpelArchData) -> Result<()> {
    let version = el_version(branch)?;
    let mut supported: BTreeSet<&str> = data
        .arches
        .iter()
        .map(|s| s.as_str())
        .filter(|a| *a != "noarch")
        .collect();
    // Historical heuristic: these arches commonly lack complete builds and
    // would produce false positives. Revisit for future EL versions.
    if version == 6 {
        supported.remove("ppc");
        supported.remove("i386");
    } else if version >= 7 {
        supported.remove("ppc");
        supported.remove("i686");
    }

    let Some(pkg) = data.packages.get(name) else {
        return Ok(());
    };
    let pkg_arches: BTreeSet<&str> = pkg.arch.iter().map(|s| s.as_str()).collect();
    let noarch_only = pkg_arches.len() == 1 && pkg_arches.contains("noarch");
    let covers_all = supported.difference(&pkg_arches).next().is_none();
    if noarch_only || covers_all {
        return Err(FedpkgError::PackageNotEpelEligible);
    }
    Ok(())
}
