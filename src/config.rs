//! User and package configuration, parsed once into explicit per-service
//! structs so no component reads ambient configuration by key name.
// SPDX-License-Identifier: GPL-2.0-or-later

use std::path::Path;

use ini::Ini;

use crate::errors::{FedpkgError, Result};

const DEFAULT_PAGURE_URL: &str = "https://pagure.io";
const DEFAULT_PDC_URL: &str = "https://pdc.fedoraproject.org";
const DEFAULT_BODHI_URL: &str = "https://bodhi.fedoraproject.org";
const DEFAULT_BODHI_STAGING_URL: &str = "https://bodhi.stg.fedoraproject.org";
const DEFAULT_KOJI_HUB_URL: &str = "https://koji.fedoraproject.org/kojihub";

#[derive(Debug, Clone)]
pub struct PagureConfig {
    pub url: String,
    pub token: Option<String>,
}

impl PagureConfig {
    /// The API token, or the configuration hint for how to set one.
    pub fn require_token(&self, cli_name: &str) -> Result<&str> {
        self.token.as_deref().ok_or_else(|| {
            FedpkgError::Config(format!(
                "Missing a Pagure token. Refer to \"{cli_name} request-repo -h\" \
                 to set a token in your user configuration."
            ))
        })
    }
}

#[derive(Debug, Clone)]
pub struct PdcConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct BodhiConfig {
    pub staging: bool,
}

impl BodhiConfig {
    pub fn url(&self) -> &'static str {
        if self.staging {
            DEFAULT_BODHI_STAGING_URL
        } else {
            DEFAULT_BODHI_URL
        }
    }
}

#[derive(Debug, Clone)]
pub struct KojiConfig {
    pub hub_url: String,
}

/// The whole user configuration, one struct per collaborating service.
#[derive(Debug, Clone)]
pub struct Config {
    pub cli_name: String,
    pub pagure: PagureConfig,
    pub pdc: PdcConfig,
    pub bodhi: BodhiConfig,
    pub koji: KojiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cli_name: "fedpkg".to_string(),
            pagure: PagureConfig {
                url: DEFAULT_PAGURE_URL.to_string(),
                token: None,
            },
            pdc: PdcConfig {
                url: DEFAULT_PDC_URL.to_string(),
            },
            bodhi: BodhiConfig { staging: false },
            koji: KojiConfig {
                hub_url: DEFAULT_KOJI_HUB_URL.to_string(),
            },
        }
    }
}

impl Config {
    /// Load from an rpkg-style INI file (sections `fedpkg.pagure`,
    /// `fedpkg.pdc`, ...), filling in defaults for anything unset. A missing
    /// file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Config::default();
        if !path.exists() {
            tracing::debug!("No user config at {}, using defaults", path.display());
            return Ok(config);
        }
        let ini = Ini::load_from_file(path).map_err(|e| {
            FedpkgError::Config(format!("Could not read config {}: {e}", path.display()))
        })?;
        let name = config.cli_name.clone();
        let get = |section: &str, key: &str| -> Option<String> {
            ini.section(Some(format!("{name}.{section}")))
                .and_then(|s| s.get(key))
                .map(|v| v.to_string())
        };
        if let Some(url) = get("pagure", "url") {
            config.pagure.url = url;
        }
        config.pagure.token = get("pagure", "token");
        if let Some(url) = get("pdc", "url") {
            config.pdc.url = url;
        }
        if let Some(staging) = get("bodhi", "staging") {
            config.bodhi.staging = matches!(staging.as_str(), "1" | "yes" | "true" | "on");
        }
        if let Some(url) = get("koji", "hub_url") {
            config.koji.hub_url = url;
        }
        Ok(config)
    }
}

/// The in-repo `package.cfg` naming the koji targets a stream branch builds
/// for.
#[derive(Debug, Clone, Default)]
pub struct PackageConfig {
    pub targets: Vec<String>,
}

pub const LOCAL_PACKAGE_CONFIG: &str = "package.cfg";

impl PackageConfig {
    /// Load `package.cfg` from a checkout. `None` when the file does not
    /// exist or carries no targets option.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(LOCAL_PACKAGE_CONFIG);
        if !path.exists() {
            return Ok(None);
        }
        let ini = Ini::load_from_file(&path).map_err(|e| {
            FedpkgError::Config(format!(
                "Package config {LOCAL_PACKAGE_CONFIG} is not accessible: {e}"
            ))
        })?;
        let Some(targets) = ini.section(Some("koji")).and_then(|s| s.get("targets")) else {
            return Ok(None);
        };
        Ok(Some(Self {
            targets: targets.split_whitespace().map(String::from).collect(),
        }))
    }
}
