//! Minimal build-system (Koji) client: build target introspection over
//! XML-RPC.
// SPDX-License-Identifier: GPL-2.0-or-later

use xmlrpc::{Request, Value};

use crate::errors::{FedpkgError, Result};

/// Build-target lookup, implemented by an anonymous koji session and by
/// test fakes.
pub trait BuildSystem {
    /// The destination tag name of a build target, e.g. `f41-updates-candidate`
    /// for `rawhide`.
    fn build_target_dest_tag(&self, name: &str) -> Result<String>;
}

pub struct KojiSession {
    hub_url: String,
}

impl KojiSession {
    pub fn anonymous(hub_url: &str) -> Self {
        Self {
            hub_url: hub_url.to_string(),
        }
    }
}

fn require_str(val: &Value, key: &str) -> Result<String> {
    val.as_struct()
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            FedpkgError::remote(
                "Invoking koji getBuildTarget",
                format!("missing key {key} in response"),
            )
        })
}

impl BuildSystem for KojiSession {
    fn build_target_dest_tag(&self, name: &str) -> Result<String> {
        let res = Request::new("getBuildTarget")
            .arg(name)
            .call_url(&self.hub_url)
            .map_err(|e| FedpkgError::remote("Invoking koji getBuildTarget", e))?;
        require_str(&res, "dest_tag_name")
    }
}
