//! Parsing and validation of service-level entries attached to stream
//! branch requests.
// SPDX-License-Identifier: GPL-2.0-or-later

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{FedpkgError, Result};

// "security_fixes:2020-12-01"; the name is everything before the trailing
// colon-delimited date.
static SL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+):(\d{4}-\d{2}-\d{2})$").unwrap());

/// The remote authority that knows which service-level names exist.
pub trait SlAuthority {
    fn sl_type_exists(&self, name: &str) -> Result<bool>;
}

/// Parse `name:yyyy-mm-dd` entries into a name -> EOL-date map. Duplicate
/// names keep the last entry (map semantics).
pub fn parse_list<S: AsRef<str>>(entries: &[S]) -> Result<BTreeMap<String, String>> {
    let mut sls = BTreeMap::new();
    for entry in entries {
        let entry = entry.as_ref();
        let caps = SL_RE
            .captures(entry)
            .ok_or_else(|| FedpkgError::InvalidServiceLevelFormat {
                entry: entry.to_string(),
            })?;
        sls.insert(caps[1].to_string(), caps[2].to_string());
    }
    Ok(sls)
}

/// Validate every entry: the EOL date must parse, be strictly in the
/// future, and fall on a semiannual boundary (June 1 or December 1); the
/// name must be known to the authority.
pub fn verify(
    sls: &BTreeMap<String, String>,
    authority: &dyn SlAuthority,
    today: NaiveDate,
) -> Result<()> {
    for (name, eol) in sls {
        let eol_date = NaiveDate::parse_from_str(eol, "%Y-%m-%d").map_err(|_| {
            FedpkgError::InvalidEolDateFormat {
                date: eol.to_string(),
            }
        })?;
        if eol_date <= today {
            return Err(FedpkgError::ExpiredServiceLevel {
                date: eol.to_string(),
            });
        }
        if !matches!(eol_date.month(), 6 | 12) || eol_date.day() != 1 {
            return Err(FedpkgError::InvalidEolBoundary {
                date: eol.to_string(),
            });
        }
        if !authority.sl_type_exists(name)? {
            return Err(FedpkgError::UnknownServiceLevel {
                name: name.to_string(),
            });
        }
    }
    Ok(())
}
