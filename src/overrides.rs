//! Buildroot override expiration handling: computing new expiration dates
//! and driving the update-gating service's create/extend calls.
// SPDX-License-Identifier: GPL-2.0-or-later

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::bodhi::{Override, UpdateGating};
use crate::errors::{FedpkgError, Result};

/// How far to push an override's expiration: a day count, or an explicit
/// calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideDuration {
    Days(i64),
    Until(NaiveDate),
}

impl std::str::FromStr for OverrideDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty() {
            let days: i64 = s.parse().map_err(|_| "duration must be an integer.")?;
            if days < 1 {
                return Err("override should have 1 day to exist at least.".to_string());
            }
            return Ok(OverrideDuration::Days(days));
        }
        let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| "Invalid expiration date. Valid format: yyyy-mm-dd.".to_string())?;
        Ok(OverrideDuration::Until(date))
    }
}

/// Compute the new expiration timestamp for an override.
///
/// The anchor is the current expiration when it is still in the future;
/// an expired or missing override restarts the clock from `utc_now`. A day
/// count advances the anchor; an explicit date replaces the anchor's date
/// while keeping its time of day, and must itself be a future date.
pub fn resolve_expiration(
    current: Option<NaiveDateTime>,
    utc_now: NaiveDateTime,
    duration: OverrideDuration,
) -> Result<NaiveDateTime> {
    let anchor = match current {
        Some(expiration) if expiration >= utc_now => expiration,
        _ => utc_now,
    };
    match duration {
        OverrideDuration::Days(days) => Ok(anchor + chrono::Duration::days(days)),
        OverrideDuration::Until(date) => {
            let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
            if date.and_time(midnight) < utc_now {
                return Err(FedpkgError::PastExpirationDate {
                    date: date.format("%Y-%m-%d").to_string(),
                });
            }
            let new_expiration = date.and_time(anchor.time());
            if new_expiration < anchor {
                // Shortens rather than extends; legal but worth surfacing.
                tracing::warn!(
                    "Expiration date {} to be set is before override current \
                     expiration date {}",
                    new_expiration,
                    anchor
                );
            }
            Ok(new_expiration)
        }
    }
}

/// Run a mutating bodhi call with the explicit two-attempt auth policy: on
/// an expired session, clear cached credentials and retry exactly once.
fn with_auth_retry<T>(
    gating: &mut dyn UpdateGating,
    mut call: impl FnMut(&mut dyn UpdateGating) -> Result<T>,
) -> Result<T> {
    match call(gating) {
        Err(FedpkgError::AuthExpired) => {
            gating.clear_session();
            call(gating)
        }
        other => other,
    }
}

/// Create a buildroot override for `nvr`, unless one already exists, in
/// which case its status is reported instead.
pub fn create_override(
    gating: &mut dyn UpdateGating,
    nvr: &str,
    duration_days: i64,
    notes: &str,
    utc_now: NaiveDateTime,
) -> Result<()> {
    let existing = gating.list_overrides(nvr)?;
    if let Some(current) = existing.first() {
        if current.expiration()? < utc_now {
            tracing::info!(
                "Buildroot override for {nvr} exists and is expired. Consider \
                 using command `override extend` to extend duration."
            );
        } else {
            tracing::info!("Buildroot override for {nvr} already exists and not expired.");
        }
        return Ok(());
    }
    tracing::debug!("Create override: nvr={nvr}, duration={duration_days}, notes={notes:?}");
    let created = with_auth_retry(gating, |g| g.save_override(nvr, duration_days, notes))?;
    tracing::info!("Created override for {nvr}, expires {}", created.expiration_date);
    Ok(())
}

/// Extend the buildroot override for `nvr` by a day count or to an explicit
/// date.
pub fn extend_override(
    gating: &mut dyn UpdateGating,
    nvr: &str,
    duration: OverrideDuration,
    utc_now: NaiveDateTime,
) -> Result<()> {
    let existing = gating.list_overrides(nvr)?;
    let Some(current) = existing.first() else {
        tracing::info!("No buildroot override for build {nvr}");
        return Ok(());
    };
    let new_expiration = resolve_expiration(Some(current.expiration()?), utc_now, duration)?;
    tracing::debug!("Extend override expiration date to {new_expiration}");
    let current = current.clone();
    let extended = with_auth_retry(gating, |g| g.extend_override(&current, new_expiration))?;
    tracing::info!(
        "Extended override for {nvr}, expires {}",
        extended.expiration_date
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!("7".parse(), Ok(OverrideDuration::Days(7)));
        assert_eq!(
            "2018-07-01".parse(),
            Ok(OverrideDuration::Until(date("2018-07-01")))
        );
        assert!("0".parse::<OverrideDuration>().is_err());
        assert!("-3".parse::<OverrideDuration>().is_err());
        assert!("soon".parse::<OverrideDuration>().is_err());
    }

    #[test]
    fn test_expired_anchor_restarts_from_now() -> Result<()> {
        // Current expiration 2018-06-01 is already past; the clock restarts
        // from utcnow.
        let result = resolve_expiration(
            Some(dt("2018-06-01 00:00:00")),
            dt("2018-06-08 00:00:00"),
            OverrideDuration::Days(2),
        )?;
        assert_eq!(result, dt("2018-06-10 00:00:00"));
        Ok(())
    }

    #[test]
    fn test_future_anchor_day_count() -> Result<()> {
        let result = resolve_expiration(
            Some(dt("2018-07-01 12:00:00")),
            dt("2018-06-08 00:00:00"),
            OverrideDuration::Days(2),
        )?;
        assert_eq!(result, dt("2018-07-03 12:00:00"));
        Ok(())
    }

    #[test]
    fn test_missing_anchor_uses_now() -> Result<()> {
        let result =
            resolve_expiration(None, dt("2018-06-08 09:30:00"), OverrideDuration::Days(7))?;
        assert_eq!(result, dt("2018-06-15 09:30:00"));
        Ok(())
    }

    #[test]
    fn test_explicit_date_keeps_anchor_time() -> Result<()> {
        let result = resolve_expiration(
            Some(dt("2018-07-01 12:00:00")),
            dt("2018-06-08 00:00:00"),
            OverrideDuration::Until(date("2018-07-05")),
        )?;
        assert_eq!(result, dt("2018-07-05 12:00:00"));
        Ok(())
    }

    #[test]
    fn test_explicit_past_date_fails() {
        let err = resolve_expiration(
            Some(dt("2018-07-01 12:00:00")),
            dt("2018-06-08 10:00:00"),
            OverrideDuration::Until(date("2018-06-01")),
        )
        .unwrap_err();
        assert!(matches!(err, FedpkgError::PastExpirationDate { .. }));

        // "Today" counts as past: its midnight is before utcnow.
        let err = resolve_expiration(
            None,
            dt("2018-06-08 10:00:00"),
            OverrideDuration::Until(date("2018-06-08")),
        )
        .unwrap_err();
        assert!(matches!(err, FedpkgError::PastExpirationDate { .. }));
    }

    #[test]
    fn test_explicit_date_before_anchor_is_allowed() -> Result<()> {
        // Future date, but earlier than the current expiration: shortens
        // the override, which is a warning rather than an error.
        let result = resolve_expiration(
            Some(dt("2018-07-10 08:00:00")),
            dt("2018-06-08 00:00:00"),
            OverrideDuration::Until(date("2018-07-05")),
        )?;
        assert_eq!(result, dt("2018-07-05 08:00:00"));
        Ok(())
    }

    #[derive(Default)]
    struct FakeGating {
        existing: Vec<Override>,
        auth_failures: u32,
        session_cleared: bool,
        saved: Vec<(String, i64, String)>,
        extended: Vec<(String, NaiveDateTime)>,
    }

    impl UpdateGating for FakeGating {
        fn list_overrides(&self, build: &str) -> Result<Vec<Override>> {
            Ok(self
                .existing
                .iter()
                .filter(|o| o.nvr == build)
                .cloned()
                .collect())
        }

        fn save_override(&mut self, nvr: &str, duration: i64, notes: &str) -> Result<Override> {
            if self.auth_failures > 0 {
                self.auth_failures -= 1;
                return Err(FedpkgError::AuthExpired);
            }
            self.saved
                .push((nvr.to_string(), duration, notes.to_string()));
            Ok(Override {
                nvr: nvr.to_string(),
                notes: notes.to_string(),
                expiration_date: "2030-01-01 00:00:00".to_string(),
            })
        }

        fn extend_override(
            &mut self,
            current: &Override,
            new_expiration: NaiveDateTime,
        ) -> Result<Override> {
            if self.auth_failures > 0 {
                self.auth_failures -= 1;
                return Err(FedpkgError::AuthExpired);
            }
            self.extended.push((current.nvr.clone(), new_expiration));
            Ok(Override {
                nvr: current.nvr.clone(),
                notes: current.notes.clone(),
                expiration_date: new_expiration.format("%Y-%m-%d %H:%M:%S").to_string(),
            })
        }

        fn clear_session(&mut self) {
            self.session_cleared = true;
        }
    }

    #[test]
    fn test_create_override() -> Result<()> {
        let mut gating = FakeGating::default();
        create_override(
            &mut gating,
            "nethack-3.6.6-1.fc33",
            7,
            "",
            dt("2020-03-15 00:00:00"),
        )?;
        assert_eq!(gating.saved.len(), 1);
        assert_eq!(gating.saved[0].1, 7);
        Ok(())
    }

    #[test]
    fn test_create_override_skips_existing() -> Result<()> {
        let mut gating = FakeGating {
            existing: vec![Override {
                nvr: "nethack-3.6.6-1.fc33".to_string(),
                notes: String::new(),
                expiration_date: "2020-04-01 00:00:00".to_string(),
            }],
            ..Default::default()
        };
        create_override(
            &mut gating,
            "nethack-3.6.6-1.fc33",
            7,
            "",
            dt("2020-03-15 00:00:00"),
        )?;
        assert!(gating.saved.is_empty());
        Ok(())
    }

    #[test]
    fn test_auth_expiry_retried_once() -> Result<()> {
        let mut gating = FakeGating {
            auth_failures: 1,
            ..Default::default()
        };
        create_override(&mut gating, "pkg-1-1.fc33", 7, "", dt("2020-03-15 00:00:00"))?;
        assert!(gating.session_cleared);
        assert_eq!(gating.saved.len(), 1);

        // A second consecutive auth failure propagates.
        let mut gating = FakeGating {
            auth_failures: 2,
            ..Default::default()
        };
        let err = create_override(&mut gating, "pkg-1-1.fc33", 7, "", dt("2020-03-15 00:00:00"))
            .unwrap_err();
        assert!(matches!(err, FedpkgError::AuthExpired));
        Ok(())
    }

    #[test]
    fn test_extend_override() -> Result<()> {
        let mut gating = FakeGating {
            existing: vec![Override {
                nvr: "pkg-1-1.fc33".to_string(),
                notes: String::new(),
                expiration_date: "2020-04-01 12:00:00".to_string(),
            }],
            ..Default::default()
        };
        extend_override(
            &mut gating,
            "pkg-1-1.fc33",
            OverrideDuration::Days(2),
            dt("2020-03-15 00:00:00"),
        )?;
        assert_eq!(gating.extended.len(), 1);
        assert_eq!(gating.extended[0].1, dt("2020-04-03 12:00:00"));
        Ok(())
    }

    #[test]
    fn test_extend_without_override_is_noop() -> Result<()> {
        let mut gating = FakeGating::default();
        extend_override(
            &mut gating,
            "pkg-1-1.fc33",
            OverrideDuration::Days(2),
            dt("2020-03-15 00:00:00"),
        )?;
        assert!(gating.extended.is_empty());
        Ok(())
    }
}
