//! The error taxonomy shared by every core component.
// SPDX-License-Identifier: GPL-2.0-or-later

pub type Result<T> = std::result::Result<T, FedpkgError>;

/// Failures the core components surface to the CLI layer. Each one either
/// names a caller-input problem exactly, or wraps a remote call failure with
/// a description of which call failed. Nothing here is retried internally;
/// the one exception is the single auth-expiry retry in the override flow.
#[derive(Debug, thiserror::Error)]
pub enum FedpkgError {
    #[error(
        "could not find the release/dist from branch name {branch}\n\
         Please specify with --release"
    )]
    UnknownBranch { branch: String },

    #[error("unable to query koji to find the rawhide target")]
    RawhideResolution,

    #[error("the service level \"{entry}\" is in an invalid format")]
    InvalidServiceLevelFormat { entry: String },

    #[error("the EOL date \"{date}\" is in an invalid format")]
    InvalidEolDateFormat { date: String },

    #[error("the service level \"{date}\" is already expired")]
    ExpiredServiceLevel { date: String },

    #[error("the service level \"{date}\" must expire on June 1st or December 1st")]
    InvalidEolBoundary { date: String },

    #[error("the service level \"{name}\" is not in PDC")]
    UnknownServiceLevel { name: String },

    #[error("{0}")]
    InvalidBranchName(String),

    #[error("{0}")]
    ConflictingOptions(String),

    #[error("you must specify a branch if you are not in a git repository")]
    NoBranchSpecified,

    #[error("you can't provide SLs for release branches")]
    ReleaseLevelsNotAllowed,

    #[error("you must provide SLs for non-release branches ({branch})")]
    ServiceLevelsRequired { branch: String },

    #[error("{branch} is a current release branch")]
    StaleReleaseBranch { branch: String },

    #[error(
        "this package is already an EL package and is built on all supported \
         arches, therefore, it cannot be in EPEL. If this is a mistake or you \
         have an exception, please contact the Release Engineering team"
    )]
    PackageNotEpelEligible,

    #[error("at least, specified expiration date {date} should be future date")]
    PastExpirationDate { date: String },

    /// An authenticated session was rejected as expired by the remote side.
    /// The override flow clears cached credentials and retries exactly once
    /// on this; everywhere else it propagates like any remote failure.
    #[error("the authentication session has expired")]
    AuthExpired,

    #[error("{what}: {message}")]
    Remote { what: String, message: String },

    #[error("{0}")]
    Config(String),
}

impl FedpkgError {
    /// Wrap a remote call failure with a description of which call failed.
    pub fn remote(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        FedpkgError::Remote {
            what: what.into(),
            message: err.to_string(),
        }
    }

    /// True for failures caused by the remote side rather than user input.
    pub fn is_remote(&self) -> bool {
        matches!(self, FedpkgError::Remote { .. } | FedpkgError::AuthExpired)
    }
}
