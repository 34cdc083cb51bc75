//! The branch/repository request policy engine: validates a request against
//! release policy and shapes the ticket(s) to file, in causal order.
// SPDX-License-Identifier: GPL-2.0-or-later

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::epel::ArchDataSource;
use crate::errors::{FedpkgError, Result};
use crate::release::{classify, is_epel, BranchKind, RELEASE_BRANCH_RE};
use crate::sl::SlAuthority;
use crate::{epel, sl};

// Module/container branch names are restricted; repo names likewise.
static NAMESPACED_BRANCH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9.\-_+]+$").unwrap());
static REPO_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9\-_.+]*$").unwrap());

// Playground branches only exist for EPEL 8 and newer.
const PLAYGROUND_MIN_VERSION: u32 = 8;

/// dist-git namespaces we can request branches or repositories in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "kebab-case")]
pub enum Namespace {
    Rpms,
    Modules,
    Containers,
    Tests,
    TestModules,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Rpms => "rpms",
            Namespace::Modules => "modules",
            Namespace::Containers => "containers",
            Namespace::Tests => "tests",
            Namespace::TestModules => "test-modules",
        }
    }

    /// Namespaces whose branch names are restricted to a conservative
    /// character class.
    fn restricts_branch_names(&self) -> bool {
        matches!(
            self,
            Namespace::Modules | Namespace::TestModules | Namespace::Containers
        )
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authority for the currently active release branches, keyed by
/// product family (`fedora`, `epel`).
pub trait ReleaseAuthority {
    fn release_branches(&self) -> Result<BTreeMap<String, Vec<String>>>;
}

/// Anitya monitoring setting carried on new-repo requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "kebab-case")]
pub enum Monitor {
    NoMonitoring,
    Monitoring,
    MonitoringWithScratch,
}

impl Monitor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Monitor::NoMonitoring => "no-monitoring",
            Monitor::Monitoring => "monitoring",
            Monitor::MonitoringWithScratch => "monitoring-with-scratch",
        }
    }
}

/// One new-branch ticket to file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRequest {
    pub namespace: Namespace,
    pub repo_name: String,
    pub branch: String,
    pub service_levels: BTreeMap<String, String>,
    pub create_git_branch: bool,
}

/// One new-repository ticket to file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRequest {
    pub namespace: Namespace,
    pub repo_name: String,
    pub branch: String,
    pub summary: String,
    pub description: String,
    pub upstream_url: String,
    pub monitor: Monitor,
    pub bug_id: Option<u32>,
    pub exception: bool,
}

/// A planned ticket, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedRequest {
    Branch(BranchRequest),
    NewRepo(RepoRequest),
}

impl BranchRequest {
    pub fn ticket_title(&self) -> String {
        format!(
            "New Branch \"{}\" for \"{}/{}\"",
            self.branch, self.namespace, self.repo_name
        )
    }

    pub fn ticket_body(&self) -> String {
        let mut body = json!({
            "action": "new_branch",
            "branch": self.branch,
            "namespace": self.namespace.as_str(),
            "repo": self.repo_name,
            "create_git_branch": self.create_git_branch,
        });
        if !self.service_levels.is_empty() {
            body["sls"] = json!(self.service_levels);
        }
        fence(&body)
    }
}

impl RepoRequest {
    pub fn ticket_title(&self) -> String {
        format!("New Repo for \"{}/{}\"", self.namespace, self.repo_name)
    }

    pub fn ticket_body(&self) -> String {
        let body = if self.namespace == Namespace::Tests {
            json!({
                "action": "new_repo",
                "branch": "master",
                "bug_id": bug_id_value(self.bug_id),
                "monitor": "no-monitoring",
                "namespace": "tests",
                "repo": self.repo_name,
                "description": self.description,
            })
        } else {
            json!({
                "action": "new_repo",
                "branch": self.branch,
                "bug_id": bug_id_value(self.bug_id),
                "description": self.description,
                "exception": self.exception,
                "monitor": self.monitor.as_str(),
                "namespace": self.namespace.as_str(),
                "repo": self.repo_name,
                "summary": self.summary,
                "upstreamurl": self.upstream_url,
            })
        };
        fence(&body)
    }
}

fn bug_id_value(bug: Option<u32>) -> serde_json::Value {
    match bug {
        Some(id) => json!(id),
        None => json!(""),
    }
}

fn fence(body: &serde_json::Value) -> String {
    // Unwrap safety: serializing a Value we just built cannot fail.
    let body = serde_json::to_string_pretty(body).expect("serializing ticket body");
    format!("```\n{body}\n```")
}

/// Validate a repository name against dist-git rules.
pub fn validate_repo_name(repo_name: &str) -> Result<()> {
    if REPO_NAME_RE.is_match(repo_name) {
        return Ok(());
    }
    Err(FedpkgError::InvalidBranchName(format!(
        "The repository name \"{repo_name}\" is invalid. It must be at least \
         two characters long with only letters, numbers, hyphens, \
         underscores, plus signs, and/or periods. Please note that the \
         project cannot start with a period or a plus sign."
    )))
}

/// Everything a branch request needs from the caller.
#[derive(Debug, Clone)]
pub struct BranchPlanInput {
    pub namespace: Namespace,
    pub repo_name: String,
    /// The explicitly requested branch, if any.
    pub branch: Option<String>,
    /// The currently checked-out branch, used as a fallback.
    pub active_branch: Option<String>,
    /// Raw `name:yyyy-mm-dd` entries from the command line.
    pub service_levels: Vec<String>,
    pub all_releases: bool,
    pub create_git_branch: bool,
    /// Whether a stream rpms branch should also request a companion module.
    pub auto_module: bool,
}

/// The policy engine. All validation and remote lookups happen in
/// [`BranchPlanner::plan`], strictly before any ticket is filed: a returned
/// plan is safe to submit in order, aborting on first failure.
pub struct BranchPlanner<'a> {
    pub releases: &'a dyn ReleaseAuthority,
    pub sl_authority: &'a dyn SlAuthority,
    pub arch_data: &'a dyn ArchDataSource,
    /// The current UTC date, injected for service-level validation.
    pub today: NaiveDate,
}

impl BranchPlanner<'_> {
    pub fn plan(&self, input: &BranchPlanInput) -> Result<Vec<PlannedRequest>> {
        if input.all_releases {
            if input.branch.is_some() {
                return Err(FedpkgError::ConflictingOptions(
                    "You cannot specify a branch with the \"--all-releases\" option".into(),
                ));
            }
            if !input.service_levels.is_empty() {
                return Err(FedpkgError::ConflictingOptions(
                    "You cannot specify service levels with the \"--all-releases\" option".into(),
                ));
            }
        }

        let branch = match (&input.branch, input.all_releases) {
            (Some(b), _) => Some(b.clone()),
            (None, true) => None,
            (None, false) => Some(
                input
                    .active_branch
                    .clone()
                    .ok_or(FedpkgError::NoBranchSpecified)?,
            ),
        };

        let mut sls = BTreeMap::new();
        let mut epel_playground_parent = None;
        if let Some(branch) = &branch {
            match classify(branch) {
                BranchKind::EpelPlayground(_) => {
                    return Err(FedpkgError::InvalidBranchName(format!(
                        "You cannot directly request {branch} branch, as they are \
                         created as part of epel branch requests"
                    )));
                }
                // Only epel-prefixed names grow a playground companion;
                // legacy el\d+ names never do.
                BranchKind::Epel(version) if branch.starts_with("epel") => {
                    epel_playground_parent = Some(version);
                }
                _ => {}
            }

            // Fail-fast eligibility check, before any remote mutation.
            if is_epel(branch) {
                let version = epel::el_version(branch)?;
                let data = self.arch_data.fetch(version)?;
                epel::check_eligibility(&input.repo_name, branch, &data)?;
            }

            if input.namespace.restricts_branch_names() && !NAMESPACED_BRANCH_RE.is_match(branch) {
                return Err(FedpkgError::InvalidBranchName(
                    "Only characters, numbers, periods, dashes, underscores, \
                     and pluses are allowed in module branch names"
                        .into(),
                ));
            }

            let release_branches = self.active_release_branches()?;
            if release_branches.iter().any(|b| b == branch) {
                if !input.service_levels.is_empty() {
                    return Err(FedpkgError::ReleaseLevelsNotAllowed);
                }
            } else if RELEASE_BRANCH_RE.is_match(branch) {
                return Err(FedpkgError::StaleReleaseBranch {
                    branch: branch.clone(),
                });
            } else if input.service_levels.is_empty() {
                return Err(FedpkgError::ServiceLevelsRequired {
                    branch: branch.clone(),
                });
            }
        }

        if !input.service_levels.is_empty() {
            sls = sl::parse_list(&input.service_levels)?;
            sl::verify(&sls, self.sl_authority, self.today)?;
        }

        let mut branches = if input.all_releases {
            self.active_release_branches()?
                .into_iter()
                .filter(|b| matches!(classify(b), BranchKind::Fedora(_)))
                .collect()
        } else {
            // Unwrap safety: branch is always set when not --all-releases.
            let branch = branch.expect("branch resolved above");
            match epel_playground_parent {
                Some(version) if version >= PLAYGROUND_MIN_VERSION => {
                    vec![format!("{branch}-playground"), branch]
                }
                _ => vec![branch],
            }
        };
        // Newest release first, so ticket ordering matches expectations.
        branches.sort();
        branches.reverse();

        let mut plan = Vec::new();
        for branch in branches {
            let auto_module = input.namespace == Namespace::Rpms
                && !RELEASE_BRANCH_RE.is_match(&branch)
                && epel_playground_parent.is_none()
                && input.auto_module;
            plan.push(PlannedRequest::Branch(BranchRequest {
                namespace: input.namespace,
                repo_name: input.repo_name.clone(),
                branch: branch.clone(),
                service_levels: sls.clone(),
                create_git_branch: input.create_git_branch,
            }));
            if auto_module {
                // Stream rpm branches historically need a parallel module
                // definition; file it right after the primary request.
                let summary = format!(
                    "Automatically requested module for rpms/{}:{}.",
                    input.repo_name, branch
                );
                plan.push(PlannedRequest::NewRepo(RepoRequest {
                    namespace: Namespace::Modules,
                    repo_name: input.repo_name.clone(),
                    branch: "master".to_string(),
                    summary: summary.clone(),
                    description: summary,
                    upstream_url: String::new(),
                    monitor: Monitor::NoMonitoring,
                    bug_id: None,
                    exception: true,
                }));
                let companion = BranchPlanInput {
                    namespace: Namespace::Modules,
                    branch: Some(branch),
                    // Suppressed on the recursive call to prevent unbounded
                    // recursion.
                    auto_module: false,
                    ..input.clone()
                };
                plan.extend(self.plan(&companion)?);
            }
        }
        Ok(plan)
    }

    fn active_release_branches(&self) -> Result<Vec<String>> {
        Ok(self
            .releases
            .release_branches()?
            .into_values()
            .flatten()
            .collect())
    }
}
