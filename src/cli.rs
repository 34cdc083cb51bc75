//! The command-line surface: argument definitions and the handlers wiring
//! remote clients into the core components.
// SPDX-License-Identifier: GPL-2.0-or-later

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;

use crate::config::{Config, PackageConfig};
use crate::epel::InfraArchData;
use crate::errors::FedpkgError;
use crate::overrides::OverrideDuration;
use crate::pagure::{PagureClient, Ticketing};
use crate::pdc::PdcClient;
use crate::request::{
    validate_repo_name, BranchPlanInput, BranchPlanner, Monitor, Namespace, PlannedRequest,
    RepoRequest,
};
use crate::{bodhi, gitutil, koji, overrides, release};

#[derive(Debug, Parser)]
#[clap(name = "fedpkg", version, about = "Fedora workflow commands for RPM packagers")]
pub struct Cli {
    /// Specify a user config file to use
    #[clap(long, value_name = "FILE", global = true)]
    pub user_config: Option<PathBuf>,

    /// Path to the package checkout
    #[clap(long, default_value = ".", global = true)]
    pub path: PathBuf,

    #[clap(subcommand)]
    pub cmd: Cmd,
}

#[derive(Debug, clap::Subcommand)]
#[clap(rename_all = "kebab-case")]
pub enum Cmd {
    /// Print Fedora or EPEL current active releases
    ReleasesInfo(ReleasesInfoOpts),
    /// Request a new dist-git repository
    RequestRepo(RequestRepoOpts),
    /// Request a new tests dist-git repository
    RequestTestsRepo(RequestTestsRepoOpts),
    /// Request a new dist-git branch
    RequestBranch(RequestBranchOpts),
    /// Manage buildroot overrides
    Override {
        #[clap(subcommand)]
        cmd: OverrideCmd,
    },
    /// Print the koji build targets the current branch builds for
    BuildTargets(BuildTargetsOpts),
    /// Print the mock configuration name for a release branch
    MockConfig(MockConfigOpts),
}

struct Ctx {
    config: Config,
    path: PathBuf,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let config = match &self.user_config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        let ctx = Ctx {
            config,
            path: self.path,
        };
        match self.cmd {
            Cmd::ReleasesInfo(opts) => opts.run(&ctx),
            Cmd::RequestRepo(opts) => opts.run(&ctx),
            Cmd::RequestTestsRepo(opts) => opts.run(&ctx),
            Cmd::RequestBranch(opts) => opts.run(&ctx),
            Cmd::Override { cmd } => cmd.run(&ctx),
            Cmd::BuildTargets(opts) => opts.run(&ctx),
            Cmd::MockConfig(opts) => opts.run(&ctx),
        }
    }
}

#[derive(Debug, clap::Args)]
pub struct ReleasesInfoOpts {
    /// Only show EPEL releases
    #[clap(short, long, conflicts_with_all = ["fedora", "join"])]
    epel: bool,
    /// Only show Fedora active releases
    #[clap(short, long, conflicts_with = "join")]
    fedora: bool,
    /// Show all releases in one line separated by a space
    #[clap(short, long)]
    join: bool,
}

impl ReleasesInfoOpts {
    fn run(&self, ctx: &Ctx) -> Result<()> {
        let pdc = PdcClient::new(&ctx.config.pdc.url)?;
        let releases = pdc.release_branches()?;
        let family = |name: &str| releases.get(name).cloned().unwrap_or_default().join(" ");
        if self.epel {
            println!("{}", family("epel"));
        } else if self.fedora {
            println!("{}", family("fedora"));
        } else if self.join {
            println!("{} {}", family("fedora"), family("epel"));
        } else {
            println!("Fedora: {}", family("fedora"));
            println!("EPEL: {}", family("epel"));
        }
        Ok(())
    }
}

#[derive(Debug, clap::Args)]
pub struct RequestRepoOpts {
    /// Repository name to request
    name: String,
    /// Bugzilla bug ID of the package review request
    bug: Option<u32>,
    /// Namespace of the repository
    #[clap(long, value_enum, default_value_t = Namespace::Rpms)]
    namespace: Namespace,
    /// The repo's description in dist-git
    #[clap(long, short)]
    description: Option<String>,
    /// The Anitya monitoring type for the repo
    #[clap(long, short, value_enum, default_value_t = Monitor::Monitoring)]
    monitor: Monitor,
    /// The upstream URL of the project
    #[clap(long, short)]
    upstreamurl: Option<String>,
    /// The package's summary
    #[clap(long, short)]
    summary: Option<String>,
    /// The package is an exception to the regular package review process
    #[clap(long)]
    exception: bool,
}

impl RequestRepoOpts {
    fn run(&self, ctx: &Ctx) -> Result<()> {
        validate_repo_name(&self.name)?;
        // A review bug backs every regular request; module namespaces and
        // explicit exceptions are exempt.
        if self.bug.is_none()
            && !self.exception
            && !matches!(
                self.namespace,
                Namespace::Tests | Namespace::Modules | Namespace::TestModules
            )
        {
            bail!("A Bugzilla bug is required on new repository requests");
        }
        let request = RepoRequest {
            namespace: self.namespace,
            repo_name: self.name.clone(),
            branch: "master".to_string(),
            summary: self.summary.clone().unwrap_or_default(),
            description: self.description.clone().unwrap_or_default(),
            upstream_url: self.upstreamurl.clone().unwrap_or_default(),
            monitor: self.monitor,
            bug_id: self.bug,
            exception: self.exception,
        };
        let pagure = pagure_client(&ctx.config)?;
        let url = pagure.create_issue(&request.ticket_title(), &request.ticket_body())?;
        println!("{url}");
        Ok(())
    }
}

#[derive(Debug, clap::Args)]
pub struct RequestTestsRepoOpts {
    /// Repository name to request
    name: String,
    /// Description of the tests repository
    description: String,
    /// Bugzilla bug ID of the package review request
    #[clap(long)]
    bug: Option<u32>,
}

impl RequestTestsRepoOpts {
    fn run(&self, ctx: &Ctx) -> Result<()> {
        let request = RepoRequest {
            namespace: Namespace::Tests,
            repo_name: self.name.clone(),
            branch: "master".to_string(),
            summary: String::new(),
            description: self.description.clone(),
            upstream_url: String::new(),
            monitor: Monitor::NoMonitoring,
            bug_id: self.bug,
            exception: false,
        };
        let pagure = pagure_client(&ctx.config)?;
        let url = pagure.create_issue(&request.ticket_title(), &request.ticket_body())?;
        println!("{url}");
        Ok(())
    }
}

#[derive(Debug, clap::Args)]
pub struct RequestBranchOpts {
    /// The branch to request
    branch: Option<String>,
    /// Repository name the new branch is requested for
    #[clap(long, value_name = "NAME")]
    repo: Option<String>,
    /// Namespace of the repository
    #[clap(long, value_enum)]
    namespace: Option<Namespace>,
    /// The service levels (SLs) tied to the branch, e.g. bug_fixes:2030-12-01.
    /// Only for non-release branches.
    #[clap(long, num_args = 0..)]
    sl: Vec<String>,
    /// Don't create the branch in git but still create it in PDC
    #[clap(long)]
    no_git_branch: bool,
    /// If requesting an rpm stream branch, do not also request a matching module
    #[clap(long)]
    no_auto_module: bool,
    /// Make a new branch request for every active Fedora release
    #[clap(long)]
    all_releases: bool,
}

impl RequestBranchOpts {
    fn run(&self, ctx: &Ctx) -> Result<()> {
        let (namespace, repo_name) = match (&self.repo, self.namespace) {
            (Some(repo), ns) => (ns.unwrap_or(Namespace::Rpms), repo.clone()),
            (None, ns) => {
                let (detected_ns, repo) = gitutil::repo_context(&ctx.path)?
                    .context("Not in a package repository; use --repo to name one")?;
                let detected = match detected_ns.as_str() {
                    "modules" => Namespace::Modules,
                    "containers" => Namespace::Containers,
                    "tests" => Namespace::Tests,
                    "test-modules" => Namespace::TestModules,
                    _ => Namespace::Rpms,
                };
                (ns.unwrap_or(detected), repo)
            }
        };
        let active_branch = gitutil::current_branch(&ctx.path).unwrap_or(None);

        let pdc = PdcClient::new(&ctx.config.pdc.url)?;
        let planner = BranchPlanner {
            releases: &pdc,
            sl_authority: &pdc,
            arch_data: &InfraArchData,
            today: Utc::now().date_naive(),
        };
        let plan = planner.plan(&BranchPlanInput {
            namespace,
            repo_name,
            branch: self.branch.clone(),
            active_branch,
            service_levels: self.sl.clone(),
            all_releases: self.all_releases,
            create_git_branch: !self.no_git_branch,
            auto_module: !self.no_auto_module,
        })?;

        let pagure = pagure_client(&ctx.config)?;
        submit_plan(&pagure, &plan, |url| println!("{url}"))?;
        Ok(())
    }
}

/// File each planned ticket in order. Causal order matters: a failure
/// aborts the remaining plan, never the already-filed tickets, and no
/// emitted ticket is retracted.
fn submit_plan(
    tickets: &dyn Ticketing,
    plan: &[PlannedRequest],
    mut emit: impl FnMut(&str),
) -> crate::errors::Result<()> {
    for request in plan {
        let url = match request {
            PlannedRequest::Branch(r) => tickets.create_issue(&r.ticket_title(), &r.ticket_body())?,
            PlannedRequest::NewRepo(r) => tickets.create_issue(&r.ticket_title(), &r.ticket_body())?,
        };
        emit(&url);
    }
    Ok(())
}

#[derive(Debug, clap::Subcommand)]
pub enum OverrideCmd {
    /// Create a buildroot override from a build
    Create {
        /// Number of days the override should exist
        #[clap(long, default_value_t = 7, value_parser = clap::value_parser!(i64).range(1..))]
        duration: i64,
        /// Optional notes on why this override is in place
        #[clap(long, default_value = "No explanation given...")]
        notes: String,
        /// Create the override from this build
        nvr: String,
    },
    /// Extend the expiration of a buildroot override
    Extend {
        /// Number of days to extend the expiration date, or an explicit
        /// yyyy-mm-dd expiration date
        duration: OverrideDuration,
        /// The build whose override expiration should be extended
        nvr: String,
    },
}

impl OverrideCmd {
    fn run(&self, ctx: &Ctx) -> Result<()> {
        let username = std::env::var("USER").unwrap_or_default();
        let mut bodhi = bodhi::BodhiClient::new(ctx.config.bodhi.url(), &username)?;
        let utc_now = Utc::now().naive_utc();
        match self {
            OverrideCmd::Create {
                duration,
                notes,
                nvr,
            } => overrides::create_override(&mut bodhi, nvr, *duration, notes, utc_now)?,
            OverrideCmd::Extend { duration, nvr } => {
                overrides::extend_override(&mut bodhi, nvr, *duration, utc_now)?
            }
        }
        Ok(())
    }
}

#[derive(Debug, clap::Args)]
pub struct BuildTargetsOpts {}

impl BuildTargetsOpts {
    fn run(&self, ctx: &Ctx) -> Result<()> {
        let branch = gitutil::current_branch(&ctx.path)?
            .ok_or(FedpkgError::NoBranchSpecified)?;
        let (_, repo_name) = gitutil::repo_context(&ctx.path)?
            .context("Not in a package repository")?;
        let pdc = PdcClient::new(&ctx.config.pdc.url)?;

        let stream_branches = pdc.stream_branches(&repo_name)?;
        if !release::is_stream_branch(&stream_branches, &branch)? {
            println!("{}", release::build_target(&branch));
            return Ok(());
        }
        tracing::debug!("Current branch {branch} is a stream branch.");
        let Some(package_config) = PackageConfig::load(&ctx.path)? else {
            tracing::warn!(
                "No local config file exists. Create package.cfg to specify \
                 build targets to build."
            );
            println!("{}", release::build_target(&branch));
            return Ok(());
        };
        let active = pdc.release_branches()?;
        let mut releases = Vec::new();
        for target in &package_config.targets {
            match release::expand_release(target, &active) {
                Some(expanded) => releases.extend(expanded),
                None => tracing::error!("Target {target} is unknown. Skip."),
            }
        }
        releases.sort();
        releases.dedup();
        for release_name in releases {
            println!("{}", release::build_target(&release_name));
        }
        Ok(())
    }
}

#[derive(Debug, clap::Args)]
pub struct MockConfigOpts {
    /// Override the discovered release, e.g. f33. Use master for rawhide.
    #[clap(long)]
    release: Option<String>,
    /// Target architecture
    #[clap(long, default_value = std::env::consts::ARCH)]
    arch: String,
}

impl MockConfigOpts {
    fn run(&self, ctx: &Ctx) -> Result<()> {
        let branch = match &self.release {
            Some(release) => release.clone(),
            None => gitutil::current_branch(&ctx.path)?.ok_or(FedpkgError::NoBranchSpecified)?,
        };
        let identity = release::resolve(
            &branch,
            &self.arch,
            release::runtime_dist_tag().as_deref(),
            || {
                let refs = gitutil::remote_tracking_branches(&ctx.path)?;
                let anon = koji::KojiSession::anonymous(&ctx.config.koji.hub_url);
                release::find_rawhide_version(None, &refs, &anon)
            },
        )?;
        let mock_config = identity
            .mock_config
            .with_context(|| format!("No mock configuration exists for branch {branch}"))?;
        println!("{mock_config}");
        Ok(())
    }
}

fn pagure_client(config: &Config) -> Result<PagureClient> {
    let token = config.pagure.require_token(&config.cli_name)?;
    Ok(PagureClient::new(
        &config.pagure.url,
        token,
        &config.cli_name,
    )?)
}
