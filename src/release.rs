//! Mapping git branch names to concrete release identities: dist tags,
//! build/mock configurations, override tags, and the rpm macro definitions
//! derived from them.
// SPDX-License-Identifier: GPL-2.0-or-later

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{FedpkgError, Result};
use crate::koji::BuildSystem;

/// Matches branch names that represent (or once represented) a fixed
/// distribution release.
pub static RELEASE_BRANCH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(f\d+|el\d+|epel\d+)$").unwrap());

static FEDORA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^f(\d+)$").unwrap());
static EPEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:el|epel)(\d+)$").unwrap());
static EPEL_PLAYGROUND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^epel(\d+)-playground$").unwrap());
static OLPC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^olpc(\d+)$").unwrap());

/// The closed set of branch shapes we recognize. Anything that is not a
/// release branch or the rawhide alias is a stream (arbitrary) branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    Fedora(u32),
    Epel(u32),
    EpelPlayground(u32),
    Olpc(u32),
    Rawhide,
    Stream,
}

/// Classify a branch name. Pure string pattern matching; resolution of
/// stream branches into an error happens in [`resolve`], not here.
pub fn classify(branch: &str) -> BranchKind {
    let capture = |re: &Regex| {
        re.captures(branch)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
    };
    if let Some(n) = capture(&FEDORA_RE) {
        BranchKind::Fedora(n)
    } else if let Some(n) = capture(&EPEL_RE) {
        BranchKind::Epel(n)
    } else if let Some(n) = capture(&EPEL_PLAYGROUND_RE) {
        BranchKind::EpelPlayground(n)
    } else if let Some(n) = capture(&OLPC_RE) {
        BranchKind::Olpc(n)
    } else if branch == "master" || branch == "rawhide" {
        BranchKind::Rawhide
    } else {
        BranchKind::Stream
    }
}

/// True if the branch is (or will become) an EPEL branch.
pub fn is_epel(branch: &str) -> bool {
    matches!(classify(branch), BranchKind::Epel(_))
}

/// Which distribution macro carries the release number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistVar {
    Fedora,
    Rhel,
    Olpc,
}

impl DistVar {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistVar::Fedora => "fedora",
            DistVar::Rhel => "rhel",
            DistVar::Olpc => "olpc",
        }
    }
}

/// The full set of release-derived parameters for one branch. Immutable
/// once computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseIdentity {
    pub dist_value: u32,
    pub dist_var: DistVar,
    pub dist_tag: String,
    pub mock_config: Option<String>,
    pub override_tag: Option<String>,
    /// The macro of the *other* distribution family, which must be undefined
    /// so a build host default cannot leak in.
    pub dist_unset: &'static str,
    /// Set iff the runtime host's own dist tag is known and differs from the
    /// target; that tag must then be undefined in the build environment.
    pub runtime_tag_unset: Option<String>,
}

/// Resolve a branch name into a [`ReleaseIdentity`].
///
/// `rawhide_version` is consulted only for the rawhide alias; every other
/// recognized branch resolves without it. `runtime_dist_tag` is the dist tag
/// of the machine we are running on ([`runtime_dist_tag`]), advisory only.
pub fn resolve(
    branch: &str,
    local_arch: &str,
    runtime_dist_tag: Option<&str>,
    rawhide_version: impl FnOnce() -> Result<u32>,
) -> Result<ReleaseIdentity> {
    let (dist_value, dist_var, dist_tag, mock_config, override_tag, dist_unset) =
        match classify(branch) {
            BranchKind::Fedora(n) => (
                n,
                DistVar::Fedora,
                format!("fc{n}"),
                Some(format!("fedora-{n}-{local_arch}")),
                Some(format!("f{n}-override")),
                "rhel",
            ),
            BranchKind::Epel(n) => (
                n,
                DistVar::Rhel,
                format!("el{n}"),
                Some(format!("epel-{n}-{local_arch}")),
                Some(format!("epel{n}-override")),
                "fedora",
            ),
            BranchKind::EpelPlayground(n) => (
                n,
                DistVar::Rhel,
                format!("el{n}_playground"),
                Some(format!("epel-{n}-{local_arch}")),
                Some(format!("epel{n}-override")),
                "fedora",
            ),
            BranchKind::Olpc(n) => (
                n,
                DistVar::Olpc,
                format!("olpc{n}"),
                None,
                Some(format!("dist-olpc{n}-override")),
                "rhel",
            ),
            BranchKind::Rawhide => {
                let n = rawhide_version()?;
                (
                    n,
                    DistVar::Fedora,
                    format!("fc{n}"),
                    Some(format!("fedora-rawhide-{local_arch}")),
                    None,
                    "rhel",
                )
            }
            BranchKind::Stream => {
                return Err(FedpkgError::UnknownBranch {
                    branch: branch.to_string(),
                })
            }
        };
    let runtime_tag_unset = runtime_dist_tag
        .filter(|runtime| *runtime != dist_tag)
        .map(|runtime| runtime.to_string());
    Ok(ReleaseIdentity {
        dist_value,
        dist_var,
        dist_tag,
        mock_config,
        override_tag,
        dist_unset,
        runtime_tag_unset,
    })
}

impl ReleaseIdentity {
    /// The `--define`/`--eval` argument list handed to rpmbuild, anchored at
    /// the package checkout `path`.
    pub fn rpm_defines(&self, path: &Path) -> Vec<String> {
        let path = path.display();
        let mut defines = vec![
            format!("--define '_sourcedir {path}'"),
            format!("--define '_specdir {path}'"),
            format!("--define '_builddir {path}'"),
            format!("--define '_srcrpmdir {path}'"),
            format!("--define '_rpmdir {path}'"),
            format!("--define 'dist %{{?distprefix}}.{}'", self.dist_tag),
            format!("--define '{} {}'", self.dist_var.as_str(), self.dist_value),
            format!("--eval '%undefine {}'", self.dist_unset),
            format!("--define '{} 1'", self.dist_tag),
        ];
        if let Some(runtime_tag) = &self.runtime_tag_unset {
            defines.push(format!("--eval '%undefine {runtime_tag}'"));
        }
        defines
    }
}

/// Parse the leading release number out of a build target's destination tag,
/// e.g. the `33` of `f33-updates-candidate`.
fn version_from_dest_tag(dest_tag: &str) -> Result<u32> {
    dest_tag
        .split('-')
        .next()
        .and_then(|part| part.strip_prefix('f'))
        .and_then(|digits| digits.parse().ok())
        .ok_or(FedpkgError::RawhideResolution)
}

/// Find the version number that rawhide currently maps to.
///
/// An already-authenticated koji session is authoritative: it reflects the
/// actual current build configuration. Failing that, the highest local
/// `f<NN>` remote-tracking branch plus one (rawhide is always one version
/// ahead of the newest branched release). Only as a last resort is an
/// anonymous koji query made.
pub fn find_rawhide_version(
    session: Option<&dyn BuildSystem>,
    remote_refs: &[String],
    anon: &dyn BuildSystem,
) -> Result<u32> {
    if let Some(session) = session {
        let dest_tag = session.build_target_dest_tag("rawhide")?;
        return version_from_dest_tag(&dest_tag);
    }

    // Remote-tracking refs look like "origin/f40"; split off the remote
    // part. A remote literally named with a '/' breaks this -- known
    // limitation.
    let newest = remote_refs
        .iter()
        .filter_map(|r| r.split_once('/'))
        .filter_map(|(_remote, name)| {
            FEDORA_RE
                .captures(name)
                .and_then(|c| c[1].parse::<u32>().ok())
        })
        .max();

    if let Some(newest) = newest {
        return Ok(newest + 1);
    }
    let dest_tag = anon
        .build_target_dest_tag("rawhide")
        .map_err(|_| FedpkgError::RawhideResolution)?;
    version_from_dest_tag(&dest_tag)
}

/// The dist tag of the machine we are running on, if determinable. Advisory
/// only; any failure yields `None` and must never block resolution.
pub fn runtime_dist_tag() -> Option<String> {
    let release = os_release::OsRelease::new().ok()?;
    tag_from_os_release(&release.id, &release.version_id)
}

fn tag_from_os_release(id: &str, version_id: &str) -> Option<String> {
    if version_id.is_empty() {
        return None;
    }
    match id {
        "fedora" => Some(format!("fc{version_id}")),
        "rhel" | "redhat" | "centos" => {
            let major = version_id.split('.').next()?;
            Some(format!("el{major}"))
        }
        _ => None,
    }
}

/// Map a release name to its koji build target.
pub fn build_target(release: &str) -> String {
    if release == "master" || release == "rawhide" {
        "rawhide".to_string()
    } else {
        format!("{release}-candidate")
    }
}

/// Expand a configured target name to concrete release names. `fedora` and
/// `epel` are aliases for the respective active release sets; concrete
/// active names and playground branches pass through; anything else is
/// unknown.
pub fn expand_release(
    rel: &str,
    active_releases: &BTreeMap<String, Vec<String>>,
) -> Option<Vec<String>> {
    let fedora = active_releases.get("fedora").cloned().unwrap_or_default();
    let epel = active_releases.get("epel").cloned().unwrap_or_default();
    if rel == "master" || rel == "rawhide" {
        Some(vec![rel.to_string()])
    } else if rel == "fedora" {
        Some(fedora)
    } else if rel == "epel" {
        Some(epel)
    } else if fedora.iter().any(|r| r == rel) || epel.iter().any(|r| r == rel) {
        Some(vec![rel.to_string()])
    } else if matches!(classify(rel), BranchKind::EpelPlayground(_)) {
        Some(vec![rel.to_string()])
    } else {
        None
    }
}

/// A package branch as reported by the release-metadata service.
#[derive(Debug, Clone, serde_derive::Deserialize)]
pub struct StreamBranch {
    pub name: String,
    pub active: bool,
}

/// Determine whether `name` is one of the package's stream branches.
/// Requesting a build from an inactive stream branch is an error.
pub fn is_stream_branch(stream_branches: &[StreamBranch], name: &str) -> Result<bool> {
    for branch in stream_branches {
        if branch.name != name {
            continue;
        }
        if branch.active {
            return Ok(true);
        }
        return Err(FedpkgError::InvalidBranchName(format!(
            "Cannot build from stream branch {name} as it is inactive."
        )));
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FedpkgError;

    struct FixedTarget(&'static str);
    struct FailingTarget;

    impl BuildSystem for FixedTarget {
        fn build_target_dest_tag(&self, _name: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    impl BuildSystem for FailingTarget {
        fn build_target_dest_tag(&self, _name: &str) -> Result<String> {
            Err(FedpkgError::remote("koji", "connection refused"))
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("f33"), BranchKind::Fedora(33));
        assert_eq!(classify("f9"), BranchKind::Fedora(9));
        assert_eq!(classify("el6"), BranchKind::Epel(6));
        assert_eq!(classify("epel7"), BranchKind::Epel(7));
        assert_eq!(classify("epel8-playground"), BranchKind::EpelPlayground(8));
        assert_eq!(classify("olpc3"), BranchKind::Olpc(3));
        assert_eq!(classify("master"), BranchKind::Rawhide);
        assert_eq!(classify("rawhide"), BranchKind::Rawhide);
        assert_eq!(classify("f33-foobar"), BranchKind::Stream);
        assert_eq!(classify("9"), BranchKind::Stream);
        assert_eq!(classify("totally-bogus-branch"), BranchKind::Stream);
    }

    #[test]
    fn test_resolve_fedora() -> Result<()> {
        let id = resolve("f33", "x86_64", None, || unreachable!())?;
        assert_eq!(id.dist_value, 33);
        assert_eq!(id.dist_var, DistVar::Fedora);
        assert_eq!(id.dist_tag, "fc33");
        assert_eq!(id.mock_config.as_deref(), Some("fedora-33-x86_64"));
        assert_eq!(id.override_tag.as_deref(), Some("f33-override"));
        assert_eq!(id.dist_unset, "rhel");
        assert!(id.runtime_tag_unset.is_none());
        Ok(())
    }

    #[test]
    fn test_resolve_epel() -> Result<()> {
        for branch in ["el6", "epel6"] {
            let id = resolve(branch, "x86_64", None, || unreachable!())?;
            assert_eq!(id.dist_value, 6);
            assert_eq!(id.dist_var, DistVar::Rhel);
            assert_eq!(id.dist_tag, "el6");
            assert_eq!(id.mock_config.as_deref(), Some("epel-6-x86_64"));
            assert_eq!(id.override_tag.as_deref(), Some("epel6-override"));
            assert_eq!(id.dist_unset, "fedora");
        }
        Ok(())
    }

    #[test]
    fn test_resolve_epel_playground() -> Result<()> {
        let id = resolve("epel8-playground", "aarch64", None, || unreachable!())?;
        assert_eq!(id.dist_tag, "el8_playground");
        assert_eq!(id.mock_config.as_deref(), Some("epel-8-aarch64"));
        assert_eq!(id.override_tag.as_deref(), Some("epel8-override"));
        Ok(())
    }

    #[test]
    fn test_resolve_olpc() -> Result<()> {
        let id = resolve("olpc4", "x86_64", None, || unreachable!())?;
        assert_eq!(id.dist_var, DistVar::Olpc);
        assert_eq!(id.dist_tag, "olpc4");
        assert!(id.mock_config.is_none());
        assert_eq!(id.override_tag.as_deref(), Some("dist-olpc4-override"));
        Ok(())
    }

    #[test]
    fn test_resolve_rawhide() -> Result<()> {
        let id = resolve("master", "x86_64", None, || Ok(41))?;
        assert_eq!(id.dist_value, 41);
        assert_eq!(id.dist_tag, "fc41");
        assert_eq!(id.mock_config.as_deref(), Some("fedora-rawhide-x86_64"));
        assert!(id.override_tag.is_none());
        Ok(())
    }

    #[test]
    fn test_resolve_unknown() {
        let err = resolve("totally-bogus-branch", "x86_64", None, || Ok(41)).unwrap_err();
        assert!(matches!(err, FedpkgError::UnknownBranch { .. }));
        assert!(err.to_string().contains("totally-bogus-branch"));
    }

    #[test]
    fn test_runtime_tag_conflict() -> Result<()> {
        // Host tag differs from the target: must be unset.
        let id = resolve("el7", "x86_64", Some("fc31"), || unreachable!())?;
        assert_eq!(id.runtime_tag_unset.as_deref(), Some("fc31"));
        // Host tag matches the target: nothing to do.
        let id = resolve("f31", "x86_64", Some("fc31"), || unreachable!())?;
        assert!(id.runtime_tag_unset.is_none());
        Ok(())
    }

    #[test]
    fn test_rpm_defines() -> Result<()> {
        let id = resolve("f33", "x86_64", Some("fc31"), || unreachable!())?;
        let defines = id.rpm_defines(Path::new("/srv/pkg"));
        similar_asserts::assert_eq!(
            defines,
            [
                "--define '_sourcedir /srv/pkg'",
                "--define '_specdir /srv/pkg'",
                "--define '_builddir /srv/pkg'",
                "--define '_srcrpmdir /srv/pkg'",
                "--define '_rpmdir /srv/pkg'",
                "--define 'dist %{?distprefix}.fc33'",
                "--define 'fedora 33'",
                "--eval '%undefine rhel'",
                "--define 'fc33 1'",
                "--eval '%undefine fc31'",
            ]
            .map(String::from)
            .to_vec()
        );
        Ok(())
    }

    #[test]
    fn test_rawhide_from_local_branches() -> Result<()> {
        let refs = ["origin/f27", "origin/f28", "origin/private"]
            .map(String::from)
            .to_vec();
        assert_eq!(find_rawhide_version(None, &refs, &FailingTarget)?, 29);
        // f9/f10 must compare numerically, not lexicographically.
        let refs = ["origin/f9", "origin/f10"].map(String::from).to_vec();
        assert_eq!(find_rawhide_version(None, &refs, &FailingTarget)?, 11);
        // "f28-foobar" style refs never count.
        let refs = ["origin/f28-foobar"].map(String::from).to_vec();
        assert!(find_rawhide_version(None, &refs, &FailingTarget).is_err());
        Ok(())
    }

    #[test]
    fn test_rawhide_from_session() -> Result<()> {
        let session = FixedTarget("f41-updates-candidate");
        // The authenticated session wins over local branches.
        let refs = ["origin/f27"].map(String::from).to_vec();
        assert_eq!(
            find_rawhide_version(Some(&session), &refs, &FailingTarget)?,
            41
        );
        Ok(())
    }

    #[test]
    fn test_rawhide_anonymous_fallback() -> Result<()> {
        assert_eq!(
            find_rawhide_version(None, &[], &FixedTarget("f40-pending"))?,
            40
        );
        let err = find_rawhide_version(None, &[], &FailingTarget).unwrap_err();
        assert!(matches!(err, FedpkgError::RawhideResolution));
        Ok(())
    }

    #[test]
    fn test_tag_from_os_release() {
        assert_eq!(tag_from_os_release("fedora", "40").as_deref(), Some("fc40"));
        assert_eq!(tag_from_os_release("centos", "9").as_deref(), Some("el9"));
        assert_eq!(tag_from_os_release("rhel", "8.6").as_deref(), Some("el8"));
        assert_eq!(tag_from_os_release("debian", "12"), None);
        assert_eq!(tag_from_os_release("fedora", ""), None);
    }

    #[test]
    fn test_build_target() {
        assert_eq!(build_target("master"), "rawhide");
        assert_eq!(build_target("f33"), "f33-candidate");
        assert_eq!(
            build_target("epel8-playground"),
            "epel8-playground-candidate"
        );
    }

    #[test]
    fn test_expand_release() {
        let mut active = BTreeMap::new();
        active.insert("fedora".to_string(), vec!["f32".into(), "f33".into()]);
        active.insert("epel".to_string(), vec!["el6".into(), "epel7".into()]);
        assert_eq!(expand_release("master", &active), Some(vec!["master".into()]));
        assert_eq!(
            expand_release("fedora", &active),
            Some(vec!["f32".into(), "f33".into()])
        );
        assert_eq!(
            expand_release("epel", &active),
            Some(vec!["el6".into(), "epel7".into()])
        );
        assert_eq!(expand_release("f33", &active), Some(vec!["f33".into()]));
        assert_eq!(
            expand_release("epel8-playground", &active),
            Some(vec!["epel8-playground".into()])
        );
        assert_eq!(expand_release("f11", &active), None);
        assert_eq!(expand_release("bogus", &active), None);
    }

    #[test]
    fn test_is_stream_branch() -> Result<()> {
        let branches = vec![
            StreamBranch {
                name: "8".to_string(),
                active: true,
            },
            StreamBranch {
                name: "10".to_string(),
                active: false,
            },
        ];
        assert!(is_stream_branch(&branches, "8")?);
        assert!(!is_stream_branch(&branches, "f33")?);
        assert!(is_stream_branch(&branches, "10").is_err());
        Ok(())
    }
}
