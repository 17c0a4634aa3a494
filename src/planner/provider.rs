// src/planner/provider.rs

//! Requirement to package resolution
//!
//! Maps a requested name to exactly one package. Real packages resolve to
//! themselves; virtual names are narrowed down to one provider or reported
//! back to the caller as ambiguous.

use crate::cache::{PackageDatabase, PackageId, Provide, VersionId, VersionSelect};
use crate::error::{Error, ProviderChoice, Result};
use crate::requirement::Requirement;
use crate::solver::DependencySolver;
use tracing::debug;

/// Whether a provide entry satisfies the requirement's constraint
///
/// A versioned requirement never matches an unversioned provide.
fn provide_matches<D: PackageDatabase>(db: &D, provide: &Provide, req: &Requirement) -> bool {
    if provide.name != req.name {
        return false;
    }
    match (&req.constraint, &provide.version) {
        (None, _) => true,
        (Some(c), Some(v)) => db.comparator().check(v, c.op, &c.version),
        (Some(_), None) => false,
    }
}

fn version_provides<D: PackageDatabase>(db: &D, ver: VersionId, req: &Requirement) -> bool {
    db.version(ver)
        .provides
        .iter()
        .any(|p| provide_matches(db, p, req))
}

/// Packages whose selected versions provide the requirement
fn scan_providers<D: PackageDatabase>(
    db: &D,
    req: &Requirement,
    selects: &[VersionSelect],
) -> Vec<PackageId> {
    let mut found: Vec<PackageId> = Vec::new();
    for ver in db.provided_by(&req.name) {
        let pkg = db.version(ver).package;
        if found.contains(&pkg) {
            continue;
        }
        let selected = selects
            .iter()
            .any(|&which| db.select_version(pkg, which) == Some(ver));
        if selected && version_provides(db, ver, req) {
            found.push(pkg);
        }
    }
    found
}

fn provider_choice<D: PackageDatabase>(db: &D, pkg: PackageId, shown: Option<VersionId>) -> ProviderChoice {
    ProviderChoice {
        name: db.package_name(pkg).to_string(),
        version: shown.map(|v| db.version(v).version.clone()),
        installed: db.current(pkg).is_some(),
    }
}

/// Resolve an install requirement to one package
///
/// Unknown names fall back to a scan of candidate and installed provides,
/// taking the best-scored provider, as do real packages without a candidate
/// version. A purely virtual name goes through provider disambiguation.
pub fn resolve_install_target<D, S>(
    db: &D,
    solver: &mut S,
    req: &Requirement,
    install_virtual: bool,
) -> Result<PackageId>
where
    D: PackageDatabase,
    S: DependencySolver,
{
    let pkg = match db.find_package(&req.name) {
        Some(pkg) => pkg,
        None => {
            let mut providers =
                scan_providers(db, req, &[VersionSelect::Candidate, VersionSelect::Now]);
            if providers.is_empty() {
                return Err(Error::PackageNotFound(format!(
                    "Package not found: {}",
                    req.name
                )));
            }
            solver.score_sort(db, &mut providers);
            debug!(
                "{} is provided by {} package(s), using {}",
                req.name,
                providers.len(),
                db.package_name(providers[0])
            );
            providers[0]
        }
    };

    if db.package(pkg).is_virtual() {
        return disambiguate_virtual(db, solver, req, install_virtual);
    }
    if db.candidate(pkg).is_none() {
        return candidate_fallback(db, solver, req, pkg);
    }
    Ok(pkg)
}

/// A real package with nothing to install can still be satisfied by
/// another package providing its name
fn candidate_fallback<D, S>(
    db: &D,
    solver: &mut S,
    req: &Requirement,
    pkg: PackageId,
) -> Result<PackageId>
where
    D: PackageDatabase,
    S: DependencySolver,
{
    let mut providers: Vec<PackageId> =
        scan_providers(db, req, &[VersionSelect::Candidate, VersionSelect::Now])
            .into_iter()
            .filter(|&p| p != pkg && db.candidate(p).is_some())
            .collect();
    if providers.is_empty() {
        return Err(Error::NoInstallableProviders(req.name.clone()));
    }
    solver.score_sort(db, &mut providers);
    debug!(
        "{} has no candidate version, using provider {}",
        req.name,
        db.package_name(providers[0])
    );
    Ok(providers[0])
}

/// Pick the provider of a virtual name
///
/// Providers whose installed version carries the provide win; otherwise
/// providers whose candidate carries a provide matching the constraint are
/// considered. More than one survivor is an error unless `install_virtual`
/// allows taking the best-scored one.
fn disambiguate_virtual<D, S>(
    db: &D,
    solver: &mut S,
    req: &Requirement,
    install_virtual: bool,
) -> Result<PackageId>
where
    D: PackageDatabase,
    S: DependencySolver,
{
    let mut owners: Vec<PackageId> = Vec::new();
    for ver in db.provided_by(&req.name) {
        let pkg = db.version(ver).package;
        if !owners.contains(&pkg) {
            owners.push(pkg);
        }
    }
    if owners.is_empty() {
        return Err(Error::PackageNotFound(format!(
            "Package not found: {}",
            req.name
        )));
    }
    solver.score_sort(db, &mut owners);

    let by_name = Requirement::named(req.name.as_str());
    let installed: Vec<PackageId> = owners
        .iter()
        .copied()
        .filter(|&p| db.current(p).is_some_and(|cur| version_provides(db, cur, &by_name)))
        .collect();

    let good = if installed.is_empty() {
        owners
            .iter()
            .copied()
            .filter(|&p| db.candidate(p).is_some_and(|cand| version_provides(db, cand, req)))
            .collect()
    } else {
        installed
    };

    match good.as_slice() {
        [] => Err(Error::NoInstallableProviders(req.name.clone())),
        [only] => {
            debug!("{} resolved to {}", req.name, db.package_name(*only));
            Ok(*only)
        }
        [best, ..] if install_virtual => {
            debug!("{} has several providers, taking {}", req.name, db.package_name(*best));
            Ok(*best)
        }
        _ => Err(Error::AmbiguousVirtualPackage {
            name: req.name.clone(),
            providers: good
                .iter()
                .map(|&p| provider_choice(db, p, db.candidate(p)))
                .collect(),
        }),
    }
}

/// Resolve a removal requirement to one installed package
///
/// Only installed versions are considered, both for the package itself and
/// for providers of a virtual name.
pub fn resolve_remove_target<D: PackageDatabase>(db: &D, req: &Requirement) -> Result<PackageId> {
    if let Some(pkg) = db.find_package(&req.name)
        && db.current(pkg).is_some()
    {
        return Ok(pkg);
    }

    let installed = scan_providers(db, req, &[VersionSelect::Now]);
    match installed.as_slice() {
        [] => Err(Error::PackageNotFound(format!(
            "Package {} is not installed, so not removed",
            req.name
        ))),
        [only] => {
            debug!("{} resolved to installed provider {}", req.name, db.package_name(*only));
            Ok(*only)
        }
        _ => Err(Error::AmbiguousVirtualPackage {
            name: req.name.clone(),
            providers: installed
                .iter()
                .map(|&p| provider_choice(db, p, db.current(p)))
                .collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryCache, VersionSpec};
    use crate::error::ErrorKind;
    use crate::solver::ProblemResolver;

    fn mta_cache(postfix_installed: bool, sendmail_installed: bool) -> MemoryCache {
        let mut cache = MemoryCache::new();
        for (name, installed) in [("postfix", postfix_installed), ("sendmail", sendmail_installed)] {
            let pkg = cache.add_package(name);
            let ver = cache.add_version(
                pkg,
                VersionSpec::new("1.0").provides("mail-transport-agent", Some("1.0")),
            );
            if installed {
                cache.set_installed(pkg, Some(ver));
            }
        }
        cache
    }

    #[test]
    fn test_real_package_resolves_directly() {
        let cache = mta_cache(false, false);
        let mut solver = ProblemResolver::new();
        let pkg =
            resolve_install_target(&cache, &mut solver, &Requirement::parse("postfix"), false).unwrap();
        assert_eq!(cache.package_name(pkg), "postfix");
    }

    #[test]
    fn test_package_without_candidate_uses_provider() {
        let mut cache = MemoryCache::new();
        let foo = cache.add_package("foo");
        cache.add_version(foo, VersionSpec::new("1.0"));
        cache.set_candidate(foo, None);
        let bar = cache.add_package("bar");
        cache.add_version(bar, VersionSpec::new("1.0").provides("foo", None));

        let mut solver = ProblemResolver::new();
        let pkg = resolve_install_target(&cache, &mut solver, &Requirement::parse("foo"), false)
            .unwrap();
        assert_eq!(cache.package_name(pkg), "bar");
    }

    #[test]
    fn test_package_without_candidate_or_provider() {
        let mut cache = MemoryCache::new();
        let foo = cache.add_package("foo");
        cache.add_version(foo, VersionSpec::new("1.0"));
        cache.set_candidate(foo, None);

        let mut solver = ProblemResolver::new();
        let err = resolve_install_target(&cache, &mut solver, &Requirement::parse("foo"), false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoInstallableProviders);
    }

    #[test]
    fn test_unknown_name_not_found() {
        let cache = mta_cache(false, false);
        let mut solver = ProblemResolver::new();
        let err = resolve_install_target(&cache, &mut solver, &Requirement::parse("exim"), false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PackageNotFound);
    }

    #[test]
    fn test_virtual_install_ambiguous() {
        let cache = mta_cache(false, false);
        let mut solver = ProblemResolver::new();
        let err = resolve_install_target(
            &cache,
            &mut solver,
            &Requirement::parse("mail-transport-agent"),
            false,
        )
        .unwrap_err();
        match err {
            Error::AmbiguousVirtualPackage { providers, .. } => {
                let mut names: Vec<_> = providers.into_iter().map(|p| p.name).collect();
                names.sort();
                assert_eq!(names, vec!["postfix", "sendmail"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_virtual_install_prefers_installed_provider() {
        let cache = mta_cache(true, false);
        let mut solver = ProblemResolver::new();
        let pkg = resolve_install_target(
            &cache,
            &mut solver,
            &Requirement::parse("mail-transport-agent"),
            false,
        )
        .unwrap();
        assert_eq!(cache.package_name(pkg), "postfix");
    }

    #[test]
    fn test_install_virtual_takes_best_scored() {
        let cache = mta_cache(false, false);
        let mut solver = ProblemResolver::new();
        let pkg = resolve_install_target(
            &cache,
            &mut solver,
            &Requirement::parse("mail-transport-agent"),
            true,
        )
        .unwrap();
        // equal scores fall back to name order
        assert_eq!(cache.package_name(pkg), "postfix");
    }

    #[test]
    fn test_virtual_constraint_filters_candidates() {
        let cache = mta_cache(false, false);
        let mut solver = ProblemResolver::new();
        let err = resolve_install_target(
            &cache,
            &mut solver,
            &Requirement::parse("mail-transport-agent>=2.0"),
            false,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoInstallableProviders);
    }

    #[test]
    fn test_unindexed_provide_found_by_scan() {
        let mut cache = MemoryCache::new();
        cache
            .register_file_version(
                "local-tool",
                VersionSpec::new("0.1").provides("tool-api", Some("2")).origin("/tmp/local-tool.rpm"),
            )
            .unwrap();
        assert!(cache.find_package("tool-api").is_none());

        let mut solver = ProblemResolver::new();
        let pkg = resolve_install_target(&cache, &mut solver, &Requirement::parse("tool-api>=2"), false)
            .unwrap();
        assert_eq!(cache.package_name(pkg), "local-tool");
    }

    #[test]
    fn test_remove_virtual_with_two_installed_providers() {
        let cache = mta_cache(true, true);
        let err = resolve_remove_target(&cache, &Requirement::parse("mail-transport-agent")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AmbiguousVirtualPackage);
        assert!(err.to_string().contains("[Installed]"));
    }

    #[test]
    fn test_remove_virtual_single_installed_provider() {
        let cache = mta_cache(false, true);
        let pkg = resolve_remove_target(&cache, &Requirement::parse("mail-transport-agent")).unwrap();
        assert_eq!(cache.package_name(pkg), "sendmail");
    }

    #[test]
    fn test_remove_not_installed() {
        let cache = mta_cache(false, false);
        let err = resolve_remove_target(&cache, &Requirement::parse("postfix")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PackageNotFound);
        assert!(err.to_string().contains("is not installed"));
    }
}
