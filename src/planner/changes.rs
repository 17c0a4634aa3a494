// src/planner/changes.rs

//! Change collection
//!
//! One pass over the final mark states. Nothing here mutates the database.

use super::TransactionResult;
use crate::cache::PackageDatabase;
use std::collections::BTreeSet;
use tracing::debug;

/// Byte count as a signed size, saturating at `i64::MAX`
fn signed(bytes: u64) -> i64 {
    i64::try_from(bytes).unwrap_or(i64::MAX)
}

/// Summarize the database's marks as a [`TransactionResult`]
///
/// Packages not named in `requested_install` / `requested_remove` are also
/// listed as extra installs or removals. Packages appear in database order.
/// Sizes saturate instead of wrapping.
pub fn collect_changes<D: PackageDatabase>(
    db: &D,
    requested_install: &BTreeSet<String>,
    requested_remove: &BTreeSet<String>,
) -> TransactionResult {
    let mut result = TransactionResult::default();
    let mut download: u64 = 0;
    let mut install: i64 = 0;

    for pkg in db.package_ids() {
        let name = db.package_name(pkg);

        if db.is_new_install(pkg) {
            result.new_installed.push(name.to_string());
            if !requested_install.contains(name) {
                result.extra_installed.push(name.to_string());
            }
            if let Some(cand) = db.candidate(pkg) {
                let cand = db.version(cand);
                download = download.saturating_add(cand.size);
                install = install.saturating_add(signed(cand.installed_size));
            }
        } else if db.is_upgrade(pkg) || db.is_downgrade(pkg) {
            if db.is_upgrade(pkg) {
                result.upgraded.push(name.to_string());
            } else {
                result.downgraded.push(name.to_string());
            }
            if let (Some(cand), Some(cur)) = (db.candidate(pkg), db.current(pkg)) {
                let (cand, cur) = (db.version(cand), db.version(cur));
                download = download.saturating_add(cand.size);
                install = install
                    .saturating_add(signed(cand.installed_size))
                    .saturating_sub(signed(cur.installed_size));
            }
        } else if db.is_delete(pkg) {
            result.removed.push(name.to_string());
            if !requested_remove.contains(name) {
                result.extra_removed.push(name.to_string());
            }
            if let Some(cur) = db.current(pkg) {
                install = install.saturating_sub(signed(db.version(cur).installed_size));
            }
        } else if db.is_reinstall(pkg) {
            result.new_installed.push(name.to_string());
            if let Some(cur) = db.current(pkg) {
                download = download.saturating_add(db.version(cur).size);
            }
        }
    }

    result.download_size = download;
    result.install_size = install;
    debug!(
        "Collected changes: {} new, {} upgraded, {} downgraded, {} removed",
        result.new_installed.len(),
        result.upgraded.len(),
        result.downgraded.len(),
        result.removed.len()
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{AutoMark, MemoryCache, VersionSpec};

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_install_sizes() {
        let mut cache = MemoryCache::new();
        let editor = cache.add_package("editor");
        cache.add_version(editor, VersionSpec::new("1.0").sizes(1000, 4000));
        let lib = cache.add_package("libedit");
        cache.add_version(lib, VersionSpec::new("2.0").sizes(200, 800));
        cache.mark_install(editor, AutoMark::Manual, false);
        cache.mark_install(lib, AutoMark::Auto, false);

        let result = collect_changes(&cache, &names(&["editor"]), &names(&[]));
        assert_eq!(result.new_installed, vec!["editor", "libedit"]);
        assert_eq!(result.extra_installed, vec!["libedit"]);
        assert_eq!(result.download_size, 1200);
        assert_eq!(result.install_size, 4800);
    }

    #[test]
    fn test_upgrade_and_removal_sizes() {
        let mut cache = MemoryCache::new();
        let foo = cache.add_package("foo");
        let old = cache.add_version(foo, VersionSpec::new("1.0").sizes(100, 500));
        cache.add_version(foo, VersionSpec::new("1.1").sizes(120, 700));
        cache.set_installed(foo, Some(old));
        let bar = cache.add_package("bar");
        let v = cache.add_version(bar, VersionSpec::new("3.0").sizes(50, 300));
        cache.set_installed(bar, Some(v));

        cache.mark_install(foo, AutoMark::DontChange, false);
        cache.mark_delete(bar, false);

        let result = collect_changes(&cache, &names(&[]), &names(&[]));
        assert_eq!(result.upgraded, vec!["foo"]);
        assert_eq!(result.removed, vec!["bar"]);
        assert_eq!(result.extra_removed, vec!["bar"]);
        assert_eq!(result.download_size, 120);
        assert_eq!(result.install_size, 200 - 300);
    }

    #[test]
    fn test_reinstall_counts_download_only() {
        let mut cache = MemoryCache::new();
        let foo = cache.add_package("foo");
        let v = cache.add_version(foo, VersionSpec::new("1.0").sizes(100, 500));
        cache.set_installed(foo, Some(v));
        cache.set_reinstall(foo, true);

        let result = collect_changes(&cache, &names(&[]), &names(&[]));
        assert_eq!(result.new_installed, vec!["foo"]);
        assert!(result.extra_installed.is_empty());
        assert_eq!(result.download_size, 100);
        assert_eq!(result.install_size, 0);
    }

    #[test]
    fn test_downgrade_listed_separately() {
        let mut cache = MemoryCache::new();
        let foo = cache.add_package("foo");
        let cur = cache.add_version(foo, VersionSpec::new("2.0").sizes(100, 600));
        let older = cache.add_version(foo, VersionSpec::new("1.5").sizes(90, 500));
        cache.set_installed(foo, Some(cur));
        cache.set_candidate(foo, Some(older));
        cache.mark_install(foo, AutoMark::DontChange, false);

        let result = collect_changes(&cache, &names(&["foo"]), &names(&[]));
        assert!(result.upgraded.is_empty());
        assert_eq!(result.downgraded, vec!["foo"]);
        assert_eq!(result.download_size, 90);
        assert_eq!(result.install_size, -100);
        assert!(!result.is_empty());
    }

    #[test]
    fn test_huge_sizes_saturate() {
        let mut cache = MemoryCache::new();
        for name in ["big", "bigger"] {
            let pkg = cache.add_package(name);
            cache.add_version(pkg, VersionSpec::new("1.0").sizes(u64::MAX, u64::MAX));
            cache.mark_install(pkg, AutoMark::Manual, false);
        }

        let result = collect_changes(&cache, &names(&["big", "bigger"]), &names(&[]));
        assert_eq!(result.download_size, u64::MAX);
        assert_eq!(result.install_size, i64::MAX);
    }

    #[test]
    fn test_untouched_database_is_empty() {
        let mut cache = MemoryCache::new();
        let foo = cache.add_package("foo");
        let v = cache.add_version(foo, VersionSpec::new("1.0"));
        cache.set_installed(foo, Some(v));
        assert!(collect_changes(&cache, &names(&[]), &names(&[])).is_empty());
    }
}
