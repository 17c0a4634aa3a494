// tests/common/mod.rs

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use pkgplan::db;
use pkgplan::{Dependency, MemoryCache, PackageId, VersionSpec};
use tempfile::TempDir;

/// Add a package with one available version
pub fn available(cache: &mut MemoryCache, name: &str, spec: VersionSpec) -> PackageId {
    let pkg = cache.add_package(name);
    cache.add_version(pkg, spec);
    pkg
}

/// Add a package whose only version is installed
pub fn installed(cache: &mut MemoryCache, name: &str, spec: VersionSpec) -> PackageId {
    let pkg = cache.add_package(name);
    let ver = cache.add_version(pkg, spec);
    cache.set_installed(pkg, Some(ver));
    pkg
}

/// A small system covering every planning path:
///
/// - `editor`: available, 1000 bytes download, 4000 installed
/// - `foo` depends on `bar`, both available
/// - `a` conflicts with `b`, both available
/// - `postfix` and `sendmail` installed, both providing `mail-transport-agent`
/// - `bash` installed and essential, providing `sh`
/// - `legacy` installed with no downloadable archive
/// - `app` installed, depending on installed `libbar`
pub fn sample_cache() -> MemoryCache {
    let mut cache = MemoryCache::new();

    available(&mut cache, "editor", VersionSpec::new("1.0").sizes(1000, 4000));

    available(
        &mut cache,
        "foo",
        VersionSpec::new("2.0").sizes(300, 900).dep(Dependency::depends("bar")),
    );
    available(&mut cache, "bar", VersionSpec::new("1.5").sizes(200, 600));

    available(&mut cache, "a", VersionSpec::new("1.0").dep(Dependency::conflicts("b")));
    available(&mut cache, "b", VersionSpec::new("1.0"));

    for name in ["postfix", "sendmail"] {
        installed(
            &mut cache,
            name,
            VersionSpec::new("1.0").provides("mail-transport-agent", None),
        );
    }

    let bash = installed(&mut cache, "bash", VersionSpec::new("5.2").provides("sh", None));
    cache.set_essential(bash, true);

    installed(&mut cache, "legacy", VersionSpec::new("0.1").downloadable(false));

    installed(&mut cache, "libbar", VersionSpec::new("1.0").sizes(50, 250));
    installed(
        &mut cache,
        "app",
        VersionSpec::new("1.0").sizes(80, 320).dep(Dependency::depends("libbar")),
    );

    cache
}

/// Write an RPM package file into `dir` and return its path
///
/// Each name in `requires` becomes an unversioned requirement.
pub fn write_rpm(dir: &TempDir, name: &str, version: &str, requires: &[&str]) -> String {
    let payload = dir.path().join(format!("{name}.payload"));
    std::fs::write(&payload, vec![0u8; 1024]).unwrap();

    let mut builder = rpm::PackageBuilder::new(name, version, "MIT", "x86_64", "test package");
    for req in requires {
        builder = builder.requires(rpm::Dependency::any(*req));
    }
    let pkg = builder
        .with_file(&payload, rpm::FileOptions::new(format!("/usr/share/{name}/data")))
        .unwrap()
        .build()
        .unwrap();

    let path = dir.path().join(format!("{name}-{version}-1.x86_64.rpm"));
    pkg.write_file(&path).unwrap();
    path.to_str().unwrap().to_string()
}

/// Create an on-disk database holding a few packages.
///
/// Returns (TempDir, db_path) - keep the TempDir alive to prevent cleanup.
pub fn setup_test_db() -> (TempDir, String) {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir
        .path()
        .join("pkgplan.db")
        .to_str()
        .unwrap()
        .to_string();

    db::init(&db_path).unwrap();
    let mut conn = db::open(&db_path).unwrap();

    db::transaction(&mut conn, |tx| {
        let editor = db::insert_package(tx, "editor", false)?;
        db::insert_version(
            tx,
            editor,
            &VersionSpec::new("1.0")
                .sizes(1000, 4000)
                .dep(Dependency::depends("libedit")),
        )?;

        let libedit = db::insert_package(tx, "libedit", false)?;
        db::insert_version(tx, libedit, &VersionSpec::new("3.1").sizes(100, 400))?;

        let coreutils = db::insert_package(tx, "coreutils", true)?;
        db::insert_version(tx, coreutils, &VersionSpec::new("9.4").sizes(500, 2000))?;
        db::set_installed(tx, coreutils, Some("9.4"), false)?;
        Ok(())
    })
    .unwrap();

    (temp_dir, db_path)
}
