mod common;

use assert_fs::TempDir;
use assert_fs::prelude::*;
use common::shell_runtime;
use server_host::config::EntrypointFallback;
use server_host::error::{Error, Result};
use server_host::server::EntrypointResolver;

fn resolver(fallback: EntrypointFallback) -> EntrypointResolver {
    EntrypointResolver::new(shell_runtime(), fallback)
}

#[test]
fn test_canonical_names_take_precedence() -> Result<()> {
    let dir = TempDir::new().unwrap();
    dir.child("start.sh").write_str("echo start\n").unwrap();
    dir.child("main.sh").write_str("echo main\n").unwrap();
    dir.child("a/aaa.sh").write_str("# entrypoint\n").unwrap();

    let entrypoint = resolver(EntrypointFallback::Placeholder).resolve(dir.path())?;

    assert_eq!(entrypoint, dir.path().join("main.sh"));
    Ok(())
}

#[test]
fn test_later_canonical_name_when_earlier_missing() -> Result<()> {
    let dir = TempDir::new().unwrap();
    dir.child("start.sh").write_str("echo start\n").unwrap();

    let entrypoint = resolver(EntrypointFallback::Placeholder).resolve(dir.path())?;

    assert_eq!(entrypoint, dir.path().join("start.sh"));
    Ok(())
}

#[test]
fn test_scan_finds_marked_script_deterministically() -> Result<()> {
    let dir = TempDir::new().unwrap();
    dir.child("zeta/run.sh").write_str("# entrypoint\necho zeta\n").unwrap();
    dir.child("beta/run.sh").write_str("# entrypoint\necho beta\n").unwrap();
    dir.child("alpha/lib.sh").write_str("echo library\n").unwrap();
    dir.child("alpha/notes.txt").write_str("# entrypoint\n").unwrap();

    let resolver = resolver(EntrypointFallback::Placeholder);
    let first = resolver.resolve(dir.path())?;
    let second = resolver.resolve(dir.path())?;

    assert_eq!(first, dir.path().join("beta/run.sh"));
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_scan_skips_private_scripts() -> Result<()> {
    let dir = TempDir::new().unwrap();
    dir.child("_private.sh").write_str("# entrypoint\n").unwrap();
    dir.child("worker.sh").write_str("# entrypoint\n").unwrap();

    let entrypoint = resolver(EntrypointFallback::Placeholder).resolve(dir.path())?;

    assert_eq!(entrypoint, dir.path().join("worker.sh"));
    Ok(())
}

#[test]
fn test_placeholder_is_synthesized() -> Result<()> {
    let dir = TempDir::new().unwrap();
    dir.child("helper.sh").write_str("echo no marker\n").unwrap();

    let entrypoint = resolver(EntrypointFallback::Placeholder).resolve(dir.path())?;

    assert_eq!(entrypoint, dir.path().join("placeholder.sh"));
    assert_eq!(
        std::fs::read_to_string(&entrypoint).unwrap(),
        shell_runtime().placeholder_source
    );
    Ok(())
}

#[test]
fn test_existing_placeholder_is_kept() -> Result<()> {
    let dir = TempDir::new().unwrap();
    dir.child("placeholder.sh").write_str("echo customised\n").unwrap();

    let entrypoint = resolver(EntrypointFallback::Placeholder).resolve(dir.path())?;

    assert_eq!(
        std::fs::read_to_string(entrypoint).unwrap(),
        "echo customised\n"
    );
    Ok(())
}

#[test]
fn test_fail_fallback_reports_missing_entrypoint() {
    let dir = TempDir::new().unwrap();

    let result = resolver(EntrypointFallback::Fail).resolve(dir.path());

    assert!(matches!(result, Err(Error::NoEntrypoint(_))));
    assert!(!dir.path().join("placeholder.sh").exists());
}
