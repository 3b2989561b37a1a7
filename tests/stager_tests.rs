mod common;

use assert_fs::TempDir;
use common::{init_tracing, shell_runtime, zip_bytes};
use server_host::error::{Error, Result};
use server_host::server::{InstallOutcome, LogSink, PackageStager, ServerKey, ServerPaths};
use std::time::Duration;

fn setup() -> (TempDir, ServerPaths, LogSink) {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let key = ServerKey::new("alice", "demo").unwrap();
    let paths = ServerPaths::new(dir.path(), &key);
    std::fs::create_dir_all(paths.dir()).unwrap();
    let log = LogSink::new(paths.log());
    (dir, paths, log)
}

fn stager() -> PackageStager {
    PackageStager::new(shell_runtime(), Duration::from_secs(5))
}

#[tokio::test]
async fn test_archive_is_extracted_and_dependencies_installed() {
    let (_dir, paths, log) = setup();
    let archive = zip_bytes(&[
        ("main.sh", "echo hi\n"),
        ("deps.txt", "left-pad\n"),
        ("pkg/helper.sh", "echo helper\n"),
    ]);
    std::fs::write(paths.archive(), archive).unwrap();

    let report = stager().stage(&paths, &log).await;

    assert_eq!(report.workdir, paths.extracted());
    assert!(report.extracted);
    assert_eq!(report.install, InstallOutcome::Installed);
    assert!(paths.extracted().join("main.sh").is_file());
    assert!(paths.extracted().join("pkg/helper.sh").is_file());
    assert_eq!(
        std::fs::read_to_string(paths.extracted().join("installed.txt")).unwrap(),
        "left-pad\n"
    );

    let content = std::fs::read_to_string(paths.log()).unwrap();
    assert!(content.contains("Found archive"));
    assert!(content.contains("Dependencies installed"));
}

#[tokio::test]
async fn test_archive_is_extracted_at_most_once() {
    let (_dir, paths, log) = setup();
    std::fs::write(paths.archive(), zip_bytes(&[("main.sh", "echo v1\n")])).unwrap();

    let first = stager().stage(&paths, &log).await;
    assert!(first.extracted);

    // Local changes to the extracted tree survive later stagings.
    std::fs::write(paths.extracted().join("main.sh"), "echo edited\n").unwrap();
    let second = stager().stage(&paths, &log).await;

    assert!(!second.extracted);
    assert_eq!(second.install, InstallOutcome::Skipped);
    assert_eq!(
        std::fs::read_to_string(paths.extracted().join("main.sh")).unwrap(),
        "echo edited\n"
    );
}

#[tokio::test]
async fn test_extraction_is_moved_into_place_when_complete() {
    let (_dir, paths, log) = setup();
    let files: Vec<(String, String)> = (0..50)
        .map(|i| (format!("pkg/file_{:02}.sh", i), format!("echo {}\n", i)))
        .collect();
    let entries: Vec<(&str, &str)> = files.iter().map(|(n, c)| (n.as_str(), c.as_str())).collect();
    std::fs::write(paths.archive(), zip_bytes(&entries)).unwrap();

    let report = stager().stage(&paths, &log).await;

    assert!(report.extracted);
    assert_eq!(std::fs::read_dir(paths.extracted().join("pkg")).unwrap().count(), 50);
    let leftovers: Vec<_> = std::fs::read_dir(paths.dir())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(".extracting"))
        .collect();
    assert!(leftovers.is_empty(), "temporary extraction dirs left: {:?}", leftovers);
}

#[tokio::test]
async fn test_corrupt_archive_is_not_fatal() {
    let (_dir, paths, log) = setup();
    std::fs::write(paths.archive(), b"this is not a zip file").unwrap();

    let report = stager().stage(&paths, &log).await;

    assert_eq!(report.workdir, paths.extracted());
    assert!(!report.extracted);
    assert!(paths.extracted().is_dir());
    let content = std::fs::read_to_string(paths.log()).unwrap();
    assert!(content.contains("Error extracting archive"));
}

#[tokio::test]
async fn test_without_archive_server_dir_is_used() {
    let (_dir, paths, log) = setup();
    std::fs::write(paths.dir().join("deps.txt"), "requests\n").unwrap();

    let report = stager().stage(&paths, &log).await;

    assert_eq!(report.workdir, paths.dir());
    assert!(!report.extracted);
    assert_eq!(report.install, InstallOutcome::Installed);
    assert!(paths.dir().join("installed.txt").is_file());
}

#[tokio::test]
async fn test_install_skipped_without_manifest() -> Result<()> {
    let (_dir, paths, _log) = setup();

    let outcome = stager().install_dependencies(paths.dir()).await?;

    assert_eq!(outcome, InstallOutcome::Skipped);
    Ok(())
}

#[tokio::test]
async fn test_install_failure_is_reported() -> Result<()> {
    let (_dir, paths, log) = setup();
    std::fs::write(paths.dir().join("deps.txt"), "x\n").unwrap();
    let mut runtime = shell_runtime();
    runtime.install_command = vec![
        "sh".to_string(),
        "-c".to_string(),
        "echo broken manifest >&2; exit 3".to_string(),
    ];
    let stager = PackageStager::new(runtime, Duration::from_secs(5));

    let outcome = stager.install_dependencies(paths.dir()).await?;
    assert_eq!(
        outcome,
        InstallOutcome::Failed {
            code: Some(3),
            stderr: "broken manifest".to_string(),
        }
    );

    // Staging absorbs the failure.
    let report = stager.stage(&paths, &log).await;
    assert_eq!(report.workdir, paths.dir());
    let content = std::fs::read_to_string(paths.log()).unwrap();
    assert!(content.contains("Dependency installation failed"));
    assert!(content.contains("broken manifest"));
    Ok(())
}

#[tokio::test]
async fn test_install_timeout_is_not_fatal() {
    let (_dir, paths, log) = setup();
    std::fs::write(paths.dir().join("deps.txt"), "x\n").unwrap();
    let mut runtime = shell_runtime();
    runtime.install_command = vec!["sleep".to_string(), "30".to_string()];
    let stager = PackageStager::new(runtime, Duration::from_millis(200));

    let result = stager.install_dependencies(paths.dir()).await;
    assert!(matches!(result, Err(Error::StagingTimeout(_))));

    let started = std::time::Instant::now();
    let report = stager.stage(&paths, &log).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(report.install, InstallOutcome::TimedOut);
    assert_eq!(report.workdir, paths.dir());
    let content = std::fs::read_to_string(paths.log()).unwrap();
    assert!(content.contains("timed out"));
}
