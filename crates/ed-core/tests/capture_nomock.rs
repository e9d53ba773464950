//! Capture against the real host: no mocked commands, real bundle on disk.

use chrono::DateTime;
use ed_bundle::{BundleManager, IncidentManifest, MANIFEST_FILE_NAME};
use ed_core::capture::{
    catalog, CaptureModule, CaptureOrchestrator, TargetOs, ToolRunner, ToolRunnerBuilder,
};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn manager() -> BundleManager {
    BundleManager::new("nomock", "trigger")
}

#[test]
fn host_catalog_produces_consistent_bundle() {
    let dir = TempDir::new().unwrap();
    let manager = manager();
    let mut incident = manager.create_bundle(dir.path(), false).unwrap();

    let orchestrator =
        CaptureOrchestrator::for_os(&manager, TargetOs::detect(), ToolRunner::with_defaults());
    let results = orchestrator.run_all(&mut incident, false);

    let json = fs::read_to_string(incident.path.join(MANIFEST_FILE_NAME)).unwrap();
    let manifest = IncidentManifest::from_json(&json).unwrap();

    let expected: Vec<_> = catalog(TargetOs::detect())
        .into_iter()
        .map(|m| m.name)
        .collect();
    let recorded: Vec<_> = manifest.commands.iter().map(|c| c.name.clone()).collect();
    assert_eq!(recorded, expected);
    assert_eq!(results.len(), expected.len());

    for (entry, result) in manifest.commands.iter().zip(&results) {
        let log = incident.log_file(&entry.name);
        assert!(entry.exit_code == 0 || entry.exit_code == 1);
        assert_eq!(entry.exit_code == 0, result.success, "{}", entry.name);

        if entry.exit_code == 0 {
            // A successful module always has its log, sized as recorded.
            let bytes = fs::metadata(&log).unwrap().len();
            assert_eq!(bytes, entry.output_len, "{}", entry.name);
        } else {
            assert!(!log.exists(), "{} failed but left a log", entry.name);
        }
        let started = DateTime::parse_from_rfc3339(&entry.started_at).unwrap();
        let ended = DateTime::parse_from_rfc3339(&entry.ended_at).unwrap();
        assert!(started <= ended);
    }
}

#[cfg(unix)]
#[test]
fn fallback_scenario_matches_manifest_and_logs() {
    let dir = TempDir::new().unwrap();
    let manager = manager();
    let mut incident = manager.create_bundle(dir.path(), false).unwrap();

    let modules = vec![
        CaptureModule::new("A", "Broken", &["false"]),
        CaptureModule::new("B", "Working", &["echo ok"]),
    ];
    CaptureOrchestrator::new(&manager, modules, ToolRunner::with_defaults())
        .run_all(&mut incident, false);

    let json = fs::read_to_string(incident.path.join(MANIFEST_FILE_NAME)).unwrap();
    let manifest = IncidentManifest::from_json(&json).unwrap();
    let flags: Vec<_> = manifest
        .commands
        .iter()
        .map(|c| (c.name.as_str(), c.exit_code))
        .collect();
    assert_eq!(flags, vec![("A", 1), ("B", 0)]);

    let logs: Vec<_> = fs::read_dir(&incident.logs_path)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(logs, vec!["B.log"]);
    assert_eq!(
        fs::read_to_string(incident.log_file("B")).unwrap(),
        "=== echo ok ===\nok\n"
    );
}

#[cfg(unix)]
#[test]
fn stderr_is_captured_with_stdout() {
    let dir = TempDir::new().unwrap();
    let manager = manager();
    let mut incident = manager.create_bundle(dir.path(), false).unwrap();

    let modules = vec![CaptureModule::new("mixed", "Mixed", &["echo out; echo err >&2"])];
    CaptureOrchestrator::new(&manager, modules, ToolRunner::with_defaults())
        .run_all(&mut incident, false);

    let log = fs::read_to_string(incident.log_file("mixed")).unwrap();
    assert!(log.contains("out\n"));
    assert!(log.contains("err\n"));
}

#[cfg(unix)]
#[test]
fn timeout_turns_hang_into_failure() {
    let dir = TempDir::new().unwrap();
    let manager = manager();
    let mut incident = manager.create_bundle(dir.path(), false).unwrap();

    let runner = ToolRunnerBuilder::new()
        .timeout(Some(Duration::from_millis(300)))
        .build();
    let modules = vec![
        CaptureModule::new("hang", "Hangs", &["sleep 30"]),
        CaptureModule::new("after", "After", &["echo still running"]),
    ];
    let results = CaptureOrchestrator::new(&manager, modules, runner).run_all(&mut incident, false);

    assert!(!results[0].success);
    assert!(results[0].duration < Duration::from_secs(10));
    assert!(results[1].success);
    assert_eq!(incident.commands[0].exit_code, 1);
    assert_eq!(incident.commands[1].exit_code, 0);
}

#[test]
fn empty_catalog_records_every_module_as_failed() {
    let dir = TempDir::new().unwrap();
    let manager = manager();
    let mut incident = manager.create_bundle(dir.path(), false).unwrap();

    let modules: Vec<_> = catalog(TargetOs::detect())
        .into_iter()
        .map(|mut m| {
            m.commands.clear();
            m
        })
        .collect();
    let names: Vec<_> = modules.iter().map(|m| m.name.clone()).collect();

    let results = CaptureOrchestrator::new(&manager, modules, ToolRunner::with_defaults())
        .run_all(&mut incident, false);
    let receipt_path = manager.write_receipt(&incident).unwrap();

    assert!(results.iter().all(|r| !r.success));
    let receipt = fs::read_to_string(receipt_path).unwrap();
    for name in &names {
        assert!(receipt.contains(&format!("|{}|1|0", name)), "{name}");
    }
    assert_eq!(fs::read_dir(&incident.logs_path).unwrap().count(), 0);

    let json = fs::read_to_string(incident.path.join(MANIFEST_FILE_NAME)).unwrap();
    let manifest = IncidentManifest::from_json(&json).unwrap();
    assert!(manifest
        .commands
        .iter()
        .all(|c| c.exit_code == 1 && c.output_len == 0));
}
