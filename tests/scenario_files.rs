//! Loading scenarios from disk and writing reports back out.

use std::fs;

use pktsim::{scenarios, AppKind, ConfigError, RunReport, ScenarioConfig};

const SCENARIO: &str = r#"
simulation:
  stop_time: 20s
  seed: 3

nodes: 3

segments:
  - kind: point_to_point
    nodes: [0, 1]
    data_rate: 5Mbps
    delay: 2ms
    prefix: 10.1.1.0/24
  - kind: shared
    nodes: [1, 2]
    data_rate: 100Mbps
    delay: 6560ns
    prefix: 10.1.2.0/24

applications:
  - type: echo_server
    node: 2
    port: 9
  - type: echo_client
    node: 0
    server: { node: 2, interface: 0 }
    max_packets: 4
    start: 2s
"#;

#[test]
fn test_yaml_file_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.yaml");
    fs::write(&path, SCENARIO).unwrap();

    let config = ScenarioConfig::from_file(&path).unwrap();
    assert_eq!(config.simulation.seed, 3);

    let report = config.run().unwrap();
    assert_eq!(report.total_sent(AppKind::EchoClient), 4);
    assert_eq!(report.total_received(AppKind::EchoClient), 4);
}

#[test]
fn test_json_file_matches_preset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("star.json");
    let preset = scenarios::star(2, 3).unwrap();
    preset.to_json_file(&path).unwrap();

    let loaded = ScenarioConfig::from_file(&path).unwrap();
    assert_eq!(loaded, preset);
    let (a, b) = (loaded.run().unwrap(), preset.run().unwrap());
    assert_eq!(a.apps, b.apps);
    assert_eq!(a.events_processed, b.events_processed);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = ScenarioConfig::from_file(dir.path().join("absent.yaml"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn test_invalid_server_reference() {
    let yaml = SCENARIO.replace("server: { node: 2, interface: 0 }", "server: { node: 2, interface: 3 }");
    let config = ScenarioConfig::from_yaml(&yaml);
    assert!(matches!(config, Err(ConfigError::Validation(_))));
}

#[test]
fn test_report_files() {
    let dir = tempfile::tempdir().unwrap();
    let report = scenarios::star(3, 2).unwrap().run().unwrap();

    let json_path = dir.path().join("report.json");
    report.to_json_file(&json_path).unwrap();
    let parsed: RunReport = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(parsed.apps, report.apps);
    assert_eq!(parsed.events_processed, report.events_processed);

    let csv_path = dir.path().join("apps.csv");
    report.apps_to_csv_file(&csv_path).unwrap();
    let csv = fs::read_to_string(&csv_path).unwrap();
    // Header plus one row per application
    assert_eq!(csv.lines().count(), 1 + 4);
}
