use contrail_core::{ArtifactStatus, Config, DiagnosticCode, Severity};
use contrail_engine::{GenerationError, Generator};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;

fn write(root: &Path, relative: &str, body: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

const OS_BLUEPRINT: &str = r#"
selector:
  roles:
    - name: os
      match: { type: sw.os }
    - name: device
      match: { type: hw.device-type }
  constraints:
    - { requires: device, provided_by: os, capability: arch.sw }
output:
  filename: "{{os.slug}}-{{device.slug}}.json"
  path: "{{ device.slug }}"
  fields:
    imageName: "{{ os.slug }}-{{ device.slug }}"
  template:
    - data: |
        {
          "name": "{{ device.name }}",
          "os": "{{ os.slug }}",
          "version": "{{ os.version }}",
          "instructions": "{{ file(device.type ~ '/' ~ device.slug ~ '/instructions.txt') | trim }}"
        }
"#;

const ALPINE_BLUEPRINT: &str = r#"
selector:
  roles:
    - name: os
      match: { all: [ { type: sw.os }, { slug: alpine } ] }
output:
  filename: contract.json
  template: "{{ os.slug }}"
"#;

fn project(root: &Path) -> Config {
    write(
        root,
        "contracts/sw.os/balenaos/contract.json",
        r#"{"type":"sw.os","slug":"balenaos","version":"2.100.0","name":"balenaOS","provides":[{"type":"arch.sw","slug":"armv7hf"}]}"#,
    );
    write(root, "contracts/sw.os/alpine/contract.json", r#"{"type":"sw.os","slug":"alpine"}"#);
    write(
        root,
        "contracts/hw.device-type/raspberrypi3/contract.yaml",
        "type: hw.device-type\nslug: raspberrypi3\nname: Raspberry Pi 3\nrequires:\n  - type: arch.sw\n    slug: armv7hf\n",
    );
    write(
        root,
        "contracts/hw.device-type/raspberrypi3/instructions.txt",
        "Write the image to an SD card.\n",
    );
    write(
        root,
        "contracts/hw.device-type/intel-nuc/contract.json",
        r#"{"type":"hw.device-type","slug":"intel-nuc","requires":[{"type":"arch.sw","slug":"amd64"}]}"#,
    );
    write(root, "blueprints/os-contracts.yaml", OS_BLUEPRINT);
    write(root, "blueprints/alpine.yaml", ALPINE_BLUEPRINT);
    write(
        root,
        "contrail.toml",
        r#"
destination = "build/contracts"

[sources]
primary = "contracts"
overlay = "private-contracts"

[[targets]]
name = "os-contracts"
blueprint = "blueprints/os-contracts.yaml"

[[targets]]
name = "alpine"
blueprint = "blueprints/alpine.yaml"
"#,
    );
    Config::from_file(&root.join("contrail.toml")).unwrap()
}

#[test]
fn compatible_pair_generates_one_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let config = project(dir.path());

    let report = Generator::new(config).run().unwrap();

    let target = report.target("os-contracts").unwrap();
    assert_eq!(target.matched, 1);
    assert_eq!(target.skipped, 0);
    assert_eq!(target.artifacts.len(), 1);
    assert_eq!(target.artifacts[0].label, "balenaos-raspberrypi3");
    assert_eq!(target.artifacts[0].path, "raspberrypi3/balenaos-raspberrypi3.json");
    assert_eq!(target.artifacts[0].status, ArtifactStatus::Written);

    let written = fs::read_to_string(
        dir.path().join("build/contracts/raspberrypi3/balenaos-raspberrypi3.json"),
    )
    .unwrap();
    let json: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(json["name"], "Raspberry Pi 3");
    assert_eq!(json["version"], "2.100.0");
    assert_eq!(json["instructions"], "Write the image to an SD card.");
}

#[test]
fn denylisted_os_yields_zero_match() {
    let dir = tempfile::tempdir().unwrap();
    let config = project(dir.path());

    let report = Generator::new(config).run().unwrap();

    let alpine = report.target("alpine").unwrap();
    assert_eq!(alpine.matched, 0);
    assert!(alpine.artifacts.is_empty());
    assert_eq!(report.summary.denylisted, 1);
    assert!(report
        .diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::QueryZeroMatch && d.target.as_deref() == Some("alpine")));
    assert!(!report.has_errors());
}

#[test]
fn second_run_is_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let config = project(dir.path());

    let first = Generator::new(config.clone()).run().unwrap();
    let second = Generator::new(config).run().unwrap();

    assert!(second
        .diagnostics
        .iter()
        .any(|d| d.code == DiagnosticCode::ArtifactUnchanged && d.severity == Severity::Info));

    let first = &first.target("os-contracts").unwrap().artifacts[0];
    let second = &second.target("os-contracts").unwrap().artifacts[0];
    assert_eq!(second.status, ArtifactStatus::Unchanged);
    assert_eq!(first.sha256, second.sha256);
}

#[test]
fn dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = project(dir.path());

    let report = Generator::new(config).dry_run(true).run().unwrap();
    assert_eq!(report.target("os-contracts").unwrap().count(ArtifactStatus::Planned), 1);
    assert!(!dir.path().join("build").exists());
}

#[test]
fn unresolved_reference_skips_context_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    let config = project(dir.path());
    write(
        dir.path(),
        "blueprints/os-contracts.yaml",
        &OS_BLUEPRINT.replace("{{ device.name }}", "{{ device.data.cpu }}"),
    );

    let report = Generator::new(config).run().unwrap();
    let target = report.target("os-contracts").unwrap();
    assert_eq!(target.skipped, 1);
    assert!(target.artifacts.is_empty());
    assert!(report.has_skipped());

    let warning = report
        .diagnostics
        .iter()
        .find(|d| d.code == DiagnosticCode::TemplateUnresolvedReference)
        .unwrap();
    assert_eq!(warning.severity, Severity::Warn);
    assert_eq!(warning.subject.as_deref(), Some("balenaos-raspberrypi3"));
}

#[test]
fn missing_blueprint_is_fatal_before_generation() {
    let dir = tempfile::tempdir().unwrap();
    let config = project(dir.path());
    fs::remove_file(dir.path().join("blueprints/alpine.yaml")).unwrap();

    let err = Generator::new(config).run().unwrap_err();
    let diag = err.to_diagnostic();
    assert_eq!(diag.severity, Severity::Error);
    assert_eq!(diag.code, DiagnosticCode::ConfigInvalid);
    assert_eq!(diag.target.as_deref(), Some("alpine"));
    assert!(diag.file.as_deref().is_some_and(|f| f.ends_with("alpine.yaml")));
    match err {
        GenerationError::MissingBlueprint { target, .. } => assert_eq!(target, "alpine"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dir.path().join("build").exists());
}

#[test]
fn overlay_conflict_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = project(dir.path());
    write(
        dir.path(),
        "private-contracts/sw.os/balenaos/contract.json",
        r#"{"type":"sw.os","slug":"balenaos","version":"2.100.0"}"#,
    );

    let err = Generator::new(config).run().unwrap_err();
    assert!(matches!(err, GenerationError::Load(ref e) if e.is_graph_integrity()));
    assert_eq!(err.to_diagnostic().code, DiagnosticCode::GraphDuplicateContract);
}

#[test]
fn query_lists_contexts_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let config = project(dir.path());

    let plan = Generator::new(config).prepare().unwrap();
    let result = plan.query("os-contracts").unwrap();
    let labels: Vec<&str> = result.contexts.iter().map(|c| c.label()).collect();
    assert_eq!(labels, vec!["balenaos-raspberrypi3"]);
    assert!(plan.query("nope").is_err());
    assert!(!dir.path().join("build").exists());
}
