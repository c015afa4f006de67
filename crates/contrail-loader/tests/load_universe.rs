use contrail_core::{ContractKey, ContractPath, Matcher};
use contrail_loader::{load_universe, LoadError};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;

fn write(root: &Path, relative: &str, body: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

fn public_tree(root: &Path) {
    write(
        root,
        "sw.os/balenaos/contract.json",
        r#"{"type":"sw.os","slug":"balenaos","name":"balenaOS"}"#,
    );
    write(
        root,
        "hw.device-type/raspberrypi3/contract.yaml",
        "type: hw.device-type\nslug: raspberrypi3\nname: Raspberry Pi 3\nrequires:\n  - type: arch.sw\n    slug: armv7hf\n",
    );
    write(root, "arch.sw/armv7hf.json", r#"{"type":"arch.sw","slug":"armv7hf"}"#);
}

#[test]
fn primary_only_universe() {
    let dir = tempfile::tempdir().unwrap();
    public_tree(dir.path());

    let universe = load_universe(dir.path(), Some(&dir.path().join("missing-overlay"))).unwrap();
    assert_eq!(universe.len(), 3);

    let os = universe.find_children(&Matcher::create("sw.os", "balenaos"));
    assert_eq!(os.len(), 1);
    assert_eq!(os[0].name(), Some("balenaOS"));
}

#[test]
fn overlay_adds_contracts() {
    let public = tempfile::tempdir().unwrap();
    let private = tempfile::tempdir().unwrap();
    public_tree(public.path());
    write(
        private.path(),
        "hw.device-type/custom-board/contract.json",
        r#"{"type":"hw.device-type","slug":"custom-board"}"#,
    );

    let universe = load_universe(public.path(), Some(private.path())).unwrap();
    assert_eq!(universe.len(), 4);
    let path = ContractPath::root().child(ContractKey::new("hw.device-type", "custom-board"));
    assert!(universe.get(&path).is_some());
}

#[test]
fn overlay_conflict_is_fatal() {
    let public = tempfile::tempdir().unwrap();
    let private = tempfile::tempdir().unwrap();
    public_tree(public.path());
    write(
        private.path(),
        "sw.os/balenaos/contract.json",
        r#"{"type":"sw.os","slug":"balenaos","name":"shadow"}"#,
    );

    let err = load_universe(public.path(), Some(private.path())).unwrap_err();
    assert!(err.is_graph_integrity());
    assert!(err.to_string().contains("sw.os/balenaos"));
}

#[test]
fn missing_primary_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_universe(&dir.path().join("contracts"), None).unwrap_err();
    assert!(matches!(err, LoadError::MissingSource { .. }));
}

#[test]
fn empty_primary_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "README.md", "no contracts here");
    let err = load_universe(dir.path(), None).unwrap_err();
    assert!(matches!(err, LoadError::MissingSource { .. }));
}

#[test]
fn loading_twice_is_identical() {
    let dir = tempfile::tempdir().unwrap();
    public_tree(dir.path());

    let first = load_universe(dir.path(), None).unwrap();
    let second = load_universe(dir.path(), None).unwrap();
    assert_eq!(first, second);

    let keys = |u: &contrail_core::Universe| -> Vec<String> {
        u.contracts().iter().map(|c| c.key().to_string()).collect()
    };
    assert_eq!(keys(&first), keys(&second));
}
