//! Offline path through the deterministic core: salvage a tool payload,
//! resolve its path against a snapshot, commit it with a backup.

use std::fs;
use std::path::PathBuf;

use coordination::salvage::{salvage, RecordShape, ToolPayload};
use coordination::{
    CommitWriter, LineEnding, ParseTier, PathResolver, ProjectSnapshot, ResolutionPolicy,
    SnapshotLoader,
};

// ── Salvage → resolve → commit ─────────────────────────────────────

#[test]
fn escaped_brace_payload_lands_on_resolved_path_with_backup() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("Assets/Scripts")).unwrap();
    fs::write(dir.path().join("Assets/Scripts/Foo.cs"), "old").unwrap();

    let snapshot = SnapshotLoader::new(dir.path())
        .load(&[PathBuf::from("Assets")])
        .unwrap();

    let raw = r#"{"FilePath": "foo.cs", "Content": "class Foo \{\n\}\n"}"#;
    let resp = salvage(&ToolPayload::from_raw(raw), RecordShape::FileContent);
    assert_eq!(ParseTier::from_name(&resp.served_by), Some(ParseTier::BraceEscape));
    let artifact = resp.payload.unwrap().remove(0).into_artifact();
    assert_eq!(artifact.content, "class Foo {\n}\n");

    let resolution = PathResolver::new(&snapshot, ResolutionPolicy::Closest)
        .resolve(&artifact.file_path)
        .unwrap();
    assert_eq!(resolution.path(), "Assets/Scripts/Foo.cs");

    let writer = CommitWriter::new(dir.path(), ".codesmith/backups", LineEnding::Lf);
    let receipt = writer
        .commit(&artifact.with_path(resolution.path()))
        .unwrap();

    let backup = receipt.backup.unwrap();
    assert_eq!(fs::read_to_string(backup.backup_path).unwrap(), "old");
    assert_eq!(
        fs::read_to_string(dir.path().join("Assets/Scripts/Foo.cs")).unwrap(),
        "class Foo {\n}\n"
    );
}

#[test]
fn strict_tier_short_circuits_for_well_formed_payloads() {
    let raw = r#"[{"FilePath": "a.rs", "Content": "fn a() {}"}, {"FilePath": "b.rs", "Content": "fn b() {}"}]"#;
    let resp = salvage(&ToolPayload::from_raw(raw), RecordShape::FileContent);
    assert!(resp.is_full());
    assert!(resp.warnings.is_empty());
    assert_eq!(resp.payload.unwrap().len(), 2);
}

// ── Resolution fall-through ────────────────────────────────────────

#[test]
fn creates_sharing_a_basename_resolve_independently() {
    let snapshot = ProjectSnapshot::from_entries([
        ("src/game/Util.cs", "g"),
        ("src/editor/Util.cs", "e"),
    ]);
    let resolver = PathResolver::new(&snapshot, ResolutionPolicy::Closest);

    assert_eq!(resolver.resolve("game/Util.cs").unwrap().path(), "src/game/Util.cs");
    assert_eq!(resolver.resolve("editor/Util.cs").unwrap().path(), "src/editor/Util.cs");
    let fresh = resolver.resolve("tools/Helper.cs").unwrap();
    assert!(!fresh.is_known());
    assert_eq!(fresh.path(), "tools/Helper.cs");
}
