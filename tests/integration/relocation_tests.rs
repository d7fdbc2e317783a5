use dupestash::config::RunPaths;
use dupestash::duplicates::RelocationError;
use dupestash::index::FileIndex;
use dupestash::pipeline::Pipeline;
use dupestash::progress::SilentObserver;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

fn create(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn setup(files: &[(&str, &str)]) -> (TempDir, RunPaths) {
    let dir = tempdir().unwrap();
    let root = dir.path().join("photos");
    fs::create_dir(&root).unwrap();
    for (rel, content) in files {
        create(&root, rel, content);
    }
    let paths = RunPaths::derive(&root, None, "_duplicates").unwrap();
    (dir, paths)
}

#[test]
fn test_concrete_scenario_relocates_one_copy() {
    let (_dir, paths) = setup(&[("a/1.txt", "X"), ("a/2.txt", "X"), ("b/3.txt", "Y")]);
    let mut index = FileIndex::open(&paths.index_path).unwrap();

    let outcome = Pipeline::new(&paths.scan_root, &paths.duplicates_root)
        .run(&mut index, &SilentObserver)
        .unwrap();

    let root = &paths.scan_root;
    let dupes = &paths.duplicates_root;
    assert!(root.join("a/1.txt").exists());
    assert!(!root.join("a/2.txt").exists());
    assert_eq!(fs::read_to_string(dupes.join("a/2.txt")).unwrap(), "X");
    assert!(root.join("b/3.txt").exists());
    assert!(!dupes.join("b").exists());

    let map = outcome.report.kept_map();
    assert_eq!(map.len(), 1);
    assert_eq!(map[&root.join("a/1.txt")], vec![dupes.join("a/2.txt")]);
}

#[test]
fn test_group_of_three_round_trip() {
    let (_dir, paths) = setup(&[
        ("keep/me.jpg", "pixels"),
        ("x/y/z/copy.jpg", "pixels"),
        ("zz.jpg", "pixels"),
    ]);
    let mut index = FileIndex::open_in_memory().unwrap();

    let outcome = Pipeline::new(&paths.scan_root, &paths.duplicates_root)
        .run(&mut index, &SilentObserver)
        .unwrap();

    assert!(outcome.report.is_complete());
    assert!(paths.scan_root.join("keep/me.jpg").exists());
    for rel in ["x/y/z/copy.jpg", "zz.jpg"] {
        assert!(!paths.scan_root.join(rel).exists(), "{} still in place", rel);
        assert!(paths.duplicates_root.join(rel).exists(), "{} not relocated", rel);
    }
}

#[test]
fn test_occupied_target_is_isolated() {
    let (_dir, paths) = setup(&[
        ("a/1", "first"),
        ("a/2", "first"),
        ("b/1", "second"),
        ("b/2", "second"),
        ("b/3", "second"),
    ]);
    create(&paths.duplicates_root, "b/2", "unrelated");
    let mut index = FileIndex::open_in_memory().unwrap();

    let outcome = Pipeline::new(&paths.scan_root, &paths.duplicates_root)
        .run(&mut index, &SilentObserver)
        .unwrap();

    let report = &outcome.report;
    assert_eq!(report.failure_count(), 1);
    assert!(matches!(
        &report.failures[0],
        RelocationError::TargetExists { target, .. } if target == &paths.duplicates_root.join("b/2")
    ));
    assert_eq!(report.moved_count(), 2);
    assert!(paths.duplicates_root.join("a/2").exists());
    assert!(paths.duplicates_root.join("b/3").exists());
    assert!(paths.scan_root.join("b/2").exists());
    assert_eq!(
        fs::read_to_string(paths.duplicates_root.join("b/2")).unwrap(),
        "unrelated"
    );
    assert!(outcome.has_warnings());
}

#[test]
fn test_dry_run_moves_nothing() {
    let (_dir, paths) = setup(&[("1", "same"), ("2", "same")]);
    let mut index = FileIndex::open_in_memory().unwrap();

    let outcome = Pipeline::new(&paths.scan_root, &paths.duplicates_root)
        .with_dry_run(true)
        .run(&mut index, &SilentObserver)
        .unwrap();

    assert_eq!(outcome.report.moved_count(), 1);
    assert!(paths.scan_root.join("2").exists());
    assert!(!paths.duplicates_root.exists());
}

#[test]
fn test_second_run_reuses_index_and_reports_same_mapping() {
    let (_dir, paths) = setup(&[("1", "same"), ("2", "same"), ("3", "other")]);
    let pipeline = Pipeline::new(&paths.scan_root, &paths.duplicates_root);

    let first = {
        let mut index = FileIndex::open(&paths.index_path).unwrap();
        let outcome = pipeline.run(&mut index, &SilentObserver).unwrap();
        index.close().unwrap();
        outcome
    };

    let mut index = FileIndex::open(&paths.index_path).unwrap();
    let second = pipeline.run(&mut index, &SilentObserver).unwrap();

    assert!(second.scan.skipped);
    assert!(second.report.is_complete());
    assert_eq!(first.report.kept_map(), second.report.kept_map());
}
