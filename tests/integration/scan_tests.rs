use dupestash::config::RunPaths;
use dupestash::index::FileIndex;
use dupestash::pipeline::{Pipeline, ScanOptions};
use dupestash::progress::SilentObserver;
use dupestash::scanner::{ScanWarning, WalkerConfig};
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

fn create(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn setup(files: &[(&str, &str)]) -> (TempDir, RunPaths) {
    let dir = tempdir().unwrap();
    let root = dir.path().join("root");
    fs::create_dir(&root).unwrap();
    for (rel, content) in files {
        create(&root, rel, content.as_bytes());
    }
    let paths = RunPaths::derive(&root, None, "_duplicates").unwrap();
    (dir, paths)
}

#[test]
fn test_scan_concrete_scenario() {
    let (_dir, paths) = setup(&[("a/1.txt", "X"), ("a/2.txt", "X"), ("b/3.txt", "Y")]);
    let mut index = FileIndex::open(&paths.index_path).unwrap();

    let summary = Pipeline::new(&paths.scan_root, &paths.duplicates_root)
        .scan(&mut index, &SilentObserver)
        .unwrap();

    assert_eq!(summary.files_indexed, 3);
    assert_eq!(index.record_count().unwrap(), 3);

    let groups = index.duplicate_groups().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);
    assert!(groups[0].members().all(|r| r.fullname != "3.txt"));
    assert_eq!(groups[0].kept.fullname, "1.txt");
}

#[test]
fn test_scan_empty_directory() {
    let (_dir, paths) = setup(&[]);
    let mut index = FileIndex::open(&paths.index_path).unwrap();

    let summary = Pipeline::new(&paths.scan_root, &paths.duplicates_root)
        .scan(&mut index, &SilentObserver)
        .unwrap();

    assert_eq!(summary.files_found, 0);
    assert!(!index.is_populated().unwrap());
}

#[test]
fn test_rescan_reuses_index_until_removed() {
    let (_dir, paths) = setup(&[("1.txt", "same"), ("2.txt", "same")]);
    let pipeline = Pipeline::new(&paths.scan_root, &paths.duplicates_root);

    {
        let mut index = FileIndex::open(&paths.index_path).unwrap();
        pipeline.scan(&mut index, &SilentObserver).unwrap();
        index.close().unwrap();
    }

    create(&paths.scan_root, "3.txt", b"same");

    let mut index = FileIndex::open(&paths.index_path).unwrap();
    assert!(pipeline.scan(&mut index, &SilentObserver).unwrap().skipped);
    assert_eq!(index.record_count().unwrap(), 2);
    index.close().unwrap();

    FileIndex::remove_store(&paths.index_path).unwrap();
    let mut index = FileIndex::open(&paths.index_path).unwrap();
    let summary = pipeline.scan(&mut index, &SilentObserver).unwrap();
    assert!(!summary.skipped);
    assert_eq!(index.record_count().unwrap(), 3);
}

#[test]
fn test_zero_byte_files_form_a_group() {
    let (_dir, paths) = setup(&[("empty1", ""), ("sub/empty2", ""), ("full", "data")]);
    let mut index = FileIndex::open_in_memory().unwrap();

    Pipeline::new(&paths.scan_root, &paths.duplicates_root)
        .scan(&mut index, &SilentObserver)
        .unwrap();

    let groups = index.duplicate_groups().unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].kept.fullname, "empty1");
}

#[test]
fn test_hidden_files_skipped_when_configured() {
    let (_dir, paths) = setup(&[(".hidden/a", "X"), ("b", "X"), (".c", "X")]);
    let options = ScanOptions {
        walker: WalkerConfig::new(false, true),
        ..ScanOptions::default()
    };
    let mut index = FileIndex::open_in_memory().unwrap();

    let summary = Pipeline::new(&paths.scan_root, &paths.duplicates_root)
        .with_options(options)
        .scan(&mut index, &SilentObserver)
        .unwrap();

    assert_eq!(summary.files_indexed, 1);
    assert!(index.duplicate_groups().unwrap().is_empty());
}

#[test]
fn test_parallel_hashing_reports_bytes() {
    let (_dir, paths) = setup(&[("a", "12345"), ("b", "12345"), ("c", "123")]);
    let options = ScanOptions {
        hash_threads: 3,
        chunk_size: 1,
        ..ScanOptions::default()
    };
    let mut index = FileIndex::open_in_memory().unwrap();

    let summary = Pipeline::new(&paths.scan_root, &paths.duplicates_root)
        .with_options(options)
        .scan(&mut index, &SilentObserver)
        .unwrap();

    assert_eq!(summary.bytes_hashed, 13);
    assert_eq!(index.duplicate_groups().unwrap().len(), 1);
}

#[test]
#[cfg(unix)]
fn test_unreadable_subtree_is_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let (_dir, paths) = setup(&[("open/a", "X"), ("locked/b", "X")]);
    let locked = paths.scan_root.join("locked");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_dir(&locked).is_ok() {
        // Permissions are not enforced for this user
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let mut index = FileIndex::open_in_memory().unwrap();
    let summary = Pipeline::new(&paths.scan_root, &paths.duplicates_root)
        .scan(&mut index, &SilentObserver);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    let summary = summary.unwrap();

    assert_eq!(summary.files_indexed, 1);
    assert!(summary
        .warnings
        .iter()
        .any(|w| matches!(w, ScanWarning::Enumeration(_))));
}

#[test]
#[cfg(target_os = "linux")]
fn test_unicode_forms_share_one_record() {
    // Distinct files on Linux, one normalized id
    let (_dir, paths) = setup(&[("caf\u{e9}.txt", "one"), ("cafe\u{301}.txt", "two")]);
    let mut index = FileIndex::open_in_memory().unwrap();

    let summary = Pipeline::new(&paths.scan_root, &paths.duplicates_root)
        .scan(&mut index, &SilentObserver)
        .unwrap();

    assert_eq!(summary.files_found, 2);
    assert_eq!(summary.files_indexed, 1);
    assert_eq!(summary.files_ignored, 1);
    assert_eq!(summary.warnings.len(), 1);
    assert!(matches!(
        &summary.warnings[0],
        ScanWarning::IdCollision(path) if path == &paths.scan_root.join("cafe\u{301}.txt")
    ));
}
