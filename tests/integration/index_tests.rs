use dupestash::index::{FileIndex, FileRecord, IndexError};
use dupestash::scanner::Hasher;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn hashed_records(root: &Path, count: usize) -> Vec<FileRecord> {
    let hasher = Hasher::new();
    (0..count)
        .map(|i| {
            let path = root.join(format!("file_{:02}.bin", i));
            fs::write(&path, format!("content {}", i % 3)).unwrap();
            FileRecord::new(&path, &hasher.full_hash(&path).unwrap()).unwrap()
        })
        .collect()
}

#[test]
fn test_injected_failure_rolls_back_whole_scan() {
    let dir = tempdir().unwrap();
    let records = hashed_records(dir.path(), 10);
    let db = dir.path().join("scan.db");
    let mut index = FileIndex::open(&db).unwrap();

    let result = index.write_scan(|writer| -> Result<(), IndexError> {
        for (i, record) in records.iter().enumerate() {
            if i == 6 {
                return Err(IndexError::Transaction(rusqlite::Error::ExecuteReturnedResults));
            }
            writer.insert(record)?;
        }
        Ok(())
    });

    assert!(matches!(result, Err(IndexError::Transaction(_))));
    assert_eq!(index.record_count().unwrap(), 0);
    index.close().unwrap();

    // Nothing reached the file either
    let reopened = FileIndex::open(&db).unwrap();
    assert!(!reopened.is_populated().unwrap());
}

#[test]
fn test_failed_scan_preserves_previous_records() {
    let dir = tempdir().unwrap();
    let records = hashed_records(dir.path(), 4);
    let mut index = FileIndex::open_in_memory().unwrap();
    index
        .write_scan(|writer| -> Result<(), IndexError> {
            writer.insert(&records[0])?;
            writer.insert(&records[1])?;
            Ok(())
        })
        .unwrap();

    let _ = index.write_scan(|writer| -> Result<(), IndexError> {
        writer.insert(&records[2])?;
        writer.insert(&records[3])?;
        Err(IndexError::Transaction(rusqlite::Error::InvalidQuery))
    });

    assert_eq!(index.record_count().unwrap(), 2);
    assert!(index.get(&records[0].id).unwrap().is_some());
    assert!(index.get(&records[3].id).unwrap().is_none());
}

#[test]
fn test_same_id_is_stored_once() {
    let index = FileIndex::open_in_memory().unwrap();
    let path = PathBuf::from("/data/x.txt");
    let first = FileRecord::new(&path, blake3::hash(b"1").as_bytes()).unwrap();
    let second = FileRecord::new(&path, blake3::hash(b"2").as_bytes()).unwrap();

    assert!(index.insert(&first).unwrap());
    assert!(!index.insert(&second).unwrap());

    assert_eq!(index.record_count().unwrap(), 1);
    assert_eq!(index.get(&first.id).unwrap().unwrap().hash, first.hash);
}

#[test]
fn test_groups_survive_reopen() {
    let dir = tempdir().unwrap();
    let records = hashed_records(dir.path(), 7);
    let db = dir.path().join("scan.db");

    {
        let mut index = FileIndex::open(&db).unwrap();
        index
            .write_scan(|writer| -> Result<(), IndexError> {
                for record in &records {
                    writer.insert(record)?;
                }
                Ok(())
            })
            .unwrap();
        index.close().unwrap();
    }

    let index = FileIndex::open(&db).unwrap();
    let groups = index.duplicate_groups().unwrap();

    // Contents cycle through 3 values: 3 + 2 + 2
    assert_eq!(groups.len(), 3);
    let mut sizes: Vec<_> = groups.iter().map(|g| g.len()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![2, 2, 3]);
    for group in &groups {
        assert!(group.duplicates.iter().all(|d| d.sort_key() > group.kept.sort_key()));
    }
}

#[test]
fn test_stored_record_round_trips() {
    let index = FileIndex::open_in_memory().unwrap();
    let record = FileRecord::new(Path::new("/data/dir/name.ext"), &[7u8; 32]).unwrap();
    index.insert(&record).unwrap();

    let stored = index.get(&record.id).unwrap().unwrap();
    assert_eq!(stored, record);
    assert_eq!(stored.original, None);
    assert!(!stored.uptodate);
}
