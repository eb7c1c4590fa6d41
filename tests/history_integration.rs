//! Integration tests for the file-backed image history.
//!
//! Exercises persistence across store instances, co-existence with other keys
//! in the same file, and recovery from a damaged file.

use snapb64::history::{FileStore, ImageHistory, KeyValueStore, HISTORY_KEY, MAX_HISTORY_SIZE};

fn temp_store() -> (FileStore, std::path::PathBuf) {
    let dir = std::env::temp_dir().join(format!("snapb64_integ_{}", uuid::Uuid::new_v4()));
    let store = FileStore::new(dir.join("history.json"));
    (store, dir)
}

fn cleanup(dir: &std::path::Path) {
    let _ = std::fs::remove_dir_all(dir);
}

fn data_url(i: usize) -> String {
    format!("data:image/jpeg;base64,/9j/{i:04}")
}

/// add → reopen → read back: entries survive a fresh store on the same path.
#[test]
fn test_history_survives_reopen() {
    let (store, dir) = temp_store();
    let path = store.path().to_path_buf();

    let history = ImageHistory::new(store);
    history.add_to_history(&data_url(1));
    history.add_to_history(&data_url(2));

    let reopened = ImageHistory::new(FileStore::new(&path));
    assert_eq!(reopened.get_history(), vec![data_url(2), data_url(1)]);

    cleanup(&dir);
}

/// The parent directory is created lazily on first write.
#[test]
fn test_first_write_creates_directory() {
    let (store, dir) = temp_store();
    assert!(!dir.exists());

    let history = ImageHistory::new(store);
    assert!(history.get_history().is_empty());
    assert!(!dir.exists());

    history.add_to_history(&data_url(1));
    assert!(dir.join("history.json").exists());

    cleanup(&dir);
}

/// Capacity and ordering hold through the file store as well.
#[test]
fn test_capacity_through_file_store() {
    let (store, dir) = temp_store();
    let history = ImageHistory::new(store);

    for i in 0..15 {
        history.add_to_history(&data_url(i));
    }
    history.add_to_history(&data_url(10));

    let entries = history.get_history();
    assert_eq!(entries.len(), MAX_HISTORY_SIZE);
    assert_eq!(entries[0], data_url(10));
    assert_eq!(entries[1], data_url(14));
    assert!(!entries.contains(&data_url(2)));
    assert_eq!(
        entries.iter().filter(|e| **e == data_url(10)).count(),
        1
    );

    cleanup(&dir);
}

/// Clearing removes only the history key.
#[test]
fn test_clear_keeps_other_keys() {
    let (store, dir) = temp_store();
    store.set("theme", "dark").unwrap();

    let history = ImageHistory::new(store);
    history.add_to_history(&data_url(1));
    history.clear_history();

    assert!(history.get_history().is_empty());
    assert_eq!(history.store().get(HISTORY_KEY).unwrap(), None);
    assert_eq!(history.store().get("theme").unwrap().as_deref(), Some("dark"));

    cleanup(&dir);
}

/// A garbled file reads as empty history, and clear/add overwrite it.
#[test]
fn test_damaged_file_recovers() {
    let (store, dir) = temp_store();
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(store.path(), b"{truncated").unwrap();

    let history = ImageHistory::new(store);
    assert!(history.get_history().is_empty());

    history.clear_history();
    assert_eq!(history.store().get(HISTORY_KEY).unwrap(), None);

    history.add_to_history(&data_url(1));
    assert_eq!(history.get_history(), vec![data_url(1)]);

    cleanup(&dir);
}

/// A damaged file is replaced by the first add, without a clear.
#[test]
fn test_add_overwrites_damaged_file() {
    let (store, dir) = temp_store();
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(store.path(), b"\x00\x01 not json").unwrap();

    let history = ImageHistory::new(store);
    history.add_to_history(&data_url(3));
    assert_eq!(history.get_history(), vec![data_url(3)]);

    let raw = std::fs::read_to_string(history.store().path()).unwrap();
    assert!(raw.contains(HISTORY_KEY));

    cleanup(&dir);
}
