use sessionkeep::session::{SessionService, SessionStore};
use sessionkeep::storage::{KeyValueStore, MemoryTable, SledTable, SqliteTable};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

#[allow(dead_code)]
pub fn create_temp_sled() -> (Arc<SledTable>, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let table = SledTable::new(tmp.path().join("sessions.sled")).expect("failed to open sled table");
    (Arc::new(table), tmp)
}

#[allow(dead_code)]
pub fn create_temp_service() -> (SessionService, TempDir) {
    let (table, tmp) = create_temp_sled();
    let service = SessionService::new(Arc::new(SessionStore::new(table)));
    (service, tmp)
}

/// One instance of every backend, labelled for assertion messages
///
/// The returned directory keeps the on-disk backends alive.
#[allow(dead_code)]
pub fn all_backends() -> (Vec<(&'static str, Arc<dyn KeyValueStore>)>, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let sled = SledTable::new(tmp.path().join("sessions.sled")).expect("failed to open sled table");
    let sqlite =
        SqliteTable::new_with_path(tmp.path().join("sessions.db")).expect("failed to open sqlite");
    let backends: Vec<(&'static str, Arc<dyn KeyValueStore>)> = vec![
        ("memory", Arc::new(MemoryTable::new())),
        ("sled", Arc::new(sled)),
        ("sqlite", Arc::new(sqlite)),
    ];
    (backends, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("failed to write file");
    path
}
