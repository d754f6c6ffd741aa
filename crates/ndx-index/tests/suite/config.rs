use std::path::PathBuf;

use ndx_index::{IndexConfig, JavaIndex, DEFAULT_FILE_NAME};

#[test]
fn index_opens_where_the_config_points() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("ndx.toml");
    let index_dir = dir.path().join("index");
    std::fs::write(
        &config_path,
        format!(
            "index_dir = {:?}\nflush_on_index = false\n",
            index_dir.to_str().unwrap()
        ),
    )
    .unwrap();

    let config = IndexConfig::load(&config_path).unwrap();
    assert_eq!(config.database_path().unwrap(), index_dir.join(DEFAULT_FILE_NAME));

    let index = JavaIndex::open(&config).unwrap();
    let store = index_dir.join(DEFAULT_FILE_NAME);
    assert!(store.exists());
    assert_eq!(
        index.database().path().canonicalize().unwrap(),
        store.canonicalize().unwrap()
    );

    // A second open in the same process shares the store.
    let again = JavaIndex::open(&config).unwrap();
    assert!(std::sync::Arc::ptr_eq(index.database(), again.database()));
}

#[test]
fn defaults_round_trip_through_toml() {
    let config = IndexConfig {
        index_dir: Some(PathBuf::from("/var/cache/ndx")),
        ..IndexConfig::default()
    };
    let text = toml::to_string(&config).unwrap();
    let parsed: IndexConfig = toml::from_str(&text).unwrap();
    assert_eq!(parsed, config);
}
