use dupestash::config::{Config, ConfigError, RunPaths};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_config_defaults_extract() {
    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .extract()
        .unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_config_from_env() {
    std::env::set_var("DUPESTASH_TEST_HASH_THREADS", "6");
    std::env::set_var("DUPESTASH_TEST_DUPLICATES_SUFFIX", ".copies");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("DUPESTASH_TEST_"))
        .extract()
        .unwrap();

    assert_eq!(config.hash_threads, 6);
    assert_eq!(config.duplicates_suffix, ".copies");

    std::env::remove_var("DUPESTASH_TEST_HASH_THREADS");
    std::env::remove_var("DUPESTASH_TEST_DUPLICATES_SUFFIX");
}

#[test]
fn test_config_file_layer() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("config.toml");
    fs::write(
        &file,
        "hash_threads = 2\nchunk_size = 1048576\nfollow_symlinks = true\n",
    )
    .unwrap();

    let config = Config::load_from(&file, &figment::value::Dict::new()).unwrap();

    assert_eq!(config.hash_threads, 2);
    assert_eq!(config.chunk_size, 1_048_576);
    assert!(config.follow_symlinks);
    assert!(!config.skip_hidden);
}

#[test]
fn test_config_unknown_keys_ignored() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("config.toml");
    fs::write(&file, "theme = \"dark\"\nskip_hidden = true\n").unwrap();

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&file))
        .extract()
        .unwrap();

    assert!(config.skip_hidden);
}

#[test]
fn test_run_paths_from_relative_target() {
    let dir = tempdir().unwrap();
    let target = dir.path().join("music");
    fs::create_dir(&target).unwrap();
    let dotted = target.join(".");

    let paths = RunPaths::derive(&dotted, None, "_duplicates").unwrap();

    assert_eq!(paths.name, "music");
    assert_eq!(paths.duplicates_root.file_name().unwrap(), "music_duplicates");
    assert_eq!(paths.index_path.parent(), paths.scan_root.parent());
}

#[test]
fn test_run_paths_error_kinds() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("plain.txt");
    fs::write(&file, "x").unwrap();

    let missing = RunPaths::derive(&dir.path().join("missing"), None, "_d").unwrap_err();
    let not_dir = RunPaths::derive(&file, None, "_d").unwrap_err();

    assert!(matches!(missing, ConfigError::NotFound(_)));
    assert!(matches!(not_dir, ConfigError::NotADirectory(_)));
    assert!(missing.to_string().contains("missing"));
}
