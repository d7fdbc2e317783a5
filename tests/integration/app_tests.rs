use clap::Parser;
use dupestash::cli::Cli;
use dupestash::error::ExitCode;
use dupestash::run_app;
use std::fs;
use tempfile::tempdir;

fn cli(args: &[&str]) -> Cli {
    let mut argv = vec!["dupestash", "--no-progress", "-q"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

#[test]
fn test_run_app_end_to_end() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("docs");
    fs::create_dir_all(root.join("a")).unwrap();
    fs::write(root.join("a/1.txt"), "X").unwrap();
    fs::write(root.join("a/2.txt"), "X").unwrap();
    fs::write(root.join("b.txt"), "Y").unwrap();

    let code = run_app(cli(&[root.to_str().unwrap()])).unwrap();

    assert_eq!(code, ExitCode::Success);
    assert!(dir.path().join("docs.db").exists());
    assert!(dir.path().join("docs_duplicates/a/2.txt").exists());
    assert!(!root.join("a/2.txt").exists());
}

#[test]
fn test_run_app_name_and_fresh() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("docs");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("1"), "same").unwrap();
    fs::write(root.join("2"), "same").unwrap();
    let target = root.to_str().unwrap();

    let code = run_app(cli(&["--dry-run", "-n", "archive", target])).unwrap();
    assert_eq!(code, ExitCode::Success);
    assert!(dir.path().join("archive.db").exists());
    assert!(!dir.path().join("archive_duplicates").exists());

    fs::write(root.join("3"), "same").unwrap();
    let code = run_app(cli(&["--fresh", "-n", "archive", target])).unwrap();
    assert_eq!(code, ExitCode::Success);
    assert!(dir.path().join("archive_duplicates/2").exists());
    assert!(dir.path().join("archive_duplicates/3").exists());
}

#[test]
fn test_run_app_partial_success() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("docs");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("1"), "same").unwrap();
    fs::write(root.join("2"), "same").unwrap();
    fs::create_dir(dir.path().join("docs_duplicates")).unwrap();
    fs::write(dir.path().join("docs_duplicates/2"), "occupied").unwrap();

    let code = run_app(cli(&["--json", root.to_str().unwrap()])).unwrap();

    assert_eq!(code, ExitCode::PartialSuccess);
    assert!(root.join("2").exists());
}

#[test]
fn test_run_app_missing_target_is_config_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope");

    let err = run_app(cli(&[missing.to_str().unwrap()])).unwrap_err();

    assert_eq!(ExitCode::for_error(&err), ExitCode::ConfigError);
}

#[test]
fn test_run_app_explicit_config_file() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("docs");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("1"), "same").unwrap();
    fs::write(root.join("2"), "same").unwrap();
    let config = dir.path().join("dupestash.toml");
    fs::write(&config, "duplicates_suffix = \".copies\"\nhash_threads = 2\n").unwrap();

    let code = run_app(cli(&[
        "--config",
        config.to_str().unwrap(),
        root.to_str().unwrap(),
    ]))
    .unwrap();

    assert_eq!(code, ExitCode::Success);
    assert!(dir.path().join("docs.copies/2").exists());
}

#[test]
fn test_run_app_missing_config_file_is_config_error() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("docs");
    fs::create_dir(&root).unwrap();
    let absent = dir.path().join("absent.toml");

    let err = run_app(cli(&[
        "--config",
        absent.to_str().unwrap(),
        root.to_str().unwrap(),
    ]))
    .unwrap_err();

    assert_eq!(ExitCode::for_error(&err), ExitCode::ConfigError);
    assert!(!dir.path().join("docs.db").exists());
}
