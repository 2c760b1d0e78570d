//! Integration tests for the package and extract commands.

use std::fs;

use clap::Parser;
use tempfile::TempDir;

use iwp_cli::cli::{load_package, Commands};
use iwp_cli::{Cli, Config, ExitCode, OutputFormat, OutputFormatter};

async fn run(args: &[&str]) -> ExitCode {
    Cli::try_parse_from(args)
        .unwrap()
        .execute_with_config(Config::default())
        .await
        .unwrap()
}

/// Test: package a directory, then extract the portal package again
#[tokio::test]
async fn integration_package_then_extract() {
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("setup.exe"), b"MZ installer").unwrap();
    fs::write(source.path().join("config.ini"), b"[main]\nkey=value\n").unwrap();
    let out = TempDir::new().unwrap();
    let extracted = TempDir::new().unwrap();

    let src = source.path().to_string_lossy().to_string();
    let out_dir = out.path().to_string_lossy().to_string();
    let code = run(&["iwp", "--format", "quiet", "package", &src, "--output", &out_dir]).await;
    assert_eq!(code, ExitCode::Success);

    let portal = out.path().join("setup.intunewin");
    assert!(portal.is_file());

    let portal_arg = portal.to_string_lossy().to_string();
    let extract_dir = extracted.path().to_string_lossy().to_string();
    let code = run(&["iwp", "--format", "quiet", "extract", &portal_arg, "-o", &extract_dir]).await;
    assert_eq!(code, ExitCode::Success);

    assert_eq!(fs::read(extracted.path().join("setup.exe")).unwrap(), b"MZ installer");
    assert_eq!(
        fs::read(extracted.path().join("config.ini")).unwrap(),
        b"[main]\nkey=value\n"
    );

    let package = load_package(&portal, None).unwrap();
    assert_eq!(package.setup_file(), "setup.exe");
}

/// Test: a missing source maps to the invalid-input exit code
#[tokio::test]
async fn integration_package_missing_source() {
    let out = TempDir::new().unwrap();
    let missing = out.path().join("nope.msi").to_string_lossy().to_string();
    let out_dir = out.path().to_string_lossy().to_string();

    let code = run(&["iwp", "--format", "quiet", "package", &missing, "-o", &out_dir]).await;
    assert_eq!(code, ExitCode::InvalidInput);
}

/// Test: extracting something that is not a portal package fails cleanly
#[tokio::test]
async fn integration_extract_invalid_package() {
    let dir = TempDir::new().unwrap();
    let bogus = dir.path().join("bogus.intunewin");
    fs::write(&bogus, b"not a zip").unwrap();

    let cli = Cli::try_parse_from([
        "iwp",
        "extract",
        bogus.to_str().unwrap(),
        "-o",
        dir.path().to_str().unwrap(),
    ])
    .unwrap();
    let Commands::Extract(args) = cli.command else {
        panic!("expected extract command");
    };

    let code = args.execute(&OutputFormatter::new(OutputFormat::Quiet, false)).unwrap();
    assert_ne!(code, ExitCode::Success);
}

/// Test: publish without a token fails before touching any source
#[tokio::test]
async fn integration_publish_without_token() {
    let mut config = Config::default();
    config.graph.token_env = "IWP_TEST_TOKEN_THAT_IS_NOT_SET".to_string();

    let code = Cli::try_parse_from(["iwp", "--format", "quiet", "publish", "missing.exe"])
        .unwrap()
        .execute_with_config(config)
        .await
        .unwrap();
    assert_eq!(code, ExitCode::AuthenticationFailed);
}
