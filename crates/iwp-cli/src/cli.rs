//! CLI command definitions and argument parsing

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use iwp_package::{
    extract_payload, read_portal_package, write_portal_package, AppDescriptor, AppIcon, ContentPackage,
    MsiToolsProvider, PackageAssembler, PackageError,
};
use iwp_publish::{AzureBlobConnector, GraphBackend, PublishingOrchestrator};

use crate::config::Config;
use crate::output::{OutputFormat, OutputFormatter, PackageSummary, PublishSummary};
use crate::ExitCode;

/// iwp - package and publish Win32 apps
#[derive(Parser, Debug)]
#[command(name = "iwp")]
#[command(version, about = "Package and publish Win32 apps as .intunewin content")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format: table, json, quiet
    #[arg(long, default_value = "table", global = true)]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Graph base URL, overriding the config file
    #[arg(long, global = true)]
    pub graph_url: Option<String>,
}

impl Cli {
    /// Execute the command with a resolved configuration
    pub async fn execute_with_config(self, config: Config) -> anyhow::Result<ExitCode> {
        let formatter = OutputFormatter::new(self.format, self.verbose);
        match self.command {
            Commands::Package(args) => args.execute(&formatter),
            Commands::Publish(args) => args.execute(&formatter, &config).await,
            Commands::Extract(args) => args.execute(&formatter),
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Package an installer or directory into a portal package
    Package(PackageArgs),
    /// Publish a package, creating or updating the app
    Publish(PublishArgs),
    /// Verify a portal package and extract its payload
    Extract(ExtractArgs),
}

/// Arguments for the package command
#[derive(Parser, Debug)]
pub struct PackageArgs {
    /// Installer file or directory to package
    pub source: PathBuf,

    /// Setup file inside a source directory
    #[arg(long)]
    pub setup_file: Option<PathBuf>,

    /// Directory the portal package is written to
    #[arg(long, short = 'o')]
    pub output: PathBuf,
}

impl PackageArgs {
    pub fn execute(self, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
        formatter.progress(&format!("Packaging {}...", self.source.display()));

        let result = assemble(&self.source, self.setup_file.as_deref())
            .and_then(|mut package| write_portal_package(&mut package, &self.output).map(|path| (package, path)));
        let (package, path) = match result {
            Ok(done) => done,
            Err(e) => return Ok(package_failure(formatter, &e)),
        };

        info!(path = %path.display(), "Portal package written");
        if let Some(text) = formatter.format_package(&PackageSummary::new(&package, Some(&path))) {
            println!("{text}");
        }
        Ok(ExitCode::Success)
    }
}

/// Arguments for the publish command
#[derive(Parser, Debug)]
pub struct PublishArgs {
    /// Installer file, directory, or pre-built .intunewin portal package
    pub source: PathBuf,

    /// Setup file inside a source directory
    #[arg(long)]
    pub setup_file: Option<PathBuf>,

    /// Update this existing app instead of creating a new one
    #[arg(long)]
    pub app_id: Option<String>,

    #[arg(long)]
    pub display_name: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub publisher: Option<String>,

    #[arg(long)]
    pub display_version: Option<String>,

    /// Install command line (Win32 apps) or extra msiexec arguments (MSI apps)
    #[arg(long)]
    pub install_command: Option<String>,

    /// Uninstall command line (Win32 apps only)
    #[arg(long)]
    pub uninstall_command: Option<String>,

    /// PNG or JPEG icon shown in the company portal
    #[arg(long)]
    pub icon: Option<PathBuf>,
}

impl PublishArgs {
    pub async fn execute(self, formatter: &OutputFormatter, config: &Config) -> anyhow::Result<ExitCode> {
        let Ok(token) = std::env::var(&config.graph.token_env) else {
            formatter.error(&format!(
                "No Graph token: set the {} environment variable",
                config.graph.token_env
            ));
            return Ok(ExitCode::AuthenticationFailed);
        };

        let mut package = match load_package(&self.source, self.setup_file.as_deref()) {
            Ok(package) => package,
            Err(e) => return Ok(package_failure(formatter, &e)),
        };
        self.apply_overrides(package.app_mut())?;

        let backend = GraphBackend::new(&config.graph.base_url, token, config.http_timeout())
            .context("Failed to create Graph client")?;
        let blobs = AzureBlobConnector::new(config.http_timeout()).context("Failed to create blob client")?;
        let orchestrator = PublishingOrchestrator::new(Arc::new(backend), Arc::new(blobs))
            .with_upload_config(config.upload_config())
            .with_poll_policy(config.poll_policy());

        formatter.progress(&format!("Publishing {}...", package.app().display_name()));
        let result = match &self.app_id {
            Some(app_id) => orchestrator.update(app_id, package).await,
            None => orchestrator.publish(package).await,
        };

        match result {
            Ok(app) => {
                if let Some(text) = formatter.format_publish(&PublishSummary::from(&app)) {
                    println!("{text}");
                }
                Ok(ExitCode::Success)
            }
            Err(e) => {
                formatter.error(&e.to_string());
                Ok(ExitCode::from(&e))
            }
        }
    }

    /// Copy user-supplied descriptor fields onto `app`.
    pub fn apply_overrides(&self, app: &mut AppDescriptor) -> anyhow::Result<()> {
        let icon = self.icon.as_deref().map(load_icon).transpose()?;

        match app {
            AppDescriptor::Win32App(win32) => {
                if let Some(name) = &self.display_name {
                    win32.display_name = name.clone();
                }
                override_opt(&mut win32.description, &self.description);
                override_opt(&mut win32.publisher, &self.publisher);
                override_opt(&mut win32.display_version, &self.display_version);
                override_opt(&mut win32.install_command_line, &self.install_command);
                override_opt(&mut win32.uninstall_command_line, &self.uninstall_command);
                if icon.is_some() {
                    win32.large_icon = icon;
                }
            }
            AppDescriptor::MobileInstallerApp(msi) => {
                if let Some(name) = &self.display_name {
                    msi.display_name = name.clone();
                }
                override_opt(&mut msi.description, &self.description);
                override_opt(&mut msi.publisher, &self.publisher);
                override_opt(&mut msi.display_version, &self.display_version);
                override_opt(&mut msi.command_line, &self.install_command);
                if self.uninstall_command.is_some() {
                    warn!("Ignoring --uninstall-command for an MSI app");
                }
                if icon.is_some() {
                    msi.large_icon = icon;
                }
            }
        }
        Ok(())
    }
}

/// Arguments for the extract command
#[derive(Parser, Debug)]
pub struct ExtractArgs {
    /// Portal package to extract
    pub package: PathBuf,

    /// Directory the payload is written to
    #[arg(long, short = 'o')]
    pub output: PathBuf,
}

impl ExtractArgs {
    pub fn execute(self, formatter: &OutputFormatter) -> anyhow::Result<ExitCode> {
        formatter.progress(&format!("Extracting {}...", self.package.display()));

        let result = read_portal_package(&self.package)
            .and_then(|mut package| extract_payload(&mut package, &self.output));
        match result {
            Ok(path) => {
                if let Some(text) = formatter.format_extracted(&path) {
                    println!("{text}");
                }
                Ok(ExitCode::Success)
            }
            Err(e) => Ok(package_failure(formatter, &e)),
        }
    }
}

fn assemble(source: &Path, setup_file: Option<&Path>) -> Result<ContentPackage, PackageError> {
    PackageAssembler::new(Arc::new(MsiToolsProvider::default())).assemble(source, setup_file)
}

/// Portal packages are loaded as is; anything else is assembled.
pub fn load_package(source: &Path, setup_file: Option<&Path>) -> Result<ContentPackage, PackageError> {
    if source.is_file() && is_portal_package(source) {
        if setup_file.is_some() {
            warn!("Ignoring --setup-file for a pre-built portal package");
        }
        return read_portal_package(source);
    }
    assemble(source, setup_file)
}

fn is_portal_package(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(iwp_package::portal::PORTAL_EXTENSION))
}

fn load_icon(path: &Path) -> anyhow::Result<AppIcon> {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let mime_type = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => bail!("Unsupported icon format: {}", path.display()),
    };
    let data = std::fs::read(path).with_context(|| format!("Failed to read icon {}", path.display()))?;
    Ok(AppIcon {
        mime_type: mime_type.to_string(),
        data,
    })
}

fn override_opt(field: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value {
        *field = Some(value.clone());
    }
}

fn package_failure(formatter: &OutputFormatter, err: &PackageError) -> ExitCode {
    formatter.error(&err.to_string());
    ExitCode::from(err)
}
