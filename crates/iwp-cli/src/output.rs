//! Output formatting for CLI results
//!
//! - Table: human-readable tables (default)
//! - JSON: structured JSON for scripting
//! - Quiet: exit codes only

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;

use iwp_package::ContentPackage;
use iwp_publish::RemoteApp;

/// Output format options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Quiet,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "quiet" => Ok(Self::Quiet),
            _ => Err(format!("Unknown output format: {s}")),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Json => write!(f, "json"),
            Self::Quiet => write!(f, "quiet"),
        }
    }
}

/// What a package command produced
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PackageSummary {
    pub kind: String,
    pub display_name: String,
    pub display_version: Option<String>,
    pub setup_file: String,
    pub file_name: String,
    pub cleartext_size: u64,
    pub encrypted_size: u64,
    pub has_manifest: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl PackageSummary {
    pub fn new(package: &ContentPackage, output: Option<&Path>) -> Self {
        let app = package.app();
        Self {
            kind: app.kind().to_string(),
            display_name: app.display_name().to_string(),
            display_version: app.display_version().map(str::to_string),
            setup_file: package.setup_file().to_string(),
            file_name: app.file_name().to_string(),
            cleartext_size: package.cleartext_size(),
            encrypted_size: package.encrypted_size(),
            has_manifest: package.installer_manifest().is_some(),
            output: output.map(|p| p.display().to_string()),
        }
    }
}

/// Result of a publish or update
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PublishSummary {
    pub app_id: String,
    pub kind: String,
    pub display_name: String,
    pub committed_content_version: Option<String>,
}

impl From<&RemoteApp> for PublishSummary {
    fn from(app: &RemoteApp) -> Self {
        Self {
            app_id: app.id.clone(),
            kind: app.kind.to_string(),
            display_name: app.display_name.clone(),
            committed_content_version: app.committed_content_version.clone(),
        }
    }
}

/// Standard JSON response wrapper
#[derive(Serialize)]
struct JsonResponse<'a, T: Serialize> {
    success: bool,
    data: Option<&'a T>,
    error: Option<&'a str>,
}

/// Formats results for the selected output format
pub struct OutputFormatter {
    format: OutputFormat,
    verbose: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, verbose: bool) -> Self {
        Self { format, verbose }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Progress line on stderr, table mode with --verbose only
    pub fn progress(&self, message: &str) {
        if self.verbose && self.format == OutputFormat::Table {
            eprintln!("{message}");
        }
    }

    pub fn error(&self, message: &str) {
        match self.format {
            OutputFormat::Json => println!("{}", json::<()>(None, Some(message))),
            OutputFormat::Table => eprintln!("Error: {message}"),
            OutputFormat::Quiet => {}
        }
    }

    pub fn format_package(&self, summary: &PackageSummary) -> Option<String> {
        match self.format {
            OutputFormat::Json => Some(json(Some(summary), None)),
            OutputFormat::Quiet => None,
            OutputFormat::Table => {
                let mut rows = vec![
                    ("Kind", summary.kind.clone()),
                    ("Display name", summary.display_name.clone()),
                    ("Version", summary.display_version.clone().unwrap_or_else(|| "-".to_string())),
                    ("Setup file", summary.setup_file.clone()),
                    ("File name", summary.file_name.clone()),
                    ("Size", summary.cleartext_size.to_string()),
                    ("Encrypted size", summary.encrypted_size.to_string()),
                    ("Manifest", if summary.has_manifest { "yes" } else { "no" }.to_string()),
                ];
                if let Some(output) = &summary.output {
                    rows.push(("Output", output.clone()));
                }
                Some(table(&rows))
            }
        }
    }

    pub fn format_publish(&self, summary: &PublishSummary) -> Option<String> {
        match self.format {
            OutputFormat::Json => Some(json(Some(summary), None)),
            OutputFormat::Quiet => None,
            OutputFormat::Table => Some(table(&[
                ("App id", summary.app_id.clone()),
                ("Kind", summary.kind.clone()),
                ("Display name", summary.display_name.clone()),
                (
                    "Content version",
                    summary.committed_content_version.clone().unwrap_or_else(|| "-".to_string()),
                ),
            ])),
        }
    }

    pub fn format_extracted(&self, path: &Path) -> Option<String> {
        match self.format {
            OutputFormat::Json => Some(json(Some(&serde_json::json!({ "path": path.display().to_string() })), None)),
            OutputFormat::Quiet => None,
            OutputFormat::Table => Some(format!("Extracted to {}", path.display())),
        }
    }
}

fn table(rows: &[(&str, String)]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Field", "Value"]);
    for (field, value) in rows {
        table.add_row(vec![field.to_string(), value.clone()]);
    }
    table.to_string()
}

fn json<T: Serialize>(data: Option<&T>, error: Option<&str>) -> String {
    let response = JsonResponse {
        success: error.is_none(),
        data,
        error,
    };
    serde_json::to_string_pretty(&response).unwrap_or_else(|e| format!("{{\"success\":false,\"error\":\"{e}\"}}"))
}
