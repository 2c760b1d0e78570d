//! App descriptors carried by a content package.
//!
//! A package describes exactly one remote app kind. [`Win32App`] wraps any
//! payload behind install/uninstall command lines; [`MobileInstallerApp`] is
//! a bare MSI deployed directly by the MDM agent.

use crate::metadata::{InstallScope, MsiInfo};

/// File name of the encrypted payload inside a portal package.
pub const PACKAGE_FILE_NAME: &str = "IntunePackage.intunewin";

/// Publisher used when neither the caller nor MSI metadata supplies one.
pub const UNKNOWN_PUBLISHER: &str = "Unknown";

/// Remote app kind a descriptor maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppKind {
    Win32,
    MobileInstaller,
}

impl std::fmt::Display for AppKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppKind::Win32 => write!(f, "win32LobApp"),
            AppKind::MobileInstaller => write!(f, "windowsMobileMSI"),
        }
    }
}

/// Account the installer runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallExperience {
    #[default]
    System,
    User,
}

impl InstallExperience {
    /// Per-user MSI packages install as the user, everything else as system.
    pub fn from_scope(scope: InstallScope) -> Self {
        match scope {
            InstallScope::PerUser => InstallExperience::User,
            InstallScope::PerMachine | InstallScope::DualPurpose => InstallExperience::System,
        }
    }
}

/// How the MDM agent decides whether the app is already installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionRule {
    /// Installed when the MSI product code is registered.
    MsiProductCode {
        product_code: String,
        product_version: Option<String>,
    },
    /// Installed when the script exits 0 and writes to stdout.
    PowerShellScript {
        script_content: String,
        enforce_signature_check: bool,
        run_as_32_bit: bool,
    },
    /// Installed when a file or folder exists.
    FileExists {
        path: String,
        file_or_folder_name: String,
    },
}

impl DetectionRule {
    /// Rule used when nothing better is known. It never detects the app.
    pub fn empty_script() -> Self {
        DetectionRule::PowerShellScript {
            script_content: String::new(),
            enforce_signature_check: false,
            run_as_32_bit: false,
        }
    }
}

/// App icon shown in the company portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIcon {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Line-of-business Windows app installed through a command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Win32App {
    pub display_name: String,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub display_version: Option<String>,
    /// Always [`PACKAGE_FILE_NAME`].
    pub file_name: String,
    /// Setup file relative to the packaged source.
    pub setup_file_path: String,
    pub install_experience: InstallExperience,
    pub install_command_line: Option<String>,
    pub uninstall_command_line: Option<String>,
    pub detection_rules: Vec<DetectionRule>,
    pub msi_info: Option<MsiInfo>,
    pub large_icon: Option<AppIcon>,
}

impl Win32App {
    pub fn new(display_name: impl Into<String>, setup_file_path: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            description: None,
            publisher: None,
            display_version: None,
            file_name: PACKAGE_FILE_NAME.to_string(),
            setup_file_path: setup_file_path.into(),
            install_experience: InstallExperience::System,
            install_command_line: None,
            uninstall_command_line: None,
            detection_rules: Vec::new(),
            msi_info: None,
            large_icon: None,
        }
    }

    /// Fill every required field the caller left unset.
    ///
    /// MSI payloads get msiexec command lines and a product-code detection
    /// rule; anything else gets the quoted setup file and an empty
    /// detection script.
    pub fn apply_defaults(&mut self) {
        let setup = &self.setup_file_path;
        match &self.msi_info {
            Some(msi) => {
                self.install_command_line
                    .get_or_insert_with(|| format!("msiexec /i \"{setup}\" /qn /norestart"));
                self.uninstall_command_line
                    .get_or_insert_with(|| format!("msiexec /x {} /qn /norestart", msi.product_code));
                if self.publisher.is_none() {
                    self.publisher = msi.publisher.clone();
                }
                if self.display_version.is_none() && !msi.product_version.is_empty() {
                    self.display_version = Some(msi.product_version.clone());
                }
                if self.detection_rules.is_empty() {
                    self.detection_rules.push(DetectionRule::MsiProductCode {
                        product_code: msi.product_code.clone(),
                        product_version: None,
                    });
                }
            }
            None => {
                self.install_command_line
                    .get_or_insert_with(|| format!("\"{setup}\""));
                self.uninstall_command_line
                    .get_or_insert_with(|| format!("\"{setup}\" /uninstall"));
                if self.detection_rules.is_empty() {
                    self.detection_rules.push(DetectionRule::empty_script());
                }
            }
        }
        self.publisher
            .get_or_insert_with(|| UNKNOWN_PUBLISHER.to_string());
    }
}

/// Bare MSI deployed by the MDM agent without a wrapping command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobileInstallerApp {
    pub display_name: String,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub display_version: Option<String>,
    /// MSI file name as uploaded.
    pub file_name: String,
    /// Extra msiexec arguments.
    pub command_line: Option<String>,
    pub ignore_version_detection: bool,
    pub msi_info: MsiInfo,
    pub large_icon: Option<AppIcon>,
}

impl MobileInstallerApp {
    pub fn new(display_name: impl Into<String>, file_name: impl Into<String>, msi_info: MsiInfo) -> Self {
        Self {
            display_name: display_name.into(),
            description: None,
            publisher: msi_info.publisher.clone(),
            display_version: None,
            file_name: file_name.into(),
            command_line: None,
            ignore_version_detection: false,
            msi_info,
            large_icon: None,
        }
    }

    pub fn apply_defaults(&mut self) {
        if self.publisher.is_none() {
            self.publisher = Some(
                self.msi_info
                    .publisher
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_PUBLISHER.to_string()),
            );
        }
        if self.display_version.is_none() && !self.msi_info.product_version.is_empty() {
            self.display_version = Some(self.msi_info.product_version.clone());
        }
    }
}

/// The app a package describes. Exactly one variant by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppDescriptor {
    Win32App(Win32App),
    MobileInstallerApp(MobileInstallerApp),
}

impl AppDescriptor {
    pub fn kind(&self) -> AppKind {
        match self {
            AppDescriptor::Win32App(_) => AppKind::Win32,
            AppDescriptor::MobileInstallerApp(_) => AppKind::MobileInstaller,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            AppDescriptor::Win32App(app) => &app.display_name,
            AppDescriptor::MobileInstallerApp(app) => &app.display_name,
        }
    }

    pub fn display_version(&self) -> Option<&str> {
        match self {
            AppDescriptor::Win32App(app) => app.display_version.as_deref(),
            AppDescriptor::MobileInstallerApp(app) => app.display_version.as_deref(),
        }
    }

    pub fn msi_info(&self) -> Option<&MsiInfo> {
        match self {
            AppDescriptor::Win32App(app) => app.msi_info.as_ref(),
            AppDescriptor::MobileInstallerApp(app) => Some(&app.msi_info),
        }
    }

    pub fn large_icon(&self) -> Option<&AppIcon> {
        match self {
            AppDescriptor::Win32App(app) => app.large_icon.as_ref(),
            AppDescriptor::MobileInstallerApp(app) => app.large_icon.as_ref(),
        }
    }

    /// Name of the payload file as the backend records it.
    pub fn file_name(&self) -> &str {
        match self {
            AppDescriptor::Win32App(app) => &app.file_name,
            AppDescriptor::MobileInstallerApp(app) => &app.file_name,
        }
    }

    pub fn apply_defaults(&mut self) {
        match self {
            AppDescriptor::Win32App(app) => app.apply_defaults(),
            AppDescriptor::MobileInstallerApp(app) => app.apply_defaults(),
        }
    }
}
