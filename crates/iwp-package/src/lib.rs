//! Packaging of installer payloads into encrypted `.intunewin` content.
//!
//! A source is either a single installer or a directory. Directories are
//! zipped first; the payload is then encrypted with [`iwp_crypto`] and
//! described by an [`AppDescriptor`]. The resulting [`ContentPackage`] can
//! be published directly or written out as a portal package.
//!
//! MSI metadata comes from a pluggable [`MetadataProvider`]; hosts without
//! an installer database reader use [`NoMetadata`].

pub mod assembler;
pub mod descriptor;
pub mod detection;
pub mod error;
pub mod manifest;
pub mod metadata;
pub mod package;
pub mod portal;
pub mod source;

#[cfg(test)]
mod proptests;

pub use assembler::PackageAssembler;
pub use descriptor::{
    AppDescriptor, AppIcon, AppKind, DetectionRule, InstallExperience, MobileInstallerApp, Win32App,
    PACKAGE_FILE_NAME, UNKNOWN_PUBLISHER,
};
pub use detection::{ApplicationInfo, TOOL_VERSION};
pub use error::PackageError;
pub use manifest::{installer_manifest, parse_installer_manifest, MobileMsiData, MsiExecutionContext};
pub use metadata::{InstallScope, MetadataProvider, MsiInfo, MsiToolsProvider, NoMetadata, StaticMetadata};
pub use package::{ContentPackage, ContentStream, PayloadKind};
pub use portal::{extract_payload, read_portal_package, write_portal_package, write_portal_package_to};
