//! The content package handed from packaging to publishing.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use iwp_crypto::EncryptionInfo;

use crate::descriptor::{AppDescriptor, AppKind};

/// Seekable encrypted payload.
pub trait ContentStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> ContentStream for T {}

/// What the encrypted payload holds once decrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// The installer file itself.
    File,
    /// A zip of the source directory.
    Archive,
}

/// Encrypted payload plus everything the backend needs to register it.
///
/// The package owns its data stream. Dropping the package releases the
/// underlying temp file.
pub struct ContentPackage {
    data: Box<dyn ContentStream>,
    cleartext_size: u64,
    encrypted_size: u64,
    app: AppDescriptor,
    installer_manifest: Option<Vec<u8>>,
    encryption_info: EncryptionInfo,
    setup_file: String,
    payload_kind: Option<PayloadKind>,
}

impl ContentPackage {
    /// Build a package. A manifest passed with a [`AppDescriptor::Win32App`]
    /// is discarded.
    pub fn new(
        data: Box<dyn ContentStream>,
        cleartext_size: u64,
        encrypted_size: u64,
        app: AppDescriptor,
        installer_manifest: Option<Vec<u8>>,
        encryption_info: EncryptionInfo,
        setup_file: impl Into<String>,
    ) -> Self {
        let installer_manifest = match app.kind() {
            AppKind::MobileInstaller => installer_manifest,
            AppKind::Win32 => None,
        };
        Self {
            data,
            cleartext_size,
            encrypted_size,
            app,
            installer_manifest,
            encryption_info,
            setup_file: setup_file.into(),
            payload_kind: None,
        }
    }

    pub fn with_payload_kind(mut self, kind: PayloadKind) -> Self {
        self.payload_kind = Some(kind);
        self
    }

    /// Encrypted stream rewound to the start.
    pub fn reader(&mut self) -> io::Result<&mut dyn ContentStream> {
        self.data.seek(SeekFrom::Start(0))?;
        Ok(self.data.as_mut())
    }

    pub fn cleartext_size(&self) -> u64 {
        self.cleartext_size
    }

    pub fn encrypted_size(&self) -> u64 {
        self.encrypted_size
    }

    pub fn app(&self) -> &AppDescriptor {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut AppDescriptor {
        &mut self.app
    }

    pub fn installer_manifest(&self) -> Option<&[u8]> {
        self.installer_manifest.as_deref()
    }

    pub fn drop_installer_manifest(&mut self) {
        self.installer_manifest = None;
    }

    pub fn encryption_info(&self) -> &EncryptionInfo {
        &self.encryption_info
    }

    /// Setup file relative to the packaged source.
    pub fn setup_file(&self) -> &str {
        &self.setup_file
    }

    /// Payload layout, when known. Packages loaded from a portal file
    /// don't record it.
    pub fn payload_kind(&self) -> Option<PayloadKind> {
        self.payload_kind
    }
}

impl fmt::Debug for ContentPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentPackage")
            .field("cleartext_size", &self.cleartext_size)
            .field("encrypted_size", &self.encrypted_size)
            .field("app", &self.app)
            .field("installer_manifest", &self.installer_manifest.as_ref().map(Vec::len))
            .field("encryption_info", &self.encryption_info)
            .field("setup_file", &self.setup_file)
            .field("payload_kind", &self.payload_kind)
            .finish_non_exhaustive()
    }
}
