//! Property-based tests for iwp-package.
//!
//! - Setup detection picks the first MSI by name, else the first EXE.
//! - Win32 packages never carry an installer manifest.

#![cfg(test)]

use std::fs;
use std::sync::Arc;

use proptest::prelude::*;
use tempfile::TempDir;

use crate::assembler::PackageAssembler;
use crate::descriptor::AppKind;
use crate::metadata::{MsiInfo, StaticMetadata};
use crate::source::detect_setup_file;

fn arb_file_names() -> impl Strategy<Value = Vec<String>> {
    let stem = "[a-z]{1,8}";
    let ext = prop_oneof![Just("msi"), Just("MSI"), Just("exe"), Just("txt"), Just("dll")];
    prop::collection::btree_set((stem, ext).prop_map(|(s, e)| format!("{s}.{e}")), 0..8)
        .prop_map(|names| names.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_detect_setup_file(names in arb_file_names()) {
        let dir = TempDir::new().unwrap();
        for name in &names {
            fs::write(dir.path().join(name), b"x").unwrap();
        }

        let mut sorted = names.clone();
        sorted.sort();
        let lower_ext = |n: &String| n.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
        let expected = sorted
            .iter()
            .find(|n| lower_ext(n) == "msi")
            .or_else(|| sorted.iter().find(|n| lower_ext(n) == "exe"))
            .cloned();

        let found = detect_setup_file(dir.path())
            .unwrap()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned());
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn prop_directory_package_has_no_manifest(names in arb_file_names()) {
        let dir = TempDir::new().unwrap();
        for name in &names {
            fs::write(dir.path().join(name), name.as_bytes()).unwrap();
        }
        fs::write(dir.path().join("zz.msi"), b"msi").unwrap();

        let metadata = Arc::new(StaticMetadata(MsiInfo::new("{P}", "1.0")));
        let package = PackageAssembler::new(metadata).assemble(dir.path(), None).unwrap();

        prop_assert_eq!(package.app().kind(), AppKind::Win32);
        prop_assert!(package.installer_manifest().is_none());
    }
}
