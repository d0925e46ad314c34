// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Writes the CRD manifests of `DNSEntry` and `DNSProvider`.
//!
//! ```text
//! cargo run --bin crdgen [OUTPUT_DIR]
//! ```
//!
//! The output directory defaults to `deploy/crds`.

use anyhow::{Context, Result};
use dnsman::crd::{DNSEntry, DNSProvider};
use kube::CustomResourceExt;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_OUTPUT_DIR: &str = "deploy/crds";

const HEADER: &str = "# Copyright (c) 2025 Erick Bourgeois, firestoned
# SPDX-License-Identifier: MIT
#
# Generated by `cargo run --bin crdgen`, do not edit.
";

fn main() -> Result<()> {
    let output_dir = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR), PathBuf::from);
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("cannot create {}", output_dir.display()))?;

    write_crd::<DNSEntry>(&output_dir, "dnsentries.crd.yaml")?;
    write_crd::<DNSProvider>(&output_dir, "dnsproviders.crd.yaml")?;

    println!("Apply with: kubectl apply -f {}", output_dir.display());
    Ok(())
}

fn write_crd<T: CustomResourceExt>(dir: &Path, file: &str) -> Result<()> {
    // Going through a JSON value drops the `null` fields of the typed CRD.
    let value = serde_json::to_value(T::crd())?;
    let manifest = format!("{HEADER}{}", serde_yaml::to_string(&value)?);

    let path = dir.join(file);
    fs::write(&path, manifest).with_context(|| format!("cannot write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}
