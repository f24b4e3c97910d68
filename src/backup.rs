use anyhow::{anyhow, Context};
use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const ROSTER_ENTRY: &str = "roster/studentMarks.txt";
pub const BUNDLE_FORMAT_V1: &str = "marksd-roster-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub roster_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub roster_sha256: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn export_roster_bundle(roster_path: &Path, out_path: &Path) -> anyhow::Result<ExportSummary> {
    if !roster_path.is_file() {
        return Err(anyhow!(
            "roster file not found: {}",
            roster_path.to_string_lossy()
        ));
    }
    let roster_bytes = std::fs::read(roster_path)
        .with_context(|| format!("failed to read roster {}", roster_path.to_string_lossy()))?;
    let roster_sha256 = sha256_hex(&roster_bytes);

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": Utc::now().to_rfc3339(),
        "rosterSha256": roster_sha256,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(ROSTER_ENTRY, opts)
        .context("failed to start roster entry")?;
    zip.write_all(&roster_bytes)
        .context("failed to write roster entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 2,
        roster_sha256,
    })
}

pub fn import_roster_bundle(in_path: &Path, roster_path: &Path) -> anyhow::Result<ImportSummary> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let expected_sha = manifest
        .get("rosterSha256")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let mut roster_bytes = Vec::new();
    archive
        .by_name(ROSTER_ENTRY)
        .context("bundle missing roster entry")?
        .read_to_end(&mut roster_bytes)
        .context("failed to read roster entry")?;

    let actual_sha = sha256_hex(&roster_bytes);
    if !expected_sha.is_empty() && expected_sha != actual_sha {
        return Err(anyhow!(
            "roster checksum mismatch: manifest says {}, bundle holds {}",
            expected_sha,
            actual_sha
        ));
    }

    if let Some(parent) = roster_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
    }

    // Land next to the target, then rename into place.
    let mut tmp_name = roster_path.as_os_str().to_owned();
    tmp_name.push(".importing");
    let tmp = PathBuf::from(tmp_name);
    std::fs::write(&tmp, &roster_bytes)
        .with_context(|| format!("failed to write temp roster {}", tmp.to_string_lossy()))?;
    std::fs::rename(&tmp, roster_path).with_context(|| {
        format!(
            "failed to move imported roster to {}",
            roster_path.to_string_lossy()
        )
    })?;

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
        roster_sha256: actual_sha,
    })
}
