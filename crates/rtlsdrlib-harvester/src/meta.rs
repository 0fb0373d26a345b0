//! Sidecar persistence and staleness decisions.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use rtlsdrlib_schema::{AssetMeta, BuildMeta, META_FILENAME, MetaCodec};

use crate::asset::HarvestAsset;
use crate::github::GithubRelease;

/// Resolve a directory to its sidecar path; a file path passes through.
pub fn meta_filename(dir_or_file: &Path) -> PathBuf {
    if dir_or_file.is_dir() {
        dir_or_file.join(META_FILENAME)
    } else {
        dir_or_file.to_path_buf()
    }
}

/// Read the sidecar document.
///
/// # Errors
///
/// Missing file, malformed JSON, or unknown wire tags.
pub fn read_build_meta(codec: MetaCodec, dir_or_file: &Path) -> Result<BuildMeta> {
    let fn_ = meta_filename(dir_or_file);
    let text = std::fs::read_to_string(&fn_)
        .with_context(|| format!("failed to read {}", fn_.display()))?;
    Ok(codec.from_str(&text)?)
}

/// Write the sidecar document.
///
/// With `overwrite` the document replaces whatever exists; otherwise the
/// write is a shallow merge: existing top-level keys are kept, keys in
/// `data` are added or replaced.
///
/// # Errors
///
/// Filesystem or encoding failures.
pub fn write_build_meta(
    codec: MetaCodec,
    dir_or_file: &Path,
    data: &BuildMeta,
    overwrite: bool,
) -> Result<()> {
    let fn_ = meta_filename(dir_or_file);
    let merged;
    let to_write = if overwrite {
        data
    } else {
        let mut existing = if fn_.exists() {
            read_build_meta(codec, &fn_)?
        } else {
            BuildMeta::new()
        };
        existing.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged = existing;
        &merged
    };
    std::fs::write(&fn_, codec.to_string(to_write)?)
        .with_context(|| format!("failed to write {}", fn_.display()))?;
    Ok(())
}

/// Build the remote-side metadata entry for one asset of a release.
pub fn remote_asset_meta(release: &GithubRelease, asset: &HarvestAsset) -> AssetMeta {
    AssetMeta {
        tag_name: release.tag_name.clone(),
        release_url: release.html_url.clone(),
        release_id: release.id,
        created: release.created_at,
        published: release.published_at,
        asset_type: asset.build_type,
        asset_name: asset.name.clone(),
        asset_url: asset.download_url.clone(),
        metadata_matches: false,
        files_updated: false,
        build_files: Vec::new(),
    }
}

/// Decide whether an asset needs re-download and re-extraction.
///
/// No local record means stale. Otherwise the identity keys (`tag_name`,
/// `release_url`, `release_id`, plus the asset's own name/url/type) decide:
/// all equal means up to date. On a mismatch the timestamps are the
/// secondary signal, and their comparison is trusted: only a remote
/// strictly newer than the local record is stale. With no comparable
/// timestamps the mismatch alone makes it stale.
pub fn needs_update(local: Option<&AssetMeta>, remote: &AssetMeta) -> bool {
    let Some(local) = local else {
        debug!("no local metadata, update needed");
        return true;
    };

    let identity_matches = local.tag_name == remote.tag_name
        && local.release_url == remote.release_url
        && local.release_id == remote.release_id
        && local.asset_name == remote.asset_name
        && local.asset_url == remote.asset_url
        && local.asset_type == remote.asset_type;
    if identity_matches {
        return false;
    }
    debug!(
        local_tag = %local.tag_name,
        remote_tag = %remote.tag_name,
        "identity keys differ, comparing timestamps"
    );

    let mut remote_newer = false;
    let mut compared = false;
    for (local_dt, remote_dt) in [
        (local.created, remote.created),
        (local.published, remote.published),
    ] {
        let (Some(local_dt), Some(remote_dt)) = (local_dt, remote_dt) else {
            continue;
        };
        compared = true;
        if remote_dt > local_dt {
            remote_newer = true;
        }
    }

    if compared { remote_newer } else { true }
}
