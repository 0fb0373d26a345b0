//! Top-level harvest operations: extract a release into the build tree and
//! copy changed libraries into the project tree.
//!
//! Each operation runs start-to-finish before the next; within the extract
//! loop each asset is processed sequentially, and a failing asset is logged
//! and skipped without halting the independent ones.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{error, info};

use rtlsdrlib_schema::{BuildFile, BuildMeta, BuildType, FileType, MetaCodec};

use crate::asset::{AssetKind, HarvestAsset};
use crate::download::download_to;
use crate::extract::{
    place_files, place_source_tree, strip_components, unpack_auto, unpack_nested_tarball,
};
use crate::github::fetch_latest_release;
use crate::meta::{needs_update, read_build_meta, remote_asset_meta, write_build_meta};

/// Fetch the latest release of `repo_name` and extract every asset whose
/// classified type matches `asset_types` into `build_root`, skipping assets
/// whose persisted metadata is still current.
///
/// Returns the aggregate sidecar document, which is also written to
/// `build_root`.
///
/// # Errors
///
/// Classification failures and sidecar IO are fatal; a download or
/// extraction failure aborts only the current asset.
pub async fn extract_release(
    client: &reqwest::Client,
    repo_name: &str,
    build_root: &Path,
    asset_types: BuildType,
) -> Result<BuildMeta> {
    let codec = MetaCodec;
    let release = fetch_latest_release(client, repo_name).await?;
    info!(tag = %release.tag_name, "latest release");

    let mut assets = Vec::new();
    for gh_asset in &release.assets {
        assets.push(HarvestAsset::from_release_asset(gh_asset)?);
    }
    assets.push(HarvestAsset::source(&release));

    std::fs::create_dir_all(build_root)
        .with_context(|| format!("failed to create {}", build_root.display()))?;

    let mut results = BuildMeta::new();
    for asset in assets {
        if !asset_types.matches(asset.build_type) {
            info!(asset = %asset.name, "skipping asset");
            continue;
        }

        let dest_dir = build_root.join(asset.dest_dirname()?);
        let local_meta = read_build_meta(codec, &dest_dir).ok();
        let local_entry = local_meta.as_ref().and_then(|m| m.get(&asset.name));
        let mut remote_entry = remote_asset_meta(&release, &asset);

        if !needs_update(local_entry, &remote_entry) {
            info!(asset = %asset.name, "no update needed");
            let mut entry = local_entry
                .cloned()
                .unwrap_or_else(|| remote_entry.clone());
            entry.metadata_matches = true;
            entry.files_updated = false;
            write_single_asset(codec, &dest_dir, &asset.name, &entry)?;
            results.insert(asset.name.clone(), entry);
            continue;
        }

        match extract_one(client, &asset, build_root, &dest_dir).await {
            Ok(build_files) => {
                remote_entry.files_updated = true;
                remote_entry.metadata_matches = false;
                remote_entry.build_files = build_files;
                write_single_asset(codec, &dest_dir, &asset.name, &remote_entry)?;
                results.insert(asset.name.clone(), remote_entry);
            }
            Err(err) => {
                // Fatal for this asset only; independent assets continue.
                error!(asset = %asset.name, error = %err, "asset extraction failed");
            }
        }
    }

    write_build_meta(codec, build_root, &results, true)?;
    Ok(results)
}

/// Download and unpack one asset inside a scoped tempdir, placing its
/// classified files under `dest_dir`.
async fn extract_one(
    client: &reqwest::Client,
    asset: &HarvestAsset,
    build_root: &Path,
    dest_dir: &Path,
) -> Result<Vec<BuildFile>> {
    info!(asset = %asset.name, dest = %dest_dir.display(), "extracting");
    std::fs::create_dir_all(dest_dir)?;

    // Dropped (and deleted) on every exit path.
    let tmp = TempDir::with_prefix("rtlsdrlib-harvest-")?;
    let extract_dir = tmp.path().join("expanded");
    std::fs::create_dir(&extract_dir)?;

    let archive = download_to(client, &asset.download_url, tmp.path(), &asset.download_filename)
        .await
        .with_context(|| format!("download failed for {}", asset.download_url))?;

    unpack_auto(&archive, &extract_dir)
        .with_context(|| format!("failed to unpack {}", archive.display()))?;
    // A wrapping directory can hide the nested tarball, so strip before
    // and after looking for one.
    strip_components(&extract_dir)?;
    unpack_nested_tarball(&extract_dir, tmp.path())?;
    strip_components(&extract_dir)?;

    // The source archive stays a whole tree for building from source;
    // binary assets are sorted into bin/ and lib/.
    if asset.kind == AssetKind::Source {
        place_source_tree(&extract_dir, dest_dir)?;
        info!(asset = %asset.name, "source tree placed");
        return Ok(Vec::new());
    }

    let mut build_files = place_files(asset.build_type, &extract_dir, dest_dir)?;
    for file in &mut build_files {
        file.relativize(build_root);
    }
    info!(asset = %asset.name, files = build_files.len(), "extraction complete");
    Ok(build_files)
}

fn write_single_asset(
    codec: MetaCodec,
    dest_dir: &Path,
    name: &str,
    entry: &rtlsdrlib_schema::AssetMeta,
) -> Result<()> {
    std::fs::create_dir_all(dest_dir)?;
    let mut doc = BuildMeta::new();
    doc.insert(name.to_string(), entry.clone());
    write_build_meta(codec, dest_dir, &doc, false)
}

/// Platform-qualified project filename for a library build file.
///
/// macOS keeps `.dylib` names, Ubuntu keeps `.so*` names, Windows embeds
/// the variant tokens before the extension so several variants can coexist
/// in one flat directory. Returns None for files the project tree does not
/// take (wrong role or extension).
pub fn project_filename(file: &BuildFile) -> Option<String> {
    if file.file_type != FileType::Lib {
        return None;
    }
    let name = file.filename.file_name()?.to_str()?;

    if file.build_type.is_macos() {
        return name.ends_with(".dylib").then(|| name.to_string());
    }
    if file.build_type.is_ubuntu() {
        return name.contains(".so").then(|| name.to_string());
    }
    if file.build_type.is_windows() {
        let (stem, ext) = name.rsplit_once('.')?;
        let mut parts = vec![stem.to_string()];
        for opt in file
            .build_type
            .filter_archs()
            .union(file.build_type.filter_options())
            .members()
        {
            let token = opt.to_str();
            if !stem.contains(&token) {
                parts.push(token);
            }
        }
        return Some(format!("{}.{}", parts.join("_"), ext));
    }
    None
}

/// Copy changed library files from the build tree into the project library
/// directory, recreating symlinks and updating the project sidecar.
///
/// A file is copied when the project has never seen its asset, the placed
/// copy is missing, or the recorded release tag changed. Returns the number
/// of files placed.
///
/// # Errors
///
/// Sidecar IO, filesystem failures, or a symlink that fails verification
/// after linking (the link is removed again before the error surfaces).
pub fn copy_builds_to_project(build_root: &Path, project_dir: &Path) -> Result<usize> {
    let codec = MetaCodec;
    let build_meta = read_build_meta(codec, build_root)
        .with_context(|| format!("no build metadata under {}", build_root.display()))?;
    let mut project_meta = read_build_meta(codec, project_dir).unwrap_or_default();

    std::fs::create_dir_all(project_dir)?;
    info!("checking for project file updates");

    let mut num_updates = 0;
    for (asset_name, asset_data) in &build_meta {
        if asset_data.asset_type.is_source() {
            continue;
        }

        let project_entry = project_meta.get(asset_name);
        let tag_changed =
            project_entry.is_none_or(|entry| entry.tag_name != asset_data.tag_name);

        let mut placed = Vec::new();
        let mut symlinks = Vec::new();

        for file in &asset_data.build_files {
            // A file filed under the wrong asset means the sidecar is
            // corrupt; refuse rather than place a mismatched binary.
            file.check_type(asset_data.asset_type)?;
            let Some(dest_name) = project_filename(file) else {
                continue;
            };
            let dest = project_dir.join(&dest_name);
            if !tag_changed && dest.exists() {
                continue;
            }
            if file.is_symlink {
                symlinks.push((file, dest_name, dest));
                continue;
            }
            let src = build_root.join(&file.filename);
            info!(src = %src.display(), dest = %dest.display(), "copying library");
            std::fs::copy(&src, &dest)
                .with_context(|| format!("failed to copy {}", src.display()))?;
            let mut record = file.clone();
            record.filename = PathBuf::from(&dest_name);
            placed.push(record);
        }

        for (file, dest_name, dest) in symlinks {
            let target_name = file
                .symlink_target
                .as_ref()
                .and_then(|t| t.file_name())
                .map(PathBuf::from)
                .context("symlink record has no target")?;
            let target = project_dir.join(&target_name);
            anyhow::ensure!(
                target.exists(),
                "symlink target {} not present in project tree",
                target.display()
            );
            if dest.symlink_metadata().is_ok() {
                std::fs::remove_file(&dest)?;
            }
            link_relative(&target_name, &dest)?;
            // Verify the link resolves to its sibling; undo on failure.
            let resolved = dest.canonicalize();
            let expected = target.canonicalize()?;
            if resolved.as_ref().ok() != Some(&expected) {
                std::fs::remove_file(&dest)?;
                anyhow::bail!("symlink {} failed verification", dest.display());
            }
            let mut record = file.clone();
            record.filename = PathBuf::from(&dest_name);
            record.symlink_target = Some(target_name);
            placed.push(record);
        }

        if placed.is_empty() {
            continue;
        }
        num_updates += placed.len();
        info!(asset = %asset_name, files = placed.len(), "updated project files");

        let mut entry = asset_data.clone();
        entry.build_files = placed;
        project_meta.insert(asset_name.clone(), entry);
    }

    if num_updates > 0 {
        write_build_meta(MetaCodec, project_dir, &project_meta, true)?;
        info!(total = num_updates, "updated project files");
    } else {
        info!("project files up to date");
    }
    Ok(num_updates)
}

#[cfg(unix)]
fn link_relative(target_rel: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target_rel, link)
}

#[cfg(not(unix))]
fn link_relative(target_rel: &Path, link: &Path) -> std::io::Result<()> {
    let target = link
        .parent()
        .map(|p| p.join(target_rel))
        .unwrap_or_else(|| target_rel.to_path_buf());
    std::fs::copy(target, link).map(|_| ())
}
