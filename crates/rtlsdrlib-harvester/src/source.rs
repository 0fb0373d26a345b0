//! Build librtlsdr from the upstream source archive.
//!
//! Downloads the latest release's source tarball, runs the CMake
//! configure/build/install cycle against a staging prefix, then places the
//! installed libraries and tools into the custom-build tree that the
//! runtime locator searches ahead of the packaged default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::info;

use rtlsdrlib::platform::os_arch_dirname;
use rtlsdrlib_schema::{BuildFile, BuildMeta, BuildType, MetaCodec};

use crate::asset::HarvestAsset;
use crate::download::download_to;
use crate::extract::{ExtractError, place_files, strip_components, unpack_auto};
use crate::github::fetch_latest_release;
use crate::meta::{remote_asset_meta, write_build_meta};

/// Fetch the latest source release of `repo_name`, compile it, and install
/// the result under `custom_root/{os_arch_dirname}`. Returns the populated
/// directory.
///
/// Requires `cmake` and a C toolchain on `PATH`.
///
/// # Errors
///
/// Network or filesystem failures, a failing build step, or a platform
/// that does not reduce to one OS/arch pair.
pub async fn build_from_source(
    client: &reqwest::Client,
    repo_name: &str,
    custom_root: &Path,
) -> Result<PathBuf> {
    let platform = rtlsdrlib::detect_current_platform()?;
    let dest_dir = custom_root.join(os_arch_dirname(platform)?);

    let release = fetch_latest_release(client, repo_name).await?;
    let asset = HarvestAsset::source(&release);
    info!(tag = %release.tag_name, dest = %dest_dir.display(), "building from source");

    let tmp = TempDir::with_prefix("rtlsdrlib-build-")?;
    let src_dir = tmp.path().join("src");
    std::fs::create_dir(&src_dir)?;

    let archive = download_to(client, &asset.download_url, tmp.path(), &asset.download_filename)
        .await
        .with_context(|| format!("download failed for {}", asset.download_url))?;
    unpack_auto(&archive, &src_dir)?;
    strip_components(&src_dir)?;

    let build_dir = tmp.path().join("build");
    let stage_dir = tmp.path().join("stage");
    compile(&src_dir, &build_dir, &stage_dir).await?;

    let build_files = stage_artifacts(&stage_dir, &dest_dir, platform)?;
    anyhow::ensure!(
        build_files.iter().any(|f| f.file_type == rtlsdrlib_schema::FileType::Lib),
        "build produced no libraries under {}",
        stage_dir.display()
    );

    let mut entry = remote_asset_meta(&release, &asset);
    entry.files_updated = true;
    entry.build_files = build_files;
    let mut doc = BuildMeta::new();
    doc.insert(asset.name.clone(), entry);
    write_build_meta(MetaCodec, &dest_dir, &doc, false)?;

    info!(dest = %dest_dir.display(), "source build installed");
    Ok(dest_dir)
}

/// Configure, build, and install the source tree into `stage_dir`.
async fn compile(src_dir: &Path, build_dir: &Path, stage_dir: &Path) -> Result<()> {
    let mut configure = Command::new("cmake");
    configure
        .arg("-S")
        .arg(src_dir)
        .arg("-B")
        .arg(build_dir)
        .arg("-DCMAKE_BUILD_TYPE=Release")
        .arg(format!("-DCMAKE_INSTALL_PREFIX={}", stage_dir.display()));
    run_step("configure", configure).await?;

    let mut build = Command::new("cmake");
    build.arg("--build").arg(build_dir);
    run_step("build", build).await?;

    let mut install = Command::new("cmake");
    install.arg("--install").arg(build_dir);
    run_step("install", install).await
}

async fn run_step(step: &str, mut cmd: Command) -> Result<()> {
    info!(step, "running build step");
    let status = cmd
        .status()
        .await
        .with_context(|| format!("failed to spawn cmake for {step} (is cmake installed?)"))?;
    anyhow::ensure!(status.success(), "cmake {step} step failed: {status}");
    Ok(())
}

/// Place a CMake staging prefix's `lib/` and `bin/` contents into the
/// custom-build directory, classified and symlink-preserving like a binary
/// asset.
///
/// # Errors
///
/// Filesystem failures or a symlink whose target is missing.
pub fn stage_artifacts(
    stage_dir: &Path,
    dest_dir: &Path,
    build_type: BuildType,
) -> Result<Vec<BuildFile>, ExtractError> {
    // Flatten the prefix layout so placement sees one directory of
    // candidates; entries within a prefix subdir never collide by name.
    let flat = stage_dir.join("flat");
    std::fs::create_dir_all(&flat)?;
    for sub in ["lib", "lib64", "bin"] {
        let sub_dir = stage_dir.join(sub);
        if !sub_dir.is_dir() {
            continue;
        }
        for entry in std::fs::read_dir(&sub_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            std::fs::rename(entry.path(), flat.join(entry.file_name()))?;
        }
    }

    let mut files = place_files(build_type, &flat, dest_dir)?;
    for file in &mut files {
        file.relativize(dest_dir);
    }
    Ok(files)
}
