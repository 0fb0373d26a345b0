//! Asset classification.
//!
//! Turns upstream release assets into typed harvest work items: a build
//! type inferred from the asset name, a destination directory name, and a
//! file-role heuristic for the unpacked contents.

use std::path::Path;

use thiserror::Error;

use rtlsdrlib_schema::{BuildType, FileType};

use crate::github::{GithubAsset, GithubRelease};

/// Windows naming tokens, in destination-suffix order.
const WINDOWS_TOKENS: &[(&str, BuildType)] = &[
    ("w32", BuildType::W32),
    ("w64", BuildType::W64),
    ("dlldep", BuildType::DLLDEP),
    ("static", BuildType::STATIC),
    ("udpsrv", BuildType::UDPSRV),
];

/// Asset-level classification failures. Naming vocabularies are closed, so
/// these indicate an upstream naming change, not a runtime condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// No OS or Windows variant token found in the asset name.
    #[error("Could not classify asset {0:?} into a build type")]
    UnknownAsset(String),

    /// The build type has no destination directory mapping.
    #[error("Could not determine destination directory for build type {0:?}")]
    NoDestination(String),
}

/// Where a harvest asset's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetKind {
    /// A file attached to the release, named verbatim by upstream.
    Release,
    /// The synthetic source-archive entry pointing at the release tarball.
    Source,
}

/// One classified, downloadable work item. All fields are computed eagerly
/// at construction; nothing here touches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestAsset {
    /// Release asset vs synthetic source archive.
    pub kind: AssetKind,
    /// Display name (asset filename, or `Source`).
    pub name: String,
    /// Classified build type.
    pub build_type: BuildType,
    /// Download URL.
    pub download_url: String,
    /// Filename to store the download under.
    pub download_filename: String,
}

impl HarvestAsset {
    /// Classify one release asset.
    ///
    /// # Errors
    ///
    /// [`ClassifyError::UnknownAsset`] when the name carries no recognized
    /// platform token.
    pub fn from_release_asset(asset: &GithubAsset) -> Result<Self, ClassifyError> {
        let build_type = classify_asset_name(&asset.name)?;
        let download_filename = asset
            .browser_download_url
            .split('/')
            .next_back()
            .unwrap_or(&asset.name)
            .to_string();
        Ok(Self {
            kind: AssetKind::Release,
            name: asset.name.clone(),
            build_type,
            download_url: asset.browser_download_url.clone(),
            download_filename,
        })
    }

    /// The distinguished source-archive entry, always present for a release.
    pub fn source(release: &GithubRelease) -> Self {
        Self {
            kind: AssetKind::Source,
            name: "Source".to_string(),
            build_type: BuildType::SOURCE,
            download_url: release.tarball_url.clone(),
            download_filename: "source.tar.gz".to_string(),
        }
    }

    /// Destination directory name under the build root.
    ///
    /// macOS/Ubuntu/source assets use the bare OS name; Windows assets
    /// append their variant tokens in declared order
    /// (`windows_w64_static_udpsrv`).
    ///
    /// # Errors
    ///
    /// [`ClassifyError::NoDestination`] for a type without any known OS.
    pub fn dest_dirname(&self) -> Result<String, ClassifyError> {
        dest_dirname(self.build_type)
    }
}

/// Infer a build type from an asset filename.
///
/// `macos`/`ubuntu` substrings win outright; otherwise the Windows variant
/// tokens are OR-combined and the result must be non-empty.
///
/// # Errors
///
/// [`ClassifyError::UnknownAsset`] when nothing matches.
pub fn classify_asset_name(name: &str) -> Result<BuildType, ClassifyError> {
    for (token, flag) in [("macos", BuildType::MACOS), ("ubuntu", BuildType::UBUNTU)] {
        if name.contains(token) {
            return Ok(flag);
        }
    }

    let mut build_type = BuildType::UNKNOWN;
    for (token, flag) in WINDOWS_TOKENS {
        if name.contains(token) {
            build_type |= *flag;
        }
    }
    if build_type == BuildType::UNKNOWN {
        return Err(ClassifyError::UnknownAsset(name.to_string()));
    }
    build_type |= BuildType::WINDOWS;
    build_type.remove(BuildType::UNKNOWN);
    Ok(build_type)
}

/// Destination directory name for a build type under the build root.
///
/// # Errors
///
/// [`ClassifyError::NoDestination`] for a type without any known OS or
/// `source` flag.
pub fn dest_dirname(build_type: BuildType) -> Result<String, ClassifyError> {
    if build_type.is_macos() {
        return Ok("macos".to_string());
    }
    if build_type.is_ubuntu() {
        return Ok("ubuntu".to_string());
    }
    if build_type.is_windows() {
        let mut parts = vec!["windows"];
        for (token, flag) in WINDOWS_TOKENS {
            if build_type.intersects(*flag) {
                parts.push(token);
            }
        }
        return Ok(parts.join("_"));
    }
    if build_type.is_source() {
        return Ok("source".to_string());
    }
    Err(ClassifyError::NoDestination(build_type.to_str()))
}

/// Name-prefix/suffix heuristics for an unpacked entry's role.
///
/// Windows: `.exe` is a tool, `.dll` a library. Unix: names starting `lib`
/// are libraries, names starting `rtl_` are tools. Everything else is
/// `Other` and gets dropped during placement.
pub fn file_type_of(build_type: BuildType, path: &Path) -> FileType {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if build_type.is_windows() {
        if name.ends_with(".exe") {
            return FileType::Bin;
        }
        if name.ends_with(".dll") {
            return FileType::Lib;
        }
    } else if build_type.is_macos() || build_type.is_ubuntu() {
        if name.starts_with("lib") {
            return FileType::Lib;
        }
        if name.starts_with("rtl_") {
            return FileType::Bin;
        }
    }
    FileType::Other
}
