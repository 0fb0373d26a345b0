//! Per-file records for distributed artifacts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::build_type::BuildType;
use crate::error::{IncompatibleTypeError, ParseError};

/// Role of a distributed artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Executable tool.
    Bin,
    /// Shared or static library.
    Lib,
    /// Anything else; dropped during placement.
    Other,
}

impl FileType {
    /// String form used in the sidecar document.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bin => "bin",
            Self::Lib => "lib",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FileType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bin" => Ok(Self::Bin),
            "lib" => Ok(Self::Lib),
            "other" => Ok(Self::Other),
            other => Err(ParseError::FileType(other.to_string())),
        }
    }
}

/// One distributed artifact.
///
/// Constructed by the harvester at extraction time with absolute paths,
/// relativized against the build root before persistence, and rehydrated
/// from the sidecar with the symlink target re-anchored next to the owning
/// file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildFile {
    /// Platform/architecture/linkage tags of the build this file came from.
    pub build_type: BuildType,
    /// Role of the file.
    pub file_type: FileType,
    /// Path of the placed file. Absolute or relative depending on
    /// lifecycle stage.
    pub filename: PathBuf,
    /// Whether the placed file is a symlink.
    #[serde(default)]
    pub is_symlink: bool,
    /// Link target, populated only when `is_symlink`. Always resolves to a
    /// sibling within the owning directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symlink_target: Option<PathBuf>,
}

impl BuildFile {
    /// Record for a regular (non-symlink) file.
    pub fn new(build_type: BuildType, file_type: FileType, filename: PathBuf) -> Self {
        Self {
            build_type,
            file_type,
            filename,
            is_symlink: false,
            symlink_target: None,
        }
    }

    /// Record for a symlink and its target.
    pub fn symlink(
        build_type: BuildType,
        file_type: FileType,
        filename: PathBuf,
        target: PathBuf,
    ) -> Self {
        Self {
            build_type,
            file_type,
            filename,
            is_symlink: true,
            symlink_target: Some(target),
        }
    }

    /// Check this file's type against the type a container expects.
    ///
    /// # Errors
    ///
    /// [`IncompatibleTypeError`] when the declared build type does not
    /// intersect `expected`.
    pub fn check_type(&self, expected: BuildType) -> Result<(), IncompatibleTypeError> {
        if expected.matches(self.build_type) {
            return Ok(());
        }
        Err(IncompatibleTypeError {
            expected: expected.to_str(),
            found: self.build_type.to_str(),
            filename: self.filename.display().to_string(),
        })
    }

    /// Rewrite absolute paths relative to `root`, for persistence.
    ///
    /// Paths already relative are left alone, as is a symlink target that
    /// does not live under `root`.
    pub fn relativize(&mut self, root: &Path) {
        if let Ok(rel) = self.filename.strip_prefix(root) {
            self.filename = rel.to_path_buf();
        }
        if let Some(target) = &self.symlink_target {
            if let Ok(rel) = target.strip_prefix(root) {
                self.symlink_target = Some(rel.to_path_buf());
            }
        }
    }

    /// Re-anchor the symlink target next to the owning file.
    ///
    /// Applied after decoding: whatever directory prefix the stored target
    /// carried, the effective target is its file name resolved in the
    /// owning file's parent directory. Symlinks never escape their
    /// directory.
    pub fn reanchor_symlink(&mut self) {
        let Some(target) = &self.symlink_target else {
            return;
        };
        let Some(name) = target.file_name() else {
            return;
        };
        let parent = self.filename.parent().unwrap_or_else(|| Path::new(""));
        self.symlink_target = Some(parent.join(name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_round_trip() {
        for ft in [FileType::Bin, FileType::Lib, FileType::Other] {
            assert_eq!(ft.as_str().parse::<FileType>().unwrap(), ft);
        }
        assert!("exe".parse::<FileType>().is_err());
    }

    #[test]
    fn test_check_type_windows_linkage() {
        let file = BuildFile::new(
            BuildType::from_str("windows|w64|dlldep").unwrap(),
            FileType::Lib,
            PathBuf::from("librtlsdr_w64.dll"),
        );
        let expected = BuildType::from_str("windows|w64|static").unwrap();
        assert!(file.check_type(expected).is_err());
        assert!(
            file.check_type(BuildType::from_str("windows|w64|dlldep").unwrap())
                .is_ok()
        );
    }

    #[test]
    fn test_relativize() {
        let root = PathBuf::from("/build/assets");
        let mut file = BuildFile::symlink(
            BuildType::UBUNTU | BuildType::X86_X64,
            FileType::Lib,
            root.join("ubuntu/lib/librtlsdr.so"),
            root.join("ubuntu/lib/librtlsdr.so.0"),
        );
        file.relativize(&root);
        assert_eq!(file.filename, PathBuf::from("ubuntu/lib/librtlsdr.so"));
        assert_eq!(
            file.symlink_target,
            Some(PathBuf::from("ubuntu/lib/librtlsdr.so.0"))
        );
    }

    #[test]
    fn test_reanchor_symlink_stays_in_directory() {
        let mut file = BuildFile::symlink(
            BuildType::UBUNTU | BuildType::X86_X64,
            FileType::Lib,
            PathBuf::from("ubuntu/lib/librtlsdr.so"),
            PathBuf::from("../../elsewhere/librtlsdr.so.0"),
        );
        file.reanchor_symlink();
        assert_eq!(
            file.symlink_target,
            Some(PathBuf::from("ubuntu/lib/librtlsdr.so.0"))
        );
    }
}
