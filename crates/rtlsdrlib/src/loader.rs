//! Library locator and dynamic loader.
//!
//! Maps a build type to a filename glob, finds matching files in the
//! packaged tree, and loads the first candidate that the platform linker
//! accepts. A custom-built tree is always searched before the packaged
//! default so a local build shadows the shipped binary.

use std::path::PathBuf;

use libloading::Library;
use tracing::{debug, warn};

use rtlsdrlib_schema::BuildType;

use crate::platform::{PlatformError, detect_current_platform, os_arch_dirname};

/// Fixed filename glob for a reduced build type, or None when the platform
/// ships no packaged library.
pub fn lib_glob(build_type: BuildType) -> Option<&'static str> {
    let os = build_type.filter_os();
    if os == BuildType::MACOS {
        Some("*.dylib")
    } else if os == BuildType::UBUNTU {
        Some("librtlsdr.so*")
    } else if os == BuildType::WINDOWS {
        if build_type.intersects(BuildType::W32) {
            Some("librtlsdr_w32*.dll")
        } else if build_type.intersects(BuildType::W64) {
            Some("librtlsdr_w64*.dll")
        } else {
            None
        }
    } else {
        None
    }
}

/// Finds packaged library files for a build type.
#[derive(Debug, Clone)]
pub struct Locator {
    /// Search roots in priority order.
    roots: Vec<PathBuf>,
}

impl Locator {
    /// Locator over explicit search roots, highest priority first.
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// Locator over the conventional tree: `custom_build/` first (unless
    /// suppressed by `RTLSDRLIB_NO_CUSTOM`), then the packaged `lib/`.
    pub fn from_env() -> Self {
        let mut roots = Vec::with_capacity(2);
        if !crate::custom_build_suppressed() {
            roots.push(crate::custom_build_dir());
        }
        roots.push(crate::lib_dir());
        Self { roots }
    }

    /// List candidate library files for `build_type`, priority order.
    ///
    /// An absent directory or a platform with no glob entry yields an empty
    /// list, not an error.
    ///
    /// # Errors
    ///
    /// [`PlatformError`] when `build_type` does not reduce to exactly one
    /// OS and one arch flag.
    pub fn list_library_files(&self, build_type: BuildType) -> Result<Vec<PathBuf>, PlatformError> {
        let Some(pattern) = lib_glob(build_type) else {
            return Ok(Vec::new());
        };
        let dirname = os_arch_dirname(build_type)?;

        let mut files = Vec::new();
        for root in &self.roots {
            let dir = root.join(&dirname);
            let glob_pattern = dir.join(pattern);
            let Some(glob_str) = glob_pattern.to_str() else {
                continue;
            };
            let Ok(paths) = glob::glob(glob_str) else {
                continue;
            };
            for path in paths.flatten() {
                debug!(path = %path.display(), "found candidate library");
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Load the first candidate library that the platform linker accepts.
    ///
    /// Candidates that fail to load are logged and skipped; they only
    /// matter if every candidate fails, in which case this returns
    /// `Ok(None)`.
    ///
    /// # Errors
    ///
    /// [`PlatformError`] from candidate listing only; load failures are
    /// never propagated.
    pub fn load_library(&self, build_type: BuildType) -> Result<Option<Library>, PlatformError> {
        for path in self.list_library_files(build_type)? {
            // SAFETY: loading a shared library runs its initializers. The
            // tree only holds libraries placed by the harvester or built
            // locally by the user.
            match unsafe { Library::new(&path) } {
                Ok(lib) => {
                    debug!(path = %path.display(), "loaded librtlsdr");
                    return Ok(Some(lib));
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "could not load candidate");
                }
            }
        }
        Ok(None)
    }
}

/// List packaged library files for the probed (or overridden) platform.
///
/// # Errors
///
/// [`PlatformError`] when the probe fails or the platform is ambiguous.
pub fn list_library_files() -> Result<Vec<PathBuf>, PlatformError> {
    let build_type = detect_current_platform()?;
    Locator::from_env().list_library_files(build_type)
}

/// Probe the platform and load the packaged `librtlsdr`, if any loads.
///
/// # Errors
///
/// [`PlatformError`] when the probe fails or the platform is ambiguous.
pub fn load_librtlsdr() -> Result<Option<Library>, PlatformError> {
    let build_type = detect_current_platform()?;
    Locator::from_env().load_library(build_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtlsdrlib_schema::ParseError;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_lib_glob_table() {
        assert_eq!(lib_glob(BuildType::MACOS | BuildType::ARM64), Some("*.dylib"));
        assert_eq!(
            lib_glob(BuildType::UBUNTU | BuildType::X86_X64),
            Some("librtlsdr.so*")
        );
        assert_eq!(
            lib_glob(BuildType::WINDOWS | BuildType::W32),
            Some("librtlsdr_w32*.dll")
        );
        assert_eq!(
            lib_glob(BuildType::WINDOWS | BuildType::W64),
            Some("librtlsdr_w64*.dll")
        );
        assert_eq!(lib_glob(BuildType::SOURCE), None);
    }

    #[test]
    fn test_list_library_files_empty_when_dir_absent() {
        let dir = tempdir().unwrap();
        let locator = Locator::with_roots(vec![dir.path().join("missing")]);
        let files = locator
            .list_library_files(BuildType::UBUNTU | BuildType::X86_X64)
            .unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_list_library_files_matches_glob() {
        let dir = tempdir().unwrap();
        let plat_dir = dir.path().join("ubuntu_x86_x64");
        fs::create_dir_all(&plat_dir).unwrap();
        fs::write(plat_dir.join("librtlsdr.so.0"), b"").unwrap();
        fs::write(plat_dir.join("librtlsdr.so"), b"").unwrap();
        fs::write(plat_dir.join("README"), b"").unwrap();

        let locator = Locator::with_roots(vec![dir.path().to_path_buf()]);
        let files = locator
            .list_library_files(BuildType::UBUNTU | BuildType::X86_X64)
            .unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("librtlsdr.so"))
        }));
    }

    #[test]
    fn test_custom_root_searched_before_default() {
        let custom = tempdir().unwrap();
        let packaged = tempdir().unwrap();
        for root in [custom.path(), packaged.path()] {
            let plat_dir = root.join("macos_arm64");
            fs::create_dir_all(&plat_dir).unwrap();
            fs::write(plat_dir.join("librtlsdr.dylib"), b"").unwrap();
        }

        let locator = Locator::with_roots(vec![
            custom.path().to_path_buf(),
            packaged.path().to_path_buf(),
        ]);
        let files = locator
            .list_library_files(BuildType::MACOS | BuildType::ARM64)
            .unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].starts_with(custom.path()));
        assert!(files[1].starts_with(packaged.path()));
    }

    #[test]
    fn test_ambiguous_platform_rejected() {
        let locator = Locator::with_roots(vec![PathBuf::from("/nonexistent")]);
        let t = BuildType::MACOS | BuildType::UBUNTU | BuildType::X86_X64;
        // Two OS flags present: the locator must refuse rather than pick one.
        assert!(matches!(
            locator.list_library_files(t),
            Err(PlatformError::Ambiguous(_))
        ));
    }

    #[test]
    fn test_load_library_skips_unloadable_candidates() {
        let dir = tempdir().unwrap();
        let plat_dir = dir.path().join("ubuntu_x86_x64");
        fs::create_dir_all(&plat_dir).unwrap();
        // Neither file is a real shared object; both must be skipped
        // without a panic and the overall result is "no library".
        fs::write(plat_dir.join("librtlsdr.so.0"), b"not an ELF").unwrap();
        fs::write(plat_dir.join("librtlsdr.so.1"), b"also not an ELF").unwrap();

        let locator = Locator::with_roots(vec![dir.path().to_path_buf()]);
        let loaded = locator
            .load_library(BuildType::UBUNTU | BuildType::X86_X64)
            .unwrap();
        assert!(loaded.is_none());
    }

    /// A real loadable shared object on the test host, if one can be found
    /// in the usual glibc locations.
    #[cfg(target_os = "linux")]
    fn find_system_library() -> Option<PathBuf> {
        for pattern in [
            "/lib/*/libz.so.1",
            "/usr/lib/*/libz.so.1",
            "/lib64/libz.so.1",
            "/usr/lib/libz.so.1",
            "/lib/*/libm.so.6",
            "/usr/lib/*/libm.so.6",
        ] {
            if let Ok(paths) = glob::glob(pattern) {
                if let Some(path) = paths.flatten().find(|p| p.is_file()) {
                    return Some(path);
                }
            }
        }
        None
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_load_library_falls_back_to_next_candidate() {
        let Some(real_lib) = find_system_library() else {
            return;
        };
        let dir = tempdir().unwrap();
        let plat_dir = dir.path().join("ubuntu_x86_x64");
        fs::create_dir_all(&plat_dir).unwrap();
        // Glob order is lexical, so the junk candidate is tried first and
        // must be skipped in favor of the loadable one.
        fs::write(plat_dir.join("librtlsdr.so.0"), b"not an ELF").unwrap();
        fs::copy(&real_lib, plat_dir.join("librtlsdr.so.9")).unwrap();

        let locator = Locator::with_roots(vec![dir.path().to_path_buf()]);
        let candidates = locator
            .list_library_files(BuildType::UBUNTU | BuildType::X86_X64)
            .unwrap();
        assert_eq!(candidates[0], plat_dir.join("librtlsdr.so.0"));

        let loaded = locator
            .load_library(BuildType::UBUNTU | BuildType::X86_X64)
            .unwrap();
        assert!(loaded.is_some());
    }

    #[test]
    fn test_probe_machine_failure_is_parse_error() {
        assert!(matches!(
            crate::platform::machine_arch("vax"),
            Err(ParseError::Machine(_))
        ));
    }
}
