//! Platform-tagged distribution archives.
//!
//! Bundles the project library tree into a `rtlsdrlib-{version}-{tag}.tar.gz`
//! where the tag is the architecture-qualified dirname of the build type.
//! A distribution that would apply to any platform is a packaging bug, so
//! platform-free names are rejected both before and after the archive is
//! written.

use std::fs::File;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use thiserror::Error;
use tracing::info;

use rtlsdrlib::platform::{PlatformError, os_arch_dirname};
use rtlsdrlib_schema::BuildType;

/// Packaging failures.
#[derive(Error, Debug)]
pub enum PackageError {
    /// The build type could not be reduced to a single platform tag.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// An artifact carries no platform tag. The libraries are native code,
    /// so a platform-free distribution would install broken on most hosts.
    #[error("artifact {0:?} is not platform-tagged")]
    PlatformFree(String),

    /// Filesystem failure while writing the archive.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Archive filename for a version and platform tag.
fn archive_name(version: &str, tag: &str) -> String {
    format!("rtlsdrlib-{version}-{tag}.tar.gz")
}

/// Bundle `project_dir` into a platform-tagged tar.gz under `output_dir`,
/// returning the archive path. Symlinks in the tree are stored as links,
/// not followed.
///
/// # Errors
///
/// [`PackageError::Platform`] when `build_type` does not reduce to one
/// OS/arch pair, [`PackageError::PlatformFree`] when the resulting name
/// carries no platform tag, or IO failures.
pub fn package_project(
    project_dir: &Path,
    output_dir: &Path,
    version: &str,
    build_type: BuildType,
) -> Result<PathBuf, PackageError> {
    let tag = os_arch_dirname(build_type)?;
    let name = archive_name(version, &tag);
    if is_platform_free(&name) {
        return Err(PackageError::PlatformFree(name));
    }

    std::fs::create_dir_all(output_dir)?;
    let dest = output_dir.join(&name);
    info!(archive = %dest.display(), "packaging project tree");

    let file = File::create(&dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all("rtlsdrlib", project_dir)?;
    builder.into_inner()?.finish()?;

    check_artifacts(output_dir)?;
    Ok(dest)
}

fn is_platform_free(name: &str) -> bool {
    name.contains("-any.") || name.contains("-any-")
}

/// Scan `output_dir` for platform-free artifacts.
///
/// # Errors
///
/// [`PackageError::PlatformFree`] naming the first offender, or IO
/// failures reading the directory.
pub fn check_artifacts(output_dir: &Path) -> Result<(), PackageError> {
    for entry in std::fs::read_dir(output_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".tar.gz") && is_platform_free(&name) {
            return Err(PackageError::PlatformFree(name));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::tempdir;

    #[test]
    fn test_package_names_carry_platform_tag() {
        let project = tempdir().unwrap();
        let out = tempdir().unwrap();
        std::fs::write(project.path().join("librtlsdr.so.0"), b"lib").unwrap();

        let archive = package_project(
            project.path(),
            out.path(),
            "0.3.1",
            BuildType::UBUNTU | BuildType::X86_X64,
        )
        .unwrap();
        assert_eq!(
            archive.file_name().unwrap().to_str().unwrap(),
            "rtlsdrlib-0.3.1-ubuntu_x86_x64.tar.gz"
        );
    }

    #[test]
    fn test_package_archives_the_tree() {
        let project = tempdir().unwrap();
        let out = tempdir().unwrap();
        std::fs::write(project.path().join("librtlsdr.dylib"), b"lib").unwrap();

        let archive = package_project(
            project.path(),
            out.path(),
            "0.3.1",
            BuildType::MACOS | BuildType::ARM64,
        )
        .unwrap();

        let mut tar = tar::Archive::new(GzDecoder::new(File::open(archive).unwrap()));
        let names: Vec<String> = tar
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains(&"rtlsdrlib/librtlsdr.dylib".to_string()));
    }

    #[test]
    fn test_ambiguous_platform_is_rejected() {
        let project = tempdir().unwrap();
        let out = tempdir().unwrap();
        let err = package_project(
            project.path(),
            out.path(),
            "0.3.1",
            BuildType::MACOS | BuildType::UBUNTU | BuildType::X86_X64,
        )
        .unwrap_err();
        assert!(matches!(err, PackageError::Platform(_)));
    }

    #[test]
    fn test_check_flags_platform_free_artifacts() {
        let out = tempdir().unwrap();
        std::fs::write(out.path().join("rtlsdrlib-0.3.1-ubuntu_x86_x64.tar.gz"), b"").unwrap();
        assert!(check_artifacts(out.path()).is_ok());

        std::fs::write(out.path().join("rtlsdrlib-0.3.1-any.tar.gz"), b"").unwrap();
        assert!(matches!(
            check_artifacts(out.path()),
            Err(PackageError::PlatformFree(_))
        ));
    }
}
