//! Archive unpacking and artifact placement.
//!
//! Unpacks a downloaded asset (tar.gz or zip, with one level of nested
//! tarball), classifies the top-level entries by role, and moves them into
//! sibling `bin/`/`lib/` destination directories. Symlinks found in the
//! source tree are recreated at the destination with relative targets so
//! the placed tree stays relocatable.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::{debug, info};
use zip::ZipArchive;

use rtlsdrlib_schema::{BuildFile, BuildType, FileType};

use crate::asset::file_type_of;

/// Extraction and placement failures.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Local filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The archive extension maps to no known unpacker.
    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    /// The archive is malformed or contains an escaping path.
    #[error("Archive error: {0}")]
    Archive(String),

    /// A symlink's target is missing or would escape its directory.
    #[error("Broken symlink {link:?} -> {target:?}")]
    BrokenSymlink {
        /// The link being recreated.
        link: PathBuf,
        /// Its intended target.
        target: PathBuf,
    },
}

/// Unpack an archive, auto-detecting tar.gz vs zip from the extension.
///
/// # Errors
///
/// [`ExtractError::UnsupportedFormat`] for anything else.
pub fn unpack_auto(archive_path: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    let name = archive_path.to_string_lossy().to_lowercase();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        unpack_tar_gz(archive_path, dest_dir)
    } else if name.ends_with(".zip") {
        unpack_zip(archive_path, dest_dir)
    } else {
        Err(ExtractError::UnsupportedFormat(name))
    }
}

/// Unpack a tar.gz archive, preserving symlink entries.
///
/// # Errors
///
/// [`ExtractError`] on IO failure or an entry escaping `dest_dir`.
pub fn unpack_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive_path)?;
    let decoder = GzDecoder::new(BufReader::new(file));
    unpack_tar(decoder, dest_dir)
}

fn unpack_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<(), ExtractError> {
    fs::create_dir_all(dest_dir)?;

    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path: PathBuf = entry.path()?.components().collect();

        // Sanitize to prevent slip outside the destination.
        let absolute = dest_dir.join(&entry_path);
        if !absolute.starts_with(dest_dir) {
            return Err(ExtractError::Archive(format!(
                "Invalid path in archive: {}",
                entry_path.display()
            )));
        }
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)?;
        }
        // unpack() handles regular files, directories, and symlinks alike.
        entry.unpack(&absolute)?;
    }
    Ok(())
}

/// Unpack a zip archive.
///
/// # Errors
///
/// [`ExtractError`] on IO failure or a malformed archive.
pub fn unpack_zip(archive_path: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| ExtractError::Archive(e.to_string()))?;

    fs::create_dir_all(dest_dir)?;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };

        let absolute = dest_dir.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&absolute)?;
            continue;
        }
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = File::create(&absolute)?;
        io::copy(&mut entry, &mut outfile)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&absolute, fs::Permissions::from_mode(mode))?;
        }
    }
    Ok(())
}

/// If the unpacked tree holds exactly one top-level `*.tar.gz`, move it to
/// `scratch_dir` and unpack it into the tree. Applied exactly once: some
/// upstream zips wrap their real payload in a tarball.
///
/// # Errors
///
/// [`ExtractError`] on IO failure or a malformed nested archive.
pub fn unpack_nested_tarball(extract_dir: &Path, scratch_dir: &Path) -> Result<(), ExtractError> {
    let mut tarballs = Vec::new();
    for entry in fs::read_dir(extract_dir)? {
        let path = entry?.path();
        let name = path.file_name().map(|n| n.to_string_lossy().to_lowercase());
        if name.is_some_and(|n| n.ends_with(".tar.gz")) {
            tarballs.push(path);
        }
    }
    if tarballs.len() != 1 {
        return Ok(());
    }

    let tarball = tarballs.remove(0);
    let moved = scratch_dir.join(tarball.file_name().unwrap_or_default());
    debug!(from = %tarball.display(), to = %moved.display(), "unpacking nested tarball");
    move_file(&tarball, &moved)?;
    unpack_tar_gz(&moved, extract_dir)
}

/// Detect a single top-level directory and move its contents up, ignoring
/// hidden entries.
///
/// # Errors
///
/// Filesystem failures only.
pub fn strip_components(dir: &Path) -> io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.filter_map(Result::ok).collect();
    entries.retain(|e| !e.file_name().to_string_lossy().starts_with('.'));

    if entries.len() == 1 && entries[0].file_type()?.is_dir() {
        let top_level = entries[0].path();
        for entry in fs::read_dir(&top_level)?.filter_map(Result::ok) {
            fs::rename(entry.path(), dir.join(entry.file_name()))?;
        }
        fs::remove_dir(top_level)?;
    }
    Ok(())
}

/// Classify the top-level entries of `extract_dir` and move `bin`/`lib`
/// files into fresh `bin/` and `lib/` directories under `dest_dir`,
/// recreating symlinks with relative targets.
///
/// Returns one [`BuildFile`] record per placed file. `Other`-typed entries
/// are dropped.
///
/// # Errors
///
/// [`ExtractError`] on IO failure or a symlink whose target did not land
/// in the same destination directory.
pub fn place_files(
    build_type: BuildType,
    extract_dir: &Path,
    dest_dir: &Path,
) -> Result<Vec<BuildFile>, ExtractError> {
    let lib_dir = dest_dir.join("lib");
    let bin_dir = dest_dir.join("bin");
    for dir in [&lib_dir, &bin_dir] {
        if dir.exists() {
            info!(dir = %dir.display(), "destination exists, removing");
            fs::remove_dir_all(dir)?;
        }
        fs::create_dir_all(dir)?;
    }
    let dest_of = |ft: FileType| match ft {
        FileType::Lib => Some(&lib_dir),
        FileType::Bin => Some(&bin_dir),
        FileType::Other => None,
    };

    let mut results = Vec::new();

    // Symlinks first, so their targets can be verified after the regular
    // files have moved.
    let mut symlinks: Vec<(PathBuf, PathBuf, FileType)> = Vec::new();
    for entry in fs::read_dir(extract_dir)? {
        let path = entry?.path();
        if !path.symlink_metadata()?.file_type().is_symlink() {
            continue;
        }
        let file_type = file_type_of(build_type, &path);
        if dest_of(file_type).is_none() {
            continue;
        }
        let target = fs::read_link(&path)?;
        debug!(link = %path.display(), target = %target.display(), "found symlink");
        symlinks.push((path, target, file_type));
    }

    for entry in fs::read_dir(extract_dir)? {
        let path = entry?.path();
        let meta = path.symlink_metadata()?;
        if meta.file_type().is_symlink() || meta.is_dir() {
            continue;
        }
        let file_type = file_type_of(build_type, &path);
        let Some(fdest_dir) = dest_of(file_type) else {
            continue;
        };
        let dest = fdest_dir.join(path.file_name().unwrap_or_default());
        debug!(file = %path.display(), dest = %dest.display(), "placing file");
        move_file(&path, &dest)?;
        results.push(BuildFile::new(build_type, file_type, dest));
    }

    for (link_path, link_target, file_type) in symlinks {
        let Some(fdest_dir) = dest_of(file_type) else {
            continue;
        };
        let link_name = link_path.file_name().unwrap_or_default();
        // Re-anchor the target by name: links always point at a sibling.
        let target_name = link_target
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| link_target.clone());
        let dest_link = fdest_dir.join(link_name);
        let dest_target = fdest_dir.join(&target_name);

        if !dest_target.exists() {
            return Err(ExtractError::BrokenSymlink {
                link: dest_link,
                target: dest_target,
            });
        }
        make_symlink(&target_name, &dest_link, &dest_target)?;
        results.push(BuildFile::symlink(
            build_type,
            file_type,
            dest_link,
            target_name,
        ));
    }

    Ok(results)
}

/// Replace `dest_dir` with the unpacked source tree, wholesale.
///
/// The source archive is kept as a complete tree for building, not sorted
/// into `bin/`/`lib/` the way binary assets are.
///
/// # Errors
///
/// Filesystem failures; a partially written tree is removed on the next
/// extraction of the same asset.
pub fn place_source_tree(extract_dir: &Path, dest_dir: &Path) -> Result<(), ExtractError> {
    if dest_dir.exists() {
        info!(dir = %dest_dir.display(), "destination exists, removing");
        fs::remove_dir_all(dest_dir)?;
    }
    copy_tree(extract_dir, dest_dir)?;
    Ok(())
}

/// Recursive copy preserving symlinks. The source tree lives in a scoped
/// tempdir, often on another filesystem, so a plain rename is not enough.
fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let meta = from.symlink_metadata()?;
        if meta.file_type().is_symlink() {
            let target = fs::read_link(&from)?;
            make_symlink(&target, &to, &from)?;
        } else if meta.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}

/// Rename, falling back to copy+remove across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}

#[cfg(unix)]
fn make_symlink(target_rel: &Path, link: &Path, _target_abs: &Path) -> io::Result<()> {
    if link.exists() || link.symlink_metadata().is_ok() {
        fs::remove_file(link)?;
    }
    std::os::unix::fs::symlink(target_rel, link)
}

#[cfg(not(unix))]
fn make_symlink(_target_rel: &Path, link: &Path, target_abs: &Path) -> io::Result<()> {
    // No symlinks ship in the Windows builds; copying keeps the tree usable.
    fs::copy(target_abs, link).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tempfile::tempdir;

    const UBUNTU: BuildType = BuildType::UBUNTU;

    #[test]
    fn test_unpack_auto_rejects_unknown_format() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("payload.rar");
        fs::write(&archive, b"junk").unwrap();
        assert!(matches!(
            unpack_auto(&archive, dir.path()),
            Err(ExtractError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_tar_gz_round_trip_preserves_symlinks() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("payload.tar.gz");

        {
            let file = File::create(&archive_path).unwrap();
            let encoder = GzEncoder::new(file, Compression::default());
            let mut builder = tar::Builder::new(encoder);

            let data = b"shared object bytes";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, "librtlsdr.so.0", &data[..])
                .unwrap();

            let mut link_header = tar::Header::new_gnu();
            link_header.set_entry_type(tar::EntryType::Symlink);
            link_header.set_size(0);
            link_header.set_cksum();
            builder
                .append_link(&mut link_header, "librtlsdr.so", "librtlsdr.so.0")
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let out = dir.path().join("out");
        unpack_tar_gz(&archive_path, &out).unwrap();
        assert!(out.join("librtlsdr.so.0").is_file());
        #[cfg(unix)]
        {
            let link = out.join("librtlsdr.so");
            assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
            assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("librtlsdr.so.0"));
        }
    }

    #[test]
    fn test_strip_components() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("librtlsdr-2.0.2");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("librtlsdr.so.0"), b"x").unwrap();

        strip_components(dir.path()).unwrap();
        assert!(dir.path().join("librtlsdr.so.0").exists());
        assert!(!nested.exists());
    }

    #[test]
    fn test_place_files_sorts_by_role_and_drops_other() {
        let dir = tempdir().unwrap();
        let extract_dir = dir.path().join("expanded");
        let dest_dir = dir.path().join("ubuntu");
        fs::create_dir_all(&extract_dir).unwrap();
        fs::write(extract_dir.join("librtlsdr.so.0"), b"lib").unwrap();
        fs::write(extract_dir.join("rtl_test"), b"bin").unwrap();
        fs::write(extract_dir.join("README"), b"doc").unwrap();

        let files = place_files(UBUNTU, &extract_dir, &dest_dir).unwrap();
        assert_eq!(files.len(), 2);
        assert!(dest_dir.join("lib/librtlsdr.so.0").is_file());
        assert!(dest_dir.join("bin/rtl_test").is_file());
        assert!(!dest_dir.join("lib/README").exists());
        assert!(!dest_dir.join("bin/README").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_place_files_reconstructs_symlinks_relative() {
        let dir = tempdir().unwrap();
        let extract_dir = dir.path().join("expanded");
        let dest_dir = dir.path().join("ubuntu");
        fs::create_dir_all(&extract_dir).unwrap();
        fs::write(extract_dir.join("libfoo.so.1.2"), b"lib").unwrap();
        std::os::unix::fs::symlink("libfoo.so.1.2", extract_dir.join("libfoo.so")).unwrap();

        let files = place_files(UBUNTU, &extract_dir, &dest_dir).unwrap();

        let link = dest_dir.join("lib/libfoo.so");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        // Still resolves at the destination, and the recorded target is
        // relative, not absolute.
        assert!(link.canonicalize().unwrap().ends_with("libfoo.so.1.2"));
        let record = files.iter().find(|f| f.is_symlink).unwrap();
        let target = record.symlink_target.as_ref().unwrap();
        assert!(target.is_relative());
        assert_eq!(target, &PathBuf::from("libfoo.so.1.2"));
    }

    #[cfg(unix)]
    #[test]
    fn test_place_files_rejects_dangling_symlink() {
        let dir = tempdir().unwrap();
        let extract_dir = dir.path().join("expanded");
        let dest_dir = dir.path().join("ubuntu");
        fs::create_dir_all(&extract_dir).unwrap();
        std::os::unix::fs::symlink("libmissing.so.0", extract_dir.join("libmissing.so")).unwrap();

        assert!(matches!(
            place_files(UBUNTU, &extract_dir, &dest_dir),
            Err(ExtractError::BrokenSymlink { .. })
        ));
    }

    #[test]
    fn test_place_source_tree_keeps_whole_tree() {
        let dir = tempdir().unwrap();
        let extract_dir = dir.path().join("expanded");
        let dest_dir = dir.path().join("source");
        fs::create_dir_all(extract_dir.join("src")).unwrap();
        fs::write(extract_dir.join("CMakeLists.txt"), b"project(rtlsdr)").unwrap();
        fs::write(extract_dir.join("src/librtlsdr.c"), b"/* driver */").unwrap();
        // Stale content from a previous run must not survive.
        fs::create_dir_all(&dest_dir).unwrap();
        fs::write(dest_dir.join("leftover.txt"), b"old").unwrap();

        place_source_tree(&extract_dir, &dest_dir).unwrap();
        assert!(dest_dir.join("CMakeLists.txt").is_file());
        assert!(dest_dir.join("src/librtlsdr.c").is_file());
        assert!(!dest_dir.join("leftover.txt").exists());
    }

    #[test]
    fn test_nested_tarball_unpacked_once() {
        let dir = tempdir().unwrap();
        let extract_dir = dir.path().join("expanded");
        let scratch = dir.path().join("scratch");
        fs::create_dir_all(&extract_dir).unwrap();
        fs::create_dir_all(&scratch).unwrap();

        // Build inner.tar.gz holding one file, drop it into the tree.
        let inner = extract_dir.join("inner.tar.gz");
        {
            let file = File::create(&inner).unwrap();
            let encoder = GzEncoder::new(file, Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let data = b"payload";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "librtlsdr_w64.dll", &data[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        unpack_nested_tarball(&extract_dir, &scratch).unwrap();
        assert!(extract_dir.join("librtlsdr_w64.dll").is_file());
        // The tarball itself moved out of the tree.
        assert!(!inner.exists());
    }
}
