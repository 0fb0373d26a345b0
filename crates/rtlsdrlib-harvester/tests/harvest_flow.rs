//! End-to-end flow over local fixtures: unpack an archive, place its files,
//! persist the sidecar, copy into a project tree, and package the result.
//! No network involved; the release download itself is covered by unit
//! tests on the classification and staleness logic.

use std::fs::{self, File};
use std::path::PathBuf;

use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::tempdir;

use rtlsdrlib_harvester::asset::HarvestAsset;
use rtlsdrlib_harvester::extract::{place_files, strip_components, unpack_auto};
use rtlsdrlib_harvester::github::GithubAsset;
use rtlsdrlib_harvester::meta::{read_build_meta, write_build_meta};
use rtlsdrlib_harvester::package::package_project;
use rtlsdrlib_harvester::copy_builds_to_project;
use rtlsdrlib_schema::{AssetMeta, BuildMeta, BuildType, MetaCodec};

fn ubuntu_fixture_archive(dest: &std::path::Path) {
    let file = File::create(dest).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut add_file = |name: &str, data: &[u8]| {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
    };
    // Wrapping directory, as upstream tarballs ship.
    add_file("librtlsdr-2.0.2/librtlsdr.so.0", b"shared object");
    add_file("librtlsdr-2.0.2/rtl_test", b"elf tool");
    add_file("librtlsdr-2.0.2/README", b"docs");

    #[cfg(unix)]
    {
        let mut link = tar::Header::new_gnu();
        link.set_entry_type(tar::EntryType::Symlink);
        link.set_size(0);
        link.set_cksum();
        builder
            .append_link(&mut link, "librtlsdr-2.0.2/librtlsdr.so", "librtlsdr.so.0")
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

fn ubuntu_asset() -> HarvestAsset {
    HarvestAsset::from_release_asset(&GithubAsset {
        name: "librtlsdr-ubuntu-v2.0.2.tar.gz".into(),
        browser_download_url: "https://example.com/librtlsdr-ubuntu-v2.0.2.tar.gz".into(),
    })
    .unwrap()
}

fn sidecar_entry(asset: &HarvestAsset, files: Vec<rtlsdrlib_schema::BuildFile>) -> AssetMeta {
    AssetMeta {
        tag_name: "v2.0.2".into(),
        release_url: "https://example.com/releases/v2.0.2".into(),
        release_id: 99,
        created: None,
        published: None,
        asset_type: asset.build_type,
        asset_name: asset.name.clone(),
        asset_url: asset.download_url.clone(),
        metadata_matches: false,
        files_updated: true,
        build_files: files,
    }
}

#[test]
fn unpack_place_copy_package() {
    let work = tempdir().unwrap();
    let build_root = work.path().join("build_assets");
    let project_dir = work.path().join("project_lib");
    let dist_dir = work.path().join("dist");
    fs::create_dir_all(&build_root).unwrap();

    let asset = ubuntu_asset();
    assert_eq!(asset.dest_dirname().unwrap(), "ubuntu");

    // Unpack the fixture the way the extract pipeline does.
    let archive = work.path().join(&asset.download_filename);
    ubuntu_fixture_archive(&archive);
    let expanded = work.path().join("expanded");
    unpack_auto(&archive, &expanded).unwrap();
    strip_components(&expanded).unwrap();

    let dest_dir = build_root.join("ubuntu");
    let mut files = place_files(asset.build_type, &expanded, &dest_dir).unwrap();
    for f in &mut files {
        f.relativize(&build_root);
    }

    // The README was dropped, the lib and tool placed by role.
    assert!(dest_dir.join("lib/librtlsdr.so.0").is_file());
    assert!(dest_dir.join("bin/rtl_test").is_file());
    assert!(!dest_dir.join("lib/README").exists());
    assert!(files.iter().all(|f| f.filename.is_relative()));

    // Persist and rehydrate the sidecar.
    let codec = MetaCodec;
    let mut meta = BuildMeta::new();
    meta.insert(asset.name.clone(), sidecar_entry(&asset, files));
    write_build_meta(codec, &build_root, &meta, true).unwrap();
    let rehydrated = read_build_meta(codec, &build_root).unwrap();
    assert_eq!(rehydrated[&asset.name].tag_name, "v2.0.2");

    // Copy into the project tree.
    let placed = copy_builds_to_project(&build_root, &project_dir).unwrap();
    assert!(project_dir.join("librtlsdr.so.0").is_file());
    #[cfg(unix)]
    {
        assert_eq!(placed, 2);
        let link = project_dir.join("librtlsdr.so");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(
            fs::read_link(&link).unwrap(),
            PathBuf::from("librtlsdr.so.0")
        );
    }
    #[cfg(not(unix))]
    assert_eq!(placed, 1);

    // A second copy run is a no-op.
    assert_eq!(copy_builds_to_project(&build_root, &project_dir).unwrap(), 0);

    // Package the project tree; the archive carries the platform tag.
    let archive = package_project(
        &project_dir,
        &dist_dir,
        "0.1.0",
        BuildType::UBUNTU | BuildType::X86_X64,
    )
    .unwrap();
    assert_eq!(
        archive.file_name().unwrap().to_str().unwrap(),
        "rtlsdrlib-0.1.0-ubuntu_x86_x64.tar.gz"
    );
}
