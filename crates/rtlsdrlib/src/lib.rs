//! rtlsdrlib - prebuilt librtlsdr runtime support.
//!
//! Finds and loads the packaged `librtlsdr` shared library for the running
//! platform. The harvester tool (`rtlsdrlib-harvester`) fills the library
//! tree; this crate only reads it.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.rtlsdrlib/
//! ├── lib/             # Packaged libraries by {os}_{arch} directory
//! │   ├── macos_arm64/
//! │   ├── ubuntu_x86_x64/
//! │   └── windows_w64_static/
//! ├── custom_build/    # Locally built override tree, same layout
//! └── build_assets/    # Harvester working area
//! ```
//!
//! A library under `custom_build/` shadows the packaged default without any
//! configuration: the locator always checks it first unless
//! `RTLSDRLIB_NO_CUSTOM` is set.

pub mod loader;
pub mod platform;

pub use loader::{Locator, list_library_files, load_librtlsdr};
pub use platform::{AmbiguousPlatformError, PlatformError, detect_current_platform};

// Re-export the shared vocabulary so callers need only this crate.
pub use rtlsdrlib_schema::{BuildFile, BuildType, FileType, ParseError};

use std::path::PathBuf;

/// Root of the on-disk tree described in the crate docs. `RTLSDRLIB_HOME`
/// overrides the `~/.rtlsdrlib` default; None when no home directory can
/// be resolved either.
pub fn try_rtlsdrlib_home() -> Option<PathBuf> {
    std::env::var_os("RTLSDRLIB_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".rtlsdrlib")))
}

/// Like [`try_rtlsdrlib_home`], for callers with no fallback of their own.
///
/// # Panics
///
/// When no home directory exists and `RTLSDRLIB_HOME` is unset.
pub fn rtlsdrlib_home() -> PathBuf {
    try_rtlsdrlib_home().expect("no home directory and RTLSDRLIB_HOME unset")
}

/// Packaged library tree (see the crate-level layout).
pub fn lib_dir() -> PathBuf {
    rtlsdrlib_home().join("lib")
}

/// Locally built override tree (see the crate-level layout).
pub fn custom_build_dir() -> PathBuf {
    rtlsdrlib_home().join("custom_build")
}

/// Harvester working area (see the crate-level layout).
pub fn build_assets_dir() -> PathBuf {
    rtlsdrlib_home().join("build_assets")
}

/// True when `RTLSDRLIB_NO_CUSTOM` suppresses the custom-build tree.
pub fn custom_build_suppressed() -> bool {
    std::env::var("RTLSDRLIB_NO_CUSTOM")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
