//! rtlsdrlib-harvester - fetches, classifies, and places prebuilt
//! `librtlsdr` binaries from upstream release artifacts.
//!
//! Pipeline: fetch the latest upstream release, classify each asset into a
//! [`BuildType`](rtlsdrlib_schema::BuildType), download and unpack it,
//! sort the contents into `bin/`/`lib/` destination directories (rebuilding
//! symlinks with relative targets), then copy changed libraries into the
//! project tree. A `build-meta.json` sidecar records provenance so
//! unchanged releases are not re-fetched.
//!
//! Everything runs sequentially: one asset start-to-finish before the next.

pub mod asset;
pub mod download;
pub mod extract;
pub mod github;
pub mod harvest;
pub mod meta;
pub mod package;
pub mod source;

pub use asset::HarvestAsset;
pub use harvest::{copy_builds_to_project, extract_release};
pub use source::build_from_source;

/// Upstream repository the binaries come from.
pub const REPO_NAME: &str = "librtlsdr/librtlsdr";

/// Default build type filter for a harvest run.
pub const BUILD_DEFAULT: &str = "all_os|w32|w64|x86_x64|static";
