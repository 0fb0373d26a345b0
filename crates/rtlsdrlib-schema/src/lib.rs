//! Shared types and sidecar wire format for rtlsdrlib.
//!
//! This crate holds the vocabulary shared between the runtime loader and the
//! release harvester: the [`BuildType`] flag set describing platform,
//! architecture, and linkage variants of a distributed binary, the
//! [`BuildFile`] record describing one placed file, and the tagged JSON
//! codec used for the `build-meta.json` sidecar.

pub mod build_file;
pub mod build_type;
pub mod error;
pub mod meta;

// Re-exports
pub use build_file::{BuildFile, FileType};
pub use build_type::BuildType;
pub use error::{IncompatibleTypeError, ParseError};
pub use meta::{AssetMeta, BuildMeta, MetaCodec, MetaError};

/// Timestamp pattern used everywhere in the sidecar document.
pub const DT_FMT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Conventional sidecar filename placed at the root of each classified
/// build directory and at the project library directory.
pub const META_FILENAME: &str = "build-meta.json";
