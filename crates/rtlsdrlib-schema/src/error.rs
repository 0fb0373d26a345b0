//! Domain-specific errors for the shared schema types.

use thiserror::Error;

/// A string token could not be mapped into the closed flag vocabulary.
///
/// The vocabularies here are fixed at development time, so a bad token is
/// surfaced immediately rather than coerced to a sentinel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A token in a pipe-delimited build type string is not a known flag.
    #[error("Unknown build type token: {0:?}")]
    BuildType(String),

    /// A file type string is not one of `bin`, `lib`, `other`.
    #[error("Unknown file type: {0:?}")]
    FileType(String),

    /// A machine identifier string has no corresponding architecture flag.
    #[error("Unrecognized machine identifier: {0:?}")]
    Machine(String),
}

/// A [`BuildFile`](crate::BuildFile)'s declared build type does not
/// intersect the type expected by its container.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Build type {found:?} does not match expected {expected:?} for {filename:?}")]
pub struct IncompatibleTypeError {
    /// The type the container expects its files to carry.
    pub expected: String,
    /// The type found on the offending file.
    pub found: String,
    /// The offending file.
    pub filename: String,
}
