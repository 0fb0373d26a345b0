//! Build type taxonomy.
//!
//! A [`BuildType`] is an order-independent set of named flags describing one
//! axis of platform identity: operating system, architecture, and (for
//! Windows builds) linkage variant. Values compose with `|` and serialize to
//! a pipe-delimited string (`"windows|w64|static"`). The string form is
//! round-trip stable: flags are enumerated in fixed declaration order.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

bitflags! {
    /// Platform/architecture/linkage tags for a distributed binary.
    ///
    /// `UNKNOWN` is an explicit sentinel: it can be named and parsed, but a
    /// composed value never keeps it once any real flag is set.
    /// `ALL_OS` and `ALL_ARCHS` are filter conveniences, never stored as a
    /// file's real classification.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(transparent)]
    pub struct BuildType: u16 {
        /// Sentinel for an unclassified value.
        const UNKNOWN    = 1 << 0;
        /// macOS build.
        const MACOS      = 1 << 1;
        /// Windows build.
        const WINDOWS    = 1 << 2;
        /// Ubuntu (Linux) build.
        const UBUNTU     = 1 << 3;
        /// Source archive, not a binary build.
        const SOURCE     = 1 << 4;
        /// 32-bit Windows.
        const W32        = 1 << 5;
        /// 64-bit Windows.
        const W64        = 1 << 6;
        /// Windows build linked against external DLL dependencies.
        const DLLDEP     = 1 << 7;
        /// Statically linked Windows build.
        const STATIC     = 1 << 8;
        /// Windows build bundling the UDP server tool.
        const UDPSRV     = 1 << 9;
        /// `x86_64` architecture.
        const X86_X64    = 1 << 10;
        /// 32-bit x86 architecture.
        const I686       = 1 << 11;
        /// AArch64 (Linux naming).
        const AARCH64    = 1 << 12;
        /// ARM64 (macOS naming).
        const ARM64      = 1 << 13;
        /// macOS universal2 (fat) binary.
        const UNIVERSAL2 = 1 << 14;

        /// Every OS flag. Filtering aggregate only.
        const ALL_OS = Self::MACOS.bits() | Self::WINDOWS.bits() | Self::UBUNTU.bits();
        /// Every architecture flag. Filtering aggregate only.
        const ALL_ARCHS = Self::W32.bits()
            | Self::W64.bits()
            | Self::X86_X64.bits()
            | Self::I686.bits()
            | Self::AARCH64.bits()
            | Self::ARM64.bits()
            | Self::UNIVERSAL2.bits();
    }
}

/// Named non-aggregate flags in declaration order. Drives iteration and the
/// multi-flag string form; `UNKNOWN` and the aggregates are excluded.
const NAMED: &[(BuildType, &str)] = &[
    (BuildType::MACOS, "macos"),
    (BuildType::WINDOWS, "windows"),
    (BuildType::UBUNTU, "ubuntu"),
    (BuildType::SOURCE, "source"),
    (BuildType::W32, "w32"),
    (BuildType::W64, "w64"),
    (BuildType::DLLDEP, "dlldep"),
    (BuildType::STATIC, "static"),
    (BuildType::UDPSRV, "udpsrv"),
    (BuildType::X86_X64, "x86_x64"),
    (BuildType::I686, "i686"),
    (BuildType::AARCH64, "aarch64"),
    (BuildType::ARM64, "arm64"),
    (BuildType::UNIVERSAL2, "universal2"),
];

/// Full parse vocabulary: named flags plus sentinel and aggregates.
const VOCABULARY: &[(BuildType, &str)] = &[
    (BuildType::UNKNOWN, "unknown"),
    (BuildType::MACOS, "macos"),
    (BuildType::WINDOWS, "windows"),
    (BuildType::UBUNTU, "ubuntu"),
    (BuildType::SOURCE, "source"),
    (BuildType::W32, "w32"),
    (BuildType::W64, "w64"),
    (BuildType::DLLDEP, "dlldep"),
    (BuildType::STATIC, "static"),
    (BuildType::UDPSRV, "udpsrv"),
    (BuildType::X86_X64, "x86_x64"),
    (BuildType::I686, "i686"),
    (BuildType::AARCH64, "aarch64"),
    (BuildType::ARM64, "arm64"),
    (BuildType::UNIVERSAL2, "universal2"),
    (BuildType::ALL_OS, "all_os"),
    (BuildType::ALL_ARCHS, "all_archs"),
];

impl BuildType {
    /// Parse a single flag name or a pipe-delimited composition.
    ///
    /// Composition is the OR of the parsed tokens. The `unknown` sentinel is
    /// normalized away once any real flag is present, so
    /// `"unknown|windows"` parses to just `windows`.
    ///
    /// # Errors
    ///
    /// [`ParseError::BuildType`] if any token is not in the vocabulary.
    pub fn from_str(s: &str) -> Result<Self, ParseError> {
        if s.contains('|') {
            let mut result = Self::UNKNOWN;
            for token in s.split('|') {
                result |= Self::from_str(token)?;
            }
            if result != Self::UNKNOWN {
                result.remove(Self::UNKNOWN);
            }
            return Ok(result);
        }
        let token = s.trim().to_lowercase();
        VOCABULARY
            .iter()
            .find(|(_, name)| *name == token)
            .map(|(flag, _)| *flag)
            .ok_or(ParseError::BuildType(token))
    }

    /// Serialize to the canonical string form.
    ///
    /// A value equal to exactly one vocabulary entry returns that name
    /// (including `unknown` and the aggregates). Anything else pipe-joins
    /// the named non-aggregate constituents in declaration order. An empty
    /// value yields the empty string.
    pub fn to_str(self) -> String {
        if let Some((_, name)) = VOCABULARY.iter().find(|(flag, _)| *flag == self) {
            return (*name).to_string();
        }
        self.members()
            .map(|flag| flag.to_str())
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Named non-aggregate flags present in this value, declaration order.
    pub fn members(self) -> impl Iterator<Item = BuildType> {
        NAMED
            .iter()
            .filter(move |(flag, _)| self.intersects(*flag))
            .map(|(flag, _)| *flag)
    }

    /// Asymmetric compatibility test between a concrete build's type and a
    /// filter/request type.
    ///
    /// When both sides are Windows builds they must agree on architecture
    /// (`w32` xor `w64`), linkage (`dlldep` xor `static`), and the presence
    /// of `udpsrv`. Everything else is a plain non-empty intersection.
    /// Always use this (not raw intersection) when matching Windows
    /// variants: `windows|w64|static` must not match `windows|w64|dlldep`.
    pub fn matches(self, other: Self) -> bool {
        if self.is_windows() && other.is_windows() {
            let arch = self & (Self::W32 | Self::W64);
            if !other.intersects(arch) {
                return false;
            }
            let linkage = self & (Self::DLLDEP | Self::STATIC);
            if !other.intersects(linkage) {
                return false;
            }
            if (self & Self::UDPSRV) != (other & Self::UDPSRV) {
                return false;
            }
            return true;
        }
        self.intersects(other)
    }

    /// Strip OS, `source`, and architecture flags, leaving only option
    /// flags (linkage and `udpsrv`). Set subtraction, so idempotent.
    pub fn filter_options(self) -> Self {
        self.difference(Self::ALL_OS | Self::SOURCE | Self::ALL_ARCHS | Self::UNKNOWN)
    }

    /// Project onto the OS sub-vocabulary.
    pub fn filter_os(self) -> Self {
        self & Self::ALL_OS
    }

    /// Project onto the architecture sub-vocabulary.
    pub fn filter_archs(self) -> Self {
        self & Self::ALL_ARCHS
    }

    /// True when the value carries the Windows OS flag.
    pub const fn is_windows(self) -> bool {
        self.intersects(Self::WINDOWS)
    }

    /// True when the value carries the macOS OS flag.
    pub const fn is_macos(self) -> bool {
        self.intersects(Self::MACOS)
    }

    /// True when the value carries the Ubuntu OS flag.
    pub const fn is_ubuntu(self) -> bool {
        self.intersects(Self::UBUNTU)
    }

    /// True when the value tags a source archive.
    pub const fn is_source(self) -> bool {
        self.intersects(Self::SOURCE)
    }
}

impl Default for BuildType {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl std::fmt::Display for BuildType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl std::str::FromStr for BuildType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str(s)
    }
}

impl Serialize for BuildType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_str().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BuildType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
