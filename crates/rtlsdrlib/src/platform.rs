//! Platform probe: maps the running OS and CPU to a [`BuildType`].

use rtlsdrlib_schema::{BuildType, ParseError};
use thiserror::Error;

/// Reduction yielded zero or multiple flags where exactly one is required.
///
/// This is a caller/config bug, not a recoverable condition: a build type
/// handed to the locator must name one platform.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Ambiguous platform: expected exactly one {kind} flag, got {found:?}")]
pub struct AmbiguousPlatformError {
    /// Which axis was ambiguous (`os` or `arch`).
    pub kind: &'static str,
    /// String form of the offending reduced value.
    pub found: String,
}

/// Probe and locator failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// A machine identifier or override token failed to parse.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The reduced build type does not name exactly one OS and one arch.
    #[error(transparent)]
    Ambiguous(#[from] AmbiguousPlatformError),
}

/// Map a raw machine-identifier string to an architecture flag.
///
/// The vocabulary expects values formatted to match the flag names; an
/// unrecognized machine string is a hard failure, never a silent `unknown`.
///
/// # Errors
///
/// [`ParseError::Machine`] for identifiers outside the vocabulary.
pub fn machine_arch(machine: &str) -> Result<BuildType, ParseError> {
    match machine.to_lowercase().as_str() {
        "x86_64" | "amd64" | "x86_x64" => Ok(BuildType::X86_X64),
        "i686" | "i386" | "x86" => Ok(BuildType::I686),
        "aarch64" => Ok(BuildType::AARCH64),
        "arm64" => Ok(BuildType::ARM64),
        "universal2" => Ok(BuildType::UNIVERSAL2),
        other => Err(ParseError::Machine(other.to_string())),
    }
}

/// Detect the running platform as a [`BuildType`].
///
/// Combines exactly one OS flag with an architecture flag: Windows gets
/// `w32`/`w64` from pointer width, Linux and macOS get a flag parsed from
/// the machine identifier. An unrecognized OS yields `unknown`.
///
/// Environment overrides take precedence over autodetection:
/// `RTLSDRLIB_PLATFORM` replaces the probed value wholesale (any build type
/// string, e.g. `windows|w64`), and `RTLSDRLIB_ARCHITECTURE` replaces the
/// machine identifier.
///
/// # Errors
///
/// [`ParseError`] for an unrecognized machine identifier or override token.
pub fn detect_current_platform() -> Result<BuildType, ParseError> {
    if let Ok(spec) = std::env::var("RTLSDRLIB_PLATFORM") {
        let mut t = BuildType::from_str(&spec)?;
        if t.filter_archs().is_empty() {
            if let Ok(machine) = std::env::var("RTLSDRLIB_ARCHITECTURE") {
                t |= machine_arch(&machine)?;
            }
        }
        return Ok(t);
    }

    let machine = std::env::var("RTLSDRLIB_ARCHITECTURE")
        .unwrap_or_else(|_| std::env::consts::ARCH.to_string());

    match std::env::consts::OS {
        "linux" => Ok(BuildType::UBUNTU | machine_arch(&machine)?),
        "macos" => Ok(BuildType::MACOS | machine_arch(&machine)?),
        "windows" => {
            let arch = if cfg!(target_pointer_width = "64") {
                BuildType::W64
            } else {
                BuildType::W32
            };
            Ok(BuildType::WINDOWS | arch)
        }
        _ => Ok(BuildType::UNKNOWN),
    }
}

/// Architecture-qualified directory name for a build type: `{os}_{arch}`,
/// with Windows appending the remaining option flags (linkage, `udpsrv`) in
/// declared bit order.
///
/// OS or arch flags missing from `build_type` fall back to the locally
/// probed platform.
///
/// # Errors
///
/// [`AmbiguousPlatformError`] when the reduction yields zero or more than
/// one OS or arch flag; [`ParseError`] if the local probe itself fails.
pub fn os_arch_dirname(build_type: BuildType) -> Result<String, PlatformError> {
    let mut os_type = build_type.filter_os();
    let mut arch_type = build_type.filter_archs();

    if os_type.is_empty() || arch_type.is_empty() {
        let local = detect_current_platform()?;
        if os_type.is_empty() {
            os_type = local.filter_os();
        }
        if arch_type.is_empty() {
            arch_type = local.filter_archs();
        }
    }

    if os_type.members().count() != 1 {
        return Err(AmbiguousPlatformError {
            kind: "os",
            found: os_type.to_str(),
        }
        .into());
    }
    if arch_type.members().count() != 1 {
        return Err(AmbiguousPlatformError {
            kind: "arch",
            found: arch_type.to_str(),
        }
        .into());
    }

    let mut dirname = format!("{}_{}", os_type.to_str(), arch_type.to_str());
    if os_type.is_windows() {
        for opt in build_type.filter_options().members() {
            dirname.push('_');
            dirname.push_str(&opt.to_str());
        }
    }
    Ok(dirname)
}
