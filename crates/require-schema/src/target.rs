//! Target description: which builds of a module this process can load.
//!
//! A module is built once per host release and target architecture. The
//! platform decides how its shared binary is named on disk.
//!
//! # Example
//!
//! ```
//! use require_schema::{Platform, Target};
//!
//! let target = Target::new("linux-x86_64", "Linux", "3.14.12", Platform::Posix);
//! assert_eq!(target.library_file_name("motor"), "libmotor.so");
//! assert_eq!(target.old_style_file_name("motor", Some("6.9")), "libmotor-6.9.so");
//! ```

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Platform`] name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    /// The name does not denote a supported dynamic-loading platform.
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),
}

/// Dynamic-loading convention of the running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// ELF shared objects opened with `dlopen`.
    Posix,
    /// Mach-O dynamic libraries opened with `dlopen`.
    Darwin,
    /// DLLs opened with `LoadLibrary`.
    Windows,
    /// Relocatable object files linked into a single segmented image at
    /// load time (vxWorks `ld`).
    Segmented,
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "vxworks") {
            Self::Segmented
        } else if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::Darwin
        } else {
            Self::Posix
        }
    }

    /// File name prefix of a shared binary (`lib` on unix-likes).
    pub fn lib_prefix(self) -> &'static str {
        match self {
            Self::Posix | Self::Darwin => "lib",
            Self::Windows | Self::Segmented => "",
        }
    }

    /// Infix placed between module name and version in old-style file names.
    pub fn lib_infix(self) -> &'static str {
        match self {
            Self::Segmented => "Lib",
            Self::Posix | Self::Darwin | Self::Windows => "",
        }
    }

    /// File extension of a shared binary, including the dot.
    pub fn lib_extension(self) -> &'static str {
        match self {
            Self::Posix => ".so",
            Self::Darwin => ".dylib",
            Self::Windows => ".dll",
            Self::Segmented => ".munch",
        }
    }

    /// Separator of path lists in environment variables.
    pub fn path_list_separator(self) -> char {
        match self {
            Self::Windows => ';',
            Self::Posix | Self::Darwin | Self::Segmented => ':',
        }
    }

    /// Class of operating system, used to pick OS-specific startup scripts.
    pub fn os_class(self) -> &'static str {
        match self {
            Self::Posix => "Linux",
            Self::Darwin => "Darwin",
            Self::Windows => "WIN32",
            Self::Segmented => "vxWorks",
        }
    }

    /// Convert to string representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Posix => "posix",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
            Self::Segmented => "segmented",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "posix" | "linux" | "unix" => Ok(Self::Posix),
            "darwin" | "macos" => Ok(Self::Darwin),
            "windows" | "win32" => Ok(Self::Windows),
            "segmented" | "vxworks" => Ok(Self::Segmented),
            _ => Err(TargetError::UnknownPlatform(s.to_string())),
        }
    }
}

/// The build flavour this process loads: host release, target architecture
/// and platform naming rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Target architecture directory name (e.g. `linux-x86_64`).
    pub arch: String,
    /// OS class used for startup script selection (e.g. `Linux`).
    pub os_class: String,
    /// Host release the module must have been built against (e.g. `3.14.12`).
    pub host_release: String,
    /// Naming and loading convention.
    pub platform: Platform,
}

impl Target {
    /// Build a target description from its parts.
    pub fn new(
        arch: impl Into<String>,
        os_class: impl Into<String>,
        host_release: impl Into<String>,
        platform: Platform,
    ) -> Self {
        Self {
            arch: arch.into(),
            os_class: os_class.into(),
            host_release: host_release.into(),
            platform,
        }
    }

    /// The target of the running process for a given host release.
    pub fn current(host_release: impl Into<String>) -> Self {
        let platform = Platform::current();
        Self::new(default_arch(), platform.os_class(), host_release, platform)
    }

    /// Release directory name inside a version directory (`R3.14.12`).
    pub fn release_dir(&self) -> String {
        format!("R{}", self.host_release)
    }

    /// New-style shared binary name: `<prefix><module><ext>`.
    pub fn library_file_name(&self, module: &str) -> String {
        format!(
            "{}{module}{}",
            self.platform.lib_prefix(),
            self.platform.lib_extension()
        )
    }

    /// Old-style flat file name: `<prefix><module><infix>[-<version>]<ext>`.
    pub fn old_style_file_name(&self, module: &str, version: Option<&str>) -> String {
        let suffix = version.map(|v| format!("-{v}")).unwrap_or_default();
        format!(
            "{}{module}{}{suffix}{}",
            self.platform.lib_prefix(),
            self.platform.lib_infix(),
            self.platform.lib_extension()
        )
    }

    /// Extract the version from an old-style file name, if it names `module`.
    ///
    /// Returns `Some("")` for the unversioned form.
    pub fn old_style_version<'a>(&self, module: &str, file_name: &'a str) -> Option<&'a str> {
        let rest = file_name
            .strip_prefix(self.platform.lib_prefix())?
            .strip_prefix(module)?
            .strip_prefix(self.platform.lib_infix())?
            .strip_suffix(self.platform.lib_extension())?;
        if rest.is_empty() {
            return Some("");
        }
        rest.strip_prefix('-').filter(|v| !v.is_empty())
    }
}

/// Architecture directory name for the compile target, in the
/// `<os>-<cpu>` form used by module install trees.
pub fn default_arch() -> String {
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "windows",
        "vxworks" => "vxWorks",
        other => other,
    };
    let cpu = match std::env::consts::ARCH {
        "x86_64" if os == "windows" => "x64",
        "x86" => "x86",
        "powerpc" => "ppc604",
        other => other,
    };
    format!("{os}-{cpu}")
}
