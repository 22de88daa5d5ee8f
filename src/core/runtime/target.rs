use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::core::error::{RuntimeError, RuntimeResult};

/// Platform + architecture tag used to pick a runtime bundle and its URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuntimeTarget {
    #[serde(rename = "win-x64")]
    Windows64,
    #[serde(rename = "linux-x64")]
    LinuxX64,
    #[serde(rename = "linux-arm64")]
    LinuxArm64,
    #[serde(rename = "osx-x64")]
    OSX64,
    #[serde(rename = "unsupported")]
    Unsupported,
}

/// Directory layout family a target's bundle follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformFamily {
    Unix,
    Windows,
}

static CURRENT_TARGET: OnceLock<RuntimeTarget> = OnceLock::new();

impl RuntimeTarget {
    pub const SUPPORTED: [RuntimeTarget; 4] = [
        RuntimeTarget::Windows64,
        RuntimeTarget::LinuxX64,
        RuntimeTarget::LinuxArm64,
        RuntimeTarget::OSX64,
    ];

    /// Target of the running process. Computed once, then cached.
    pub fn current() -> RuntimeTarget {
        *CURRENT_TARGET.get_or_init(|| {
            Self::detect(
                std::env::consts::OS,
                std::env::consts::ARCH,
                usize::BITS,
            )
        })
    }

    /// Maps an OS / architecture / pointer width triple onto a target.
    pub fn detect(os: &str, arch: &str, pointer_width: u32) -> RuntimeTarget {
        if pointer_width != 64 {
            return RuntimeTarget::Unsupported;
        }

        match os {
            "windows" => RuntimeTarget::Windows64,
            "macos" => RuntimeTarget::OSX64,
            "linux" if arch == "aarch64" => RuntimeTarget::LinuxArm64,
            "linux" => RuntimeTarget::LinuxX64,
            _ => RuntimeTarget::Unsupported,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeTarget::Windows64 => "win-x64",
            RuntimeTarget::LinuxX64 => "linux-x64",
            RuntimeTarget::LinuxArm64 => "linux-arm64",
            RuntimeTarget::OSX64 => "osx-x64",
            RuntimeTarget::Unsupported => "unsupported",
        }
    }

    pub fn is_supported(self) -> bool {
        self != RuntimeTarget::Unsupported
    }

    /// Fails with `UnsupportedTarget` for `Unsupported`.
    pub fn require_supported(self) -> RuntimeResult<RuntimeTarget> {
        if self.is_supported() {
            Ok(self)
        } else {
            Err(RuntimeError::UnsupportedTarget(self.as_str().to_string()))
        }
    }

    pub fn family(self) -> Option<PlatformFamily> {
        match self {
            RuntimeTarget::Windows64 => Some(PlatformFamily::Windows),
            RuntimeTarget::LinuxX64 | RuntimeTarget::LinuxArm64 | RuntimeTarget::OSX64 => {
                Some(PlatformFamily::Unix)
            }
            RuntimeTarget::Unsupported => None,
        }
    }
}

impl fmt::Display for RuntimeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeTarget {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "win-x64" => Ok(RuntimeTarget::Windows64),
            "linux-x64" => Ok(RuntimeTarget::LinuxX64),
            "linux-arm64" => Ok(RuntimeTarget::LinuxArm64),
            "osx-x64" => Ok(RuntimeTarget::OSX64),
            other => Err(RuntimeError::UnsupportedTarget(other.to_string())),
        }
    }
}
