//! Platform detection for runtime provisioning
//!
//! Derives the OS class and processor architecture from an environment
//! signature (by default `std::env::consts`), plus static per-OS facts:
//! requirements, install instructions, download location, display name.

use log::debug;
use once_cell::sync::OnceCell;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OsClass {
    Windows,
    MacOs,
    Linux,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchClass {
    X64,
    Arm64,
    Unknown,
}

/// Minimum host requirements, as human-readable strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirements {
    pub min_ram: &'static str,
    pub min_storage: &'static str,
    pub min_cpu: &'static str,
}

/// Immutable description of the detected environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformProfile {
    pub os: OsClass,
    pub arch: ArchClass,
    pub signature: String,
    pub supported: bool,
    pub requirements: Requirements,
}

// Checked in order; first hit wins.
const OS_TOKENS: &[(OsClass, &[&str])] = &[
    (OsClass::Windows, &["windows", "win32", "win64"]),
    (OsClass::MacOs, &["macos", "mac os", "darwin", "macintosh"]),
    (OsClass::Linux, &["linux"]),
];

const ARM64_TOKENS: &[&str] = &["aarch64", "arm64"];
const X64_TOKENS: &[&str] = &["x86_64", "amd64", "x64", "win64"];
const LEGACY_ARCH_TOKENS: &[&str] = &["i386", "i686", "armv7", "powerpc", "riscv"];

/// Memoizing detector over one environment signature
#[derive(Debug, Default)]
pub struct PlatformDetector {
    signature: Option<String>,
    cached: OnceCell<PlatformProfile>,
}

impl PlatformDetector {
    /// Detector over the compiled-in target (`os arch family`)
    pub fn new() -> Self {
        Self::default()
    }

    /// Detector over an explicit signature string
    pub fn with_signature(signature: impl Into<String>) -> Self {
        Self {
            signature: Some(signature.into()),
            cached: OnceCell::new(),
        }
    }

    /// Detect the platform (memoized after the first call)
    pub fn detect(&self) -> PlatformProfile {
        self.cached
            .get_or_init(|| {
                let signature = self.signature.clone().unwrap_or_else(host_signature);
                let profile = profile_from_signature(&signature);
                debug!(
                    "Detected platform {:?}/{:?} from signature {:?}",
                    profile.os, profile.arch, profile.signature
                );
                profile
            })
            .clone()
    }

    /// Drop the memoized profile
    pub fn reset(&mut self) {
        self.cached = OnceCell::new();
    }
}

/// Signature of the running host
pub fn host_signature() -> String {
    format!(
        "{} {} {}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        std::env::consts::FAMILY
    )
}

/// Pure derivation used by the detector
pub fn profile_from_signature(signature: &str) -> PlatformProfile {
    let os = detect_os(signature);
    PlatformProfile {
        os,
        arch: detect_arch(signature),
        signature: signature.to_string(),
        supported: os != OsClass::Unknown,
        requirements: requirements(os),
    }
}

fn detect_os(signature: &str) -> OsClass {
    let lower = signature.to_lowercase();
    OS_TOKENS
        .iter()
        .find(|(_, tokens)| tokens.iter().any(|t| lower.contains(t)))
        .map(|(os, _)| *os)
        .unwrap_or(OsClass::Unknown)
}

fn detect_arch(signature: &str) -> ArchClass {
    let lower = signature.to_lowercase();
    let has = |tokens: &[&str]| tokens.iter().any(|t| lower.contains(t));

    if has(ARM64_TOKENS) {
        ArchClass::Arm64
    } else if has(X64_TOKENS) {
        ArchClass::X64
    } else if has(LEGACY_ARCH_TOKENS) {
        ArchClass::Unknown
    } else {
        // No explicit signal: assume x64, the installer agent re-validates.
        ArchClass::X64
    }
}

pub fn requirements(os: OsClass) -> Requirements {
    match os {
        OsClass::Windows => Requirements {
            min_ram: "8 GB RAM",
            min_storage: "10 GB free disk space",
            min_cpu: "64-bit processor with AVX support, Windows 10 22H2 or newer",
        },
        OsClass::MacOs => Requirements {
            min_ram: "8 GB unified memory",
            min_storage: "10 GB free disk space",
            min_cpu: "Apple Silicon or Intel processor, macOS 12 Monterey or newer",
        },
        OsClass::Linux => Requirements {
            min_ram: "8 GB RAM",
            min_storage: "10 GB free disk space",
            min_cpu: "64-bit processor with AVX support, glibc-based distribution",
        },
        OsClass::Unknown => Requirements {
            min_ram: "8 GB RAM",
            min_storage: "10 GB free disk space",
            min_cpu: "Modern 64-bit processor",
        },
    }
}

pub fn install_instructions(os: OsClass) -> Vec<&'static str> {
    match os {
        OsClass::Windows => vec![
            "Download OllamaSetup.exe",
            "Run the installer and follow the prompts",
            "Ollama starts automatically in the system tray",
            "Open a terminal and run `ollama --version` to confirm",
        ],
        OsClass::MacOs => vec![
            "Download the Ollama archive for macOS",
            "Unzip it and move Ollama.app to Applications",
            "Launch Ollama and allow the command-line helper to install",
            "Open Terminal and run `ollama --version` to confirm",
        ],
        OsClass::Linux => vec![
            "Run `curl -fsSL https://ollama.com/install.sh | sh`",
            "The script installs the binary and an `ollama` systemd unit",
            "Start the service with `sudo systemctl start ollama`",
            "Run `ollama --version` to confirm",
        ],
        OsClass::Unknown => vec![
            "Visit https://ollama.com/download",
            "Pick the build for your operating system",
            "Follow the instructions shown on the download page",
        ],
    }
}

pub fn download_url(os: OsClass) -> &'static str {
    match os {
        OsClass::Windows => "https://ollama.com/download/OllamaSetup.exe",
        OsClass::MacOs => "https://ollama.com/download/Ollama-darwin.zip",
        OsClass::Linux => "https://ollama.com/install.sh",
        OsClass::Unknown => "https://ollama.com/download",
    }
}

pub fn display_name(os: OsClass) -> &'static str {
    match os {
        OsClass::Windows => "Windows",
        OsClass::MacOs => "macOS",
        OsClass::Linux => "Linux",
        OsClass::Unknown => "Unknown platform",
    }
}

pub fn icon(os: OsClass) -> &'static str {
    match os {
        OsClass::Windows => "🪟",
        OsClass::MacOs => "🍎",
        OsClass::Linux => "🐧",
        OsClass::Unknown => "💻",
    }
}
