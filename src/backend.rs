//! Audio player discovery.
//!
//! Playback is delegated to an external program. Which one depends on the
//! platform and on what is installed, so the first usable candidate is
//! found once and remembered by a [`BackendCache`].

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// An external program that plays one audio file to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBackend {
    /// Name used in error messages
    pub name: String,
    /// Program to run, looked up on `PATH` unless it contains a separator
    pub binary: String,
    /// Arguments placed between the program and the file path
    pub args: Vec<String>,
}

impl AudioBackend {
    pub fn new(name: &str, binary: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            binary: binary.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// macOS built-in player
    pub fn afplay() -> Self {
        Self::new("afplay", "afplay", &[])
    }

    /// ffmpeg's player, kept headless and quiet
    pub fn ffplay() -> Self {
        Self::new(
            "ffplay",
            "ffplay",
            &["-nodisp", "-autoexit", "-nostdin", "-loglevel", "quiet"],
        )
    }

    /// Full argument list for playing `file`, the file path last
    pub fn command_args(&self, file: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        args.push(file.as_os_str().to_owned());
        args
    }

    /// Whether the program can be found
    pub fn is_installed(&self) -> bool {
        find_executable(&self.binary).is_some()
    }
}

/// Players to try, in order of preference, on this platform
pub fn platform_candidates() -> Vec<AudioBackend> {
    if cfg!(target_os = "macos") {
        vec![AudioBackend::afplay(), AudioBackend::ffplay()]
    } else {
        vec![AudioBackend::ffplay()]
    }
}

/// What to tell the user when no player is installed
pub fn unavailable_message() -> &'static str {
    if cfg!(target_os = "macos") {
        "No supported audio player found (need afplay or ffplay)"
    } else if cfg!(windows) {
        "No supported audio player found (install ffmpeg and add ffplay to PATH)"
    } else if cfg!(target_os = "linux") {
        "No supported audio player found (install ffmpeg for ffplay)"
    } else {
        "No supported audio player found (need ffplay on PATH)"
    }
}

/// Locate an executable the way a shell would
///
/// A name containing a path separator is checked as given; anything else is
/// searched for in each `PATH` entry.
pub fn find_executable(binary: &str) -> Option<PathBuf> {
    if binary.is_empty() {
        return None;
    }
    let candidate = Path::new(binary);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let paths = env::var_os("PATH")?;
    env::split_paths(&paths).find_map(|dir| {
        let full = dir.join(binary);
        if is_executable(&full) {
            return Some(full);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{binary}.exe"));
            if is_executable(&exe) {
                return Some(exe);
            }
        }
        None
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Remembers which audio player is usable
///
/// Detection runs on first use; [`reset`](Self::reset) forgets the result so
/// a player installed later is picked up.
#[derive(Debug)]
pub struct BackendCache {
    candidates: Vec<AudioBackend>,
    detected: Mutex<Option<Option<AudioBackend>>>,
}

impl Default for BackendCache {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendCache {
    /// Cache over the platform's usual players
    pub fn new() -> Self {
        Self::with_candidates(platform_candidates())
    }

    /// Cache over a custom candidate list, tried in order
    pub fn with_candidates(candidates: Vec<AudioBackend>) -> Self {
        Self {
            candidates,
            detected: Mutex::new(None),
        }
    }

    /// First installed candidate, detected once and then remembered
    pub fn detect(&self) -> Option<AudioBackend> {
        let mut detected = match self.detected.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(cached) = detected.as_ref() {
            return cached.clone();
        }

        let found = self.candidates.iter().find(|b| b.is_installed()).cloned();
        match &found {
            Some(backend) => log::debug!("Using audio backend {}", backend.name),
            None => log::debug!("No audio backend found"),
        }
        *detected = Some(found.clone());
        found
    }

    pub fn is_available(&self) -> bool {
        self.detect().is_some()
    }

    /// Remediation hint, or an empty string when a player is available
    pub fn unavailable_message(&self) -> String {
        if self.is_available() {
            String::new()
        } else {
            unavailable_message().to_string()
        }
    }

    /// Forget the detection result
    pub fn reset(&self) {
        let mut detected = match self.detected.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *detected = None;
    }
}
