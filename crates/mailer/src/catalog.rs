//! Profile catalog - discovery of installed browsers' real user profiles.
//!
//! The catalog is read-only: it scans the platform's well-known profile
//! roots on every query (no caching, so profiles created or deleted on the
//! host show up immediately) and never writes to or locks anything it finds.
//! Internal/system profiles cannot log in under automation and are filtered
//! out; a synthetic "Default" entry is always offered first.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MailerError, Result};

/// The two supported browser families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserKind {
    Chrome,
    Firefox,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chrome => "chrome",
            BrowserKind::Firefox => "firefox",
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discoverable profile. The synthetic default carries the path the
/// browser itself would use when launched without a profile argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub browser: BrowserKind,
    pub is_default: bool,
}

/// Directory names that must never be offered as a profile choice.
const EXCLUDED_PROFILES: &[&str] = &[
    "System Profile",
    "Guest Profile",
    "Automation Profile",
    "AutomationProfile",
];

/// The platform profile root for a browser family, if the convention for
/// this OS is known. The directory itself may not exist.
pub fn profile_root(kind: BrowserKind) -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    match kind {
        BrowserKind::Chrome => {
            if cfg!(target_os = "linux") {
                Some(home.join(".config").join("google-chrome"))
            } else if cfg!(target_os = "windows") {
                Some(
                    home.join("AppData")
                        .join("Local")
                        .join("Google")
                        .join("Chrome")
                        .join("User Data"),
                )
            } else if cfg!(target_os = "macos") {
                Some(
                    home.join("Library")
                        .join("Application Support")
                        .join("Google")
                        .join("Chrome"),
                )
            } else {
                None
            }
        }
        BrowserKind::Firefox => {
            if cfg!(target_os = "linux") {
                Some(home.join(".mozilla").join("firefox"))
            } else if cfg!(target_os = "windows") {
                Some(
                    home.join("AppData")
                        .join("Roaming")
                        .join("Mozilla")
                        .join("Firefox")
                        .join("Profiles"),
                )
            } else if cfg!(target_os = "macos") {
                Some(
                    home.join("Library")
                        .join("Application Support")
                        .join("Firefox")
                        .join("Profiles"),
                )
            } else {
                None
            }
        }
    }
}

/// All profiles for a browser family. Recomputed on every call; the
/// synthetic default is always present, exactly once, first.
pub fn list_profiles(kind: BrowserKind) -> Vec<ProfileDescriptor> {
    let root = profile_root(kind);
    let mut profiles = vec![synthetic_default(kind, root.as_deref())];

    if let Some(root) = root {
        let discovered = match kind {
            BrowserKind::Chrome => scan_chrome_profiles(&root),
            BrowserKind::Firefox => scan_firefox_profiles(&root),
        };
        profiles.extend(discovered);
    }

    tracing::debug!(
        browser = %kind,
        count = profiles.len(),
        "profile catalog scan complete"
    );
    profiles
}

/// Resolve a profile by name; an empty name means the synthetic default.
pub fn find_profile(kind: BrowserKind, name: &str) -> Result<ProfileDescriptor> {
    let profiles = list_profiles(kind);
    if name.is_empty() || name == "Default" {
        // First entry is always the synthetic default.
        return Ok(profiles.into_iter().next().unwrap_or_else(|| {
            synthetic_default(kind, None)
        }));
    }
    profiles
        .into_iter()
        .find(|p| p.name == name)
        .ok_or_else(|| {
            MailerError::InvalidConfiguration(format!(
                "profile {name:?} not found for browser {kind}"
            ))
        })
}

fn synthetic_default(kind: BrowserKind, root: Option<&Path>) -> ProfileDescriptor {
    let path = match (kind, root) {
        (BrowserKind::Chrome, Some(root)) => root.join("Default"),
        (_, Some(root)) => root.to_path_buf(),
        (_, None) => PathBuf::new(),
    };
    ProfileDescriptor {
        name: "Default".to_string(),
        path,
        browser: kind,
        is_default: true,
    }
}

fn is_excluded(name: &str) -> bool {
    EXCLUDED_PROFILES.contains(&name) || name.contains("-automation-")
}

/// Chrome: profile directories live directly under the user-data dir and
/// carry a `Preferences` file. The real `Default` directory is folded into
/// the synthetic entry rather than listed twice.
fn scan_chrome_profiles(root: &Path) -> Vec<ProfileDescriptor> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(root = %root.display(), "chrome profile root not readable: {e}");
            return Vec::new();
        }
    };

    let mut profiles = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == "Default" || is_excluded(&name) {
            continue;
        }
        if !path.join("Preferences").is_file() {
            continue;
        }
        profiles.push(ProfileDescriptor {
            name,
            path,
            browser: BrowserKind::Chrome,
            is_default: false,
        });
    }
    profiles
}

/// Firefox: profiles are declared in `profiles.ini`; the directory is only
/// accepted if it actually looks like a profile (prefs.js or user.js).
fn scan_firefox_profiles(root: &Path) -> Vec<ProfileDescriptor> {
    let ini = match fs::read_to_string(root.join("profiles.ini")) {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!(root = %root.display(), "no readable profiles.ini: {e}");
            return Vec::new();
        }
    };

    let mut profiles = Vec::new();
    for section in ini.split('[').skip(1) {
        let mut name = None;
        let mut rel_path = None;
        let mut is_relative = true;
        for line in section.lines() {
            if let Some(value) = line.strip_prefix("Name=") {
                name = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("Path=") {
                rel_path = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("IsRelative=") {
                is_relative = value.trim() == "1";
            }
        }

        let (Some(name), Some(rel_path)) = (name, rel_path) else {
            continue;
        };
        if name.eq_ignore_ascii_case("default") || is_excluded(&name) {
            continue;
        }
        let path = if is_relative {
            root.join(&rel_path)
        } else {
            PathBuf::from(&rel_path)
        };
        if !path.join("prefs.js").is_file() && !path.join("user.js").is_file() {
            continue;
        }
        profiles.push(ProfileDescriptor {
            name,
            path,
            browser: BrowserKind::Firefox,
            is_default: false,
        });
    }
    profiles
}
