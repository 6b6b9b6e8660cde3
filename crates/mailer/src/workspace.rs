//! Isolated profile builder - disposable per-run browser workspaces.
//!
//! One `SessionWorkspace` exists per send operation. It is a fresh temp
//! directory seeded with just enough state from the source profile (cookie
//! store, login state, a minimal preference set) to inherit the logged-in
//! session. The source profile is only ever read; copies are best-effort
//! per file because a live browser on the host holds exclusive locks on
//! some of them. Teardown removes the directory on every exit path.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

use crate::catalog::{BrowserKind, ProfileDescriptor};
use crate::error::{MailerError, Result};

/// Chrome state files that carry the authenticated session. Everything else
/// (history, cache, extensions) stays behind to keep the copy fast.
const CHROME_SESSION_FILES: &[&str] = &[
    "Cookies",
    "Login Data",
    "Web Data",
    "Preferences",
    "Secure Preferences",
];

/// Firefox preferences written into every automation profile: no first-run
/// UI, no session restore, telemetry off.
const FIREFOX_PREFS: &str = r#"user_pref("browser.startup.homepage", "about:blank");
user_pref("browser.startup.page", 0);
user_pref("browser.shell.checkDefaultBrowser", false);
user_pref("browser.sessionstore.resume_from_crash", false);
user_pref("datareporting.healthreport.uploadEnabled", false);
user_pref("datareporting.policy.dataSubmissionEnabled", false);
user_pref("toolkit.telemetry.enabled", false);
user_pref("toolkit.telemetry.unified", false);
"#;

/// Disposable working state for exactly one send operation.
#[derive(Debug)]
pub struct SessionWorkspace {
    pub id: Uuid,
    pub source: ProfileDescriptor,
    pub headless: bool,
    root: PathBuf,
    dir: Option<TempDir>,
}

impl SessionWorkspace {
    /// Materialize a workspace for `profile`. Fails fast with a configuration
    /// error for headless + default profile: the default profile cannot be
    /// assumed logged in, and interactive login needs a window.
    pub fn prepare(profile: &ProfileDescriptor, headless: bool) -> Result<Self> {
        if headless && profile.is_default {
            return Err(MailerError::InvalidConfiguration(
                "headless mode requires a named profile; the default profile may need \
                 interactive login"
                    .to_string(),
            ));
        }

        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-automation-", profile.browser))
            .tempdir()?;
        let root = dir.path().to_path_buf();
        let id = Uuid::new_v4();

        tracing::debug!(
            workspace = %id,
            dir = %root.display(),
            source = %profile.name,
            "created automation workspace"
        );

        let ws = Self {
            id,
            source: profile.clone(),
            headless,
            root,
            dir: Some(dir),
        };

        match profile.browser {
            BrowserKind::Chrome => ws.seed_chrome(profile)?,
            BrowserKind::Firefox => ws.seed_firefox(profile)?,
        }

        Ok(ws)
    }

    /// Temp directory root, valid until teardown.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory handed to the browser's profile argument.
    pub fn browser_profile_dir(&self) -> PathBuf {
        match self.source.browser {
            // Chrome gets the workspace as --user-data-dir and loads Default.
            BrowserKind::Chrome => self.root.clone(),
            BrowserKind::Firefox => self.root.join("automation-profile"),
        }
    }

    fn seed_chrome(&self, profile: &ProfileDescriptor) -> Result<()> {
        let dest = self.root.join("Default");
        fs::create_dir_all(&dest)?;

        // The synthetic default starts empty; the user logs in interactively.
        if profile.is_default {
            return Ok(());
        }

        if !profile.path.is_dir() {
            tracing::warn!(
                source = %profile.path.display(),
                "source profile directory missing; starting from an empty profile"
            );
            return Ok(());
        }

        for file_name in CHROME_SESSION_FILES {
            copy_best_effort(&profile.path.join(file_name), &dest.join(file_name));
        }

        // Local State lives beside the profiles; it holds the encryption key
        // that makes the copied cookie store decryptable.
        if let Some(user_data_dir) = profile.path.parent() {
            copy_best_effort(
                &user_data_dir.join("Local State"),
                &self.root.join("Local State"),
            );
        }

        Ok(())
    }

    fn seed_firefox(&self, profile: &ProfileDescriptor) -> Result<()> {
        let dest = self.root.join("automation-profile");
        fs::create_dir_all(&dest)?;

        let mut prefs = fs::File::create(dest.join("prefs.js"))?;
        prefs.write_all(FIREFOX_PREFS.as_bytes())?;

        if !profile.is_default && profile.path.is_dir() {
            copy_best_effort(
                &profile.path.join("cookies.sqlite"),
                &dest.join("cookies.sqlite"),
            );
        }

        Ok(())
    }

    /// Remove the workspace directory. Idempotent; partial failures are
    /// logged and swallowed, never escalated.
    pub fn teardown(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => tracing::debug!(workspace = %self.id, "workspace removed"),
                Err(e) => tracing::warn!(
                    workspace = %self.id,
                    dir = %path.display(),
                    "could not fully remove workspace: {e}"
                ),
            }
        }
    }
}

impl Drop for SessionWorkspace {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Copy a single state file, skipping (with a warning) anything missing or
/// lock-contended. One unavailable file must not abort the whole operation.
fn copy_best_effort(source: &Path, dest: &Path) {
    if !source.is_file() {
        tracing::debug!(file = %source.display(), "state file absent, skipping");
        return;
    }
    match fs::copy(source, dest) {
        Ok(bytes) => tracing::debug!(file = %source.display(), bytes, "copied state file"),
        Err(e) => tracing::warn!(
            file = %source.display(),
            "could not copy state file (locked by a running browser?): {e}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureReason;
    use tempfile::TempDir;

    fn real_chrome_profile(user_data: &TempDir) -> ProfileDescriptor {
        let path = user_data.path().join("Profile 1");
        fs::create_dir_all(&path).unwrap();
        for f in CHROME_SESSION_FILES {
            fs::write(path.join(f), b"state").unwrap();
        }
        fs::write(user_data.path().join("Local State"), b"{}").unwrap();
        ProfileDescriptor {
            name: "Profile 1".into(),
            path,
            browser: BrowserKind::Chrome,
            is_default: false,
        }
    }

    fn default_profile(kind: BrowserKind) -> ProfileDescriptor {
        ProfileDescriptor {
            name: "Default".into(),
            path: PathBuf::new(),
            browser: kind,
            is_default: true,
        }
    }

    #[test]
    fn headless_with_default_profile_is_rejected_before_any_setup() {
        let err = SessionWorkspace::prepare(&default_profile(BrowserKind::Chrome), true)
            .unwrap_err();
        assert_eq!(err.reason(), FailureReason::InvalidConfiguration);
    }

    #[test]
    fn chrome_workspace_copies_session_files_only() {
        let user_data = TempDir::new().unwrap();
        let profile = real_chrome_profile(&user_data);
        // Unrelated state that must not be copied.
        fs::write(profile.path.join("History"), b"history").unwrap();

        let ws = SessionWorkspace::prepare(&profile, true).unwrap();
        let dest = ws.root().join("Default");
        for f in CHROME_SESSION_FILES {
            assert!(dest.join(f).is_file(), "missing {f}");
        }
        assert!(ws.root().join("Local State").is_file());
        assert!(!dest.join("History").exists());
    }

    #[test]
    fn missing_source_files_are_skipped_not_fatal() {
        let user_data = TempDir::new().unwrap();
        let path = user_data.path().join("Profile 2");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("Cookies"), b"c").unwrap(); // only one of the set

        let profile = ProfileDescriptor {
            name: "Profile 2".into(),
            path,
            browser: BrowserKind::Chrome,
            is_default: false,
        };
        let ws = SessionWorkspace::prepare(&profile, false).unwrap();
        assert!(ws.root().join("Default").join("Cookies").is_file());
        assert!(!ws.root().join("Default").join("Login Data").exists());
    }

    #[test]
    fn missing_source_profile_directory_still_yields_a_workspace() {
        let profile = ProfileDescriptor {
            name: "Ghost".into(),
            path: PathBuf::from("/definitely/not/here"),
            browser: BrowserKind::Chrome,
            is_default: false,
        };
        let ws = SessionWorkspace::prepare(&profile, false).unwrap();
        assert!(ws.root().join("Default").is_dir());
    }

    #[test]
    fn firefox_workspace_writes_automation_prefs() {
        let ws =
            SessionWorkspace::prepare(&default_profile(BrowserKind::Firefox), false).unwrap();
        let prefs = fs::read_to_string(ws.browser_profile_dir().join("prefs.js")).unwrap();
        assert!(prefs.contains("browser.shell.checkDefaultBrowser"));
        assert!(prefs.contains("toolkit.telemetry.enabled"));
    }

    #[test]
    fn teardown_removes_directory_and_is_idempotent() {
        let mut ws =
            SessionWorkspace::prepare(&default_profile(BrowserKind::Chrome), false).unwrap();
        let root = ws.root().to_path_buf();
        assert!(root.exists());
        ws.teardown();
        assert!(!root.exists());
        ws.teardown(); // second call is a no-op
        assert!(!root.exists());
    }

    #[test]
    fn dropping_a_workspace_cleans_up() {
        let root = {
            let ws = SessionWorkspace::prepare(&default_profile(BrowserKind::Chrome), false)
                .unwrap();
            ws.root().to_path_buf()
        };
        assert!(!root.exists());
    }
}
