//! Process supervisor - launch, readiness, and termination of the browser.
//!
//! This is the only module that touches OS process details; the rest of the
//! system depends on `launch`/`terminate` and never branches on platform.
//! A process-global port registry plus OS-level bind probing guarantees two
//! concurrent runs never share a debug port.

use dashmap::DashSet;
use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::{Child, Command};

use crate::catalog::BrowserKind;
use crate::config::{OrchestratorConfig, PortConfig};
use crate::error::{MailerError, Result};
use crate::workspace::SessionWorkspace;
use cdp::VersionInfo;

/// How often the readiness poll re-probes the debug endpoint.
const READINESS_INTERVAL: Duration = Duration::from_millis(250);

/// Grace period between the stop signal and a forceful kill.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

fn allocated_ports() -> &'static DashSet<u16> {
    static PORTS: OnceLock<DashSet<u16>> = OnceLock::new();
    PORTS.get_or_init(DashSet::new)
}

/// Pick a free debug port: the default first, then a bounded probe range.
/// A crashed prior instance may still hold the default, so a bind conflict
/// moves on instead of failing. The registry keeps concurrent runs apart
/// even before their browsers have bound anything.
pub fn allocate_debug_port(cfg: &PortConfig) -> Result<u16> {
    for offset in 0..=cfg.span {
        let port = cfg.base.saturating_add(offset);
        if !allocated_ports().insert(port) {
            continue; // held by another in-flight run
        }
        match TcpListener::bind(("127.0.0.1", port)) {
            Ok(listener) => {
                drop(listener);
                tracing::debug!(port, "allocated debug port");
                return Ok(port);
            }
            Err(_) => {
                allocated_ports().remove(&port);
            }
        }
    }
    Err(MailerError::Environment(format!(
        "no free debug port in {}..={}",
        cfg.base,
        cfg.base.saturating_add(cfg.span)
    )))
}

pub fn release_debug_port(port: u16) {
    allocated_ports().remove(&port);
}

fn candidate_paths(kind: BrowserKind) -> Vec<PathBuf> {
    match kind {
        BrowserKind::Chrome => {
            if cfg!(target_os = "windows") {
                ["ProgramFiles", "ProgramFiles(x86)", "LOCALAPPDATA"]
                    .iter()
                    .filter_map(|var| std::env::var_os(var))
                    .map(|base| {
                        PathBuf::from(base)
                            .join("Google")
                            .join("Chrome")
                            .join("Application")
                            .join("chrome.exe")
                    })
                    .collect()
            } else if cfg!(target_os = "macos") {
                vec![PathBuf::from(
                    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                )]
            } else {
                vec![
                    PathBuf::from("/usr/bin/google-chrome"),
                    PathBuf::from("/usr/bin/google-chrome-stable"),
                    PathBuf::from("/usr/local/bin/google-chrome"),
                    PathBuf::from("/snap/bin/google-chrome"),
                    PathBuf::from("/usr/bin/chromium"),
                    PathBuf::from("/usr/bin/chromium-browser"),
                ]
            }
        }
        BrowserKind::Firefox => {
            if cfg!(target_os = "windows") {
                ["ProgramFiles", "ProgramFiles(x86)"]
                    .iter()
                    .filter_map(|var| std::env::var_os(var))
                    .map(|base| {
                        PathBuf::from(base)
                            .join("Mozilla Firefox")
                            .join("firefox.exe")
                    })
                    .collect()
            } else if cfg!(target_os = "macos") {
                vec![PathBuf::from("/Applications/Firefox.app/Contents/MacOS/firefox")]
            } else {
                vec![
                    PathBuf::from("/usr/bin/firefox"),
                    PathBuf::from("/usr/bin/firefox-esr"),
                    PathBuf::from("/usr/local/bin/firefox"),
                    PathBuf::from("/snap/bin/firefox"),
                ]
            }
        }
    }
}

/// Locate the browser executable by probing known install paths.
pub fn find_executable(kind: BrowserKind) -> Result<PathBuf> {
    candidate_paths(kind)
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| {
            MailerError::Environment(format!("no {kind} executable found on this host"))
        })
}

/// Arguments that point the browser at the isolated profile, open the debug
/// port, and switch off the policy features that interfere with unattended
/// control (first-run dialogs, password prompts, automation banners).
pub fn build_launch_args(
    kind: BrowserKind,
    profile_dir: &std::path::Path,
    debug_port: u16,
    headless: bool,
) -> Vec<String> {
    match kind {
        BrowserKind::Chrome => {
            let mut args = vec![
                format!("--remote-debugging-port={debug_port}"),
                format!("--user-data-dir={}", profile_dir.display()),
                "--profile-directory=Default".to_string(),
                "--no-first-run".to_string(),
                "--no-default-browser-check".to_string(),
                "--disable-default-apps".to_string(),
                "--disable-infobars".to_string(),
                "--disable-features=PasswordManagerOnboarding".to_string(),
                "--password-store=basic".to_string(),
                "--disable-background-timer-throttling".to_string(),
                "--disable-backgrounding-occluded-windows".to_string(),
                "--disable-renderer-backgrounding".to_string(),
            ];
            if headless {
                args.push("--headless=new".to_string());
            }
            args
        }
        BrowserKind::Firefox => {
            let mut args = vec![
                "--remote-debugging-port".to_string(),
                debug_port.to_string(),
                "--profile".to_string(),
                profile_dir.display().to_string(),
                "--no-remote".to_string(),
                "--new-instance".to_string(),
            ];
            if headless {
                args.push("--headless".to_string());
            }
            args
        }
    }
}

/// A launched browser process plus its debug endpoint.
pub struct BrowserProcessHandle {
    child: Option<Child>,
    pub pid: Option<u32>,
    pub debug_port: u16,
    pub ws_url: String,
    pub args: Vec<String>,
}

/// Launch the browser for `workspace` and wait until the debug endpoint
/// answers. The workspace's allocated port is chosen here; readiness is
/// polled against `/json/version` until the configured launch timeout.
pub async fn launch(
    workspace: &SessionWorkspace,
    cfg: &OrchestratorConfig,
) -> Result<BrowserProcessHandle> {
    let kind = workspace.source.browser;
    let executable = find_executable(kind)?;
    let debug_port = allocate_debug_port(&cfg.ports)?;
    let args = build_launch_args(kind, &workspace.browser_profile_dir(), debug_port, workspace.headless);

    tracing::info!(
        browser = %kind,
        executable = %executable.display(),
        port = debug_port,
        headless = workspace.headless,
        "launching browser"
    );

    let mut command = Command::new(&executable);
    command
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            release_debug_port(debug_port);
            return Err(MailerError::Environment(format!(
                "failed to launch {}: {e}",
                executable.display()
            )));
        }
    };
    let pid = child.id();
    tracing::debug!(pid = ?pid, "browser process started");

    let probe = reqwest::Client::builder()
        .timeout(Duration::from_millis(500))
        .build()
        .map_err(|e| MailerError::Environment(format!("http probe client: {e}")))?;
    let version_url = format!("http://127.0.0.1:{debug_port}/json/version");
    let deadline = tokio::time::Instant::now() + cfg.timeouts.launch();

    loop {
        if let Ok(Some(status)) = child.try_wait() {
            release_debug_port(debug_port);
            return Err(MailerError::LaunchTimeout(format!(
                "browser exited before the debug endpoint came up (status: {status})"
            )));
        }

        match probe.get(&version_url).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<VersionInfo>().await {
                    Ok(info) => {
                        tracing::info!(
                            port = debug_port,
                            browser = info.browser.as_deref().unwrap_or("unknown"),
                            "debug endpoint ready"
                        );
                        return Ok(BrowserProcessHandle {
                            child: Some(child),
                            pid,
                            debug_port,
                            ws_url: info.web_socket_debugger_url,
                            args,
                        });
                    }
                    Err(e) => tracing::debug!("version payload not ready yet: {e}"),
                }
            }
            Ok(response) => tracing::debug!(status = %response.status(), "probe not ready"),
            Err(_) => {} // endpoint not listening yet
        }

        if tokio::time::Instant::now() >= deadline {
            let _ = child.start_kill();
            let _ = child.wait().await;
            release_debug_port(debug_port);
            return Err(MailerError::LaunchTimeout(format!(
                "debug port {debug_port} not ready within {:?}",
                cfg.timeouts.launch()
            )));
        }
        tokio::time::sleep(READINESS_INTERVAL).await;
    }
}

impl BrowserProcessHandle {
    /// Stop the browser: graceful signal first, forceful kill after a grace
    /// period. Idempotent and safe on an already-dead process. Always
    /// releases the debug port.
    pub async fn terminate(&mut self) {
        if let Some(mut child) = self.child.take() {
            #[cfg(unix)]
            if let Some(pid) = self.pid {
                // SAFETY: plain kill(2) with a valid signal constant.
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
            }
            #[cfg(not(unix))]
            {
                let _ = child.start_kill();
            }

            match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(%status, "browser exited"),
                Ok(Err(e)) => tracing::warn!("error waiting for browser exit: {e}"),
                Err(_) => {
                    tracing::warn!("browser ignored the stop signal, killing");
                    let _ = child.kill().await;
                }
            }
        }
        release_debug_port(self.debug_port);
    }
}

impl Drop for BrowserProcessHandle {
    fn drop(&mut self) {
        // kill_on_drop covers the child; the port must be freed here too.
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
        release_debug_port(self.debug_port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn concurrent_allocations_never_share_a_port() {
        let cfg = PortConfig { base: 39222, span: 20 };
        let a = allocate_debug_port(&cfg).unwrap();
        let b = allocate_debug_port(&cfg).unwrap();
        assert_ne!(a, b);
        release_debug_port(a);
        release_debug_port(b);
    }

    #[test]
    fn released_port_can_be_allocated_again() {
        let cfg = PortConfig { base: 39322, span: 0 };
        let a = allocate_debug_port(&cfg).unwrap();
        assert_eq!(a, 39322);
        assert!(allocate_debug_port(&cfg).is_err());
        release_debug_port(a);
        let b = allocate_debug_port(&cfg).unwrap();
        assert_eq!(b, 39322);
        release_debug_port(b);
    }

    #[test]
    fn bound_port_is_skipped() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let held = listener.local_addr().unwrap().port();
        let cfg = PortConfig { base: held, span: 30 };
        let got = allocate_debug_port(&cfg).unwrap();
        assert_ne!(got, held);
        release_debug_port(got);
    }

    #[test]
    fn chrome_args_cover_isolation_and_debugging() {
        let args = build_launch_args(
            BrowserKind::Chrome,
            Path::new("/tmp/chrome-automation-x"),
            9250,
            true,
        );
        assert!(args.contains(&"--remote-debugging-port=9250".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/chrome-automation-x".to_string()));
        assert!(args.contains(&"--no-first-run".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
    }

    #[test]
    fn firefox_args_use_profile_and_single_instance() {
        let args = build_launch_args(
            BrowserKind::Firefox,
            Path::new("/tmp/ff/automation-profile"),
            9251,
            false,
        );
        assert!(args.contains(&"--no-remote".to_string()));
        assert!(args.contains(&"--profile".to_string()));
        assert!(!args.contains(&"--headless".to_string()));
    }
}
