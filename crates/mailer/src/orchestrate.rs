//! Orchestration of one send request, end to end.
//!
//! Pipeline: catalog lookup → workspace prep → browser launch → CDP attach →
//! compose state machine → teardown. Stages run strictly sequentially;
//! cleanup (process termination + workspace removal) executes on every exit
//! path and is identical for success and failure.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use cdp::{CdpClient, CdpError, Page};

use crate::catalog::{self, BrowserKind};
use crate::compose::{ComposeDriver, ComposeRequest, MailPage};
use crate::config::OrchestratorConfig;
use crate::error::{MailerError, Result, SendOutcome};
use crate::supervisor::{self, BrowserProcessHandle};
use crate::workspace::SessionWorkspace;

/// Adapter giving the compose driver its page primitives over CDP.
struct CdpMailPage {
    page: Page,
}

fn map_page_error(err: CdpError, selector: &str) -> MailerError {
    if err.is_connection_lost() {
        MailerError::ConnectionLost(err.to_string())
    } else {
        // The element resolved moments ago but the interaction failed - the
        // UI moved underneath us.
        MailerError::UiElementNotFound {
            step: format!("interacting with {selector}"),
        }
    }
}

#[async_trait]
impl MailPage for CdpMailPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page.navigate(url).await.map_err(MailerError::from)
    }

    async fn wait_for_any(
        &self,
        selectors: &[String],
        timeout: Duration,
    ) -> Result<Option<usize>> {
        match self.page.wait_for_selector_any(selectors, timeout).await {
            Ok(index) => Ok(Some(index)),
            Err(CdpError::Timeout(..)) => Ok(None),
            Err(e) => Err(MailerError::from(e)),
        }
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        self.page
            .fill(selector, text)
            .await
            .map_err(|e| map_page_error(e, selector))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.page
            .click(selector)
            .await
            .map_err(|e| map_page_error(e, selector))
    }

    async fn read_text(&self, selector: &str) -> Result<Option<String>> {
        self.page
            .read_text(selector)
            .await
            .map_err(MailerError::from)
    }
}

/// The sole entry point into the core: one request, one deterministic
/// outcome, all resources reclaimed before returning.
pub async fn send(
    request: &ComposeRequest,
    browser: BrowserKind,
    profile_name: &str,
    headless: bool,
    config: &OrchestratorConfig,
) -> SendOutcome {
    let run_id = Uuid::new_v4();
    tracing::info!(
        %run_id,
        %browser,
        profile = profile_name,
        headless,
        to = %request.to,
        "send request accepted"
    );

    match run_once(request, browser, profile_name, headless, config).await {
        Ok(()) => {
            tracing::info!(%run_id, "send completed");
            SendOutcome::success()
        }
        Err(e) => {
            tracing::warn!(%run_id, reason = ?e.reason(), "send failed: {e}");
            SendOutcome::failure(&e)
        }
    }
}

async fn run_once(
    request: &ComposeRequest,
    browser: BrowserKind,
    profile_name: &str,
    headless: bool,
    config: &OrchestratorConfig,
) -> Result<()> {
    // Configuration errors fail before any process is launched.
    let profile = catalog::find_profile(browser, profile_name)?;
    let mut workspace = SessionWorkspace::prepare(&profile, headless)?;

    let mut handle = match supervisor::launch(&workspace, config).await {
        Ok(handle) => handle,
        Err(e) => {
            workspace.teardown();
            return Err(e);
        }
    };

    // Everything after the browser is up runs under the overall deadline.
    // A deadline overrun gets the same cleanup as every other outcome.
    let result = tokio::time::timeout(
        config.timeouts.overall(),
        drive(&handle, request, config),
    )
    .await;

    handle.terminate().await;
    workspace.teardown();

    match result {
        Ok(inner) => inner,
        Err(_) => Err(MailerError::Environment(format!(
            "run exceeded overall deadline of {:?}",
            config.timeouts.overall()
        ))),
    }
}

async fn drive(
    handle: &BrowserProcessHandle,
    request: &ComposeRequest,
    config: &OrchestratorConfig,
) -> Result<()> {
    let client = CdpClient::connect(&handle.ws_url)
        .await
        .map_err(MailerError::from)?;
    let page = Page::attach(client.clone())
        .await
        .map_err(MailerError::from)?;

    let mail_page = CdpMailPage { page };
    let mut driver = ComposeDriver::new(
        &mail_page,
        &config.selectors,
        &config.timeouts,
        &config.inbox_url,
    );
    let result = driver.run(request).await;
    tracing::debug!(final_state = ?driver.state(), "compose driver finished");

    let _ = client.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureReason;

    fn request() -> ComposeRequest {
        ComposeRequest {
            to: "a@example.com".into(),
            subject: "Hi".into(),
            body: "Hello".into(),
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn headless_default_profile_fails_before_launch() {
        let config = OrchestratorConfig::default();
        let outcome = send(&request(), BrowserKind::Chrome, "", true, &config).await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.reason, Some(FailureReason::InvalidConfiguration));
    }

    #[tokio::test]
    async fn unknown_profile_is_a_configuration_error() {
        let config = OrchestratorConfig::default();
        let outcome = send(
            &request(),
            BrowserKind::Chrome,
            "no-such-profile-xyzzy",
            false,
            &config,
        )
        .await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.reason, Some(FailureReason::InvalidConfiguration));
    }
}
