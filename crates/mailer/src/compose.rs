//! Compose automation driver - the send state machine.
//!
//! One pass through `Idle → Connected → ComposeOpened → FieldsFilled → Sent
//! → Confirmed`; any step can divert to a terminal failure. Resilience
//! against UI drift comes from trying each element's candidate-selector list
//! in priority order, not from retrying the same locator - one send request
//! is exactly one deterministic pass.
//!
//! The driver talks to the page through the `MailPage` trait so the machine
//! is testable without a browser.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::Timeouts;
use crate::error::{MailerError, Result};
use crate::selectors::SelectorSet;

/// Immutable input to one compose run. Validated upstream: well-formed
/// recipient and non-empty subject/body are preconditions here.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ComposeRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Accepted for wire compatibility; attachment upload is not implemented.
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// The page primitives the state machine needs. `wait_for_any` returns the
/// index of the first candidate that resolved, `None` on timeout; errors are
/// reserved for the connection dying.
#[async_trait]
pub trait MailPage: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn wait_for_any(&self, selectors: &[String], timeout: Duration)
        -> Result<Option<usize>>;
    async fn fill(&self, selector: &str, text: &str) -> Result<()>;
    async fn click(&self, selector: &str) -> Result<()>;
    async fn read_text(&self, selector: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeState {
    Idle,
    Connected,
    ComposeOpened,
    FieldsFilled,
    Sent,
    Confirmed,
}

pub struct ComposeDriver<'a, P: MailPage> {
    page: &'a P,
    selectors: &'a SelectorSet,
    timeouts: &'a Timeouts,
    inbox_url: &'a str,
    state: ComposeState,
    trail: Vec<ComposeState>,
}

impl<'a, P: MailPage> ComposeDriver<'a, P> {
    pub fn new(
        page: &'a P,
        selectors: &'a SelectorSet,
        timeouts: &'a Timeouts,
        inbox_url: &'a str,
    ) -> Self {
        Self {
            page,
            selectors,
            timeouts,
            inbox_url,
            state: ComposeState::Idle,
            trail: vec![ComposeState::Idle],
        }
    }

    pub fn state(&self) -> ComposeState {
        self.state
    }

    /// States visited so far, in order.
    pub fn trail(&self) -> &[ComposeState] {
        &self.trail
    }

    fn advance(&mut self, state: ComposeState) {
        tracing::debug!(?state, "compose state transition");
        self.state = state;
        self.trail.push(state);
    }

    /// Run the full send protocol once.
    pub async fn run(&mut self, request: &ComposeRequest) -> Result<()> {
        self.connect().await?;
        self.open_compose().await?;
        self.fill_fields(request).await?;
        self.trigger_send().await?;
        self.confirm().await
    }

    /// Idle → Connected: the inbox landmark must appear; if it does not,
    /// the inherited session was not actually logged in.
    async fn connect(&mut self) -> Result<()> {
        tracing::info!(url = self.inbox_url, "navigating to inbox");
        self.page.navigate(self.inbox_url).await?;

        let landmark = self
            .page
            .wait_for_any(&self.selectors.inbox_landmark, self.timeouts.landmark())
            .await?;
        if landmark.is_none() {
            // Extra context for the operator: was a login form showing?
            if let Ok(Some(_)) = self
                .page
                .wait_for_any(&self.selectors.login_marker, Duration::from_millis(500))
                .await
            {
                tracing::warn!("login form detected; the copied session state did not carry over");
            }
            return Err(MailerError::AuthenticationRequired);
        }

        self.advance(ComposeState::Connected);
        Ok(())
    }

    /// Resolve one logical element across its candidate list. Each candidate
    /// gets its own short timeout; the first hit wins; exhaustion means the
    /// UI has drifted past every known shape.
    async fn resolve(&self, step: &str, candidates: &[String]) -> Result<String> {
        for (index, selector) in candidates.iter().enumerate() {
            tracing::debug!(step, candidate = index + 1, total = candidates.len(), %selector, "trying selector");
            match self
                .page
                .wait_for_any(std::slice::from_ref(selector), self.timeouts.candidate())
                .await?
            {
                Some(_) => {
                    tracing::debug!(step, %selector, "selector resolved");
                    return Ok(selector.clone());
                }
                None => continue,
            }
        }
        tracing::error!(step, tried = candidates.len(), "no candidate selector matched");
        Err(MailerError::UiElementNotFound {
            step: step.to_string(),
        })
    }

    async fn open_compose(&mut self) -> Result<()> {
        let selector = self.resolve("compose trigger", &self.selectors.compose_trigger).await?;
        self.page.click(&selector).await?;
        self.advance(ComposeState::ComposeOpened);
        Ok(())
    }

    /// Fill recipient, subject, body in that order; the first field that
    /// cannot be located aborts without touching the rest.
    async fn fill_fields(&mut self, request: &ComposeRequest) -> Result<()> {
        let fields: [(&str, &[String], &str); 3] = [
            ("recipient field", &self.selectors.to_field, &request.to),
            ("subject field", &self.selectors.subject_field, &request.subject),
            ("body field", &self.selectors.body_field, &request.body),
        ];
        for (step, candidates, value) in fields {
            let selector = self.resolve(step, candidates).await?;
            self.page.fill(&selector, value).await?;
        }
        self.advance(ComposeState::FieldsFilled);
        Ok(())
    }

    async fn trigger_send(&mut self) -> Result<()> {
        let selector = self.resolve("send trigger", &self.selectors.send_trigger).await?;
        self.page.click(&selector).await?;
        self.advance(ComposeState::Sent);
        Ok(())
    }

    /// Sent → Confirmed: absence of the confirmation signal is not definite
    /// failure - the mail may have gone out - so it is reported as the
    /// distinct `SendUnconfirmed`.
    async fn confirm(&mut self) -> Result<()> {
        match self
            .page
            .wait_for_any(&self.selectors.sent_confirmation, self.timeouts.confirmation())
            .await?
        {
            Some(index) => {
                if let Ok(Some(text)) = self
                    .page
                    .read_text(&self.selectors.sent_confirmation[index])
                    .await
                {
                    tracing::info!(confirmation = %text.trim(), "send confirmed");
                } else {
                    tracing::info!("send confirmed");
                }
                self.advance(ComposeState::Confirmed);
                Ok(())
            }
            None => {
                tracing::warn!("send triggered but confirmation never appeared");
                Err(MailerError::SendUnconfirmed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureReason;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Scripted page: a set of "present" selectors plus a log of actions.
    struct FakePage {
        present: HashSet<String>,
        actions: Mutex<Vec<String>>,
    }

    impl FakePage {
        fn with(present: &[&str]) -> Self {
            Self {
                present: present.iter().map(|s| s.to_string()).collect(),
                actions: Mutex::new(Vec::new()),
            }
        }

        fn log(&self, action: String) {
            self.actions.lock().unwrap().push(action);
        }

        fn actions(&self) -> Vec<String> {
            self.actions.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MailPage for FakePage {
        async fn navigate(&self, url: &str) -> Result<()> {
            self.log(format!("navigate {url}"));
            Ok(())
        }

        async fn wait_for_any(
            &self,
            selectors: &[String],
            _timeout: Duration,
        ) -> Result<Option<usize>> {
            Ok(selectors.iter().position(|s| self.present.contains(s)))
        }

        async fn fill(&self, selector: &str, text: &str) -> Result<()> {
            self.log(format!("fill {selector} = {text}"));
            Ok(())
        }

        async fn click(&self, selector: &str) -> Result<()> {
            self.log(format!("click {selector}"));
            Ok(())
        }

        async fn read_text(&self, _selector: &str) -> Result<Option<String>> {
            Ok(Some("Message sent".to_string()))
        }
    }

    fn gmail_like_page(selectors: &SelectorSet) -> FakePage {
        FakePage::with(&[
            selectors.inbox_landmark[0].as_str(),
            selectors.compose_trigger[0].as_str(),
            selectors.to_field[0].as_str(),
            selectors.subject_field[0].as_str(),
            selectors.body_field[0].as_str(),
            selectors.send_trigger[0].as_str(),
            selectors.sent_confirmation[0].as_str(),
        ])
    }

    fn request() -> ComposeRequest {
        ComposeRequest {
            to: "a@example.com".into(),
            subject: "Hi".into(),
            body: "Hello".into(),
            attachments: Vec::new(),
        }
    }

    fn fast_timeouts() -> Timeouts {
        Timeouts {
            launch_ms: 10,
            landmark_ms: 10,
            candidate_ms: 10,
            confirmation_ms: 10,
            overall_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn happy_path_visits_all_states_in_order() {
        let selectors = SelectorSet::default();
        let timeouts = fast_timeouts();
        let page = gmail_like_page(&selectors);
        let mut driver = ComposeDriver::new(&page, &selectors, &timeouts, "https://mail.test");

        driver.run(&request()).await.unwrap();

        assert_eq!(
            driver.trail(),
            &[
                ComposeState::Idle,
                ComposeState::Connected,
                ComposeState::ComposeOpened,
                ComposeState::FieldsFilled,
                ComposeState::Sent,
                ComposeState::Confirmed,
            ]
        );

        // Fields were filled in order: recipient, subject, body, then send.
        let actions = page.actions();
        let fills: Vec<_> = actions.iter().filter(|a| a.starts_with("fill")).collect();
        assert_eq!(fills.len(), 3);
        assert!(fills[0].contains("a@example.com"));
        assert!(fills[1].contains("Hi"));
        assert!(fills[2].contains("Hello"));
    }

    #[tokio::test]
    async fn missing_landmark_means_authentication_required() {
        let selectors = SelectorSet::default();
        let timeouts = fast_timeouts();
        let page = FakePage::with(&[]); // nothing renders
        let mut driver = ComposeDriver::new(&page, &selectors, &timeouts, "https://mail.test");

        let err = driver.run(&request()).await.unwrap_err();
        assert_eq!(err.reason(), FailureReason::AuthenticationRequired);
        assert_eq!(driver.state(), ComposeState::Idle);
    }

    #[tokio::test]
    async fn all_compose_candidates_missing_is_ui_element_not_found() {
        let selectors = SelectorSet::default();
        let timeouts = fast_timeouts();
        // Inbox renders, but no compose trigger variant exists.
        let page = FakePage::with(&[selectors.inbox_landmark[0].as_str()]);
        let mut driver = ComposeDriver::new(&page, &selectors, &timeouts, "https://mail.test");

        let err = driver.run(&request()).await.unwrap_err();
        assert_eq!(err.reason(), FailureReason::UiElementNotFound);
        match err {
            MailerError::UiElementNotFound { step } => assert_eq!(step, "compose trigger"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(driver.state(), ComposeState::Connected);
    }

    #[tokio::test]
    async fn field_failure_aborts_before_later_fields() {
        let selectors = SelectorSet::default();
        let timeouts = fast_timeouts();
        // Everything up to the recipient field, which never resolves.
        let page = FakePage::with(&[
            selectors.inbox_landmark[0].as_str(),
            selectors.compose_trigger[0].as_str(),
            selectors.subject_field[0].as_str(),
            selectors.body_field[0].as_str(),
        ]);
        let mut driver = ComposeDriver::new(&page, &selectors, &timeouts, "https://mail.test");

        let err = driver.run(&request()).await.unwrap_err();
        match err {
            MailerError::UiElementNotFound { step } => assert_eq!(step, "recipient field"),
            other => panic!("unexpected error: {other}"),
        }
        // Subject and body were never touched.
        assert!(page.actions().iter().all(|a| !a.starts_with("fill")));
    }

    #[tokio::test]
    async fn later_candidate_wins_when_first_variants_are_absent() {
        let selectors = SelectorSet::default();
        let timeouts = fast_timeouts();
        let present = vec![
            selectors.inbox_landmark[0].clone(),
            // Only the *last* compose variant exists, e.g. a locale change.
            selectors.compose_trigger.last().unwrap().clone(),
            selectors.to_field[0].clone(),
            selectors.subject_field[0].clone(),
            selectors.body_field[0].clone(),
            selectors.send_trigger[0].clone(),
            selectors.sent_confirmation[0].clone(),
        ];
        let present_refs: Vec<&str> = present.iter().map(String::as_str).collect();
        let page = FakePage::with(&present_refs);
        let mut driver = ComposeDriver::new(&page, &selectors, &timeouts, "https://mail.test");

        driver.run(&request()).await.unwrap();
        assert_eq!(driver.state(), ComposeState::Confirmed);
        let clicked = format!("click {}", selectors.compose_trigger.last().unwrap());
        assert!(page.actions().contains(&clicked));
    }

    #[tokio::test]
    async fn missing_confirmation_is_send_unconfirmed_after_sent() {
        let selectors = SelectorSet::default();
        let timeouts = fast_timeouts();
        let page = FakePage::with(&[
            selectors.inbox_landmark[0].as_str(),
            selectors.compose_trigger[0].as_str(),
            selectors.to_field[0].as_str(),
            selectors.subject_field[0].as_str(),
            selectors.body_field[0].as_str(),
            selectors.send_trigger[0].as_str(),
            // no confirmation selector present
        ]);
        let mut driver = ComposeDriver::new(&page, &selectors, &timeouts, "https://mail.test");

        let err = driver.run(&request()).await.unwrap_err();
        assert_eq!(err.reason(), FailureReason::SendUnconfirmed);
        assert_eq!(driver.state(), ComposeState::Sent);
    }

    #[tokio::test]
    async fn connection_loss_surfaces_as_connection_lost() {
        struct DeadPage;

        #[async_trait]
        impl MailPage for DeadPage {
            async fn navigate(&self, _url: &str) -> Result<()> {
                Err(MailerError::ConnectionLost("socket closed".into()))
            }
            async fn wait_for_any(
                &self,
                _selectors: &[String],
                _timeout: Duration,
            ) -> Result<Option<usize>> {
                Err(MailerError::ConnectionLost("socket closed".into()))
            }
            async fn fill(&self, _selector: &str, _text: &str) -> Result<()> {
                Err(MailerError::ConnectionLost("socket closed".into()))
            }
            async fn click(&self, _selector: &str) -> Result<()> {
                Err(MailerError::ConnectionLost("socket closed".into()))
            }
            async fn read_text(&self, _selector: &str) -> Result<Option<String>> {
                Err(MailerError::ConnectionLost("socket closed".into()))
            }
        }

        let selectors = SelectorSet::default();
        let timeouts = fast_timeouts();
        let page = DeadPage;
        let mut driver = ComposeDriver::new(&page, &selectors, &timeouts, "https://mail.test");

        let err = driver.run(&request()).await.unwrap_err();
        assert_eq!(err.reason(), FailureReason::ConnectionLost);
    }
}
