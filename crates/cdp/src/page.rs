//! Page handle - a controllable page target on top of the CDP client.
//!
//! Design: lightweight wrapper with target-specific context. All pages share
//! the same WebSocket - no per-page connection overhead. Element primitives
//! go through `Runtime.evaluate` so they do not depend on DOM domain node
//! bookkeeping; selectors are passed as JSON string literals to avoid any
//! injection through quoting.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::client::{CdpClient, CdpError, Result};
use crate::protocol::{AttachToTargetResult, SessionId, TargetId, TargetInfo};

/// How often selector/url waits re-poll the page.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default bound for single round-trip commands.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// A page target attached over the shared CDP connection.
#[derive(Clone)]
pub struct Page {
    client: Arc<CdpClient>,
    pub target_id: TargetId,
    pub session_id: SessionId,
}

impl Page {
    /// Attach to the first page target, creating one if the browser has none.
    pub async fn attach(client: Arc<CdpClient>) -> Result<Self> {
        let targets = client
            .send_request("Target.getTargets", None, None, COMMAND_TIMEOUT)
            .await?;

        let mut target_id: Option<TargetId> = None;
        if let Some(infos) = targets.get("targetInfos").and_then(Value::as_array) {
            for info in infos {
                if let Ok(info) = serde_json::from_value::<TargetInfo>(info.clone()) {
                    if info.target_type == "page" {
                        target_id = Some(info.target_id);
                        break;
                    }
                }
            }
        }

        let target_id = match target_id {
            Some(id) => id,
            None => {
                let created = client
                    .send_request(
                        "Target.createTarget",
                        Some(json!({ "url": "about:blank" })),
                        None,
                        COMMAND_TIMEOUT,
                    )
                    .await?;
                created["targetId"]
                    .as_str()
                    .ok_or_else(|| CdpError::Script("createTarget returned no targetId".into()))?
                    .to_string()
            }
        };

        let result = client
            .send_request(
                "Target.attachToTarget",
                Some(json!({ "targetId": target_id, "flatten": true })),
                None,
                COMMAND_TIMEOUT,
            )
            .await?;
        let attached: AttachToTargetResult = serde_json::from_value(result)?;

        let page = Self {
            client,
            target_id,
            session_id: attached.session_id,
        };

        // Only the domains the primitives need.
        for domain in ["Page", "Runtime"] {
            page.send(format!("{domain}.enable"), None).await?;
        }

        Ok(page)
    }

    /// Send a command within this page's session.
    pub async fn send(&self, method: impl Into<String>, params: Option<Value>) -> Result<Value> {
        self.client
            .send_request(method, params, Some(self.session_id.clone()), COMMAND_TIMEOUT)
            .await
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        let result = self.send("Page.navigate", Some(json!({ "url": url }))).await?;
        if let Some(text) = result.get("errorText").and_then(Value::as_str) {
            if !text.is_empty() {
                return Err(CdpError::Script(format!("navigation failed: {text}")));
            }
        }
        Ok(())
    }

    /// Evaluate an expression in page context, returning its JSON value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .send(
                "Runtime.evaluate",
                Some(json!({
                    "expression": expression,
                    "returnByValue": true,
                })),
            )
            .await?;

        if let Some(exception) = result.get("exceptionDetails") {
            let text = exception
                .get("exception")
                .and_then(|e| e.get("description"))
                .or_else(|| exception.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("unknown exception");
            return Err(CdpError::Script(text.to_string()));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Which of `selectors` currently resolve to a visible element, if any.
    /// Returns the index of the first match.
    pub async fn find_any(&self, selectors: &[String]) -> Result<Option<usize>> {
        for (index, selector) in selectors.iter().enumerate() {
            let script = format!(
                r#"(() => {{
                    const el = document.querySelector({sel});
                    if (!el) return false;
                    const rect = el.getBoundingClientRect();
                    return rect.width > 0 || rect.height > 0 || el.offsetParent !== null;
                }})()"#,
                sel = js_string(selector),
            );
            if self.evaluate(&script).await?.as_bool() == Some(true) {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Wait until any of `selectors` resolves, polling up to `timeout`.
    /// Returns the index of the winning selector, or `Timeout`.
    pub async fn wait_for_selector_any(
        &self,
        selectors: &[String],
        timeout: Duration,
    ) -> Result<usize> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(index) = self.find_any(selectors).await? {
                return Ok(index);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CdpError::Timeout(
                    timeout,
                    format!("selector ({} candidates)", selectors.len()),
                ));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Fill an input, textarea, or contenteditable element and fire the
    /// input/change events the page's own listeners expect.
    pub async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) throw new Error('element not found: ' + {sel});
                el.focus();
                if (el.isContentEditable) {{
                    el.textContent = {text};
                }} else {{
                    el.value = {text};
                }}
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = js_string(selector),
            text = js_string(text),
        );
        self.evaluate(&script).await?;
        Ok(())
    }

    pub async fn click(&self, selector: &str) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) throw new Error('element not found: ' + {sel});
                el.click();
                return true;
            }})()"#,
            sel = js_string(selector),
        );
        self.evaluate(&script).await?;
        Ok(())
    }

    /// Text content of the first element matching `selector`.
    pub async fn read_text(&self, selector: &str) -> Result<Option<String>> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                return el ? (el.textContent || el.innerText) : null;
            }})()"#,
            sel = js_string(selector),
        );
        Ok(self
            .evaluate(&script)
            .await?
            .as_str()
            .map(|s| s.to_string()))
    }

    /// Wait until the page URL contains `fragment`, polling up to `timeout`.
    pub async fn wait_for_url_contains(&self, fragment: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let url = self
                .evaluate("window.location.href")
                .await?
                .as_str()
                .unwrap_or_default()
                .to_string();
            if url.contains(fragment) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CdpError::Timeout(timeout, format!("url contains {fragment:?}")));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Encode a Rust string as a JavaScript string literal.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}
