//! Candidate selector lists for the webmail UI.
//!
//! The webmail interface is a third-party surface that changes layout,
//! language, and generated class names without notice. Each logical element
//! is therefore an ordered list of capability-equivalent locators; resolution
//! tries them in order and the first match wins. UI drift is fixed by
//! updating this data (it deserializes from JSON), not by changing code.

use serde::{Deserialize, Serialize};

/// Ordered candidate locators per logical UI element.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSet {
    /// Element proving the inbox rendered for a logged-in account.
    pub inbox_landmark: Vec<String>,
    /// Element proving a login form is showing instead.
    pub login_marker: Vec<String>,
    pub compose_trigger: Vec<String>,
    pub to_field: Vec<String>,
    pub subject_field: Vec<String>,
    pub body_field: Vec<String>,
    pub send_trigger: Vec<String>,
    pub sent_confirmation: Vec<String>,
}

impl Default for SelectorSet {
    fn default() -> Self {
        Self {
            inbox_landmark: vec![
                r#"div[role="button"][gh="cm"]"#.into(),
                r#"div[role="button"][aria-label*="Compose"]"#.into(),
                r#"div[aria-label*="Compose"]"#.into(),
            ],
            login_marker: vec![
                r#"input[type="email"]"#.into(),
                r#"input[type="password"]"#.into(),
            ],
            compose_trigger: vec![
                r#"div[role="button"][gh="cm"]"#.into(),
                r#"div[role="button"][aria-label*="Compose"]"#.into(),
                // Persian and Spanish UI variants.
                r#"div[role="button"][aria-label*="نوشتن"]"#.into(),
                r#"div[role="button"][aria-label*="Escribir"]"#.into(),
                r#"div.T-I.T-I-KE.L3"#.into(),
                r#"div[data-tooltip*="Compose"]"#.into(),
            ],
            to_field: vec![
                r#"textarea[aria-label="To"]"#.into(),
                r#"input[aria-label="To"]"#.into(),
                r#"textarea[name="to"]"#.into(),
                r#"div[aria-label="To"] textarea"#.into(),
                r#"div[role="combobox"][aria-label*="To"]"#.into(),
                r#"input.agP.aFw"#.into(),
                r#"input[aria-label*="گیرندگان"]"#.into(),
            ],
            subject_field: vec![
                r#"input[name="subjectbox"]"#.into(),
                r#"input[aria-label="Subject"]"#.into(),
                r#"input[aria-label*="Subject"]"#.into(),
                r#"input.aoT"#.into(),
                r#"input[aria-label="موضوع"]"#.into(),
            ],
            body_field: vec![
                r#"div[aria-label="Message Body"]"#.into(),
                r#"div[role="textbox"][aria-label*="Message"]"#.into(),
                r#"div[contenteditable="true"][aria-label*="Message"]"#.into(),
                r#"div[aria-label="متن پیام"]"#.into(),
                r#"div[g_editable="true"]"#.into(),
                r#"div[contenteditable="true"][role="textbox"]"#.into(),
            ],
            send_trigger: vec![
                r#"div[role="button"][aria-label*="Send"]"#.into(),
                r#"div[data-tooltip*="Send"]"#.into(),
                r#"div[role="button"][aria-label*="ارسال"]"#.into(),
                r#"div.T-I.J-J5-Ji.aoO.v7.T-I-atl.L3"#.into(),
            ],
            sent_confirmation: vec![
                r#"div[aria-label*="Message sent"]"#.into(),
                r#"span[aria-label*="Message sent"]"#.into(),
                r#"div[aria-label*="sent"]"#.into(),
                r#"div[aria-label*="ارسال شد"]"#.into(),
            ],
        }
    }
}
