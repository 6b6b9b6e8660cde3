//! Webmail send automation by driving an already-authenticated browser.
//!
//! Instead of speaking SMTP or storing credentials, the orchestrator derives
//! a disposable profile from the user's real browser profile, launches a
//! supervised browser process with a remote-debugging port open, attaches
//! over CDP, and walks the webmail compose flow to completion. Every run
//! owns its own workspace and debug port, and both are reclaimed on every
//! exit path.
//!
//! # Entry points
//!
//! - [`send`] - one compose request in, one [`SendOutcome`] out.
//! - [`list_profiles`] - read-only catalog of the host's browser profiles.
//!
//! ```no_run
//! use mailer::{send, list_profiles, BrowserKind, ComposeRequest, OrchestratorConfig};
//!
//! # async fn demo() {
//! let profiles = list_profiles(BrowserKind::Chrome);
//! let request = ComposeRequest {
//!     to: "a@example.com".into(),
//!     subject: "Hi".into(),
//!     body: "Hello".into(),
//!     attachments: Vec::new(),
//! };
//! let outcome = send(&request, BrowserKind::Chrome, "Profile 1", false,
//!     &OrchestratorConfig::default()).await;
//! println!("sent: {}", outcome.succeeded);
//! # }
//! ```

pub mod catalog;
pub mod compose;
pub mod config;
pub mod error;
pub mod orchestrate;
pub mod selectors;
pub mod supervisor;
pub mod workspace;

pub use catalog::{list_profiles, BrowserKind, ProfileDescriptor};
pub use compose::{ComposeRequest, ComposeState, MailPage};
pub use config::{OrchestratorConfig, PortConfig, Timeouts};
pub use error::{FailureReason, MailerError, SendOutcome};
pub use orchestrate::send;
pub use selectors::SelectorSet;
pub use workspace::SessionWorkspace;
