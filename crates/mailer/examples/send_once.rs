//! Send a single email through the local Chrome profile.
//!
//! Usage:
//!   cargo run --example send_once -- <to> <subject> <body> [profile]
//!
//! Requires Chrome installed and the chosen profile logged in to the webmail
//! account.

use mailer::{send, BrowserKind, ComposeRequest, OrchestratorConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(to), Some(subject), Some(body)) = (args.next(), args.next(), args.next()) else {
        eprintln!("usage: send_once <to> <subject> <body> [profile]");
        std::process::exit(2);
    };
    let profile = args.next().unwrap_or_default();

    let request = ComposeRequest {
        to,
        subject,
        body,
        attachments: Vec::new(),
    };

    let outcome = send(
        &request,
        BrowserKind::Chrome,
        &profile,
        false,
        &OrchestratorConfig::default(),
    )
    .await;

    println!("{}", serde_json::to_string_pretty(&outcome).unwrap());
    if !outcome.succeeded {
        std::process::exit(1);
    }
}
