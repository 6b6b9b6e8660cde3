//! Print the discoverable browser profiles on this host.

use mailer::{list_profiles, BrowserKind};

fn main() {
    tracing_subscriber::fmt().init();

    for kind in [BrowserKind::Chrome, BrowserKind::Firefox] {
        println!("{kind}:");
        for profile in list_profiles(kind) {
            let marker = if profile.is_default { " (default)" } else { "" };
            println!("  {}{} -> {}", profile.name, marker, profile.path.display());
        }
    }
}
