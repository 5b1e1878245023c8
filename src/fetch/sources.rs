//! Source URL construction for the multi-source fetch
//!
//! Each provider has a fixed URL shape; the attempt plan lists them in
//! strict priority order. The direct-favicon fallback expands into one
//! attempt per conventional path on the domain itself.

use crate::models::SourceKind;

/// Conventional favicon paths probed on the domain itself, in order
const DIRECT_FAVICON_PATHS: [&str; 3] = ["apple-touch-icon.png", "favicon.png", "favicon.ico"];

/// One planned fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAttempt {
    pub kind: SourceKind,
    pub url: String,
}

/// Build the ordered attempt plan for a normalized key.
///
/// Keys without a dot cannot be used as hostnames, so the plan for a
/// company-name key omits the direct-favicon probes.
pub fn attempt_plan(key: &str) -> Vec<SourceAttempt> {
    let domain = if key.contains('.') {
        key.to_string()
    } else {
        format!("{key}.com")
    };

    let mut plan = vec![
        SourceAttempt {
            kind: SourceKind::Clearbit,
            url: format!("https://logo.clearbit.com/{domain}?size=512"),
        },
        SourceAttempt {
            kind: SourceKind::GoogleFavicons,
            url: format!("https://www.google.com/s2/favicons?domain={domain}&sz=128"),
        },
        SourceAttempt {
            kind: SourceKind::DuckDuckGo,
            url: format!("https://icons.duckduckgo.com/ip3/{domain}.ico"),
        },
    ];

    if key.contains('.') {
        for path in DIRECT_FAVICON_PATHS {
            plan.push(SourceAttempt {
                kind: SourceKind::DirectFavicon,
                url: format!("https://{domain}/{path}"),
            });
        }
    }

    plan
}
