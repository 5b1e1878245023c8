//! Canonical cache-key derivation from free-form input
//!
//! Accepts a URL, a "www."-prefixed host, or a company name and produces
//! a deterministic cache key. Parse failures never surface: anything
//! that does not parse as a URL degrades to the company-name path.

use url::Url;

/// Normalize a free-form input into a canonical cache key.
///
/// Inputs carrying a scheme separator or a leading "www." are parsed as
/// URLs and reduced to their hostname without the "www." prefix; all
/// other inputs (and any parse failure) are treated as company names
/// and reduced to lowercase with whitespace stripped.
///
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(input: &str) -> String {
    let trimmed = input.trim();

    if trimmed.contains("://") || trimmed.to_ascii_lowercase().starts_with("www.") {
        if let Some(host) = parse_hostname(trimmed) {
            return host;
        }
    }

    // Company-name path: lowercase, strip all whitespace.
    let cleaned: String = trimmed
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    // Stripping whitespace may have produced a parseable URL (e.g.
    // "ht tp://foo"); re-run so the output is a fixed point of this
    // function. The guard on `cleaned != trimmed` bounds the recursion.
    if cleaned != trimmed && (cleaned.contains("://") || cleaned.starts_with("www.")) {
        return normalize(&cleaned);
    }

    cleaned
}

fn parse_hostname(input: &str) -> Option<String> {
    let candidate = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{input}")
    };

    let parsed = Url::parse(&candidate).ok()?;
    let host = parsed.host_str()?;
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_domain_passes_through() {
        assert_eq!(normalize("example.com"), "example.com");
    }

    #[test]
    fn test_url_reduced_to_hostname() {
        assert_eq!(normalize("https://example.com/path?q=1"), "example.com");
        assert_eq!(normalize("http://Example.COM"), "example.com");
    }

    #[test]
    fn test_www_prefix_stripped() {
        assert_eq!(normalize("www.example.com"), "example.com");
        assert_eq!(normalize("https://www.example.com"), "example.com");
        assert_eq!(normalize("WWW.Example.com"), "example.com");
    }

    #[test]
    fn test_company_name_lowercased_and_despaced() {
        assert_eq!(normalize("Acme Corp"), "acmecorp");
        assert_eq!(normalize("  Initech  Industries "), "initechindustries");
    }

    #[test]
    fn test_parse_failure_degrades_to_company_name() {
        // Whitespace stripping turns this into a parseable URL, so the
        // hostname wins on the second pass.
        assert_eq!(normalize("ht tp://not a url"), "notaurl");
        // Unparseable even after cleanup: stays on the company-name path.
        assert_eq!(normalize("http://"), "http://");
    }

    #[test]
    fn test_idempotence() {
        for input in [
            "https://www.example.com/logo",
            "www.foo.bar",
            "Acme Corp",
            "example.com",
            "",
        ] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_empty_input_yields_empty_key() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }
}
