use anyhow::{Context, Result};
use regex::Regex;
use std::borrow::Cow;
use std::fs;
use std::path::Path;

use crate::error::ParseError;
use crate::types::{
    DisclosureUrl, InterestingFinding, Plugin, ScanResult, Theme, VersionInfo, Vulnerability,
};

/// Parse a WPScan transcript file into a [`ScanResult`].
///
/// Read failures surface as I/O errors with the path attached; a transcript
/// with no recoverable target URL fails with [`ParseError::NoTargetUrl`].
pub fn parse_file(path: impl AsRef<Path>) -> Result<ScanResult> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read scan file: {}", path.as_ref().display()))?;
    Ok(parse(&content)?)
}

/// Parse WPScan text output.
///
/// The transcript may wrap its marker glyphs (`[+]`, `[!]`, `[i]`) in ANSI
/// color sequences or be plain text. Escape sequences are stripped once up
/// front so a single pattern set covers both encodings. Every field except
/// the target URL is best-effort: missing sections default to empty.
pub fn parse(text: &str) -> Result<ScanResult, ParseError> {
    let text = strip_ansi(text);
    let p = Patterns::new();

    let url = p.extract_url(&text).ok_or(ParseError::NoTargetUrl)?;

    Ok(ScanResult {
        url,
        wordpress_version: p.extract_version(&text),
        wordpress_vulns: p.extract_core_vulns(&text),
        themes: p.extract_themes(&text),
        plugins: extract_plugins(&text),
        interesting_findings: p.extract_interesting_findings(&text),
    })
}

/// Remove ANSI color sequences, with or without the leading escape byte.
/// Marker glyphs and bracketed IP annotations survive untouched: the class
/// only matches short digit/semicolon runs ending in `m`.
fn strip_ansi(text: &str) -> Cow<'_, str> {
    let re = Regex::new(r"\x1b?\[[0-9;]{1,4}m").expect("valid pattern");
    re.replace_all(text, "")
}

struct Patterns {
    url: Regex,
    wp_version: Regex,
    found_by: Regex,
    rss_feed: Regex,
    section_start: Regex,
    vuln_title: Regex,
    cvss: Regex,
    fixed_in: Regex,
    cve_url: Regex,
    theme: Regex,
    version_line: Regex,
    location_line: Regex,
    style_url_line: Regex,
    xmlrpc: Regex,
}

impl Patterns {
    fn new() -> Self {
        let re = |s: &str| Regex::new(s).expect("valid pattern");
        Self {
            url: re(r"\[\+\]\s*URL:\s*(https?://[^\s\]]+)"),
            wp_version: re(r"WordPress version ([0-9][0-9.]*) identified"),
            found_by: re(r"Found By:\s*([^\r\n]+)"),
            rss_feed: re(r"(https?://[^,\s]+/feed/)"),
            section_start: re(r"(?m)^\[\+\]"),
            vuln_title: re(r"\[!\]\s*Title:\s*([^\r\n]+)"),
            cvss: re(r"CVSS:\s*([0-9.]+)"),
            fixed_in: re(r"Fixed in:\s*([0-9][0-9.]*)"),
            cve_url: re(r"(https?://cve\.mitre\.org/[^\s]+)"),
            theme: re(r"\[\+\]\s*WordPress theme in use:\s*([^\r\n]+)"),
            version_line: re(r"Version:\s*([0-9][0-9.]*)"),
            location_line: re(r"Location:\s*(https?://[^\s]+)"),
            style_url_line: re(r"Style URL:\s*(https?://[^\s]+)"),
            xmlrpc: re(r"XML-RPC seems to be enabled:\s*(https?://[^\s]+)"),
        }
    }

    /// Target URL: first well-formed token after the `URL:` marker, minus a
    /// trailing path separator and any trailing bracketed IP annotation.
    fn extract_url(&self, text: &str) -> Option<String> {
        let m = self.url.captures(text)?;
        let mut url = m[1].to_string();
        if let Some(i) = url.find('[') {
            url.truncate(i);
        }
        let url = url.trim().trim_end_matches('/').to_string();
        if url.is_empty() {
            None
        } else {
            Some(url)
        }
    }

    fn extract_version(&self, text: &str) -> Option<VersionInfo> {
        let m = self.wp_version.captures(text)?;
        let version = m[1].trim_end_matches('.').to_string();

        // The disclosure method is reported on a "Found By:" line after the
        // version identification.
        let rest = &text[m.get(0).expect("full match").end()..];
        let found_by = self
            .found_by
            .captures(rest)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        let mut disclosure_urls = Vec::new();
        if let Some(rss) = self.rss_feed.captures(text) {
            disclosure_urls.push(DisclosureUrl {
                url: rss[1].to_string(),
                kind: "RSS Feed".to_string(),
                element: "generator tag".to_string(),
            });
        }

        Some(VersionInfo {
            version,
            found_by,
            disclosure_urls,
        })
    }

    /// Core vulnerabilities live between the version-identification marker and
    /// the next top-level `[+]` marker (or end of document).
    fn extract_core_vulns(&self, text: &str) -> Vec<Vulnerability> {
        let Some(m) = self.wp_version.find(text) else {
            return Vec::new();
        };
        let section = self.section_text(text, m.start(), m.end());
        self.extract_vuln_blocks(section, "WordPress Core", true)
    }

    fn extract_themes(&self, text: &str) -> Vec<Theme> {
        let mut themes = Vec::new();
        for m in self.theme.captures_iter(text) {
            let name = m[1].trim().to_string();
            let full = m.get(0).expect("full match");
            let section = self.section_text(text, full.start(), full.end());

            themes.push(Theme {
                version: self
                    .version_line
                    .captures(section)
                    .map(|c| c[1].to_string()),
                location: self
                    .location_line
                    .captures(section)
                    .map(|c| c[1].to_string()),
                style_url: self
                    .style_url_line
                    .captures(section)
                    .map(|c| c[1].to_string()),
                vulnerabilities: self.extract_vuln_blocks(section, &name, false),
                name,
            });
        }
        themes
    }

    fn extract_interesting_findings(&self, text: &str) -> Vec<InterestingFinding> {
        let mut findings = Vec::new();

        // Each check is an independent single pattern; further finding types
        // (directory listing, debug log exposure, ...) append here.
        if let Some(m) = self.xmlrpc.captures(text) {
            findings.push(InterestingFinding {
                kind: "XML-RPC Enabled".to_string(),
                url: m[1].to_string(),
                severity: "info".to_string(),
                description: "XML-RPC interface is exposed and could be used for brute force attacks"
                    .to_string(),
            });
        }

        findings
    }

    /// Sub-document from `start` to the next top-level `[+]` marker after
    /// `search_from`, or to the end of the document.
    fn section_text<'t>(&self, text: &'t str, start: usize, search_from: usize) -> &'t str {
        match self.section_start.find_at(text, search_from) {
            Some(next) => &text[start..next.start()],
            None => &text[start..],
        }
    }

    /// Each vulnerability block starts at an alert marker followed by
    /// `Title:` and runs until the next such marker. The CVSS score, fix
    /// version and CVE reference are searched independently within the
    /// block: any subset may be absent without breaking the match.
    fn extract_vuln_blocks(
        &self,
        section: &str,
        component: &str,
        with_cve: bool,
    ) -> Vec<Vulnerability> {
        let titles: Vec<_> = self.vuln_title.captures_iter(section).collect();
        let mut vulns = Vec::with_capacity(titles.len());

        for (i, cap) in titles.iter().enumerate() {
            let full = cap.get(0).expect("full match");
            let block_end = titles
                .get(i + 1)
                .map(|next| next.get(0).expect("full match").start())
                .unwrap_or(section.len());
            let block = &section[full.end()..block_end];

            vulns.push(Vulnerability {
                title: cap[1].trim().to_string(),
                cvss: self
                    .cvss
                    .captures(block)
                    .and_then(|c| c[1].trim_end_matches('.').parse().ok()),
                fixed_in: self.fixed_in.captures(block).map(|c| c[1].to_string()),
                cve_url: if with_cve {
                    self.cve_url.captures(block).map(|c| c[1].to_string())
                } else {
                    None
                },
                component: component.to_string(),
            });
        }
        vulns
    }
}

/// Plugin extraction is a declared extension point: no plugin section sample
/// exists to design a grammar against, so the list is always empty.
fn extract_plugins(_text: &str) -> Vec<Plugin> {
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_ansi_with_and_without_escape_byte() {
        let with_esc = "\x1b[32m[+]\x1b[0m URL: https://a.example";
        let bare = "[32m[+][0m URL: https://a.example";
        assert_eq!(strip_ansi(with_esc), "[+] URL: https://a.example");
        assert_eq!(strip_ansi(bare), "[+] URL: https://a.example");
    }

    #[test]
    fn strip_ansi_keeps_markers_and_bracketed_ips() {
        let s = "[+] URL: https://a.example/ [93.184.216.34]";
        assert_eq!(strip_ansi(s), s);
    }

    #[test]
    fn url_loses_trailing_slash_and_ip_annotation() {
        let out = parse("[+] URL: https://example.com/ [93.184.216.34]\n").unwrap();
        assert_eq!(out.url, "https://example.com");
    }

    #[test]
    fn missing_url_is_fatal() {
        let err = parse("WordPress version 6.2 identified\n");
        assert!(matches!(err, Err(ParseError::NoTargetUrl)));
    }

    #[test]
    fn vuln_block_fields_are_independently_optional() {
        let text = "\
[+] URL: https://example.com/
[+] WordPress version 5.8 identified (Insecure)
 | Found By: Rss Generator (Passive Detection)
 |
 | [!] Title: Full block
 |     CVSS: 9.8
 |     Fixed in: 5.8.3
 |     References:
 |      - https://cve.mitre.org/cgi-bin/cvename.cgi?name=CVE-2022-0001
 |
 | [!] Title: Only a score
 |     CVSS: 4.3
 |
 | [!] Title: Bare title
";
        let out = parse(text).unwrap();
        assert_eq!(out.wordpress_vulns.len(), 3);

        let full = &out.wordpress_vulns[0];
        assert_eq!(full.title, "Full block");
        assert_eq!(full.cvss, Some(9.8));
        assert_eq!(full.fixed_in.as_deref(), Some("5.8.3"));
        assert!(full.cve_url.as_deref().unwrap().contains("cve.mitre.org"));

        let score_only = &out.wordpress_vulns[1];
        assert_eq!(score_only.cvss, Some(4.3));
        assert_eq!(score_only.fixed_in, None);
        assert_eq!(score_only.cve_url, None);

        let bare = &out.wordpress_vulns[2];
        assert_eq!(bare.title, "Bare title");
        assert_eq!(bare.cvss, None);
    }

    #[test]
    fn theme_vulns_stop_at_next_section() {
        let text = "\
[+] URL: https://example.com/
[+] WordPress theme in use: twentytwenty
 | Location: https://example.com/wp-content/themes/twentytwenty/
 | Style URL: https://example.com/wp-content/themes/twentytwenty/style.css
 | Version: 1.8
 |
 | [!] Title: Theme bug
 |     Fixed in: 1.9
[+] Enumerating users
";
        let out = parse(text).unwrap();
        assert_eq!(out.themes.len(), 1);
        let theme = &out.themes[0];
        assert_eq!(theme.name, "twentytwenty");
        assert_eq!(theme.version.as_deref(), Some("1.8"));
        assert!(theme.style_url.as_deref().unwrap().ends_with("style.css"));
        assert_eq!(theme.vulnerabilities.len(), 1);
        assert_eq!(theme.vulnerabilities[0].fixed_in.as_deref(), Some("1.9"));
        // The theme grammar carries no CVE reference field.
        assert_eq!(theme.vulnerabilities[0].cve_url, None);
        assert_eq!(theme.vulnerabilities[0].component, "twentytwenty");
    }

    #[test]
    fn plugins_are_a_stub() {
        let out = parse("[+] URL: https://example.com/\n").unwrap();
        assert!(out.plugins.is_empty());
    }
}
