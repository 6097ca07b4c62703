use wpshot::error::ParseError;
use wpshot::parser::parse;

/// Transcript matching the WPScan text format, plain encoding.
const PLAIN: &str = "\
_______________________________________________________________
[+] URL: https://example.com/ [93.184.216.34]
[+] Started: Thu Aug  6 10:12:01 2026

[+] XML-RPC seems to be enabled: https://example.com/xmlrpc.php
 | Found By: Direct Access (Aggressive Detection)

[+] WordPress version 6.2 identified (Insecure, released on 2023-03-29).
 | Found By: Rss Generator (Passive Detection)
 |  - https://example.com/feed/, <generator>https://wordpress.org/?v=6.2</generator>
 |
 | [!] Title: WP 6.2 - Directory Traversal
 |     Fixed in: 6.2.1
 |     References:
 |      - https://cve.mitre.org/cgi-bin/cvename.cgi?name=CVE-2023-0002
 |     CVSS: 7.5
 |
 | [!] Title: WP 6.2 - CSRF leading to stored XSS

[+] WordPress theme in use: twentytwentythree
 | Location: https://example.com/wp-content/themes/twentytwentythree/
 | Style URL: https://example.com/wp-content/themes/twentytwentythree/style.css
 | Version: 1.1
 |
 | [!] Title: Twenty Twenty-Three - Contributor+ Stored XSS
 |     CVSS: 6.5
 |     Fixed in: 1.2

[+] Finished: Thu Aug  6 10:12:44 2026
";

fn with_ansi(plain: &str) -> String {
    plain
        .replace("[+]", "\x1b[32m[+]\x1b[0m")
        .replace("[!]", "\x1b[31m[!]\x1b[0m")
}

#[test]
fn end_to_end_scenario() {
    let scan = parse(PLAIN).expect("parse ok");

    assert_eq!(scan.url, "https://example.com");

    let version = scan.wordpress_version.as_ref().expect("version present");
    assert_eq!(version.version, "6.2");
    assert!(version.found_by.starts_with("Rss Generator"));
    assert_eq!(version.disclosure_urls.len(), 1);
    assert_eq!(version.disclosure_urls[0].url, "https://example.com/feed/");
    assert_eq!(version.disclosure_urls[0].kind, "RSS Feed");
    assert_eq!(version.disclosure_urls[0].element, "generator tag");
}

#[test]
fn ansi_and_plain_encodings_parse_identically() {
    let plain = parse(PLAIN).expect("plain parses");
    let colorized = parse(&with_ansi(PLAIN)).expect("ansi parses");
    assert_eq!(plain, colorized);
}

#[test]
fn parsing_is_idempotent() {
    assert_eq!(parse(PLAIN).unwrap(), parse(PLAIN).unwrap());
}

#[test]
fn core_vulns_scoped_to_version_section() {
    let scan = parse(PLAIN).unwrap();

    // Two blocks inside the version section; the theme block must not leak in.
    assert_eq!(scan.wordpress_vulns.len(), 2);

    let traversal = &scan.wordpress_vulns[0];
    assert_eq!(traversal.title, "WP 6.2 - Directory Traversal");
    assert_eq!(traversal.cvss, Some(7.5));
    assert_eq!(traversal.fixed_in.as_deref(), Some("6.2.1"));
    assert!(traversal.cve_url.as_deref().unwrap().contains("CVE-2023-0002"));
    assert_eq!(traversal.component, "WordPress Core");

    let csrf = &scan.wordpress_vulns[1];
    assert_eq!(csrf.title, "WP 6.2 - CSRF leading to stored XSS");
    assert_eq!(csrf.cvss, None);
    assert_eq!(csrf.fixed_in, None);
    assert_eq!(csrf.cve_url, None);
}

#[test]
fn theme_section_is_complete() {
    let scan = parse(PLAIN).unwrap();
    assert_eq!(scan.themes.len(), 1);

    let theme = &scan.themes[0];
    assert_eq!(theme.name, "twentytwentythree");
    assert_eq!(theme.version.as_deref(), Some("1.1"));
    assert_eq!(
        theme.style_url.as_deref(),
        Some("https://example.com/wp-content/themes/twentytwentythree/style.css")
    );
    assert_eq!(theme.vulnerabilities.len(), 1);
    assert_eq!(theme.vulnerabilities[0].cvss, Some(6.5));
    assert_eq!(theme.vulnerabilities[0].fixed_in.as_deref(), Some("1.2"));
}

#[test]
fn xmlrpc_exposure_is_reported() {
    let scan = parse(PLAIN).unwrap();
    assert_eq!(scan.interesting_findings.len(), 1);
    let finding = &scan.interesting_findings[0];
    assert_eq!(finding.kind, "XML-RPC Enabled");
    assert_eq!(finding.url, "https://example.com/xmlrpc.php");
    assert_eq!(finding.severity, "info");
}

#[test]
fn missing_url_fails_with_no_partial_result() {
    let no_url = "WordPress version 6.2 identified\n[!] Title: Something\n";
    let err = parse(no_url).unwrap_err();
    assert!(matches!(err, ParseError::NoTargetUrl));
}

#[test]
fn url_without_ip_annotation_and_trailing_slash() {
    let scan = parse("[+] URL: http://blog.example.net\n").unwrap();
    assert_eq!(scan.url, "http://blog.example.net");
    assert!(scan.wordpress_version.is_none());
    assert!(scan.wordpress_vulns.is_empty());
    assert!(scan.themes.is_empty());
    assert!(scan.plugins.is_empty());
    assert!(scan.interesting_findings.is_empty());
}
