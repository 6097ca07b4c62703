use serde::{Deserialize, Serialize};

/// WordPress version disclosure extracted from the scan transcript.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct VersionInfo {
    pub version: String,
    /// Disclosure method reported by the scanner, e.g. "Rss Generator".
    pub found_by: String,
    pub disclosure_urls: Vec<DisclosureUrl>,
}

/// One URL/element pair where the version string was observed to leak.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DisclosureUrl {
    pub url: String,
    /// Location type, e.g. "RSS Feed".
    pub kind: String,
    /// Element or selector the version appeared in, e.g. "generator tag".
    pub element: String,
}

/// A single vulnerability block from the transcript. The three trailing
/// fields are each independently optional in the source format.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Vulnerability {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvss: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_in: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cve_url: Option<String>,
    /// Component the vulnerability belongs to ("WordPress Core" or a theme name).
    pub component: String,
}

/// An installed theme and its known vulnerabilities.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Theme {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_url: Option<String>,
    pub vulnerabilities: Vec<Vulnerability>,
}

/// An installed plugin. Plugin extraction is an extension point: no sample
/// output format exists yet, so the parser always returns an empty list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Plugin {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub vulnerabilities: Vec<Vulnerability>,
}

/// An informational exposure worth evidencing, e.g. an enabled XML-RPC endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InterestingFinding {
    /// Category tag, e.g. "XML-RPC Enabled".
    pub kind: String,
    pub url: String,
    pub severity: String,
    pub description: String,
}

/// Everything recovered from one scan transcript. Immutable after parsing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScanResult {
    /// Target URL, without trailing slash. The only mandatory field.
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wordpress_version: Option<VersionInfo>,
    pub wordpress_vulns: Vec<Vulnerability>,
    pub themes: Vec<Theme>,
    pub plugins: Vec<Plugin>,
    pub interesting_findings: Vec<InterestingFinding>,
}

impl ScanResult {
    /// Known vulnerabilities across core and all themes.
    pub fn total_vulns(&self) -> usize {
        self.wordpress_vulns.len()
            + self
                .themes
                .iter()
                .map(|t| t.vulnerabilities.len())
                .sum::<usize>()
    }
}

/// Which kind of finding a capture was taken for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    WordpressVersion,
    ThemeVersion,
    InterestingFinding,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    Success,
    Failed,
}

/// The success/failure record of one capture attempt. Exactly one outcome is
/// produced per finding with a resolvable URL; a successful outcome always
/// carries the relative path of a saved screenshot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CaptureOutcome {
    pub kind: OutcomeKind,
    pub url: String,
    pub status: CaptureStatus,
    /// Path of the annotated image relative to the output root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme_name: Option<String>,
    #[serde(default)]
    pub vuln_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CaptureOutcome {
    pub fn is_success(&self) -> bool {
        self.status == CaptureStatus::Success
    }
}
