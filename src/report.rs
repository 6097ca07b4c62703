use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::Serialize;
use time::format_description::well_known;
use time::OffsetDateTime;

use crate::types::{
    CaptureOutcome, InterestingFinding, OutcomeKind, ScanResult, Theme, VersionInfo, Vulnerability,
};

const TEMPLATE: &str = include_str!("../templates/report.hbs");

#[derive(Serialize)]
struct Stats {
    total_vulnerabilities: usize,
    visual_evidence_captured: usize,
    failed_captures: usize,
    high_risk: usize,
    medium_risk: usize,
    low_risk: usize,
}

#[derive(Serialize)]
struct ReportData<'a> {
    title: &'static str,
    timestamp: String,
    target_url: &'a str,
    wordpress_version: Option<&'a VersionInfo>,
    wordpress_vulns: &'a [Vulnerability],
    themes: &'a [Theme],
    interesting_findings: &'a [InterestingFinding],
    version_shots: Vec<&'a CaptureOutcome>,
    theme_shots: Vec<&'a CaptureOutcome>,
    finding_shots: Vec<&'a CaptureOutcome>,
    failed: Vec<&'a CaptureOutcome>,
    stats: Stats,
}

/// Render the HTML evidence report into the output root and return its path.
/// Successful outcomes reference their screenshots relative to that root, so
/// the report can be opened in place or served as-is.
pub fn generate(
    scan: &ScanResult,
    outcomes: &[CaptureOutcome],
    output_dir: &Path,
) -> Result<PathBuf> {
    let mut handlebars = Handlebars::new();
    handlebars
        .register_template_string("report", TEMPLATE)
        .context("invalid report template")?;

    let html = handlebars
        .render("report", &report_data(scan, outcomes))
        .context("failed to render report")?;

    let path = output_dir.join("report.html");
    fs::write(&path, html)
        .with_context(|| format!("failed to write report: {}", path.display()))?;
    Ok(path)
}

fn report_data<'a>(scan: &'a ScanResult, outcomes: &'a [CaptureOutcome]) -> ReportData<'a> {
    let successes = |kind: OutcomeKind| {
        outcomes
            .iter()
            .filter(move |o| o.is_success() && o.kind == kind)
            .collect::<Vec<_>>()
    };

    ReportData {
        title: "Visual Vulnerability Evidence Report",
        timestamp: OffsetDateTime::now_utc()
            .format(&well_known::Rfc3339)
            .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z")),
        target_url: &scan.url,
        wordpress_version: scan.wordpress_version.as_ref(),
        wordpress_vulns: &scan.wordpress_vulns,
        themes: &scan.themes,
        interesting_findings: &scan.interesting_findings,
        version_shots: successes(OutcomeKind::WordpressVersion),
        theme_shots: successes(OutcomeKind::ThemeVersion),
        finding_shots: successes(OutcomeKind::InterestingFinding),
        failed: outcomes.iter().filter(|o| !o.is_success()).collect(),
        stats: stats(scan, outcomes),
    }
}

fn stats(scan: &ScanResult, outcomes: &[CaptureOutcome]) -> Stats {
    let mut high_risk = 0;
    let mut medium_risk = 0;
    let mut low_risk = 0;

    let all_vulns = scan
        .wordpress_vulns
        .iter()
        .chain(scan.themes.iter().flat_map(|t| t.vulnerabilities.iter()));
    for vuln in all_vulns {
        match vuln.cvss {
            Some(score) if score >= 7.0 => high_risk += 1,
            Some(score) if score >= 4.0 => medium_risk += 1,
            Some(_) => low_risk += 1,
            None => {}
        }
    }

    Stats {
        total_vulnerabilities: scan.total_vulns(),
        visual_evidence_captured: outcomes.iter().filter(|o| o.is_success()).count(),
        failed_captures: outcomes.iter().filter(|o| !o.is_success()).count(),
        high_risk,
        medium_risk,
        low_risk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CaptureStatus;

    fn outcome(kind: OutcomeKind, status: CaptureStatus) -> CaptureOutcome {
        CaptureOutcome {
            kind,
            url: "https://example.com/feed/".into(),
            status,
            screenshot: matches!(status, CaptureStatus::Success)
                .then(|| "screenshots/x.png".into()),
            error: matches!(status, CaptureStatus::Failed).then(|| "timeout".into()),
            version: None,
            found_by: None,
            element: None,
            theme_name: None,
            vuln_count: 0,
            description: None,
        }
    }

    fn scan_with_scores(scores: &[Option<f32>]) -> ScanResult {
        ScanResult {
            url: "https://example.com".into(),
            wordpress_version: None,
            wordpress_vulns: scores
                .iter()
                .map(|cvss| Vulnerability {
                    title: "t".into(),
                    cvss: *cvss,
                    fixed_in: None,
                    cve_url: None,
                    component: "WordPress Core".into(),
                })
                .collect(),
            themes: vec![],
            plugins: vec![],
            interesting_findings: vec![],
        }
    }

    #[test]
    fn stats_bucket_by_cvss_thresholds() {
        let scan = scan_with_scores(&[Some(9.8), Some(7.0), Some(5.1), Some(2.0), None]);
        let s = stats(&scan, &[]);
        assert_eq!(s.total_vulnerabilities, 5);
        assert_eq!(s.high_risk, 2);
        assert_eq!(s.medium_risk, 1);
        assert_eq!(s.low_risk, 1);
    }

    #[test]
    fn report_renders_and_references_screenshots() {
        let dir = tempfile::tempdir().unwrap();
        let scan = scan_with_scores(&[Some(9.8)]);
        let outcomes = vec![
            outcome(OutcomeKind::WordpressVersion, CaptureStatus::Success),
            outcome(OutcomeKind::InterestingFinding, CaptureStatus::Failed),
        ];

        let path = generate(&scan, &outcomes, dir.path()).unwrap();
        let html = fs::read_to_string(path).unwrap();
        assert!(html.contains("https://example.com"));
        assert!(html.contains("screenshots/x.png"));
        assert!(html.contains("timeout"));
    }
}
