use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ab_glyph::FontArc;
use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::annotate::{annotate, Banner};
use crate::browser::CaptureBackend;
use crate::error::CaptureError;
use crate::types::{CaptureOutcome, CaptureStatus, OutcomeKind, ScanResult};

/// One planned visit: a finding that resolved to a capturable URL, plus
/// everything needed to annotate and file its screenshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureJob {
    pub kind: OutcomeKind,
    pub url: String,
    /// Deterministic image filename under `screenshots/`.
    pub filename: String,
    pub banner: Banner,
    pub version: Option<String>,
    pub found_by: Option<String>,
    pub element: Option<String>,
    pub theme_name: Option<String>,
    pub vuln_count: usize,
    pub description: Option<String>,
}

/// Flatten a scan result into the ordered list of capture jobs: version
/// disclosure locations first, then themes with a stylesheet URL, then
/// interesting findings with a URL. Findings without a resolvable URL yield
/// no job, and therefore no outcome. The order here fixes the order of the
/// final outcome sequence regardless of capture completion order.
pub fn plan_jobs(scan: &ScanResult) -> Vec<CaptureJob> {
    let mut jobs = Vec::new();
    let mut used_names = HashSet::new();

    if let Some(version) = &scan.wordpress_version {
        for disclosure in &version.disclosure_urls {
            jobs.push(CaptureJob {
                kind: OutcomeKind::WordpressVersion,
                url: disclosure.url.clone(),
                filename: unique_name(
                    &mut used_names,
                    format!("wp_version_{}", sanitize(&version.version)),
                ),
                banner: Banner::Version {
                    version: version.version.clone(),
                    element: disclosure.element.clone(),
                },
                version: Some(version.version.clone()),
                found_by: Some(version.found_by.clone()),
                element: Some(disclosure.element.clone()),
                theme_name: None,
                vuln_count: 0,
                description: None,
            });
        }
    }

    for theme in &scan.themes {
        let Some(style_url) = &theme.style_url else {
            continue;
        };
        jobs.push(CaptureJob {
            kind: OutcomeKind::ThemeVersion,
            url: style_url.clone(),
            filename: unique_name(
                &mut used_names,
                format!("theme_{}_version", sanitize(&theme.name)),
            ),
            banner: Banner::Theme {
                name: theme.name.clone(),
                version: theme.version.clone(),
                vuln_count: theme.vulnerabilities.len(),
            },
            version: theme.version.clone(),
            found_by: None,
            element: None,
            theme_name: Some(theme.name.clone()),
            vuln_count: theme.vulnerabilities.len(),
            description: None,
        });
    }

    for finding in &scan.interesting_findings {
        if finding.url.is_empty() {
            continue;
        }
        jobs.push(CaptureJob {
            kind: OutcomeKind::InterestingFinding,
            url: finding.url.clone(),
            filename: unique_name(
                &mut used_names,
                format!("finding_{}", sanitize(&finding.kind)),
            ),
            banner: Banner::Finding {
                label: finding.kind.clone(),
                description: finding.description.clone(),
            },
            version: None,
            found_by: None,
            element: None,
            theme_name: None,
            vuln_count: 0,
            description: Some(finding.description.clone()),
        });
    }

    jobs
}

/// Capture, annotate and persist evidence for every plannable finding using
/// one shared browser session.
///
/// Jobs run through a semaphore-bounded pool (`concurrency` pages at most;
/// 1 reproduces strictly sequential captures). A job that fails with a
/// timeout, an unreachable target, bad image bytes or an unwritable file
/// records a `failed` outcome and never cancels its siblings. Outcomes are
/// returned in plan
/// order. Ctrl-C cancels the not-yet-started remainder of the run.
pub async fn capture_all<B>(
    backend: Arc<B>,
    scan: &ScanResult,
    output_dir: &Path,
    concurrency: usize,
    font: Option<FontArc>,
    cancel: CancellationToken,
) -> Result<Vec<CaptureOutcome>>
where
    B: CaptureBackend + 'static,
{
    let jobs = plan_jobs(scan);
    let screenshots_dir = output_dir.join("screenshots");
    fs::create_dir_all(&screenshots_dir).with_context(|| {
        format!(
            "failed to create screenshots directory: {}",
            screenshots_dir.display()
        )
    })?;

    let sem = Arc::new(Semaphore::new(concurrency.clamp(1, 16)));
    let mut set: JoinSet<(usize, CaptureOutcome)> = JoinSet::new();

    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_ctrlc.cancel();
    });

    let total = jobs.len();
    for (idx, job) in jobs.into_iter().enumerate() {
        if cancel.is_cancelled() {
            warn!("capture run cancelled, skipping remaining findings");
            break;
        }
        let permit = sem
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore in scope");
        let backend = backend.clone();
        let dir = screenshots_dir.clone();
        let font = font.clone();
        let cancel = cancel.clone();

        set.spawn(async move {
            let _permit = permit; // keep permit until the capture completes

            if cancel.is_cancelled() {
                return (idx, failed_outcome(&job, "run cancelled"));
            }
            info!(url = %job.url, "capturing evidence ({}/{})", idx + 1, total);
            (idx, run_job(backend.as_ref(), &job, &dir, font.as_ref()).await)
        });
    }

    let mut slots: Vec<Option<CaptureOutcome>> = vec![None; total];
    while let Some(res) = set.join_next().await {
        if let Ok((idx, outcome)) = res {
            slots[idx] = Some(outcome);
        }
    }

    Ok(slots.into_iter().flatten().collect())
}

async fn run_job<B: CaptureBackend>(
    backend: &B,
    job: &CaptureJob,
    screenshots_dir: &Path,
    font: Option<&FontArc>,
) -> CaptureOutcome {
    match try_capture(backend, job, screenshots_dir, font).await {
        Ok(rel_path) => {
            info!(url = %job.url, screenshot = %rel_path, "captured");
            CaptureOutcome {
                kind: job.kind,
                url: job.url.clone(),
                status: CaptureStatus::Success,
                screenshot: Some(rel_path),
                error: None,
                version: job.version.clone(),
                found_by: job.found_by.clone(),
                element: job.element.clone(),
                theme_name: job.theme_name.clone(),
                vuln_count: job.vuln_count,
                description: job.description.clone(),
            }
        }
        Err(e) => {
            warn!(url = %job.url, error = %e, "capture failed");
            failed_outcome(job, &e.to_string())
        }
    }
}

async fn try_capture<B: CaptureBackend>(
    backend: &B,
    job: &CaptureJob,
    screenshots_dir: &Path,
    font: Option<&FontArc>,
) -> Result<String, CaptureError> {
    let raw = backend.capture(&job.url).await?;
    let annotated = annotate(&raw, &job.banner, font)?;

    let path: PathBuf = screenshots_dir.join(&job.filename);
    annotated
        .save(&path)
        .map_err(|e| CaptureError::Save(e.to_string()))?;

    // Relative to the output root, with forward slashes for the report.
    Ok(format!("screenshots/{}", job.filename))
}

fn failed_outcome(job: &CaptureJob, error: &str) -> CaptureOutcome {
    CaptureOutcome {
        kind: job.kind,
        url: job.url.clone(),
        status: CaptureStatus::Failed,
        screenshot: None,
        error: Some(error.to_string()),
        version: job.version.clone(),
        found_by: job.found_by.clone(),
        element: job.element.clone(),
        theme_name: job.theme_name.clone(),
        vuln_count: job.vuln_count,
        description: job.description.clone(),
    }
}

/// Replace anything that is not filesystem-safe with an underscore.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Deterministic collision handling: a repeated stem gets a numeric suffix.
fn unique_name(used: &mut HashSet<String>, stem: String) -> String {
    let mut name = format!("{stem}.png");
    let mut n = 2;
    while !used.insert(name.clone()) {
        name = format!("{stem}_{n}.png");
        n += 1;
    }
    name
}
