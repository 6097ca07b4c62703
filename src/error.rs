use thiserror::Error;

/// Fatal parse failures. Anything short of a missing target URL is handled
/// by defaulting the affected field, not by erroring.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no target URL found in scanner output (expected a \"[+] URL: http...\" line)")]
    NoTargetUrl,
}

/// Per-finding capture failures. These are recorded in the finding's outcome
/// and never abort the run.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("navigation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("could not decode screenshot bytes: {0}")]
    Decode(#[from] image::ImageError),

    #[error("could not write annotated image: {0}")]
    Save(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
