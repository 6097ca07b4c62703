use std::fs;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::warn;

use crate::error::CaptureError;

/// High-severity banner background.
const DANGER: Rgba<u8> = Rgba([220, 53, 69, 255]);
/// Informational banner background.
const INFO: Rgba<u8> = Rgba([255, 193, 7, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

const MARGIN: i32 = 20;
const LINE_STEP: i32 = 30;
/// Wrap free-text descriptions at this many characters, two lines max.
const WRAP_WIDTH: usize = 100;

/// What to write on the evidence banner, one variant per finding kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Banner {
    Version {
        version: String,
        element: String,
    },
    Theme {
        name: String,
        version: Option<String>,
        vuln_count: usize,
    },
    Finding {
        label: String,
        description: String,
    },
}

impl Banner {
    fn height(&self) -> u32 {
        match self {
            Banner::Version { .. } => 120,
            Banner::Theme { .. } => 150,
            Banner::Finding { description, .. } => {
                if description.len() < 60 {
                    100
                } else {
                    130
                }
            }
        }
    }

    /// Findings that carry known vulnerabilities render in the high-severity
    /// color; informational findings use the neutral color.
    fn background(&self) -> Rgba<u8> {
        match self {
            Banner::Version { .. } => DANGER,
            Banner::Theme { vuln_count, .. } => {
                if *vuln_count > 0 {
                    DANGER
                } else {
                    INFO
                }
            }
            Banner::Finding { .. } => INFO,
        }
    }

    fn foreground(&self) -> Rgba<u8> {
        match self {
            Banner::Finding { .. } => BLACK,
            _ => WHITE,
        }
    }
}

/// Overlay a descriptive banner on raw screenshot bytes.
///
/// Pure transform: the input buffer is never mutated and identical inputs
/// produce identical output. The only failure mode is undecodable bytes.
/// Without a font the banner is drawn with no text.
pub fn annotate(
    raw: &[u8],
    banner: &Banner,
    font: Option<&FontArc>,
) -> Result<RgbaImage, CaptureError> {
    let mut image = image::load_from_memory(raw)?.to_rgba8();

    let height = banner.height().min(image.height());
    let width = image.width();
    draw_filled_rect_mut(
        &mut image,
        Rect::at(0, 0).of_size(width, height),
        banner.background(),
    );

    let Some(font) = font else {
        return Ok(image);
    };
    let fg = banner.foreground();

    match banner {
        Banner::Version { version, element } => {
            draw_text_mut(&mut image, fg, MARGIN, 15, PxScale::from(32.0), font, "VULNERABILITY FOUND");
            let line = format!("WordPress Version {version} Disclosed");
            draw_text_mut(&mut image, fg, MARGIN, 55, PxScale::from(24.0), font, &line);
            let line = format!("Found in: {element}");
            draw_text_mut(&mut image, fg, MARGIN, 85, PxScale::from(24.0), font, &line);
        }
        Banner::Theme {
            name,
            version,
            vuln_count,
        } => {
            draw_text_mut(&mut image, fg, MARGIN, 15, PxScale::from(32.0), font, "THEME VERSION FOUND");
            let line = format!("Theme: {name}");
            draw_text_mut(&mut image, fg, MARGIN, 55, PxScale::from(24.0), font, &line);
            let line = format!("Version: {}", version.as_deref().unwrap_or("unknown"));
            draw_text_mut(&mut image, fg, MARGIN, 85, PxScale::from(24.0), font, &line);
            if *vuln_count > 0 {
                let line = format!("{vuln_count} Known Vulnerabilities");
                draw_text_mut(&mut image, fg, MARGIN, 115, PxScale::from(24.0), font, &line);
            }
        }
        Banner::Finding { label, description } => {
            draw_text_mut(&mut image, fg, MARGIN, 15, PxScale::from(28.0), font, label);
            let mut y = 55;
            for line in wrap_words(description, WRAP_WIDTH, 2) {
                draw_text_mut(&mut image, fg, MARGIN, y, PxScale::from(20.0), font, &line);
                y += LINE_STEP;
            }
        }
    }

    Ok(image)
}

/// Greedy word wrap capped at `max_lines`; words past the cap are dropped
/// rather than overflowing the banner.
fn wrap_words(text: &str, width: usize, max_lines: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if current.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
            if lines.len() == max_lines {
                return lines;
            }
            current.push_str(word);
        } else {
            current.push(' ');
            current.push_str(word);
        }
    }
    if !current.is_empty() && lines.len() < max_lines {
        lines.push(current);
    }
    lines
}

/// Load an annotation font: the explicit path if given, otherwise the first
/// readable candidate from common system locations. `None` (with a warning)
/// when nothing loads; banners then render without text.
pub fn load_font(explicit: Option<&Path>) -> Option<FontArc> {
    const CANDIDATES: &[&str] = &[
        "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
        "C:\\Windows\\Fonts\\arial.ttf",
    ];

    if let Some(path) = explicit {
        match try_load_font(path) {
            Some(font) => return Some(font),
            None => warn!(path = %path.display(), "could not load requested font"),
        }
    }

    for candidate in CANDIDATES {
        if let Some(font) = try_load_font(Path::new(candidate)) {
            return Some(font);
        }
    }
    warn!("no usable annotation font found, banners will have no text");
    None
}

fn try_load_font(path: &Path) -> Option<FontArc> {
    let bytes = fs::read(path).ok()?;
    FontArc::try_from_vec(bytes).ok()
}
