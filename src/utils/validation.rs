use image::DynamicImage;
use std::collections::HashSet;
use std::path::Path;

/// Minimum width and height of an output screenshot in pixels
pub const MIN_IMAGE_SIDE: u32 = 400;
/// Screenshots rarely carry more distinct colors than this; photos do
pub const MAX_IMAGE_COLORS: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Lowercased extension of `filename`, if any
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Strips path components and replaces characters that are unsafe in
/// storage keys or download headers
pub fn sanitize_filename(filename: &str) -> Result<String, ValidationError> {
    // Browsers on Windows may send the full client path
    let last = filename.rsplit(['/', '\\']).next().unwrap_or("");

    if filename.contains("..") {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    let sanitized: String = last
        .trim()
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';') {
                '_'
            } else {
                c
            }
        })
        .collect();
    let sanitized = sanitized.trim_start_matches('.').to_string();

    if sanitized.is_empty() {
        return Err(ValidationError::new(
            "INVALID_FILENAME",
            "Filename cannot be empty",
        ));
    }

    // Limit length safely for UTF-8
    let sanitized = if sanitized.len() > 200 {
        let mut end = 200;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    Ok(sanitized)
}

pub fn validate_extension(filename: &str, allowed: &[String]) -> Result<String, ValidationError> {
    match file_extension(filename) {
        Some(ext) if allowed.iter().any(|a| a == &ext) => Ok(ext),
        _ => Err(ValidationError::new(
            "UNSUPPORTED_TYPE",
            format!("Unsupported file type: {}", filename),
        )),
    }
}

pub fn validate_file_size(
    filename: &str,
    size: usize,
    max_size: usize,
) -> Result<(), ValidationError> {
    if size > max_size {
        return Err(ValidationError::new(
            "FILE_TOO_LARGE",
            format!(
                "{} exceeds max allowed size of {} MB.",
                filename,
                max_size / 1024 / 1024
            ),
        ));
    }
    Ok(())
}

/// Checks that the bytes match what the extension claims.
///
/// Returns the sniffed MIME type when one could be determined.
pub fn validate_content(
    filename: &str,
    ext: &str,
    data: &[u8],
    screen_images: bool,
) -> Result<Option<String>, ValidationError> {
    let invalid = || {
        ValidationError::new(
            "INVALID_CONTENT",
            format!("Invalid or unsupported file content: {}", filename),
        )
    };

    let sniffed = infer::get(data);

    match ext {
        "pdf" => {
            if !data.starts_with(b"%PDF") {
                return Err(invalid());
            }
            Ok(Some("application/pdf".to_string()))
        }
        "png" | "jpg" | "jpeg" => {
            let expected = if ext == "png" { "image/png" } else { "image/jpeg" };
            match sniffed {
                Some(kind) if kind.mime_type() == expected => {}
                _ => return Err(invalid()),
            }
            let img = image::load_from_memory(data).map_err(|e| {
                tracing::debug!("Image decode failed for {}: {}", filename, e);
                invalid()
            })?;
            if screen_images && !looks_like_screenshot(&img) {
                return Err(invalid());
            }
            Ok(Some(expected.to_string()))
        }
        _ => {
            if infer::is_app(data) {
                tracing::warn!("Executable content uploaded as {}", filename);
                return Err(invalid());
            }
            Ok(sniffed.map(|kind| kind.mime_type().to_string()))
        }
    }
}

/// Heuristics that reject memes, selfies and random photos while letting
/// program output screenshots through
pub fn looks_like_screenshot(img: &DynamicImage) -> bool {
    let (width, height) = (img.width(), img.height());
    if width < MIN_IMAGE_SIDE || height < MIN_IMAGE_SIDE {
        return false;
    }

    let ratio = width as f64 / height as f64;
    if !(0.5..=2.0).contains(&ratio) {
        return false;
    }

    let rgb = img.to_rgb8();
    let mut colors = HashSet::new();
    let mut total = [0u64; 3];
    for pixel in rgb.pixels() {
        let [r, g, b] = pixel.0;
        total[0] += r as u64;
        total[1] += g as u64;
        total[2] += b as u64;
        if colors.len() <= MAX_IMAGE_COLORS {
            colors.insert(pixel.0);
        }
    }
    if colors.len() > MAX_IMAGE_COLORS {
        return false;
    }

    let pixels = (width as u64) * (height as u64);
    let brightness = total.iter().map(|c| *c as f64 / pixels as f64).sum::<f64>() / 3.0;
    (50.0..=220.0).contains(&brightness)
}
