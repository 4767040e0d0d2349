use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};

/// Longest side, in pixels, of a local image sent to a vision model.
pub const MAX_VISION_DIM: u32 = 1024;

/// Where an image reference is allowed to point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageSource {
    /// URLs and files readable by this process.
    #[default]
    AnyPath,
    /// `http(s)://` and `data:` URLs only. Used when references come from
    /// network callers.
    RemoteOnly,
}

/// True for references that never touch the local filesystem.
pub fn is_remote_image_ref(image_ref: &str) -> bool {
    let lowered = image_ref.trim().to_ascii_lowercase();
    lowered.starts_with("http://") || lowered.starts_with("https://") || lowered.starts_with("data:")
}

/// Turn an image reference into something a chat-completions endpoint accepts.
///
/// Remote (`http(s)://`) and inline (`data:`) URLs pass through untouched.
/// With [`ImageSource::AnyPath`] anything else is read from disk and inlined
/// as a base64 data URL; [`ImageSource::RemoteOnly`] rejects it unread.
pub fn resolve_image_url(image_ref: &str, source: ImageSource) -> Result<String> {
    let trimmed = image_ref.trim();
    if trimmed.is_empty() {
        bail!("image reference is empty");
    }
    if is_remote_image_ref(trimmed) {
        return Ok(trimmed.to_string());
    }
    if source == ImageSource::RemoteOnly {
        bail!("image reference must be an http(s):// or data: URL");
    }

    let path = Path::new(trimmed.strip_prefix("file://").unwrap_or(trimmed));
    if !path.is_file() {
        bail!("image not found: {}", path.display());
    }
    let (bytes, mime) = prepare_vision_image(path, MAX_VISION_DIM)?;
    Ok(format!("data:{mime};base64,{}", BASE64.encode(bytes)))
}

fn prepare_vision_image(path: &Path, max_dim: u32) -> Result<(Vec<u8>, String)> {
    if let Ok(image) = image::open(path) {
        let rgba = image.to_rgba8();
        let mut flattened = RgbaImage::new(rgba.width(), rgba.height());
        for (x, y, pixel) in rgba.enumerate_pixels() {
            let alpha = u16::from(pixel[3]);
            let blend = |channel: u8| -> u8 {
                (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
            };
            flattened.put_pixel(
                x,
                y,
                Rgba([blend(pixel[0]), blend(pixel[1]), blend(pixel[2]), 255]),
            );
        }
        let mut flattened = DynamicImage::ImageRgba8(flattened);
        if flattened.width() > max_dim || flattened.height() > max_dim {
            flattened = flattened.resize(max_dim, max_dim, FilterType::Triangle);
        }
        let rgb = flattened.to_rgb8();
        let mut bytes = Vec::new();
        let encoded = JpegEncoder::new_with_quality(&mut bytes, 90)
            .encode_image(&rgb)
            .is_ok();
        if encoded {
            return Ok((bytes, "image/jpeg".to_string()));
        }
    }

    let bytes =
        fs::read(path).with_context(|| format!("failed reading image {}", path.display()))?;
    Ok((bytes, guess_image_mime(path).to_string()))
}

fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" | "heif" => "image/heic",
        _ => "image/png",
    }
}
