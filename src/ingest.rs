//! Image Ingestion
//!
//! Builds an [`ImagePayload`] from the ways a user can hand over an image:
//! a local file, raw upload bytes, a pasted or dragged image URL, a
//! `data:image/...;base64,` URL, or a dragged HTML fragment containing an
//! `<img>` tag.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use regex::Regex;
use reqwest::Url;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::types::{is_image_mime, ImagePayload};

/// File extensions treated as images when sniffing a URL path.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "svg"];

/// Image hosts whose URLs often lack an extension.
const IMAGE_HOSTS: &[&str] = &["imgur", "flickr", "unsplash"];

/// Raw bytes with a declared content type (e.g. an HTTP upload).
pub fn from_bytes(bytes: Vec<u8>, content_type: &str) -> Result<ImagePayload, PipelineError> {
    ImagePayload::new(bytes, content_type)
}

/// Read a local file; the MIME type comes from the extension.
pub async fn from_path(path: &Path) -> Result<ImagePayload, PipelineError> {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PipelineError::Input(format!("cannot read {}: {e}", path.display())))?;
    debug!(path = %path.display(), mime = %mime, bytes = bytes.len(), "Image read from file");
    ImagePayload::new(bytes, mime.essence_str())
}

/// Decode a `data:image/<type>;base64,<data>` URL.
pub fn from_data_url(data_url: &str) -> Result<ImagePayload, PipelineError> {
    let rest = data_url
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| PipelineError::Input("not a data: URL".to_string()))?;
    let (meta, data) = rest
        .split_once(',')
        .ok_or_else(|| PipelineError::Input("data: URL has no payload".to_string()))?;

    let mut params = meta.split(';');
    let mime = params.next().unwrap_or_default();
    if !params.any(|p| p.eq_ignore_ascii_case("base64")) {
        return Err(PipelineError::Input(
            "only base64-encoded data: URLs are supported".to_string(),
        ));
    }

    let bytes = BASE64_STANDARD
        .decode(data.trim())
        .map_err(|e| PipelineError::Input(format!("invalid base64 in data: URL: {e}")))?;
    ImagePayload::new(bytes, mime)
}

/// Fetch an image URL (or decode a `data:` URL locally).
///
/// The MIME type comes from the response `Content-Type`, falling back to the
/// URL path's extension when the server sends something generic.
pub async fn from_url(
    client: &reqwest::Client,
    url: &str,
    max_bytes: usize,
) -> Result<ImagePayload, PipelineError> {
    let url = url.trim();
    if url.starts_with("data:") {
        return from_data_url(url);
    }

    let parsed = Url::parse(url)
        .map_err(|e| PipelineError::Input(format!("invalid image URL '{url}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(PipelineError::Input(format!(
            "unsupported URL scheme '{}'",
            parsed.scheme()
        )));
    }

    let mut resp = client
        .get(parsed.clone())
        .send()
        .await
        .map_err(|e| PipelineError::Input(format!("failed to fetch image from {url}: {e}")))?;
    if !resp.status().is_success() {
        return Err(PipelineError::Input(format!(
            "failed to fetch image from {url}: status {}",
            resp.status()
        )));
    }
    if resp.content_length().is_some_and(|len| len > max_bytes as u64) {
        return Err(too_large(max_bytes));
    }

    let header_mime = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    // Read chunk by chunk so a response without Content-Length cannot grow
    // past the limit in memory.
    let mut bytes = Vec::new();
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| PipelineError::Input(format!("failed to read image from {url}: {e}")))?
    {
        if bytes.len() + chunk.len() > max_bytes {
            warn!(url = %url, max_bytes, "Image download exceeded limit, aborting");
            return Err(too_large(max_bytes));
        }
        bytes.extend_from_slice(&chunk);
    }

    let mime = header_mime
        .filter(|m| is_image_mime(m))
        .or_else(|| {
            mime_guess::from_path(parsed.path())
                .first()
                .map(|m| m.essence_str().to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    info!(url = %url, mime = %mime, bytes = bytes.len(), "Image fetched from URL");
    ImagePayload::new(bytes, mime)
}

fn too_large(max_bytes: usize) -> PipelineError {
    PipelineError::Input(format!("image exceeds the {max_bytes}-byte limit"))
}

/// Whether a pasted or dragged string looks like an image URL.
pub fn is_image_url(text: &str) -> bool {
    let text = text.trim();
    if text.starts_with("data:image/") {
        return true;
    }
    let Ok(url) = Url::parse(text) else {
        return false;
    };

    let path = url.path().to_ascii_lowercase();
    let has_image_extension = path
        .rsplit_once('.')
        .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext));
    let on_image_host = url
        .host_str()
        .is_some_and(|host| IMAGE_HOSTS.iter().any(|h| host.contains(h)));

    has_image_extension || on_image_host
}

/// `src` of the first `<img>` tag in an HTML fragment.
///
/// Only sources that can be fetched on their own are returned: absolute
/// http(s) URLs, protocol-relative URLs (as https) and `data:` URLs. A
/// relative path has no base to resolve against and yields `None`.
pub fn extract_image_url_from_html(html: &str) -> Option<String> {
    static IMG_SRC: OnceLock<Regex> = OnceLock::new();
    let pattern = IMG_SRC.get_or_init(|| {
        Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
            .unwrap_or_else(|e| unreachable!("static regex: {e}"))
    });
    let caps = pattern.captures(html)?;
    let src = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3))?;
    let src = src.as_str().trim().replace("&amp;", "&");
    if src.starts_with("data:") {
        return Some(src);
    }
    let src = match src.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => src,
    };
    match Url::parse(&src) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(src),
        _ => {
            debug!(src = %src, "Ignoring non-absolute image source");
            None
        }
    }
}
