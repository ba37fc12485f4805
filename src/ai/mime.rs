//! Image MIME type resolution for fetched and generated images.

/// `image/*` media type from a `Content-Type` header value, without parameters.
pub fn image_mime_from_header(content_type: Option<&str>) -> Option<String> {
    let media_type = content_type?.split(';').next()?.trim().to_lowercase();
    media_type.starts_with("image/").then_some(media_type)
}

/// Prefer the declared image type, then the file signature, then JPEG.
pub fn resolve_image_mime(content_type: Option<&str>, bytes: &[u8]) -> String {
    if let Some(declared) = image_mime_from_header(content_type) {
        return declared;
    }

    let sniffed = match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, b'P', b'N', b'G', ..] => Some("image/png"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        _ => None,
    };

    sniffed.map(str::to_string).unwrap_or_else(|| {
        tracing::warn!(
            "No image type in Content-Type {:?} and unknown signature {:02X?}, assuming image/jpeg",
            content_type,
            &bytes[..bytes.len().min(4)]
        );
        "image/jpeg".to_string()
    })
}
