//! MIME types for served assets.

/// Fallback for unknown extensions.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type for an asset path, derived from its extension.
pub fn content_type_for(path: &str) -> &'static str {
    let file_name: &str = path.rsplit('/').next().unwrap_or(path);
    let ext: String = match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return DEFAULT_CONTENT_TYPE,
    };

    match ext.as_str() {
        "html" | "htm" => "text/html",
        "js" | "mjs" => "application/javascript",
        "css" => "text/css",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "wasm" => "application/wasm",
        _ => DEFAULT_CONTENT_TYPE,
    }
}
