//! Static MIME lookup.
//!
//! An immutable extension table built at compile time with `phf`.

use phf::phf_map;

/// Fallback for unknown extensions.
pub const DEFAULT_TYPE: &str = "application/octet-stream";

static TYPES: phf::Map<&'static str, &'static str> = phf_map! {
    "bin" => "application/octet-stream",
    "conf" => "text/plain",
    "css" => "text/css",
    "csv" => "text/csv",
    "def" => "text/plain",
    "gif" => "image/gif",
    "htm" => "text/html",
    "html" => "text/html",
    "ico" => "image/x-icon",
    "in" => "text/plain",
    "ini" => "text/plain",
    "jpeg" => "image/jpeg",
    "jpg" => "image/jpeg",
    "js" => "application/javascript",
    "json" => "application/json",
    "list" => "text/plain",
    "log" => "text/plain",
    "map" => "application/json",
    "md" => "text/markdown",
    "mjs" => "application/javascript",
    "pdf" => "application/pdf",
    "png" => "image/png",
    "svg" => "image/svg+xml",
    "text" => "text/plain",
    "txt" => "text/plain",
    "urlencoded" => "application/x-www-form-urlencoded",
    "wasm" => "application/wasm",
    "webp" => "image/webp",
    "xml" => "application/xml",
    "xsd" => "application/xml",
    "xsl" => "application/xml",
};

/// Look up the type for an extension or file name (`"html"`, `".json"`,
/// `"index.html"`). Case-insensitive.
pub fn lookup(name: &str) -> Option<&'static str> {
    let ext = name.rsplit('.').next().unwrap_or(name);
    TYPES.get(ext.to_ascii_lowercase().as_str()).copied()
}

/// Resolve a `type` shorthand: anything containing `/` is already a MIME
/// type, anything else is looked up, falling back to [`DEFAULT_TYPE`].
pub fn content_type(token: &str) -> &str {
    if token.contains('/') {
        token
    } else {
        lookup(token).unwrap_or(DEFAULT_TYPE)
    }
}

/// Default charset for a MIME type.
pub fn charset(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or(mime).trim().to_ascii_lowercase();
    if essence.starts_with("text/")
        || essence == "application/javascript"
        || essence == "application/json"
    {
        Some("UTF-8")
    } else {
        None
    }
}

/// Replace or add the `charset` parameter of a content type.
pub fn set_charset(content_type: &str, charset: &str) -> String {
    let mut parts = content_type
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty());
    let essence = parts.next().unwrap_or_default();
    let mut out = essence.to_owned();
    for part in parts {
        if !part.to_ascii_lowercase().starts_with("charset=") {
            out.push_str("; ");
            out.push_str(part);
        }
    }
    out.push_str("; charset=");
    out.push_str(charset);
    out
}
