//! Destination naming policy and content-type resolution.
//!
//! Destinations can have stricter naming rules than the source, so every
//! destination key goes through `sanitize_key`: accented characters fold to
//! their base form, characters outside the allow-list are stripped,
//! whitespace runs collapse to a single space, and relative path tricks
//! (`.`, `..`, duplicate slashes) are removed. The original identifier is
//! preserved separately in `ObjectMeta`.

/// Resolve a content type from an identifier's extension.
///
/// Unknown or missing extensions fall back to an opaque binary type.
pub fn content_type_for(key: &str) -> &'static str {
    let ext = match key.rsplit_once('.') {
        Some((_, ext)) if !ext.contains('/') => ext.to_ascii_lowercase(),
        _ => return "application/octet-stream",
    };
    match ext.as_str() {
        "epub" => "application/epub+zip",
        "pdf" => "application/pdf",
        "mobi" => "application/x-mobipocket-ebook",
        "azw3" => "application/vnd.amazon.ebook",
        "cbz" => "application/vnd.comicbook+zip",
        "cbr" => "application/vnd.comicbook-rar",
        "txt" => "text/plain",
        "html" | "htm" => "text/html",
        "xml" => "application/xml",
        "json" => "application/json",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Fold an accented character to its base form, if it has one.
fn fold_accent(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => "A",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ė' | 'Ę' | 'Ě' => "E",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' | 'Į' | 'İ' => "I",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ő' => "O",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' | 'Ű' => "U",
        'ý' | 'ÿ' => "y",
        'Ý' => "Y",
        'ç' | 'ć' | 'č' => "c",
        'Ç' | 'Ć' | 'Č' => "C",
        'ñ' | 'ń' | 'ň' => "n",
        'Ñ' | 'Ń' | 'Ň' => "N",
        'š' | 'ś' => "s",
        'Š' | 'Ś' => "S",
        'ž' | 'ź' | 'ż' => "z",
        'Ž' | 'Ź' | 'Ż' => "Z",
        'ř' => "r",
        'Ř' => "R",
        'ť' => "t",
        'Ť' => "T",
        'ď' => "d",
        'Ď' => "D",
        'ł' => "l",
        'Ł' => "L",
        'đ' => "d",
        'Đ' => "D",
        'ß' => "ss",
        'æ' => "ae",
        'Æ' => "AE",
        'œ' => "oe",
        'Œ' => "OE",
        _ => return None,
    };
    Some(folded)
}

/// Sanitize an identifier for destinations with strict naming rules.
///
/// Path separators are preserved as segment boundaries; empty, `.` and `..`
/// segments are dropped so the result can never escape a destination root.
/// A key that sanitizes to nothing becomes `unnamed`.
pub fn sanitize_key(key: &str) -> String {
    let mut segments: Vec<String> = Vec::new();

    for segment in key.split(['/', '\\']) {
        if segment.is_empty() || segment == "." || segment == ".." {
            continue;
        }

        let mut cleaned = String::with_capacity(segment.len());
        let mut push = |c: char, cleaned: &mut String| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                cleaned.push(c);
            } else if c.is_whitespace() && !cleaned.is_empty() && !cleaned.ends_with(' ') {
                cleaned.push(' ');
            }
            // anything else is outside the allow-list and dropped
        };

        for c in segment.chars() {
            match fold_accent(c) {
                Some(folded) => {
                    for f in folded.chars() {
                        push(f, &mut cleaned);
                    }
                }
                None => push(c, &mut cleaned),
            }
        }

        let cleaned = cleaned.trim().to_string();
        if !cleaned.is_empty() {
            segments.push(cleaned);
        }
    }

    let joined = segments.join("/");
    if joined.is_empty() {
        "unnamed".to_string()
    } else {
        joined
    }
}
