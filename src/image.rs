//! Container image reference handling.

/// Splits an image reference into a repository prefix and its tag.
///
/// The prefix always ends with `:` so a new tag can be appended directly.
/// A `@digest` suffix is dropped before splitting, and a colon that belongs
/// to a `host:port` registry is never mistaken for a tag separator.
pub fn split_image(image: &str) -> (String, String) {
    let image = match image.find('@') {
        Some(idx) => &image[..idx],
        None => image,
    };

    match (image.rfind(':'), image.rfind('/')) {
        (Some(colon), Some(slash)) if colon < slash => (format!("{image}:"), String::new()),
        (Some(colon), _) => (image[..=colon].to_string(), image[colon + 1..].to_string()),
        (None, _) => (format!("{image}:"), String::new()),
    }
}

/// Returns true when `tag` is a well formed Docker tag.
pub fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    tag.len() <= 128
        && (first.is_ascii_alphanumeric() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
