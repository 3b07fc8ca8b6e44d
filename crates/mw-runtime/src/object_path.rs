//! `/`-separated object keys, as used by both storage backends.

const SEPARATOR: char = '/';
const S3_SCHEME: &str = "s3://";

/// Drop an `s3://` scheme and any trailing separators.
#[must_use]
pub fn normalize(path: &str) -> String {
    let stripped = path.strip_prefix(S3_SCHEME).unwrap_or(path);
    rstrip_separator(stripped).to_owned()
}

#[must_use]
pub fn rstrip_separator(path: &str) -> &str {
    path.trim_end_matches(SEPARATOR)
}

/// Join parts with single separators. Separators at the edges of each part
/// are dropped, as are parts that end up empty. A leading separator on the
/// first part is preserved.
#[must_use]
pub fn join(parts: &[&str]) -> String {
    let absolute = parts
        .iter()
        .find(|part| !part.is_empty())
        .is_some_and(|part| part.starts_with(SEPARATOR));
    let joined = parts
        .iter()
        .map(|part| part.trim_matches(SEPARATOR))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

#[must_use]
pub fn parent(path: &str) -> &str {
    let trimmed = rstrip_separator(path);
    match trimmed.rfind(SEPARATOR) {
        Some(0) => "/",
        Some(pos) => &trimmed[..pos],
        None => "",
    }
}

#[must_use]
pub fn basename(path: &str) -> &str {
    let trimmed = rstrip_separator(path);
    trimmed
        .rfind(SEPARATOR)
        .map_or(trimmed, |pos| &trimmed[pos + 1..])
}

/// Final component without its last extension. Dotfiles keep their name.
#[must_use]
pub fn stem(path: &str) -> &str {
    let name = basename(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(pos) => &name[..pos],
    }
}

/// Last extension including the dot, or `""`.
#[must_use]
pub fn suffix(path: &str) -> &str {
    let name = basename(path);
    match name.rfind('.') {
        Some(0) | None => "",
        Some(pos) => &name[pos..],
    }
}

#[must_use]
pub fn with_name(path: &str, name: &str) -> String {
    join(&[parent(path), name])
}

/// Replace the extension of the final component. `new_suffix` includes the
/// dot; an empty suffix removes the extension.
#[must_use]
pub fn with_suffix(path: &str, new_suffix: &str) -> String {
    let name = format!("{}{new_suffix}", stem(path));
    with_name(path, &name)
}
