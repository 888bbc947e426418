const UNTITLED_SLUG: &str = "untitled";

/// Lowercases `name` and collapses every run of non-alphanumeric characters
/// into a single hyphen, trimming hyphens from both ends. Names with no
/// alphanumeric content map to `untitled` so a slug is never empty.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;
    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        } else {
            pending_hyphen = true;
        }
    }
    if slug.is_empty() {
        UNTITLED_SLUG.to_string()
    } else {
        slug
    }
}

/// A slug is safe to use as a directory name when it only contains the
/// characters `slugify` can produce.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && !slug.starts_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// Media filenames derived from free-form prompts: whitespace becomes `-`,
/// everything is lowercased and path-hostile characters are dropped.
pub fn media_filename(prompt: &str, extension: &str) -> String {
    let mut stem = String::with_capacity(prompt.len());
    let mut in_space = false;
    for ch in prompt.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_whitespace() {
            if !in_space {
                stem.push('-');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if ch.is_alphanumeric() || ch == '-' || ch == '_' {
            stem.push(ch);
        }
    }
    if stem.is_empty() {
        stem.push_str("media");
    }
    format!("{stem}.{extension}")
}
