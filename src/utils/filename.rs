/// Reduce a client-supplied filename to a safe display/storage name.
///
/// Directory components are dropped, forbidden characters replaced with `_`,
/// runs of `_` collapsed and leading dots removed. Returns `None` when
/// nothing usable remains.
pub fn sanitize_filename(input: &str) -> Option<String> {
    let base = input.rsplit(['/', '\\']).next().unwrap_or(input);

    let cleaned: String = base
        .chars()
        .map(|c| if is_forbidden(c) || c.is_whitespace() { '_' } else { c })
        .collect();

    // Collapse multiple underscores
    let mut compacted = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for c in cleaned.chars() {
        if c == '_' {
            if !prev_underscore {
                compacted.push(c);
            }
            prev_underscore = true;
        } else {
            compacted.push(c);
            prev_underscore = false;
        }
    }

    let trimmed = compacted.trim_start_matches(['.', '_']).trim_end_matches('_');
    if trimmed.is_empty() {
        return None;
    }

    let mut name = trimmed.to_string();
    if name.len() > 120 {
        let mut cut = 120;
        while !name.is_char_boundary(cut) {
            cut -= 1;
        }
        name.truncate(cut);
    }
    Some(name)
}

/// Sanitized name, or `file_<n>` (1-based) when the input is unusable.
pub fn display_name(input: &str, index: usize) -> String {
    sanitize_filename(input).unwrap_or_else(|| format!("file_{}", index + 1))
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}
