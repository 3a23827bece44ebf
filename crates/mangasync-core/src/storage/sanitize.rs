//! Turn manga titles into safe single path components.

/// Linux NAME_MAX.
const NAME_MAX: usize = 255;

/// Sanitizes a manga title for use as a directory name.
///
/// - Replaces NUL, `/`, `\`, whitespace and control characters with `_`
/// - Collapses runs of `_`
/// - Trims leading/trailing dots and underscores (no `..` or hidden dirs)
/// - Limits length to 255 bytes on a char boundary
pub fn sanitize_dir_name(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut prev_underscore = false;

    for c in title.chars() {
        let c = if c == '/' || c == '\\' || c.is_whitespace() || c.is_control() {
            '_'
        } else {
            c
        };
        if c == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_');
    let mut take = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_become_underscores() {
        assert_eq!(sanitize_dir_name("Fate/Zero \\ Side"), "Fate_Zero_Side");
    }

    #[test]
    fn traversal_is_neutralized() {
        assert_eq!(sanitize_dir_name("../../etc"), "etc");
        assert_eq!(sanitize_dir_name(".hidden"), "hidden");
    }

    #[test]
    fn control_chars_and_tabs() {
        assert_eq!(sanitize_dir_name("a\x00b\tc"), "a_b_c");
    }

    #[test]
    fn long_multibyte_title_is_cut_on_boundary() {
        let title = "漫".repeat(200);
        let out = sanitize_dir_name(&title);
        assert!(out.len() <= NAME_MAX);
        assert!(out.chars().all(|c| c == '漫'));
    }
}
