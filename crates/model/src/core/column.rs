/// Normalizes an event key into a warehouse column name.
///
/// camelCase boundaries become underscores, anything outside `[a-z0-9_]` is
/// replaced by `_`, runs of underscores collapse into one and a leading digit
/// gets an underscore prefix, so `pageURL.v2` becomes `page_url_v2`.
pub fn column_name(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 2);
    let mut prev_lower_or_digit = false;

    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower_or_digit {
                push_separator(&mut out);
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower_or_digit = false;
        } else if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            out.push(ch);
            prev_lower_or_digit = true;
        } else {
            push_separator(&mut out);
            prev_lower_or_digit = false;
        }
    }

    if out.is_empty() {
        return "_".to_string();
    }

    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }

    out
}

/// Returns true for names that can be used unquoted as a SQL identifier.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn push_separator(out: &mut String) {
    if !out.ends_with('_') {
        out.push('_');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camel_case_becomes_snake_case() {
        assert_eq!(column_name("userId"), "user_id");
        assert_eq!(column_name("collectorTstamp"), "collector_tstamp");
    }

    #[test]
    fn test_separators_collapse() {
        assert_eq!(column_name("Page URL"), "page_url");
        assert_eq!(column_name("a..b--c"), "a_b_c");
        assert_eq!(column_name("pageURL.v2"), "page_url_v2");
    }

    #[test]
    fn test_already_normalized_is_unchanged() {
        assert_eq!(column_name("event_id"), "event_id");
        assert_eq!(column_name("_private"), "_private");
    }

    #[test]
    fn test_leading_digit_and_empty() {
        assert_eq!(column_name("9lives"), "_9lives");
        assert_eq!(column_name(""), "_");
        assert_eq!(column_name("éé"), "_");
    }

    #[test]
    fn test_plain_identifier() {
        assert!(is_plain_identifier("events"));
        assert!(is_plain_identifier("_atomic_2"));
        assert!(!is_plain_identifier("2events"));
        assert!(!is_plain_identifier("Events"));
        assert!(!is_plain_identifier("events; drop"));
        assert!(!is_plain_identifier(""));
    }
}
