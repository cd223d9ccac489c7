/// Separators that end a URI component for stem-matching purposes.
const COMPONENT_BOUNDARY: &[char] = &[
    '/', '.', ':', ';', '?', '#', '[', ']', '@', '!', '$', '&', '\'', '(', ')', '*', '+', ',',
    '=', '~',
];

/// Whether `stem` is a leftmost prefix of `content_id` ending at a URI
/// component boundary.
///
/// An empty stem matches nothing; an exact match always succeeds; a
/// proper prefix only counts when the next character of the content id
/// is a separator, so `"dvb://233a.1004"` matches
/// `"dvb://233a.1004.1044;abc"` but `"dvb://233a.10"` does not.
pub fn ci_matches_stem(content_id: &str, stem: &str) -> bool {
    if stem.is_empty() {
        return false;
    }
    let Some(rest) = content_id.strip_prefix(stem) else {
        return false;
    };
    match rest.chars().next() {
        None => true,
        Some(next) => COMPONENT_BOUNDARY.contains(&next),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(ci_matches_stem("dvb://233a.1004.1044", "dvb://233a.1004.1044"));
    }

    #[test]
    fn test_prefix_at_separator() {
        let ci = "dvb://233a.1004.1044;abc";
        assert!(ci_matches_stem(ci, "dvb://233a.1004.1044"));
        assert!(ci_matches_stem(ci, "dvb://233a.1004"));
        assert!(ci_matches_stem(ci, "dvb://233a"));
    }

    #[test]
    fn test_prefix_inside_component_rejected() {
        let ci = "dvb://233a.1004.1044;abc";
        assert!(!ci_matches_stem(ci, "dvb://233a.10"));
        assert!(!ci_matches_stem(ci, "dvb://233a.1004.104"));
    }

    #[test]
    fn test_unrelated_id_rejected() {
        assert!(!ci_matches_stem("http://other", "dvb://233a"));
    }

    #[test]
    fn test_empty_stem_matches_nothing() {
        assert!(!ci_matches_stem("dvb://233a", ""));
        assert!(!ci_matches_stem("", ""));
    }

    #[test]
    fn test_http_path_boundaries() {
        let ci = "http://host/programme/episode?clip=3";
        assert!(ci_matches_stem(ci, "http://host/programme"));
        assert!(ci_matches_stem(ci, "http://host/programme/episode"));
        assert!(!ci_matches_stem(ci, "http://host/prog"));
    }
}
