use serde_json::Value;

/// Separators accepted between tags in a free-form tag field
const TAG_SEPARATORS: [char; 7] = [',', '，', ';', '；', '|', '/', ' '];

/// Parses a work's raw tag column into display tags
///
/// Accepts a JSON array or a string split on any of `TAG_SEPARATORS`.
/// Order is preserved, fragments are trimmed and empty ones dropped.
/// Malformed input never fails; it yields whatever fragments survive.
pub fn parse_tags_field(field: Option<&str>) -> Vec<String> {
    let Some(raw) = field.filter(|raw| !raw.is_empty()) else {
        return Vec::new();
    };

    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw) {
        return items
            .iter()
            .filter_map(|item| match item {
                Value::String(tag) => Some(tag.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|tag| !tag.is_empty())
            .collect();
    }

    raw.split(|c: char| TAG_SEPARATORS.contains(&c))
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Key used for tag affinity lookups
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_separators() {
        assert_eq!(
            parse_tags_field(Some("仙侠, 穿越；重生")),
            vec!["仙侠", "穿越", "重生"]
        );
    }

    #[test]
    fn test_every_separator() {
        assert_eq!(
            parse_tags_field(Some("a,b，c;d；e|f/g h")),
            vec!["a", "b", "c", "d", "e", "f", "g", "h"]
        );
    }

    #[test]
    fn test_json_array() {
        assert_eq!(
            parse_tags_field(Some(r#"[" Fantasy ", "", 3, null]"#)),
            vec!["Fantasy", "3"]
        );
    }

    #[test]
    fn test_json_scalar_falls_back_to_splitting() {
        assert_eq!(parse_tags_field(Some("\"a b\"")), vec!["\"a", "b\""]);
        assert_eq!(parse_tags_field(Some("42")), vec!["42"]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(parse_tags_field(None).is_empty());
        assert!(parse_tags_field(Some("")).is_empty());
        assert!(parse_tags_field(Some(" ,，; ")).is_empty());
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("  LitRPG "), "litrpg");
    }
}
