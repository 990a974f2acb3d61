//! Parsing of free-text listing fields.
//!
//! Scraped listings describe floors, room counts and list-valued columns
//! as text. These helpers turn them into typed values; anything that does
//! not parse comes back as `None` so the caller decides between imputing
//! and dropping.

use crate::types::MISSING_INFO;

/// Floor descriptor for a basement unit.
pub const FLOOR_CELLAR: &str = "cellar";
/// Floor descriptor for a ground-level unit.
pub const FLOOR_GROUND: &str = "ground_floor";

/// Trim a scraped string, mapping blanks and the missing-info marker to `None`.
pub fn normalize_text(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(MISSING_INFO) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse a floor descriptor.
///
/// `"cellar"` is -1, `"ground_floor"` is 0, anything else yields the first
/// embedded integer. Missing or integer-free descriptors yield `default`.
pub fn parse_floor(value: Option<&str>, default: Option<i32>) -> Option<i32> {
    let Some(text) = normalize_text(value) else {
        return default;
    };

    match text.as_str() {
        FLOOR_CELLAR => Some(-1),
        FLOOR_GROUND => Some(0),
        other => first_integer(other).or(default),
    }
}

/// First run of ASCII digits in `text`, if any.
fn first_integer(text: &str) -> Option<i32> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Parse a room count. Only a purely numeric string is accepted.
pub fn parse_rooms(value: Option<&str>) -> Option<u32> {
    let text = value?.trim();
    // CSV readers may hand integer columns back as "3.0"
    let text = text.strip_suffix(".0").unwrap_or(text);
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Keep a build year only if it lies inside the inclusive `range`.
pub fn valid_build_year(year: Option<f64>, range: (i32, i32)) -> Option<f64> {
    let year = year?;
    if !year.is_finite() || year < range.0 as f64 || year > range.1 as f64 {
        None
    } else {
        Some(year)
    }
}

/// Parse a list literal such as `"['balkon', 'winda']"` into its items.
///
/// Accepts single or double quoted items and unquoted items; an empty or
/// malformed literal yields an empty list.
pub fn parse_list_literal(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);

    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in inner.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == ',' => {
                push_item(&mut items, &current);
                current.clear();
            }
            None => current.push(c),
        }
    }
    push_item(&mut items, &current);
    items
}

fn push_item(items: &mut Vec<String>, raw: &str) {
    let item = raw.trim();
    if !item.is_empty() {
        items.push(item.to_string());
    }
}

/// District of a listing: the second location component.
///
/// Location lists run from most to least specific, e.g.
/// `['Łobzów', 'Krowodrza', 'Kraków', 'małopolskie']`.
pub fn district_from_location(location: &[String]) -> Option<String> {
    location
        .get(1)
        .and_then(|d| normalize_text(Some(d.as_str())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_floor_named_levels() {
        assert_eq!(parse_floor(Some("cellar"), None), Some(-1));
        assert_eq!(parse_floor(Some("ground_floor"), None), Some(0));
    }

    #[test]
    fn test_parse_floor_embedded_integer() {
        assert_eq!(parse_floor(Some("floor_3"), None), Some(3));
        assert_eq!(parse_floor(Some("floor_10"), None), Some(10));
        assert_eq!(parse_floor(Some("higher_10 / 12"), None), Some(10));
    }

    #[test]
    fn test_parse_floor_default() {
        assert_eq!(parse_floor(Some("garret"), Some(1)), Some(1));
        assert_eq!(parse_floor(Some("garret"), None), None);
        assert_eq!(parse_floor(None, Some(2)), Some(2));
        assert_eq!(parse_floor(Some("   "), None), None);
        assert_eq!(parse_floor(Some(MISSING_INFO), Some(0)), Some(0));
    }

    #[test]
    fn test_parse_rooms() {
        assert_eq!(parse_rooms(Some("3")), Some(3));
        assert_eq!(parse_rooms(Some(" 4 ")), Some(4));
        assert_eq!(parse_rooms(Some("2.0")), Some(2));
        assert_eq!(parse_rooms(Some("more")), None);
        assert_eq!(parse_rooms(Some("-1")), None);
        assert_eq!(parse_rooms(None), None);
    }

    #[test]
    fn test_valid_build_year() {
        let range = (1000, 2030);
        assert_eq!(valid_build_year(Some(1995.0), range), Some(1995.0));
        assert_eq!(valid_build_year(Some(2030.0), range), Some(2030.0));
        assert_eq!(valid_build_year(Some(1000.0), range), Some(1000.0));
        assert_eq!(valid_build_year(Some(999.0), range), None);
        assert_eq!(valid_build_year(Some(20155.0), range), None);
        assert_eq!(valid_build_year(Some(f64::NAN), range), None);
        assert_eq!(valid_build_year(None, range), None);
    }

    #[test]
    fn test_parse_list_literal() {
        assert_eq!(
            parse_list_literal("['balkon', 'pom. użytkowe', \"winda\"]"),
            vec!["balkon", "pom. użytkowe", "winda"]
        );
        assert!(parse_list_literal("[]").is_empty());
        assert!(parse_list_literal("").is_empty());
        assert_eq!(parse_list_literal("taras"), vec!["taras"]);
    }

    #[test]
    fn test_parse_list_literal_keeps_commas_inside_quotes() {
        assert_eq!(parse_list_literal("['a, b', 'c']"), vec!["a, b", "c"]);
    }

    #[test]
    fn test_district_from_location() {
        let location = parse_list_literal("['Łobzów', 'Krowodrza', 'Kraków', 'małopolskie']");
        assert_eq!(district_from_location(&location), Some("Krowodrza".to_string()));
        assert_eq!(district_from_location(&["Kraków".to_string()]), None);
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text(Some(" gas ")), Some("gas".to_string()));
        assert_eq!(normalize_text(Some("brak informacji")), None);
        assert_eq!(normalize_text(Some("")), None);
        assert_eq!(normalize_text(None), None);
    }
}
