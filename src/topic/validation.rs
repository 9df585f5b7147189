//! Topic name and filter validation
//!
//! Key rules:
//! - Topic names MUST NOT contain wildcards (+ or #)
//! - Topic filters MAY contain wildcards
//! - Multi-level wildcard (#) must occupy the last level on its own
//! - Single-level wildcard (+) must occupy an entire level
//! - Empty levels are significant: "/a" has two levels, "" and "a"

/// Maximum encoded length of a topic name or filter
const MAX_TOPIC_LEN: usize = 65535;

/// Represents a level in a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicLevel<'a> {
    /// Normal topic level
    Normal(&'a str),
    /// Single-level wildcard (+)
    SingleWildcard,
    /// Multi-level wildcard (#)
    MultiWildcard,
}

/// Parse topic into levels
pub fn parse_levels(topic: &str) -> impl Iterator<Item = TopicLevel<'_>> {
    topic.split('/').map(|level| match level {
        "+" => TopicLevel::SingleWildcard,
        "#" => TopicLevel::MultiWildcard,
        s => TopicLevel::Normal(s),
    })
}

/// Returns true if the filter contains a wildcard level
pub fn is_wildcard_filter(filter: &str) -> bool {
    parse_levels(filter).any(|level| !matches!(level, TopicLevel::Normal(_)))
}

/// Validate a topic name (used for retained messages and publishes)
pub fn validate_topic_name(topic: &str) -> Result<(), &'static str> {
    validate_topic_name_with_max_levels(topic, 0)
}

/// Validate a topic name with configurable max levels
///
/// Topic names:
/// - Must be at least 1 character
/// - Must not exceed 65535 bytes
/// - Must not contain null character
/// - Must not contain wildcards (+ or #)
/// - Must not exceed max_topic_levels if set (0 = unlimited)
pub fn validate_topic_name_with_max_levels(
    topic: &str,
    max_topic_levels: usize,
) -> Result<(), &'static str> {
    if topic.is_empty() {
        return Err("topic name cannot be empty");
    }

    if topic.len() > MAX_TOPIC_LEN {
        return Err("topic name exceeds maximum length");
    }

    if topic.contains('\0') {
        return Err("topic name cannot contain null character");
    }

    if topic.contains('+') || topic.contains('#') {
        return Err("topic name cannot contain wildcards");
    }

    if max_topic_levels > 0 && topic.split('/').count() > max_topic_levels {
        return Err("topic exceeds maximum allowed levels");
    }

    Ok(())
}

/// Validate a topic filter (used at subscribe time)
pub fn validate_topic_filter(filter: &str) -> Result<(), &'static str> {
    validate_topic_filter_with_max_levels(filter, 0)
}

/// Validate a topic filter with configurable max levels
///
/// Topic filters:
/// - Must be at least 1 character
/// - Must not exceed 65535 bytes
/// - Must not contain null character
/// - Multi-level wildcard (#) must be the whole level and the last level
/// - Single-level wildcard (+) must be the whole level
/// - Must not exceed max_topic_levels if set (0 = unlimited)
pub fn validate_topic_filter_with_max_levels(
    filter: &str,
    max_topic_levels: usize,
) -> Result<(), &'static str> {
    if filter.is_empty() {
        return Err("topic filter cannot be empty");
    }

    if filter.len() > MAX_TOPIC_LEN {
        return Err("topic filter exceeds maximum length");
    }

    if filter.contains('\0') {
        return Err("topic filter cannot contain null character");
    }

    let mut levels = filter.split('/').peekable();
    let mut count = 0usize;

    while let Some(level) = levels.next() {
        count += 1;

        if level.contains('#') {
            if level != "#" {
                return Err("multi-level wildcard must occupy entire level");
            }
            if levels.peek().is_some() {
                return Err("multi-level wildcard must be last level");
            }
        }

        if level.contains('+') && level != "+" {
            return Err("single-level wildcard must occupy entire level");
        }
    }

    if max_topic_levels > 0 && count > max_topic_levels {
        return Err("topic filter exceeds maximum allowed levels");
    }

    Ok(())
}

/// Check if a topic filter matches a topic name
///
/// Matching rules:
/// - / is the level separator, empty levels are compared like any other
/// - + matches exactly one level
/// - # matches zero or more remaining levels, so "a/#" also matches "a"
/// - literal levels compare byte-for-byte
///
/// The filter is not validated here; callers validate at subscribe time.
pub fn topic_matches_filter(topic: &str, filter: &str) -> bool {
    let mut topic_levels = topic.split('/');

    for level in parse_levels(filter) {
        match level {
            TopicLevel::MultiWildcard => return true,
            TopicLevel::SingleWildcard => {
                if topic_levels.next().is_none() {
                    return false;
                }
            }
            TopicLevel::Normal(expected) => match topic_levels.next() {
                Some(actual) if actual == expected => {}
                _ => return false,
            },
        }
    }

    // Both must be exhausted for a match
    topic_levels.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_validate_topic_name() {
        assert!(validate_topic_name("test").is_ok());
        assert!(validate_topic_name("test/topic").is_ok());
        assert!(validate_topic_name("/test/topic").is_ok());
        assert!(validate_topic_name("test/topic/").is_ok());

        assert!(validate_topic_name("").is_err());
        assert!(validate_topic_name("test+topic").is_err());
        assert!(validate_topic_name("test#topic").is_err());
        assert!(validate_topic_name("test/+/topic").is_err());
        assert!(validate_topic_name("test/#").is_err());
        assert!(validate_topic_name("nul\0byte").is_err());
    }

    #[test]
    fn test_validate_topic_filter() {
        assert!(validate_topic_filter("test").is_ok());
        assert!(validate_topic_filter("test/topic").is_ok());
        assert!(validate_topic_filter("+").is_ok());
        assert!(validate_topic_filter("#").is_ok());
        assert!(validate_topic_filter("test/+").is_ok());
        assert!(validate_topic_filter("test/#").is_ok());
        assert!(validate_topic_filter("+/test").is_ok());
        assert!(validate_topic_filter("+/+/+").is_ok());
        assert!(validate_topic_filter("test/+/topic").is_ok());
        assert!(validate_topic_filter("/").is_ok());

        assert!(validate_topic_filter("").is_err());
        assert!(validate_topic_filter("test+").is_err());
        assert!(validate_topic_filter("test#").is_err());
        assert!(validate_topic_filter("test/#/more").is_err());
        assert!(validate_topic_filter("+test").is_err());
        assert!(validate_topic_filter("sport/ten#nis").is_err());
        assert!(validate_topic_filter("#/").is_err());
    }

    #[test]
    fn test_validate_topic_filter_errors_name_the_rule() {
        assert_eq!(
            validate_topic_filter("a/#/b"),
            Err("multi-level wildcard must be last level")
        );
        assert_eq!(
            validate_topic_filter("a/b#"),
            Err("multi-level wildcard must occupy entire level")
        );
        assert_eq!(
            validate_topic_filter("a+/b"),
            Err("single-level wildcard must occupy entire level")
        );
    }

    #[test_case("sport/tennis/player1", "sport/tennis/#" ; "multi level below parent")]
    #[test_case("sport/tennis/player1", "sport/+/player1" ; "single level in middle")]
    #[test_case("sport/tennis", "sport/+" ; "single level at end")]
    #[test_case("sport", "sport/#" ; "multi level matches parent")]
    #[test_case("sport/tennis", "sport/tennis/#" ; "multi level matches zero levels")]
    #[test_case("sport", "#" ; "bare multi level")]
    #[test_case("/finance", "+/+" ; "leading empty level")]
    #[test_case("/finance", "/+" ; "leading separator kept")]
    #[test_case("sport/", "sport/+" ; "trailing empty level")]
    #[test_case("a/b/c", "+/b/+" ; "two single levels")]
    #[test_case("$SYS/test", "#" ; "dollar topics are not special")]
    fn test_topic_matches(topic: &str, filter: &str) {
        assert!(topic_matches_filter(topic, filter));
    }

    #[test_case("sport/tennis/player1", "sport/+/player2" ; "literal after single level differs")]
    #[test_case("sport/tennis/player1", "sport/tennis" ; "filter shorter than topic")]
    #[test_case("sport", "sport/+" ; "single level needs one level")]
    #[test_case("sport", "+/+" ; "too few levels")]
    #[test_case("/finance", "+" ; "leading separator adds a level")]
    #[test_case("Sport", "sport" ; "case sensitive")]
    #[test_case("other/topic", "test/#" ; "different root")]
    #[test_case("test/topic/extra", "test/+" ; "filter ends early")]
    fn test_topic_does_not_match(topic: &str, filter: &str) {
        assert!(!topic_matches_filter(topic, filter));
    }

    #[test]
    fn test_literal_filters_match_only_themselves() {
        for (topic, filter) in [
            ("a", "a"),
            ("a/b", "a/b"),
            ("/", "/"),
            ("a//b", "a//b"),
            ("a/b", "a/b/"),
            ("a", "b"),
        ] {
            assert_eq!(topic_matches_filter(topic, filter), topic == filter);
        }
    }

    #[test]
    fn test_is_wildcard_filter() {
        assert!(is_wildcard_filter("a/+"));
        assert!(is_wildcard_filter("#"));
        assert!(!is_wildcard_filter("a/b"));
        assert!(!is_wildcard_filter("a+b"));
    }

    #[test]
    fn test_validate_topic_name_max_levels() {
        // 0 = unlimited (no limit enforced)
        assert!(validate_topic_name_with_max_levels("a/b/c/d/e", 0).is_ok());

        assert!(validate_topic_name_with_max_levels("a/b/c", 3).is_ok());
        assert!(validate_topic_name_with_max_levels("a/b/c/d", 3).is_err());

        // Empty levels still count
        assert!(validate_topic_name_with_max_levels("/a/b", 3).is_ok());
        assert!(validate_topic_name_with_max_levels("/a/b/c", 3).is_err());
    }

    #[test]
    fn test_validate_topic_filter_max_levels() {
        assert!(validate_topic_filter_with_max_levels("a/+/c/#", 0).is_ok());
        assert!(validate_topic_filter_with_max_levels("a/b/#", 3).is_ok());
        assert!(validate_topic_filter_with_max_levels("a/+/c/d", 3).is_err());
        // # counts as a level
        assert!(validate_topic_filter_with_max_levels("a/b/c/#", 3).is_err());
        assert!(validate_topic_filter_with_max_levels("#", 1).is_ok());
    }
}
