//! MQTT topic constants and filter matching.
//!
//! The demo fleet shares a single topic for commands and counter
//! publishes:
//! ```text
//! securedios/demo
//! ```

/// Topic used by the demo publisher and the command relay.
pub const DEMO_TOPIC: &str = "securedios/demo";

/// Check whether a concrete topic matches a subscription filter.
///
/// Supports the MQTT single-level (`+`) and multi-level (`#`) wildcards.
pub fn matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match() {
        assert!(matches(DEMO_TOPIC, "securedios/demo"));
        assert!(!matches(DEMO_TOPIC, "securedios/other"));
        assert!(!matches(DEMO_TOPIC, "securedios/demo/extra"));
        assert!(!matches(DEMO_TOPIC, "securedios"));
    }

    #[test]
    fn single_level_wildcard() {
        assert!(matches("securedios/+", "securedios/demo"));
        assert!(!matches("securedios/+", "securedios/demo/x"));
        assert!(matches("+/demo", "securedios/demo"));
    }

    #[test]
    fn multi_level_wildcard() {
        assert!(matches("securedios/#", "securedios/demo"));
        assert!(matches("securedios/#", "securedios/demo/x/y"));
        assert!(matches("#", "anything/at/all"));
        assert!(!matches("other/#", "securedios/demo"));
    }
}
