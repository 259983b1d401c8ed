use std::collections::{HashMap, HashSet};

/// Decide whether a published message is admitted into a queue, given the queue's filters and
/// the message's attributes.
///
/// A queue with no filters admits everything. A queue with filters rejects any message missing
/// an attribute the filter names, or whose value for that attribute isn't in the allowed set.
/// Extra attributes on the message that the filter doesn't mention are ignored.
pub fn admit(queue_filters: Option<&HashMap<String, HashSet<String>>>, message_attributes: Option<&HashMap<String, String>>) -> bool {
    let filters = match queue_filters {
        None => return true,
        Some(filters) => filters,
    };
    let attributes = match message_attributes {
        None => return false,
        Some(attributes) => attributes,
    };
    filters.iter().all(|(key, allowed)| {
        attributes
            .get(key)
            .map_or(false, |value| allowed.contains(value))
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn set(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn map(values: &[(&str, &str)]) -> HashMap<String, String> {
        values.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn no_filters_admits_everything() {
        assert!(admit(None, None));
        assert!(admit(None, Some(&map(&[("a", "1")]))));
    }

    #[test]
    fn filters_without_attributes_rejects() {
        let filters = HashMap::from([("region".to_string(), set(&["us", "eu"]))]);
        assert!(!admit(Some(&filters), None));
    }

    #[test]
    fn empty_filter_map_without_attributes_still_rejects() {
        assert!(!admit(Some(&HashMap::new()), None));
    }

    #[test]
    fn matching_value_admits() {
        let filters = HashMap::from([("region".to_string(), set(&["us", "eu"]))]);
        assert!(admit(Some(&filters), Some(&map(&[("region", "eu")]))));
    }

    #[test]
    fn missing_key_rejects() {
        let filters = HashMap::from([("region".to_string(), set(&["us"]))]);
        assert!(!admit(Some(&filters), Some(&map(&[("other", "us")]))));
    }

    #[test]
    fn non_member_value_rejects() {
        let filters = HashMap::from([("region".to_string(), set(&["us"]))]);
        assert!(!admit(Some(&filters), Some(&map(&[("region", "ap")]))));
    }

    #[test]
    fn extra_attributes_are_ignored() {
        let filters = HashMap::from([("region".to_string(), set(&["us"]))]);
        assert!(admit(
            Some(&filters),
            Some(&map(&[("region", "us"), ("priority", "high")]))
        ));
    }
}
