//! Label selector evaluation.
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use std::collections::BTreeMap;
use tracing::{event, Level};

/// Returns whether `labels` satisfy every requirement of `selector`.
///
/// An empty selector matches every set of labels. Requirements using an operator other than `In`, `NotIn`,
/// `Exists` or `DoesNotExist` never match.
pub fn matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    let labels_match = selector
        .match_labels
        .iter()
        .flatten()
        .all(|(key, value)| labels.get(key) == Some(value));

    labels_match
        && selector
            .match_expressions
            .iter()
            .flatten()
            .all(|requirement| requirement_matches(requirement, labels))
}

/// Like `matches`, but an absent selector matches nothing.
pub fn matches_optional(selector: Option<&LabelSelector>, labels: &BTreeMap<String, String>) -> bool {
    selector.map_or(false, |selector| matches(selector, labels))
}

fn requirement_matches(
    requirement: &LabelSelectorRequirement,
    labels: &BTreeMap<String, String>,
) -> bool {
    let value = labels.get(&requirement.key);
    let mut values = requirement.values.iter().flatten();
    match requirement.operator.as_str() {
        "In" => value.map_or(false, |value| values.any(|v| v == value)),
        "NotIn" => value.map_or(true, |value| !values.any(|v| v == value)),
        "Exists" => value.is_some(),
        "DoesNotExist" => value.is_none(),
        operator => {
            event!(
                Level::WARN,
                key = %requirement.key,
                operator,
                "Ignoring label selector requirement with unknown operator."
            );
            false
        }
    }
}
