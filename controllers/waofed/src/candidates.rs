//! Resolution of a source's placement intent into candidate clusters.
//!
//! Placement is untrusted input: it may name clusters that were never
//! registered or list one twice. Only registered clusters survive, each once,
//! in first-seen order.

use crate::error::ControllerError;
use crds::{GenericPlacementFields, KubeFedCluster};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;
use kube::core::{Selector, SelectorExt};
use std::collections::{HashMap, HashSet};
use tracing::debug;

fn parse_selector(selector: &LabelSelector) -> Result<Selector, ControllerError> {
    Selector::try_from(selector.clone()).map_err(|e| ControllerError::InvalidSelector(e.to_string()))
}

/// Candidate cluster names for `placement` among `registered`.
///
/// - no placement, or neither list nor selector: no candidates
/// - explicit list: wins over a selector on the same object
/// - selector only: registered clusters whose labels match, in registration order
pub fn resolve_candidates(
    placement: Option<&GenericPlacementFields>,
    registered: &[KubeFedCluster],
) -> Result<Vec<String>, ControllerError> {
    let Some(placement) = placement else {
        return Ok(Vec::new());
    };

    let requested: Vec<String> = match (&placement.clusters, &placement.cluster_selector) {
        (Some(clusters), _) => clusters.iter().map(|c| c.name.clone()).collect(),
        (None, Some(selector)) => {
            let selector = parse_selector(selector)?;
            registered
                .iter()
                .filter(|cluster| selector.matches(cluster.labels()))
                .map(ResourceExt::name_any)
                .collect()
        }
        (None, None) => return Ok(Vec::new()),
    };

    let known: HashMap<String, &KubeFedCluster> =
        registered.iter().map(|c| (c.name_any(), c)).collect();
    let mut seen = HashSet::new();
    Ok(requested
        .into_iter()
        .filter(|name| match known.get(name) {
            Some(cluster) if seen.insert(name.clone()) => {
                if !cluster.is_ready() {
                    debug!("Candidate cluster {} is registered but not ready", name);
                }
                true
            }
            _ => false,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_cluster;
    use crds::GenericClusterReference;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;
    use std::collections::BTreeMap;

    fn explicit(names: &[&str]) -> GenericPlacementFields {
        GenericPlacementFields {
            clusters: Some(
                names
                    .iter()
                    .map(|n| GenericClusterReference { name: (*n).to_string() })
                    .collect(),
            ),
            cluster_selector: None,
        }
    }

    fn region_selector(region: &str) -> LabelSelector {
        LabelSelector {
            match_labels: Some(BTreeMap::from([("region".to_string(), region.to_string())])),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_placement_means_no_candidates() {
        let registered = vec![create_test_cluster("c1", &[])];
        assert!(resolve_candidates(None, &registered).expect("ok").is_empty());
        let empty = GenericPlacementFields::default();
        assert!(resolve_candidates(Some(&empty), &registered).expect("ok").is_empty());
    }

    #[test]
    fn test_duplicates_removed_in_order() {
        let registered = vec![create_test_cluster("c1", &[]), create_test_cluster("c2", &[])];
        let result = resolve_candidates(Some(&explicit(&["c1", "c1", "c2"])), &registered).expect("ok");
        assert_eq!(result, vec!["c1", "c2"]);

        let result = resolve_candidates(Some(&explicit(&["c2", "c1", "c2"])), &registered).expect("ok");
        assert_eq!(result, vec!["c2", "c1"], "Should keep first-seen order");
    }

    #[test]
    fn test_unregistered_dropped() {
        let registered = vec![create_test_cluster("c1", &[])];
        let result = resolve_candidates(Some(&explicit(&["c1", "cX"])), &registered).expect("ok");
        assert_eq!(result, vec!["c1"]);
    }

    #[test]
    fn test_selector_matches_registered_labels() {
        let registered = vec![
            create_test_cluster("tokyo", &[("region", "jp")]),
            create_test_cluster("virginia", &[("region", "us")]),
            create_test_cluster("osaka", &[("region", "jp")]),
        ];
        let placement = GenericPlacementFields {
            clusters: None,
            cluster_selector: Some(region_selector("jp")),
        };
        let result = resolve_candidates(Some(&placement), &registered).expect("ok");
        assert_eq!(result, vec!["tokyo", "osaka"]);
    }

    #[test]
    fn test_explicit_list_wins_over_selector() {
        let registered = vec![
            create_test_cluster("tokyo", &[("region", "jp")]),
            create_test_cluster("virginia", &[("region", "us")]),
        ];
        let placement = GenericPlacementFields {
            clusters: Some(vec![GenericClusterReference { name: "virginia".to_string() }]),
            cluster_selector: Some(region_selector("jp")),
        };
        let result = resolve_candidates(Some(&placement), &registered).expect("ok");
        assert_eq!(result, vec!["virginia"]);
    }

    #[test]
    fn test_empty_explicit_list_is_empty() {
        let registered = vec![create_test_cluster("c1", &[])];
        let result = resolve_candidates(Some(&explicit(&[])), &registered).expect("ok");
        assert!(result.is_empty());
    }

    fn selector_placement(selector: LabelSelector) -> GenericPlacementFields {
        GenericPlacementFields {
            clusters: None,
            cluster_selector: Some(selector),
        }
    }

    fn expression(key: &str, operator: &str, values: Option<&[&str]>) -> LabelSelector {
        LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: key.to_string(),
                operator: operator.to_string(),
                values: values.map(|v| v.iter().map(ToString::to_string).collect()),
            }]),
            ..Default::default()
        }
    }

    #[test]
    fn test_selector_match_expressions() {
        let registered = vec![
            create_test_cluster("tokyo", &[("region", "jp"), ("gpu", "yes")]),
            create_test_cluster("virginia", &[("region", "us")]),
        ];
        let resolve = |selector| resolve_candidates(Some(&selector_placement(selector)), &registered).expect("ok");

        assert_eq!(resolve(expression("region", "In", Some(&["jp", "kr"]))), vec!["tokyo"]);
        assert_eq!(resolve(expression("region", "NotIn", Some(&["jp"]))), vec!["virginia"]);
        assert_eq!(resolve(expression("zone", "NotIn", Some(&["a"]))), vec!["tokyo", "virginia"]);
        assert_eq!(resolve(expression("gpu", "Exists", None)), vec!["tokyo"]);
        assert_eq!(resolve(expression("gpu", "DoesNotExist", None)), vec!["virginia"]);
        assert_eq!(resolve(LabelSelector::default()), vec!["tokyo", "virginia"]);
    }

    #[test]
    fn test_invalid_selector() {
        let registered = vec![create_test_cluster("c1", &[])];
        for selector in [expression("a", "Gt", Some(&["1"])), expression("a", "In", None)] {
            let result = resolve_candidates(Some(&selector_placement(selector)), &registered);
            assert!(matches!(result, Err(ControllerError::InvalidSelector(_))));
        }
    }
}
