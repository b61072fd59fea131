//! Opt-in check for federated sources.

use crds::ResourceSelector;
use std::collections::BTreeMap;

/// Whether a source with `annotations` is governed by a policy with `selector`.
///
/// `None` means the policy for this kind is not configured. With `any` set,
/// every source is in scope; otherwise the source must carry the selector's
/// annotation key, whatever its value.
pub fn in_scope(annotations: &BTreeMap<String, String>, selector: Option<&ResourceSelector>) -> bool {
    let Some(selector) = selector else {
        return false;
    };
    if selector.any.unwrap_or(false) {
        return true;
    }
    selector
        .has_annotation
        .as_ref()
        .is_some_and(|key| annotations.contains_key(key))
}
