//! Controller owner references between federated sources and derived preferences.
//!
//! Owners are compared by API group, kind and name. Versions and UIDs are
//! ignored so a recreated or re-versioned source still owns its preference.

use crate::error::ControllerError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

/// API group of an `apiVersion` string; `None` when malformed.
fn api_group(api_version: &str) -> Option<&str> {
    match api_version.split_once('/') {
        None => Some(""),
        Some((_, version)) if version.contains('/') => None,
        Some((group, _)) => Some(group),
    }
}

/// Whether `a` and `b` refer to the same owner.
pub fn same_owner(a: &OwnerReference, b: &OwnerReference) -> bool {
    match (api_group(&a.api_version), api_group(&b.api_version)) {
        (Some(ga), Some(gb)) => ga == gb && a.kind == b.kind && a.name == b.name,
        _ => false,
    }
}

/// The owner reference flagged as controller, if any.
pub fn controller_of(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .iter()
        .flatten()
        .find(|r| r.controller == Some(true))
}

/// Whether `meta` is controlled by `owner`.
pub fn is_controlled_by(meta: &ObjectMeta, owner: &OwnerReference) -> bool {
    controller_of(meta).is_some_and(|c| same_owner(c, owner))
}

/// Controller reference pointing at a source object.
pub fn controller_reference(api_version: &str, kind: &str, meta: &ObjectMeta) -> OwnerReference {
    OwnerReference {
        api_version: api_version.to_string(),
        kind: kind.to_string(),
        name: meta.name.clone().unwrap_or_default(),
        uid: meta.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Makes `owner` the controller of `meta`.
///
/// An existing reference to the same owner is replaced in place, otherwise the
/// reference is appended. Fails without touching `meta` when another owner is
/// already the controller.
pub fn set_controller_reference(
    meta: &mut ObjectMeta,
    owner: OwnerReference,
    controlled_kind: &str,
) -> Result<(), ControllerError> {
    if let Some(current) = controller_of(meta) {
        if !same_owner(current, &owner) {
            return Err(ControllerError::OwnershipConflict {
                kind: controlled_kind.to_string(),
                name: format!(
                    "{}/{}",
                    meta.namespace.as_deref().unwrap_or_default(),
                    meta.name.as_deref().unwrap_or_default()
                ),
                owner: format!("{}.{} {}", current.kind, current.api_version, current.name),
            });
        }
    }

    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    match refs.iter().rposition(|r| same_owner(r, &owner)) {
        Some(idx) => refs[idx] = owner,
        None => refs.push(owner),
    }
    Ok(())
}
