//! Storage-scope strings and the texture fit test.
//!
//! A texture is a 2-D image of RGBA texels. A 5-D tensor whose innermost
//! axis is 4 can be packed into one by folding its first four axes into
//! rows and columns; [`fit_scope`] picks the fold, if any, that keeps both
//! extents under the hardware limit and is closest to square.

use std::collections::BTreeMap;

use texscope_ir::{AttrValue, Placement, TensorType};

use crate::StorageError;

/// The default, unconstrained memory region.
pub const GLOBAL: &str = "global";

/// Prefix shared by every texture scope.
pub const TEXTURE: &str = "global.texture";

/// Largest texture extent when the target does not say otherwise.
pub const DEFAULT_TEXTURE_SPATIAL_LIMIT: u64 = 16384;

/// Target attribute overriding [`DEFAULT_TEXTURE_SPATIAL_LIMIT`].
pub const SPATIAL_LIMIT_ATTR: &str = "texture_spatial_limit";

/// Returns `true` if `scope` names a texture region.
pub fn is_texture(scope: &str) -> bool {
    scope.contains(TEXTURE)
}

/// Chooses the storage scope for a tensor of the given static shape.
///
/// Only constrained 5-D shapes with an innermost extent of 4 qualify. The
/// three folds are tried in the order `3|1`, `2|2`, `1|3`; the one with the
/// smallest `|rows - cols|` wins and on a tie the later fold wins.
pub fn fit_scope(shape: &[u64], constrained: bool, spatial_limit: u64) -> String {
    if !constrained || shape.len() != 5 || shape[4] != 4 {
        return GLOBAL.to_string();
    }
    let (a0, a1, a2, a3) = (shape[0], shape[1], shape[2], shape[3]);
    let folds = [
        (a0.saturating_mul(a1).saturating_mul(a2), a3, ""),
        (a0.saturating_mul(a1), a2.saturating_mul(a3), "nhwc"),
        (a0, a1.saturating_mul(a2).saturating_mul(a3), "weight"),
    ];

    // Keyed by imbalance; a later insert replaces an earlier one on a tie.
    let mut diffs: BTreeMap<u64, &str> = BTreeMap::new();
    for (rows, cols, label) in folds {
        if rows < spatial_limit && cols < spatial_limit {
            diffs.insert(rows.abs_diff(cols), label);
        }
    }

    match diffs.first_key_value() {
        None => GLOBAL.to_string(),
        Some((_, label)) if label.is_empty() => TEXTURE.to_string(),
        Some((_, label)) => format!("{TEXTURE}-{label}"),
    }
}

/// Reads the texture spatial limit from a placement's target.
pub fn texture_spatial_limit(placement: &Placement, default: u64) -> Result<u64, StorageError> {
    let Some(target) = &placement.target else {
        return Ok(default);
    };
    match target.attr(SPATIAL_LIMIT_ATTR) {
        None => Ok(default),
        Some(AttrValue::Int(v)) if *v > 0 => Ok(*v as u64),
        Some(other) => Err(StorageError::InvalidTargetAttr {
            target: target.to_string(),
            key: SPATIAL_LIMIT_ATTR,
            value: other.to_string(),
        }),
    }
}

/// [`fit_scope`] for a checked tensor type living at `placement`.
///
/// Fails if the shape is a constrained 5-D candidate with a symbolic
/// dimension, since the fit cannot be decided.
pub fn scope_for_tensor(
    ty: &TensorType,
    placement: &Placement,
    default_limit: u64,
) -> Result<String, StorageError> {
    // A scope with no device says nothing about texture capacity.
    let constrained = placement.is_on_device();
    if !constrained || ty.rank() != 5 {
        return Ok(GLOBAL.to_string());
    }
    let dims = ty.static_dims()?;
    let limit = texture_spatial_limit(placement, default_limit)?;
    Ok(fit_scope(&dims, constrained, limit))
}

/// Combines consumer requests for one producer.
///
/// Texture only if every consumer asked for texture; an empty list is
/// `"global"`.
pub fn unify_demand(demand: &[String]) -> &'static str {
    if demand.is_empty() || demand.iter().any(|d| !is_texture(d)) {
        GLOBAL
    } else {
        TEXTURE
    }
}

/// Returns `true` if at least one consumer can read a texture.
pub fn can_accept_texture(demand: &[String]) -> bool {
    demand.iter().any(|d| d.starts_with(TEXTURE))
}
