//! Skeleton resampling capability.
//!
//! Resampling replaces a skeleton with one whose nodes are evenly spaced
//! along the traced segments. The algorithm lives outside this crate; the
//! pipeline only needs the capability seam defined here. Requesting
//! resampling without injecting an implementation is an explicit
//! configuration error (see [`build_skeleton`](crate::build_skeleton)), not
//! a silent no-op.

use std::collections::BTreeMap;

use crate::skeleton::Skeleton;
use crate::types::NodeId;

/// A resampled skeleton plus traceability back to the input.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledSkeleton {
    /// The replacement skeleton.
    pub skeleton: Skeleton,
    /// Maps each node id in the resampled skeleton to the original node it
    /// was derived from.
    pub origin_map: BTreeMap<NodeId, NodeId>,
}

/// Strategy trait for resampling a skeleton into evenly spaced segments.
pub trait Resampler {
    /// Produce the replacement skeleton and its origin map.
    fn resample(&self, skeleton: &Skeleton) -> ResampledSkeleton;
}
