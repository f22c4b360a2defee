//! Segmentation source capability and the in-crate test stub.
//!
//! A segmentation source is the external collaborator that, given a
//! skeleton, produces a label mask per node. The three production-shaped
//! implementations live in `arbortrace-io` (model-backed and
//! watershed-backed); [`StubSource`] here is the deterministic test-data
//! variant.
//!
//! # Strategy pattern
//!
//! All variants expose the same one-method contract and are selected by the
//! caller — there is no shared base state, only this trait.

use std::collections::BTreeMap;

use ndarray::{Array3, ArrayD};

use crate::skeleton::Skeleton;
use crate::types::NodeId;

/// Mapping from node id to raw segmentation payload.
///
/// Two distinct "no mask" shapes exist and are preserved through merging:
/// a node may have no entry at all, or an entry holding `None` (the
/// explicit no-data marker). Payloads are dynamic-dimension; conversion to
/// a 3D [`LabelMask`](crate::types::LabelMask) happens at merge time and
/// may fail per node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentationResults {
    entries: BTreeMap<NodeId, Option<ArrayD<u8>>>,
}

impl SegmentationResults {
    /// Create an empty result mapping.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Record the payload for a node. `None` is the explicit no-data marker.
    pub fn insert(&mut self, id: NodeId, payload: Option<ArrayD<u8>>) {
        self.entries.insert(id, payload);
    }

    /// Take the entry for a node, distinguishing "absent" (`None`) from
    /// "present but empty" (`Some(None)`).
    pub fn remove(&mut self, id: NodeId) -> Option<Option<ArrayD<u8>>> {
        self.entries.remove(&id)
    }

    /// Borrow the entry for a node.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Option<ArrayD<u8>>> {
        self.entries.get(&id)
    }

    /// Whether the mapping holds an entry (even an empty one) for the node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the mapping has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(NodeId, Option<ArrayD<u8>>)> for SegmentationResults {
    fn from_iter<I: IntoIterator<Item = (NodeId, Option<ArrayD<u8>>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Errors raised by a segmentation source invocation.
///
/// Always fatal to the run: the pipeline has no retry logic, so a failing
/// source propagates to the caller.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Reading a source input (weights, parameters, precomputed masks)
    /// failed.
    #[error("failed to read source input: {0}")]
    Io(#[from] std::io::Error),

    /// Source construction parameters were invalid.
    #[error("invalid source parameters: {0}")]
    InvalidParams(String),

    /// The segmentation backend itself failed.
    #[error("segmentation backend failed: {0}")]
    Backend(String),
}

/// External capability: given a skeleton, return a predicted label mask per
/// node.
///
/// The invocation blocks until all results are ready; an implementation may
/// parallelize internally, but that is opaque to the pipeline.
pub trait SegmentationSource {
    /// Segment every node of the skeleton.
    ///
    /// The returned mapping need not contain an entry for every node.
    ///
    /// # Errors
    ///
    /// Any [`SourceError`] aborts the run.
    fn segment_skeleton(
        &mut self,
        skeleton: &Skeleton,
    ) -> Result<SegmentationResults, SourceError>;
}

/// Test-data source: a deterministic synthetic mask for every node.
///
/// Mask voxels are filled with a nonzero label derived from the node id, so
/// merge diagnostics vary per node without any external data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubSource {
    shape: (usize, usize, usize),
}

impl StubSource {
    /// Default mask extent along each axis.
    pub const DEFAULT_EXTENT: usize = 5;

    /// Create a stub producing masks of the given shape.
    #[must_use]
    pub const fn new(shape: (usize, usize, usize)) -> Self {
        Self { shape }
    }

    /// The label assigned to every voxel of the mask for `id`.
    #[must_use]
    pub const fn label_for(id: NodeId) -> u8 {
        // The modulo keeps the value below 254, so the +1 cannot overflow
        // and the label is never 0 (background).
        #[allow(clippy::cast_possible_truncation)]
        let low = (id.0 % 254) as u8;
        low + 1
    }
}

impl Default for StubSource {
    fn default() -> Self {
        Self::new((
            Self::DEFAULT_EXTENT,
            Self::DEFAULT_EXTENT,
            Self::DEFAULT_EXTENT,
        ))
    }
}

impl SegmentationSource for StubSource {
    fn segment_skeleton(
        &mut self,
        skeleton: &Skeleton,
    ) -> Result<SegmentationResults, SourceError> {
        Ok(skeleton
            .nodes()
            .map(|node| {
                let mask = Array3::from_elem(self.shape, Self::label_for(node.id()));
                (node.id(), Some(mask.into_dyn()))
            })
            .collect())
    }
}
