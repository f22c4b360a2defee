//! Shared types for the arbortrace reconstruction pipeline.

use std::fmt;
use std::path::PathBuf;

use ndarray::{Array3, ArrayD, Ix3};
use serde::{Deserialize, Serialize};

/// Unique identifier of a skeleton node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 3D point in world coordinates (nanometres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    /// Position along the x axis.
    pub x: f64,
    /// Position along the y axis.
    pub y: f64,
    /// Position along the z axis.
    pub z: f64,
}

impl Point3 {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx.mul_add(dx, dy.mul_add(dy, dz * dz))
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// One tabular skeleton input row: `(id, parent, x, y, z)`.
///
/// Rows can be embedded directly in the pipeline configuration or parsed
/// from SWC text (see [`crate::swc`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    /// Node identifier, unique within one skeleton.
    pub id: NodeId,
    /// Parent node identifier; `None` for a root node.
    #[serde(default)]
    pub parent: Option<NodeId>,
    /// Position along the x axis (nanometres).
    pub x: f64,
    /// Position along the y axis (nanometres).
    pub y: f64,
    /// Position along the z axis (nanometres).
    pub z: f64,
}

impl NodeRow {
    /// Create a new row.
    #[must_use]
    pub const fn new(id: NodeId, parent: Option<NodeId>, x: f64, y: f64, z: f64) -> Self {
        Self { id, parent, x, y, z }
    }

    /// The row's position as a point.
    #[must_use]
    pub const fn position(&self) -> Point3 {
        Point3::new(self.x, self.y, self.z)
    }
}

/// A 3D array of per-voxel class labels for the region around a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMask(Array3<u8>);

impl LabelMask {
    /// Wrap an already 3-dimensional label array.
    #[must_use]
    pub const fn new(data: Array3<u8>) -> Self {
        Self(data)
    }

    /// Convert a dynamic-dimension segmentation payload into a label mask.
    ///
    /// Segmentation sources return dynamic-dimension arrays; only
    /// 3-dimensional payloads are valid masks.
    ///
    /// # Errors
    ///
    /// Returns [`MaskShapeError`] carrying the offending shape when the
    /// payload is not 3-dimensional.
    pub fn from_dyn(data: ArrayD<u8>) -> Result<Self, MaskShapeError> {
        let shape = data.shape().to_vec();
        data.into_dimensionality::<Ix3>()
            .map(Self)
            .map_err(move |_| MaskShapeError { shape })
    }

    /// The maximum label value in the mask (0 for an empty mask).
    #[must_use]
    pub fn max_label(&self) -> u8 {
        self.0.iter().copied().max().unwrap_or(0)
    }

    /// The mask extents, axis order `(x, y, z)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize, usize) {
        self.0.dim()
    }

    /// Borrow the underlying voxel array.
    #[must_use]
    pub const fn data(&self) -> &Array3<u8> {
        &self.0
    }

    /// Consume the mask and return the underlying voxel array.
    #[must_use]
    pub fn into_inner(self) -> Array3<u8> {
        self.0
    }
}

/// A segmentation payload was not a 3-dimensional array.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("label mask must be 3-dimensional, got shape {shape:?}")]
pub struct MaskShapeError {
    /// The shape of the rejected payload.
    pub shape: Vec<usize>,
}

/// Skeleton section of the pipeline configuration.
///
/// Immutable for the duration of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkeletonConfig {
    /// Tabular node rows embedded directly in the configuration.
    pub nodes: Vec<NodeRow>,

    /// Optional SWC file holding additional node rows.
    ///
    /// Resolved by the I/O layer before building; the core never reads it.
    pub nodes_file: Option<PathBuf>,

    /// Replace the skeleton with a resampled copy before segmentation.
    ///
    /// Requires an injected [`Resampler`](crate::resample::Resampler); see
    /// [`build_skeleton`](crate::build_skeleton).
    pub resample: bool,

    /// Filter nodes by Strahler order before segmentation.
    ///
    /// Not implemented: requesting it fails the build with
    /// [`ConfigError::StrahlerFilterUnsupported`] rather than silently
    /// ignoring the request.
    pub strahler_filter: bool,

    /// Lower Strahler-order bound for the (unimplemented) filter.
    pub min_strahler: u32,

    /// Upper Strahler-order bound for the (unimplemented) filter.
    pub max_strahler: u32,
}

impl Default for SkeletonConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            nodes_file: None,
            resample: false,
            strahler_filter: false,
            min_strahler: 0,
            max_strahler: u32::MAX,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Skeleton source data and preprocessing flags.
    pub skeleton: SkeletonConfig,
}

/// Configuration and skeleton-construction errors.
///
/// All variants are fatal: they abort the run before segmentation starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The same node id appeared in more than one input row.
    #[error("duplicate node id {0} in skeleton rows")]
    DuplicateNode(NodeId),

    /// A row referenced a parent id that is not present in the node set.
    #[error("node {node} references unknown parent {parent}")]
    UnknownParent {
        /// The node holding the dangling reference.
        node: NodeId,
        /// The referenced, nonexistent parent id.
        parent: NodeId,
    },

    /// A textual skeleton row could not be parsed.
    #[error("malformed skeleton row at line {line}: {reason}")]
    MalformedRow {
        /// 1-based line number in the source text.
        line: usize,
        /// What was wrong with the row.
        reason: String,
    },

    /// Strahler filtering was requested but is not implemented.
    #[error("strahler filtering (orders {min}..={max}) is not implemented")]
    StrahlerFilterUnsupported {
        /// Requested lower bound.
        min: u32,
        /// Requested upper bound.
        max: u32,
    },

    /// Resampling was requested but no resampler was provided.
    #[error("resampling requested but no resampler is available")]
    ResamplerMissing,
}

/// Errors that can abort a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Skeleton construction or configuration failure.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The segmentation source invocation failed. No retry is attempted.
    #[error("segmentation source failed: {0}")]
    Source(#[from] crate::source::SourceError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ndarray::{Array2, Array3};

    use super::*;

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId(42).to_string(), "42");
    }

    #[test]
    fn point_distance() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(2.0, 3.0, 6.0);
        assert!((a.distance(b) - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn point_distance_to_self_is_zero() {
        let p = Point3::new(1.0, -2.0, 3.0);
        assert!(p.distance(p).abs() < f64::EPSILON);
    }

    #[test]
    fn node_row_position() {
        let row = NodeRow::new(NodeId(1), None, 1.0, 2.0, 3.0);
        assert_eq!(row.position(), Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn label_mask_from_dyn_accepts_3d() {
        let raw = Array3::<u8>::from_elem((2, 3, 4), 7).into_dyn();
        let mask = LabelMask::from_dyn(raw).unwrap();
        assert_eq!(mask.shape(), (2, 3, 4));
        assert_eq!(mask.max_label(), 7);
    }

    #[test]
    fn label_mask_from_dyn_rejects_2d() {
        let raw = Array2::<u8>::zeros((4, 4)).into_dyn();
        let err = LabelMask::from_dyn(raw).unwrap_err();
        assert_eq!(err.shape, vec![4, 4]);
    }

    #[test]
    fn label_mask_max_of_empty_is_zero() {
        let mask = LabelMask::new(Array3::zeros((0, 0, 0)));
        assert_eq!(mask.max_label(), 0);
    }

    #[test]
    fn skeleton_config_defaults() {
        let config = SkeletonConfig::default();
        assert!(config.nodes.is_empty());
        assert!(config.nodes_file.is_none());
        assert!(!config.resample);
        assert!(!config.strahler_filter);
        assert_eq!(config.min_strahler, 0);
        assert_eq!(config.max_strahler, u32::MAX);
    }

    #[test]
    fn pipeline_config_from_toml() {
        let text = r#"
            [skeleton]
            resample = false

            [[skeleton.nodes]]
            id = 1
            x = 0.0
            y = 0.0
            z = 0.0

            [[skeleton.nodes]]
            id = 2
            parent = 1
            x = 40.0
            y = 0.0
            z = 0.0
        "#;
        let config: PipelineConfig = toml::from_str(text).unwrap();
        assert_eq!(config.skeleton.nodes.len(), 2);
        assert_eq!(config.skeleton.nodes[0].parent, None);
        assert_eq!(config.skeleton.nodes[1].parent, Some(NodeId(1)));
    }

    #[test]
    fn node_row_serde_round_trip() {
        let row = NodeRow::new(NodeId(9), Some(NodeId(3)), 1.5, -2.0, 0.25);
        let json = serde_json::to_string(&row).unwrap();
        let back: NodeRow = serde_json::from_str(&json).unwrap();
        assert_eq!(row, back);
    }

    #[test]
    fn config_error_displays() {
        assert_eq!(
            ConfigError::DuplicateNode(NodeId(3)).to_string(),
            "duplicate node id 3 in skeleton rows",
        );
        assert_eq!(
            ConfigError::UnknownParent {
                node: NodeId(2),
                parent: NodeId(99),
            }
            .to_string(),
            "node 2 references unknown parent 99",
        );
        assert_eq!(
            ConfigError::StrahlerFilterUnsupported { min: 2, max: 5 }.to_string(),
            "strahler filtering (orders 2..=5) is not implemented",
        );
        assert_eq!(
            ConfigError::ResamplerMissing.to_string(),
            "resampling requested but no resampler is available",
        );
    }
}
