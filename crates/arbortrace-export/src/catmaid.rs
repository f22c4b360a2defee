//! Annotation-tool document serializer.
//!
//! Emits a self-describing JSON document holding the skeleton's treenode
//! table, the per-node label masks, and optional resampling traceability.
//! The upstream annotation platform ingests this through a thin adapter;
//! the document is arbortrace's own wire shape, not the platform's internal
//! one.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use std::collections::BTreeMap;

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use arbortrace_pipeline::{LabelMask, NodeId, Skeleton};

/// Radius emitted for every treenode: the tracing carries no radius
/// measurements.
pub const UNMEASURED_RADIUS: f64 = -1.0;

/// Confidence emitted for every treenode (the annotation platform's scale
/// tops out at 5).
pub const FULL_CONFIDENCE: i8 = 5;

/// Errors that can occur while building an export document.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// JSON serialization failed.
    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A mask record's shape does not match its voxel data length.
    #[error("mask record shape {shape:?} does not fit {len} data bytes")]
    MaskShape {
        /// Declared shape.
        shape: Vec<usize>,
        /// Actual flattened data length.
        len: usize,
    },
}

/// Wire record for one label mask: flattened voxel data plus its shape.
///
/// Also the on-disk shape served by precomputed-mask directories (see
/// `arbortrace-io`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskRecord {
    /// Axis extents, order `(x, y, z)`.
    pub shape: Vec<usize>,
    /// Row-major flattened voxel labels.
    pub data: Vec<u8>,
}

impl MaskRecord {
    /// Build a record from a label mask.
    #[must_use]
    pub fn from_mask(mask: &LabelMask) -> Self {
        let (sx, sy, sz) = mask.shape();
        Self {
            shape: vec![sx, sy, sz],
            data: mask.data().iter().copied().collect(),
        }
    }

    /// Reassemble the record into a dynamic-dimension array.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::MaskShape`] when the declared shape does not
    /// fit the data length.
    pub fn into_array(self) -> Result<ArrayD<u8>, ExportError> {
        let len = self.data.len();
        let shape = self.shape;
        ArrayD::from_shape_vec(IxDyn(&shape), self.data)
            .map_err(move |_| ExportError::MaskShape { shape, len })
    }
}

/// One treenode row in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Treenode {
    /// Node identifier.
    pub id: u64,
    /// Parent node identifier; `None` for a root.
    pub parent_id: Option<u64>,
    /// Position along the x axis (nanometres).
    pub x: f64,
    /// Position along the y axis (nanometres).
    pub y: f64,
    /// Position along the z axis (nanometres).
    pub z: f64,
    /// Node radius; [`UNMEASURED_RADIUS`] when unknown.
    pub radius: f64,
    /// Tracing confidence on the platform's 0-5 scale.
    pub confidence: i8,
}

/// The full export document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatmaidDocument {
    /// Optional skeleton name shown in the annotation tool.
    pub skeleton_name: Option<String>,
    /// All treenodes in ascending id order.
    pub treenodes: Vec<Treenode>,
    /// Node id (decimal string, a JSON object key) -> mask record, for the
    /// nodes that received a mask.
    pub masks: BTreeMap<String, MaskRecord>,
    /// Resampled node id -> original node id; empty when resampling was off.
    #[serde(default)]
    pub origin_map: BTreeMap<String, u64>,
}

/// Metadata to embed in the document.
///
/// Both fields are optional.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportMetadata<'a> {
    /// Skeleton name shown in the annotation tool.
    pub skeleton_name: Option<&'a str>,
    /// Resampling traceability map from the pipeline run.
    pub origin_map: Option<&'a BTreeMap<NodeId, NodeId>>,
}

/// Assemble the export document for a reconstructed skeleton.
#[must_use]
pub fn build_document(skeleton: &Skeleton, metadata: &ExportMetadata<'_>) -> CatmaidDocument {
    let treenodes = skeleton
        .nodes()
        .map(|node| {
            let position = node.position();
            Treenode {
                id: node.id().0,
                parent_id: node.parent().map(|p| p.0),
                x: position.x,
                y: position.y,
                z: position.z,
                radius: UNMEASURED_RADIUS,
                confidence: FULL_CONFIDENCE,
            }
        })
        .collect();

    let masks = skeleton
        .nodes()
        .filter_map(|node| {
            node.mask()
                .map(|mask| (node.id().to_string(), MaskRecord::from_mask(mask)))
        })
        .collect();

    let origin_map = metadata
        .origin_map
        .map(|map| {
            map.iter()
                .map(|(new_id, orig_id)| (new_id.to_string(), orig_id.0))
                .collect()
        })
        .unwrap_or_default();

    CatmaidDocument {
        skeleton_name: metadata.skeleton_name.map(str::to_owned),
        treenodes,
        masks,
        origin_map,
    }
}

/// Serialize a reconstructed skeleton as the annotation-tool JSON document.
///
/// # Errors
///
/// Returns [`ExportError::Serialize`] when JSON serialization fails.
pub fn to_catmaid_json(
    skeleton: &Skeleton,
    metadata: &ExportMetadata<'_>,
) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(&build_document(
        skeleton, metadata,
    ))?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ndarray::Array3;

    use arbortrace_pipeline::NodeRow;

    use super::*;

    fn masked_skeleton() -> Skeleton {
        let mut skeleton = Skeleton::from_rows(&[
            NodeRow::new(NodeId(1), None, 0.0, 0.0, 0.0),
            NodeRow::new(NodeId(2), Some(NodeId(1)), 40.0, 0.0, 0.0),
            NodeRow::new(NodeId(3), Some(NodeId(1)), 0.0, 40.0, 0.0),
        ])
        .unwrap();
        skeleton.fill(NodeId(2), LabelMask::new(Array3::from_elem((2, 1, 1), 7)));
        skeleton
    }

    #[test]
    fn document_holds_all_treenodes_and_only_masked_nodes() {
        let document = build_document(&masked_skeleton(), &ExportMetadata::default());

        assert_eq!(document.treenodes.len(), 3);
        assert_eq!(document.treenodes[0].id, 1);
        assert_eq!(document.treenodes[0].parent_id, None);
        assert_eq!(document.treenodes[1].parent_id, Some(1));

        assert_eq!(document.masks.len(), 1);
        let record = &document.masks["2"];
        assert_eq!(record.shape, vec![2, 1, 1]);
        assert_eq!(record.data, vec![7, 7]);
    }

    #[test]
    fn document_embeds_metadata() {
        let origin_map: BTreeMap<NodeId, NodeId> = [(NodeId(101), NodeId(1))].into_iter().collect();
        let metadata = ExportMetadata {
            skeleton_name: Some("dorsal branch"),
            origin_map: Some(&origin_map),
        };
        let document = build_document(&masked_skeleton(), &metadata);

        assert_eq!(document.skeleton_name.as_deref(), Some("dorsal branch"));
        assert_eq!(document.origin_map["101"], 1);
    }

    #[test]
    fn json_round_trips_structurally() {
        let json = to_catmaid_json(&masked_skeleton(), &ExportMetadata::default()).unwrap();
        let document: CatmaidDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(document.treenodes.len(), 3);
        assert_eq!(document.masks.len(), 1);
        assert!((document.treenodes[0].radius - UNMEASURED_RADIUS).abs() < f64::EPSILON);
        assert_eq!(document.treenodes[0].confidence, FULL_CONFIDENCE);
    }

    #[test]
    fn empty_skeleton_serializes_to_empty_document() {
        let skeleton = Skeleton::default();
        let document = build_document(&skeleton, &ExportMetadata::default());
        assert!(document.treenodes.is_empty());
        assert!(document.masks.is_empty());
        assert!(document.origin_map.is_empty());
    }

    #[test]
    fn mask_record_round_trips_through_array() {
        let mask = LabelMask::new(Array3::from_shape_fn((2, 2, 2), |(x, y, z)| {
            u8::try_from(x + 2 * y + 4 * z).unwrap_or(0)
        }));
        let record = MaskRecord::from_mask(&mask);
        let array = record.clone().into_array().unwrap();
        assert_eq!(array.shape(), &[2, 2, 2]);
        assert_eq!(
            array.iter().copied().collect::<Vec<u8>>(),
            record.data,
        );
    }

    #[test]
    fn mask_record_rejects_shape_data_mismatch() {
        let record = MaskRecord {
            shape: vec![2, 2, 2],
            data: vec![0; 7],
        };
        let err = record.into_array().unwrap_err();
        assert!(matches!(err, ExportError::MaskShape { len: 7, .. }));
    }
}
