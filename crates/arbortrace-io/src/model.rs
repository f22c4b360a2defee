//! Model-backed segmentation source.
//!
//! Holds the loaded imaging volumes, the network parameters merged from the
//! training and job configuration documents, and the weights file path. The
//! network itself is an external capability injected as
//! [`PatchClassifier`]; this module owns the per-node plumbing: locating
//! the volume containing each node and extracting its field-of-view patch.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use ndarray::{Array3, ArrayD};
use serde::Deserialize;

use arbortrace_pipeline::{
    Point3, SegmentationResults, SegmentationSource, Skeleton, SourceError,
};

use crate::volumes::Volume;

/// Network and patch parameters merged from the training and job
/// configuration TOMLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelParams {
    /// Field of view around each node, in voxels (axis order `x, y, z`).
    /// Odd extents keep the node centred.
    pub fov_shape: [usize; 3],
    /// Predicted labels at or below this value are zeroed as background.
    pub label_threshold: u8,
}

/// Serde shape of one parameter document: a `[model]` table with every key
/// optional, so job documents can override only what they set.
#[derive(Debug, Default, Deserialize)]
struct ParamsFile {
    #[serde(default)]
    model: PartialParams,
}

#[derive(Debug, Default, Deserialize)]
struct PartialParams {
    fov_shape: Option<[usize; 3]>,
    label_threshold: Option<u8>,
}

impl ModelParams {
    /// Merge parameter documents in order; later documents override earlier
    /// ones. `model.fov_shape` must be set somewhere.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidParams`] for an unparseable document
    /// or when no document sets `model.fov_shape`.
    pub fn from_toml_documents(documents: &[&str]) -> Result<Self, SourceError> {
        let mut fov_shape = None;
        let mut label_threshold = None;
        for text in documents {
            let file: ParamsFile =
                toml::from_str(text).map_err(|e| SourceError::InvalidParams(e.to_string()))?;
            if file.model.fov_shape.is_some() {
                fov_shape = file.model.fov_shape;
            }
            if file.model.label_threshold.is_some() {
                label_threshold = file.model.label_threshold;
            }
        }
        let fov_shape = fov_shape
            .ok_or_else(|| SourceError::InvalidParams("missing model.fov_shape".to_owned()))?;
        Ok(Self {
            fov_shape,
            label_threshold: label_threshold.unwrap_or(0),
        })
    }
}

/// External capability: predict a label mask from one field-of-view patch.
pub trait PatchClassifier {
    /// Predict the mask for one patch.
    ///
    /// `Ok(None)` is the explicit no-data marker: the network produced
    /// nothing usable for this patch.
    ///
    /// # Errors
    ///
    /// Backend failures abort the whole run.
    fn classify(&self, patch: &Array3<u8>) -> Result<Option<ArrayD<u8>>, SourceError>;
}

/// Segmentation source backed by a trained model.
pub struct ModelSource {
    volumes: BTreeMap<String, Box<dyn Volume>>,
    params: ModelParams,
    weights_file: PathBuf,
    classifier: Box<dyn PatchClassifier>,
}

impl fmt::Debug for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSource")
            .field("volumes", &self.volumes.keys().collect::<Vec<_>>())
            .field("params", &self.params)
            .field("weights_file", &self.weights_file)
            .finish_non_exhaustive()
    }
}

impl ModelSource {
    /// Construct the source.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidParams`] when the weights file does
    /// not exist or no volumes were supplied.
    pub fn new(
        volumes: BTreeMap<String, Box<dyn Volume>>,
        params: ModelParams,
        weights_file: impl Into<PathBuf>,
        classifier: Box<dyn PatchClassifier>,
    ) -> Result<Self, SourceError> {
        let weights_file = weights_file.into();
        if !weights_file.is_file() {
            return Err(SourceError::InvalidParams(format!(
                "weights file {} does not exist",
                weights_file.display(),
            )));
        }
        if volumes.is_empty() {
            return Err(SourceError::InvalidParams(
                "no imaging volumes loaded".to_owned(),
            ));
        }
        Ok(Self {
            volumes,
            params,
            weights_file,
            classifier,
        })
    }

    /// The merged network parameters.
    #[must_use]
    pub const fn params(&self) -> &ModelParams {
        &self.params
    }

    /// The weights file the source was constructed with.
    #[must_use]
    pub fn weights_file(&self) -> &std::path::Path {
        &self.weights_file
    }

    /// Find the first volume whose bounds contain the position, together
    /// with the position's voxel coordinate on that volume's grid.
    fn containing_volume(&self, position: Point3) -> Option<(&dyn Volume, [i64; 3])> {
        self.volumes.values().find_map(|volume| {
            let voxel = volume.world_to_voxel(position);
            volume
                .bounds()
                .contains(voxel)
                .then_some((volume.as_ref(), voxel))
        })
    }
}

impl SegmentationSource for ModelSource {
    fn segment_skeleton(
        &mut self,
        skeleton: &Skeleton,
    ) -> Result<SegmentationResults, SourceError> {
        let mut results = SegmentationResults::new();
        for node in skeleton.nodes() {
            let Some((volume, voxel)) = self.containing_volume(node.position()) else {
                // No entry at all: the merge step reports it as missing.
                tracing::debug!(node = %node.id(), "node lies outside every loaded volume");
                continue;
            };

            let origin = centered_origin(voxel, self.params.fov_shape);
            let patch = volume.read_patch(origin, self.params.fov_shape)?;
            let payload = self
                .classifier
                .classify(&patch)?
                .map(|mask| apply_threshold(mask, self.params.label_threshold));
            results.insert(node.id(), payload);
        }
        Ok(results)
    }
}

/// Patch origin so that `center` lands in the middle voxel.
fn centered_origin(center: [i64; 3], shape: [usize; 3]) -> [i64; 3] {
    // Field-of-view extents are small; the halved value always fits in i64.
    let half = |extent: usize| i64::try_from(extent / 2).unwrap_or(0);
    [
        center[0] - half(shape[0]),
        center[1] - half(shape[1]),
        center[2] - half(shape[2]),
    ]
}

/// Zero out labels at or below the background threshold.
fn apply_threshold(mask: ArrayD<u8>, threshold: u8) -> ArrayD<u8> {
    if threshold == 0 {
        return mask;
    }
    mask.mapv(|v| if v > threshold { v } else { 0 })
}
