//! Watershed-backed segmentation source.
//!
//! Serves precomputed watershed segmentations. Construction takes a
//! sensitivity-parameters JSON file; per-node lookups go through an
//! injected [`RegionOracle`]. Masks whose foreground fraction falls below
//! the configured minimum are demoted to explicit no-data entries, so weak
//! regions surface in the merge diagnostics instead of polluting the
//! skeleton.

use std::path::{Path, PathBuf};

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use arbortrace_pipeline::{
    SegmentationResults, SegmentationSource, Skeleton, SkeletonNode, SourceError,
};

use arbortrace_export::MaskRecord;

/// Sensitivity parameters loaded from a JSON file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SensitivityParams {
    /// Minimum fraction of foreground voxels for a mask to count as data.
    pub min_foreground_fraction: f64,
    /// Labels at or below this value are background when computing the
    /// foreground fraction.
    pub background_label: u8,
}

impl SensitivityParams {
    /// Parse parameters from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidParams`] for malformed JSON.
    pub fn from_json(text: &str) -> Result<Self, SourceError> {
        serde_json::from_str(text).map_err(|e| SourceError::InvalidParams(e.to_string()))
    }

    /// Read and parse parameters from a file.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Io`] for read failures and
    /// [`SourceError::InvalidParams`] for malformed JSON.
    pub fn from_file(path: &Path) -> Result<Self, SourceError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

/// External capability: look up the precomputed mask for one node.
pub trait RegionOracle {
    /// Fetch the mask around a node. `Ok(None)` means the oracle has
    /// nothing for this node.
    ///
    /// # Errors
    ///
    /// Lookup failures abort the whole run.
    fn lookup(&self, node: &SkeletonNode) -> Result<Option<ArrayD<u8>>, SourceError>;
}

/// Segmentation source serving precomputed watershed regions.
pub struct WatershedSource {
    sensitivity: SensitivityParams,
    oracle: Box<dyn RegionOracle>,
}

impl std::fmt::Debug for WatershedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatershedSource")
            .field("sensitivity", &self.sensitivity)
            .finish_non_exhaustive()
    }
}

impl WatershedSource {
    /// Construct the source from already-parsed parameters.
    #[must_use]
    pub fn new(sensitivity: SensitivityParams, oracle: Box<dyn RegionOracle>) -> Self {
        Self {
            sensitivity,
            oracle,
        }
    }

    /// Construct the source from a sensitivity-parameters JSON file.
    ///
    /// # Errors
    ///
    /// Propagates [`SensitivityParams::from_file`] failures.
    pub fn from_sensitivity_file(
        path: &Path,
        oracle: Box<dyn RegionOracle>,
    ) -> Result<Self, SourceError> {
        Ok(Self::new(SensitivityParams::from_file(path)?, oracle))
    }

    /// The configured sensitivity parameters.
    #[must_use]
    pub const fn sensitivity(&self) -> &SensitivityParams {
        &self.sensitivity
    }
}

impl SegmentationSource for WatershedSource {
    fn segment_skeleton(
        &mut self,
        skeleton: &Skeleton,
    ) -> Result<SegmentationResults, SourceError> {
        let mut results = SegmentationResults::new();
        for node in skeleton.nodes() {
            let payload = match self.oracle.lookup(node)? {
                Some(mask)
                    if foreground_fraction(&mask, self.sensitivity.background_label)
                        >= self.sensitivity.min_foreground_fraction =>
                {
                    Some(mask)
                }
                Some(_) => {
                    tracing::debug!(
                        node = %node.id(),
                        "mask below sensitivity threshold, demoted to no-data",
                    );
                    None
                }
                None => None,
            };
            results.insert(node.id(), payload);
        }
        Ok(results)
    }
}

/// Fraction of voxels above the background label; 0.0 for an empty mask.
fn foreground_fraction(mask: &ArrayD<u8>, background_label: u8) -> f64 {
    if mask.is_empty() {
        return 0.0;
    }
    let foreground = mask.iter().filter(|&&v| v > background_label).count();
    // Voxel counts are far below f64's exact integer range.
    #[allow(clippy::cast_precision_loss)]
    let fraction = foreground as f64 / mask.len() as f64;
    fraction
}

/// Oracle reading `<node_id>.json` mask records from a directory.
///
/// Each file holds a [`MaskRecord`]; nodes without a file yield
/// `Ok(None)`.
#[derive(Debug, Clone)]
pub struct DirectoryOracle {
    root: PathBuf,
}

impl DirectoryOracle {
    /// Point the oracle at a directory of mask records.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidParams`] when the path is not a
    /// directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SourceError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(SourceError::InvalidParams(format!(
                "mask directory {} does not exist",
                root.display(),
            )));
        }
        Ok(Self { root })
    }
}

impl RegionOracle for DirectoryOracle {
    fn lookup(&self, node: &SkeletonNode) -> Result<Option<ArrayD<u8>>, SourceError> {
        let path = self.root.join(format!("{}.json", node.id()));
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        let record: MaskRecord = serde_json::from_str(&text).map_err(|e| {
            SourceError::Backend(format!("malformed mask record {}: {e}", path.display()))
        })?;
        record
            .into_array()
            .map(Some)
            .map_err(|e| SourceError::Backend(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use ndarray::Array3;

    use arbortrace_pipeline::{NodeId, NodeRow};

    use super::*;

    fn skeleton() -> Skeleton {
        Skeleton::from_rows(&[
            NodeRow::new(NodeId(1), None, 0.0, 0.0, 0.0),
            NodeRow::new(NodeId(2), Some(NodeId(1)), 1.0, 0.0, 0.0),
        ])
        .unwrap()
    }

    /// Oracle serving masks from an in-memory map.
    struct MapOracle {
        masks: BTreeMap<NodeId, ArrayD<u8>>,
    }

    impl RegionOracle for MapOracle {
        fn lookup(&self, node: &SkeletonNode) -> Result<Option<ArrayD<u8>>, SourceError> {
            Ok(self.masks.get(&node.id()).cloned())
        }
    }

    #[test]
    fn sensitivity_params_parse_with_defaults() {
        let params = SensitivityParams::from_json("{}").unwrap();
        assert!(params.min_foreground_fraction.abs() < f64::EPSILON);
        assert_eq!(params.background_label, 0);

        let params =
            SensitivityParams::from_json(r#"{"min_foreground_fraction": 0.25}"#).unwrap();
        assert!((params.min_foreground_fraction - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn sensitivity_params_reject_malformed_json() {
        assert!(SensitivityParams::from_json("not json").is_err());
    }

    #[test]
    fn strong_masks_pass_weak_masks_are_demoted() {
        // Node 1: half the voxels foreground. Node 2: one of eight.
        let mut strong = Array3::<u8>::zeros((2, 2, 2));
        strong[[0, 0, 0]] = 1;
        strong[[0, 0, 1]] = 1;
        strong[[0, 1, 0]] = 1;
        strong[[0, 1, 1]] = 1;
        let mut weak = Array3::<u8>::zeros((2, 2, 2));
        weak[[0, 0, 0]] = 1;

        let masks = [
            (NodeId(1), strong.into_dyn()),
            (NodeId(2), weak.into_dyn()),
        ]
        .into_iter()
        .collect();

        let sensitivity = SensitivityParams {
            min_foreground_fraction: 0.5,
            background_label: 0,
        };
        let mut source = WatershedSource::new(sensitivity, Box::new(MapOracle { masks }));
        let results = source.segment_skeleton(&skeleton()).unwrap();

        assert!(matches!(results.get(NodeId(1)), Some(&Some(_))));
        assert_eq!(results.get(NodeId(2)), Some(&None));
    }

    #[test]
    fn every_node_gets_an_entry() {
        let sensitivity = SensitivityParams::default();
        let mut source = WatershedSource::new(
            sensitivity,
            Box::new(MapOracle {
                masks: BTreeMap::new(),
            }),
        );
        let results = source.segment_skeleton(&skeleton()).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results.get(NodeId(1)), Some(&None));
        assert_eq!(results.get(NodeId(2)), Some(&None));
    }

    #[test]
    fn foreground_fraction_respects_background_label() {
        let mut mask = Array3::<u8>::zeros((2, 2, 1));
        mask[[0, 0, 0]] = 1;
        mask[[1, 0, 0]] = 3;
        let mask = mask.into_dyn();

        assert!((foreground_fraction(&mask, 0) - 0.5).abs() < f64::EPSILON);
        assert!((foreground_fraction(&mask, 1) - 0.25).abs() < f64::EPSILON);
        assert!(foreground_fraction(&mask, 3).abs() < f64::EPSILON);
    }

    #[test]
    fn foreground_fraction_of_empty_mask_is_zero() {
        let mask = Array3::<u8>::zeros((0, 0, 0)).into_dyn();
        assert!(foreground_fraction(&mask, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn directory_oracle_serves_and_skips() {
        let dir = tempfile::tempdir().unwrap();

        let record = MaskRecord {
            shape: vec![1, 1, 2],
            data: vec![3, 4],
        };
        std::fs::write(
            dir.path().join("1.json"),
            serde_json::to_string(&record).unwrap(),
        )
        .unwrap();

        let oracle = DirectoryOracle::new(dir.path()).unwrap();
        let skeleton = skeleton();
        let node1 = skeleton.get(NodeId(1)).unwrap();
        let node2 = skeleton.get(NodeId(2)).unwrap();

        let mask = oracle.lookup(node1).unwrap().unwrap();
        assert_eq!(mask.shape(), &[1, 1, 2]);
        assert_eq!(mask.iter().copied().collect::<Vec<u8>>(), vec![3, 4]);

        assert!(oracle.lookup(node2).unwrap().is_none());
    }

    #[test]
    fn directory_oracle_rejects_missing_directory() {
        assert!(DirectoryOracle::new("/nonexistent/mask/dir").is_err());
    }

    #[test]
    fn directory_oracle_reports_malformed_records() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("1.json"), "not a record").unwrap();

        let oracle = DirectoryOracle::new(dir.path()).unwrap();
        let skeleton = skeleton();
        let err = oracle.lookup(skeleton.get(NodeId(1)).unwrap()).unwrap_err();
        assert!(matches!(err, SourceError::Backend(_)));
    }
}
