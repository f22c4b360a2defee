//! arbortrace-pipeline: skeleton-guided reconstruction core (sans-IO).
//!
//! Coordinates neuron-skeleton reconstruction:
//! build skeleton from rows -> optional resample -> per-node segmentation
//! -> merge masks -> hand off for serialization.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory rows
//! and arrays and returns structured data. Volume access, file-backed
//! segmentation sources, and persistence live in `arbortrace-io`.

pub mod diagnostics;
pub mod merge;
pub mod resample;
pub mod skeleton;
pub mod source;
pub mod swc;
pub mod types;

use std::collections::BTreeMap;

pub use diagnostics::{
    DiagnosticEvent, DiagnosticSink, MergeOutcome, NullSink, RecordingSink, Severity, TracingSink,
};
pub use merge::{MergeSummary, merge_results};
pub use resample::{ResampledSkeleton, Resampler};
pub use skeleton::{Skeleton, SkeletonNode};
pub use source::{SegmentationResults, SegmentationSource, SourceError, StubSource};
pub use types::{
    ConfigError, LabelMask, MaskShapeError, NodeId, NodeRow, PipelineConfig, PipelineError,
    Point3, SkeletonConfig,
};

/// A built skeleton plus resampling traceability.
///
/// When resampling was off, `origin_map` is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltSkeleton {
    /// The skeleton ready for segmentation.
    pub skeleton: Skeleton,
    /// Resampled node id -> original node id.
    pub origin_map: BTreeMap<NodeId, NodeId>,
}

/// Build the skeleton described by the configuration.
///
/// Ownership of the resulting tree transfers to the caller; there are no
/// side effects beyond allocation. `config.nodes_file` must already have
/// been resolved into `config.nodes` by the caller (the core never reads
/// files).
///
/// # Errors
///
/// - [`ConfigError::StrahlerFilterUnsupported`] when `strahler_filter` is
///   set: the filter has no implementation, and the request must fail
///   loudly rather than be silently ignored.
/// - [`ConfigError::ResamplerMissing`] when `resample` is set but no
///   resampler was injected.
/// - Any structural row error from
///   [`Skeleton::from_rows`].
pub fn build_skeleton(
    config: &SkeletonConfig,
    resampler: Option<&dyn Resampler>,
) -> Result<BuiltSkeleton, ConfigError> {
    if config.strahler_filter {
        return Err(ConfigError::StrahlerFilterUnsupported {
            min: config.min_strahler,
            max: config.max_strahler,
        });
    }

    let skeleton = Skeleton::from_rows(&config.nodes)?;

    if config.resample {
        let Some(resampler) = resampler else {
            return Err(ConfigError::ResamplerMissing);
        };
        let resampled = resampler.resample(&skeleton);
        Ok(BuiltSkeleton {
            skeleton: resampled.skeleton,
            origin_map: resampled.origin_map,
        })
    } else {
        Ok(BuiltSkeleton {
            skeleton,
            origin_map: BTreeMap::new(),
        })
    }
}

/// Result of running the reconstruction pipeline.
#[derive(Debug)]
pub struct Reconstruction {
    /// The skeleton with masks attached wherever data was available.
    pub skeleton: Skeleton,
    /// Resampled node id -> original node id (empty without resampling).
    pub origin_map: BTreeMap<NodeId, NodeId>,
    /// Counts of the per-node merge outcomes.
    pub merge: MergeSummary,
}

/// Run the reconstruction pipeline.
///
/// Single-threaded and synchronous end-to-end; the segmentation source is
/// invoked exactly once and blocks until all results are ready.
/// Persistence is the caller's step (see `arbortrace-export` and the
/// drivers in `arbortrace-io`).
///
/// # Pipeline steps
///
/// 1. Build the skeleton, optionally resampling it
/// 2. Invoke the segmentation source
/// 3. Merge per-node results onto the skeleton
///
/// # Errors
///
/// Returns [`PipelineError::Config`] for build failures and
/// [`PipelineError::Source`] when the source invocation fails. Per-node
/// merge issues are diagnostics, never errors.
pub fn reconstruct<S: SegmentationSource>(
    config: &PipelineConfig,
    resampler: Option<&dyn Resampler>,
    source: &mut S,
    sink: &dyn DiagnosticSink,
) -> Result<Reconstruction, PipelineError> {
    // 1. Build the skeleton (optional resample).
    let BuiltSkeleton {
        mut skeleton,
        origin_map,
    } = build_skeleton(&config.skeleton, resampler)?;

    // 2. Per-node segmentation. May be computationally expensive; the source
    //    may parallelize internally, opaque to the pipeline.
    let results = source.segment_skeleton(&skeleton)?;

    // 3. Merge masks onto the skeleton.
    let merge = merge_results(&mut skeleton, results, sink);

    Ok(Reconstruction {
        skeleton,
        origin_map,
        merge,
    })
}
