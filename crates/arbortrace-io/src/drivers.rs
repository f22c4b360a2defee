//! The three reconstruction drivers and file persistence.
//!
//! Each driver has the same five-step shape: build the skeleton, construct
//! its segmentation source from source-specific dependencies, invoke the
//! source once, merge the results, and persist the annotation document.
//! Only the source construction differs.
//!
//! No driver bundles a resampler; a configuration requesting resampling
//! fails with `ResamplerMissing`. Callers with a resampler should use
//! [`arbortrace_pipeline::reconstruct`] directly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use arbortrace_export::ExportMetadata;
use arbortrace_pipeline::{
    DiagnosticSink, MergeSummary, PipelineConfig, PipelineError, Reconstruction,
    SegmentationSource, StubSource, swc,
};

use crate::model::{ModelParams, ModelSource, PatchClassifier};
use crate::volumes::Volume;
use crate::watershed::{RegionOracle, WatershedSource};

/// Errors raised by a driver run.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// An input file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The unreadable file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The pipeline configuration file could not be parsed.
    #[error("failed to parse configuration {path}: {source}")]
    ParseConfig {
        /// The configuration file.
        path: PathBuf,
        /// Underlying TOML failure.
        #[source]
        source: Box<toml::de::Error>,
    },

    /// The pipeline itself failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The export document could not be serialized.
    #[error(transparent)]
    Export(#[from] arbortrace_export::ExportError),

    /// The output file could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        /// The output file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of a full driver run.
#[derive(Debug)]
pub struct RunReport {
    /// The pipeline result (skeleton with masks, origin map, merge counts).
    pub reconstruction: Reconstruction,
    /// Where the annotation document was written.
    pub output: PathBuf,
}

impl RunReport {
    /// The merge outcome counts.
    #[must_use]
    pub const fn merge(&self) -> &MergeSummary {
        &self.reconstruction.merge
    }
}

/// Read a pipeline configuration TOML and resolve `skeleton.nodes_file`
/// into rows.
///
/// A relative `nodes_file` is resolved against the configuration file's
/// directory. Rows from the file are appended after any rows embedded in
/// the configuration.
///
/// # Errors
///
/// Returns [`DriverError::Read`]/[`DriverError::ParseConfig`] for file
/// problems and a [`DriverError::Pipeline`] configuration error for
/// malformed SWC rows.
pub fn read_config(path: &Path) -> Result<PipelineConfig, DriverError> {
    let text = read_input(path)?;
    let mut config: PipelineConfig =
        toml::from_str(&text).map_err(|source| DriverError::ParseConfig {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;

    if let Some(nodes_file) = config.skeleton.nodes_file.take() {
        let resolved = path
            .parent()
            .map_or_else(|| nodes_file.clone(), |dir| dir.join(&nodes_file));
        let swc_text = read_input(&resolved)?;
        let mut rows = swc::parse(&swc_text).map_err(PipelineError::from)?;
        config.skeleton.nodes.append(&mut rows);
    }

    Ok(config)
}

/// Serialize the reconstructed skeleton and write the annotation document.
///
/// # Errors
///
/// Returns [`DriverError::Export`] for serialization failures and
/// [`DriverError::Write`] for write failures.
pub fn save_for_catmaid(reconstruction: &Reconstruction, out: &Path) -> Result<(), DriverError> {
    let metadata = ExportMetadata {
        skeleton_name: None,
        origin_map: Some(&reconstruction.origin_map),
    };
    let json = arbortrace_export::to_catmaid_json(&reconstruction.skeleton, &metadata)?;
    std::fs::write(out, json).map_err(|source| DriverError::Write {
        path: out.to_path_buf(),
        source,
    })
}

/// Reconstruct with the deterministic test-data source.
///
/// # Errors
///
/// See [`DriverError`].
pub fn reconstruct_with_stub(
    config: &PipelineConfig,
    out: &Path,
    sink: &dyn DiagnosticSink,
) -> Result<RunReport, DriverError> {
    let mut source = StubSource::default();
    run(config, &mut source, out, sink)
}

/// Reconstruct against precomputed watershed segmentations.
///
/// # Errors
///
/// See [`DriverError`].
pub fn reconstruct_with_watershed(
    config: &PipelineConfig,
    sensitivity_file: &Path,
    oracle: Box<dyn RegionOracle>,
    out: &Path,
    sink: &dyn DiagnosticSink,
) -> Result<RunReport, DriverError> {
    let mut source = WatershedSource::from_sensitivity_file(sensitivity_file, oracle)
        .map_err(PipelineError::from)?;
    run(config, &mut source, out, sink)
}

/// Source-specific dependencies of the model-backed driver.
pub struct ModelInputs {
    /// Already-opened imaging volumes, keyed by name.
    pub volumes: BTreeMap<String, Box<dyn Volume>>,
    /// Training configuration TOML path.
    pub training_config: PathBuf,
    /// Job configuration TOML path; overrides training values.
    pub job_config: PathBuf,
    /// Model weights file path (must exist).
    pub weights_file: PathBuf,
    /// The network behind the source.
    pub classifier: Box<dyn PatchClassifier>,
}

/// Reconstruct with the model-backed source.
///
/// Volumes must already be opened (and optionally name-filtered or
/// materialized; see [`crate::volumes`]) before calling.
///
/// # Errors
///
/// See [`DriverError`].
pub fn reconstruct_with_model(
    config: &PipelineConfig,
    inputs: ModelInputs,
    out: &Path,
    sink: &dyn DiagnosticSink,
) -> Result<RunReport, DriverError> {
    let training = read_input(&inputs.training_config)?;
    let job = read_input(&inputs.job_config)?;
    let params =
        ModelParams::from_toml_documents(&[&training, &job]).map_err(PipelineError::from)?;
    let mut source = ModelSource::new(
        inputs.volumes,
        params,
        inputs.weights_file,
        inputs.classifier,
    )
    .map_err(PipelineError::from)?;
    run(config, &mut source, out, sink)
}

/// The shared driver tail: reconstruct, persist, report.
fn run<S: SegmentationSource>(
    config: &PipelineConfig,
    source: &mut S,
    out: &Path,
    sink: &dyn DiagnosticSink,
) -> Result<RunReport, DriverError> {
    let reconstruction = arbortrace_pipeline::reconstruct(config, None, source, sink)?;
    save_for_catmaid(&reconstruction, out)?;
    tracing::info!(
        nodes = reconstruction.skeleton.len(),
        masks = reconstruction.merge.applied,
        output = %out.display(),
        "reconstruction complete",
    );
    Ok(RunReport {
        reconstruction,
        output: out.to_path_buf(),
    })
}

/// Read one input file, wrapping the error with its path.
fn read_input(path: &Path) -> Result<String, DriverError> {
    std::fs::read_to_string(path).map_err(|source| DriverError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use arbortrace_pipeline::{NodeId, NullSink};

    use super::*;

    const CONFIG_TOML: &str = r#"
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

    #[test]
    fn read_config_parses_embedded_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, CONFIG_TOML).unwrap();

        let config = read_config(&path).unwrap();
        assert_eq!(config.skeleton.nodes.len(), 2);
        assert!(config.skeleton.nodes_file.is_none());
    }

    #[test]
    fn read_config_resolves_swc_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("arbor.swc"),
            "1 0 0.0 0.0 0.0 -1 -1\n2 0 40.0 0.0 0.0 1.0 1\n",
        )
        .unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "[skeleton]\nnodes_file = \"arbor.swc\"\n").unwrap();

        let config = read_config(&path).unwrap();
        assert_eq!(config.skeleton.nodes.len(), 2);
        assert_eq!(config.skeleton.nodes[1].parent, Some(NodeId(1)));
        assert!(config.skeleton.nodes_file.is_none());
    }

    #[test]
    fn read_config_reports_missing_file() {
        let err = read_config(Path::new("/nonexistent/run.toml")).unwrap_err();
        assert!(matches!(err, DriverError::Read { .. }));
    }

    #[test]
    fn read_config_reports_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "not [valid toml").unwrap();
        let err = read_config(&path).unwrap_err();
        assert!(matches!(err, DriverError::ParseConfig { .. }));
    }

    #[test]
    fn stub_driver_writes_the_annotation_document() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("run.toml");
        std::fs::write(&config_path, CONFIG_TOML).unwrap();
        let out = dir.path().join("reconstruction.json");

        let config = read_config(&config_path).unwrap();
        let report = reconstruct_with_stub(&config, &out, &NullSink).unwrap();

        assert_eq!(report.merge().applied, 2);
        assert!(out.is_file());

        let document: arbortrace_export::CatmaidDocument =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(document.treenodes.len(), 2);
        assert_eq!(document.masks.len(), 2);
    }
}
