//! arbortrace-io: I/O-backed collaborators for the reconstruction pipeline.
//!
//! Everything the sans-IO core cannot do itself lives here: imaging-volume
//! descriptors and voxel access, the file-backed segmentation sources
//! (model-backed and watershed-backed), the three reconstruction drivers,
//! and annotation-document persistence.

pub mod drivers;
pub mod model;
pub mod volumes;
pub mod watershed;

pub use drivers::{
    DriverError, ModelInputs, RunReport, read_config, reconstruct_with_model,
    reconstruct_with_stub, reconstruct_with_watershed, save_for_catmaid,
};
pub use model::{ModelParams, ModelSource, PatchClassifier};
pub use volumes::{
    InMemoryVolume, Volume, VolumeBounds, VolumeDescriptor, VolumeError, filter_by_name,
    load_descriptors, parse_descriptors,
};
pub use watershed::{DirectoryOracle, RegionOracle, SensitivityParams, WatershedSource};
