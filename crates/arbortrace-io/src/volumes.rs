//! Imaging-volume descriptors and voxel patch access.
//!
//! Volumes are described by TOML files. One file may describe volumes in
//! any of the three supported container layouts — `[[hdf5]]`,
//! `[[image_stack]]`, and `[[n5]]` tables — and every file is parsed for
//! all three kinds, so callers never declare a format up front. Descriptors
//! from several files merge into one name-keyed set, optionally narrowed by
//! a regular-expression name filter.
//!
//! Voxel access goes through the [`Volume`] trait. [`InMemoryVolume`] is the
//! in-crate implementation; it backs tests and full in-memory
//! materialization ([`Volume::to_memory`]). Opening the on-disk container
//! formats is an external capability behind the same trait.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ndarray::Array3;
use regex::Regex;
use serde::Deserialize;

use arbortrace_pipeline::{Point3, SourceError};

/// Errors around volume descriptors.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    /// A descriptor file could not be read.
    #[error("failed to read volume descriptor {path}: {source}")]
    Read {
        /// The descriptor file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A descriptor file could not be parsed.
    #[error("failed to parse volume descriptor {path}: {source}")]
    Parse {
        /// The descriptor file.
        path: PathBuf,
        /// Underlying TOML failure.
        #[source]
        source: Box<toml::de::Error>,
    },

    /// Two descriptors (possibly across files) share a name.
    #[error("duplicate volume name `{0}`")]
    DuplicateName(String),

    /// The name filter was not a valid regular expression.
    #[error("invalid volume name filter: {0}")]
    InvalidFilter(#[from] regex::Error),
}

/// Geometry shared by every volume kind. Axis order is `(x, y, z)`
/// throughout.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VolumeGeometry {
    /// Voxel resolution in nanometres per voxel.
    pub resolution: [f64; 3],
    /// Voxel offset of the volume origin within the global grid.
    #[serde(default)]
    pub offset: [i64; 3],
    /// Voxel extents.
    pub shape: [usize; 3],
}

/// Descriptor of an HDF5-container volume.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Hdf5Descriptor {
    /// Volume name, unique within the loaded set.
    pub name: String,
    /// Container file path.
    pub path: PathBuf,
    /// Dataset within the container.
    pub dataset: String,
    /// Grid geometry.
    #[serde(flatten)]
    pub geometry: VolumeGeometry,
}

/// Descriptor of an image-stack volume (one image file per section).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageStackDescriptor {
    /// Volume name, unique within the loaded set.
    pub name: String,
    /// Directory holding the section images.
    pub root: PathBuf,
    /// Filename pattern for section files.
    pub file_pattern: String,
    /// Grid geometry.
    #[serde(flatten)]
    pub geometry: VolumeGeometry,
}

/// Descriptor of an N5-container volume.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct N5Descriptor {
    /// Volume name, unique within the loaded set.
    pub name: String,
    /// Container root directory.
    pub root: PathBuf,
    /// Dataset within the container.
    pub dataset: String,
    /// Grid geometry.
    #[serde(flatten)]
    pub geometry: VolumeGeometry,
}

/// One parsed descriptor of any container kind.
#[derive(Debug, Clone, PartialEq)]
pub enum VolumeDescriptor {
    /// HDF5 container.
    Hdf5(Hdf5Descriptor),
    /// Per-section image stack.
    ImageStack(ImageStackDescriptor),
    /// N5 container.
    N5(N5Descriptor),
}

impl VolumeDescriptor {
    /// The volume's name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Hdf5(d) => &d.name,
            Self::ImageStack(d) => &d.name,
            Self::N5(d) => &d.name,
        }
    }

    /// The volume's grid geometry.
    #[must_use]
    pub const fn geometry(&self) -> &VolumeGeometry {
        match self {
            Self::Hdf5(d) => &d.geometry,
            Self::ImageStack(d) => &d.geometry,
            Self::N5(d) => &d.geometry,
        }
    }

    /// Short container-kind label for display.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Hdf5(_) => "hdf5",
            Self::ImageStack(_) => "image-stack",
            Self::N5(_) => "n5",
        }
    }
}

/// Serde shape of one descriptor document.
#[derive(Debug, Default, Deserialize)]
struct DescriptorFile {
    #[serde(default)]
    hdf5: Vec<Hdf5Descriptor>,
    #[serde(default)]
    image_stack: Vec<ImageStackDescriptor>,
    #[serde(default)]
    n5: Vec<N5Descriptor>,
}

/// Parse one descriptor document.
///
/// All three table kinds are read from the same document; a file that
/// defines none of them yields an empty list.
///
/// # Errors
///
/// Returns the TOML error for an unparseable document.
pub fn parse_descriptors(text: &str) -> Result<Vec<VolumeDescriptor>, Box<toml::de::Error>> {
    let file: DescriptorFile = toml::from_str(text).map_err(Box::new)?;
    let mut descriptors = Vec::new();
    descriptors.extend(file.hdf5.into_iter().map(VolumeDescriptor::Hdf5));
    descriptors.extend(
        file.image_stack
            .into_iter()
            .map(VolumeDescriptor::ImageStack),
    );
    descriptors.extend(file.n5.into_iter().map(VolumeDescriptor::N5));
    Ok(descriptors)
}

/// Load and merge descriptors from several files.
///
/// # Errors
///
/// Returns [`VolumeError::Read`]/[`VolumeError::Parse`] for an unreadable
/// or malformed file and [`VolumeError::DuplicateName`] when two
/// descriptors share a name.
pub fn load_descriptors(
    paths: &[PathBuf],
) -> Result<BTreeMap<String, VolumeDescriptor>, VolumeError> {
    let mut merged = BTreeMap::new();
    for path in paths {
        let text = std::fs::read_to_string(path).map_err(|source| VolumeError::Read {
            path: path.clone(),
            source,
        })?;
        let descriptors = parse_descriptors(&text).map_err(|source| VolumeError::Parse {
            path: path.clone(),
            source,
        })?;
        for descriptor in descriptors {
            let name = descriptor.name().to_owned();
            if merged.insert(name.clone(), descriptor).is_some() {
                return Err(VolumeError::DuplicateName(name));
            }
        }
    }
    Ok(merged)
}

/// Keep only volumes whose name matches the pattern.
///
/// # Errors
///
/// Returns [`VolumeError::InvalidFilter`] for an invalid regular
/// expression.
pub fn filter_by_name<V>(
    volumes: BTreeMap<String, V>,
    pattern: &str,
) -> Result<BTreeMap<String, V>, VolumeError> {
    let re = Regex::new(pattern)?;
    Ok(volumes
        .into_iter()
        .filter(|(name, _)| re.is_match(name))
        .collect())
}

/// Voxel bounds of a volume: origin offset and extents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeBounds {
    /// Voxel offset of the volume origin within the global grid.
    pub offset: [i64; 3],
    /// Voxel extents.
    pub shape: [usize; 3],
}

impl VolumeBounds {
    /// Whether a voxel coordinate lies inside the volume.
    #[must_use]
    pub fn contains(&self, voxel: [i64; 3]) -> bool {
        (0..3).all(|axis| {
            let lo = self.offset[axis];
            let hi = lo.saturating_add(i64::try_from(self.shape[axis]).unwrap_or(i64::MAX));
            voxel[axis] >= lo && voxel[axis] < hi
        })
    }
}

/// External capability: voxel access to one named imaging volume.
pub trait Volume {
    /// The volume's name.
    fn name(&self) -> &str;

    /// Voxel resolution in nanometres per voxel, axis order `(x, y, z)`.
    fn resolution(&self) -> [f64; 3];

    /// Voxel bounds within the global grid.
    fn bounds(&self) -> VolumeBounds;

    /// Read a patch of the given shape starting at `origin` (global voxel
    /// coordinates). Voxels outside the volume are zero-filled.
    ///
    /// # Errors
    ///
    /// Container access failures surface as [`SourceError`].
    fn read_patch(&self, origin: [i64; 3], shape: [usize; 3]) -> Result<Array3<u8>, SourceError>;

    /// Map a world-space position (nanometres) onto this volume's voxel
    /// grid.
    fn world_to_voxel(&self, position: Point3) -> [i64; 3] {
        let resolution = self.resolution();
        // Positions are far below i64 range once divided by a sane
        // resolution; flooring keeps voxel addressing stable across the
        // origin.
        #[allow(clippy::cast_possible_truncation)]
        [
            (position.x / resolution[0]).floor() as i64,
            (position.y / resolution[1]).floor() as i64,
            (position.z / resolution[2]).floor() as i64,
        ]
    }

    /// Materialize the entire volume in memory.
    ///
    /// # Errors
    ///
    /// Propagates [`SourceError`] from the underlying patch read.
    fn to_memory(&self) -> Result<InMemoryVolume, SourceError> {
        let bounds = self.bounds();
        let data = self.read_patch(bounds.offset, bounds.shape)?;
        Ok(InMemoryVolume::new(
            self.name().to_owned(),
            bounds.offset,
            self.resolution(),
            data,
        ))
    }
}

/// A fully in-memory uint8 volume.
///
/// Backs tests and the in-memory materialization mode.
#[derive(Debug, Clone, PartialEq)]
pub struct InMemoryVolume {
    name: String,
    offset: [i64; 3],
    resolution: [f64; 3],
    data: Array3<u8>,
}

impl InMemoryVolume {
    /// Wrap raw voxel data.
    #[must_use]
    pub fn new(name: String, offset: [i64; 3], resolution: [f64; 3], data: Array3<u8>) -> Self {
        Self {
            name,
            offset,
            resolution,
            data,
        }
    }

    /// Borrow the underlying voxel array.
    #[must_use]
    pub const fn data(&self) -> &Array3<u8> {
        &self.data
    }
}

impl Volume for InMemoryVolume {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolution(&self) -> [f64; 3] {
        self.resolution
    }

    fn bounds(&self) -> VolumeBounds {
        let (sx, sy, sz) = self.data.dim();
        VolumeBounds {
            offset: self.offset,
            shape: [sx, sy, sz],
        }
    }

    // Patch extents are far below i64::MAX, and `contains` guarantees the
    // local indices are non-negative.
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn read_patch(&self, origin: [i64; 3], shape: [usize; 3]) -> Result<Array3<u8>, SourceError> {
        let bounds = self.bounds();
        let mut patch = Array3::zeros(shape);
        for px in 0..shape[0] {
            for py in 0..shape[1] {
                for pz in 0..shape[2] {
                    let voxel = [
                        origin[0] + px as i64,
                        origin[1] + py as i64,
                        origin[2] + pz as i64,
                    ];
                    if bounds.contains(voxel) {
                        let local = [
                            (voxel[0] - bounds.offset[0]) as usize,
                            (voxel[1] - bounds.offset[1]) as usize,
                            (voxel[2] - bounds.offset[2]) as usize,
                        ];
                        patch[[px, py, pz]] = self.data[[local[0], local[1], local[2]]];
                    }
                }
            }
        }
        Ok(patch)
    }
}
