//! The simulation data container.
//!
//! Every intermediate and final product of a pipeline run lives in one
//! append-only container file, keyed by data [`Category`] and wavelength in
//! nanometres. Wavelength-independent data (the acoustic property grids,
//! written once per run) uses the [`GLOBAL_WAVELENGTH`] slot.
//!
//! Writes are validated before anything touches the file: the first volume
//! write fixes the canonical grid shape for the whole container and every
//! later volume must match it, matrices must match the first shape written
//! for their category. A failed write therefore never clobbers data that is
//! already stored. Each record is checksummed and synced; on open, a torn
//! trailing record from an interrupted run is detected and dropped.

mod format;

use crate::settings::Scope;
use format::{Record, RecordKind};
use log::{debug, warn};
use ndarray::{Array2, Array3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Wavelength slot for data that does not depend on the optical wavelength.
pub const GLOBAL_WAVELENGTH: u32 = 0;

/// Closed set of data categories a container can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    AbsorptionCoefficient,
    ScatteringCoefficient,
    Anisotropy,
    SegmentationMask,
    SoundSpeed,
    Density,
    AcousticAttenuation,
    GruneisenParameter,
    Fluence,
    InitialPressure,
    TimeSeries,
    NoisyTimeSeries,
    Reconstruction,
}

impl Category {
    pub const ALL: [Category; 13] = [
        Category::AbsorptionCoefficient,
        Category::ScatteringCoefficient,
        Category::Anisotropy,
        Category::SegmentationMask,
        Category::SoundSpeed,
        Category::Density,
        Category::AcousticAttenuation,
        Category::GruneisenParameter,
        Category::Fluence,
        Category::InitialPressure,
        Category::TimeSeries,
        Category::NoisyTimeSeries,
        Category::Reconstruction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::AbsorptionCoefficient => "absorption_coefficient",
            Category::ScatteringCoefficient => "scattering_coefficient",
            Category::Anisotropy => "anisotropy",
            Category::SegmentationMask => "segmentation_mask",
            Category::SoundSpeed => "sound_speed",
            Category::Density => "density",
            Category::AcousticAttenuation => "acoustic_attenuation",
            Category::GruneisenParameter => "gruneisen_parameter",
            Category::Fluence => "fluence",
            Category::InitialPressure => "initial_pressure",
            Category::TimeSeries => "time_series",
            Category::NoisyTimeSeries => "noisy_time_series",
            Category::Reconstruction => "reconstruction",
        }
    }

    pub fn from_name(name: &str) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.as_str() == name)
    }

    /// Stable wire id. Never renumber: existing container files depend on
    /// these values.
    pub(crate) fn id(&self) -> u8 {
        match self {
            Category::AbsorptionCoefficient => 0,
            Category::ScatteringCoefficient => 1,
            Category::Anisotropy => 2,
            Category::SegmentationMask => 3,
            Category::SoundSpeed => 4,
            Category::Density => 5,
            Category::AcousticAttenuation => 6,
            Category::GruneisenParameter => 7,
            Category::Fluence => 8,
            Category::InitialPressure => 9,
            Category::TimeSeries => 10,
            Category::NoisyTimeSeries => 11,
            Category::Reconstruction => 12,
        }
    }

    pub(crate) fn from_id(id: u8) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.id() == id)
    }

    /// Whether the category holds three-dimensional voxel data. The two
    /// time-series categories hold detectors x samples matrices instead.
    pub fn is_volumetric(&self) -> bool {
        !matches!(self, Category::TimeSeries | Category::NoisyTimeSeries)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// A read of data that was never written. Names exactly what is missing.
    #[error("no data stored for '{category}' at {wavelength_nm} nm")]
    MissingData {
        category: Category,
        wavelength_nm: u32,
    },
    #[error(
        "shape mismatch writing '{category}' at {wavelength_nm} nm: \
         expected {expected:?}, got {got:?}"
    )]
    ShapeMismatch {
        category: Category,
        wavelength_nm: u32,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    /// Volume write to a matrix category or the other way round.
    #[error("'{category}' stores {expected}-dimensional data, not {got}-dimensional")]
    WrongRank {
        category: Category,
        expected: usize,
        got: usize,
    },
    #[error("container {path} is corrupt at offset {offset}: {reason}")]
    Corrupt {
        path: PathBuf,
        offset: u64,
        reason: String,
    },
    #[error("container I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("container metadata encoding: {0}")]
    Meta(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
struct IndexEntry {
    payload_offset: u64,
    payload_len: u64,
    dims: Vec<usize>,
}

/// Append-only, checksummed container for one simulation run.
#[derive(Debug)]
pub struct SimulationStore {
    path: PathBuf,
    file: File,
    end_offset: u64,
    arrays: BTreeMap<(Category, u32), IndexEntry>,
    metas: BTreeMap<(Category, u32), IndexEntry>,
    canonical_dims: Option<[usize; 3]>,
    matrix_dims: BTreeMap<Category, [usize; 2]>,
}

impl SimulationStore {
    /// Create a fresh container, truncating any existing file at `path`.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(SimulationStore {
            path: path.to_path_buf(),
            file,
            end_offset: 0,
            arrays: BTreeMap::new(),
            metas: BTreeMap::new(),
            canonical_dims: None,
            matrix_dims: BTreeMap::new(),
        })
    }

    /// Open an existing container, rebuilding the index by scanning every
    /// record. A torn trailing record is dropped and the file truncated to
    /// the last intact record boundary.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let data = std::fs::read(path)?;
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut store = SimulationStore {
            path: path.to_path_buf(),
            file,
            end_offset: 0,
            arrays: BTreeMap::new(),
            metas: BTreeMap::new(),
            canonical_dims: None,
            matrix_dims: BTreeMap::new(),
        };

        let mut offset = 0usize;
        while offset < data.len() {
            match format::decode_record(&data[offset..]) {
                Ok(Some((record, consumed))) => {
                    store.index_record(&record, offset as u64)?;
                    offset += consumed;
                }
                Ok(None) => break,
                Err(reason) => {
                    return Err(StoreError::Corrupt {
                        path: store.path,
                        offset: offset as u64,
                        reason: reason.to_string(),
                    })
                }
            }
        }

        if offset < data.len() {
            warn!(
                "dropping {} byte torn tail from {}",
                data.len() - offset,
                path.display()
            );
            store.file.set_len(offset as u64)?;
            store.file.sync_data()?;
        }
        store.end_offset = offset as u64;
        store.file.seek(SeekFrom::Start(store.end_offset))?;
        Ok(store)
    }

    fn index_record(&mut self, record: &Record, offset: u64) -> Result<(), StoreError> {
        let category = Category::from_id(record.category_id).ok_or_else(|| {
            StoreError::Corrupt {
                path: self.path.clone(),
                offset,
                reason: format!("unknown category id {}", record.category_id),
            }
        })?;
        let entry = IndexEntry {
            payload_offset: offset + format::payload_offset(record.dims.len()) as u64,
            payload_len: record.payload.len() as u64,
            dims: record.dims.clone(),
        };
        let key = (category, record.wavelength_nm);
        match record.kind {
            RecordKind::Array => {
                if record.dims.len() == 3 {
                    let dims = [record.dims[0], record.dims[1], record.dims[2]];
                    if self.canonical_dims.is_none() && category.is_volumetric() {
                        self.canonical_dims = Some(dims);
                    }
                } else if record.dims.len() == 2 {
                    let dims = [record.dims[0], record.dims[1]];
                    self.matrix_dims.entry(category).or_insert(dims);
                }
                self.arrays.insert(key, entry);
            }
            RecordKind::Meta => {
                self.metas.insert(key, entry);
            }
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Grid shape fixed by the first volume written, if any.
    pub fn canonical_dims(&self) -> Option<[usize; 3]> {
        self.canonical_dims
    }

    pub fn contains(&self, category: Category, wavelength_nm: u32) -> bool {
        self.arrays.contains_key(&(category, wavelength_nm))
    }

    pub fn has_meta(&self, category: Category, wavelength_nm: u32) -> bool {
        self.metas.contains_key(&(category, wavelength_nm))
    }

    /// Every stored array as (category, wavelength) pairs, sorted.
    pub fn entries(&self) -> Vec<(Category, u32)> {
        self.arrays.keys().copied().collect()
    }

    /// Store a voxel volume. The first volume fixes the canonical shape.
    pub fn write_volume(
        &mut self,
        category: Category,
        wavelength_nm: u32,
        volume: &Array3<f64>,
    ) -> Result<(), StoreError> {
        if !category.is_volumetric() {
            return Err(StoreError::WrongRank {
                category,
                expected: 2,
                got: 3,
            });
        }
        let (d0, d1, d2) = volume.dim();
        let got = [d0, d1, d2];
        match self.canonical_dims {
            None => self.canonical_dims = Some(got),
            Some(expected) if expected != got => {
                return Err(StoreError::ShapeMismatch {
                    category,
                    wavelength_nm,
                    expected: expected.to_vec(),
                    got: got.to_vec(),
                });
            }
            Some(_) => {}
        }

        let mut payload = Vec::with_capacity(volume.len() * 8);
        for value in volume.iter() {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        self.append(Record {
            kind: RecordKind::Array,
            category_id: category.id(),
            wavelength_nm,
            dims: got.to_vec(),
            payload,
        })
    }

    pub fn read_volume(
        &mut self,
        category: Category,
        wavelength_nm: u32,
    ) -> Result<Array3<f64>, StoreError> {
        let entry = self
            .arrays
            .get(&(category, wavelength_nm))
            .cloned()
            .ok_or(StoreError::MissingData {
                category,
                wavelength_nm,
            })?;
        if entry.dims.len() != 3 {
            return Err(StoreError::WrongRank {
                category,
                expected: 3,
                got: entry.dims.len(),
            });
        }
        let values = self.read_payload(&entry)?;
        let shape = (entry.dims[0], entry.dims[1], entry.dims[2]);
        Array3::from_shape_vec(shape, values).map_err(|_| StoreError::ShapeMismatch {
            category,
            wavelength_nm,
            expected: entry.dims.clone(),
            got: vec![],
        })
    }

    /// Read a volume at `wavelength_nm`, falling back to the
    /// wavelength-independent slot. Used for the acoustic property grids,
    /// which are written once per run.
    pub fn read_volume_or_global(
        &mut self,
        category: Category,
        wavelength_nm: u32,
    ) -> Result<Array3<f64>, StoreError> {
        if self.contains(category, wavelength_nm) {
            self.read_volume(category, wavelength_nm)
        } else if self.contains(category, GLOBAL_WAVELENGTH) {
            self.read_volume(category, GLOBAL_WAVELENGTH)
        } else {
            Err(StoreError::MissingData {
                category,
                wavelength_nm,
            })
        }
    }

    /// Store a detectors x samples matrix. The first write of a category
    /// fixes that category's shape.
    pub fn write_matrix(
        &mut self,
        category: Category,
        wavelength_nm: u32,
        matrix: &Array2<f64>,
    ) -> Result<(), StoreError> {
        if category.is_volumetric() {
            return Err(StoreError::WrongRank {
                category,
                expected: 3,
                got: 2,
            });
        }
        let (rows, cols) = matrix.dim();
        let got = [rows, cols];
        match self.matrix_dims.get(&category) {
            None => {
                self.matrix_dims.insert(category, got);
            }
            Some(expected) if *expected != got => {
                return Err(StoreError::ShapeMismatch {
                    category,
                    wavelength_nm,
                    expected: expected.to_vec(),
                    got: got.to_vec(),
                });
            }
            Some(_) => {}
        }

        let mut payload = Vec::with_capacity(matrix.len() * 8);
        for value in matrix.iter() {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        self.append(Record {
            kind: RecordKind::Array,
            category_id: category.id(),
            wavelength_nm,
            dims: got.to_vec(),
            payload,
        })
    }

    pub fn read_matrix(
        &mut self,
        category: Category,
        wavelength_nm: u32,
    ) -> Result<Array2<f64>, StoreError> {
        let entry = self
            .arrays
            .get(&(category, wavelength_nm))
            .cloned()
            .ok_or(StoreError::MissingData {
                category,
                wavelength_nm,
            })?;
        if entry.dims.len() != 2 {
            return Err(StoreError::WrongRank {
                category,
                expected: 2,
                got: entry.dims.len(),
            });
        }
        let values = self.read_payload(&entry)?;
        let shape = (entry.dims[0], entry.dims[1]);
        Array2::from_shape_vec(shape, values).map_err(|_| StoreError::ShapeMismatch {
            category,
            wavelength_nm,
            expected: entry.dims.clone(),
            got: vec![],
        })
    }

    /// Attach a JSON metadata record to a (category, wavelength) slot.
    pub fn write_meta<T: Serialize>(
        &mut self,
        category: Category,
        wavelength_nm: u32,
        meta: &T,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_vec(meta)?;
        self.append(Record {
            kind: RecordKind::Meta,
            category_id: category.id(),
            wavelength_nm,
            dims: vec![],
            payload,
        })
    }

    pub fn read_meta<T: DeserializeOwned>(
        &mut self,
        category: Category,
        wavelength_nm: u32,
    ) -> Result<T, StoreError> {
        let entry = self
            .metas
            .get(&(category, wavelength_nm))
            .cloned()
            .ok_or(StoreError::MissingData {
                category,
                wavelength_nm,
            })?;
        let mut raw = vec![0u8; entry.payload_len as usize];
        self.file.seek(SeekFrom::Start(entry.payload_offset))?;
        self.file.read_exact(&mut raw)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn read_payload(&mut self, entry: &IndexEntry) -> Result<Vec<f64>, StoreError> {
        let mut raw = vec![0u8; entry.payload_len as usize];
        self.file.seek(SeekFrom::Start(entry.payload_offset))?;
        self.file.read_exact(&mut raw)?;
        Ok(raw
            .chunks_exact(8)
            .map(|w| {
                f64::from_le_bytes([w[0], w[1], w[2], w[3], w[4], w[5], w[6], w[7]])
            })
            .collect())
    }

    fn append(&mut self, record: Record) -> Result<(), StoreError> {
        let bytes = format::encode_record(&record);
        self.file.seek(SeekFrom::Start(self.end_offset))?;
        self.file.write_all(&bytes)?;
        self.file.sync_data()?;

        let offset = self.end_offset;
        self.end_offset += bytes.len() as u64;
        debug!(
            "stored {} record for '{}' at {} nm ({} bytes)",
            match record.kind {
                RecordKind::Array => "array",
                RecordKind::Meta => "metadata",
            },
            Category::from_id(record.category_id)
                .map(|c| c.as_str())
                .unwrap_or("?"),
            record.wavelength_nm,
            bytes.len()
        );
        self.index_record(&record, offset)
    }
}

/// Container file name for a named simulation.
pub fn container_file_name(simulation_name: &str) -> String {
    format!("{simulation_name}.pasim")
}

/// Settings snapshot name stored next to the container.
pub fn snapshot_file_name(simulation_name: &str) -> String {
    format!("{simulation_name}.settings.json")
}

/// Scope whose stage, if configured, writes the category.
pub fn producer_scope(category: Category) -> Scope {
    match category {
        Category::AbsorptionCoefficient
        | Category::ScatteringCoefficient
        | Category::Anisotropy
        | Category::SegmentationMask
        | Category::SoundSpeed
        | Category::Density
        | Category::AcousticAttenuation
        | Category::GruneisenParameter => Scope::VolumeCreation,
        Category::Fluence | Category::InitialPressure => Scope::Optical,
        Category::TimeSeries => Scope::Acoustic,
        Category::NoisyTimeSeries => Scope::Noise,
        Category::Reconstruction => Scope::Reconstruction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr2, Array3};
    use tempfile::TempDir;

    fn volume(fill: f64) -> Array3<f64> {
        Array3::from_shape_fn((4, 3, 2), |(x, y, z)| fill + (x * 6 + y * 2 + z) as f64)
    }

    #[test]
    fn test_volume_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = SimulationStore::create(&dir.path().join("t.pasim")).unwrap();

        store
            .write_volume(Category::AbsorptionCoefficient, 800, &volume(0.5))
            .unwrap();
        let back = store
            .read_volume(Category::AbsorptionCoefficient, 800)
            .unwrap();
        assert_eq!(back.dim(), (4, 3, 2));
        assert_relative_eq!(back[[0, 0, 0]], 0.5);
        assert_relative_eq!(back[[3, 2, 1]], 0.5 + 23.0);
        assert_eq!(store.canonical_dims(), Some([4, 3, 2]));
    }

    #[test]
    fn test_missing_data_names_category_and_wavelength() {
        let dir = TempDir::new().unwrap();
        let mut store = SimulationStore::create(&dir.path().join("t.pasim")).unwrap();
        let err = store.read_volume(Category::Fluence, 700).unwrap_err();
        match err {
            StoreError::MissingData {
                category,
                wavelength_nm,
            } => {
                assert_eq!(category, Category::Fluence);
                assert_eq!(wavelength_nm, 700);
            }
            other => panic!("expected MissingData, got {other:?}"),
        }
    }

    #[test]
    fn test_shape_mismatch_leaves_prior_data_intact() {
        let dir = TempDir::new().unwrap();
        let mut store = SimulationStore::create(&dir.path().join("t.pasim")).unwrap();
        store
            .write_volume(Category::Fluence, 800, &volume(1.0))
            .unwrap();

        let odd = Array3::<f64>::zeros((2, 2, 2));
        let err = store
            .write_volume(Category::Fluence, 800, &odd)
            .unwrap_err();
        assert!(matches!(err, StoreError::ShapeMismatch { .. }));

        // The rejected write must not have touched the stored record.
        let back = store.read_volume(Category::Fluence, 800).unwrap();
        assert_relative_eq!(back[[0, 0, 0]], 1.0);
    }

    #[test]
    fn test_overwrite_replaces_visible_record() {
        let dir = TempDir::new().unwrap();
        let mut store = SimulationStore::create(&dir.path().join("t.pasim")).unwrap();
        store
            .write_volume(Category::Fluence, 800, &volume(1.0))
            .unwrap();
        store
            .write_volume(Category::Fluence, 800, &volume(9.0))
            .unwrap();
        let back = store.read_volume(Category::Fluence, 800).unwrap();
        assert_relative_eq!(back[[0, 0, 0]], 9.0);
    }

    #[test]
    fn test_matrix_round_trip_and_shape_rule() {
        let dir = TempDir::new().unwrap();
        let mut store = SimulationStore::create(&dir.path().join("t.pasim")).unwrap();

        let series = arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        store
            .write_matrix(Category::TimeSeries, 700, &series)
            .unwrap();
        let back = store.read_matrix(Category::TimeSeries, 700).unwrap();
        assert_relative_eq!(back[[1, 2]], 6.0);

        let wrong = arr2(&[[1.0, 2.0]]);
        assert!(matches!(
            store.write_matrix(Category::TimeSeries, 800, &wrong),
            Err(StoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_rank_rules_are_enforced() {
        let dir = TempDir::new().unwrap();
        let mut store = SimulationStore::create(&dir.path().join("t.pasim")).unwrap();
        assert!(matches!(
            store.write_volume(Category::TimeSeries, 800, &volume(0.0)),
            Err(StoreError::WrongRank { .. })
        ));
        assert!(matches!(
            store.write_matrix(Category::Fluence, 800, &arr2(&[[1.0]])),
            Err(StoreError::WrongRank { .. })
        ));
    }

    #[test]
    fn test_meta_round_trip() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Stamp {
            time_step_s: f64,
            sample_count: usize,
        }

        let dir = TempDir::new().unwrap();
        let mut store = SimulationStore::create(&dir.path().join("t.pasim")).unwrap();
        let stamp = Stamp {
            time_step_s: 2.5e-8,
            sample_count: 1024,
        };
        store
            .write_meta(Category::TimeSeries, 800, &stamp)
            .unwrap();
        let back: Stamp = store.read_meta(Category::TimeSeries, 800).unwrap();
        assert_eq!(back, stamp);
        assert!(store.has_meta(Category::TimeSeries, 800));
        assert!(!store.has_meta(Category::TimeSeries, 700));
    }

    #[test]
    fn test_reopen_preserves_index_and_shapes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.pasim");
        {
            let mut store = SimulationStore::create(&path).unwrap();
            store
                .write_volume(Category::SoundSpeed, GLOBAL_WAVELENGTH, &volume(1540.0))
                .unwrap();
            store
                .write_volume(Category::Fluence, 800, &volume(2.0))
                .unwrap();
        }

        let mut store = SimulationStore::open(&path).unwrap();
        assert_eq!(store.canonical_dims(), Some([4, 3, 2]));
        assert_eq!(store.entries().len(), 2);
        let sos = store
            .read_volume(Category::SoundSpeed, GLOBAL_WAVELENGTH)
            .unwrap();
        assert_relative_eq!(sos[[0, 0, 0]], 1540.0);

        // The canonical shape still binds after reopening.
        let odd = Array3::<f64>::zeros((5, 5, 5));
        assert!(matches!(
            store.write_volume(Category::Fluence, 700, &odd),
            Err(StoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_global_fallback_read() {
        let dir = TempDir::new().unwrap();
        let mut store = SimulationStore::create(&dir.path().join("t.pasim")).unwrap();
        store
            .write_volume(Category::Density, GLOBAL_WAVELENGTH, &volume(1000.0))
            .unwrap();

        let back = store.read_volume_or_global(Category::Density, 800).unwrap();
        assert_relative_eq!(back[[0, 0, 0]], 1000.0);
        assert!(matches!(
            store.read_volume_or_global(Category::SoundSpeed, 800),
            Err(StoreError::MissingData {
                category: Category::SoundSpeed,
                wavelength_nm: 800,
            })
        ));
    }

    #[test]
    fn test_torn_tail_is_dropped_on_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.pasim");
        {
            let mut store = SimulationStore::create(&path).unwrap();
            store
                .write_volume(Category::Fluence, 800, &volume(2.0))
                .unwrap();
        }
        let intact_len = std::fs::metadata(&path).unwrap().len();

        // Simulate an interrupted append: half a record at the tail.
        let mut bytes = std::fs::read(&path).unwrap();
        let tail = bytes.clone();
        bytes.extend_from_slice(&tail[..tail.len() / 2]);
        std::fs::write(&path, &bytes).unwrap();

        let mut store = SimulationStore::open(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), intact_len);
        let back = store.read_volume(Category::Fluence, 800).unwrap();
        assert_relative_eq!(back[[1, 1, 1]], 2.0 + 9.0);

        // The recovered container accepts further writes.
        store
            .write_volume(Category::Fluence, 700, &volume(3.0))
            .unwrap();
        let store = SimulationStore::open(&path).unwrap();
        assert_eq!(store.entries().len(), 2);
    }

    #[test]
    fn test_corrupt_record_fails_open_with_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.pasim");
        {
            let mut store = SimulationStore::create(&path).unwrap();
            store
                .write_volume(Category::Fluence, 800, &volume(2.0))
                .unwrap();
        }

        let mut bytes = std::fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        match SimulationStore::open(&path) {
            Err(StoreError::Corrupt { offset, .. }) => assert_eq!(offset, 0),
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[test]
    fn test_producer_scope_mapping() {
        assert_eq!(producer_scope(Category::SoundSpeed), Scope::VolumeCreation);
        assert_eq!(producer_scope(Category::Fluence), Scope::Optical);
        assert_eq!(producer_scope(Category::TimeSeries), Scope::Acoustic);
        assert_eq!(
            producer_scope(Category::NoisyTimeSeries),
            Scope::Noise
        );
        assert_eq!(
            producer_scope(Category::Reconstruction),
            Scope::Reconstruction
        );
    }
}
