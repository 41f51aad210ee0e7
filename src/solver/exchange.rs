//! Data exchange with external solver processes.
//!
//! A solver invocation gets a private exchange directory containing a
//! `problem.json` description plus one raw array file per input volume.
//! The solver writes its result array (and, for acoustic solvers, a
//! `result.json` metadata file) into the same directory.
//!
//! Raw array files are self-describing: `b"PARR"`, a u8 rank, the u64 LE
//! dimensions, then the f64 LE values in row-major order.

use super::SolverError;
use crate::grid::GridGeometry;
use crate::settings::Value;
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const ARRAY_MAGIC: [u8; 4] = *b"PARR";

pub const PROBLEM_FILE: &str = "problem.json";
pub const RESULT_META_FILE: &str = "result.json";

/// Description of one forward problem, serialized for the solver.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProblemDescription {
    pub task: String,
    pub wavelength_nm: u32,
    pub grid: GridGeometry,
    /// The invoking stage's settings scope, verbatim.
    pub settings: BTreeMap<String, Value>,
    /// Input array name to file name, relative to the exchange directory.
    pub inputs: BTreeMap<String, String>,
    /// File name the solver must write its result array to.
    pub output: String,
}

impl ProblemDescription {
    pub fn save(&self, dir: &Path) -> Result<(), SolverError> {
        let file = File::create(dir.join(PROBLEM_FILE))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self).map_err(|e| {
            SolverError::MalformedOutput {
                reason: format!("could not encode problem description: {e}"),
            }
        })
    }
}

/// Metadata an acoustic solver reports alongside its time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub time_step_s: f64,
    pub sample_count: usize,
}

impl ResultMetadata {
    pub fn load(dir: &Path) -> Result<ResultMetadata, SolverError> {
        let path = dir.join(RESULT_META_FILE);
        let text = std::fs::read_to_string(&path)?;
        serde_json::from_str(&text).map_err(|e| SolverError::MalformedOutput {
            reason: format!("{}: {e}", path.display()),
        })
    }

    pub fn save(&self, dir: &Path) -> Result<(), SolverError> {
        let text = serde_json::to_string(self).map_err(|e| SolverError::MalformedOutput {
            reason: format!("could not encode result metadata: {e}"),
        })?;
        std::fs::write(dir.join(RESULT_META_FILE), text)?;
        Ok(())
    }
}

fn write_array(path: &Path, dims: &[usize], values: impl Iterator<Item = f64>) -> Result<(), SolverError> {
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    out.write_all(&ARRAY_MAGIC)?;
    out.write_all(&[dims.len() as u8])?;
    for dim in dims {
        out.write_all(&(*dim as u64).to_le_bytes())?;
    }
    for value in values {
        out.write_all(&value.to_le_bytes())?;
    }
    out.flush()?;
    Ok(())
}

fn read_array(path: &Path, expect_rank: usize) -> Result<(Vec<usize>, Vec<f64>), SolverError> {
    let malformed = |reason: String| SolverError::MalformedOutput {
        reason: format!("{}: {reason}", path.display()),
    };

    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|_| malformed("missing array header".to_string()))?;
    if magic != ARRAY_MAGIC {
        return Err(malformed("bad array magic".to_string()));
    }

    let mut rank = [0u8; 1];
    reader
        .read_exact(&mut rank)
        .map_err(|_| malformed("missing rank".to_string()))?;
    let rank = rank[0] as usize;
    if rank != expect_rank {
        return Err(malformed(format!("rank {rank}, expected {expect_rank}")));
    }

    let mut dims = Vec::with_capacity(rank);
    for _ in 0..rank {
        let mut raw = [0u8; 8];
        reader
            .read_exact(&mut raw)
            .map_err(|_| malformed("truncated dimensions".to_string()))?;
        dims.push(u64::from_le_bytes(raw) as usize);
    }

    let count: usize = dims.iter().product();
    let mut values = Vec::with_capacity(count);
    let mut raw = [0u8; 8];
    for _ in 0..count {
        reader
            .read_exact(&mut raw)
            .map_err(|_| malformed("truncated values".to_string()))?;
        values.push(f64::from_le_bytes(raw));
    }
    Ok((dims, values))
}

pub fn write_array3(path: &Path, array: &Array3<f64>) -> Result<(), SolverError> {
    let (d0, d1, d2) = array.dim();
    write_array(path, &[d0, d1, d2], array.iter().copied())
}

pub fn read_array3(path: &Path) -> Result<Array3<f64>, SolverError> {
    let (dims, values) = read_array(path, 3)?;
    Array3::from_shape_vec((dims[0], dims[1], dims[2]), values).map_err(|e| {
        SolverError::MalformedOutput {
            reason: format!("{}: {e}", path.display()),
        }
    })
}

pub fn write_array2(path: &Path, array: &Array2<f64>) -> Result<(), SolverError> {
    let (d0, d1) = array.dim();
    write_array(path, &[d0, d1], array.iter().copied())
}

pub fn read_array2(path: &Path) -> Result<Array2<f64>, SolverError> {
    let (dims, values) = read_array(path, 2)?;
    Array2::from_shape_vec((dims[0], dims[1]), values).map_err(|e| {
        SolverError::MalformedOutput {
            reason: format!("{}: {e}", path.display()),
        }
    })
}
