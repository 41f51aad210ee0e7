//! Hierarchical, validated simulation settings.
//!
//! Settings live in a tree of scopes: one global scope plus one scope per
//! pipeline stage. Every key is declared up front in [`keys`] with a value
//! kind, a range check and an optional default; reads of unset keys fail
//! with [`SettingsError::MissingKey`] instead of falling back silently, and
//! writes are validated at the moment of the write. Group application is
//! atomic so a stage is either fully configured or not configured at all.
//!
//! The store is built once per run and, apart from the orchestrator's
//! per-wavelength override of [`keys::CURRENT_WAVELENGTH_NM`], is not
//! mutated after the pipeline starts. It serializes to a JSON snapshot
//! stored next to the data container for reproducibility.

pub mod keys;

pub use keys::{Check, DefaultValue, KeyDef, ValueKind};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors produced by the settings store.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// A declared key was read but never set, and carries no default.
    #[error("settings key '{scope}/{key}' is not set and no default is registered")]
    MissingKey { scope: Scope, key: String },
    /// A name that is not declared in the registry for the scope.
    #[error("'{key}' is not a declared settings key in scope '{scope}'")]
    UndeclaredKey { scope: Scope, key: String },
    /// A value that fails its key's kind or range validation.
    #[error("invalid value for '{scope}/{key}': {reason}")]
    InvalidValue {
        scope: Scope,
        key: String,
        reason: String,
    },
    #[error("settings snapshot I/O: {0}")]
    SnapshotIo(#[from] std::io::Error),
    #[error("settings snapshot format: {0}")]
    SnapshotFormat(#[from] serde_json::Error),
}

/// Settings scopes: one per pipeline stage plus the global scope.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Global,
    VolumeCreation,
    Optical,
    Acoustic,
    Noise,
    Reconstruction,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::VolumeCreation => "volume_creation",
            Scope::Optical => "optical",
            Scope::Acoustic => "acoustic",
            Scope::Noise => "noise",
            Scope::Reconstruction => "reconstruction",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A settings value. Untagged in JSON, so snapshots read naturally:
/// `{"spacing_mm": 0.5, "wavelengths_nm": [700, 800]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    IntList(Vec<i64>),
    FloatTriple([f64; 3]),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Str(_) => ValueKind::Str,
            Value::IntList(_) => ValueKind::IntList,
            Value::FloatTriple(_) => ValueKind::FloatTriple,
        }
    }

    /// Coerce into the declared kind where lossless: integers widen to
    /// floats, an all-integer triple widens to a float triple.
    fn coerce(self, kind: ValueKind) -> Option<Value> {
        if self.kind() == kind {
            return Some(self);
        }
        match (self, kind) {
            (Value::Int(i), ValueKind::Float) => Some(Value::Float(i as f64)),
            (Value::IntList(l), ValueKind::FloatTriple) if l.len() == 3 => Some(
                Value::FloatTriple([l[0] as f64, l[1] as f64, l[2] as f64]),
            ),
            _ => None,
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            Value::Float(f) => f.is_finite(),
            Value::FloatTriple(t) => t.iter().all(|v| v.is_finite()),
            _ => true,
        }
    }
}

impl keys::DefaultValue {
    fn to_value(self) -> Value {
        match self {
            DefaultValue::Bool(b) => Value::Bool(b),
            DefaultValue::Int(i) => Value::Int(i),
            DefaultValue::Float(f) => Value::Float(f),
            DefaultValue::Str(s) => Value::Str(s.to_string()),
        }
    }
}

/// The settings store. Passed by reference through the orchestrator into
/// every stage; there is no ambient global instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    scopes: BTreeMap<Scope, BTreeMap<String, Value>>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single key after kind coercion and range validation.
    pub fn set(&mut self, key: &KeyDef, value: Value) -> Result<(), SettingsError> {
        let value = validated(key, value)?;
        self.scopes
            .entry(key.scope)
            .or_default()
            .insert(key.name.to_string(), value);
        Ok(())
    }

    /// Apply a group of related keys atomically: every entry is validated
    /// before any entry is inserted, so a failing group leaves the store
    /// untouched.
    pub fn apply_group(&mut self, entries: Vec<(&KeyDef, Value)>) -> Result<(), SettingsError> {
        let mut checked = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            checked.push((key, validated(key, value)?));
        }
        for (key, value) in checked {
            self.scopes
                .entry(key.scope)
                .or_default()
                .insert(key.name.to_string(), value);
        }
        Ok(())
    }

    /// Read a key, falling back to its registered default.
    pub fn get(&self, key: &KeyDef) -> Result<Value, SettingsError> {
        if let Some(value) = self
            .scopes
            .get(&key.scope)
            .and_then(|entries| entries.get(key.name))
        {
            return Ok(value.clone());
        }
        if let Some(default) = key.default {
            return Ok(default.to_value());
        }
        Err(SettingsError::MissingKey {
            scope: key.scope,
            key: key.name.to_string(),
        })
    }

    /// Whether the key has been explicitly set (defaults do not count).
    pub fn has(&self, key: &KeyDef) -> bool {
        self.scopes
            .get(&key.scope)
            .map(|entries| entries.contains_key(key.name))
            .unwrap_or(false)
    }

    /// Whether any key has been set in the scope. Used for optional-stage
    /// assembly: an unconfigured scope means the stage is skipped.
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes
            .get(&scope)
            .map(|entries| !entries.is_empty())
            .unwrap_or(false)
    }

    /// Clone of every explicitly set entry in a scope, for inclusion in
    /// external-solver problem descriptions.
    pub fn scope_entries(&self, scope: Scope) -> BTreeMap<String, Value> {
        self.scopes.get(&scope).cloned().unwrap_or_default()
    }

    pub fn get_bool(&self, key: &KeyDef) -> Result<bool, SettingsError> {
        match self.get(key)? {
            Value::Bool(b) => Ok(b),
            other => Err(wrong_kind(key, &other)),
        }
    }

    pub fn get_i64(&self, key: &KeyDef) -> Result<i64, SettingsError> {
        match self.get(key)? {
            Value::Int(i) => Ok(i),
            other => Err(wrong_kind(key, &other)),
        }
    }

    pub fn get_u64(&self, key: &KeyDef) -> Result<u64, SettingsError> {
        let raw = self.get_i64(key)?;
        u64::try_from(raw).map_err(|_| SettingsError::InvalidValue {
            scope: key.scope,
            key: key.name.to_string(),
            reason: format!("{raw} cannot be negative"),
        })
    }

    pub fn get_usize(&self, key: &KeyDef) -> Result<usize, SettingsError> {
        let raw = self.get_i64(key)?;
        usize::try_from(raw).map_err(|_| SettingsError::InvalidValue {
            scope: key.scope,
            key: key.name.to_string(),
            reason: format!("{raw} is not a valid count"),
        })
    }

    pub fn get_f64(&self, key: &KeyDef) -> Result<f64, SettingsError> {
        match self.get(key)? {
            Value::Float(f) => Ok(f),
            other => Err(wrong_kind(key, &other)),
        }
    }

    pub fn get_str(&self, key: &KeyDef) -> Result<String, SettingsError> {
        match self.get(key)? {
            Value::Str(s) => Ok(s),
            other => Err(wrong_kind(key, &other)),
        }
    }

    pub fn get_path(&self, key: &KeyDef) -> Result<PathBuf, SettingsError> {
        Ok(PathBuf::from(self.get_str(key)?))
    }

    pub fn get_triple(&self, key: &KeyDef) -> Result<[f64; 3], SettingsError> {
        match self.get(key)? {
            Value::FloatTriple(t) => Ok(t),
            other => Err(wrong_kind(key, &other)),
        }
    }

    /// Read a wavelength list as `u32` nanometres.
    pub fn get_wavelengths(&self, key: &KeyDef) -> Result<Vec<u32>, SettingsError> {
        let raw = match self.get(key)? {
            Value::IntList(l) => l,
            other => return Err(wrong_kind(key, &other)),
        };
        raw.into_iter()
            .map(|nm| {
                u32::try_from(nm).map_err(|_| SettingsError::InvalidValue {
                    scope: key.scope,
                    key: key.name.to_string(),
                    reason: format!("wavelength {nm} nm is out of range"),
                })
            })
            .collect()
    }

    /// Write the store as a pretty-printed JSON snapshot.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load a snapshot, resolving every entry against the key registry.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse settings JSON; every key must be declared and every value must
    /// pass its key's validation.
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let raw: BTreeMap<Scope, BTreeMap<String, Value>> = serde_json::from_str(text)?;
        let mut settings = Settings::new();
        for (scope, entries) in raw {
            for (name, value) in entries {
                let key = keys::lookup(scope, &name).ok_or_else(|| {
                    SettingsError::UndeclaredKey {
                        scope,
                        key: name.clone(),
                    }
                })?;
                settings.set(key, value)?;
            }
        }
        Ok(settings)
    }
}

fn wrong_kind(key: &KeyDef, found: &Value) -> SettingsError {
    SettingsError::InvalidValue {
        scope: key.scope,
        key: key.name.to_string(),
        reason: format!(
            "expected {}, found {}",
            key.kind.as_str(),
            found.kind().as_str()
        ),
    }
}

fn validated(key: &KeyDef, value: Value) -> Result<Value, SettingsError> {
    let found = value.kind();
    let value = value.coerce(key.kind).ok_or_else(|| SettingsError::InvalidValue {
        scope: key.scope,
        key: key.name.to_string(),
        reason: format!("expected {}, got {}", key.kind.as_str(), found.as_str()),
    })?;
    if !value.is_finite() {
        return Err(SettingsError::InvalidValue {
            scope: key.scope,
            key: key.name.to_string(),
            reason: "value must be finite".to_string(),
        });
    }
    run_check(key, &value)?;
    Ok(value)
}

fn run_check(key: &KeyDef, value: &Value) -> Result<(), SettingsError> {
    let fail = |reason: String| {
        Err(SettingsError::InvalidValue {
            scope: key.scope,
            key: key.name.to_string(),
            reason,
        })
    };
    match key.check {
        Check::None => Ok(()),
        Check::Positive => match value {
            Value::Int(i) if *i > 0 => Ok(()),
            Value::Float(f) if *f > 0.0 => Ok(()),
            Value::Int(i) => fail(format!("{i} must be positive")),
            Value::Float(f) => fail(format!("{f} must be positive")),
            _ => fail("positivity check requires a numeric value".to_string()),
        },
        Check::NonNegative => match value {
            Value::Int(i) if *i >= 0 => Ok(()),
            Value::Float(f) if *f >= 0.0 => Ok(()),
            Value::Int(i) => fail(format!("{i} must not be negative")),
            Value::Float(f) => fail(format!("{f} must not be negative")),
            _ => fail("non-negativity check requires a numeric value".to_string()),
        },
        Check::UnitInterval => match value {
            Value::Float(f) if (0.0..=1.0).contains(f) => Ok(()),
            Value::Float(f) => fail(format!("{f} must lie in [0, 1]")),
            _ => fail("unit-interval check requires a float value".to_string()),
        },
        Check::PositiveList => match value {
            Value::IntList(l) if l.is_empty() => fail("list must not be empty".to_string()),
            Value::IntList(l) => match l.iter().find(|v| **v <= 0) {
                Some(bad) => fail(format!("{bad} must be positive")),
                None => Ok(()),
            },
            Value::FloatTriple(t) => match t.iter().find(|v| **v <= 0.0) {
                Some(bad) => fail(format!("{bad} must be positive")),
                None => Ok(()),
            },
            _ => fail("list check requires a list value".to_string()),
        },
        Check::OneOf(allowed) => match value {
            Value::Str(s) if allowed.contains(&s.as_str()) => Ok(()),
            Value::Str(s) => fail(format!("'{s}' is not one of {allowed:?}")),
            _ => fail("choice check requires a string value".to_string()),
        },
    }
}

/// Typed builder for the global scope. Applying it writes every global key
/// as one atomic group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    pub simulation_name: String,
    pub output_dir: PathBuf,
    pub spacing_mm: f64,
    pub volume_extent_mm: [f64; 3],
    pub wavelengths_nm: Vec<u32>,
    pub random_seed: u64,
    #[serde(default)]
    pub use_gpu: bool,
}

impl GlobalSettings {
    pub fn apply(&self, settings: &mut Settings) -> Result<(), SettingsError> {
        settings.apply_group(vec![
            (
                &keys::SIMULATION_NAME,
                Value::Str(self.simulation_name.clone()),
            ),
            (
                &keys::OUTPUT_DIR,
                Value::Str(self.output_dir.to_string_lossy().into_owned()),
            ),
            (&keys::SPACING_MM, Value::Float(self.spacing_mm)),
            (
                &keys::VOLUME_EXTENT_MM,
                Value::FloatTriple(self.volume_extent_mm),
            ),
            (
                &keys::WAVELENGTHS_NM,
                Value::IntList(self.wavelengths_nm.iter().map(|&nm| nm as i64).collect()),
            ),
            (&keys::RANDOM_SEED, Value::Int(self.random_seed as i64)),
            (&keys::USE_GPU, Value::Bool(self.use_gpu)),
        ])
    }
}
