//! Declared settings keys.
//!
//! Every key the pipeline reads is declared here with its scope, value
//! kind, range check and optional default. Stages access the store only
//! through these constants, and file-loaded settings are resolved against
//! this registry, so a key that is not declared cannot be read or written.

use super::Scope;

/// Value kind a key accepts. Integer inputs are coerced to float kinds
/// on write, so a key declared `Float` accepts `Value::Int` too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Str,
    IntList,
    FloatTriple,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "string",
            ValueKind::IntList => "int list",
            ValueKind::FloatTriple => "float triple",
        }
    }
}

/// Range/domain check applied on write, after kind coercion.
#[derive(Debug, Clone, Copy)]
pub enum Check {
    None,
    /// Numeric value strictly greater than zero.
    Positive,
    /// Numeric value greater than or equal to zero.
    NonNegative,
    /// Float in [0, 1].
    UnitInterval,
    /// Non-empty list (or triple) with every element strictly positive.
    PositiveList,
    /// String drawn from a fixed set.
    OneOf(&'static [&'static str]),
}

/// Default used when a key has not been set. Kept const-constructible,
/// converted to a full `Value` on read.
#[derive(Debug, Clone, Copy)]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'static str),
}

/// A declared settings key.
#[derive(Debug)]
pub struct KeyDef {
    pub name: &'static str,
    pub scope: Scope,
    pub kind: ValueKind,
    pub check: Check,
    pub default: Option<DefaultValue>,
}

const fn key(name: &'static str, scope: Scope, kind: ValueKind, check: Check) -> KeyDef {
    KeyDef {
        name,
        scope,
        kind,
        check,
        default: None,
    }
}

const fn key_with_default(
    name: &'static str,
    scope: Scope,
    kind: ValueKind,
    check: Check,
    default: DefaultValue,
) -> KeyDef {
    KeyDef {
        name,
        scope,
        kind,
        check,
        default: Some(default),
    }
}

// Global scope.

pub static SIMULATION_NAME: KeyDef = key_with_default(
    "simulation_name",
    Scope::Global,
    ValueKind::Str,
    Check::None,
    DefaultValue::Str("simulation"),
);
pub static OUTPUT_DIR: KeyDef = key("output_dir", Scope::Global, ValueKind::Str, Check::None);
pub static SPACING_MM: KeyDef = key(
    "spacing_mm",
    Scope::Global,
    ValueKind::Float,
    Check::Positive,
);
pub static VOLUME_EXTENT_MM: KeyDef = key(
    "volume_extent_mm",
    Scope::Global,
    ValueKind::FloatTriple,
    Check::PositiveList,
);
pub static WAVELENGTHS_NM: KeyDef = key(
    "wavelengths_nm",
    Scope::Global,
    ValueKind::IntList,
    Check::PositiveList,
);
pub static RANDOM_SEED: KeyDef = key(
    "random_seed",
    Scope::Global,
    ValueKind::Int,
    Check::NonNegative,
);
pub static USE_GPU: KeyDef = key_with_default(
    "use_gpu",
    Scope::Global,
    ValueKind::Bool,
    Check::None,
    DefaultValue::Bool(false),
);
/// Written by the orchestrator at the top of each wavelength iteration;
/// the only key mutated after pipeline start.
pub static CURRENT_WAVELENGTH_NM: KeyDef = key(
    "current_wavelength_nm",
    Scope::Global,
    ValueKind::Int,
    Check::Positive,
);

// Volume creation scope.

pub static VOLUME_ADAPTER: KeyDef = key(
    "adapter",
    Scope::VolumeCreation,
    ValueKind::Str,
    Check::None,
);

// Optical scope. Adapter names are resolved against the stage registry at
// validation time, not here, so unknown names surface as adapter errors.

pub static OPTICAL_ADAPTER: KeyDef = key("adapter", Scope::Optical, ValueKind::Str, Check::None);
pub static PHOTON_COUNT: KeyDef = key(
    "photon_count",
    Scope::Optical,
    ValueKind::Int,
    Check::Positive,
);
pub static PULSE_ENERGY_MJ: KeyDef = key(
    "pulse_energy_mj",
    Scope::Optical,
    ValueKind::Float,
    Check::Positive,
);
pub static OPTICAL_TIMEOUT_S: KeyDef = key_with_default(
    "solver_timeout_s",
    Scope::Optical,
    ValueKind::Float,
    Check::Positive,
    DefaultValue::Float(600.0),
);

// Acoustic scope.

pub static ACOUSTIC_ADAPTER: KeyDef = key("adapter", Scope::Acoustic, ValueKind::Str, Check::None);
pub static SAMPLE_COUNT: KeyDef = key(
    "sample_count",
    Scope::Acoustic,
    ValueKind::Int,
    Check::Positive,
);
pub static SAMPLING_RATE_MHZ: KeyDef = key(
    "sampling_rate_mhz",
    Scope::Acoustic,
    ValueKind::Float,
    Check::Positive,
);
pub static ALPHA_POWER: KeyDef = key_with_default(
    "alpha_power",
    Scope::Acoustic,
    ValueKind::Float,
    Check::NonNegative,
    DefaultValue::Float(1.05),
);
pub static PML_SIZE_VOXELS: KeyDef = key_with_default(
    "pml_size_voxels",
    Scope::Acoustic,
    ValueKind::Int,
    Check::NonNegative,
    DefaultValue::Int(16),
);
pub static ACOUSTIC_TIMEOUT_S: KeyDef = key_with_default(
    "solver_timeout_s",
    Scope::Acoustic,
    ValueKind::Float,
    Check::Positive,
    DefaultValue::Float(600.0),
);

// Noise scope.

pub static NOISE_MODEL: KeyDef = key("model", Scope::Noise, ValueKind::Str, Check::None);
pub static NOISE_MEAN: KeyDef = key_with_default(
    "mean",
    Scope::Noise,
    ValueKind::Float,
    Check::None,
    DefaultValue::Float(0.0),
);
pub static NOISE_STD: KeyDef = key("std", Scope::Noise, ValueKind::Float, Check::NonNegative);
pub static NOISE_MODE: KeyDef = key_with_default(
    "mode",
    Scope::Noise,
    ValueKind::Str,
    Check::OneOf(&["additive", "multiplicative"]),
    DefaultValue::Str("additive"),
);
pub static NOISE_SCALE: KeyDef = key_with_default(
    "scale",
    Scope::Noise,
    ValueKind::Float,
    Check::Positive,
    DefaultValue::Float(1.0),
);
pub static NOISE_FRACTION: KeyDef = key_with_default(
    "fraction",
    Scope::Noise,
    ValueKind::Float,
    Check::UnitInterval,
    DefaultValue::Float(0.01),
);

// Reconstruction scope.

pub static RECON_ALGORITHM: KeyDef = key(
    "algorithm",
    Scope::Reconstruction,
    ValueKind::Str,
    Check::None,
);
pub static RECON_INPUT: KeyDef = key_with_default(
    "input_category",
    Scope::Reconstruction,
    ValueKind::Str,
    Check::OneOf(&["time_series", "noisy_time_series"]),
    DefaultValue::Str("time_series"),
);
pub static BANDPASS_ENABLED: KeyDef = key_with_default(
    "bandpass_enabled",
    Scope::Reconstruction,
    ValueKind::Bool,
    Check::None,
    DefaultValue::Bool(false),
);
pub static BANDPASS_LOW_MHZ: KeyDef = key_with_default(
    "bandpass_low_mhz",
    Scope::Reconstruction,
    ValueKind::Float,
    Check::Positive,
    DefaultValue::Float(0.1),
);
pub static BANDPASS_HIGH_MHZ: KeyDef = key_with_default(
    "bandpass_high_mhz",
    Scope::Reconstruction,
    ValueKind::Float,
    Check::Positive,
    DefaultValue::Float(8.0),
);
pub static RECON_SPEED_OF_SOUND: KeyDef = key_with_default(
    "speed_of_sound_m_s",
    Scope::Reconstruction,
    ValueKind::Float,
    Check::Positive,
    DefaultValue::Float(1540.0),
);

/// Every declared key, used to resolve names from settings files.
pub static ALL: &[&KeyDef] = &[
    &SIMULATION_NAME,
    &OUTPUT_DIR,
    &SPACING_MM,
    &VOLUME_EXTENT_MM,
    &WAVELENGTHS_NM,
    &RANDOM_SEED,
    &USE_GPU,
    &CURRENT_WAVELENGTH_NM,
    &VOLUME_ADAPTER,
    &OPTICAL_ADAPTER,
    &PHOTON_COUNT,
    &PULSE_ENERGY_MJ,
    &OPTICAL_TIMEOUT_S,
    &ACOUSTIC_ADAPTER,
    &SAMPLE_COUNT,
    &SAMPLING_RATE_MHZ,
    &ALPHA_POWER,
    &PML_SIZE_VOXELS,
    &ACOUSTIC_TIMEOUT_S,
    &NOISE_MODEL,
    &NOISE_MEAN,
    &NOISE_STD,
    &NOISE_MODE,
    &NOISE_SCALE,
    &NOISE_FRACTION,
    &RECON_ALGORITHM,
    &RECON_INPUT,
    &BANDPASS_ENABLED,
    &BANDPASS_LOW_MHZ,
    &BANDPASS_HIGH_MHZ,
    &RECON_SPEED_OF_SOUND,
];

/// Resolve a declared key by scope and name.
pub fn lookup(scope: Scope, name: &str) -> Option<&'static KeyDef> {
    ALL.iter()
        .copied()
        .find(|k| k.scope == scope && k.name == name)
}
