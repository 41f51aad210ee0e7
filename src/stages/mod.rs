//! Concrete pipeline stages.
//!
//! Each stage owns one settings scope, resolves its algorithmic adapter
//! during validation and moves data exclusively through the container.
//! [`standard_pipeline`] assembles the fixed stage order, skipping stages
//! whose settings scope was never configured.

pub mod acoustic;
pub mod noise;
pub mod optical;
pub mod reconstruction;
pub mod volume_creation;

#[cfg(test)]
pub(crate) mod harness;

// Re-exports for easier access
pub use acoustic::AcousticStage;
pub use noise::NoiseStage;
pub use optical::OpticalStage;
pub use reconstruction::ReconstructionStage;
pub use volume_creation::VolumeCreationStage;

use crate::pipeline::{SimulationStage, StageState};
use crate::settings::{Scope, Settings};
use crate::volume::TissueModel;
use log::info;

/// The fixed stage order: volume creation, optical, acoustic, noise,
/// reconstruction. A stage joins the pipeline only when its settings
/// scope holds at least one explicit key, so a run without a noise scope
/// simply never instantiates the noise stage.
pub fn standard_pipeline(
    settings: &Settings,
    model: TissueModel,
) -> Vec<Box<dyn SimulationStage>> {
    let mut stages: Vec<Box<dyn SimulationStage>> = Vec::new();

    if settings.has_scope(Scope::VolumeCreation) {
        stages.push(Box::new(VolumeCreationStage::new(model)));
    } else {
        info!("stage 'volume_creation' {}", StageState::Skipped);
    }
    if settings.has_scope(Scope::Optical) {
        stages.push(Box::new(OpticalStage::new()));
    } else {
        info!("stage 'optical' {}", StageState::Skipped);
    }
    if settings.has_scope(Scope::Acoustic) {
        stages.push(Box::new(AcousticStage::new()));
    } else {
        info!("stage 'acoustic' {}", StageState::Skipped);
    }
    if settings.has_scope(Scope::Noise) {
        stages.push(Box::new(NoiseStage::new()));
    } else {
        info!("stage 'noise' {}", StageState::Skipped);
    }
    if settings.has_scope(Scope::Reconstruction) {
        stages.push(Box::new(ReconstructionStage::new()));
    } else {
        info!("stage 'reconstruction' {}", StageState::Skipped);
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{keys, Value};
    use crate::volume::library;

    fn demo_model() -> TissueModel {
        TissueModel::new("demo", library::soft_tissue().unwrap())
    }

    fn names(stages: &[Box<dyn SimulationStage>]) -> Vec<&'static str> {
        stages.iter().map(|s| s.name()).collect()
    }

    #[test]
    fn test_unconfigured_scopes_are_skipped() {
        let mut settings = Settings::new();
        settings
            .set(&keys::VOLUME_ADAPTER, Value::Str("model_based".to_string()))
            .unwrap();
        settings
            .set(&keys::OPTICAL_ADAPTER, Value::Str("diffusion".to_string()))
            .unwrap();

        let stages = standard_pipeline(&settings, demo_model());
        assert_eq!(names(&stages), vec!["volume_creation", "optical"]);
    }

    #[test]
    fn test_full_pipeline_keeps_the_stage_order() {
        let mut settings = Settings::new();
        settings
            .set(&keys::VOLUME_ADAPTER, Value::Str("model_based".to_string()))
            .unwrap();
        settings
            .set(&keys::OPTICAL_ADAPTER, Value::Str("diffusion".to_string()))
            .unwrap();
        settings
            .set(
                &keys::ACOUSTIC_ADAPTER,
                Value::Str("spherical_projection".to_string()),
            )
            .unwrap();
        settings
            .set(&keys::NOISE_MODEL, Value::Str("gaussian".to_string()))
            .unwrap();
        settings
            .set(
                &keys::RECON_ALGORITHM,
                Value::Str("delay_and_sum".to_string()),
            )
            .unwrap();

        let stages = standard_pipeline(&settings, demo_model());
        assert_eq!(
            names(&stages),
            vec![
                "volume_creation",
                "optical",
                "acoustic",
                "noise",
                "reconstruction"
            ]
        );
    }
}
