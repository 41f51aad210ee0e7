//! Volume creation stage: rasterize a tissue model into property grids.

use crate::pipeline::{PipelineError, SimulationStage, StageContext};
use crate::settings::{keys, Scope};
use crate::store::{Category, GLOBAL_WAVELENGTH};
use crate::volume::{CompiledTissue, TissueModel};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VolumeAdapter {
    ModelBased,
}

impl VolumeAdapter {
    const KNOWN: &'static [&'static str] = &["model_based"];

    fn from_name(name: &str) -> Result<VolumeAdapter, PipelineError> {
        match name {
            "model_based" => Ok(VolumeAdapter::ModelBased),
            _ => Err(PipelineError::UnknownAdapter {
                kind: "volume",
                name: name.to_string(),
                known: VolumeAdapter::KNOWN,
            }),
        }
    }
}

/// Turns a [`TissueModel`] into the stored property grids.
///
/// The model is compiled once and reused across wavelengths: only the
/// optical grids depend on the wavelength, so the acoustic grids and the
/// segmentation mask are written a single time under the
/// wavelength-independent slot.
pub struct VolumeCreationStage {
    model: TissueModel,
    adapter: Option<VolumeAdapter>,
    tissue: Option<CompiledTissue>,
    acoustic_written: bool,
}

impl VolumeCreationStage {
    pub fn new(model: TissueModel) -> VolumeCreationStage {
        VolumeCreationStage {
            model,
            adapter: None,
            tissue: None,
            acoustic_written: false,
        }
    }
}

impl SimulationStage for VolumeCreationStage {
    fn name(&self) -> &'static str {
        "volume_creation"
    }

    fn scope(&self) -> Scope {
        Scope::VolumeCreation
    }

    fn validate(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        let adapter = VolumeAdapter::from_name(&ctx.settings.get_str(&keys::VOLUME_ADAPTER)?)?;
        self.adapter = Some(adapter);
        self.model.validate_structures()?;
        Ok(())
    }

    fn run(&mut self, ctx: &mut StageContext<'_>) -> Result<(), PipelineError> {
        match self.adapter.unwrap_or(VolumeAdapter::ModelBased) {
            VolumeAdapter::ModelBased => {}
        }

        let tissue = match self.tissue.take() {
            Some(tissue) => tissue,
            None => {
                debug!("compiling tissue model '{}'", self.model.name());
                self.model.compile(ctx.grid, ctx.seed)?
            }
        };

        let optical = tissue.optical_volumes(ctx.wavelength_nm);
        ctx.store.write_volume(
            Category::AbsorptionCoefficient,
            ctx.wavelength_nm,
            &optical.absorption,
        )?;
        ctx.store.write_volume(
            Category::ScatteringCoefficient,
            ctx.wavelength_nm,
            &optical.scattering,
        )?;
        ctx.store
            .write_volume(Category::Anisotropy, ctx.wavelength_nm, &optical.anisotropy)?;

        if !self.acoustic_written {
            let acoustic = tissue.acoustic_volumes();
            ctx.store
                .write_volume(Category::SoundSpeed, GLOBAL_WAVELENGTH, &acoustic.sound_speed)?;
            ctx.store
                .write_volume(Category::Density, GLOBAL_WAVELENGTH, &acoustic.density)?;
            ctx.store.write_volume(
                Category::AcousticAttenuation,
                GLOBAL_WAVELENGTH,
                &acoustic.attenuation,
            )?;
            ctx.store.write_volume(
                Category::GruneisenParameter,
                GLOBAL_WAVELENGTH,
                &acoustic.gruneisen,
            )?;
            ctx.store.write_volume(
                Category::SegmentationMask,
                GLOBAL_WAVELENGTH,
                &tissue.segmentation(),
            )?;
            self.acoustic_written = true;
        }

        self.tissue = Some(tissue);
        Ok(())
    }
}
