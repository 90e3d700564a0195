use anyhow::{anyhow, Context};
use log::info;
use std::path::Path;

/// Persist every variable of `parameters` as one safetensors file.
///
/// Variable names keep their per-component prefixes (`encoder.*`,
/// `latent.*`, `decoder.*`), so the file holds the three parameter
/// sets keyed by component and loads back as a unit. The write goes
/// to a sibling temp file first and is renamed into place, so a failed
/// save never leaves a partial checkpoint behind. Tensors are
/// materialized host-side by the safetensors writer regardless of
/// which device training ran on. Optimizer moment state is not part
/// of the checkpoint.
pub fn save_checkpoint(parameters: &candle_nn::VarMap, path: &Path) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow!("checkpoint path {} has no parent", path.display()))?;
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let staging = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("staging checkpoint under {}", dir.display()))?;
    parameters
        .save(staging.path())
        .with_context(|| format!("serializing checkpoint {}", path.display()))?;
    staging
        .persist(path)
        .with_context(|| format!("publishing checkpoint {}", path.display()))?;

    info!("saved checkpoint to {}", path.display());
    Ok(())
}

/// Restore every variable of `parameters` from a checkpoint file.
///
/// The modules must already be constructed over this `VarMap`; loading
/// fills their variables in place (on whatever device they live on)
/// and fails up front on a missing or malformed file, before any
/// training step runs.
pub fn load_checkpoint(parameters: &mut candle_nn::VarMap, path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        return Err(anyhow!("checkpoint {} does not exist", path.display()));
    }

    parameters
        .load(path)
        .with_context(|| format!("restoring checkpoint {}", path.display()))?;

    info!("restored checkpoint from {}", path.display());
    Ok(())
}
