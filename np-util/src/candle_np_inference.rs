use crate::candle_aggregation::{masked_pool, mean_pool};
use crate::candle_checkpoint::save_checkpoint;
use crate::candle_context_sampler::sample_context;
use crate::candle_data_loader::*;
use crate::candle_latent_gaussian::standard_normal;
use crate::candle_loss_functions::{gaussian_pair_kl, masked_bernoulli_nll};
use crate::candle_model_traits::{
    ContextEncoderModule, LatentDistributionModule, PixelDecoderModule,
};
use crate::candle_train_config::TrainConfig;
use crate::candle_visualization::render_reconstruction;

use candle_core::Tensor;
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::{info, warn};
use rand::Rng;
use std::time::Instant;

/// number of images per rendered reconstruction grid
const RENDER_COLUMNS: usize = 16;

/// One amortized inference step, kept around for logging and rendering.
pub struct NpStep {
    pub recon_np: Tensor,
    pub mask_np: Tensor,
    pub total_loss: Tensor,
    pub recon_loss: Tensor,
    pub kl_loss: Tensor,
}

pub struct NeuralProcess<'a, Enc, Lat, Dec>
where
    Enc: ContextEncoderModule,
    Lat: LatentDistributionModule,
    Dec: PixelDecoderModule,
{
    pub encoder: &'a Enc,
    pub latent: &'a Lat,
    pub decoder: &'a Dec,
    pub variable_map: &'a candle_nn::VarMap,
}

pub trait NeuralProcessT<'a, Enc, Lat, Dec>
where
    Enc: ContextEncoderModule,
    Lat: LatentDistributionModule,
    Dec: PixelDecoderModule,
{
    /// Run the encode-aggregate-sample-decode pipeline on one batch.
    ///
    /// Both posteriors come from the one shared latent head; only the
    /// full-context posterior is sampled, the masked one serves as the
    /// KL target.
    ///
    /// * `x_np` - image batch (n x p)
    /// * `grid_p2` - query coordinates (p x 2)
    /// * `rng` - random source for mask sampling and latent noise
    fn forward_step<R: Rng>(
        &self,
        x_np: &Tensor,
        grid_p2: &Tensor,
        rng: &mut R,
    ) -> anyhow::Result<NpStep>;

    /// Train all three sub-networks end to end
    ///
    /// * `data` - minibatch loader over flattened images
    /// * `grid_p2` - query coordinates (p x 2)
    /// * `config` - training configuration
    /// * `rng` - random source for shuffling, masks, latent noise
    ///
    /// Returns the mean total loss per epoch.
    fn train_amortized<DataL, R>(
        &mut self,
        data: &mut DataL,
        grid_p2: &Tensor,
        config: &TrainConfig,
        rng: &mut R,
    ) -> anyhow::Result<Vec<f32>>
    where
        DataL: DataLoader,
        R: Rng;

    /// Build a neural process over the three sub-networks
    fn build(
        encoder: &'a Enc,
        latent: &'a Lat,
        decoder: &'a Dec,
        variable_map: &'a candle_nn::VarMap,
    ) -> Self;
}

impl<'a, Enc, Lat, Dec> NeuralProcessT<'a, Enc, Lat, Dec> for NeuralProcess<'a, Enc, Lat, Dec>
where
    Enc: ContextEncoderModule,
    Lat: LatentDistributionModule,
    Dec: PixelDecoderModule,
{
    fn forward_step<R: Rng>(
        &self,
        x_np: &Tensor,
        grid_p2: &Tensor,
        rng: &mut R,
    ) -> anyhow::Result<NpStep> {
        let (context_np3, mask_np) = sample_context(x_np, grid_p2, rng)?;

        let h_npk = self.encoder.forward(&context_np3)?;

        let r_full_nk = mean_pool(&h_npk)?;
        let r_masked_nk = masked_pool(&h_npk, &mask_np)?;

        let full = self.latent.forward(&r_full_nk)?;
        let masked = self.latent.forward(&r_masked_nk)?;

        let eps_nk = standard_normal(full.mean.dims2()?, rng, x_np.device())?;
        let z_nk = full.reparameterize(&eps_nk)?;

        let recon_np = self.decoder.forward(&z_nk, grid_p2)?;

        let recon_loss = masked_bernoulli_nll(x_np, &recon_np, &mask_np)?;
        let kl_loss = gaussian_pair_kl(&full, &masked)?.mean_all()?;
        let total_loss = (&recon_loss + &kl_loss)?;

        Ok(NpStep {
            recon_np,
            mask_np,
            total_loss,
            recon_loss,
            kl_loss,
        })
    }

    fn train_amortized<DataL, R>(
        &mut self,
        data: &mut DataL,
        grid_p2: &Tensor,
        config: &TrainConfig,
        rng: &mut R,
    ) -> anyhow::Result<Vec<f32>>
    where
        DataL: DataLoader,
        R: Rng,
    {
        let device = &config.device;

        let mut adam = AdamW::new(
            self.variable_map.all_vars(),
            ParamsAdamW {
                lr: config.learning_rate.into(),
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        let pb = ProgressBar::new(config.num_epochs as u64);
        if !config.show_progress || config.verbose {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        let mut epoch_trace = Vec::with_capacity(config.num_epochs);

        for epoch in 0..config.num_epochs {
            data.shuffle_minibatch(config.batch_size, rng)?;

            let mut epoch_loss = 0_f32;
            let mut running_loss = 0_f32;
            let mut last_log_time = Instant::now();

            for batch_idx in 0..data.num_minibatch() {
                let minibatch = data.minibatch_data(batch_idx, device)?;
                let x_np = &minibatch.images;

                let step = self.forward_step(x_np, grid_p2, rng)?;

                let loss_val = step.total_loss.to_scalar::<f32>()?;
                if !loss_val.is_finite() {
                    return Err(anyhow::anyhow!(
                        "non-finite loss {} at epoch {} batch {}",
                        loss_val,
                        epoch,
                        batch_idx
                    ));
                }

                adam.backward_step(&step.total_loss)?;

                running_loss += loss_val;
                epoch_loss += loss_val;

                if batch_idx % config.log_interval == 0 && batch_idx > 0 {
                    let elapsed = last_log_time.elapsed().as_secs_f32();
                    info!(
                        "epoch {} | batch {} | mean running loss {:.4} | {:.2} batch/s",
                        epoch,
                        batch_idx,
                        running_loss / config.log_interval as f32,
                        config.log_interval as f32 / elapsed.max(f32::EPSILON)
                    );
                    info!(
                        "reconstruction {:.4} | kl {:.4}",
                        step.recon_loss.to_scalar::<f32>()?,
                        step.kl_loss.to_scalar::<f32>()?
                    );
                    last_log_time = Instant::now();
                    running_loss = 0_f32;
                }

                if batch_idx == 0 {
                    if let Some(dir) = config.render_dir.as_ref() {
                        render_first_batch(x_np, &step.recon_np, epoch, dir)?;
                    }
                }
            }

            let num_minibatch = data.num_minibatch().max(1);
            let mean_epoch_loss = epoch_loss / num_minibatch as f32;
            epoch_trace.push(mean_epoch_loss);

            if config.verbose {
                info!("[{}] mean epoch loss: {:.4}", epoch + 1, mean_epoch_loss);
            }
            pb.inc(1);

            if let Some(dir) = config.checkpoint_dir.as_ref() {
                if config.checkpoint_interval > 0
                    && epoch > 0
                    && epoch % config.checkpoint_interval == 0
                {
                    let file = dir.join(format!("np_model.epoch_{}.safetensors", epoch));
                    save_checkpoint(self.variable_map, &file)?;
                }
            }
        } // each epoch

        if let Some(dir) = config.checkpoint_dir.as_ref() {
            save_checkpoint(self.variable_map, &dir.join("np_model.final.safetensors"))?;
        }

        pb.finish_and_clear();
        Ok(epoch_trace)
    }

    fn build(
        encoder: &'a Enc,
        latent: &'a Lat,
        decoder: &'a Dec,
        variable_map: &'a candle_nn::VarMap,
    ) -> Self {
        assert_eq!(encoder.dim_latent(), latent.dim_latent());
        assert_eq!(latent.dim_latent(), decoder.dim_latent());

        Self {
            encoder,
            latent,
            decoder,
            variable_map,
        }
    }
}

fn render_first_batch(
    x_np: &Tensor,
    recon_np: &Tensor,
    epoch: usize,
    dir: &std::path::Path,
) -> anyhow::Result<()> {
    let (_, p) = x_np.dims2()?;
    let side = (p as f64).sqrt() as usize;
    if side * side != p {
        warn!("{} pixels is not a square image; skipping render", p);
        return Ok(());
    }

    std::fs::create_dir_all(dir)?;
    let file = dir.join(format!("recon.epoch_{}.png", epoch));
    render_reconstruction(x_np, recon_np, side, side, RENDER_COLUMNS, &file)
}
