#![allow(dead_code)]

use crate::candle_latent_gaussian::GaussianParams;

use candle_core::{Result, Tensor};

pub trait ContextEncoderModule {
    /// Map every context triple independently to a feature vector
    ///
    /// # Arguments
    /// * `context_np3` - context triples (n x p x 3)
    ///
    /// # Returns
    /// * `h_npk` - per-point features (n x p x k)
    fn forward(&self, context_np3: &Tensor) -> Result<Tensor>;

    fn dim_input(&self) -> usize;

    fn dim_latent(&self) -> usize;
}

pub trait LatentDistributionModule {
    /// Map an aggregated representation to diagonal Gaussian
    /// parameters over the latent variable. One instance serves both
    /// the full and the masked aggregate; never duplicate its weights.
    ///
    /// # Arguments
    /// * `r_nk` - aggregated representation (n x k)
    fn forward(&self, r_nk: &Tensor) -> Result<GaussianParams>;

    fn dim_latent(&self) -> usize;
}

pub trait PixelDecoderModule {
    /// Decode pixel probabilities at every query coordinate
    ///
    /// # Arguments
    /// * `z_nk` - one latent sample per image (n x k), broadcast
    ///   across all query points
    /// * `grid_p2` - query coordinates (p x 2)
    ///
    /// # Returns
    /// * `recon_np` - Bernoulli probabilities (n x p)
    fn forward(&self, z_nk: &Tensor, grid_p2: &Tensor) -> Result<Tensor>;

    fn dim_latent(&self) -> usize;
}
