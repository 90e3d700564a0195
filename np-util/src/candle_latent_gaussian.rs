#![allow(dead_code)]

use crate::candle_model_traits::LatentDistributionModule;

use candle_core::{Device, Result, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Diagonal Gaussian posterior parameters, one row per image.
pub struct GaussianParams {
    pub mean: Tensor,
    pub lnvar: Tensor,
}

impl GaussianParams {
    /// z = mean + sqrt(exp(lnvar)) * eps
    ///
    /// # Arguments
    /// * `eps_nk` - standard-normal noise with the shape of `mean`
    pub fn reparameterize(&self, eps_nk: &Tensor) -> Result<Tensor> {
        &self.mean + self.lnvar.exp()?.sqrt()?.mul(eps_nk)?
    }
}

/// Draw standard-normal noise on the host and upload it to `device`.
pub fn standard_normal<R: Rng + ?Sized>(
    shape: (usize, usize),
    rng: &mut R,
    device: &Device,
) -> Result<Tensor> {
    let (n, k) = shape;
    let mut eps = Vec::with_capacity(n * k);
    for _ in 0..n * k {
        let e: f32 = StandardNormal.sample(rng);
        eps.push(e);
    }
    Tensor::from_vec(eps, (n, k), device)
}

/// Shared-weight latent distribution head: two linear maps from the
/// aggregated representation to the posterior mean and log-variance.
///
/// The log-variance output is left unclamped; a collapsing or
/// exploding variance shows up as a non-finite loss downstream.
pub struct LatentDistribution {
    dim_latent: usize,
    z_mean: Linear,
    z_lnvar: Linear,
}

impl LatentDistribution {
    /// Will create a latent head with these variables:
    ///
    /// * `nn.z.mean.{weight,bias}`
    /// * `nn.z.lnvar.{weight,bias}`
    pub fn new(dim_latent: usize, vs: VarBuilder) -> Result<Self> {
        let z_mean = candle_nn::linear(dim_latent, dim_latent, vs.pp("nn.z.mean"))?;
        let z_lnvar = candle_nn::linear(dim_latent, dim_latent, vs.pp("nn.z.lnvar"))?;

        Ok(Self {
            dim_latent,
            z_mean,
            z_lnvar,
        })
    }
}

impl LatentDistributionModule for LatentDistribution {
    fn forward(&self, r_nk: &Tensor) -> Result<GaussianParams> {
        Ok(GaussianParams {
            mean: self.z_mean.forward(r_nk)?,
            lnvar: self.z_lnvar.forward(r_nk)?,
        })
    }

    fn dim_latent(&self) -> usize {
        self.dim_latent
    }
}
