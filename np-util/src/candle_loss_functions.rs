#![allow(dead_code)]

use crate::candle_latent_gaussian::GaussianParams;

use candle_core::{Result, Tensor};

/// Binary cross-entropy over held-out pixels only.
///
/// nll(i) = sum_j (1 - mask(i,j)) * bce(x(i,j), recon(i,j))
///
/// summed per image and averaged over the batch. Pixels inside the
/// masked context carry zero weight, so the decoder is never rewarded
/// for copying its conditioning. Probabilities are clamped to
/// `[eps, 1 - eps]` before the logs.
///
/// * `x_np` - ground-truth intensities (n x p) in `{0, 1}`
/// * `recon_np` - decoded Bernoulli probabilities (n x p)
/// * `mask_np` - observation mask (n x p) in `{0, 1}`
pub fn masked_bernoulli_nll(x_np: &Tensor, recon_np: &Tensor, mask_np: &Tensor) -> Result<Tensor> {
    let eps = 1e-7;
    let r_np = recon_np.clamp(eps, 1.0 - eps)?;

    let log_r = r_np.log()?;
    let log_1mr = r_np.affine(-1.0, 1.0)?.log()?;

    let bce_np = (x_np.mul(&log_r)? + x_np.affine(-1.0, 1.0)?.mul(&log_1mr)?)?.neg()?;
    let held_out_np = mask_np.affine(-1.0, 1.0)?;

    bce_np.mul(&held_out_np)?.sum(1)?.mean_all()
}

/// Closed-form KL divergence between two diagonal Gaussians,
///
/// KL(full || masked) =
///   0.5 * sum_k [ lnvar_m - lnvar_f
///                 + var_f / var_m
///                 + (mean_f - mean_m)^2 / var_m - 1 ]
///
/// returned per image. The direction matters: the full-context
/// posterior is pulled toward the masked one, not the other way
/// around, and not toward a fixed prior.
pub fn gaussian_pair_kl(full: &GaussianParams, masked: &GaussianParams) -> Result<Tensor> {
    let var_f = full.lnvar.exp()?;
    let var_m = masked.lnvar.exp()?;

    let lnvar_gap = masked.lnvar.sub(&full.lnvar)?;
    let var_ratio = var_f.div(&var_m)?;
    let mean_gap = full.mean.sub(&masked.mean)?.powf(2.)?.div(&var_m)?;

    let element_wise = (((lnvar_gap + var_ratio)? + mean_gap)? - 1.0)?;
    element_wise.sum(full.mean.rank() - 1)? * 0.5
}
