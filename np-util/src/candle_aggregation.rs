use candle_core::{Result, Tensor};

/// Plain average of per-point features over the point dimension.
///
/// The full-context branch always pools ALL points of an image,
/// regardless of the sampled observation mask.
///
/// * `h_npk` - per-point features (n x p x k)
pub fn mean_pool(h_npk: &Tensor) -> Result<Tensor> {
    h_npk.mean(1)
}

/// Mask-weighted average with a `+1` pseudocount in the denominator:
///
/// r(i) = sum_j mask(i,j) * h(i,j,.) / (1 + sum_j mask(i,j))
///
/// The pseudocount keeps an all-zero mask well defined and makes the
/// masked pool differ from `mean_pool` by a factor `m / (m + 1)` even
/// when every point is observed. That offset is intentional and must
/// not be normalized away.
///
/// * `h_npk` - per-point features (n x p x k)
/// * `mask_np` - observation mask (n x p) in `{0, 1}`
pub fn masked_pool(h_npk: &Tensor, mask_np: &Tensor) -> Result<Tensor> {
    let weighted_nk = h_npk.broadcast_mul(&mask_np.unsqueeze(2)?)?.sum(1)?;
    let denom_n1 = (mask_np.sum_keepdim(1)? + 1.0)?;
    weighted_nk.broadcast_div(&denom_n1)
}
