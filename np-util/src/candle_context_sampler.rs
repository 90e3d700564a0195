use candle_core::{Result, Tensor};
use rand::Rng;

/// Draw a random observation mask and assemble context triples.
///
/// For each image one keep probability `p ~ U(0,1)` is drawn, then each
/// pixel is kept iff an independent `u ~ U(0,1)` satisfies `u >= p`.
/// Observation fractions therefore range from near 0% to near 100%
/// within one batch.
///
/// # Arguments
/// * `x_np` - image batch (n x p), intensities in `[0, 1]`
/// * `grid_p2` - query coordinates (p x 2) shared across the batch
/// * `rng` - random source for the keep probabilities and pixel draws
///
/// # Returns `(context_np3, mask_np)`
/// * `context_np3` - (n x p x 3) with channels `[value, x, y]`
/// * `mask_np` - (n x p) observation mask in `{0, 1}`, `f32` so it can
///   weight reductions downstream
pub fn sample_context<R: Rng + ?Sized>(
    x_np: &Tensor,
    grid_p2: &Tensor,
    rng: &mut R,
) -> Result<(Tensor, Tensor)> {
    let (n, p) = x_np.dims2()?;
    let device = x_np.device();

    let mut mask = Vec::with_capacity(n * p);
    for _ in 0..n {
        let keep = rng.random::<f32>();
        for _ in 0..p {
            let u = rng.random::<f32>();
            mask.push(if u >= keep { 1_f32 } else { 0_f32 });
        }
    }
    let mask_np = Tensor::from_vec(mask, (n, p), device)?;

    let grid_np2 = grid_p2.unsqueeze(0)?.expand((n, p, 2))?.contiguous()?;
    let context_np3 = Tensor::cat(&[&x_np.unsqueeze(2)?, &grid_np2], 2)?;

    Ok((context_np3, mask_np))
}
