use crate::candle_aux_layers::ReluMlp;
use crate::candle_model_traits::PixelDecoderModule;

use candle_core::{Result, Tensor};
use candle_nn::{ops, Module, VarBuilder};

/// Pointwise pixel decoder. Each query point sees the concatenation of
/// the image's latent sample (broadcast) and its own 2d coordinate,
/// and is decoded independently of every other point. All grid points
/// are decoded; the loss decides which ones count.
pub struct PixelDecoder {
    dim_latent: usize,
    dim_coord: usize,
    fc: ReluMlp,
}

impl PixelDecoder {
    /// Will create a pixel decoder with variables
    /// `nn.fc.{j}.{weight,bias}` for each layer index `j`.
    ///
    /// # Arguments
    /// * `dim_latent` - latent sample width
    /// * `dim_coord` - query coordinate width (2)
    /// * `layers` - hidden layer widths
    /// * `vs` - variable builder
    pub fn new(
        dim_latent: usize,
        dim_coord: usize,
        layers: &[usize],
        vs: VarBuilder,
    ) -> Result<Self> {
        debug_assert!(!layers.is_empty());

        let mut dims = Vec::with_capacity(layers.len() + 2);
        dims.push(dim_latent + dim_coord);
        dims.extend_from_slice(layers);
        dims.push(1);

        let fc = ReluMlp::new(&dims, vs.pp("nn.fc"))?;

        Ok(Self {
            dim_latent,
            dim_coord,
            fc,
        })
    }
}

impl PixelDecoderModule for PixelDecoder {
    fn forward(&self, z_nk: &Tensor, grid_p2: &Tensor) -> Result<Tensor> {
        let (n, k) = z_nk.dims2()?;
        let (p, c) = grid_p2.dims2()?;
        debug_assert_eq!(k, self.dim_latent);
        debug_assert_eq!(c, self.dim_coord);

        let z_npk = z_nk.unsqueeze(1)?.expand((n, p, k))?.contiguous()?;
        let grid_npc = grid_p2.unsqueeze(0)?.expand((n, p, c))?.contiguous()?;
        let input_np = Tensor::cat(&[&z_npk, &grid_npc], 2)?;

        let logit_np1 = self.fc.forward(&input_np)?;
        ops::sigmoid(&logit_np1)?.squeeze(2)
    }

    fn dim_latent(&self) -> usize {
        self.dim_latent
    }
}
