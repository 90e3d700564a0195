use crate::candle_aux_layers::ReluMlp;
use crate::candle_model_traits::ContextEncoderModule;

use candle_core::{Result, Tensor};
use candle_nn::{Module, VarBuilder};

/// Pointwise context encoder: the same fully-connected network applied
/// to every `(value, x, y)` triple of every image. Cross-pixel
/// interaction is the aggregation step's job, not this module's.
pub struct ContextEncoder {
    dim_input: usize,
    dim_latent: usize,
    fc: ReluMlp,
}

impl ContextEncoder {
    /// Will create a context encoder with variables
    /// `nn.fc.{j}.{weight,bias}` for each layer index `j`.
    ///
    /// # Arguments
    /// * `dim_input` - width of one context triple (3)
    /// * `dim_hidden` - hidden layer width, used twice
    /// * `dim_latent` - per-point feature width
    /// * `vs` - variable builder
    pub fn new(
        dim_input: usize,
        dim_hidden: usize,
        dim_latent: usize,
        vs: VarBuilder,
    ) -> Result<Self> {
        let fc = ReluMlp::new(
            &[dim_input, dim_hidden, dim_hidden, dim_latent],
            vs.pp("nn.fc"),
        )?;

        Ok(Self {
            dim_input,
            dim_latent,
            fc,
        })
    }
}

impl ContextEncoderModule for ContextEncoder {
    fn forward(&self, context_np3: &Tensor) -> Result<Tensor> {
        debug_assert_eq!(context_np3.dims().len(), 3);
        self.fc.forward(&context_np3.contiguous()?)
    }

    fn dim_input(&self) -> usize {
        self.dim_input
    }

    fn dim_latent(&self) -> usize {
        self.dim_latent
    }
}
