#![allow(dead_code)]

use candle_core::{Result, Tensor};
use candle_nn::{Linear, Module, VarBuilder};

/// A stack of fully-connected layers with ReLU between the hidden
/// layers and a bare linear output. Layer `j` registers its variables
/// under `{prefix}.{j}.weight` and `{prefix}.{j}.bias`.
pub struct ReluMlp {
    layers: Vec<Linear>,
}

impl ReluMlp {
    /// * `dims` - layer widths, input first, output last (at least two)
    /// * `vs` - variable builder
    pub fn new(dims: &[usize], vs: VarBuilder) -> Result<Self> {
        debug_assert!(dims.len() >= 2);

        let mut layers = Vec::with_capacity(dims.len() - 1);
        for (j, pair) in dims.windows(2).enumerate() {
            layers.push(candle_nn::linear(pair[0], pair[1], vs.pp(j.to_string()))?);
        }

        Ok(Self { layers })
    }

    pub fn dim_input(&self) -> usize {
        self.layers
            .first()
            .map(|l| l.weight().dims()[1])
            .unwrap_or(0)
    }

    pub fn dim_output(&self) -> usize {
        self.layers
            .last()
            .map(|l| l.weight().dims()[0])
            .unwrap_or(0)
    }
}

impl Module for ReluMlp {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let last = self.layers.len() - 1;
        let mut x = input.clone();
        for (j, layer) in self.layers.iter().enumerate() {
            x = layer.forward(&x)?;
            if j < last {
                x = x.relu()?;
            }
        }
        Ok(x)
    }
}
