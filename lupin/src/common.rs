#![allow(dead_code)]

pub use clap::{Args, Parser, Subcommand, ValueEnum};
pub use log::info;

pub use np_util::{candle_core, candle_nn};

/// side length of the square input bitmaps
pub const IMAGE_SIDE: usize = 28;

/// width of one context triple: (value, x, y)
pub const DIM_CONTEXT: usize = 3;

/// width of one query coordinate: (x, y)
pub const DIM_COORD: usize = 2;

/// hidden width of the context encoder
pub const DIM_HIDDEN_ENCODER: usize = 128;

/// latent width shared by encoder output, aggregate, and latent head
pub const DIM_LATENT: usize = 64;

/// hidden widths of the pixel decoder
pub const DECODER_LAYERS: [usize; 2] = [32, 16];

/// intensities strictly above this become 1, everything else 0
pub const BINARIZE_THRESHOLD: f32 = 0.5;

#[derive(ValueEnum, Clone, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cpu,
    Cuda,
    Metal,
}
