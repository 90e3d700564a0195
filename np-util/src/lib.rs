pub mod candle_aggregation;
pub mod candle_aux_layers;
pub mod candle_checkpoint;
pub mod candle_context_encoder;
pub mod candle_context_sampler;
pub mod candle_coordinate_grid;
pub mod candle_data_loader;
pub mod candle_decoder_pixel;
pub mod candle_latent_gaussian;
pub mod candle_loss_functions;
pub mod candle_mnist;
pub mod candle_model_traits;
pub mod candle_np_inference;
pub mod candle_train_config;
pub mod candle_visualization;

pub use candle_core;
pub use candle_nn;
