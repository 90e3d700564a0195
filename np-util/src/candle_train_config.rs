use std::path::PathBuf;

pub struct TrainConfig {
    pub learning_rate: f32,
    pub batch_size: usize,
    pub num_epochs: usize,
    /// running-loss log cadence, in batches
    pub log_interval: usize,
    /// checkpoint cadence, in epochs; epoch 0 never checkpoints
    pub checkpoint_interval: usize,
    pub checkpoint_dir: Option<PathBuf>,
    /// when set, the first batch of every epoch is rendered here
    pub render_dir: Option<PathBuf>,
    pub device: candle_core::Device,
    pub verbose: bool,
    pub show_progress: bool,
}
