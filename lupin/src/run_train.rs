use crate::common::*;

use np_util::candle_checkpoint::load_checkpoint;
use np_util::candle_context_encoder::ContextEncoder;
use np_util::candle_coordinate_grid::coordinate_grid;
use np_util::candle_data_loader::InMemoryImages;
use np_util::candle_decoder_pixel::PixelDecoder;
use np_util::candle_latent_gaussian::LatentDistribution;
use np_util::candle_mnist::load_mnist_train;
use np_util::candle_np_inference::{NeuralProcess, NeuralProcessT};
use np_util::candle_train_config::TrainConfig;

use candle_core::Device;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    #[arg(
        long,
        short = 'd',
        required = true,
        help = "MNIST data directory",
        long_help = "Directory holding the MNIST training split in IDX\n\
		     format (`train-images-idx3-ubyte` and\n\
		     `train-labels-idx1-ubyte`, with or without `.gz`).\n\
		     Downloading is not handled here."
    )]
    data: Box<str>,

    #[arg(
        long,
        short,
        required = true,
        help = "Output directory",
        long_help = "Output directory for generated files:\n\
		     - {out}/np_model.epoch_{e}.safetensors\n\
		     - {out}/np_model.final.safetensors\n\
		     - {out}/loss_trace.tsv\n\
		     - {out}/recon.epoch_{e}.png (with --render)"
    )]
    out: Box<str>,

    /// learning rate for the Adam update
    #[arg(long, short = 'l', default_value_t = 1e-3)]
    learning_rate: f32,

    /// number of training epochs
    #[arg(long, short, default_value_t = 10)]
    epochs: usize,

    /// minibatch size
    #[arg(long, short, default_value_t = 32)]
    batch_size: usize,

    #[arg(
        long,
        short = 'r',
        help = "Checkpoint to resume from",
        long_help = "Safetensors checkpoint to restore all three\n\
		     sub-networks from before training starts.\n\
		     Optimizer state is not part of a checkpoint,\n\
		     so Adam moments restart from zero."
    )]
    resume_file: Option<Box<str>>,

    /// checkpoint cadence in epochs (epoch 0 never checkpoints)
    #[arg(long, default_value_t = 5)]
    save_interval: usize,

    /// running-loss log cadence in batches
    #[arg(long, default_value_t = 100)]
    log_interval: usize,

    #[arg(
        long,
        value_enum,
        default_value = "cpu",
        help = "Candle device",
        long_help = "Candle device to use for computation.\n\
		     Options: cpu, cuda, metal."
    )]
    device: ComputeDevice,

    /// device ordinal for cuda/metal
    #[arg(long, default_value_t = 0)]
    device_no: usize,

    /// render ground truth vs. reconstruction once per epoch
    #[arg(long, default_value_t = false)]
    render: bool,

    /// seed for mask sampling, latent noise, and shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

/// Train the conditional neural process end to end
pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let out_dir = PathBuf::from(&*args.out);
    std::fs::create_dir_all(&out_dir)?;

    let dev = match args.device {
        ComputeDevice::Cuda => Device::new_cuda(args.device_no)?,
        ComputeDevice::Metal => Device::new_metal(args.device_no)?,
        ComputeDevice::Cpu => Device::Cpu,
    };

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let data = load_mnist_train(Path::new(&*args.data), BINARIZE_THRESHOLD)?;
    info!(
        "loaded {} binarized images ({} x {})",
        data.num_images(),
        data.height,
        data.width
    );

    let mut loader = InMemoryImages::new_with_labels(&data.images, &data.labels)?;

    let mut parameters = candle_nn::VarMap::new();
    let param_builder =
        candle_nn::VarBuilder::from_varmap(&parameters, candle_core::DType::F32, &dev);

    let encoder = ContextEncoder::new(
        DIM_CONTEXT,
        DIM_HIDDEN_ENCODER,
        DIM_LATENT,
        param_builder.pp("encoder"),
    )?;
    let latent = LatentDistribution::new(DIM_LATENT, param_builder.pp("latent"))?;
    let decoder = PixelDecoder::new(
        DIM_LATENT,
        DIM_COORD,
        &DECODER_LAYERS,
        param_builder.pp("decoder"),
    )?;

    if let Some(file) = args.resume_file.as_ref() {
        load_checkpoint(&mut parameters, Path::new(&**file))?;
    }

    let grid_p2 = coordinate_grid(data.height, data.width, &dev)?;

    let config = TrainConfig {
        learning_rate: args.learning_rate,
        batch_size: args.batch_size,
        num_epochs: args.epochs,
        log_interval: args.log_interval,
        checkpoint_interval: args.save_interval,
        checkpoint_dir: Some(out_dir.clone()),
        render_dir: args.render.then(|| out_dir.clone()),
        device: dev,
        verbose: args.verbose,
        show_progress: true,
    };

    info!(
        "context ({}) -> encoder -> latent ({}) -> decoder -> pixels ({})",
        DIM_CONTEXT,
        DIM_LATENT,
        data.num_pixels()
    );

    let mut model = NeuralProcess::build(&encoder, &latent, &decoder, &parameters);
    let trace = model.train_amortized(&mut loader, &grid_p2, &config, &mut rng)?;

    write_loss_trace(&trace, &out_dir.join("loss_trace.tsv"))?;

    info!("Done");
    Ok(())
}

fn write_loss_trace(trace: &[f32], path: &Path) -> anyhow::Result<()> {
    let mut lines = vec!["epoch\tmean_total_loss".to_string()];
    lines.extend(
        trace
            .iter()
            .enumerate()
            .map(|(epoch, loss)| format!("{}\t{}", epoch + 1, loss)),
    );
    std::fs::write(path, lines.join("\n") + "\n")?;
    Ok(())
}
