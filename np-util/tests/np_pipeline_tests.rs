use approx::assert_abs_diff_eq;
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

use np_util::candle_aggregation::{masked_pool, mean_pool};
use np_util::candle_checkpoint::{load_checkpoint, save_checkpoint};
use np_util::candle_context_encoder::ContextEncoder;
use np_util::candle_context_sampler::sample_context;
use np_util::candle_coordinate_grid::coordinate_grid;
use np_util::candle_data_loader::InMemoryImages;
use np_util::candle_decoder_pixel::PixelDecoder;
use np_util::candle_latent_gaussian::{standard_normal, GaussianParams, LatentDistribution};
use np_util::candle_loss_functions::{gaussian_pair_kl, masked_bernoulli_nll};
use np_util::candle_model_traits::*;
use np_util::candle_np_inference::{NeuralProcess, NeuralProcessT};
use np_util::candle_train_config::TrainConfig;

fn context_triples(x_np: &Tensor, grid_p2: &Tensor) -> anyhow::Result<Tensor> {
    let (n, p) = x_np.dims2()?;
    let grid_np2 = grid_p2.unsqueeze(0)?.expand((n, p, 2))?.contiguous()?;
    Ok(Tensor::cat(&[&x_np.unsqueeze(2)?, &grid_np2], 2)?)
}

#[test]
fn masked_pool_keeps_pseudocount_offset() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let (n, p, k) = (3_usize, 7_usize, 5_usize);

    let h_npk = Tensor::randn(0_f32, 1_f32, (n, p, k), &dev)?;
    let all_ones_np = Tensor::ones((n, p), DType::F32, &dev)?;

    let full = mean_pool(&h_npk)?.to_vec2::<f32>()?;
    let masked = masked_pool(&h_npk, &all_ones_np)?.to_vec2::<f32>()?;

    // with every point observed the masked pool is the plain mean
    // shrunk by p / (p + 1), not the mean itself
    let shrink = p as f32 / (p as f32 + 1.);
    for i in 0..n {
        for j in 0..k {
            assert_abs_diff_eq!(masked[i][j], full[i][j] * shrink, epsilon = 1e-5);
        }
    }
    Ok(())
}

#[test]
fn kl_of_identical_posteriors_is_zero() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let (n, k) = (4_usize, 6_usize);

    let mean = Tensor::randn(0_f32, 2_f32, (n, k), &dev)?;
    let lnvar = Tensor::randn(0_f32, 0.5_f32, (n, k), &dev)?;

    let full = GaussianParams {
        mean: mean.clone(),
        lnvar: lnvar.clone(),
    };
    let masked = GaussianParams { mean, lnvar };

    let kl_n = gaussian_pair_kl(&full, &masked)?.to_vec1::<f32>()?;
    for kl in kl_n {
        assert_abs_diff_eq!(kl, 0_f32, epsilon = 1e-5);
    }
    Ok(())
}

#[test]
fn reconstruction_loss_ignores_observed_pixels() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let (n, p) = (5_usize, 9_usize);

    let x_np = Tensor::rand(0_f32, 1_f32, (n, p), &dev)?
        .ge(0.5)?
        .to_dtype(DType::F32)?;
    let mask_np = Tensor::rand(0_f32, 1_f32, (n, p), &dev)?
        .ge(0.4)?
        .to_dtype(DType::F32)?;

    let recon_np = Tensor::rand(0_f32, 1_f32, (n, p), &dev)?;
    let other_np = Tensor::rand(0_f32, 1_f32, (n, p), &dev)?;

    // replace decoder outputs only where mask = 1
    let held_out_np = mask_np.affine(-1.0, 1.0)?;
    let tampered_np = (recon_np.mul(&held_out_np)? + other_np.mul(&mask_np)?)?;

    let loss = masked_bernoulli_nll(&x_np, &recon_np, &mask_np)?.to_scalar::<f32>()?;
    let tampered = masked_bernoulli_nll(&x_np, &tampered_np, &mask_np)?.to_scalar::<f32>()?;

    assert_abs_diff_eq!(loss, tampered, epsilon = 1e-5);
    Ok(())
}

#[test]
fn reparameterization_collapses_to_mean_and_is_deterministic() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let (n, k) = (3_usize, 8_usize);

    let mean = Tensor::randn(0_f32, 1_f32, (n, k), &dev)?;
    let tiny_var = Tensor::full(-80_f32, (n, k), &dev)?;
    let params = GaussianParams {
        mean: mean.clone(),
        lnvar: tiny_var,
    };

    let mut rng = StdRng::seed_from_u64(7);
    let eps = standard_normal((n, k), &mut rng, &dev)?;

    let z = params.reparameterize(&eps)?.to_vec2::<f32>()?;
    let mu = mean.to_vec2::<f32>()?;
    for i in 0..n {
        for j in 0..k {
            assert_abs_diff_eq!(z[i][j], mu[i][j], epsilon = 1e-5);
        }
    }

    // identical seeds draw identical noise
    let mut rng_a = StdRng::seed_from_u64(11);
    let mut rng_b = StdRng::seed_from_u64(11);
    let eps_a = standard_normal((n, k), &mut rng_a, &dev)?.to_vec2::<f32>()?;
    let eps_b = standard_normal((n, k), &mut rng_b, &dev)?.to_vec2::<f32>()?;
    assert_eq!(eps_a, eps_b);

    Ok(())
}

#[test]
fn zero_weight_pipeline_matches_hand_computed_loss() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let vs = VarBuilder::zeros(DType::F32, &dev);

    let encoder = ContextEncoder::new(3, 128, 64, vs.pp("encoder"))?;
    let latent = LatentDistribution::new(64, vs.pp("latent"))?;
    let decoder = PixelDecoder::new(64, 2, &[32, 16], vs.pp("decoder"))?;

    let grid_p2 = coordinate_grid(2, 2, &dev)?;
    let x_np = Tensor::from_vec(vec![0_f32, 1., 1., 0.], (1, 4), &dev)?;
    let mask_np = Tensor::from_vec(vec![1_f32, 0., 1., 0.], (1, 4), &dev)?;

    let h_npk = encoder.forward(&context_triples(&x_np, &grid_p2)?)?;
    let full = latent.forward(&mean_pool(&h_npk)?)?;
    let masked = latent.forward(&masked_pool(&h_npk, &mask_np)?)?;

    let eps = Tensor::zeros((1, 64), DType::F32, &dev)?;
    let z_nk = full.reparameterize(&eps)?;
    let recon_np = decoder.forward(&z_nk, &grid_p2)?;

    let recon_loss = masked_bernoulli_nll(&x_np, &recon_np, &mask_np)?.to_scalar::<f32>()?;
    let kl = gaussian_pair_kl(&full, &masked)?
        .mean_all()?
        .to_scalar::<f32>()?;

    // all-zero weights decode every pixel to probability 0.5, so the
    // two held-out pixels each contribute ln 2; both posteriors are
    // standard normal, so the kl term vanishes
    assert_abs_diff_eq!(recon_loss, 2. * std::f32::consts::LN_2, epsilon = 1e-4);
    assert_abs_diff_eq!(kl, 0_f32, epsilon = 1e-6);

    Ok(())
}

#[test]
fn checkpoint_round_trip_reproduces_outputs() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("np_model.safetensors");

    let grid_p2 = coordinate_grid(2, 2, &dev)?;
    let x_np = Tensor::rand(0_f32, 1_f32, (2, 4), &dev)?
        .ge(0.5)?
        .to_dtype(DType::F32)?;
    let ctx = context_triples(&x_np, &grid_p2)?;

    let vm_a = VarMap::new();
    let vs_a = VarBuilder::from_varmap(&vm_a, DType::F32, &dev);
    let enc_a = ContextEncoder::new(3, 16, 8, vs_a.pp("encoder"))?;
    let lat_a = LatentDistribution::new(8, vs_a.pp("latent"))?;
    let dec_a = PixelDecoder::new(8, 2, &[8, 4], vs_a.pp("decoder"))?;

    let params_a = lat_a.forward(&mean_pool(&enc_a.forward(&ctx)?)?)?;
    let recon_a = dec_a.forward(&params_a.mean, &grid_p2)?.to_vec2::<f32>()?;

    save_checkpoint(&vm_a, &file)?;

    // a freshly initialized model disagrees until the checkpoint lands
    let mut vm_b = VarMap::new();
    let vs_b = VarBuilder::from_varmap(&vm_b, DType::F32, &dev);
    let enc_b = ContextEncoder::new(3, 16, 8, vs_b.pp("encoder"))?;
    let lat_b = LatentDistribution::new(8, vs_b.pp("latent"))?;
    let dec_b = PixelDecoder::new(8, 2, &[8, 4], vs_b.pp("decoder"))?;

    load_checkpoint(&mut vm_b, &file)?;

    let params_b = lat_b.forward(&mean_pool(&enc_b.forward(&ctx)?)?)?;
    let recon_b = dec_b.forward(&params_b.mean, &grid_p2)?.to_vec2::<f32>()?;

    for (row_a, row_b) in recon_a.iter().zip(recon_b.iter()) {
        for (a, b) in row_a.iter().zip(row_b.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }
    Ok(())
}

#[test]
fn context_sampler_keeps_values_and_coordinates_aligned() -> anyhow::Result<()> {
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    let dev = Device::Cpu;
    let (n, side) = (6_usize, 4_usize);
    let p = side * side;

    let x = Array2::<f32>::random((n, p), Uniform::new(0., 1.)).mapv(|v| (v > 0.5) as u8 as f32);
    let (raw, _) = x.clone().into_raw_vec_and_offset();
    let x_np = Tensor::from_vec(raw, (n, p), &dev)?;

    let grid_p2 = coordinate_grid(side, side, &dev)?;
    let grid = grid_p2.to_vec2::<f32>()?;

    let mut rng = StdRng::seed_from_u64(5);
    let (context_np3, mask_np) = sample_context(&x_np, &grid_p2, &mut rng)?;

    assert_eq!(context_np3.dims(), &[n, p, 3]);
    assert_eq!(mask_np.dims(), &[n, p]);

    for row in mask_np.to_vec2::<f32>()? {
        for m in row {
            assert!(m == 0. || m == 1.);
        }
    }

    // channel 0 carries the pixel value, channels 1..3 the shared grid
    let values = context_np3.narrow(2, 0, 1)?.squeeze(2)?.to_vec2::<f32>()?;
    let expect = x_np.to_vec2::<f32>()?;
    assert_eq!(values, expect);

    let coords = context_np3.get(0)?.to_vec2::<f32>()?;
    for (j, point) in coords.iter().enumerate() {
        assert_abs_diff_eq!(point[1], grid[j][0], epsilon = 1e-6);
        assert_abs_diff_eq!(point[2], grid[j][1], epsilon = 1e-6);
    }

    // the same seed draws the same mask
    let mut rng_again = StdRng::seed_from_u64(5);
    let (_, mask_again) = sample_context(&x_np, &grid_p2, &mut rng_again)?;
    assert_eq!(mask_np.to_vec2::<f32>()?, mask_again.to_vec2::<f32>()?);

    Ok(())
}

#[test]
fn training_reduces_loss_on_constant_images() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let side = 4_usize;
    let n = 24_usize;

    let images = Array2::<f32>::zeros((n, side * side));
    let mut loader = InMemoryImages::new(&images)?;

    let vm = VarMap::new();
    let vs = VarBuilder::from_varmap(&vm, DType::F32, &dev);
    let encoder = ContextEncoder::new(3, 32, 16, vs.pp("encoder"))?;
    let latent = LatentDistribution::new(16, vs.pp("latent"))?;
    let decoder = PixelDecoder::new(16, 2, &[16, 8], vs.pp("decoder"))?;

    let grid_p2 = coordinate_grid(side, side, &dev)?;

    let config = TrainConfig {
        learning_rate: 1e-2,
        batch_size: 8,
        num_epochs: 20,
        log_interval: 100,
        checkpoint_interval: 0,
        checkpoint_dir: None,
        render_dir: None,
        device: dev.clone(),
        verbose: false,
        show_progress: false,
    };

    let mut rng = StdRng::seed_from_u64(42);
    let mut model = NeuralProcess::build(&encoder, &latent, &decoder, &vm);
    let trace = model.train_amortized(&mut loader, &grid_p2, &config, &mut rng)?;

    assert_eq!(trace.len(), config.num_epochs);
    assert!(
        trace.last().unwrap() < trace.first().unwrap(),
        "loss did not decrease: {:?}",
        trace
    );
    Ok(())
}
