use anyhow::{anyhow, Context};
use candle_core::{Device, Tensor};
use image::{GrayImage, Luma};
use std::path::Path;

/// Write a qualitative ground-truth vs. reconstruction grid.
///
/// Ground truth occupies the top row, reconstructions the bottom row,
/// one column per image up to `max_images`. Nothing downstream
/// consumes these files.
pub fn render_reconstruction(
    x_np: &Tensor,
    recon_np: &Tensor,
    height: usize,
    width: usize,
    max_images: usize,
    path: &Path,
) -> anyhow::Result<()> {
    let truth = x_np.to_device(&Device::Cpu)?.to_vec2::<f32>()?;
    let recon = recon_np.to_device(&Device::Cpu)?.to_vec2::<f32>()?;

    let n = truth.len().min(recon.len()).min(max_images);
    if n == 0 {
        return Err(anyhow!("nothing to render"));
    }

    let mut canvas = GrayImage::new((n * width) as u32, (2 * height) as u32);

    for (i, (x, r)) in truth.iter().zip(recon.iter()).take(n).enumerate() {
        for row in 0..height {
            for col in 0..width {
                let p = row * width + col;
                let u = (i * width + col) as u32;
                canvas.put_pixel(u, row as u32, Luma([to_gray(x[p])]));
                canvas.put_pixel(u, (height + row) as u32, Luma([to_gray(r[p])]));
            }
        }
    }

    canvas
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn to_gray(v: f32) -> u8 {
    (v.clamp(0., 1.) * 255.) as u8
}
