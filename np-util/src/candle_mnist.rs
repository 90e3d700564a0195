use anyhow::{anyhow, Context};
use flate2::read::GzDecoder;
use ndarray::Array2;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

const IDX_IMAGE_MAGIC: u32 = 2051;
const IDX_LABEL_MAGIC: u32 = 2049;

/// MNIST-style dataset: one flattened image per row, intensities
/// binarized to `{0, 1}`, plus one (unused) label per image.
pub struct MnistData {
    pub images: Array2<f32>,
    pub labels: Vec<u32>,
    pub height: usize,
    pub width: usize,
}

impl MnistData {
    pub fn num_images(&self) -> usize {
        self.images.nrows()
    }

    pub fn num_pixels(&self) -> usize {
        self.height * self.width
    }
}

/// Load the MNIST training split from `dir`, looking for the standard
/// IDX file names with or without a `.gz` suffix. Downloading is out
/// of scope; the files must already be on disk.
pub fn load_mnist_train(dir: &Path, binarize_threshold: f32) -> anyhow::Result<MnistData> {
    let image_file = find_idx_file(dir, "train-images-idx3-ubyte")?;
    let label_file = find_idx_file(dir, "train-labels-idx1-ubyte")?;

    let (mut images, height, width) = read_idx_images(&image_file)?;
    images.mapv_inplace(|v| if v > binarize_threshold { 1. } else { 0. });

    let labels = read_idx_labels(&label_file)?;

    if images.nrows() != labels.len() {
        return Err(anyhow!(
            "{}: {} images vs. {} labels",
            dir.display(),
            images.nrows(),
            labels.len()
        ));
    }

    Ok(MnistData {
        images,
        labels,
        height,
        width,
    })
}

/// Read an IDX image file into an `n x (rows * cols)` matrix with
/// intensities scaled to `[0, 1]`.
pub fn read_idx_images(path: &Path) -> anyhow::Result<(Array2<f32>, usize, usize)> {
    let mut reader = open_maybe_gz(path)?;

    let magic = read_be_u32(&mut reader)?;
    if magic != IDX_IMAGE_MAGIC {
        return Err(anyhow!(
            "{}: bad image magic {} (want {})",
            path.display(),
            magic,
            IDX_IMAGE_MAGIC
        ));
    }

    let num = read_be_u32(&mut reader)? as usize;
    let rows = read_be_u32(&mut reader)? as usize;
    let cols = read_be_u32(&mut reader)? as usize;

    let mut raw = vec![0_u8; num * rows * cols];
    reader
        .read_exact(&mut raw)
        .with_context(|| format!("{}: truncated image payload", path.display()))?;

    let data: Vec<f32> = raw.into_iter().map(|b| b as f32 / 255.).collect();
    let images = Array2::from_shape_vec((num, rows * cols), data)?;

    Ok((images, rows, cols))
}

/// Read an IDX label file into one `u32` per image.
pub fn read_idx_labels(path: &Path) -> anyhow::Result<Vec<u32>> {
    let mut reader = open_maybe_gz(path)?;

    let magic = read_be_u32(&mut reader)?;
    if magic != IDX_LABEL_MAGIC {
        return Err(anyhow!(
            "{}: bad label magic {} (want {})",
            path.display(),
            magic,
            IDX_LABEL_MAGIC
        ));
    }

    let num = read_be_u32(&mut reader)? as usize;
    let mut raw = vec![0_u8; num];
    reader
        .read_exact(&mut raw)
        .with_context(|| format!("{}: truncated label payload", path.display()))?;

    Ok(raw.into_iter().map(|b| b as u32).collect())
}

fn find_idx_file(dir: &Path, stem: &str) -> anyhow::Result<PathBuf> {
    let gz = dir.join(format!("{}.gz", stem));
    if gz.exists() {
        return Ok(gz);
    }
    let plain = dir.join(stem);
    if plain.exists() {
        return Ok(plain);
    }
    Err(anyhow!(
        "missing {} (or .gz) under {}",
        stem,
        dir.display()
    ))
}

fn open_maybe_gz(path: &Path) -> anyhow::Result<Box<dyn Read>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;

    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

fn read_be_u32(reader: &mut impl Read) -> std::io::Result<u32> {
    let mut buf = [0_u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}
