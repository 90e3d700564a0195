#![allow(dead_code)]

use candle_core::{Device, Tensor};
use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;

/// One minibatch: a stacked image tensor and the (unused) labels that
/// came with it.
pub struct MinibatchImages {
    pub images: Tensor,
    pub labels: Option<Tensor>,
}

/// `DataLoader` for minibatch learning
pub trait DataLoader {
    fn minibatch_data(
        &self,
        batch_idx: usize,
        target_device: &Device,
    ) -> anyhow::Result<MinibatchImages>;

    fn num_minibatch(&self) -> usize;

    fn shuffle_minibatch<R: Rng>(&mut self, batch_size: usize, rng: &mut R)
        -> anyhow::Result<()>;
}

///
/// An in-memory loader for flattened images. Each row of the source
/// matrix is one image; shuffling produces an exact partition of the
/// row indexes (every image appears exactly once per epoch, the last
/// chunk may be short) and preloads each chunk as one CPU tensor.
///
pub struct InMemoryImages {
    image_rows: Vec<Tensor>,
    labels: Option<Vec<u32>>,

    shuffled_images: Vec<Tensor>,
    shuffled_labels: Vec<Option<Tensor>>,
    chunks: Vec<Vec<usize>>,
}

impl InMemoryImages {
    ///
    /// Create a loader over an `n x p` matrix of pixel intensities
    ///
    pub fn new(images: &Array2<f32>) -> anyhow::Result<Self> {
        Ok(Self {
            image_rows: rows_to_tensors(images),
            labels: None,
            shuffled_images: vec![],
            shuffled_labels: vec![],
            chunks: vec![],
        })
    }

    ///
    /// Create a loader carrying one label per image row
    ///
    pub fn new_with_labels(images: &Array2<f32>, labels: &[u32]) -> anyhow::Result<Self> {
        if images.nrows() != labels.len() {
            return Err(anyhow::anyhow!(
                "{} images vs. {} labels",
                images.nrows(),
                labels.len()
            ));
        }

        Ok(Self {
            image_rows: rows_to_tensors(images),
            labels: Some(labels.to_vec()),
            shuffled_images: vec![],
            shuffled_labels: vec![],
            chunks: vec![],
        })
    }

    pub fn num_images(&self) -> usize {
        self.image_rows.len()
    }

    pub fn num_pixels(&self) -> usize {
        self.image_rows
            .first()
            .map(|row| row.dims()[1])
            .unwrap_or(0)
    }
}

impl DataLoader for InMemoryImages {
    fn minibatch_data(
        &self,
        batch_idx: usize,
        target_device: &Device,
    ) -> anyhow::Result<MinibatchImages> {
        if batch_idx >= self.shuffled_images.len() {
            return Err(anyhow::anyhow!(
                "invalid index = {} vs. total # = {}; need to shuffle data",
                batch_idx,
                self.shuffled_images.len()
            ));
        }

        let images = self.shuffled_images[batch_idx].to_device(target_device)?;
        let labels = match self.shuffled_labels.get(batch_idx) {
            Some(Some(y)) => Some(y.to_device(target_device)?),
            _ => None,
        };

        Ok(MinibatchImages { images, labels })
    }

    fn num_minibatch(&self) -> usize {
        self.chunks.len()
    }

    fn shuffle_minibatch<R: Rng>(
        &mut self,
        batch_size: usize,
        rng: &mut R,
    ) -> anyhow::Result<()> {
        debug_assert!(batch_size > 0);

        let mut indexes: Vec<usize> = (0..self.image_rows.len()).collect();
        indexes.shuffle(rng);

        self.chunks = indexes
            .chunks(batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        self.shuffled_images.clear();
        self.shuffled_labels.clear();

        for samples in self.chunks.iter() {
            let rows: Vec<Tensor> = samples.iter().map(|&i| self.image_rows[i].clone()).collect();
            self.shuffled_images.push(Tensor::cat(&rows, 0)?);

            let labels = match self.labels.as_ref() {
                Some(all) => {
                    let chunk: Vec<u32> = samples.iter().map(|&i| all[i]).collect();
                    let len = chunk.len();
                    Some(Tensor::from_vec(chunk, len, &Device::Cpu)?)
                }
                None => None,
            };
            self.shuffled_labels.push(labels);
        }

        Ok(())
    }
}

///
/// Convert rows of a matrix to a vector of `(1, p)` CPU tensors
///
fn rows_to_tensors(data: &Array2<f32>) -> Vec<Tensor> {
    let mut idx_data = data
        .axis_iter(ndarray::Axis(0))
        .enumerate()
        .par_bridge()
        .map(|(i, row)| {
            let v = Tensor::from_iter(row.iter().copied(), &Device::Cpu)
                .and_then(|v| v.reshape((1, row.len())))
                .expect("failed to create row tensor");
            (i, v)
        })
        .collect::<Vec<_>>();

    idx_data.sort_by_key(|(i, _)| *i);
    idx_data.into_iter().map(|(_, t)| t).collect()
}
