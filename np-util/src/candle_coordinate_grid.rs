use candle_core::{Device, Result, Tensor};

/// Normalized query coordinates for an `height x width` pixel grid.
///
/// Returns a `(height * width, 2)` tensor where the point at flat
/// index `r * width + c` is `(c / (width - 1), r / (height - 1))`, so
/// both coordinates live in `[0, 1]`. The same tensor must serve both
/// context sampling and decoding; the flat ordering here matches the
/// row-major flattening of the image rows.
pub fn coordinate_grid(height: usize, width: usize, device: &Device) -> Result<Tensor> {
    debug_assert!(height > 1 && width > 1);

    let dx = 1.0 / (width - 1) as f32;
    let dy = 1.0 / (height - 1) as f32;

    let mut points = Vec::with_capacity(height * width * 2);
    for r in 0..height {
        for c in 0..width {
            points.push(c as f32 * dx);
            points.push(r as f32 * dy);
        }
    }

    Tensor::from_vec(points, (height * width, 2), device)
}
