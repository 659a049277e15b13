use ndarray::{Array2, ArrayView2};

/// Source pixels contributing to one destination pixel along an axis, with
/// the length of overlap (in source pixel units) of each.
type Footprint = Vec<(usize, f64)>;

/// Resizes a single-channel image by area averaging.
///
/// Each destination pixel is the coverage-weighted mean of the source pixels
/// its footprint overlaps, so downscaling never aliases and the image mean is
/// preserved exactly. Upscaling degrades gracefully to weighted sampling.
pub fn resize_area(src: ArrayView2<'_, f32>, out_h: usize, out_w: usize) -> Array2<f32> {
    let (in_h, in_w) = src.dim();
    if in_h == 0 || in_w == 0 || out_h == 0 || out_w == 0 {
        return Array2::zeros((out_h, out_w));
    }

    let rows = footprints(in_h, out_h);
    let cols = footprints(in_w, out_w);
    let cell_area = (in_h as f64 / out_h as f64) * (in_w as f64 / out_w as f64);

    Array2::from_shape_fn((out_h, out_w), |(dy, dx)| {
        let mut acc = 0.0f64;
        for &(sy, wy) in &rows[dy] {
            for &(sx, wx) in &cols[dx] {
                acc += src[[sy, sx]] as f64 * wy * wx;
            }
        }
        (acc / cell_area) as f32
    })
}

fn footprints(input: usize, output: usize) -> Vec<Footprint> {
    let scale = input as f64 / output as f64;
    (0..output)
        .map(|d| {
            let start = d as f64 * scale;
            let end = (d + 1) as f64 * scale;
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(input);
            (first..last)
                .filter_map(|s| {
                    let overlap = end.min((s + 1) as f64) - start.max(s as f64);
                    (overlap > 1e-12).then_some((s, overlap))
                })
                .collect()
        })
        .collect()
}
