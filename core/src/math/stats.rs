use ndarray::ArrayView2;

pub struct StatsHelper;

impl StatsHelper {
    /// RMS over every element of a 2-D block, accumulated in f64.
    pub fn rms_2d(block: ArrayView2<f32>) -> f32 {
        if block.is_empty() {
            return 0.0;
        }
        (Self::energy(block) / block.len() as f64).sqrt() as f32
    }

    /// Sum of squares accumulated in f64.
    pub fn energy(block: ArrayView2<f32>) -> f64 {
        block.iter().map(|&v| f64::from(v) * f64::from(v)).sum()
    }

    /// `(row, column, value)` of the largest finite element; first
    /// occurrence wins.
    pub fn argmax(block: ArrayView2<f32>) -> Option<(usize, usize, f32)> {
        let mut best: Option<(usize, usize, f32)> = None;
        for ((row, col), &value) in block.indexed_iter() {
            if !value.is_finite() {
                continue;
            }
            if best.map_or(true, |(_, _, top)| value > top) {
                best = Some((row, col, value));
            }
        }
        best
    }
}
