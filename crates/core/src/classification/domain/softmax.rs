/// Converts raw scores into percentages that sum to 100.
///
/// The maximum score is subtracted before exponentiating so large logits
/// cannot overflow. Accumulation is done in `f64`; the result still only sums
/// to 100 within floating-point rounding. Callers must pass finite scores.
pub fn softmax_percent(scores: &[f32]) -> Vec<f32> {
    let max = scores
        .iter()
        .fold(f64::NEG_INFINITY, |m, &s| m.max(s as f64));

    let exps: Vec<f64> = scores.iter().map(|&s| (s as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();

    if !(sum > 0.0 && sum.is_finite()) {
        return vec![0.0; scores.len()];
    }
    exps.iter().map(|e| (e / sum * 100.0) as f32).collect()
}
