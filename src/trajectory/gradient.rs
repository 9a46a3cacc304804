/// Discrete derivative of a uniformly sampled sequence (unit spacing).
///
/// Central differences for interior samples, first-order one-sided
/// differences at the two ends. A single sample has zero derivative.
pub fn gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    match n {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => {
            let mut out = Vec::with_capacity(n);
            out.push(values[1] - values[0]);
            out.extend(values.windows(3).map(|w| (w[2] - w[0]) / 2.0));
            out.push(values[n - 1] - values[n - 2]);
            out
        }
    }
}

/// Gradient scaled by the sampling rate, i.e. per second instead of per frame.
pub fn time_derivative(values: &[f64], fps: f64) -> Vec<f64> {
    gradient(values).into_iter().map(|d| d * fps).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient() {
        assert_eq!(gradient(&[1.0, 2.0, 4.0, 7.0, 11.0]), vec![1.0, 1.5, 2.5, 3.5, 4.0]);
        assert_eq!(gradient(&[3.0, 5.0]), vec![2.0, 2.0]);
    }

    #[test]
    fn test_degenerate_lengths() {
        assert!(gradient(&[]).is_empty());
        assert_eq!(gradient(&[4.2]), vec![0.0]);
    }

    #[test]
    fn test_time_derivative_scales_by_fps() {
        assert_eq!(time_derivative(&[0.0, 1.0, 2.0], 30.0), vec![30.0, 30.0, 30.0]);
    }
}
