//! YIN fundamental frequency estimation over a single analysis frame.

/// Runs YIN on `buffer` and returns the estimated f0 in Hz.
///
/// Lags span `1..len/2`, so the lowest detectable frequency is
/// `sample_rate / (len / 2)`. `scratch` is reused between calls to avoid
/// allocating on every frame.
pub fn estimate(
    buffer: &[f32],
    sample_rate: u32,
    threshold: f32,
    scratch: &mut Vec<f32>,
) -> Option<f32> {
    let half = buffer.len() / 2;
    if half < 4 || sample_rate == 0 {
        return None;
    }

    scratch.clear();
    scratch.resize(half, 0.0);
    difference(buffer, scratch);
    cumulative_mean_normalize(scratch);

    let tau = absolute_threshold(scratch, threshold)?;
    let refined = parabolic_minimum(scratch, tau);
    if refined <= 0.0 {
        return None;
    }
    Some(sample_rate as f32 / refined)
}

/// `d(τ) = Σ (x[i] − x[i+τ])²` over a window of `half` samples.
fn difference(buffer: &[f32], out: &mut [f32]) {
    let half = out.len();
    for tau in 1..half {
        let mut sum = 0.0f32;
        for i in 0..half {
            let delta = buffer[i] - buffer[i + tau];
            sum += delta * delta;
        }
        out[tau] = sum;
    }
}

/// `d′(τ) = d(τ)·τ / Σ₁..τ d(k)`, with `d′(0) = 1`.
fn cumulative_mean_normalize(values: &mut [f32]) {
    values[0] = 1.0;
    let mut running = 0.0f64;
    for tau in 1..values.len() {
        running += values[tau] as f64;
        values[tau] = if running <= f64::EPSILON {
            1.0
        } else {
            (values[tau] as f64 * tau as f64 / running) as f32
        };
    }
}

/// First lag from 2 upwards under `threshold`, followed down to the bottom of
/// its dip so a shallow early crossing does not win.
fn absolute_threshold(values: &[f32], threshold: f32) -> Option<usize> {
    let mut tau = 2;
    while tau < values.len() {
        if values[tau] < threshold {
            while tau + 1 < values.len() && values[tau + 1] < values[tau] {
                tau += 1;
            }
            return Some(tau);
        }
        tau += 1;
    }
    None
}

fn parabolic_minimum(values: &[f32], tau: usize) -> f32 {
    if tau < 1 || tau + 1 >= values.len() {
        return tau as f32;
    }
    let (y0, y1, y2) = (values[tau - 1], values[tau], values[tau + 1]);
    let curvature = y0 - 2.0 * y1 + y2;
    if curvature.abs() <= f32::EPSILON {
        return tau as f32;
    }
    tau as f32 + (y0 - y2) / (2.0 * curvature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parabola_vertex_is_recovered() {
        // y = (x - 3.3)^2 sampled at 2, 3, 4
        let values = [0.0, 0.0, 1.69, 0.09, 0.49, 5.0];
        let refined = parabolic_minimum(&values, 3);
        assert!((refined - 3.3).abs() < 1e-4);
    }

    #[test]
    fn threshold_follows_dip_to_its_bottom() {
        let values = [1.0, 0.9, 0.8, 0.11, 0.05, 0.02, 0.04, 0.3];
        assert_eq!(absolute_threshold(&values, 0.12), Some(5));
        assert_eq!(absolute_threshold(&values, 0.01), None);
    }

    #[test]
    fn short_buffers_have_no_pitch() {
        let mut scratch = Vec::new();
        assert_eq!(estimate(&[0.1, 0.2, 0.3], 48_000, 0.1, &mut scratch), None);
    }
}
