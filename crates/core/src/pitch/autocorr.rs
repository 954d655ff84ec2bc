use std::{fmt, sync::Arc};

use realfft::{num_complex::Complex32, ComplexToReal, RealFftPlanner, RealToComplex};

use crate::Result;

/// FFT backed autocorrelation of real frames.
///
/// Frames are zero padded to a power of two at least twice their length so
/// the circular correlation computed in the frequency domain equals the
/// linear one.
pub struct Autocorrelator {
    planner: RealFftPlanner<f32>,
    plan: Option<Plan>,
}

struct Plan {
    size: usize,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    output: Vec<f32>,
    forward_scratch: Vec<Complex32>,
    inverse_scratch: Vec<Complex32>,
}

impl Autocorrelator {
    pub fn new() -> Self {
        Self {
            planner: RealFftPlanner::new(),
            plan: None,
        }
    }

    /// Writes `r(τ) = Σ x[i]·x[i+τ]` for `τ` in `0..frame.len()` into `out`.
    pub fn compute(&mut self, frame: &[f32], out: &mut Vec<f32>) -> Result<()> {
        out.clear();
        if frame.is_empty() {
            return Ok(());
        }

        let size = (frame.len() * 2).next_power_of_two();
        let mut plan = match self.plan.take() {
            Some(plan) if plan.size == size => plan,
            _ => Plan::new(&mut self.planner, size),
        };
        let result = plan.run(frame, out);
        self.plan = Some(plan);
        result
    }
}

impl Plan {
    fn new(planner: &mut RealFftPlanner<f32>, size: usize) -> Self {
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        Self {
            size,
            input: forward.make_input_vec(),
            spectrum: forward.make_output_vec(),
            output: inverse.make_output_vec(),
            forward_scratch: forward.make_scratch_vec(),
            inverse_scratch: inverse.make_scratch_vec(),
            forward,
            inverse,
        }
    }

    fn run(&mut self, frame: &[f32], out: &mut Vec<f32>) -> Result<()> {
        self.input[..frame.len()].copy_from_slice(frame);
        self.input[frame.len()..].fill(0.0);

        self.forward
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.forward_scratch)?;
        for bin in self.spectrum.iter_mut() {
            *bin = Complex32::new(bin.norm_sqr(), 0.0);
        }
        self.inverse
            .process_with_scratch(&mut self.spectrum, &mut self.output, &mut self.inverse_scratch)?;

        let scale = 1.0 / self.size as f32;
        out.extend(self.output[..frame.len()].iter().map(|value| value * scale));
        Ok(())
    }
}

impl Default for Autocorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Autocorrelator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Autocorrelator")
            .field("size", &self.plan.as_ref().map(|plan| plan.size))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(frame: &[f32]) -> Vec<f32> {
        (0..frame.len())
            .map(|lag| {
                frame
                    .iter()
                    .zip(&frame[lag..])
                    .map(|(a, b)| a * b)
                    .sum()
            })
            .collect()
    }

    #[test]
    fn matches_direct_autocorrelation() {
        let frame: Vec<f32> = (0..100).map(|i| ((i * 7 % 13) as f32 - 6.0) / 6.0).collect();
        let mut engine = Autocorrelator::new();
        let mut out = Vec::new();
        engine.compute(&frame, &mut out).unwrap();

        let expected = direct(&frame);
        assert_eq!(out.len(), expected.len());
        for (got, want) in out.iter().zip(&expected) {
            assert!((got - want).abs() < 1e-3, "{got} vs {want}");
        }
    }

    #[test]
    fn replans_when_frame_size_changes() {
        let mut engine = Autocorrelator::new();
        let mut out = Vec::new();
        engine.compute(&[1.0; 16], &mut out).unwrap();
        assert!((out[0] - 16.0).abs() < 1e-4);
        engine.compute(&[1.0; 40], &mut out).unwrap();
        assert_eq!(out.len(), 40);
        assert!((out[39] - 1.0).abs() < 1e-4);
    }
}
