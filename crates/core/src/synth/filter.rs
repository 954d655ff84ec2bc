/// Two-pole (12 dB/octave) state-variable filter, mono.
#[derive(Debug, Clone)]
pub struct SvfFilter {
    mode: FilterMode,
    ic1eq: f32,
    ic2eq: f32,
    k: f32,
    a1: f32,
    a2: f32,
    a3: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    LowPass,
    HighPass,
}

impl SvfFilter {
    pub fn new(mode: FilterMode, cutoff: f32, q: f32, sample_rate: u32) -> Self {
        let mut filter = Self {
            mode,
            ic1eq: 0.0,
            ic2eq: 0.0,
            k: 0.0,
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
        };
        filter.set_params(cutoff, q, sample_rate);
        filter
    }

    fn set_params(&mut self, cutoff: f32, q: f32, sample_rate: u32) {
        let sample_rate = sample_rate.max(1) as f32;
        let cutoff = cutoff.clamp(10.0, sample_rate * 0.45);
        let q = q.clamp(0.1, 10.0);

        let g = (std::f32::consts::PI * cutoff / sample_rate).tan();
        self.k = 1.0 / q;
        self.a1 = 1.0 / (1.0 + g * (g + self.k));
        self.a2 = g * self.a1;
        self.a3 = g * self.a2;
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let v3 = input - self.ic2eq;
        let v1 = self.a1 * self.ic1eq + self.a2 * v3;
        let v2 = self.ic2eq + self.a2 * self.ic1eq + self.a3 * v3;
        self.ic1eq = 2.0 * v1 - self.ic1eq;
        self.ic2eq = 2.0 * v2 - self.ic2eq;

        match self.mode {
            FilterMode::LowPass => v2,
            FilterMode::HighPass => input - self.k * v1 - v2,
        }
    }

}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use super::*;

    const SAMPLE_RATE: u32 = 48_000;

    fn rms_through(filter: &mut SvfFilter, frequency: f32) -> f32 {
        let len = 4800;
        let sum: f32 = (0..len)
            .map(|i| {
                let x = (2.0 * PI * frequency * i as f32 / SAMPLE_RATE as f32).sin();
                filter.process(x)
            })
            .skip(len / 2)
            .map(|y| y * y)
            .sum();
        (sum / (len / 2) as f32).sqrt()
    }

    #[test]
    fn lowpass_attenuates_above_cutoff() {
        let mut pass = SvfFilter::new(FilterMode::LowPass, 1000.0, 0.707, SAMPLE_RATE);
        let mut stop = pass.clone();
        assert!(rms_through(&mut pass, 200.0) > 0.6);
        assert!(rms_through(&mut stop, 10_000.0) < 0.05);
    }

    #[test]
    fn highpass_removes_rumble() {
        let mut filter = SvfFilter::new(FilterMode::HighPass, 40.0, 0.7, SAMPLE_RATE);
        let mut dc = 0.0;
        for _ in 0..48_000 {
            dc = filter.process(1.0);
        }
        assert!(dc.abs() < 1e-3);

        let mut filter = SvfFilter::new(FilterMode::HighPass, 40.0, 0.7, SAMPLE_RATE);
        assert!(rms_through(&mut filter, 440.0) > 0.6);
    }
}
