/// Peak-normalised Gaussian beam response at `offset` from the source.
pub fn gaussian_beam(offset: f64, sigma: f64) -> f64 {
    (-offset * offset / (2.0 * sigma * sigma)).exp()
}

/// Receiver band-pass gain of `channel`, rolling off towards the band edges.
pub fn bandpass(channel: usize, channels: usize) -> f64 {
    if channels <= 1 {
        return 1.0;
    }
    let position = channel as f64 / (channels - 1) as f64;
    0.6 + 0.4 * (std::f64::consts::PI * position).sin()
}

/// Evenly spaced offsets across `span`, centred on zero.
pub fn scan_offsets(samples: usize, span: f64, reverse: bool) -> Vec<f64> {
    let last = samples.saturating_sub(1).max(1) as f64;
    let mut offsets: Vec<f64> = (0..samples)
        .map(|i| (i as f64 / last - 0.5) * span)
        .collect();
    if reverse {
        offsets.reverse();
    }
    offsets
}
