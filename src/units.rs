//! Unit conversions shared by the control surface and the patch.

/// Smallest amplitude reported by [`amplitude_to_db`] before it gives up and
/// returns negative infinity.
pub const SILENCE_AMPLITUDE: f32 = 1.0e-10;

/// Convert a level in dB (dBFS for audio signals) to a linear amplitude.
///
/// `linear = 10^(dB / 20)`, so `-12.0` maps to roughly `0.2512` and `0.0`
/// maps to unity.
#[inline]
pub fn db_to_amplitude(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Inverse of [`db_to_amplitude`].
#[inline]
pub fn amplitude_to_db(amplitude: f32) -> f32 {
    if amplitude <= SILENCE_AMPLITUDE {
        return f32::NEG_INFINITY;
    }
    20.0 * amplitude.log10()
}
