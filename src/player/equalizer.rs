use serde::{Deserialize, Serialize};

pub const BAND_COUNT: usize = 10;
pub const MAX_GAIN_DB: f32 = 12.0;

/// Center frequencies (Hz) of the ten bands, for display.
pub const BAND_FREQUENCIES: [u32; BAND_COUNT] = [31, 62, 125, 250, 500, 1_000, 2_000, 4_000, 8_000, 16_000];

/// Named gain curves selectable with `eq_preset`.
const PRESETS: &[(&str, [f32; BAND_COUNT])] = &[
    ("flat", [0.0; BAND_COUNT]),
    ("bass_boost", [6.0, 5.0, 4.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
    ("treble_boost", [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 4.0, 5.0, 6.0]),
    ("vocal", [-2.0, -1.0, 0.0, 2.0, 4.0, 4.0, 3.0, 1.0, 0.0, -1.0]),
    ("nightcore", [3.0, 2.0, 0.0, -1.0, 0.0, 1.0, 3.0, 4.0, 4.0, 3.0]),
    ("soft", [0.0, 0.0, 0.0, 0.0, -1.0, -2.0, -3.0, -4.0, -5.0, -6.0]),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equalizer {
    /// `custom` once any band was edited by hand.
    pub preset: String,
    pub bands: [f32; BAND_COUNT],
}

impl Default for Equalizer {
    fn default() -> Self {
        Self {
            preset: "flat".to_string(),
            bands: [0.0; BAND_COUNT],
        }
    }
}

impl Equalizer {
    pub fn preset_names() -> impl Iterator<Item = &'static str> {
        PRESETS.iter().map(|(name, _)| *name)
    }

    pub fn from_preset(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        PRESETS.iter().find(|(n, _)| *n == name).map(|(n, bands)| Self {
            preset: n.to_string(),
            bands: *bands,
        })
    }

    /// Sets one band, clamping the gain to ±12 dB. Returns `false` for an
    /// out-of-range band.
    pub fn set_band(&mut self, band: usize, gain_db: f32) -> bool {
        if band >= BAND_COUNT || !gain_db.is_finite() {
            return false;
        }
        self.bands[band] = gain_db.clamp(-MAX_GAIN_DB, MAX_GAIN_DB);
        self.preset = "custom".to_string();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_lookup_is_case_insensitive() {
        let eq = Equalizer::from_preset(" Bass_Boost ").unwrap();
        assert_eq!(eq.preset, "bass_boost");
        assert_eq!(eq.bands[0], 6.0);
        assert!(Equalizer::from_preset("loudness_war").is_none());
    }

    #[test]
    fn test_set_band_clamps_and_marks_custom() {
        let mut eq = Equalizer::default();
        assert!(eq.set_band(3, 40.0));
        assert_eq!(eq.bands[3], MAX_GAIN_DB);
        assert_eq!(eq.preset, "custom");
        assert!(!eq.set_band(BAND_COUNT, 1.0));
        assert!(!eq.set_band(0, f32::NAN));
    }
}
