//! Scalability mode descriptors (`L1T3`, `L2T3_KEY`, ...)
//!
//! A mode name encodes the number of spatial (`L`) and temporal (`T`) layers.
//! The `_KEY` suffix marks k-SVC modes where an upper spatial layer only
//! depends on lower layers at key pictures, so a receiver can switch its
//! decode ceiling only starting at a key frame.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

const KEY_FRAME_DEPENDENT_SUFFIX: &str = "_KEY";
const MAX_LAYERS: u8 = 3;

/// Layering scheme of one encode leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalabilityMode {
    name: String,
    spatial_layers: u8,
    temporal_layers: u8,
    uses_key_frame_dependency: bool,
    recognized: bool,
}

impl ScalabilityMode {
    /// Parse a mode name
    ///
    /// Never fails: an unknown name yields a single-layer mode with
    /// `is_recognized() == false` and a diagnostic.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match Self::parse_layers(name) {
            Some((spatial_layers, temporal_layers, uses_key_frame_dependency)) => Self {
                name: name.to_string(),
                spatial_layers,
                temporal_layers,
                uses_key_frame_dependency,
                recognized: true,
            },
            None => {
                warn!(mode = name, "Unrecognized scalability mode");
                Self {
                    name: name.to_string(),
                    spatial_layers: 1,
                    temporal_layers: 1,
                    uses_key_frame_dependency: name.ends_with(KEY_FRAME_DEPENDENT_SUFFIX),
                    recognized: false,
                }
            }
        }
    }

    fn parse_layers(name: &str) -> Option<(u8, u8, bool)> {
        let (layers, key) = match name.strip_suffix(KEY_FRAME_DEPENDENT_SUFFIX) {
            Some(rest) => (rest, true),
            None => (name, false),
        };
        let (spatial, temporal) = layers.strip_prefix('L')?.split_once('T')?;
        let spatial: u8 = spatial.parse().ok()?;
        let temporal: u8 = temporal.parse().ok()?;
        if !(1..=MAX_LAYERS).contains(&spatial) || !(1..=MAX_LAYERS).contains(&temporal) {
            return None;
        }
        Some((spatial, temporal, key))
    }

    /// `L1T3`: one spatial layer, three temporal layers
    #[must_use]
    pub fn l1t3() -> Self {
        Self::parse("L1T3")
    }

    /// `L2T3_KEY`: two spatial layers with key-frame dependency
    #[must_use]
    pub fn l2t3_key() -> Self {
        Self::parse("L2T3_KEY")
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn spatial_layers(&self) -> u8 {
        self.spatial_layers
    }

    #[must_use]
    pub const fn temporal_layers(&self) -> u8 {
        self.temporal_layers
    }

    #[must_use]
    pub const fn uses_key_frame_dependency(&self) -> bool {
        self.uses_key_frame_dependency
    }

    #[must_use]
    pub const fn is_recognized(&self) -> bool {
        self.recognized
    }

    /// Highest spatial index a receiver of this mode asks for
    #[must_use]
    pub const fn top_spatial_index(&self) -> u8 {
        self.spatial_layers.saturating_sub(1)
    }
}

impl fmt::Display for ScalabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_mode() {
        let mode = ScalabilityMode::parse("L2T3_KEY");
        assert!(mode.is_recognized());
        assert_eq!(mode.spatial_layers(), 2);
        assert_eq!(mode.temporal_layers(), 3);
        assert!(mode.uses_key_frame_dependency());
        assert_eq!(mode.top_spatial_index(), 1);
    }

    #[test]
    fn test_parse_single_layer_mode() {
        let mode = ScalabilityMode::l1t3();
        assert!(mode.is_recognized());
        assert!(!mode.uses_key_frame_dependency());
        assert_eq!(mode.top_spatial_index(), 0);
    }

    #[test]
    fn test_unrecognized_mode_falls_back() {
        for name in ["S2T1", "L4T3", "L0T1", "garbage", "L2T3h"] {
            let mode = ScalabilityMode::parse(name);
            assert!(!mode.is_recognized(), "{name} should not be recognized");
            assert_eq!(mode.spatial_layers(), 1);
            assert_eq!(mode.top_spatial_index(), 0);
            assert_eq!(mode.name(), name);
        }
    }

    #[test]
    fn test_three_layer_mode() {
        let mode = ScalabilityMode::parse("L3T2_KEY");
        assert_eq!(mode.top_spatial_index(), 2);
        assert_eq!(mode.temporal_layers(), 2);
        assert_eq!(mode.to_string(), "L3T2_KEY");
    }
}
