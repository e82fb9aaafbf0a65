use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Runtime-tunable shadow pool settings. Values are free-form as loaded;
/// [`ShadowSettings::sanitized`] produces the clamped, power-of-two form the
/// pool actually runs with.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ShadowSettings {
    #[serde(default = "ShadowSettings::default_atlas_size")]
    pub atlas_size: u32,
    #[serde(default = "ShadowSettings::default_max_shadow_map_size")]
    pub max_shadow_map_size: u32,
    #[serde(default = "ShadowSettings::default_min_shadow_map_size")]
    pub min_shadow_map_size: u32,
    #[serde(default = "ShadowSettings::default_scale_mapping_exponent")]
    pub scale_mapping_exponent: f32,
}

impl ShadowSettings {
    const fn default_atlas_size() -> u32 {
        4096
    }

    const fn default_max_shadow_map_size() -> u32 {
        1024
    }

    const fn default_min_shadow_map_size() -> u32 {
        64
    }

    const fn default_scale_mapping_exponent() -> f32 {
        1.5
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))?;
        Ok(settings)
    }

    /// Clamps every size to its valid range and floors it to a power of two,
    /// then enforces max <= atlas and min <= max.
    pub fn sanitized(self) -> Self {
        let atlas_size = floor_pow2(self.atlas_size).clamp(512, 8192);
        let max_shadow_map_size = floor_pow2(self.max_shadow_map_size).clamp(64, 2048).min(atlas_size);
        let min_shadow_map_size =
            floor_pow2(self.min_shadow_map_size).clamp(8, 512).min(max_shadow_map_size);
        Self {
            atlas_size,
            max_shadow_map_size,
            min_shadow_map_size,
            scale_mapping_exponent: self.scale_mapping_exponent,
        }
    }
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            atlas_size: Self::default_atlas_size(),
            max_shadow_map_size: Self::default_max_shadow_map_size(),
            min_shadow_map_size: Self::default_min_shadow_map_size(),
            scale_mapping_exponent: Self::default_scale_mapping_exponent(),
        }
    }
}

fn floor_pow2(value: u32) -> u32 {
    if value.is_power_of_two() {
        value
    } else {
        value.next_power_of_two() / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_already_sanitized() {
        let settings = ShadowSettings::default();
        assert_eq!(settings, settings.sanitized());
    }

    #[test]
    fn sizes_are_floored_to_powers_of_two() {
        let settings = ShadowSettings {
            atlas_size: 3000,
            max_shadow_map_size: 1000,
            min_shadow_map_size: 100,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(settings.atlas_size, 2048);
        assert_eq!(settings.max_shadow_map_size, 512);
        assert_eq!(settings.min_shadow_map_size, 64);
    }

    #[test]
    fn bounds_are_enforced_in_order() {
        let settings = ShadowSettings {
            atlas_size: 16,
            max_shadow_map_size: 1_000_000,
            min_shadow_map_size: 1_000_000,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(settings.atlas_size, 512);
        assert_eq!(settings.max_shadow_map_size, 512);
        assert_eq!(settings.min_shadow_map_size, 512);

        let tiny = ShadowSettings {
            atlas_size: 512,
            max_shadow_map_size: 64,
            min_shadow_map_size: 512,
            ..Default::default()
        }
        .sanitized();
        assert_eq!(tiny.min_shadow_map_size, tiny.max_shadow_map_size);
    }

    #[test]
    fn settings_parse_with_partial_fields() {
        let settings: ShadowSettings = serde_json::from_str(r#"{ "atlas_size": 2048 }"#).unwrap();
        assert_eq!(settings.atlas_size, 2048);
        assert_eq!(settings.max_shadow_map_size, 1024);
        assert_eq!(settings.scale_mapping_exponent, 1.5);
    }
}
