use log::{info, warn};
use serde::{Deserialize, Serialize};

pub const CASCADE_COUNT: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default = "RenderSettings::default_shadow_map_size")]
    pub shadow_map_size: u32,
    #[serde(default = "RenderSettings::default_max_instances")]
    pub max_instances: u32,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default = "RenderSettings::default_cascade_splits")]
    pub cascade_splits: [f32; CASCADE_COUNT],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            shadow_map_size: Self::default_shadow_map_size(),
            max_instances: Self::default_max_instances(),
            resolution: Resolution::default(),
            cascade_splits: Self::default_cascade_splits(),
        }
    }
}

impl RenderSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RenderSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded render settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default render settings.",
                        path, err
                    );
                    RenderSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }
        }
    }

    pub fn validate(mut self) -> Self {
        if self.shadow_map_size == 0 {
            warn!("Shadow map size must be greater than zero. Using default value.");
            self.shadow_map_size = Self::default_shadow_map_size();
        }

        if self.max_instances == 0 {
            warn!("Instance capacity must be greater than zero. Using default value.");
            self.max_instances = Self::default_max_instances();
        }

        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        let splits_valid = self.cascade_splits[0] > 0.0
            && self.cascade_splits.windows(2).all(|w| w[0] < w[1]);
        if !splits_valid {
            warn!("Cascade splits must be positive and strictly increasing. Using defaults.");
            self.cascade_splits = Self::default_cascade_splits();
        }

        self
    }

    const fn default_shadow_map_size() -> u32 {
        2048
    }

    const fn default_max_instances() -> u32 {
        8192
    }

    const fn default_cascade_splits() -> [f32; CASCADE_COUNT] {
        [10.0, 40.0, 100.0, 200.0]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_settings() -> RenderSettings {
        RenderSettings {
            shadow_map_size: 0,
            max_instances: 0,
            resolution: Resolution {
                width: 0,
                height: 0,
            },
            cascade_splits: [40.0, 10.0, 100.0, 200.0],
        }
    }

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = invalid_settings().validate();

        assert_eq!(
            validated.shadow_map_size,
            RenderSettings::default().shadow_map_size
        );
        assert_eq!(
            validated.max_instances,
            RenderSettings::default().max_instances
        );
        assert_eq!(validated.resolution.width, Resolution::default().width);
        assert_eq!(validated.resolution.height, Resolution::default().height);
        assert_eq!(
            validated.cascade_splits,
            RenderSettings::default().cascade_splits
        );
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = RenderSettings {
            shadow_map_size: 4096,
            max_instances: 2048,
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            cascade_splits: [5.0, 20.0, 60.0, 150.0],
        };

        let validated = valid.clone().validate();

        assert_eq!(validated.shadow_map_size, valid.shadow_map_size);
        assert_eq!(validated.max_instances, valid.max_instances);
        assert_eq!(validated.resolution.width, valid.resolution.width);
        assert_eq!(validated.resolution.height, valid.resolution.height);
        assert_eq!(validated.cascade_splits, valid.cascade_splits);
    }

    #[test]
    fn validate_rejects_non_increasing_splits() {
        let settings = RenderSettings {
            cascade_splits: [10.0, 10.0, 100.0, 200.0],
            ..RenderSettings::default()
        };

        let validated = settings.validate();
        assert_eq!(
            validated.cascade_splits,
            RenderSettings::default().cascade_splits
        );
    }

    #[test]
    fn validate_rejects_negative_first_split() {
        let settings = RenderSettings {
            cascade_splits: [-1.0, 40.0, 100.0, 200.0],
            ..RenderSettings::default()
        };

        let validated = settings.validate();
        assert_eq!(
            validated.cascade_splits,
            RenderSettings::default().cascade_splits
        );
    }
}
