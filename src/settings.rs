use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use log::{debug, info, warn, error};

use crate::config::{self, Limits};
use crate::error::{AtlasError, Result};

/// Atlas settings that persist across sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasSettings {
    /// Edge length of one square atlas layer in texels
    #[serde(default = "default_texture_size")]
    pub texture_size: u32,

    /// Number of layers in the atlas texture array
    #[serde(default = "default_texture_array_layers")]
    pub texture_array_layers: u32,

    /// Default crop policy for bundles registered by the host
    #[serde(default)]
    pub crop_transparent_pixels: bool,
}

fn default_texture_size() -> u32 {
    config::DEFAULT_TEXTURE_SIZE
}

fn default_texture_array_layers() -> u32 {
    config::DEFAULT_TEXTURE_ARRAY_LAYERS
}

impl Default for AtlasSettings {
    fn default() -> Self {
        Self {
            texture_size: default_texture_size(),
            texture_array_layers: default_texture_array_layers(),
            crop_transparent_pixels: false,
        }
    }
}

impl AtlasSettings {
    /// Get the path to the settings file
    /// On macOS: ~/Library/Application Support/atlasforge/settings.yaml
    /// On Linux: ~/.config/atlasforge/settings.yaml
    /// On Windows: C:\Users\<user>\AppData\Roaming\atlasforge\settings.yaml
    pub fn settings_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."));

        config_dir.join("atlasforge").join("settings.yaml")
    }

    /// Load settings from the YAML file
    /// If custom_path is provided, uses that path; otherwise uses the default settings path
    pub fn load(custom_path: Option<&Path>) -> Self {
        let path = match custom_path {
            Some(p) => {
                info!("Using custom settings path: {}", p.display());
                p.to_path_buf()
            }
            None => Self::settings_path(),
        };

        if !path.exists() {
            info!("Settings file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_yaml(&contents) {
                Ok(settings) => {
                    info!("Loaded settings from {:?}", path);
                    debug!("Settings: {:?}", settings);
                    settings
                }
                Err(e) => {
                    error!("Failed to parse settings file at {:?}: {}", path, e);
                    warn!("Using default settings");
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read settings file at {:?}: {}", path, e);
                warn!("Using default settings");
                Self::default()
            }
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).map_err(|e| AtlasError::Settings(e.to_string()))
    }

    /// Save settings to `path`, or the default location
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::settings_path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AtlasError::Settings(format!("Failed to create settings directory: {}", e)))?;
        }

        fs::write(&path, self.to_yaml_with_comments())
            .map_err(|e| AtlasError::Settings(format!("Failed to write settings file: {}", e)))?;

        info!("Saved settings to {:?}", path);
        Ok(path)
    }

    /// Generate YAML content with comments
    fn to_yaml_with_comments(&self) -> String {
        format!(
            r#"# atlasforge settings
# Values here override the built-in defaults.

# Edge length of one square atlas layer in texels.
# Images larger than this are split into tiles.
texture_size: {}

# Number of layers in the atlas texture array.
# Loads that need more layers fail with AtlasCapacityExceeded.
texture_array_layers: {}

# Trim fully transparent borders before packing
crop_transparent_pixels: {}
"#,
            self.texture_size,
            self.texture_array_layers,
            self.crop_transparent_pixels
        )
    }

    /// Runtime limits for an `AssetStore`. Zero values fall back to the defaults.
    pub fn limits(&self) -> Limits {
        let texture_size = if self.texture_size == 0 {
            warn!("texture_size of 0 is invalid, using {}", config::DEFAULT_TEXTURE_SIZE);
            config::DEFAULT_TEXTURE_SIZE
        } else {
            self.texture_size
        };
        let texture_array_layers = if self.texture_array_layers == 0 {
            warn!("texture_array_layers of 0 is invalid, using {}", config::DEFAULT_TEXTURE_ARRAY_LAYERS);
            config::DEFAULT_TEXTURE_ARRAY_LAYERS
        } else {
            self.texture_array_layers
        };
        Limits::new(texture_size, texture_array_layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings = AtlasSettings::from_yaml("texture_size: 2048\n").unwrap();
        assert_eq!(settings.texture_size, 2048);
        assert_eq!(settings.texture_array_layers, config::DEFAULT_TEXTURE_ARRAY_LAYERS);
        assert!(!settings.crop_transparent_pixels);
        assert_eq!(settings.limits(), Limits::new(2048, config::DEFAULT_TEXTURE_ARRAY_LAYERS));
    }

    #[test]
    fn test_zero_limits_fall_back() {
        let settings = AtlasSettings {
            texture_size: 0,
            texture_array_layers: 0,
            crop_transparent_pixels: true,
        };
        assert_eq!(settings.limits(), Limits::default());
    }

    #[test]
    fn test_saved_file_loads_back() {
        let dir = std::env::temp_dir().join(format!("atlasforge-settings-{}", std::process::id()));
        let path = dir.join("settings.yaml");
        let settings = AtlasSettings {
            texture_size: 512,
            texture_array_layers: 8,
            crop_transparent_pixels: true,
        };

        settings.save(Some(&path)).unwrap();
        assert_eq!(AtlasSettings::load(Some(&path)), settings);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_unreadable_file_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("atlasforge-bad-settings-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.yaml");
        fs::write(&path, "texture_size: [not, a, number]").unwrap();

        assert_eq!(AtlasSettings::load(Some(&path)), AtlasSettings::default());
        assert!(AtlasSettings::from_yaml("texture_size: [1]").is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
