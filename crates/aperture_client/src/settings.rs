use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const SETTINGS_PATH: &str = "aperture_settings.toml";

const MIN_MOUSE_SENSITIVITY: f32 = 0.5;
const MAX_MOUSE_SENSITIVITY: f32 = 5.0;
const MIN_FOV: f32 = 40.0;
const MAX_FOV: f32 = 110.0;
const MIN_MOVE_SPEED: f32 = 0.5;
const MAX_MOVE_SPEED: f32 = 30.0;
const MIN_PORTAL_TEXTURE_SCALE: f32 = 0.25;
const MAX_PORTAL_TEXTURE_SCALE: f32 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_mouse_sensitivity")]
    pub mouse_sensitivity: f32,
    #[serde(default = "default_fov")]
    pub fov: f32,
    #[serde(default = "default_move_speed")]
    pub move_speed: f32,
    /// Portal render targets are this fraction of the window height.
    #[serde(default = "default_portal_texture_scale")]
    pub portal_texture_scale: f32,
    #[serde(default = "default_true")]
    pub vsync: bool,
    #[serde(default = "default_true")]
    pub show_fps: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            mouse_sensitivity: default_mouse_sensitivity(),
            fov: default_fov(),
            move_speed: default_move_speed(),
            portal_texture_scale: default_portal_texture_scale(),
            vsync: true,
            show_fps: true,
        }
    }
}

/// Why the settings file could not be used.
#[derive(Debug)]
pub enum SettingsError {
    Io(io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Parse(err) => write!(f, "invalid settings: {err}"),
            Self::Serialize(err) => write!(f, "could not encode settings: {err}"),
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<io::Error> for SettingsError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// Clamps into `min..=max`; NaN and infinities fall back to `default`.
fn bounded(value: f32, min: f32, max: f32, default: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        default
    }
}

impl ClientSettings {
    pub fn sanitize(mut self) -> Self {
        self.mouse_sensitivity = bounded(
            self.mouse_sensitivity,
            MIN_MOUSE_SENSITIVITY,
            MAX_MOUSE_SENSITIVITY,
            default_mouse_sensitivity(),
        );
        self.fov = bounded(self.fov, MIN_FOV, MAX_FOV, default_fov());
        self.move_speed = bounded(
            self.move_speed,
            MIN_MOVE_SPEED,
            MAX_MOVE_SPEED,
            default_move_speed(),
        );
        self.portal_texture_scale = bounded(
            self.portal_texture_scale,
            MIN_PORTAL_TEXTURE_SCALE,
            MAX_PORTAL_TEXTURE_SCALE,
            default_portal_texture_scale(),
        );
        self
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        let parsed: Self = toml::from_str(&contents).map_err(SettingsError::Parse)?;
        Ok(parsed.sanitize())
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let encoded =
            toml::to_string_pretty(&self.clone().sanitize()).map_err(SettingsError::Serialize)?;
        fs::write(path, encoded)?;
        Ok(())
    }
}

fn default_mouse_sensitivity() -> f32 {
    2.5
}

fn default_fov() -> f32 {
    70.0
}

fn default_move_speed() -> f32 {
    6.0
}

fn default_portal_texture_scale() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

/// Reads the settings at `path`. A missing or unusable file is replaced by defaults.
pub fn load_or_create_settings(path: &Path) -> ClientSettings {
    let err = match ClientSettings::load(path) {
        Ok(settings) => return settings,
        Err(err) => err,
    };
    match &err {
        SettingsError::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {
            info!("no settings at {}, writing defaults", path.display());
        }
        _ => warn!("ignoring settings at {}: {err}", path.display()),
    }

    let settings = ClientSettings::default();
    if let Err(save_err) = settings.save(path) {
        warn!("could not write settings to {}: {save_err}", path.display());
    }
    settings
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::{load_or_create_settings, ClientSettings};

    fn scratch_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "aperture_settings_{name}_{}.toml",
            std::process::id()
        ));
        let _ = fs::remove_file(&path);
        path
    }

    #[test]
    fn missing_fields_take_defaults() {
        let parsed: ClientSettings = toml::from_str("fov = 90.0").unwrap();
        assert_eq!(parsed.fov, 90.0);
        assert_eq!(parsed.mouse_sensitivity, 2.5);
        assert_eq!(parsed.portal_texture_scale, 1.0);
        assert!(parsed.vsync);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let settings = ClientSettings {
            mouse_sensitivity: 50.0,
            fov: 5.0,
            move_speed: -1.0,
            portal_texture_scale: 10.0,
            ..ClientSettings::default()
        }
        .sanitize();

        assert_eq!(settings.mouse_sensitivity, 5.0);
        assert_eq!(settings.fov, 40.0);
        assert_eq!(settings.move_speed, 0.5);
        assert_eq!(settings.portal_texture_scale, 2.0);
    }

    #[test]
    fn non_finite_values_fall_back_to_defaults() {
        let parsed: ClientSettings =
            toml::from_str("fov = nan\nmouse_sensitivity = inf\nmove_speed = -inf").unwrap();
        let settings = parsed.sanitize();

        assert_eq!(settings.fov, 70.0);
        assert_eq!(settings.mouse_sensitivity, 2.5);
        assert_eq!(settings.move_speed, 6.0);
    }

    #[test]
    fn nan_in_file_never_reaches_the_client() {
        let path = scratch_path("nan");
        fs::write(&path, "fov = nan\nportal_texture_scale = nan").unwrap();

        let settings = load_or_create_settings(&path);
        assert_eq!(settings.fov, 70.0);
        assert_eq!(settings.portal_texture_scale, 1.0);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let path = scratch_path("create");
        let settings = load_or_create_settings(&path);

        assert_eq!(settings, ClientSettings::default());
        assert!(path.exists());
        assert_eq!(ClientSettings::load(&path).unwrap(), settings);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn malformed_file_is_replaced_with_defaults() {
        let path = scratch_path("malformed");
        fs::write(&path, "fov = \"wide\"").unwrap();

        assert_eq!(load_or_create_settings(&path), ClientSettings::default());
        assert_eq!(ClientSettings::load(&path).unwrap(), ClientSettings::default());
        let _ = fs::remove_file(&path);
    }
}
