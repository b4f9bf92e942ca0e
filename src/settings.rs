//! Settings management for the dome viewer
//!
//! Handles loading/saving of the viewer's XML settings file.

use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cubemap::{DisplacementModel, SampleMode, StereoMode, DEFAULT_SPHERE_RADIUS};

/// Environment variable overriding the settings file location
pub const SETTINGS_ENV: &str = "OMNI_SETTINGS";

/// Environment variable overriding the calibration file location
pub const CALIBRATION_ENV: &str = "OMNI_CALIBRATION";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::DeError),

    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::SeError),

    #[error("Could not find config directory")]
    NoConfigDir,
}

/// Viewer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "OmniRenderSettings")]
pub struct RenderSettings {
    #[serde(rename = "windowTitle", default = "default_window_title")]
    pub window_title: String,

    #[serde(rename = "windowWidth", default = "default_window_width")]
    pub window_width: u32,

    #[serde(rename = "windowHeight", default = "default_window_height")]
    pub window_height: u32,

    #[serde(rename = "vsyncEnabled", default = "default_true")]
    pub vsync_enabled: bool,

    /// Borderless fullscreen on the current monitor
    #[serde(rename = "fullscreen", default)]
    pub fullscreen: bool,

    /// Edge length of each cubemap face in pixels
    #[serde(rename = "cubeResolution", default = "default_cube_resolution")]
    pub cube_resolution: u32,

    #[serde(rename = "near", default = "default_near")]
    pub near: f32,

    #[serde(rename = "far", default = "default_far")]
    pub far: f32,

    /// Projection sphere radius in scene units
    #[serde(rename = "sphereRadius", default = "default_sphere_radius")]
    pub sphere_radius: f32,

    /// Full interocular distance; each eye is offset by half
    #[serde(rename = "eyeSeparation", default = "default_eye_separation")]
    pub eye_separation: f32,

    /// Focal length for flat-screen stereo
    #[serde(rename = "focalLength", default = "default_focal_length")]
    pub focal_length: f32,

    #[serde(rename = "stereoMode", default)]
    pub stereo_mode: StereoMode,

    #[serde(rename = "displacementModel", default)]
    pub displacement_model: DisplacementModel,

    /// Calibration file listing projectors and warp maps
    #[serde(rename = "calibrationFile", default, skip_serializing_if = "Option::is_none")]
    pub calibration_file: Option<String>,

    /// Directory of per-node calibrations named `<hostname>.txt`
    #[serde(rename = "calibrationDirectory", default, skip_serializing_if = "Option::is_none")]
    pub calibration_directory: Option<String>,

    #[serde(rename = "sampleMode", default)]
    pub sample_mode: SampleMode,

    /// Multiply output by the warp map's blend weight
    #[serde(rename = "applyBlend", default)]
    pub apply_blend: bool,

    /// Directory for F12 frame captures
    #[serde(rename = "captureDirectory", default = "default_capture_directory")]
    pub capture_directory: String,
}

fn default_window_title() -> String {
    "omni-render".to_string()
}

fn default_window_width() -> u32 {
    640
}

fn default_window_height() -> u32 {
    480
}

fn default_true() -> bool {
    true
}

fn default_cube_resolution() -> u32 {
    1024
}

fn default_near() -> f32 {
    0.1
}

fn default_far() -> f32 {
    100.0
}

fn default_sphere_radius() -> f32 {
    DEFAULT_SPHERE_RADIUS
}

fn default_eye_separation() -> f32 {
    0.064
}

fn default_focal_length() -> f32 {
    10.0
}

fn default_capture_directory() -> String {
    "captures".to_string()
}

/// Node name used when the hostname cannot be read
pub const DEFAULT_NODE_NAME: &str = "config";

/// Per-node calibration file inside `dir`
pub fn calibration_file_for_host(dir: &Path, host: &str) -> PathBuf {
    // Strip the domain so node01.cluster.local finds node01.txt
    let node = host.split('.').next().unwrap_or(host).trim();
    dir.join(format!("{}.txt", node))
}

/// Hostname of this render node
pub fn local_hostname() -> Option<String> {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.trim().is_empty())
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            window_title: default_window_title(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            vsync_enabled: true,
            fullscreen: false,
            cube_resolution: default_cube_resolution(),
            near: default_near(),
            far: default_far(),
            sphere_radius: default_sphere_radius(),
            eye_separation: default_eye_separation(),
            focal_length: default_focal_length(),
            stereo_mode: StereoMode::default(),
            displacement_model: DisplacementModel::default(),
            calibration_file: None,
            calibration_directory: None,
            sample_mode: SampleMode::default(),
            apply_blend: false,
            capture_directory: default_capture_directory(),
        }
    }
}

impl RenderSettings {
    /// Get the settings file path (`OMNI_SETTINGS` or the config directory)
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(SETTINGS_ENV).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|mut p| {
            p.push("omni-render");
            p.push("settings.xml");
            p
        })
    }

    /// Load settings from an XML file
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        let mut settings: Self = from_str(&contents)?;
        settings.sanitize();
        Ok(settings)
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };

        if !path.exists() {
            tracing::debug!("No settings at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(settings) => {
                tracing::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                tracing::warn!("Failed to load settings from {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save settings to an XML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let xml = to_string(self)?;
        let formatted = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml);

        fs::write(path, formatted)?;
        Ok(())
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::default_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to_file(&path)
    }

    /// Calibration file to load
    ///
    /// `OMNI_CALIBRATION` wins, then `calibrationFile`, then this node's
    /// file in `calibrationDirectory`.
    pub fn calibration_path(&self) -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CALIBRATION_ENV).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        if let Some(file) = &self.calibration_file {
            return Some(PathBuf::from(file));
        }
        let dir = self.calibration_directory.as_ref()?;
        let host = local_hostname().unwrap_or_else(|| {
            tracing::warn!("Could not read hostname, using {}.txt", DEFAULT_NODE_NAME);
            DEFAULT_NODE_NAME.to_string()
        });
        Some(calibration_file_for_host(Path::new(dir), &host))
    }

    /// Ensure sane values after loading
    pub fn sanitize(&mut self) {
        self.window_width = self.window_width.max(1);
        self.window_height = self.window_height.max(1);
        self.cube_resolution = self.cube_resolution.clamp(16, 8192);
        if !(self.near > 0.0) {
            self.near = default_near();
        }
        if !(self.far > self.near) {
            self.far = self.near * 1000.0;
        }
        if !(self.sphere_radius > 0.0) {
            self.sphere_radius = default_sphere_radius();
        }
        if !self.eye_separation.is_finite() {
            self.eye_separation = default_eye_separation();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = RenderSettings::default();
        assert_eq!(settings.cube_resolution, 1024);
        assert_eq!(settings.near, 0.1);
        assert_eq!(settings.far, 100.0);
        assert_eq!(settings.sphere_radius, 1e10);
        assert_eq!(settings.stereo_mode, StereoMode::Mono);
        assert_eq!(settings.displacement_model, DisplacementModel::ClosedForm);
        assert!(settings.calibration_file.is_none());
    }

    #[test]
    fn test_settings_round_trip() {
        let path = std::env::temp_dir().join("omni_render_settings_round_trip.xml");

        let mut settings = RenderSettings::default();
        settings.window_title = "dome".to_string();
        settings.cube_resolution = 2048;
        settings.stereo_mode = StereoMode::Stereo;
        settings.displacement_model = DisplacementModel::SphereIntersection;
        settings.sample_mode = SampleMode::Equirect;
        settings.apply_blend = true;
        settings.calibration_file = Some("data/config.txt".to_string());
        settings.calibration_directory = Some("data/nodes".to_string());
        settings.fullscreen = true;

        settings.save_to_file(&path).unwrap();
        let loaded = RenderSettings::load_from_file(&path).unwrap();
        assert_eq!(loaded, settings);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let xml = r#"<OmniRenderSettings><cubeResolution>512</cubeResolution></OmniRenderSettings>"#;
        let settings: RenderSettings = from_str(xml).unwrap();
        assert_eq!(settings.cube_resolution, 512);
        assert_eq!(settings.window_width, 640);
        assert_eq!(settings.far, 100.0);
        assert!(settings.vsync_enabled);
    }

    #[test]
    fn test_sanitize() {
        let mut settings = RenderSettings {
            cube_resolution: 1,
            near: -1.0,
            far: 0.0,
            sphere_radius: 0.0,
            ..Default::default()
        };
        settings.sanitize();
        assert_eq!(settings.cube_resolution, 16);
        assert_eq!(settings.near, 0.1);
        assert!(settings.far > settings.near);
        assert_eq!(settings.sphere_radius, DEFAULT_SPHERE_RADIUS);
    }

    #[test]
    fn test_calibration_file_for_host() {
        let dir = std::env::temp_dir().join("omni_render_nodes");
        assert_eq!(calibration_file_for_host(&dir, "node03"), dir.join("node03.txt"));
        assert_eq!(
            calibration_file_for_host(&dir, "node03.dome.local"),
            dir.join("node03.txt")
        );
    }

    #[test]
    fn test_calibration_file_wins_over_directory() {
        if std::env::var_os(CALIBRATION_ENV).is_some() {
            return;
        }
        let settings = RenderSettings {
            calibration_file: Some("single.txt".to_string()),
            calibration_directory: Some("nodes".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.calibration_path(), Some(PathBuf::from("single.txt")));
    }

    #[test]
    fn test_calibration_directory_uses_hostname() {
        if std::env::var_os(CALIBRATION_ENV).is_some() {
            return;
        }
        let host = local_hostname().unwrap_or_else(|| DEFAULT_NODE_NAME.to_string());
        let dir = std::env::temp_dir().join("omni_render_node_calibrations");
        let settings = RenderSettings {
            calibration_directory: Some(dir.to_string_lossy().into_owned()),
            ..Default::default()
        };
        assert_eq!(
            settings.calibration_path(),
            Some(calibration_file_for_host(&dir, &host))
        );
    }

    #[test]
    fn test_fullscreen_setting() {
        let xml = r#"<OmniRenderSettings><fullscreen>true</fullscreen></OmniRenderSettings>"#;
        let settings: RenderSettings = from_str(xml).unwrap();
        assert!(settings.fullscreen);
        assert!(!RenderSettings::default().fullscreen);
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("omni_render_no_such_settings.xml");
        assert!(matches!(
            RenderSettings::load_from_file(&path),
            Err(SettingsError::Io(_))
        ));
    }
}
