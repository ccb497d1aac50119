// =============================================================================
// CONFIGURATION - window, swapchain, renderer2d and debug settings
// =============================================================================
//
// Every section and field has a default, so a missing file or a partial file
// both produce a usable configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub renderer2d: Renderer2DConfig,
    pub debug: DebugConfig,
    pub controls: ControlsConfig,
}

/// Window settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "frameshell".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
            resizable: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentMode {
    Immediate,
    Mailbox,
    Fifo,
    FifoRelaxed,
}

/// Graphics settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: PresentMode,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
    /// Seconds of accumulated frame time between GPU garbage collections.
    pub gc_interval_secs: f32,
    pub shader_dir: PathBuf,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: PresentMode::Fifo,
            clear_color: [0.1, 0.1, 0.12, 1.0],
            max_frames_in_flight: 2,
            gc_interval_secs: 5.0,
            shader_dir: PathBuf::from("shaders"),
        }
    }
}

/// Batching renderer settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Renderer2DConfig {
    pub virtual_width: f32,
    pub virtual_height: f32,
    /// Triangle/quad instances per chunk.
    pub triangle_chunk_capacity: usize,
    /// Line vertices per chunk.
    pub line_chunk_capacity: usize,
    /// Ellipse shapes per chunk.
    pub ellipse_chunk_capacity: usize,
    /// Size of the bindless texture array; clamped to what the adapter allows.
    pub texture_array_size: u32,
    pub initial_texture_capacity: u32,
}

impl Default for Renderer2DConfig {
    fn default() -> Self {
        Self {
            virtual_width: 1920.0,
            virtual_height: 1080.0,
            triangle_chunk_capacity: 1 << 16,
            line_chunk_capacity: 1 << 16,
            ellipse_chunk_capacity: 1 << 14,
            texture_array_size: 1024,
            initial_texture_capacity: 256,
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "frameshell.log".to_string(),
            show_fps: true,
        }
    }
}

/// Control key bindings, named after winit's `KeyCode` variants
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub fullscreen_key: String,
    pub quit_key: String,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            fullscreen_key: "F11".to_string(),
            quit_key: "Escape".to_string(),
        }
    }
}

impl Config {
    pub const DEFAULT_PATH: &'static str = "config.toml";

    /// `config.toml` from the working directory. Read and parse failures are
    /// logged and replaced by the built-in settings.
    pub fn load() -> Self {
        match Self::load_from_path(Self::DEFAULT_PATH) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{e:#}; continuing with built-in settings");
                Self::default()
            }
        }
    }

    /// A missing file is not an error.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e).with_context(|| format!("cannot read {}", path.display())),
        };

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("invalid config in {}", path.display()))?;
        log::info!("Configuration loaded from {}", path.display());
        log::debug!("{config:#?}");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Frame slots in flight, kept inside the double/triple buffering range.
    pub fn frames_in_flight(&self) -> usize {
        self.graphics.max_frames_in_flight.clamp(2, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.graphics.present_mode, PresentMode::Fifo);
        assert_eq!(config.graphics.gc_interval_secs, 5.0);
        assert_eq!(config.controls.quit_key, "Escape");
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::from_toml_str(
            r#"
            [graphics]
            present_mode = "mailbox"
            max_frames_in_flight = 3

            [renderer2d]
            virtual_width = 800.0
            "#,
        )
        .unwrap();

        assert_eq!(config.graphics.present_mode, PresentMode::Mailbox);
        assert_eq!(config.frames_in_flight(), 3);
        assert_eq!(config.renderer2d.virtual_width, 800.0);
        assert_eq!(config.renderer2d.virtual_height, 1080.0);
    }

    #[test]
    fn frames_in_flight_is_clamped() {
        let mut config = Config::default();
        config.graphics.max_frames_in_flight = 1;
        assert_eq!(config.frames_in_flight(), 2);
        config.graphics.max_frames_in_flight = 8;
        assert_eq!(config.frames_in_flight(), 3);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let config = Config::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config.renderer2d.initial_texture_capacity, 256);
    }

    #[test]
    fn unknown_present_mode_is_rejected() {
        assert!(Config::from_toml_str("[graphics]\npresent_mode = \"vsync\"").is_err());
    }
}
