//! Configuration and theme management for padterm.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.padterm/config.toml`
//! - Built-in themes (Classic, Midnight, Arcade, Paper)
//! - Grid geometry derived from the display size and font size
//!
//! # Configuration File
//!
//! ```toml
//! theme = "Midnight"
//! shell = "/bin/bash"
//!
//! [display]
//! font_size = 16
//! show_keyboard = true
//!
//! [input]
//! combo_grace_ticks = 3
//!
//! [keymap.pty]
//! "L1+R1" = "ctrl_l"
//!
//! [programs]
//! mc = "full_screen"
//! python3 = "line"
//! ```
//!
//! The file is read once at startup. Changes need an explicit reload.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::input::buttons::default_button_indices;
use crate::input::keymap::KeymapOverrides;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not determine home directory")]
    NoHome,
}

/// How a program is run when dispatched from the shell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramKind {
    /// Takes over the screen; input passes straight through
    FullScreen,
    /// Output is appended below the prompt
    Line,
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Theme name
    pub theme: String,
    /// Mirror copies into the host clipboard
    pub system_clipboard: bool,
    /// Shell used to run commands
    pub shell: String,
    /// TERM advertised to children
    pub term: String,
    pub max_input_length: usize,
    pub max_history: usize,
    pub scrollback_lines: usize,
    pub display: DisplayConfig,
    pub input: InputConfig,
    /// Logical button name -> raw controller index
    pub buttons: BTreeMap<String, u8>,
    /// Per-context layout overrides
    pub keymap: KeymapOverrides,
    /// Program classification, merged over the built-in list
    pub programs: HashMap<String, ProgramKind>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            theme: "Classic".to_string(),
            system_clipboard: false,
            shell: "/bin/bash".to_string(),
            term: "xterm-256color".to_string(),
            max_input_length: 2500,
            max_history: 100,
            scrollback_lines: 1000,
            display: DisplayConfig::default(),
            input: InputConfig::default(),
            buttons: default_button_indices(),
            keymap: KeymapOverrides::new(),
            programs: HashMap::new(),
        }
    }
}

/// Display configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Window size in pixels
    pub width: u32,
    pub height: u32,
    pub font_size: u16,
    /// Sizes the menu cycles through
    pub font_sizes: Vec<u16>,
    pub show_keyboard: bool,
    pub show_header: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            font_size: 14,
            font_sizes: vec![10, 12, 14, 16, 18, 20],
            show_keyboard: true,
            show_header: true,
        }
    }
}

impl DisplayConfig {
    /// Pixel size of one character cell for a monospace font
    pub fn cell_size(font_size: u16) -> (u32, u32) {
        let fs = u32::from(font_size.max(1));
        // ceil(fs * 0.6), ceil(fs * 1.25)
        ((fs * 6 + 9) / 10, (fs * 5 + 3) / 4)
    }

    /// Whole-window character grid as (rows, cols)
    pub fn char_grid(&self, font_size: u16) -> (u16, u16) {
        let (cw, ch) = Self::cell_size(font_size);
        let rows = (self.height / ch).clamp(1, u32::from(u16::MAX));
        let cols = (self.width / cw).clamp(1, u32::from(u16::MAX));
        (rows as u16, cols as u16)
    }

    /// Next entry of `font_sizes` after the current size
    pub fn next_font_size(&self, current: u16, step: i32) -> u16 {
        if self.font_sizes.is_empty() {
            return current;
        }
        let len = self.font_sizes.len() as i32;
        let idx = self
            .font_sizes
            .iter()
            .position(|&s| s == current)
            .map(|i| (i as i32 + step).rem_euclid(len))
            .unwrap_or(0);
        self.font_sizes[idx as usize]
    }
}

/// Controller timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Ticks a chord member waits for its partner
    pub combo_grace_ticks: u32,
    pub repeat_delay_ms: u64,
    pub repeat_rate_start_ms: u64,
    pub repeat_rate_min_ms: u64,
    /// Time over which the repeat interval shrinks to the minimum
    pub repeat_accel_ms: u64,
    /// Stick deflection that counts as a D-Pad press
    pub axis_threshold: i16,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            combo_grace_ticks: 3,
            repeat_delay_ms: 400,
            repeat_rate_start_ms: 180,
            repeat_rate_min_ms: 50,
            repeat_accel_ms: 1200,
            axis_threshold: 16384,
        }
    }
}

impl Config {
    /// Load the user's configuration, falling back to defaults
    pub fn load() -> Self {
        let path = match Self::default_path() {
            Ok(path) => path,
            Err(err) => {
                tracing::warn!("{}; using default configuration", err);
                return Self::default();
            }
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("{}; using default configuration", err);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&content)?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::default_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `~/.padterm/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// `~/.padterm`
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        home_dir()
            .map(|home| home.join(".padterm"))
            .ok_or(ConfigError::NoHome)
    }

    pub fn get_theme(&self) -> Theme {
        Theme::by_name(&self.theme)
    }
}

/// Color definition (RGB)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to crossterm Color
    pub fn to_crossterm(self) -> crossterm::style::Color {
        crossterm::style::Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Theme definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub name: &'static str,
    pub background: Rgb,
    pub header: Rgb,
    pub input_bg: Rgb,
    pub input_text: Rgb,
    pub input_counter: Rgb,
    pub output_text: Rgb,
    pub output_error: Rgb,
    pub output_system: Rgb,
    pub output_prompt: Rgb,
    pub keyboard_key: Rgb,
    pub keyboard_selected: Rgb,
    pub keyboard_locked: Rgb,
    pub keyboard_text: Rgb,
    pub help_text: Rgb,
    pub selection_bg: Rgb,
}

impl Default for Theme {
    fn default() -> Self {
        Self::classic()
    }
}

impl Theme {
    pub const NAMES: [&'static str; 4] = ["Classic", "Midnight", "Arcade", "Paper"];

    pub fn classic() -> Self {
        Self {
            name: "Classic",
            background: Rgb::new(20, 20, 30),
            header: Rgb::new(100, 200, 255),
            input_bg: Rgb::new(40, 40, 50),
            input_text: Rgb::new(0, 255, 0),
            input_counter: Rgb::new(150, 150, 150),
            output_text: Rgb::new(200, 200, 200),
            output_error: Rgb::new(255, 100, 100),
            output_system: Rgb::new(100, 200, 255),
            output_prompt: Rgb::new(100, 255, 100),
            keyboard_key: Rgb::new(60, 60, 70),
            keyboard_selected: Rgb::new(70, 130, 180),
            keyboard_locked: Rgb::new(50, 120, 255),
            keyboard_text: Rgb::new(220, 220, 220),
            help_text: Rgb::new(100, 100, 100),
            selection_bg: Rgb::new(70, 130, 180),
        }
    }

    pub fn midnight() -> Self {
        Self {
            name: "Midnight",
            background: Rgb::new(10, 15, 25),
            header: Rgb::new(130, 180, 255),
            input_bg: Rgb::new(30, 35, 50),
            input_text: Rgb::new(120, 255, 200),
            input_counter: Rgb::new(120, 140, 170),
            output_text: Rgb::new(210, 220, 230),
            output_error: Rgb::new(255, 120, 120),
            output_system: Rgb::new(120, 190, 255),
            output_prompt: Rgb::new(120, 255, 170),
            keyboard_key: Rgb::new(45, 50, 70),
            keyboard_selected: Rgb::new(90, 140, 210),
            keyboard_locked: Rgb::new(70, 130, 230),
            keyboard_text: Rgb::new(225, 230, 240),
            help_text: Rgb::new(140, 160, 190),
            selection_bg: Rgb::new(90, 140, 210),
        }
    }

    pub fn arcade() -> Self {
        Self {
            name: "Arcade",
            background: Rgb::new(15, 10, 20),
            header: Rgb::new(255, 170, 80),
            input_bg: Rgb::new(50, 20, 70),
            input_text: Rgb::new(255, 230, 120),
            input_counter: Rgb::new(200, 170, 150),
            output_text: Rgb::new(235, 220, 240),
            output_error: Rgb::new(255, 110, 150),
            output_system: Rgb::new(255, 180, 90),
            output_prompt: Rgb::new(140, 255, 180),
            keyboard_key: Rgb::new(70, 40, 90),
            keyboard_selected: Rgb::new(255, 120, 80),
            keyboard_locked: Rgb::new(255, 160, 100),
            keyboard_text: Rgb::new(255, 240, 220),
            help_text: Rgb::new(190, 170, 200),
            selection_bg: Rgb::new(255, 120, 80),
        }
    }

    pub fn paper() -> Self {
        Self {
            name: "Paper",
            background: Rgb::new(235, 236, 240),
            header: Rgb::new(40, 60, 90),
            input_bg: Rgb::new(220, 222, 228),
            input_text: Rgb::new(20, 70, 40),
            input_counter: Rgb::new(90, 100, 120),
            output_text: Rgb::new(40, 50, 70),
            output_error: Rgb::new(180, 60, 60),
            output_system: Rgb::new(40, 80, 130),
            output_prompt: Rgb::new(20, 120, 60),
            keyboard_key: Rgb::new(210, 212, 218),
            keyboard_selected: Rgb::new(120, 160, 210),
            keyboard_locked: Rgb::new(110, 150, 200),
            keyboard_text: Rgb::new(40, 50, 70),
            help_text: Rgb::new(90, 100, 120),
            selection_bg: Rgb::new(120, 160, 210),
        }
    }

    /// Get theme by name; unknown names fall back to Classic
    pub fn by_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "midnight" => Self::midnight(),
            "arcade" => Self::arcade(),
            "paper" => Self::paper(),
            _ => Self::classic(),
        }
    }

    /// Theme `step` places after this one, wrapping
    pub fn cycle(&self, step: i32) -> Self {
        let len = Self::NAMES.len() as i32;
        let idx = Self::NAMES
            .iter()
            .position(|n| *n == self.name)
            .unwrap_or(0) as i32;
        Self::by_name(Self::NAMES[(idx + step).rem_euclid(len) as usize])
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.shell, "/bin/bash");
        assert_eq!(parsed.buttons.get("GUIDE"), Some(&16));
        assert_eq!(parsed.display, config.display);
        assert_eq!(parsed.input, config.input);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let text = r#"
            theme = "Paper"

            [display]
            font_size = 20

            [keymap.pty]
            "L1+R1" = "ctrl_l"

            [programs]
            mc = "full_screen"
            python3 = "line"
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.get_theme().name, "Paper");
        assert_eq!(config.display.font_size, 20);
        assert_eq!(config.display.width, 640);
        assert_eq!(config.max_history, 100);
        assert_eq!(config.programs.get("mc"), Some(&ProgramKind::FullScreen));
        assert_eq!(config.keymap["pty"]["L1+R1"], "ctrl_l");
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "theme = [").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
        assert!(matches!(
            Config::load_from(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.theme = "Arcade".to_string();
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().theme, "Arcade");
    }

    #[test]
    fn test_cell_geometry() {
        assert_eq!(DisplayConfig::cell_size(14), (9, 18));
        assert_eq!(DisplayConfig::cell_size(10), (6, 13));
        let display = DisplayConfig::default();
        assert_eq!(display.char_grid(14), (26, 71));
        assert_eq!(display.next_font_size(14, 1), 16);
        assert_eq!(display.next_font_size(20, 1), 10);
        assert_eq!(display.next_font_size(13, 1), 10);
    }

    #[test]
    fn test_theme_cycle() {
        assert_eq!(Theme::classic().cycle(1).name, "Midnight");
        assert_eq!(Theme::classic().cycle(-1).name, "Paper");
        assert_eq!(Theme::by_name("nope").name, "Classic");
    }
}
