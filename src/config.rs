use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub chart: ChartConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub data_csv: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChartConfig {
    pub width: u32,
    pub height: u32,
    pub margin: Margin,
    pub bar_color: String, // Hex code
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 960,
            height: 600,
            margin: Margin::default(),
            bar_color: "#3498db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Margin {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl Default for Margin {
    fn default() -> Self {
        Self { top: 40, right: 20, bottom: 100, left: 100 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: u8,
    pub tile_url: String,
    pub attribution: String,
    pub width: u32,
    pub height: u32,
    pub resize_delay_ms: u64,
    pub marker: MarkerStyle,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center_lat: 49.28,
            center_lon: -123.12,
            zoom: 13,
            tile_url: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png".to_string(),
            attribution: "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors".to_string(),
            width: 960,
            height: 600,
            resize_delay_ms: 200,
            marker: MarkerStyle::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MarkerStyle {
    pub radius: u32,
    pub color: String,
    pub fill_color: String,
    pub fill_opacity: f64,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            radius: 4,
            color: "orange".to_string(),
            fill_color: "orange".to_string(),
            fill_opacity: 0.7,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub min_zoom: u8,
    pub max_zoom: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("output"), min_zoom: 11, max_zoom: 15 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000, static_dir: PathBuf::from(".") }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}
