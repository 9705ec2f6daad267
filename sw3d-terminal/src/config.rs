//! Command line configuration for the terminal demo
use std::path::PathBuf;

use crate::error::ConfigError;

pub const USAGE: &str = "\
Usage: sw3d-terminal [OPTIONS] [STL_FILE]

Renders STL_FILE (or a cube) as ASCII art.

Options:
  --stars <N>       Number of stars in the background field (default 0)
  --depth <N>       Depth of the star field in world units (default 1024)
  --fov <DEGREES>   Vertical field of view, below 180 (default 45)
  --fps <N>         Target frame rate (default 30)
  -h, --help        Print this help

Log output is controlled with RUST_LOG (default: warn).";

/// Runtime options of the terminal demo
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub stl_path: Option<PathBuf>,
    pub stars: usize,
    pub star_depth: u32,
    pub fov: f32,
    pub target_fps: u32,
    /// Distance from the camera to the model pivot
    pub camera_distance: f32,
    /// Height of a terminal cell relative to its width
    pub cell_aspect: f32,
    /// Model spin in degrees per second
    pub spin: [f32; 3],
    pub show_help: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            stl_path: None,
            stars: 0,
            star_depth: 1024,
            fov: 45.0,
            target_fps: 30,
            camera_distance: 4.0,
            cell_aspect: 2.0,
            spin: [17.0, 26.0, 0.0],
            show_help: false,
        }
    }
}

impl AppConfig {
    /// Parse arguments, program name excluded
    pub fn from_args<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Self::default();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => config.show_help = true,
                "--stars" => config.stars = parse_value(&arg, args.next())?,
                "--depth" => config.star_depth = parse_value(&arg, args.next())?,
                "--fov" => {
                    let value = args
                        .next()
                        .ok_or_else(|| ConfigError::MissingValue(arg.clone()))?;
                    config.fov = parse_value(&arg, Some(value.clone()))?;
                    if !(config.fov > 0.0 && config.fov < 180.0) {
                        return Err(ConfigError::InvalidValue { flag: arg, value });
                    }
                }
                "--fps" => {
                    config.target_fps = parse_value(&arg, args.next())?;
                    if config.target_fps == 0 {
                        return Err(ConfigError::InvalidValue {
                            flag: arg,
                            value: "0".into(),
                        });
                    }
                }
                flag if flag.starts_with('-') => return Err(ConfigError::UnknownFlag(arg)),
                _ if config.stl_path.is_none() => config.stl_path = Some(PathBuf::from(arg)),
                _ => return Err(ConfigError::UnexpectedArgument(arg)),
            }
        }

        Ok(config)
    }
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::MissingValue(flag.to_string()))?;
    value.parse().map_err(|_| ConfigError::InvalidValue {
        flag: flag.to_string(),
        value,
    })
}
