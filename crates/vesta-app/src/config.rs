// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use vesta_render::{PresentPreference, RendererConfig};

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "vesta".to_owned(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub validation: bool,
    pub present_mode: PresentPreference,
    pub shader_dir: PathBuf,
}

impl Default for RenderCfg {
    fn default() -> Self {
        let base = RendererConfig::default();
        RenderCfg {
            clear_color: base.clear_color,
            validation: cfg!(debug_assertions),
            present_mode: base.present_mode,
            shader_dir: base.shader_dir,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct LogCfg {
    /// Loop iterations between FPS lines; 0 disables them.
    pub fps_every: u64,
}

impl Default for LogCfg {
    fn default() -> Self {
        LogCfg { fps_every: 100 }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
    pub log: LogCfg,
}

impl AppCfg {
    pub fn renderer(&self) -> RendererConfig {
        RendererConfig {
            validation: self.render.validation,
            clear_color: self.render.clear_color,
            present_mode: self.render.present_mode,
            shader_dir: self.render.shader_dir.clone(),
        }
    }
}

pub fn parse_cfg(text: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str(text)
}

/// Missing file means defaults; a malformed one is reported and ignored.
pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match parse_cfg(&s) {
            Ok(cfg) => {
                info!("config: loaded {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("config: {} is malformed, using defaults: {e}", path.display());
                AppCfg::default()
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => AppCfg::default(),
        Err(e) => {
            warn!("config: cannot read {}: {e}; using defaults", path.display());
            AppCfg::default()
        }
    }
}
