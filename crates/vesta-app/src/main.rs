// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info};
use vesta_core::init_tracing;
use vesta_platform::PlatformWindow;
use vesta_render::{FrameStatus, RenderSize, Renderer};
use vesta_render_vk::VkRenderer;

mod config;

use config::{load_cfg, AppCfg};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file
    #[arg(long, default_value = "vesta.toml")]
    config: PathBuf,

    /// Enable the validation layer and debug messenger
    #[arg(long, overrides_with = "no_validation")]
    validation: bool,

    /// Disable the validation layer even in debug builds
    #[arg(long, overrides_with = "validation")]
    no_validation: bool,

    /// Directory holding vert.spv and frag.spv
    #[arg(long)]
    shader_dir: Option<PathBuf>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,
}

impl Args {
    fn apply(&self, cfg: &mut AppCfg) {
        if self.validation {
            cfg.render.validation = true;
        }
        if self.no_validation {
            cfg.render.validation = false;
        }
        if let Some(dir) = &self.shader_dir {
            cfg.render.shader_dir = dir.clone();
        }
        if let Some(w) = self.width {
            cfg.window.width = w;
        }
        if let Some(h) = self.height {
            cfg.window.height = h;
        }
    }
}

/// A paused renderer has nothing to draw until the window changes, so the
/// next pump sleeps until an event arrives.
fn pump_timeout(last: Option<FrameStatus>) -> Option<Duration> {
    match last {
        Some(FrameStatus::Paused) => None,
        _ => Some(Duration::ZERO),
    }
}

fn run(cfg: &AppCfg) -> Result<()> {
    let mut window = PlatformWindow::open(&cfg.window.title, cfg.window.width, cfg.window.height)
        .context("open window")?;
    let size = window.state().size;
    let mut renderer = VkRenderer::new(
        window.window(),
        window.window(),
        RenderSize {
            width: size.width,
            height: size.height,
        },
        &cfg.renderer(),
    )?;
    info!(
        "backend = vk, validation = {}, present_mode = {:?}",
        cfg.render.validation, cfg.render.present_mode
    );

    let mut last = None;
    loop {
        window.pump(pump_timeout(last));
        let state = *window.state();
        if !state.running {
            break;
        }
        if state.resized {
            renderer.resize(RenderSize {
                width: state.size.width,
                height: state.size.height,
            })?;
        }

        let start = Instant::now();
        let status = renderer.render()?;
        let dt = start.elapsed().as_secs_f64();
        last = Some(status);

        let fps_tick = cfg.log.fps_every != 0 && state.ticks % cfg.log.fps_every == 0;
        if fps_tick && status == FrameStatus::Presented {
            info!("fps: {:.1} ({:.3} ms)", 1.0 / dt.max(f64::EPSILON), dt * 1e3);
        }
    }

    info!("window closed after {} ticks", window.state().ticks);
    drop(renderer);
    drop(window);
    Ok(())
}

fn main() {
    init_tracing();
    let args = Args::parse();
    let mut cfg = load_cfg(&args.config);
    args.apply(&mut cfg);

    if let Err(e) = run(&cfg) {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
