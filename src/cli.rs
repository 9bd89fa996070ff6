use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::camera::Clock;
use crate::clouds_uniforms;
use crate::config::PipelineConfig;
use crate::gpu::context::{GpuContext, OffscreenTarget};
use crate::gpu::pipeline_driver::PipelineDriver;
use crate::quality::UndersamplingSettings;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render frames to disk
    Render {
        /// Output directory for frames
        #[arg(long)]
        out: PathBuf,

        /// Output width
        #[arg(long, default_value_t = 800)]
        width: u32,

        /// Output height
        #[arg(long, default_value_t = 600)]
        height: u32,

        /// Number of frames to render
        #[arg(long, default_value_t = 1)]
        frames: u32,

        /// Frames per second of the animation clock
        #[arg(long, default_value_t = 30.0)]
        fps: f32,

        /// Undersampling level (0 renders clouds at full resolution)
        #[arg(long)]
        undersampling: Option<u32>,

        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// PNG used for the detail noise instead of the generated one
        #[arg(long)]
        noise: Option<PathBuf>,

        /// Switch undersampling level before a frame, as FRAME:LEVEL (repeatable)
        #[arg(long = "switch-at", value_parser = parse_switch)]
        switch_at: Vec<(u32, u32)>,
    },
    /// Print the default parameter tables as JSON
    Params,
}

fn parse_switch(s: &str) -> Result<(u32, u32), String> {
    let (frame, level) = s
        .split_once(':')
        .ok_or_else(|| format!("expected FRAME:LEVEL, got '{}'", s))?;
    let frame = frame.trim().parse().map_err(|e| format!("bad frame '{}': {}", frame, e))?;
    let level = level.trim().parse().map_err(|e| format!("bad level '{}': {}", level, e))?;
    Ok((frame, level))
}

struct RenderArgs {
    out: PathBuf,
    width: u32,
    height: u32,
    frames: u32,
    fps: f32,
    switch_at: Vec<(u32, u32)>,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            out,
            width,
            height,
            frames,
            fps,
            undersampling,
            config,
            noise,
            switch_at,
        } => {
            let mut pipeline_config = match config {
                Some(path) => PipelineConfig::load(&path)?,
                None => PipelineConfig::default(),
            };
            if let Some(level) = undersampling {
                pipeline_config.undersampling = UndersamplingSettings {
                    level,
                    ..pipeline_config.undersampling
                };
            }
            if noise.is_some() {
                pipeline_config.noise_texture = noise;
            }
            let args = RenderArgs {
                out,
                width,
                height,
                frames,
                fps,
                switch_at,
            };
            render_offline(&pipeline_config, &args)?;
        }
        Commands::Params => print_params()?,
    }
    Ok(())
}

fn render_offline(config: &PipelineConfig, args: &RenderArgs) -> Result<()> {
    if args.fps <= 0.0 {
        anyhow::bail!("--fps must be positive, got {}", args.fps);
    }
    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("creating output directory {}", args.out.display()))?;

    let ctx = GpuContext::headless_blocking()?;
    let target = OffscreenTarget::new(&ctx.device, args.width, args.height);
    let (width, height) = target.size();
    let clock = Clock::fixed_step(1.0 / args.fps);
    let mut driver = PipelineDriver::new(ctx, config, OffscreenTarget::FORMAT, width, height, clock)?;

    println!("Rendering {} frames to {:?}...", args.frames, args.out);

    for i in 0..args.frames {
        for &(_, level) in args.switch_at.iter().filter(|(frame, _)| *frame == i) {
            if driver.set_undersampling_level(level)? {
                println!("\nframe {}: cloud quality {:?}", i, driver.quality());
            }
        }

        driver.render(target.view())?;
        let pixels = target.read_rgba8(driver.device(), driver.queue())?;

        let frame_path = args.out.join(format!("frame_{:05}.png", i));
        image::save_buffer(&frame_path, &pixels, width, height, image::ColorType::Rgba8)
            .with_context(|| format!("writing {}", frame_path.display()))?;

        driver.tick();

        if i % 60 == 0 {
            print!(".");
            use std::io::Write;
            std::io::stdout().flush()?;
        }
    }
    println!("\nDone.");

    Ok(())
}

fn print_params() -> Result<()> {
    let tables = serde_json::json!({
        "clouds": clouds_uniforms::direct_uniforms()?.to_json(),
        "clouds_low_res": clouds_uniforms::low_res_uniforms()?.to_json(),
        "clouds_merge": clouds_uniforms::merge_uniforms()?.to_json(),
        "antialias": clouds_uniforms::antialias_uniforms()?.to_json(),
    });
    println!("{}", serde_json::to_string_pretty(&tables)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_switch() {
        assert_eq!(parse_switch("12:3"), Ok((12, 3)));
        assert_eq!(parse_switch(" 0 : 0 "), Ok((0, 0)));
        assert!(parse_switch("12").is_err());
        assert!(parse_switch("a:1").is_err());
    }

    #[test]
    fn test_cli_parses_render() {
        let cli = Cli::try_parse_from([
            "cloudlayer",
            "render",
            "--out",
            "frames",
            "--frames",
            "4",
            "--switch-at",
            "2:0",
            "--switch-at",
            "3:4",
        ])
        .unwrap();
        match cli.command {
            Commands::Render { frames, switch_at, undersampling, .. } => {
                assert_eq!(frames, 4);
                assert_eq!(switch_at, vec![(2, 0), (3, 4)]);
                assert_eq!(undersampling, None);
            }
            Commands::Params => panic!("expected render"),
        }
    }
}
