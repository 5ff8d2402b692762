// Example runner for the `laser_receiver` library: feeds still images through a
// receiver session in order, as if they were consecutive camera frames.

use anyhow::Context;
use clap::Parser;
use laser_receiver::core_modules::settings::DetectionSettings;
use laser_receiver::core_modules::utils::image_helper;
use laser_receiver::pipeline::{PipelineConfig, ReceiverPipeline};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Run still frames through a laser receiver session")]
struct Args {
    /// Settings record (flat camelCase JSON). Defaults are used when omitted.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Write each frame back as PNG with the scan band and tracked row drawn in
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Frames, processed in the order given
    #[arg(required = true)]
    frames: Vec<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // --- 1. Settings ---
    let args = Args::parse();
    let settings = match &args.settings {
        Some(path) => {
            DetectionSettings::load(path).with_context(|| format!("loading settings from {}", path.display()))?
        }
        None => DetectionSettings::default(),
    };

    // --- 2. Session Setup ---
    let mut pipeline = ReceiverPipeline::with_settings(PipelineConfig::default(), settings);

    // --- 3. Frame Loop ---
    for path in &args.frames {
        let frame = image_helper::load_frame(path).with_context(|| format!("loading frame {}", path.display()))?;
        let report = pipeline.process_frame(&frame);

        log::info!(
            "{}: sample {:?} -> {} (ratio {:.3}), audio {:?}{}",
            path.display(),
            report.sample(),
            report.state(),
            report.ratio(),
            report.directive.audio,
            if report.directive.visual.flash { ", flash" } else { "" }
        );

        if let Some(dir) = &args.overlay {
            let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("frame");
            let out = dir.join(format!("{}_overlay.png", name));
            let annotated = image_helper::annotate(&frame, &report.sampling, report.update.smoothed_y);
            image_helper::save_frame(&out, &annotated).with_context(|| format!("writing {}", out.display()))?;
        }
    }

    pipeline.stop();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_frames() {
        let args = Args::try_parse_from(["laser_receiver", "--settings", "s.json", "--overlay", "out", "a.png", "b.png"])
            .unwrap();
        assert_eq!(args.settings, Some(PathBuf::from("s.json")));
        assert_eq!(args.overlay, Some(PathBuf::from("out")));
        assert_eq!(args.frames, vec![PathBuf::from("a.png"), PathBuf::from("b.png")]);
    }

    #[test]
    fn settings_is_never_taken_from_positionals() {
        let args = Args::try_parse_from(["laser_receiver", "config.json", "a.png"]).unwrap();
        assert_eq!(args.settings, None);
        assert_eq!(args.frames.len(), 2);
        assert!(Args::try_parse_from(["laser_receiver"]).is_err());
    }
}
