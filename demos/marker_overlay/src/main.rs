use std::io::Write;

use argh::FromArgs;
use fiducial_pose::{DecompositionMethod, Detection, LMParams, MarkerOverlay, PipelineConfig};
use serde::Serialize;

/// Estimates marker poses from per-frame corner detections and writes the
/// overlay geometry as JSON lines
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the pipeline configuration (JSON)
    #[argh(option, short = 'c')]
    config: String,

    /// path to the detections file: a JSON array of frames
    #[argh(option, short = 'd')]
    detections: String,

    /// override the decomposition method: normalized or svd_orthogonalized
    #[argh(option, short = 'm', from_str_fn(to_method))]
    method: Option<DecompositionMethod>,

    /// refine each pose by minimizing the corner reprojection error
    #[argh(switch, short = 'r')]
    refine: bool,
}

fn to_method(value: &str) -> Result<DecompositionMethod, String> {
    match value {
        "normalized" => Ok(DecompositionMethod::Normalized),
        "svd_orthogonalized" | "svd" => Ok(DecompositionMethod::SvdOrthogonalized),
        _ => Err(format!("unsupported decomposition method: {value}")),
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    frame: usize,
    markers: &'a [MarkerOverlay],
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = PipelineConfig::from_file(&args.config)?;
    if let Some(method) = args.method {
        config.method = method;
    }
    if args.refine && config.refine.is_none() {
        config.refine = Some(LMParams::default());
    }
    let estimator = config.build_estimator()?;
    log::info!(
        "using {:?} decomposition, refinement {}",
        estimator.method(),
        if estimator.refinement().is_some() { "on" } else { "off" }
    );

    let frames: Vec<Vec<Detection>> =
        serde_json::from_str(&std::fs::read_to_string(&args.detections)?)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut num_markers = 0;

    for (frame, detections) in frames.iter().enumerate() {
        let markers = estimator.process_frame(detections);
        num_markers += markers.len();
        serde_json::to_writer(&mut out, &FrameOutput { frame, markers: &markers })?;
        writeln!(out)?;
    }

    log::info!(
        "processed {} frames, {} markers posed",
        frames.len(),
        num_markers
    );
    Ok(())
}
