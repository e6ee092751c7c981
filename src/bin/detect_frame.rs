//! detect_frame - run one image through the red-zone pipeline.
//!
//! Crops the image to the zone (when given), uploads it to the detection
//! service, maps boxes back onto the full image, draws the overlay and writes
//! the annotated image. The detection response is printed as JSON on stdout.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

use redzone_monitor::{
    config::parse_zone_arg,
    frame::encode_jpeg,
    overlay::{DetectionOverlay, ImageCanvas},
    zone::RoiOffset,
    DetectRequest, Detection, DetectionSummary, DetectorClient, FrameSize, HttpDetectorClient,
    RoiExtractor, DEFAULT_JPEG_QUALITY,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Detect PPE violations in a single image")]
struct Args {
    /// Input image (JPEG or PNG).
    image: PathBuf,

    /// Red zone as "x,y;x,y;x,y;x,y"; only the zone's bounding box is uploaded.
    #[arg(long, value_name = "POINTS")]
    zone: Option<String>,

    #[arg(long, env = "REDZONE_DETECTOR_URL", default_value = "http://localhost:5000")]
    detector: String,

    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    /// Where to write the annotated image (format from extension).
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Font for box labels.
    #[arg(long, env = "REDZONE_FONT_PATH")]
    font: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
    quality: u8,
}

#[derive(Serialize)]
struct Report {
    image: String,
    size: FrameSize,
    offset: Option<RoiOffset>,
    detections: Vec<Detection>,
    summary: DetectionSummary,
    violations: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if !(1..=100).contains(&args.quality) {
        return Err(anyhow!("--quality must be between 1 and 100"));
    }

    let frame = image::open(&args.image)
        .with_context(|| format!("open image {}", args.image.display()))?
        .to_rgb8();
    let size = FrameSize {
        width: frame.width(),
        height: frame.height(),
    };
    let zone = args
        .zone
        .as_deref()
        .map(parse_zone_arg)
        .transpose()
        .context("parse --zone")?;

    let (upload, roi) = match zone.as_ref().and_then(|z| RoiExtractor::extract(&frame, z).map(|c| (c, z))) {
        Some((crop, zone)) => {
            let descriptor = crop.descriptor(size, zone);
            (crop.image, Some(descriptor))
        }
        None => {
            if zone.is_some() {
                log::warn!("zone has no area inside the image; uploading the full frame");
            }
            (frame.clone(), None)
        }
    };
    let offset = roi.as_ref().map(|r| r.offset);

    let client = HttpDetectorClient::new(&args.detector, Duration::from_millis(args.timeout_ms))?;
    let request = DetectRequest {
        jpeg: encode_jpeg(&upload, args.quality)?,
        roi,
    };
    let response = client
        .detect(&request)
        .map_err(|e| anyhow!(e))
        .with_context(|| format!("detect via {}", client.base_url()))?;

    let detections: Vec<Detection> = match offset {
        Some(offset) => response
            .detections
            .iter()
            .cloned()
            .map(|d| d.translated(offset))
            .collect(),
        None => response.detections.clone(),
    };

    if let Some(output) = &args.output {
        let mut canvas = ImageCanvas::new(size.width, size.height);
        if let Some(font) = &args.font {
            canvas = canvas.with_font(ImageCanvas::load_font(font)?);
        }
        DetectionOverlay::new().draw(&mut canvas, &frame, zone.as_ref(), &[], &detections);
        canvas
            .to_rgb()
            .save(output)
            .with_context(|| format!("write {}", output.display()))?;
        log::info!("annotated image written to {}", output.display());
    }

    let report = Report {
        image: args.image.display().to_string(),
        size,
        offset,
        summary: DetectionSummary::from_detections(&detections),
        violations: response.violations(),
        detections,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
