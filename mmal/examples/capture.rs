// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Captures a JPEG still or an H.264 stream through the software layer and
//! writes the result to a file.

mod common;

use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use mmal::{
    CaptureMode, CaptureOptions, ConnectionMode, Encoding, InMemoryHandler, Pipeline, PortConfig,
    native::{ParameterValue, soft::SoftConfig},
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(version, about = "Capture from the software camera", long_about = None)]
struct Args {
    /// Pipeline configuration file (JSON).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Capture width in pixels.
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Capture height in pixels.
    #[arg(long, default_value_t = 480)]
    height: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Take a single JPEG still.
    Still {
        #[arg(short, long, default_value = "still.jpg")]
        output: PathBuf,
    },
    /// Record H.264 video.
    Video {
        /// Stop after this many frames.
        #[arg(short, long)]
        frames: Option<u32>,

        /// Stop after this many seconds.
        #[arg(short, long, default_value_t = 5)]
        duration: u64,

        #[arg(short, long, default_value = "video.h264")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    common::setup_logging();
    let args = Args::parse();

    let config = common::load_pipeline_config(args.config.as_deref())?;
    let soft = SoftConfig {
        frame_limit: match &args.command {
            Command::Video { frames, .. } => *frames,
            Command::Still { .. } => None,
        },
        ..SoftConfig::default()
    };
    let pipeline = Pipeline::with_soft_layer(soft, config);
    let camera = pipeline.create_component("camera")?;
    let source_config = PortConfig::new(Encoding::I420).with_resolution(args.width, args.height);

    let handler = Arc::new(
        InMemoryHandler::new().on_full_frame(|frame| info!("Frame of {} byte(s).", frame.len())),
    );

    let (output, report) = match args.command {
        Command::Still { output } => {
            let still = camera.output(2)?;
            still.configure(source_config)?;
            let encoder = pipeline.create_component("encoder.image")?;
            pipeline.connect(still, encoder.input(0)?, ConnectionMode::Tunnelled)?;
            let jpeg = encoder.output(0)?;
            jpeg.configure(PortConfig::new(Encoding::JPEG).with_quality(90))?;
            jpeg.set_capture_handler(handler.clone());

            pipeline.print_pipeline();
            let report = pipeline.capture(still, CaptureOptions::new()).await?;
            (output, report)
        }
        Command::Video {
            duration, output, ..
        } => {
            let video = camera.output(1)?;
            video.configure(source_config.with_framerate(30, 1))?;
            let encoder = pipeline.create_component("encoder.video")?;
            pipeline.connect(video, encoder.input(0)?, ConnectionMode::Tunnelled)?;
            let h264 = encoder.output(0)?;
            h264.configure(
                PortConfig::new(Encoding::H264)
                    .with_bitrate(2_000_000)
                    .with_capture_mode(CaptureMode::Continuous),
            )?;
            h264.set_capture_handler(handler.clone());

            pipeline.print_pipeline();
            // Stamp the elapsed time on the camera once a second.
            let control = camera.control().clone();
            let started = Instant::now();
            let options = CaptureOptions::new()
                .with_duration(Duration::from_secs(duration))
                .with_refresh(Duration::from_secs(1), move || {
                    let text = format!("{:.1}s", started.elapsed().as_secs_f32());
                    if let Err(err) = control.set_parameter(
                        mmal_sys::MMAL_PARAMETER_ANNOTATE,
                        ParameterValue::Bytes(text.into_bytes()),
                    ) {
                        warn!("Annotation refresh failed: {err}");
                    }
                });
            let report = pipeline.capture(video, options).await?;
            (output, report)
        }
    };

    info!("Capture finished: {:?}", report.outcomes);
    let data = handler.take_data();
    std::fs::write(&output, &data)?;
    info!(
        "Wrote {} byte(s) in {} frame(s) to {}.",
        data.len(),
        handler.frames(),
        output.display()
    );
    Ok(())
}
