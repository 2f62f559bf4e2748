use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use turnstile_core::liveness::eye_open_ratio;
use turnstile_core::{FaceDetector, LandmarkNet};
use turnstile_hw::Camera;

#[derive(Parser)]
#[command(name = "turnstile", about = "Turnstile attendance kiosk CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List video capture devices
    Devices,
    /// Capture one frame and save it as JPEG
    Capture {
        /// V4L2 device path
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Output file
        #[arg(short, long, default_value = "frame.jpg")]
        output: String,
    },
    /// Run one screening pass and print the verdict
    Screen {
        /// V4L2 device path
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
        /// Directory containing the ONNX models
        #[arg(short, long, default_value = "/usr/share/turnstile/models")]
        model_dir: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No capture devices found");
            }
            for device in devices {
                println!("{}  {} ({})", device.path, device.name, device.driver);
            }
        }
        Commands::Capture { device, output } => {
            let camera = Camera::open(&device).context("failed to open camera")?;
            println!(
                "Capturing from {} at {}x{}",
                camera.device_path, camera.width, camera.height
            );
            let sample = camera.capture_sample().context("capture failed")?;
            let jpeg = sample.to_jpeg().context("JPEG encoding failed")?;
            std::fs::write(&output, jpeg)
                .with_context(|| format!("failed to write {output}"))?;
            println!("Wrote {output}");
        }
        Commands::Screen { device, model_dir } => {
            let camera = Camera::open(&device).context("failed to open camera")?;
            let mut detector = FaceDetector::load(&format!("{model_dir}/face_screen_128.onnx"))
                .context("failed to load detector model")?;
            let mut landmarks = LandmarkNet::load(&format!("{model_dir}/landmarks_68.onnx"))
                .context("failed to load landmark model")?;

            let mut sample = camera.capture_sample().context("capture failed")?;
            if sample.is_dark() {
                bail!("frame is dark; camera not ready");
            }
            sample.normalize_contrast();

            let regions = detector.detect(&sample.data, sample.width, sample.height)?;
            let Some(region) = regions.first() else {
                println!("No face detected");
                return Ok(());
            };
            println!(
                "Face at ({:.0}, {:.0}) {:.0}x{:.0}, confidence {:.2}",
                region.x, region.y, region.width, region.height, region.confidence
            );

            match landmarks.eyes(&sample.data, sample.width, sample.height, region)? {
                Some(eyes) => {
                    println!(
                        "Eye open ratios: left {:.3}, right {:.3}",
                        eye_open_ratio(&eyes.left),
                        eye_open_ratio(&eyes.right)
                    );
                }
                None => println!("Landmarks ambiguous; no eye reading"),
            }
        }
    }

    Ok(())
}
