// Fast data reading example
//
// This example measures the frame refresh rate of the CGR-101 by repeatedly
// arming the external trigger and downloading the buffer.

use cgr101_rs::{ArmOutcome, CancelToken, Cgr101Config, Cgr101Connector};
use clap::Parser;
use std::io::{self, Write};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "fast_read")]
#[command(version = "1.0")]
#[command(about = "High-speed data acquisition from a CGR-101")]
#[command(long_about = "Repeatedly trigger and read frames from a CGR-101 as fast as possible. Useful for measuring the achievable refresh rate.")]
struct Args {
    /// Serial port of the device, autodetected when omitted
    #[arg(short = 'P', long)]
    port: Option<String>,

    /// Frame period in microseconds
    #[arg(short, long, default_value_t = 100, help = "Duration of each capture in microseconds")]
    frame_period: u64,

    /// Number of frames to read
    #[arg(short = 'n', long, default_value_t = 10)]
    frames: u32,

    /// Give up on a trigger after this many milliseconds
    #[arg(short, long, default_value_t = 1000)]
    trigger_timeout: u64,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    #[cfg(feature = "cpu-profiling")]
    let _client = tracy_client::Client::start();

    println!("CGR-101 Fast Data Reader");
    println!("========================");

    let mut scope = Cgr101Connector::connect(args.port.as_deref(), Cgr101Config::default())?;
    println!("Connected to {}", scope.identity());

    let period = scope.set_frame_period(Duration::from_micros(args.frame_period))?;
    println!("Frame period: {:?}\n", period);

    let cancel = CancelToken::new();
    let start_time = Instant::now();
    let mut frames_read = 0u32;
    let mut missed = 0u32;

    for _ in 0..args.frames {
        let deadline = Instant::now() + Duration::from_millis(args.trigger_timeout);
        match scope.arm_external(&cancel, Some(deadline))? {
            ArmOutcome::Triggered(_) => {
                let frame = scope.read_frame()?;
                frames_read += 1;
                let elapsed = start_time.elapsed();
                print!(
                    "\r[{:.1}s] {} frames | {:.2} frame/s | A[0] {:.3} V | B[0] {:.3} V",
                    elapsed.as_secs_f64(),
                    frames_read,
                    f64::from(frames_read) / elapsed.as_secs_f64(),
                    frame.channel_a[0],
                    frame.channel_b[0]
                );
                io::stdout().flush()?;
            }
            ArmOutcome::Cancelled | ArmOutcome::DeadlineElapsed => missed += 1,
        }
    }

    let elapsed = start_time.elapsed();
    println!(
        "\n\nRead {} frames in {:.3} s, ie. {:.2} frame/s ({} triggers missed)",
        frames_read,
        elapsed.as_secs_f64(),
        f64::from(frames_read) / elapsed.as_secs_f64(),
        missed
    );

    Ok(())
}
