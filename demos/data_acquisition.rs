// Data acquisition with internal and external triggers
//
// This example configures gain, frame period and trigger level, then captures
// one frame with each trigger mode.

use cgr101_rs::{
    AcquisitionFrame, ArmOutcome, CancelToken, Cgr101Config, Cgr101Connector, Channel, GainRange,
};
use std::time::{Duration, Instant};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("CGR-101 Data Acquisition Example");
    println!("================================\n");

    let mut scope = Cgr101Connector::connect(None, Cgr101Config::default())?;
    println!("Connected to {}\n", scope.identity());

    scope.set_gain_range(Channel::A, GainRange::Low)?;
    scope.set_gain_range(Channel::B, GainRange::Low)?;

    // Example 1: internal trigger at 0 V
    println!("1. Internal trigger (0 V on channel A, 2.5 s frame)");
    let period = scope.set_frame_period(Duration::from_millis(2500))?;
    println!("   Achieved frame period: {:?}", period);
    scope.set_trigger_level(Channel::A, 0.0)?;
    scope.set_post_trigger_sample_count(1023)?;
    scope.capture_internal()?;
    let frame = scope.read_frame()?;
    print_frame_summary(&frame);

    // Example 2: external trigger with a deadline
    println!("\n2. External trigger (waiting up to 5 s)");
    let period = scope.set_frame_period(Duration::from_millis(10))?;
    println!("   Achieved frame period: {:?}", period);
    let deadline = Instant::now() + Duration::from_secs(5);
    match scope.arm_external(&CancelToken::new(), Some(deadline))? {
        ArmOutcome::Triggered(position) => {
            println!("   Triggered, ring offset {}", position.get());
            let frame = scope.read_frame()?;
            print_frame_summary(&frame);
        }
        ArmOutcome::Cancelled | ArmOutcome::DeadlineElapsed => {
            println!("   No external trigger seen");
        }
    }

    // Example 3: DataFrame output
    println!("\n3. DataFrame output");
    scope.capture_internal()?;
    let df = scope.read_frame()?.to_dataframe()?;
    println!("{}", df.head(Some(5)));

    Ok(())
}

fn print_frame_summary(frame: &AcquisitionFrame) {
    for channel in Channel::ALL {
        let samples = frame.channel(channel);
        let min = samples.iter().copied().fold(f32::INFINITY, f32::min);
        let max = samples.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = samples.iter().sum::<f32>() / samples.len() as f32;
        println!(
            "   Channel {}: {} samples, min {:.3} V, max {:.3} V, mean {:.3} V",
            channel.letter(),
            samples.len(),
            min,
            max,
            mean
        );
    }
}
