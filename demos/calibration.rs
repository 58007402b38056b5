// Offset calibration example
//
// This example measures the zero offset of both channels on both gain ranges
// with the inputs grounded and stores it in the session.

use cgr101_rs::{Cgr101Config, Cgr101Connector, Cgr101Session, Channel, GainRange, Transport};
use std::io::{self, Write};
use std::time::Duration;

/// Frames averaged per measurement.
const FRAMES: usize = 4;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("CGR-101 Offset Calibration Example");
    println!("==================================\n");

    let mut scope = Cgr101Connector::connect(None, Cgr101Config::default())?;
    println!("Connected to {}\n", scope.identity());

    print!("Ground both inputs and press Enter to continue...");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    scope.set_frame_period(Duration::from_millis(1))?;

    for range in [GainRange::Low, GainRange::High] {
        for channel in Channel::ALL {
            scope.set_gain_range(channel, range)?;
        }

        for channel in Channel::ALL {
            // Measure against a zero offset so the result is the raw bias.
            scope.set_calibration_offset(channel, range, 0.0);
        }
        let [bias_a, bias_b] = measure_means(&mut scope)?;
        scope.set_calibration_offset(Channel::A, range, bias_a);
        scope.set_calibration_offset(Channel::B, range, bias_b);

        println!(
            "{:?} range: channel A bias {:.4} V, channel B bias {:.4} V",
            range, bias_a, bias_b
        );
    }

    println!("\nVerifying with calibrated Low range...");
    for channel in Channel::ALL {
        scope.set_gain_range(channel, GainRange::Low)?;
    }
    let [mean_a, mean_b] = measure_means(&mut scope)?;
    println!("  Residual: A {:.4} V, B {:.4} V", mean_a, mean_b);

    Ok(())
}

fn measure_means<T: Transport>(
    scope: &mut Cgr101Session<T>,
) -> Result<[f32; 2], Box<dyn std::error::Error>> {
    let mut sums = [0.0f32; 2];
    let mut count = 0usize;

    for _ in 0..FRAMES {
        scope.capture_internal()?;
        let frame = scope.read_frame()?;
        for channel in Channel::ALL {
            sums[channel.index()] += frame.channel(channel).iter().sum::<f32>();
        }
        count += frame.len();
    }

    Ok(sums.map(|sum| sum / count as f32))
}
