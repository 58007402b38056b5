// Basic device discovery and connection example
//
// This example shows how to discover CircuitGear devices and open a session.

use cgr101_rs::{Cgr101Config, Cgr101Connector};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (optional)
    env_logger::init();

    println!("CGR-101 Device Discovery Example");
    println!("================================\n");

    println!("1. Discovering available CircuitGear devices...");
    let devices = Cgr101Connector::get_available_devices()?;

    if devices.is_empty() {
        println!("No CircuitGear devices found. Please connect a device and try again.");
        return Ok(());
    }

    println!("Found {} device(s):", devices.len());
    for (i, device) in devices.iter().enumerate() {
        println!("  {}. {} at {}", i + 1, device.name, device.port);
    }
    println!();

    println!("2. Connecting to first available device...");
    let mut scope = Cgr101Connector::connect(None, Cgr101Config::default())?;
    println!("Successfully connected!");

    println!("\n3. Device information:");
    println!("  Identification: {}", scope.identity());
    println!("  Sample rate: {} Hz", scope.sample_rate().rate_hz());
    if let Some(register) = scope.control_register() {
        println!("  Control register: {:?} (0x{:02x})", register, register.encode());
    }

    println!("\n4. Testing basic communication...");
    let id = scope.identify()?;
    println!("Device answered: {}", id);

    println!("\n5. Connection test completed successfully!");

    Ok(())
}
