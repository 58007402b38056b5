use crate::config::Cgr101Config;
use crate::session::{Cgr101Error, Cgr101Session};
use crate::transport::{SerialTransport, TransportError};
use serialport::{SerialPortInfo, SerialPortType, UsbPortInfo};

/// FTDI bridge used on the CircuitGear boards.
const FTDI_VID: u16 = 0x0403;
const FTDI_FT232R_PID: u16 = 0x6001;

const MANUFACTURER: &str = "Syscomp";
const PRODUCT: &str = "CircuitGear";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cgr101Device {
    pub name: String,
    pub port: String,
}

impl Cgr101Device {
    pub fn new(name: String, port: String) -> Self {
        Self { name, port }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Device error: {0}")]
    Device(#[from] Cgr101Error),

    #[error("Port {port} is not a CircuitGear device")]
    InvalidPort { port: String },

    #[error("No CircuitGear device found. Please connect a CGR-101 or specify the port manually")]
    DeviceNotFound,
}

pub struct Cgr101Connector;

impl Cgr101Connector {
    /// Open a session on `port`, or on the first CircuitGear found.
    pub fn connect(
        port: Option<&str>,
        config: Cgr101Config,
    ) -> Result<Cgr101Session<SerialTransport>, ConnectorError> {
        let port = match port {
            Some(port) => {
                log::debug!("Connecting to CGR-101 on port {}", port);
                Self::validate_port(port)?;
                port.to_string()
            }
            None => Self::get_device_port()?,
        };

        let transport = SerialTransport::open(&port, config.baud_rate)?;
        Ok(Cgr101Session::open(transport, config)?)
    }

    /// Check that `port` is a known CircuitGear. Ports that do not show up
    /// as USB devices (e.g. a pty) are accepted as-is.
    fn validate_port(port: &str) -> Result<(), ConnectorError> {
        let ports = serialport::available_ports()?;
        match ports.iter().find(|info| info.port_name == port) {
            Some(info) if matches!(info.port_type, SerialPortType::UsbPort(_)) => {
                if Self::to_device(info).is_none() {
                    return Err(ConnectorError::InvalidPort {
                        port: port.to_string(),
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn is_cgr101(usb: &UsbPortInfo) -> bool {
        let manufacturer_matches = usb
            .manufacturer
            .as_deref()
            .is_some_and(|m| m.contains(MANUFACTURER));
        let product_matches = usb
            .product
            .as_deref()
            .is_some_and(|p| p.contains(PRODUCT));

        manufacturer_matches || product_matches
            || (usb.vid == FTDI_VID
                && usb.pid == FTDI_FT232R_PID
                && usb.serial_number.as_deref().is_some_and(|s| s.starts_with("CG")))
    }

    fn to_device(info: &SerialPortInfo) -> Option<Cgr101Device> {
        match &info.port_type {
            SerialPortType::UsbPort(usb) if Self::is_cgr101(usb) => Some(Cgr101Device::new(
                usb.product.clone().unwrap_or_else(|| PRODUCT.to_string()),
                info.port_name.clone(),
            )),
            _ => None,
        }
    }

    /// All CircuitGear devices currently attached.
    pub fn get_available_devices() -> Result<Vec<Cgr101Device>, ConnectorError> {
        let ports = serialport::available_ports()?;
        Ok(ports.iter().filter_map(Self::to_device).collect())
    }

    fn get_device_port() -> Result<String, ConnectorError> {
        log::debug!("Searching for CircuitGear device");
        Self::get_available_devices()?
            .into_iter()
            .next()
            .map(|device| device.port)
            .ok_or(ConnectorError::DeviceNotFound)
    }
}
