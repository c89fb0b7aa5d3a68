//! GATT identifiers shared by the server and client roles.

/// Service or characteristic UUID as the stack expects it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Uuid {
    /// Bluetooth SIG assigned 16-bit UUID.
    Short(u16),
    /// Vendor 128-bit UUID, little-endian byte order (as sent over the air).
    Long([u8; 16]),
}

impl Uuid {
    /// Little-endian wire representation.
    pub fn to_le_bytes(&self) -> ([u8; 16], usize) {
        let mut out = [0u8; 16];
        match self {
            Uuid::Short(v) => {
                out[..2].copy_from_slice(&v.to_le_bytes());
                (out, 2)
            }
            Uuid::Long(bytes) => {
                out.copy_from_slice(bytes);
                (out, 16)
            }
        }
    }
}

/// Local characteristics the server exposes and indicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Characteristic {
    /// Health Thermometer Temperature Measurement (0x2A1C).
    TemperatureMeasurement,
    /// Custom button state characteristic.
    ButtonState,
}

/// Handles cached while discovering one remote service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RemoteHandles {
    pub service: Option<u32>,
    pub characteristic: Option<u16>,
}

impl RemoteHandles {
    pub const fn new() -> Self {
        Self {
            service: None,
            characteristic: None,
        }
    }
}

/// Whether a client characteristic configuration value enables indications.
///
/// Bit 1 of the CCCD; bit 0 (notifications) is ignored.
pub fn cccd_indications(value: u16) -> bool {
    value & 0x0002 != 0
}

/// AD types listing 16-bit service UUIDs (incomplete, complete).
const AD_SERVICES_16: [u8; 2] = [0x02, 0x03];
/// AD types listing 128-bit service UUIDs (incomplete, complete).
const AD_SERVICES_128: [u8; 2] = [0x06, 0x07];

/// Whether raw advertising data lists `uuid` among its service UUIDs.
pub fn advertises_service(data: &[u8], uuid: &Uuid) -> bool {
    let (wanted, width) = uuid.to_le_bytes();
    let types = if width == 2 { AD_SERVICES_16 } else { AD_SERVICES_128 };

    let mut i = 0;
    while i < data.len() {
        let len = data[i] as usize;
        if len == 0 || i + len >= data.len() {
            break;
        }
        if types.contains(&data[i + 1]) {
            let list = &data[i + 2..i + 1 + len];
            if list.chunks_exact(width).any(|chunk| chunk == &wanted[..width]) {
                return true;
            }
        }
        i += len + 1;
    }
    false
}
