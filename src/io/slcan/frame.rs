// src/io/slcan/frame.rs
//
// Classic CAN frame value carried through the slcan pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest 29-bit identifier. Larger ids are clamped, not rejected.
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;
/// Largest 11-bit identifier.
pub const MAX_STANDARD_ID: u32 = 0x7FF;
/// Classic CAN payload limit.
pub const MAX_DLC: u8 = 8;

/// Immutable classic CAN frame.
///
/// For data frames `data().len() == dlc()`. RTR frames carry no payload but
/// keep the declared DLC so they encode back to the same wire line.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawCanFrame")]
pub struct CanFrame {
    id: u32,
    extended: bool,
    rtr: bool,
    dlc: u8,
    data: Vec<u8>,
}

impl CanFrame {
    /// Data frame with the extended flag derived from the id.
    pub fn new(id: u32, data: &[u8]) -> Self {
        let dlc = data.len().min(MAX_DLC as usize) as u8;
        Self::with_flags(id, id > MAX_STANDARD_ID, false, data, dlc)
    }

    /// Fully explicit constructor.
    ///
    /// `id` is clamped to 29 bits (11 for standard frames) and `dlc` to 8. Data frames take the first
    /// `dlc` bytes of `data`, zero-filling anything missing.
    pub fn with_flags(id: u32, extended: bool, rtr: bool, data: &[u8], dlc: u8) -> Self {
        let dlc = dlc.min(MAX_DLC);
        let data = if rtr {
            Vec::new()
        } else {
            let mut bytes = vec![0u8; dlc as usize];
            let n = data.len().min(bytes.len());
            bytes[..n].copy_from_slice(&data[..n]);
            bytes
        };

        Self {
            id: id.min(if extended { MAX_EXTENDED_ID } else { MAX_STANDARD_ID }),
            extended,
            rtr,
            dlc,
            data,
        }
    }

    /// Remote transmission request with a declared length.
    pub fn remote(id: u32, extended: bool, dlc: u8) -> Self {
        Self::with_flags(id, extended, true, &[], dlc)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn is_rtr(&self) -> bool {
        self.rtr
    }

    pub fn dlc(&self) -> u8 {
        self.dlc
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Unchecked field set, normalised through `with_flags` on deserialize.
#[derive(Deserialize)]
struct RawCanFrame {
    id: u32,
    #[serde(default)]
    extended: bool,
    #[serde(default)]
    rtr: bool,
    dlc: Option<u8>,
    #[serde(default)]
    data: Vec<u8>,
}

impl From<RawCanFrame> for CanFrame {
    fn from(raw: RawCanFrame) -> Self {
        let dlc = raw
            .dlc
            .unwrap_or_else(|| raw.data.len().min(MAX_DLC as usize) as u8);
        CanFrame::with_flags(raw.id, raw.extended, raw.rtr, &raw.data, dlc)
    }
}

impl fmt::Display for CanFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&super::codec::encode_frame(self))
    }
}
