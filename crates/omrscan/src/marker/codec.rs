//! Payload marker bit layout.
//!
//! The marker is a square grid of [`MARKER_MODULES`] x [`MARKER_MODULES`]
//! modules. The outer ring of modules is solid dark; the inner
//! [`DATA_MODULES`] x [`DATA_MODULES`] modules carry 144 bits, row-major,
//! dark = 1, most significant bit first:
//!
//! | byte | content |
//! |---|---|
//! | 0 | sync `0xA7` |
//! | 1 | payload length `L` (`0..=15`) |
//! | 2 .. 2+L | UTF-8 payload |
//! | 2+L | CRC-8 (poly `0x07`, init `0x00`) over length and payload |
//! | rest | alternating `0xEC`, `0x11` padding |

use image::{GrayImage, Luma};

/// Modules per side, border included.
pub const MARKER_MODULES: usize = 14;
/// Data modules per side.
pub const DATA_MODULES: usize = MARKER_MODULES - 2;
/// Data bytes carried by one marker.
pub const DATA_BYTES: usize = DATA_MODULES * DATA_MODULES / 8;
/// Longest payload in bytes.
pub const MAX_PAYLOAD_BYTES: usize = DATA_BYTES - 3;

pub(crate) const SYNC_BYTE: u8 = 0xA7;
const PAD_BYTES: [u8; 2] = [0xEC, 0x11];
const CRC8_POLY: u8 = 0x07;

/// Payload encoding failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarkerError {
    #[error("payload is {len} bytes, marker holds at most {max}")]
    PayloadTooLong { len: usize, max: usize },
    #[error("qr encoding failed: {0}")]
    Qr(String),
    #[error("marker of {modules} modules does not fit in {max_side_px}px")]
    DoesNotFit { modules: u32, max_side_px: u32 },
}

/// Module grid of one marker; `true` is a dark module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerBits {
    modules: [[bool; MARKER_MODULES]; MARKER_MODULES],
}

impl MarkerBits {
    /// Grid with a dark border around the given data bytes.
    pub fn from_data_bytes(data: &[u8; DATA_BYTES]) -> Self {
        let mut modules = [[true; MARKER_MODULES]; MARKER_MODULES];
        for (i, bit) in bytes_to_bits(data).enumerate() {
            modules[1 + i / DATA_MODULES][1 + i % DATA_MODULES] = bit;
        }
        Self { modules }
    }

    /// Build a grid from sampled modules (`modules[row][col]`).
    pub fn from_modules(modules: [[bool; MARKER_MODULES]; MARKER_MODULES]) -> Self {
        Self { modules }
    }

    pub fn is_dark(&self, row: usize, col: usize) -> bool {
        self.modules[row][col]
    }

    /// Data bytes read row-major from the inner modules.
    pub fn data_bytes(&self) -> [u8; DATA_BYTES] {
        let mut out = [0u8; DATA_BYTES];
        for i in 0..DATA_BYTES * 8 {
            if self.modules[1 + i / DATA_MODULES][1 + i % DATA_MODULES] {
                out[i / 8] |= 0x80 >> (i % 8);
            }
        }
        out
    }

    /// Number of border modules that are not dark.
    pub fn border_errors(&self) -> usize {
        let last = MARKER_MODULES - 1;
        let mut errors = 0;
        for (r, row) in self.modules.iter().enumerate() {
            for (c, &dark) in row.iter().enumerate() {
                let on_border = r == 0 || c == 0 || r == last || c == last;
                if on_border && !dark {
                    errors += 1;
                }
            }
        }
        errors
    }
}

fn bytes_to_bits(data: &[u8]) -> impl Iterator<Item = bool> + '_ {
    data.iter()
        .flat_map(|&b| (0..8).map(move |k| (b >> (7 - k)) & 1 == 1))
}

/// CRC-8, polynomial `x^8 + x^2 + x + 1`, zero init, no reflection.
pub fn crc8(bytes: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &b in bytes {
        crc ^= b;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Encode a UTF-8 payload into a marker module grid.
pub fn encode_payload(payload: &str) -> Result<MarkerBits, MarkerError> {
    let bytes = payload.as_bytes();
    if bytes.len() > MAX_PAYLOAD_BYTES {
        return Err(MarkerError::PayloadTooLong {
            len: bytes.len(),
            max: MAX_PAYLOAD_BYTES,
        });
    }

    let mut data = [0u8; DATA_BYTES];
    data[0] = SYNC_BYTE;
    data[1] = bytes.len() as u8;
    data[2..2 + bytes.len()].copy_from_slice(bytes);
    data[2 + bytes.len()] = crc8(&data[1..2 + bytes.len()]);
    for (k, slot) in data[3 + bytes.len()..].iter_mut().enumerate() {
        *slot = PAD_BYTES[k % 2];
    }
    Ok(MarkerBits::from_data_bytes(&data))
}

/// Render a marker as a grayscale image of `MARKER_MODULES * module_px` pixels
/// per side (dark modules `0`, light modules `255`).
pub fn render_marker(bits: &MarkerBits, module_px: u32) -> GrayImage {
    let module_px = module_px.max(1);
    let side = MARKER_MODULES as u32 * module_px;
    GrayImage::from_fn(side, side, |x, y| {
        let row = (y / module_px) as usize;
        let col = (x / module_px) as usize;
        if bits.is_dark(row, col) {
            Luma([0])
        } else {
            Luma([255])
        }
    })
}
