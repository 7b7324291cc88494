//! Payload marker: encoding, rendering and decoding.

mod codec;
mod decode;
mod format;
mod qr;

pub use codec::{
    crc8, encode_payload, render_marker, MarkerBits, MarkerError, DATA_BYTES, DATA_MODULES,
    MARKER_MODULES, MAX_PAYLOAD_BYTES,
};
pub use decode::{
    decode_marker, parse_data_bytes, MarkerDecodeConfig, MarkerDiagnostics, MarkerRejectReason,
};
pub use format::{decode_payload, MarkerFormat};
pub use qr::{decode_qr, render_qr, QR_QUIET_ZONE_MODULES};
