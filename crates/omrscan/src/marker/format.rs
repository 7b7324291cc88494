//! Marker symbologies accepted in the marker region.

use image::GrayImage;

use super::decode::{decode_marker, MarkerDecodeConfig, MarkerDiagnostics};
use super::qr::decode_qr;

/// Printed payload marker symbology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerFormat {
    /// 14x14 module grid with a CRC-8 checked payload.
    #[default]
    Grid,
    /// Standard QR code.
    Qr,
}

impl MarkerFormat {
    pub const fn code(self) -> &'static str {
        match self {
            Self::Grid => "grid",
            Self::Qr => "qr",
        }
    }
}

impl std::fmt::Display for MarkerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Decode the marker region view as `format`.
pub fn decode_payload(
    view: &GrayImage,
    format: MarkerFormat,
    config: &MarkerDecodeConfig,
) -> (Option<String>, MarkerDiagnostics) {
    match format {
        MarkerFormat::Grid => decode_marker(view, config),
        MarkerFormat::Qr => decode_qr(view),
    }
}
