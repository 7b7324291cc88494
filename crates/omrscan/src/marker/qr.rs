//! QR code payloads.
//!
//! Sheets printed by older tooling carry the document id as a plain QR code
//! in the marker region. Rendering uses `qrcode`, decoding uses `rqrr` on the
//! marker region view only.

use image::{GrayImage, Luma};
use qrcode::{Color, EcLevel, QrCode};

use super::codec::MarkerError;
use super::decode::{MarkerDiagnostics, MarkerRejectReason};

/// Light modules around the symbol, per side.
pub const QR_QUIET_ZONE_MODULES: u32 = 4;

/// Render `payload` as a QR code (level M) with its quiet zone, using the
/// largest whole module size whose square fits in `max_side_px`.
pub fn render_qr(payload: &str, max_side_px: u32) -> Result<GrayImage, MarkerError> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M)
        .map_err(|e| MarkerError::Qr(e.to_string()))?;
    let width = code.width() as u32;
    let modules = width + 2 * QR_QUIET_ZONE_MODULES;
    let module_px = max_side_px / modules;
    if module_px == 0 {
        return Err(MarkerError::DoesNotFit {
            modules,
            max_side_px,
        });
    }

    let colors = code.to_colors();
    let quiet = QR_QUIET_ZONE_MODULES;
    let side = modules * module_px;
    Ok(GrayImage::from_fn(side, side, |x, y| {
        let (mx, my) = (x / module_px, y / module_px);
        let in_symbol = (quiet..quiet + width).contains(&mx) && (quiet..quiet + width).contains(&my);
        let dark = in_symbol
            && colors[((my - quiet) * width + (mx - quiet)) as usize] == Color::Dark;
        Luma([if dark { 0 } else { 255 }])
    }))
}

/// Find and decode a QR code anywhere in `gray`.
pub fn decode_qr(gray: &GrayImage) -> (Option<String>, MarkerDiagnostics) {
    let mut diag = MarkerDiagnostics::default();
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        gray.width() as usize,
        gray.height() as usize,
        |x, y| gray.get_pixel(x as u32, y as u32)[0],
    );
    let grids = prepared.detect_grids();
    if grids.is_empty() {
        diag.reject_reason = Some(MarkerRejectReason::NoMarker);
        return (None, diag);
    }
    for grid in &grids {
        match grid.decode() {
            Ok((_, content)) => return (Some(content), diag),
            Err(e) => tracing::trace!(error = ?e, "qr grid not decodable"),
        }
    }
    diag.reject_reason = Some(MarkerRejectReason::QrUnreadable);
    (None, diag)
}
