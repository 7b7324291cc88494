//! End-to-end scans of rendered sheets placed into synthetic photos.

mod common;

use common::synthetic_sheet::{photograph, render_page, render_page_with, shade, Marks};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use omrscan::{
    MarkerFormat, QuadDefect, RenderOptions, ScanError, ScanResult, ScanStage, Scanner, SheetLayout, AMBIGUOUS, UNMARKED,
};

fn assert_standard_marks(result: &ScanResult, payload: &str) {
    assert!(result.is_success(), "scan failed: {:?}", result.errors);
    assert_eq!(result.document_id.as_deref(), Some(payload));
    assert_eq!(result.answers.len(), 120);
    assert_eq!(result.answers["Q1"], "A");
    assert_eq!(result.answers["Q2"], "C");
    assert_eq!(result.answers["Q37"], "E");
    assert_eq!(result.answers["Q120"], "B");
    assert_eq!(result.answers["Q5"], AMBIGUOUS);
    assert_eq!(result.answers["Q3"], UNMARKED);
    assert_eq!(result.calibration_codes["book_code"], "407");
    assert_eq!(result.calibration_codes["set_code"], "123");
}

#[test]
fn unpadded_render_scans_as_is() {
    let layout = SheetLayout::default();
    let marks = Marks {
        answers: vec![("Q1", "A")],
        codes: vec![],
        extra_cells: vec![],
    };
    let page = render_page(&layout, "DOC-001", &marks, 0);

    let result = Scanner::new(layout).scan(&page);

    assert!(result.is_success(), "scan failed: {:?}", result.errors);
    assert_eq!(result.stage, ScanStage::Assembled);
    assert_eq!(result.rotation_deg, Some(0));
    assert_eq!(result.document_id.as_deref(), Some("DOC-001"));
    assert_eq!(result.answers["Q1"], "A");
    assert_eq!(result.answers["Q2"], UNMARKED);
    assert_eq!(result.calibration_codes["book_code"], "---");
}

#[test]
fn photographed_page_under_perspective() {
    let layout = SheetLayout::default();
    let page = render_page(&layout, "EXAM-2024", &Marks::standard(), 60);
    let photo = shade(&photograph(&page, [90, 80, 70]), 0.7, 1.0);

    let result = Scanner::new(layout).scan(&photo);

    assert_standard_marks(&result, "EXAM-2024");
    assert_eq!(result.rotation_deg, Some(0));
}

#[test]
fn upside_down_page_is_turned_back() {
    let layout = SheetLayout::default();
    let page = render_page(&layout, "UPSIDE-7", &Marks::standard(), 60);
    let photo = photograph(&imageops::rotate180(&page), [200, 200, 195]);

    let result = Scanner::new(layout).scan(&photo);

    assert_standard_marks(&result, "UPSIDE-7");
    assert_eq!(result.rotation_deg, Some(180));
}

#[test]
fn upside_down_qr_page_is_turned_back() {
    let layout = SheetLayout::default();
    let opts = RenderOptions {
        marker_format: MarkerFormat::Qr,
        ..RenderOptions::default()
    };
    let page = render_page_with(&layout, "QR-SHEET-9", &Marks::standard(), &opts);
    let photo = photograph(&imageops::rotate180(&page), [200, 200, 195]);

    let result = Scanner::new(layout).scan(&photo);

    assert_standard_marks(&result, "QR-SHEET-9");
    assert_eq!(result.rotation_deg, Some(180));
}

#[test]
fn quarter_turned_page_is_turned_back() {
    let layout = SheetLayout::default();
    let page = render_page(&layout, "SIDE-90", &Marks::standard(), 60);
    let photo = photograph(&imageops::rotate90(&page), [90, 80, 70]);

    let result = Scanner::new(layout).scan(&photo);

    assert_standard_marks(&result, "SIDE-90");
    assert_eq!(result.rotation_deg, Some(270));
}

#[test]
fn repeated_scans_serialize_identically() {
    let layout = SheetLayout::default();
    let page = render_page(&layout, "SAME-1", &Marks::standard(), 60);
    let photo = photograph(&page, [90, 80, 70]);
    let scanner = Scanner::new(layout);

    let first = serde_json::to_string(&scanner.scan(&photo)).unwrap();
    let second = serde_json::to_string(&scanner.scan(&photo)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn batch_keeps_input_order() {
    let layout = SheetLayout::default();
    let page = render_page(&layout, "BATCH-1", &Marks::standard(), 0);
    let blank = RgbImage::from_pixel(400, 300, Rgb([240, 240, 240]));
    let scanner = Scanner::new(layout);

    let results = scanner.scan_batch(&[blank.clone(), page, blank]);

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].stage, ScanStage::Failed);
    assert_eq!(results[1].document_id.as_deref(), Some("BATCH-1"));
    assert_eq!(results[2].stage, ScanStage::Failed);
}

#[test]
fn missing_marker_fails_orientation() {
    let layout = SheetLayout::default();
    let mut page = render_page(&layout, "GONE", &Marks::standard(), 0);
    let r = layout.marker_region;
    draw_filled_rect_mut(
        &mut page,
        Rect::at(r.x as i32, r.y as i32).of_size(r.width, r.height),
        Rgb([255, 255, 255]),
    );

    let result = Scanner::new(layout).scan(&page);

    assert_eq!(result.stage, ScanStage::Failed);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].stage, ScanStage::Rectified);
    assert_eq!(
        result.errors[0].error,
        ScanError::OrientationNotResolved { attempts: 4 }
    );
    assert!(result.answers.is_empty());
    assert!(result.document_id.is_none());
}

#[test]
fn marks_in_a_row_are_degenerate() {
    let mut img = RgbImage::from_pixel(1000, 300, Rgb([250, 250, 250]));
    for x in [100, 350, 600, 850] {
        draw_filled_rect_mut(&mut img, Rect::at(x - 30, 120).of_size(60, 60), Rgb([15, 15, 15]));
    }

    let result = Scanner::new(SheetLayout::default()).scan(&img);

    assert_eq!(result.errors[0].stage, ScanStage::FiducialsFound);
    assert_eq!(
        result.errors[0].error,
        ScanError::DegenerateQuadrilateral {
            defect: QuadDefect::CoincidentCorners
        }
    );
}

#[test]
fn three_marks_are_insufficient() {
    let mut img = RgbImage::from_pixel(800, 800, Rgb([250, 250, 250]));
    for (x, y) in [(100, 100), (700, 100), (100, 700)] {
        draw_filled_rect_mut(&mut img, Rect::at(x - 30, y - 30).of_size(60, 60), Rgb([15, 15, 15]));
    }

    let result = Scanner::new(SheetLayout::default()).scan(&img);

    assert_eq!(
        result.errors[0].error,
        ScanError::InsufficientFiducials { count: 3 }
    );
    assert_eq!(result.errors[0].error.code(), "insufficient_fiducials");
}
