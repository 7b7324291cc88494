use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{Rgb, RgbImage};
use nalgebra::Matrix3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use omrscan::render::{render_sheet, RenderOptions};
use omrscan::{enhance, fiducial, orientation, rectify, sampler};
use omrscan::{ScanConfig, Scanner, SheetLayout};

fn filled_cells(layout: &SheetLayout, seed: u64) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(seed);
    layout
        .answer_groups()
        .map(|g| g.cells[rng.gen_range(0..g.cells.len())].id.clone())
        .collect()
}

/// Rendered sheet on a darker table, with a lighting gradient and noise.
fn make_photo_fixture(layout: &SheetLayout, seed: u64) -> RgbImage {
    let opts = RenderOptions {
        margin_px: 60,
        ..RenderOptions::default()
    };
    let page = render_sheet(layout, "BENCH-001", &filled_cells(layout, seed), &opts)
        .expect("bench payload fits the marker");
    let (w, h) = page.dimensions();
    let mut rng = StdRng::seed_from_u64(seed);
    RgbImage::from_fn(w + 80, h + 80, |x, y| {
        let shade = 0.75 + 0.25 * (x as f32 / (w + 80) as f32);
        let base = if x >= 40 && y >= 40 && x < w + 40 && y < h + 40 {
            page.get_pixel(x - 40, y - 40).0
        } else {
            [120, 110, 100]
        };
        let noise: f32 = rng.gen_range(-6.0..6.0);
        Rgb(base.map(|c| (c as f32 * shade + noise).clamp(0.0, 255.0) as u8))
    })
}

fn bench_enhance(c: &mut Criterion) {
    let layout = SheetLayout::default();
    let photo = make_photo_fixture(&layout, 7);
    let cfg = enhance::EnhanceConfig::default();

    c.bench_function("enhance_1560x2180", |b| {
        b.iter(|| black_box(enhance::enhance(black_box(&photo), black_box(&cfg))))
    });
}

fn bench_fiducials(c: &mut Criterion) {
    let layout = SheetLayout::default();
    let photo = make_photo_fixture(&layout, 9);
    let enhanced = enhance::enhance(&photo, &enhance::EnhanceConfig::default());
    let cfg = fiducial::FiducialConfig::default();

    c.bench_function("fiducial_detect_1560x2180", |b| {
        b.iter(|| black_box(fiducial::detect(black_box(&enhanced), black_box(&cfg)).is_ok()))
    });
}

fn bench_warp(c: &mut Criterion) {
    let layout = SheetLayout::default();
    let photo = make_photo_fixture(&layout, 11);
    let h = Matrix3::new(0.98, 0.03, 95.0, -0.02, 0.99, 110.0, 1.0e-6, -2.0e-6, 1.0);

    c.bench_function("warp_perspective_1480x2100", |b| {
        b.iter(|| {
            black_box(rectify::warp_perspective(
                black_box(&photo),
                black_box(&h),
                layout.canonical_size,
                Rgb([255, 255, 255]),
            ))
        })
    });
}

fn bench_orientation_and_sampling(c: &mut Criterion) {
    let layout = SheetLayout::default();
    let opts = RenderOptions {
        margin_px: 0,
        ..RenderOptions::default()
    };
    let page = render_sheet(&layout, "BENCH-002", &filled_cells(&layout, 3), &opts)
        .expect("bench payload fits the marker");
    let upside_down = rectify::CanonicalSheet::new(image::imageops::rotate180(&page));
    let upright = rectify::CanonicalSheet::new(page);
    let orient_cfg = orientation::OrientationConfig::default();
    let sample_cfg = sampler::SamplingConfig::default();

    c.bench_function("orientation_resolve_180", |b| {
        b.iter(|| {
            black_box(
                orientation::resolve(
                    black_box(&upside_down),
                    &layout.marker_region,
                    black_box(&orient_cfg),
                )
                .is_ok(),
            )
        })
    });

    c.bench_function("sample_660_cells", |b| {
        b.iter(|| black_box(sampler::sample(black_box(&upright), &layout, &sample_cfg).len()))
    });
}

fn bench_full_scan(c: &mut Criterion) {
    let layout = SheetLayout::default();
    let photo = make_photo_fixture(&layout, 13);
    let scanner = Scanner::with_config(layout, ScanConfig::default());

    c.bench_function("scan_full_1560x2180", |b| {
        b.iter(|| black_box(scanner.scan(black_box(&photo)).is_success()))
    });
}

criterion_group!(
    hotpaths,
    bench_enhance,
    bench_fiducials,
    bench_warp,
    bench_orientation_and_sampling,
    bench_full_scan
);
criterion_main!(hotpaths);
