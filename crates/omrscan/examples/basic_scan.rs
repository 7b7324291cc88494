use omrscan::{ScanConfig, Scanner, SheetLayout};
use std::error::Error;
use std::path::Path;

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!(
            "Usage: {} <photo.jpg> [layout.json] [config.json] [out.json]",
            args[0]
        );
        std::process::exit(2);
    }

    let photo = image::open(&args[1])?.to_rgb8();
    let layout = match args.get(2) {
        Some(path) => SheetLayout::from_json_file(Path::new(path))?,
        None => SheetLayout::default(),
    };
    let config = match args.get(3) {
        Some(path) => ScanConfig::from_json_file(Path::new(path))?,
        None => ScanConfig::default(),
    };

    let scanner = Scanner::with_config(layout, config);
    let result = scanner.scan(&photo);

    match &result.document_id {
        Some(id) => println!(
            "Document {id}: {} answers, rotation {:?}",
            result.answers.len(),
            result.rotation_deg
        ),
        None => {
            for err in &result.errors {
                println!("Failed at {}: {}", err.stage, err.message);
            }
        }
    }

    if let Some(out_path) = args.get(4) {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(out_path, json)?;
        println!("Wrote {out_path}");
    }
    Ok(())
}
