//! Cut out a subject on a flat backdrop and save it with transparency.
//!
//! Usage:
//! ```sh
//! cargo run --example remove_background -- input.jpg output.png [#RRGGBB]
//! ```

use std::env;
use std::process;

use rasterkit::background::{self, BackgroundSettings};
use rasterkit::classify::ClassifyMode;
use rasterkit::codec::{self, EncodeOptions};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <input> <output.png> [key color]", args[0]);
        process::exit(1);
    }

    let settings = BackgroundSettings {
        mode: if args.len() > 3 {
            ClassifyMode::Color
        } else {
            ClassifyMode::Auto
        },
        background_color: args.get(3).cloned().unwrap_or_else(|| "#FFFFFF".to_string()),
        smooth_edges: true,
        despeckle: true,
        ..BackgroundSettings::default()
    };

    let result = codec::open(args[1].as_ref()).and_then(|mut img| {
        let mask = background::apply(&mut img, &settings)?;
        let written = codec::save(&img, args[2].as_ref(), &EncodeOptions::default())?;
        Ok((mask.count(), written))
    });

    match result {
        Ok((removed, bytes)) => {
            println!("Done: {removed} background pixels, {bytes} bytes written");
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
