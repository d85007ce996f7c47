use std::env;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use tracing_error::ErrorLayer;
use tracing_subscriber::{layer::SubscriberExt, Registry};
use wem_converter::{CodebookDictionary, WwiseRiffVorbis};

fn main() {
    let subscriber = Registry::default()
        .with(ErrorLayer::default())
        .with(tracing_subscriber::fmt::Layer::default());
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global subscriber");

    let mut args = env::args().skip(1);
    let input_wem = PathBuf::from(args.next().unwrap_or_else(|| "input.wem".to_string()));
    let codebooks_file = args
        .next()
        .unwrap_or_else(|| "bin/packed_codebooks.bin".to_string());
    let output_ogg = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| input_wem.with_extension("ogg"));

    let dictionary = match CodebookDictionary::from_file(&codebooks_file) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error loading codebooks {}: {:?}", codebooks_file, e);
            return;
        }
    };

    let mut vorbis = match WwiseRiffVorbis::open(&input_wem) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error creating WwiseRiffVorbis: {:?}", e);
            return;
        }
    };
    vorbis.print_info();

    let file = match File::create(&output_ogg) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error creating {}: {:?}", output_ogg.display(), e);
            return;
        }
    };
    let mut writer = BufWriter::new(file);
    if let Err(e) = vorbis.write_ogg(&dictionary, &mut writer) {
        eprintln!("Error generating OGG file ({:?}): {}", e.category(), e);
    } else {
        println!("OGG file generated successfully: {}", output_ogg.display());
    }
}
