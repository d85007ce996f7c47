//! Converts Wwise RIFF/RIFX Vorbis streams ("WEM") into standard Ogg Vorbis.
//!
//! Wwise strips the Vorbis header packets down to references into a shared
//! codebook dictionary and narrows most setup fields. This crate re-expands
//! them and re-muxes the audio packets into Ogg pages.
//!
//! ```no_run
//! use wem_converter::{convert, CodebookDictionary};
//!
//! let dictionary = CodebookDictionary::from_file("packed_codebooks.bin")?;
//! let source = std::fs::File::open("input.wem")?;
//! let ogg = convert(source, &dictionary)?;
//! std::fs::write("input.ogg", ogg)?;
//! # Ok::<(), wem_converter::ConversionError>(())
//! ```

use std::io::{Read, Seek, Write};

pub mod bit_stream;
pub mod codebook;
pub mod errors;
pub mod metadata;
pub mod muxer;
pub mod ogg;
pub mod packet;
pub mod riff;
pub mod setup;
pub mod wwriff;

pub use codebook::CodebookDictionary;
pub use errors::{ConversionError, ErrorCategory, Result};
pub use metadata::{LoopPoints, StreamMetadata, VorbLayout};
pub use wwriff::WwiseRiffVorbis;

/// Converts a complete WEM source into Ogg Vorbis bytes.
pub fn convert<R: Read + Seek>(source: R, dictionary: &CodebookDictionary) -> Result<Vec<u8>> {
    WwiseRiffVorbis::new(source)?.generate_ogg(dictionary)
}

/// Converts `source` and writes the result to `sink` once the conversion succeeded.
pub fn convert_into<R, W>(source: R, dictionary: &CodebookDictionary, sink: &mut W) -> Result<()>
where
    R: Read + Seek,
    W: Write + ?Sized,
{
    WwiseRiffVorbis::new(source)?.write_ogg(dictionary, sink)
}
