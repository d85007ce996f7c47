use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::bit_stream::BitWriter;
use crate::codebook::CodebookDictionary;
use crate::errors::{ConversionError, Result};
use crate::metadata::StreamMetadata;
use crate::muxer::{VorbisMuxer, DEFAULT_SERIAL};
use crate::packet::{AudioPacketRebuilder, DataChunk};
use crate::riff::{ChunkTable, Endian};
use crate::setup::{rebuild_setup_packet, ModeTable, SetupContext};

// -------------------- VorbisPacketType ---------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VorbisPacketType {
    Identification = 1,
    Comment = 3,
    Setup = 5,
}

impl VorbisPacketType {
    /// Writes the common header: packet type, then "vorbis".
    pub fn write_to(self, os: &mut BitWriter) {
        os.write_bits(self as u32, 8);
        os.write_bytes(b"vorbis");
    }
}

fn write_length_prefixed(os: &mut BitWriter, text: &str) {
    os.write_bits(text.len() as u32, 32);
    os.write_bytes(text.as_bytes());
}

// -------------------- WwiseRiffVorbis -----------------------------------------
/// A parsed Wwise RIFF/RIFX Vorbis source, ready to be converted.
#[derive(Debug)]
pub struct WwiseRiffVorbis<R: Read + Seek> {
    infile: BufReader<R>,
    chunks: ChunkTable,
    metadata: StreamMetadata,
    serial: u32,
}

impl WwiseRiffVorbis<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::new(file)
    }
}

impl<R: Read + Seek> WwiseRiffVorbis<R> {
    /// Locates the chunks of `source` and recovers the stream metadata.
    #[tracing::instrument(skip_all)]
    pub fn new(source: R) -> Result<Self> {
        let mut infile = BufReader::new(source);
        let chunks = ChunkTable::locate(&mut infile)?;
        let metadata = StreamMetadata::parse(&mut infile, &chunks)?;
        Ok(Self {
            infile,
            chunks,
            metadata,
            serial: DEFAULT_SERIAL,
        })
    }

    /// Uses `serial` as the Ogg stream serial number instead of the default.
    pub fn with_serial(mut self, serial: u32) -> Self {
        self.serial = serial;
        self
    }

    pub fn metadata(&self) -> &StreamMetadata {
        &self.metadata
    }

    pub fn print_info(&self) {
        let waveform = match self.chunks.endian {
            Endian::Little => "RIFF WAVE",
            Endian::Big => "RIFX WAVE",
        };
        tracing::debug!(
            "{} {} channel{} {} Hz {} bps",
            waveform,
            self.metadata.channels,
            if self.metadata.channels != 1 { "s" } else { "" },
            self.metadata.sample_rate,
            self.metadata.bitrate()
        );
        self.metadata.log_info();
    }

    /// Converts the whole stream and returns the finished Ogg Vorbis bytes.
    #[tracing::instrument(skip_all, fields(serial = self.serial))]
    pub fn generate_ogg(&mut self, dictionary: &CodebookDictionary) -> Result<Vec<u8>> {
        let data_bytes = self.read_data_chunk()?;
        let data = DataChunk::new(
            &data_bytes,
            self.chunks.endian,
            self.metadata.layout.packet_header(),
        );

        let mut muxer = VorbisMuxer::new(
            self.serial,
            self.metadata.blocksize_0_pow,
            self.metadata.blocksize_1_pow,
        );
        muxer.write_header(&self.identification_packet());
        muxer.write_header(&self.comment_packet());
        let (setup, modes) = self.setup_packet(&data, dictionary)?;
        muxer.write_header(&setup);

        self.write_audio_packets(&data, &modes, &mut muxer)?;
        Ok(muxer.finish())
    }

    /// Converts the stream and writes it to `sink`; nothing is written on failure.
    pub fn write_ogg<W: Write + ?Sized>(
        &mut self,
        dictionary: &CodebookDictionary,
        sink: &mut W,
    ) -> Result<()> {
        let ogg = self.generate_ogg(dictionary)?;
        sink.write_all(&ogg)?;
        sink.flush()?;
        Ok(())
    }

    fn read_data_chunk(&mut self) -> Result<Vec<u8>> {
        let data = self.chunks.data;
        self.infile.seek(SeekFrom::Start(data.offset))?;
        let mut bytes = vec![0u8; data.size as usize];
        self.infile.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn identification_packet(&self) -> Vec<u8> {
        let m = &self.metadata;
        let mut os = BitWriter::new();
        VorbisPacketType::Identification.write_to(&mut os);
        os.write_bits(0, 32); // version
        os.write_bits(m.channels as u32, 8);
        os.write_bits(m.sample_rate, 32);
        os.write_bits(0, 32); // bitrate maximum
        os.write_bits(m.bitrate(), 32);
        os.write_bits(0, 32); // bitrate minimum
        os.write_bits(m.blocksize_0_pow as u32, 4);
        os.write_bits(m.blocksize_1_pow as u32, 4);
        os.write_bit(true);
        os.into_bytes()
    }

    fn comment_packet(&self) -> Vec<u8> {
        let mut os = BitWriter::new();
        VorbisPacketType::Comment.write_to(&mut os);
        let vendor = format!(
            "converted from Audiokinetic Wwise by wem_converter {}",
            env!("CARGO_PKG_VERSION")
        );
        write_length_prefixed(&mut os, &vendor);

        match self.metadata.loop_points {
            None => os.write_bits(0, 32),
            Some(loops) => {
                os.write_bits(2, 32);
                write_length_prefixed(&mut os, &format!("LoopStart={}", loops.start));
                write_length_prefixed(&mut os, &format!("LoopEnd={}", loops.end));
            }
        }
        os.write_bit(true);
        os.into_bytes()
    }

    fn setup_packet(
        &self,
        data: &DataChunk<'_>,
        dictionary: &CodebookDictionary,
    ) -> Result<(Vec<u8>, ModeTable)> {
        let packet = data.packet_at(self.metadata.setup_packet_offset as usize)?;
        if let Some(granule) = packet.granule().filter(|&g| g != 0) {
            return Err(ConversionError::decode(format!(
                "setup packet granule {} != 0",
                granule
            )));
        }
        let first_audio = self.metadata.first_audio_packet_offset as usize;
        if packet.next_offset() != first_audio {
            return Err(ConversionError::decode(format!(
                "setup packet ends at {}, first audio packet starts at {}",
                packet.next_offset(),
                first_audio
            )));
        }

        let mut os = BitWriter::new();
        VorbisPacketType::Setup.write_to(&mut os);
        let mut ctx = SetupContext::new(self.metadata.channels, dictionary);
        let modes = rebuild_setup_packet(packet.payload(), &mut ctx, &mut os)?;
        Ok((os.into_bytes(), modes))
    }

    fn write_audio_packets(
        &self,
        data: &DataChunk<'_>,
        modes: &ModeTable,
        muxer: &mut VorbisMuxer,
    ) -> Result<()> {
        let mut rebuilder = AudioPacketRebuilder::new(modes, self.metadata.mod_packets);
        let mut current = Some(data.packet_at(self.metadata.first_audio_packet_offset as usize)?);
        let mut count = 0usize;
        while let Some(packet) = current {
            let next_offset = packet.next_offset();
            let next = if next_offset < data.len() {
                Some(data.packet_at(next_offset)?)
            } else {
                None
            };
            let rebuilt = rebuilder.rebuild(&packet, next.as_ref())?;
            muxer.write_audio(&rebuilt, modes, next.is_none())?;
            count += 1;
            current = next;
        }
        tracing::debug!(packets = count, granule = muxer.granule(), "converted audio packets");
        Ok(())
    }
}
