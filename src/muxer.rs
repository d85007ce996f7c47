use crate::bit_stream::BitReader;
use crate::errors::{ConversionError, Result};
use crate::ogg::OggStream;
use crate::setup::ModeTable;

pub const DEFAULT_SERIAL: u32 = 1;

/// Pages a Vorbis stream and tracks its granule position.
pub struct VorbisMuxer {
    stream: OggStream,
    out: Vec<u8>,
    block_sizes: [u32; 2],
    prev_block_size: Option<u32>,
    granule: i64,
    pages: usize,
}

impl VorbisMuxer {
    pub fn new(serial: u32, blocksize_0_pow: u8, blocksize_1_pow: u8) -> Self {
        Self {
            stream: OggStream::new(serial),
            out: Vec::new(),
            block_sizes: [1 << blocksize_0_pow, 1 << blocksize_1_pow],
            prev_block_size: None,
            granule: 0,
            pages: 0,
        }
    }

    /// Queues a header packet and flushes it onto its own page.
    pub fn write_header(&mut self, packet: &[u8]) {
        self.stream.packetin(packet, 0, false);
        while let Some(page) = self.stream.flush() {
            page.write_into(&mut self.out);
            self.pages += 1;
        }
    }

    /// Queues an audio packet, advancing the granule position by its block size.
    pub fn write_audio(&mut self, packet: &[u8], modes: &ModeTable, eos: bool) -> Result<()> {
        if let Some(block_size) = self.block_size(packet, modes)? {
            if let Some(prev) = self.prev_block_size {
                self.granule += ((prev + block_size) / 4) as i64;
            }
            self.prev_block_size = Some(block_size);
        }
        self.stream.packetin(packet, self.granule, eos);
        while let Some(page) = self.stream.pageout() {
            page.write_into(&mut self.out);
            self.pages += 1;
        }
        Ok(())
    }

    /// Block size of a standard-framed audio packet; empty packets have none.
    fn block_size(&self, packet: &[u8], modes: &ModeTable) -> Result<Option<u32>> {
        if packet.is_empty() {
            return Ok(None);
        }
        let mut bits = BitReader::new(packet, "audio packet");
        if bits.read_bit()? {
            return Err(ConversionError::decode("audio packet carries a header packet type"));
        }
        let mode = bits.read_bits(modes.mode_bits())?;
        let long = modes.block_flag(mode)?;
        Ok(Some(self.block_sizes[long as usize]))
    }

    pub fn granule(&self) -> i64 {
        self.granule
    }

    pub fn packet_count(&self) -> u64 {
        self.stream.packet_count()
    }

    /// Flushes every queued packet and returns the finished stream.
    pub fn finish(mut self) -> Vec<u8> {
        while let Some(page) = self.stream.flush() {
            page.write_into(&mut self.out);
            self.pages += 1;
        }
        tracing::debug!(
            pages = self.pages,
            packets = self.stream.packet_count(),
            granule = self.granule,
            bytes = self.out.len(),
            "ogg stream finished"
        );
        self.out
    }
}
