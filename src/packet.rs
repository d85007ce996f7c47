use crate::bit_stream::{BitReader, BitUintV, BitWriter, ByteReader};
use crate::errors::{ConversionError, Result};
use crate::metadata::PacketHeaderKind;
use crate::riff::Endian;
use crate::setup::ModeTable;

// -------------------- SourcePacket -------------------------------------------
/// One `(header, payload)` record inside the `data` chunk.
#[derive(Debug, Clone, Copy)]
pub struct SourcePacket<'a> {
    offset: usize,
    header_size: usize,
    granule: Option<u32>,
    payload: &'a [u8],
}

impl<'a> SourcePacket<'a> {
    /// Granule stored in a 6-byte header; 2-byte headers carry none.
    pub fn granule(&self) -> Option<u32> {
        self.granule
    }

    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    pub fn next_offset(&self) -> usize {
        self.offset + self.header_size + self.payload.len()
    }
}

// -------------------- DataChunk ----------------------------------------------
/// The `data` chunk held in memory, addressed by packet offset.
pub struct DataChunk<'a> {
    bytes: &'a [u8],
    endian: Endian,
    header: PacketHeaderKind,
}

impl<'a> DataChunk<'a> {
    pub fn new(bytes: &'a [u8], endian: Endian, header: PacketHeaderKind) -> Self {
        Self {
            bytes,
            endian,
            header,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn packet_at(&self, offset: usize) -> Result<SourcePacket<'a>> {
        let header_size = self.header.header_size() as usize;
        let payload_offset = offset + header_size;
        if payload_offset > self.bytes.len() {
            return Err(ConversionError::decode(format!(
                "packet header at {} truncated by end of data chunk ({} bytes)",
                offset,
                self.bytes.len()
            )));
        }
        let mut head = &self.bytes[offset..payload_offset];
        let size = self.endian.read_u16(&mut head)? as usize;
        let granule = match self.header {
            PacketHeaderKind::SizeOnly => None,
            PacketHeaderKind::SizeAndGranule => Some(self.endian.read_u32(&mut head)?),
        };

        let end = payload_offset + size;
        if end > self.bytes.len() {
            return Err(ConversionError::decode(format!(
                "packet at {} truncated: {} payload bytes, data chunk ends at {}",
                offset,
                size,
                self.bytes.len()
            )));
        }
        Ok(SourcePacket {
            offset,
            header_size,
            granule,
            payload: &self.bytes[payload_offset..end],
        })
    }
}

// -------------------- AudioPacketRebuilder -----------------------------------
/// Restores standard Vorbis framing on audio packets.
pub struct AudioPacketRebuilder<'m> {
    modes: &'m ModeTable,
    modified: bool,
    prev_long: bool,
}

impl<'m> AudioPacketRebuilder<'m> {
    pub fn new(modes: &'m ModeTable, modified: bool) -> Self {
        Self {
            modes,
            modified,
            prev_long: false,
        }
    }

    /// Rebuilds `packet`; `next` is only peeked at, for the window-shape flags.
    pub fn rebuild(
        &mut self,
        packet: &SourcePacket<'_>,
        next: Option<&SourcePacket<'_>>,
    ) -> Result<Vec<u8>> {
        let payload = packet.payload();
        if !self.modified || payload.is_empty() {
            return Ok(payload.to_vec());
        }

        let mode_bits = self.modes.mode_bits();
        let mut reader = ByteReader::new(payload, "audio packet");
        let (mode_number, remainder) = reader.bitwise(|ss| {
            let mode_number = BitUintV::read_from(ss, mode_bits)?;
            let remainder = BitUintV::read_from(ss, 8 - mode_bits)?;
            Ok((mode_number, remainder))
        })?;
        let long = self.modes.block_flag(mode_number.total)?;

        let mut os = BitWriter::new();
        // packet type: audio
        os.write_bit(false);
        mode_number.write_to(&mut os);
        if long {
            let next_long = match next {
                Some(next) if !next.payload().is_empty() => {
                    let next_mode =
                        BitReader::new(next.payload(), "audio packet").read_bits(mode_bits)?;
                    self.modes.block_flag(next_mode)?
                }
                _ => false,
            };
            os.write_bit(self.prev_long);
            os.write_bit(next_long);
        }
        self.prev_long = long;

        remainder.write_to(&mut os);
        os.write_bytes(reader.remaining());
        Ok(os.into_bytes())
    }
}
