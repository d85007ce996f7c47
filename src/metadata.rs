//! Stream information recovered from the `fmt `, `cue `, `smpl` and `vorb` chunks.

use std::io::{Read, Seek, SeekFrom};

use crate::errors::{ConversionError, Result};
use crate::riff::{ChunkRange, ChunkTable, Endian};

const WWISE_VORBIS_CODEC: u16 = 0xFFFF;
const EXTENSIBLE_SIGNATURE: [u8; 16] = [
    1, 0, 0, 0, 0, 0, 0x10, 0, 0x80, 0, 0, 0xAA, 0, 0x38, 0x9b, 0x71,
];

/// Framing of each packet inside the `data` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketHeaderKind {
    /// 16-bit payload size.
    SizeOnly,
    /// 16-bit payload size followed by a 32-bit granule, which is ignored.
    SizeAndGranule,
}

impl PacketHeaderKind {
    pub fn header_size(self) -> u64 {
        match self {
            PacketHeaderKind::SizeOnly => 2,
            PacketHeaderKind::SizeAndGranule => 6,
        }
    }
}

/// The known byte layouts of the `vorb` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VorbLayout {
    /// No `vorb` chunk; the record sits at `fmt + 0x18` inside a 0x42-byte `fmt`.
    InFmt,
    /// 0x2A-byte `vorb` chunk.
    Compact,
    /// 0x32 or 0x34-byte `vorb` chunk.
    Extended,
}

impl VorbLayout {
    /// Picks the layout for a `fmt`/`vorb` pair and returns it with the record offset.
    pub fn resolve(fmt: ChunkRange, vorb: Option<ChunkRange>) -> Result<(Self, u64)> {
        match vorb {
            None if fmt.size == 0x42 => Ok((VorbLayout::InFmt, fmt.offset + 0x18)),
            None => Err(ConversionError::decode(format!(
                "unrecognized Wwise-Vorbis profile: no vorb chunk and fmt size {:#x}",
                fmt.size
            ))),
            Some(vorb) => match vorb.size {
                0x2A => Ok((VorbLayout::Compact, vorb.offset)),
                0x32 | 0x34 => Ok((VorbLayout::Extended, vorb.offset)),
                0x28 | 0x2C => Err(ConversionError::decode(format!(
                    "vorb size {:#x} uses granule-bearing packet headers, which are not supported",
                    vorb.size
                ))),
                other => Err(ConversionError::decode(format!(
                    "unrecognized Wwise-Vorbis profile: vorb size {:#x}",
                    other
                ))),
            },
        }
    }

    fn mod_signal_at(self) -> Option<u64> {
        match self {
            VorbLayout::InFmt | VorbLayout::Compact => Some(0x04),
            VorbLayout::Extended => None,
        }
    }

    fn packet_offsets_at(self) -> u64 {
        match self {
            VorbLayout::InFmt | VorbLayout::Compact => 0x10,
            VorbLayout::Extended => 0x18,
        }
    }

    /// Offset of the uid, which the two block size exponents follow.
    fn uid_at(self) -> u64 {
        match self {
            VorbLayout::InFmt | VorbLayout::Compact => 0x24,
            VorbLayout::Extended => 0x2C,
        }
    }

    pub fn packet_header(self) -> PacketHeaderKind {
        match self {
            VorbLayout::InFmt | VorbLayout::Compact => PacketHeaderKind::SizeOnly,
            VorbLayout::Extended => PacketHeaderKind::SizeAndGranule,
        }
    }
}

/// Validated loop region in samples, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopPoints {
    pub start: u32,
    pub end: u32,
}

impl LoopPoints {
    /// Normalizes the raw `smpl` values (inclusive end, 0 meaning "to the end")
    /// and checks them against the stream length.
    pub fn normalize(start: u32, raw_end: u32, sample_count: u32) -> Result<Self> {
        let end = if raw_end == 0 {
            sample_count
        } else {
            raw_end.saturating_add(1)
        };
        if start >= sample_count || end > sample_count || start > end {
            return Err(ConversionError::decode(format!(
                "loops out of range: {}..{} for {} samples",
                start, end, sample_count
            )));
        }
        Ok(Self { start, end })
    }
}

#[derive(Debug, Clone)]
pub struct StreamMetadata {
    pub channels: u16,
    pub sample_rate: u32,
    pub avg_bytes_per_second: u32,
    pub subtype: u32,
    pub cue_count: u32,
    pub loop_points: Option<LoopPoints>,
    pub sample_count: u32,
    pub setup_packet_offset: u32,
    pub first_audio_packet_offset: u32,
    pub uid: u32,
    pub blocksize_0_pow: u8,
    pub blocksize_1_pow: u8,
    pub layout: VorbLayout,
    pub mod_packets: bool,
}

impl StreamMetadata {
    pub fn parse<R: Read + Seek>(reader: &mut R, chunks: &ChunkTable) -> Result<Self> {
        let endian = chunks.endian;
        let fmt = chunks.fmt;

        if fmt.size < 0x12 {
            return Err(ConversionError::decode(format!(
                "fmt chunk too small ({} bytes)",
                fmt.size
            )));
        }
        reader.seek(SeekFrom::Start(fmt.offset))?;
        let codec = endian.read_u16(reader)?;
        if codec != WWISE_VORBIS_CODEC {
            return Err(ConversionError::decode(format!("bad codec id {:#06x}", codec)));
        }
        let channels = endian.read_u16(reader)?;
        if channels == 0 || channels > 255 {
            return Err(ConversionError::decode(format!("unsupported channel count {}", channels)));
        }
        let sample_rate = endian.read_u32(reader)?;
        let avg_bytes_per_second = endian.read_u32(reader)?;
        if endian.read_u16(reader)? != 0 {
            return Err(ConversionError::decode("bad block align"));
        }
        if endian.read_u16(reader)? != 0 {
            return Err(ConversionError::decode("expected 0 bps"));
        }
        let extra_len = endian.read_u16(reader)? as u64;
        if fmt.size - 0x12 != extra_len {
            return Err(ConversionError::decode(format!(
                "bad extra fmt length {} for fmt size {:#x}",
                extra_len, fmt.size
            )));
        }
        let mut subtype = 0;
        if extra_len >= 2 {
            // unknown u16 before the channel layout
            endian.read_u16(reader)?;
            if extra_len >= 6 {
                subtype = endian.read_u32(reader)?;
            }
        }
        if fmt.size == 0x28 {
            let mut signature = [0u8; 16];
            reader.read_exact(&mut signature)?;
            if signature != EXTENSIBLE_SIGNATURE {
                return Err(ConversionError::decode("expected signature in extra fmt"));
            }
        }

        let cue_count = match chunks.cue {
            Some(cue) => read_cue_count(reader, endian, cue)?,
            None => 0,
        };
        let raw_loop = match chunks.smpl {
            Some(smpl) => read_smpl_loop(reader, endian, smpl)?,
            None => None,
        };

        let (layout, vorb_offset) = VorbLayout::resolve(fmt, chunks.vorb)?;
        reader.seek(SeekFrom::Start(vorb_offset))?;
        let sample_count = endian.read_u32(reader)?;

        let mod_packets = match layout.mod_signal_at() {
            Some(at) => {
                reader.seek(SeekFrom::Start(vorb_offset + at))?;
                let mod_signal = endian.read_u32(reader)?;
                !matches!(mod_signal, 0x4A | 0x4B | 0x69 | 0x70)
            }
            None => false,
        };

        reader.seek(SeekFrom::Start(vorb_offset + layout.packet_offsets_at()))?;
        let setup_packet_offset = endian.read_u32(reader)?;
        let first_audio_packet_offset = endian.read_u32(reader)?;

        reader.seek(SeekFrom::Start(vorb_offset + layout.uid_at()))?;
        let uid = endian.read_u32(reader)?;
        let mut exponents = [0u8; 2];
        reader.read_exact(&mut exponents)?;
        let [blocksize_0_pow, blocksize_1_pow] = exponents;
        if !(6..=13).contains(&blocksize_0_pow)
            || !(6..=13).contains(&blocksize_1_pow)
            || blocksize_0_pow > blocksize_1_pow
        {
            return Err(ConversionError::decode(format!(
                "invalid block size exponents {}/{}",
                blocksize_0_pow, blocksize_1_pow
            )));
        }

        let data_size = chunks.data.size;
        if setup_packet_offset as u64 >= data_size {
            return Err(ConversionError::decode(format!(
                "setup packet offset {} outside data chunk of {} bytes",
                setup_packet_offset, data_size
            )));
        }
        if first_audio_packet_offset as u64 >= data_size {
            return Err(ConversionError::decode(format!(
                "first audio packet offset {} outside data chunk of {} bytes",
                first_audio_packet_offset, data_size
            )));
        }

        let loop_points = raw_loop
            .map(|(start, end)| LoopPoints::normalize(start, end, sample_count))
            .transpose()?;

        Ok(Self {
            channels,
            sample_rate,
            avg_bytes_per_second,
            subtype,
            cue_count,
            loop_points,
            sample_count,
            setup_packet_offset,
            first_audio_packet_offset,
            uid,
            blocksize_0_pow,
            blocksize_1_pow,
            layout,
            mod_packets,
        })
    }

    pub fn bitrate(&self) -> u32 {
        self.avg_bytes_per_second.wrapping_mul(8)
    }

    pub fn log_info(&self) {
        tracing::debug!(
            channels = self.channels,
            sample_rate = self.sample_rate,
            bitrate = self.bitrate(),
            samples = self.sample_count,
            "Wwise RIFF Vorbis stream"
        );
        tracing::debug!(
            layout = ?self.layout,
            subtype = self.subtype,
            uid = self.uid,
            blocksizes = ?(1u32 << self.blocksize_0_pow, 1u32 << self.blocksize_1_pow),
            "vorb record"
        );
        if let Some(loops) = self.loop_points {
            tracing::debug!(start = loops.start, end = loops.end, cues = self.cue_count, "loop");
        }
        if self.mod_packets {
            tracing::trace!("modified Vorbis packets");
        } else {
            tracing::trace!("standard Vorbis packets");
        }
    }
}

fn read_cue_count<R: Read + Seek>(reader: &mut R, endian: Endian, cue: ChunkRange) -> Result<u32> {
    if cue.size < 4 {
        return Err(ConversionError::decode("cue chunk too small"));
    }
    reader.seek(SeekFrom::Start(cue.offset))?;
    endian.read_u32(reader)
}

/// Returns the raw `(start, end)` of the single sample loop, if any.
fn read_smpl_loop<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    smpl: ChunkRange,
) -> Result<Option<(u32, u32)>> {
    if smpl.size < 0x20 {
        return Err(ConversionError::decode("smpl chunk too small"));
    }
    reader.seek(SeekFrom::Start(smpl.offset + 0x1C))?;
    let loop_count = endian.read_u32(reader)?;
    match loop_count {
        0 => Ok(None),
        1 => {
            if smpl.size < 0x34 {
                return Err(ConversionError::decode("smpl chunk too small for its loop"));
            }
            reader.seek(SeekFrom::Start(smpl.offset + 0x2C))?;
            let start = endian.read_u32(reader)?;
            let end = endian.read_u32(reader)?;
            Ok(Some((start, end)))
        }
        n => Err(ConversionError::decode(format!("expected one loop, found {}", n))),
    }
}
