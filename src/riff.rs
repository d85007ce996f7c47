//! RIFF/RIFX chunk scanning.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::errors::{ConversionError, Result};

/// Byte order of the container, chosen by its `RIFF`/`RIFX` signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn read_u16<R: Read + ?Sized>(self, reader: &mut R) -> Result<u16> {
        Ok(match self {
            Endian::Little => reader.read_u16::<LittleEndian>()?,
            Endian::Big => reader.read_u16::<BigEndian>()?,
        })
    }

    pub fn read_u32<R: Read + ?Sized>(self, reader: &mut R) -> Result<u32> {
        Ok(match self {
            Endian::Little => reader.read_u32::<LittleEndian>()?,
            Endian::Big => reader.read_u32::<BigEndian>()?,
        })
    }
}

/// Payload location of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub offset: u64,
    pub size: u64,
}

impl ChunkRange {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

#[derive(Debug, Clone)]
pub struct ChunkTable {
    pub endian: Endian,
    pub fmt: ChunkRange,
    pub cue: Option<ChunkRange>,
    pub smpl: Option<ChunkRange>,
    pub vorb: Option<ChunkRange>,
    pub data: ChunkRange,
}

impl ChunkTable {
    pub fn locate<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        if file_size < 12 {
            return Err(ConversionError::container("file too small for a RIFF header"));
        }

        let mut riff_head = [0u8; 4];
        reader.seek(SeekFrom::Start(0))?;
        reader.read_exact(&mut riff_head)?;
        let endian = match &riff_head {
            b"RIFF" => Endian::Little,
            b"RIFX" => Endian::Big,
            _ => return Err(ConversionError::container("missing RIFF")),
        };

        let riff_size = endian.read_u32(reader)? as u64 + 8;
        if riff_size > file_size {
            return Err(ConversionError::container(format!(
                "RIFF truncated: header announces {} bytes, source has {}",
                riff_size, file_size
            )));
        }

        let mut wave_head = [0u8; 4];
        reader.read_exact(&mut wave_head)?;
        if &wave_head != b"WAVE" {
            return Err(ConversionError::container("missing WAVE"));
        }

        let mut fmt = None;
        let mut cue = None;
        let mut smpl = None;
        let mut vorb = None;
        let mut data = None;

        let mut chunk_offset = 12u64;
        while chunk_offset < riff_size {
            if chunk_offset + 8 > riff_size {
                return Err(ConversionError::container(
                    "container truncated or corrupt: chunk header crosses RIFF bound",
                ));
            }
            reader.seek(SeekFrom::Start(chunk_offset))?;
            let mut chunk_type = [0u8; 4];
            reader.read_exact(&mut chunk_type)?;
            let chunk_size = endian.read_u32(reader)? as u64;
            let range = ChunkRange {
                offset: chunk_offset + 8,
                size: chunk_size,
            };
            if range.end() > riff_size {
                return Err(ConversionError::container(format!(
                    "container truncated or corrupt: chunk {:?} ends at {}, RIFF ends at {}",
                    String::from_utf8_lossy(&chunk_type),
                    range.end(),
                    riff_size
                )));
            }

            match &chunk_type {
                b"fmt " => fmt = Some(range),
                b"cue " => cue = Some(range),
                b"smpl" => smpl = Some(range),
                b"vorb" => vorb = Some(range),
                b"data" => data = Some(range),
                _ => tracing::trace!(
                    chunk = %String::from_utf8_lossy(&chunk_type),
                    size = chunk_size,
                    "skipping chunk"
                ),
            }
            chunk_offset = range.end();
        }

        let (Some(fmt), Some(data)) = (fmt, data) else {
            return Err(ConversionError::container("expected fmt, data chunks"));
        };

        Ok(Self {
            endian,
            fmt,
            cue,
            smpl,
            vorb,
            data,
        })
    }
}
