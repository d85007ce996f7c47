#![allow(dead_code)]

use std::io::Write;

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use wem_converter::bit_stream::BitWriter;
use wem_converter::CodebookDictionary;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// Packed two-entry, one-dimension codebook with 1-bit codewords.
pub fn trivial_codebook() -> Vec<u8> {
    let mut w = BitWriter::new();
    w.write_bits(1, 4);
    w.write_bits(2, 14);
    w.write_bits(0, 1);
    w.write_bits(1, 3);
    w.write_bits(0, 1);
    w.write_bits(0, 1);
    w.write_bits(0, 1);
    w.write_bits(0, 1);
    w.into_bytes()
}

pub fn dictionary_blob(records: &[Vec<u8>]) -> Vec<u8> {
    let mut blob = Vec::new();
    let mut offsets = Vec::new();
    for record in records {
        offsets.push(blob.len() as u32);
        blob.extend_from_slice(record);
    }
    offsets.push(blob.len() as u32);
    for offset in offsets {
        blob.write_u32::<LittleEndian>(offset).unwrap();
    }
    blob
}

pub fn trivial_dictionary() -> CodebookDictionary {
    CodebookDictionary::from_bytes(&dictionary_blob(&[trivial_codebook()])).unwrap()
}

/// A compacted setup packet with one of each section.
#[derive(Clone)]
pub struct CompactSetup {
    pub floor_book_plus1: u32,
    pub residue_classbook: u32,
    /// Submap count and the per-channel mux entries.
    pub submaps: Option<(u32, Vec<u32>)>,
    pub mapping_floor: u32,
    pub mapping_residue: u32,
    pub mode_flags: Vec<bool>,
    pub mode_mapping: u32,
}

impl Default for CompactSetup {
    fn default() -> Self {
        Self {
            floor_book_plus1: 0,
            residue_classbook: 0,
            submaps: None,
            mapping_floor: 0,
            mapping_residue: 0,
            mode_flags: vec![false],
            mode_mapping: 0,
        }
    }
}

impl CompactSetup {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(0, 8);
        w.write_bits(0, 10);

        w.write_bits(0, 6);
        w.write_bits(1, 5);
        w.write_bits(0, 4);
        w.write_bits(0, 3);
        w.write_bits(0, 2);
        w.write_bits(self.floor_book_plus1, 8);
        w.write_bits(1, 2);
        w.write_bits(4, 4);
        w.write_bits(8, 4);

        w.write_bits(0, 6);
        w.write_bits(0, 2);
        w.write_bits(0, 24);
        w.write_bits(0, 24);
        w.write_bits(0, 24);
        w.write_bits(0, 6);
        w.write_bits(self.residue_classbook, 8);
        w.write_bits(0, 3);
        w.write_bits(0, 1);

        w.write_bits(0, 6);
        match &self.submaps {
            Some((count, _)) => {
                w.write_bits(1, 1);
                w.write_bits(count - 1, 4);
            }
            None => w.write_bits(0, 1),
        }
        w.write_bits(0, 1);
        w.write_bits(0, 2);
        let submap_count = match &self.submaps {
            Some((count, mux)) => {
                for &entry in mux {
                    w.write_bits(entry, 4);
                }
                *count
            }
            None => 1,
        };
        for _ in 0..submap_count {
            w.write_bits(0, 8);
            w.write_bits(self.mapping_floor, 8);
            w.write_bits(self.mapping_residue, 8);
        }

        w.write_bits(self.mode_flags.len() as u32 - 1, 6);
        for &flag in &self.mode_flags {
            w.write_bit(flag);
            w.write_bits(self.mode_mapping, 8);
        }
        w.into_bytes()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// vorb record inside a 0x42-byte fmt chunk
    InFmt,
    /// 0x2A-byte vorb chunk
    Compact,
    /// 0x34-byte vorb chunk with 6-byte packet headers
    Extended,
    /// a vorb chunk of an arbitrary size, zero filled
    Raw(u32),
}

/// Builder for synthetic Wwise Vorbis sources.
#[derive(Clone)]
pub struct WemBuilder {
    pub big_endian: bool,
    pub layout: Layout,
    pub codec: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub avg_bytes_per_second: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    /// Overrides the extra-length field of `fmt`.
    pub extra_len_override: Option<u16>,
    /// Emits a 0x28-byte `fmt` carrying this signature.
    pub extensible_signature: Option<[u8; 16]>,
    /// Emits a `fmt` chunk cut down to its first 0x10 bytes.
    pub short_fmt: bool,
    pub sample_count: u32,
    pub mod_signal: u32,
    pub blocksize_pows: (u8, u8),
    pub setup: Vec<u8>,
    pub audio: Vec<Vec<u8>>,
    pub smpl_loop: Option<(u32, u32)>,
    pub smpl_loop_count: u32,
    pub cue_count: Option<u32>,
    pub junk_chunk: bool,
    pub setup_offset: u32,
    pub first_audio_override: Option<u32>,
    /// Granule stored in the setup packet header of 6-byte layouts.
    pub setup_granule: u32,
}

impl Default for WemBuilder {
    fn default() -> Self {
        Self {
            big_endian: false,
            layout: Layout::Compact,
            codec: 0xFFFF,
            channels: 1,
            sample_rate: 48000,
            avg_bytes_per_second: 4000,
            block_align: 0,
            bits_per_sample: 0,
            extra_len_override: None,
            extensible_signature: None,
            short_fmt: false,
            sample_count: 32,
            mod_signal: 0,
            blocksize_pows: (6, 6),
            setup: CompactSetup::default().encode(),
            audio: vec![vec![0x00], vec![0x00]],
            smpl_loop: None,
            smpl_loop_count: 1,
            cue_count: None,
            junk_chunk: false,
            setup_offset: 0,
            first_audio_override: None,
            setup_granule: 0,
        }
    }
}

impl WemBuilder {
    fn u16(&self, out: &mut Vec<u8>, v: u16) {
        if self.big_endian {
            out.write_u16::<BigEndian>(v).unwrap();
        } else {
            out.write_u16::<LittleEndian>(v).unwrap();
        }
    }

    fn u32(&self, out: &mut Vec<u8>, v: u32) {
        if self.big_endian {
            out.write_u32::<BigEndian>(v).unwrap();
        } else {
            out.write_u32::<LittleEndian>(v).unwrap();
        }
    }

    fn header_size(&self) -> usize {
        match self.layout {
            Layout::Extended => 6,
            _ => 2,
        }
    }

    fn packet(&self, out: &mut Vec<u8>, payload: &[u8], granule: u32) {
        self.u16(out, payload.len() as u16);
        if self.header_size() == 6 {
            self.u32(out, granule);
        }
        out.extend_from_slice(payload);
    }

    pub fn data_chunk(&self) -> Vec<u8> {
        let mut data = Vec::new();
        self.packet(&mut data, &self.setup, self.setup_granule);
        for payload in &self.audio {
            self.packet(&mut data, payload, 0xFFFF_FFFF);
        }
        data
    }

    pub fn first_audio_offset(&self) -> u32 {
        self.first_audio_override
            .unwrap_or((self.header_size() + self.setup.len()) as u32)
    }

    /// The vorb record; the layout decides where the fields sit.
    fn vorb_record(&self) -> Vec<u8> {
        let (size, offsets_at, uid_at) = match self.layout {
            Layout::InFmt => (0x2A, 0x10, 0x24),
            Layout::Compact => (0x2A, 0x10, 0x24),
            Layout::Extended => (0x34, 0x18, 0x2C),
            Layout::Raw(size) => return vec![0; size as usize],
        };
        let mut record = Vec::new();
        self.u32(&mut record, self.sample_count);
        self.u32(&mut record, self.mod_signal);
        record.resize(offsets_at, 0);
        self.u32(&mut record, self.setup_offset);
        self.u32(&mut record, self.first_audio_offset());
        record.resize(uid_at, 0);
        self.u32(&mut record, 0x1234_5678);
        record.push(self.blocksize_pows.0);
        record.push(self.blocksize_pows.1);
        record.resize(size, 0);
        record
    }

    fn fmt_chunk(&self) -> Vec<u8> {
        let mut fmt = Vec::new();
        self.u16(&mut fmt, self.codec);
        self.u16(&mut fmt, self.channels);
        self.u32(&mut fmt, self.sample_rate);
        self.u32(&mut fmt, self.avg_bytes_per_second);
        self.u16(&mut fmt, self.block_align);
        self.u16(&mut fmt, self.bits_per_sample);
        let extra_len = match (self.layout, self.extensible_signature) {
            (Layout::InFmt, _) => 0x42 - 0x12,
            (_, Some(_)) => 0x28 - 0x12,
            _ => 6,
        };
        self.u16(&mut fmt, self.extra_len_override.unwrap_or(extra_len));
        self.u16(&mut fmt, 0);
        self.u32(&mut fmt, 3);
        if let Some(signature) = self.extensible_signature {
            fmt.extend_from_slice(&signature);
        }
        if self.layout == Layout::InFmt {
            fmt.extend_from_slice(&self.vorb_record());
        }
        if self.short_fmt {
            fmt.truncate(0x10);
        }
        fmt
    }

    fn smpl_chunk(&self, (start, end): (u32, u32)) -> Vec<u8> {
        let mut smpl = vec![0; 0x1C];
        self.u32(&mut smpl, self.smpl_loop_count);
        smpl.resize(0x2C, 0);
        self.u32(&mut smpl, start);
        self.u32(&mut smpl, end);
        smpl.resize(0x3C, 0);
        smpl
    }

    fn chunk(&self, out: &mut Vec<u8>, fourcc: &[u8; 4], payload: &[u8]) {
        out.write_all(fourcc).unwrap();
        self.u32(out, payload.len() as u32);
        out.write_all(payload).unwrap();
    }

    pub fn build(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.write_all(b"WAVE").unwrap();
        self.chunk(&mut body, b"fmt ", &self.fmt_chunk());
        if let Some(count) = self.cue_count {
            let mut cue = Vec::new();
            self.u32(&mut cue, count);
            cue.resize(4 + 24 * count as usize, 0);
            self.chunk(&mut body, b"cue ", &cue);
        }
        if let Some(loops) = self.smpl_loop {
            self.chunk(&mut body, b"smpl", &self.smpl_chunk(loops));
        }
        if self.junk_chunk {
            self.chunk(&mut body, b"JUNK", &[0xEE; 6]);
        }
        if self.layout != Layout::InFmt {
            self.chunk(&mut body, b"vorb", &self.vorb_record());
        }
        self.chunk(&mut body, b"data", &self.data_chunk());

        let mut out = Vec::new();
        out.write_all(if self.big_endian { b"RIFX" } else { b"RIFF" }).unwrap();
        self.u32(&mut out, body.len() as u32);
        out.extend_from_slice(&body);
        out
    }
}

/// Page header fields read straight from the output bytes.
pub struct RawPage {
    pub flags: u8,
    pub granule: i64,
    pub sequence: u32,
    pub serial: u32,
    pub lacing: Vec<u8>,
}

pub fn split_pages(bytes: &[u8]) -> Vec<RawPage> {
    let mut pages = Vec::new();
    let mut at = 0;
    while at < bytes.len() {
        assert_eq!(&bytes[at..at + 4], b"OggS", "page capture at {}", at);
        let segments = bytes[at + 26] as usize;
        let lacing = bytes[at + 27..at + 27 + segments].to_vec();
        let body: usize = lacing.iter().map(|&l| l as usize).sum();
        pages.push(RawPage {
            flags: bytes[at + 5],
            granule: i64::from_le_bytes(bytes[at + 6..at + 14].try_into().unwrap()),
            serial: u32::from_le_bytes(bytes[at + 14..at + 18].try_into().unwrap()),
            sequence: u32::from_le_bytes(bytes[at + 18..at + 22].try_into().unwrap()),
            lacing,
        });
        at += 27 + segments + body;
    }
    assert_eq!(at, bytes.len());
    pages
}
