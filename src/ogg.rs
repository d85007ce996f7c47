//! Ogg page construction for a single logical stream.
//!
//! Packets are queued as lacing values with `packetin` and cut into pages by
//! `pageout` (lazy) or `flush` (immediate), following the paging rules of the
//! reference libogg implementation so that output pages match it byte for byte.

use byteorder::{ByteOrder, LittleEndian};

const HEADER_BYTES: usize = 27;
const MAX_SEGMENTS: usize = 255;
/// Body size after which `pageout` cuts a page, given enough finished packets.
const PAGE_FILL: usize = 4096;

const FLAG_CONTINUED: u8 = 0x01;
const FLAG_BOS: u8 = 0x02;
const FLAG_EOS: u8 = 0x04;

/// CRC-32 with polynomial 0x04C11DB7, no reflection, zero initial value.
pub fn checksum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |crc, &b| {
        (crc << 8) ^ CRC_LOOKUP[((crc >> 24) as u8 ^ b) as usize]
    })
}

static CRC_LOOKUP: [u32; 256] = crc_table();

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut r = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            r = if r & 0x8000_0000 != 0 {
                (r << 1) ^ 0x04C1_1DB7
            } else {
                r << 1
            };
            bit += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

#[derive(Debug, Clone, Copy)]
struct Lacing {
    value: u8,
    begins_packet: bool,
    granule: i64,
}

/// A finished page: header (with CRC) followed by body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OggPage {
    pub header: Vec<u8>,
    pub body: Vec<u8>,
}

impl OggPage {
    pub fn flags(&self) -> u8 {
        self.header[5]
    }

    pub fn granule(&self) -> i64 {
        LittleEndian::read_i64(&self.header[6..14])
    }

    pub fn sequence(&self) -> u32 {
        LittleEndian::read_u32(&self.header[18..22])
    }

    pub fn segment_count(&self) -> usize {
        self.header[26] as usize
    }

    pub fn is_bos(&self) -> bool {
        self.flags() & FLAG_BOS != 0
    }

    pub fn is_eos(&self) -> bool {
        self.flags() & FLAG_EOS != 0
    }

    pub fn is_continued(&self) -> bool {
        self.flags() & FLAG_CONTINUED != 0
    }

    pub fn len(&self) -> usize {
        self.header.len() + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn write_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.body);
    }
}

/// Stream state for one serial number.
#[derive(Debug)]
pub struct OggStream {
    serial: u32,
    body: Vec<u8>,
    lacing: Vec<Lacing>,
    packet_count: u64,
    page_sequence: u32,
    bos_written: bool,
    eos_queued: bool,
    granule: i64,
}

impl OggStream {
    pub fn new(serial: u32) -> Self {
        Self {
            serial,
            body: Vec::new(),
            lacing: Vec::new(),
            packet_count: 0,
            page_sequence: 0,
            bos_written: false,
            eos_queued: false,
            granule: 0,
        }
    }

    /// Number of packets queued so far.
    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    /// Queues one packet ending at `granule`.
    pub fn packetin(&mut self, packet: &[u8], granule: i64, eos: bool) {
        let lacing_count = packet.len() / 255 + 1;
        let start = self.lacing.len();
        for _ in 0..lacing_count - 1 {
            self.lacing.push(Lacing {
                value: 255,
                begins_packet: false,
                granule: self.granule,
            });
        }
        self.lacing.push(Lacing {
            value: (packet.len() % 255) as u8,
            begins_packet: false,
            granule,
        });
        self.lacing[start].begins_packet = true;
        self.granule = granule;

        self.body.extend_from_slice(packet);
        self.packet_count += 1;
        if eos {
            self.eos_queued = true;
        }
    }

    /// Returns a page if enough data is queued to complete one.
    pub fn pageout(&mut self) -> Option<OggPage> {
        let pending = !self.lacing.is_empty();
        let force = pending && (self.eos_queued || !self.bos_written);
        self.next_page(force)
    }

    /// Returns a page holding whatever is queued, if anything.
    pub fn flush(&mut self) -> Option<OggPage> {
        self.next_page(true)
    }

    fn next_page(&mut self, mut force: bool) -> Option<OggPage> {
        let max_vals = self.lacing.len().min(MAX_SEGMENTS);
        if max_vals == 0 {
            return None;
        }

        let mut vals = 0;
        let mut granule = -1i64;
        if !self.bos_written {
            // the first page carries only the first packet
            granule = 0;
            while vals < max_vals {
                let lace = self.lacing[vals];
                vals += 1;
                if lace.value < 255 {
                    break;
                }
            }
        } else {
            let mut body_fill = 0usize;
            let mut packets_done = 0;
            let mut packet_just_done = 0;
            while vals < max_vals {
                if body_fill > PAGE_FILL && packet_just_done >= 4 {
                    force = true;
                    break;
                }
                let lace = self.lacing[vals];
                body_fill += lace.value as usize;
                if lace.value < 255 {
                    granule = lace.granule;
                    packets_done += 1;
                    packet_just_done = packets_done;
                } else {
                    packet_just_done = 0;
                }
                vals += 1;
            }
            if vals == MAX_SEGMENTS {
                force = true;
            }
        }
        if !force {
            return None;
        }

        let mut flags = 0;
        if !self.lacing[0].begins_packet {
            flags |= FLAG_CONTINUED;
        }
        if !self.bos_written {
            flags |= FLAG_BOS;
        }
        if self.eos_queued && self.lacing.len() == vals {
            flags |= FLAG_EOS;
        }
        self.bos_written = true;

        let body_len: usize = self.lacing[..vals].iter().map(|l| l.value as usize).sum();
        let mut header = vec![0u8; HEADER_BYTES + vals];
        header[0..4].copy_from_slice(b"OggS");
        header[4] = 0;
        header[5] = flags;
        LittleEndian::write_i64(&mut header[6..14], granule);
        LittleEndian::write_u32(&mut header[14..18], self.serial);
        LittleEndian::write_u32(&mut header[18..22], self.page_sequence);
        header[26] = vals as u8;
        for (slot, lace) in header[HEADER_BYTES..].iter_mut().zip(&self.lacing[..vals]) {
            *slot = lace.value;
        }
        self.page_sequence += 1;

        let body: Vec<u8> = self.body.drain(..body_len).collect();
        self.lacing.drain(..vals);

        let mut crc_input = header.clone();
        crc_input.extend_from_slice(&body);
        LittleEndian::write_u32(&mut header[22..26], checksum(&crc_input));

        tracing::trace!(
            sequence = self.page_sequence - 1,
            granule,
            segments = vals,
            bytes = body_len,
            "ogg page"
        );
        Some(OggPage { header, body })
    }
}
