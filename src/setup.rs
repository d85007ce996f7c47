//! Expansion of the compacted Wwise setup packet into a Vorbis I setup header.
//!
//! Each section is read at the narrow widths Wwise stores and written back at
//! the widths the Vorbis specification expects. Every cross-reference is
//! checked against the count declared so far in [`SetupCounts`].

use crate::bit_stream::{BitReader, BitUint, BitUintV, BitWriter, ByteReader};
use crate::codebook::{ilog, CodebookDictionary};
use crate::errors::{check_index, ConversionError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetupCounts {
    pub codebooks: u32,
    pub floors: u32,
    pub residues: u32,
    pub mappings: u32,
}

/// State threaded through the setup sections.
pub struct SetupContext<'d> {
    pub channels: u32,
    pub counts: SetupCounts,
    dictionary: &'d CodebookDictionary,
}

impl<'d> SetupContext<'d> {
    pub fn new(channels: u16, dictionary: &'d CodebookDictionary) -> Self {
        Self {
            channels: channels as u32,
            counts: SetupCounts::default(),
            dictionary,
        }
    }
}

/// Block flag per mode, plus the width of a mode number in an audio packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeTable {
    block_flags: Vec<bool>,
    mode_bits: u8,
}

impl ModeTable {
    pub fn new(block_flags: Vec<bool>) -> Result<Self> {
        if block_flags.is_empty() {
            return Err(ConversionError::decode("setup packet declares no modes"));
        }
        let mode_bits = ilog(block_flags.len() as u32 - 1);
        Ok(Self {
            block_flags,
            mode_bits,
        })
    }

    pub fn mode_bits(&self) -> u8 {
        self.mode_bits
    }

    pub fn len(&self) -> usize {
        self.block_flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block_flags.is_empty()
    }

    /// Whether `mode` uses the long block size.
    pub fn block_flag(&self, mode: u32) -> Result<bool> {
        self.block_flags
            .get(mode as usize)
            .copied()
            .ok_or_else(|| {
                ConversionError::out_of_range("audio packet mode", mode, self.len() as u32)
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidueType {
    Zero,
    One,
    Two,
}

impl TryFrom<u32> for ResidueType {
    type Error = ConversionError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(ResidueType::Zero),
            1 => Ok(ResidueType::One),
            2 => Ok(ResidueType::Two),
            other => Err(ConversionError::decode(format!("invalid residue type {}", other))),
        }
    }
}

impl ResidueType {
    fn code(self) -> u32 {
        match self {
            ResidueType::Zero => 0,
            ResidueType::One => 1,
            ResidueType::Two => 2,
        }
    }
}

/// Rebuilds the setup packet body (everything after the common header) into `os`.
///
/// `payload` must be exactly the compacted packet; the whole of it has to be consumed.
pub fn rebuild_setup_packet(
    payload: &[u8],
    ctx: &mut SetupContext<'_>,
    os: &mut BitWriter,
) -> Result<ModeTable> {
    let mut reader = ByteReader::new(payload, "setup packet");
    let modes = reader.bitwise(|ss| {
        rebuild_codebooks(ss, os, ctx)?;
        write_time_domain_placeholder(os);
        rebuild_floors(ss, os, ctx)?;
        rebuild_residues(ss, os, ctx)?;
        rebuild_mappings(ss, os, ctx)?;
        let modes = rebuild_modes(ss, os, ctx)?;
        // framing
        os.write_bit(true);
        Ok(modes)
    })?;

    if reader.position() != payload.len() {
        return Err(ConversionError::size_mismatch(
            "setup packet",
            payload.len() as u64,
            reader.position() as u64,
        ));
    }
    tracing::debug!(counts = ?ctx.counts, modes = modes.len(), "rebuilt setup packet");
    Ok(modes)
}

fn rebuild_codebooks(
    ss: &mut BitReader<'_>,
    os: &mut BitWriter,
    ctx: &mut SetupContext<'_>,
) -> Result<()> {
    let codebook_count_less1 = BitUint::<8>::read_from(ss)?;
    codebook_count_less1.write_to(os);
    ctx.counts.codebooks = codebook_count_less1.total + 1;

    for _ in 0..ctx.counts.codebooks {
        let codebook_id = BitUint::<10>::read_from(ss)?;
        tracing::trace!(id = codebook_id.total, "codebook");
        ctx.dictionary.rebuild(codebook_id.total as usize, os)?;
    }
    Ok(())
}

/// Time domain transforms are always a single zero entry.
fn write_time_domain_placeholder(os: &mut BitWriter) {
    os.write_bits(0, 6);
    os.write_bits(0, 16);
}

fn rebuild_floors(
    ss: &mut BitReader<'_>,
    os: &mut BitWriter,
    ctx: &mut SetupContext<'_>,
) -> Result<()> {
    let floor_count_less1 = BitUint::<6>::read_from(ss)?;
    floor_count_less1.write_to(os);
    ctx.counts.floors = floor_count_less1.total + 1;

    for _ in 0..ctx.counts.floors {
        rebuild_floor1(ss, os, ctx.counts.codebooks)?;
    }
    Ok(())
}

fn rebuild_floor1(ss: &mut BitReader<'_>, os: &mut BitWriter, codebook_count: u32) -> Result<()> {
    // Floor type is always 1.
    os.write_bits(1, 16);

    let partitions = BitUint::<5>::read_from(ss)?;
    partitions.write_to(os);

    let mut partition_classes = Vec::with_capacity(partitions.total as usize);
    for _ in 0..partitions.total {
        let class = BitUint::<4>::read_from(ss)?;
        class.write_to(os);
        partition_classes.push(class.total as usize);
    }

    let class_count = partition_classes.iter().max().map_or(0, |&max| max + 1);
    let mut class_dimensions = Vec::with_capacity(class_count);
    for _ in 0..class_count {
        let dimensions_less1 = BitUint::<3>::read_from(ss)?;
        dimensions_less1.write_to(os);
        class_dimensions.push(dimensions_less1.total + 1);

        let subclasses = BitUint::<2>::read_from(ss)?;
        subclasses.write_to(os);
        if subclasses.total != 0 {
            let masterbook = BitUint::<8>::read_from(ss)?;
            masterbook.write_to(os);
            check_index("floor1 masterbook", masterbook.total, codebook_count)?;
        }
        for _ in 0..(1u32 << subclasses.total) {
            let subclass_book_plus1 = BitUint::<8>::read_from(ss)?;
            subclass_book_plus1.write_to(os);
            if let Some(book) = subclass_book_plus1.total.checked_sub(1) {
                check_index("floor1 subclass book", book, codebook_count)?;
            }
        }
    }

    let multiplier_less1 = BitUint::<2>::read_from(ss)?;
    multiplier_less1.write_to(os);
    let rangebits = BitUint::<4>::read_from(ss)?;
    rangebits.write_to(os);

    for class in partition_classes {
        for _ in 0..class_dimensions[class] {
            BitUintV::read_from(ss, rangebits.total as u8)?.write_to(os);
        }
    }
    Ok(())
}

fn rebuild_residues(
    ss: &mut BitReader<'_>,
    os: &mut BitWriter,
    ctx: &mut SetupContext<'_>,
) -> Result<()> {
    let residue_count_less1 = BitUint::<6>::read_from(ss)?;
    residue_count_less1.write_to(os);
    ctx.counts.residues = residue_count_less1.total + 1;

    let codebook_count = ctx.counts.codebooks;
    for _ in 0..ctx.counts.residues {
        let residue_type = ResidueType::try_from(BitUint::<2>::read_from(ss)?.total)?;
        os.write_bits(residue_type.code(), 16);

        let begin = BitUint::<24>::read_from(ss)?;
        let end = BitUint::<24>::read_from(ss)?;
        let partition_size_less1 = BitUint::<24>::read_from(ss)?;
        let classifications_less1 = BitUint::<6>::read_from(ss)?;
        let classbook = BitUint::<8>::read_from(ss)?;
        begin.write_to(os);
        end.write_to(os);
        partition_size_less1.write_to(os);
        classifications_less1.write_to(os);
        classbook.write_to(os);
        check_index("residue classbook", classbook.total, codebook_count)?;

        let classifications = classifications_less1.total + 1;
        let mut cascade = Vec::with_capacity(classifications as usize);
        for _ in 0..classifications {
            let low_bits = BitUint::<3>::read_from(ss)?;
            low_bits.write_to(os);
            let bitflag = BitUint::<1>::read_from(ss)?;
            bitflag.write_to(os);
            let mut high_bits = 0;
            if bitflag.total != 0 {
                let high = BitUint::<5>::read_from(ss)?;
                high.write_to(os);
                high_bits = high.total;
            }
            cascade.push(high_bits * 8 + low_bits.total);
        }

        for pattern in cascade {
            for k in 0..8 {
                if pattern & (1 << k) != 0 {
                    let book = BitUint::<8>::read_from(ss)?;
                    book.write_to(os);
                    check_index("residue book", book.total, codebook_count)?;
                }
            }
        }
    }
    Ok(())
}

fn rebuild_mappings(
    ss: &mut BitReader<'_>,
    os: &mut BitWriter,
    ctx: &mut SetupContext<'_>,
) -> Result<()> {
    let mapping_count_less1 = BitUint::<6>::read_from(ss)?;
    mapping_count_less1.write_to(os);
    ctx.counts.mappings = mapping_count_less1.total + 1;

    let channels = ctx.channels;
    let channel_bits = ilog(channels.saturating_sub(1));
    for _ in 0..ctx.counts.mappings {
        // mapping type 0
        os.write_bits(0, 16);

        let submaps_flag = BitUint::<1>::read_from(ss)?;
        submaps_flag.write_to(os);
        let mut submaps = 1;
        if submaps_flag.total != 0 {
            let submaps_less1 = BitUint::<4>::read_from(ss)?;
            submaps_less1.write_to(os);
            submaps = submaps_less1.total + 1;
        }

        let square_polar_flag = BitUint::<1>::read_from(ss)?;
        square_polar_flag.write_to(os);
        if square_polar_flag.total != 0 {
            let coupling_steps_less1 = BitUint::<8>::read_from(ss)?;
            coupling_steps_less1.write_to(os);
            for _ in 0..=coupling_steps_less1.total {
                let magnitude = BitUintV::read_from(ss, channel_bits)?;
                let angle = BitUintV::read_from(ss, channel_bits)?;
                magnitude.write_to(os);
                angle.write_to(os);
                if angle.total == magnitude.total {
                    return Err(ConversionError::decode(format!(
                        "invalid coupling: magnitude and angle are both channel {}",
                        angle.total
                    )));
                }
                check_index("coupling magnitude channel", magnitude.total, channels)?;
                check_index("coupling angle channel", angle.total, channels)?;
            }
        }

        let reserved = BitUint::<2>::read_from(ss)?;
        reserved.write_to(os);
        if reserved.total != 0 {
            return Err(ConversionError::decode("mapping reserved field nonzero"));
        }

        if submaps > 1 {
            for _ in 0..channels {
                let mux = BitUint::<4>::read_from(ss)?;
                mux.write_to(os);
                check_index("mapping mux", mux.total, submaps)?;
            }
        }

        for _ in 0..submaps {
            let time_config = BitUint::<8>::read_from(ss)?;
            time_config.write_to(os);
            let floor_number = BitUint::<8>::read_from(ss)?;
            floor_number.write_to(os);
            check_index("mapping floor", floor_number.total, ctx.counts.floors)?;
            let residue_number = BitUint::<8>::read_from(ss)?;
            residue_number.write_to(os);
            check_index("mapping residue", residue_number.total, ctx.counts.residues)?;
        }
    }
    Ok(())
}

fn rebuild_modes(
    ss: &mut BitReader<'_>,
    os: &mut BitWriter,
    ctx: &SetupContext<'_>,
) -> Result<ModeTable> {
    let mode_count_less1 = BitUint::<6>::read_from(ss)?;
    mode_count_less1.write_to(os);
    let mode_count = mode_count_less1.total + 1;

    let mut block_flags = Vec::with_capacity(mode_count as usize);
    for _ in 0..mode_count {
        let block_flag = BitUint::<1>::read_from(ss)?;
        block_flag.write_to(os);
        block_flags.push(block_flag.total != 0);
        // window type, transform type
        os.write_bits(0, 16);
        os.write_bits(0, 16);
        let mapping = BitUint::<8>::read_from(ss)?;
        mapping.write_to(os);
        check_index("mode mapping", mapping.total, ctx.counts.mappings)?;
    }
    ModeTable::new(block_flags)
}
