use std::fs;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};

use crate::bit_stream::{BitReader, BitUint, BitUintV, BitWriter};
use crate::errors::{ConversionError, Result};

/// Codebook sync pattern, "BCV" read LSB-first.
pub const CODEBOOK_SYNC: u32 = 0x564342;

/// Compute ilog (number of bits required to represent v)
pub fn ilog(v: u32) -> u8 {
    (u32::BITS - v.leading_zeros()) as u8
}

/// Compute quantized values for lookup type 1: the largest `vals` with
/// `vals^dimensions <= entries`.
pub fn book_maptype1_quantvals(entries: u32, dimensions: u32) -> Result<u32> {
    if dimensions == 0 {
        return Err(ConversionError::decode("codebook with lookup table has zero dimensions"));
    }
    if entries == 0 {
        return Ok(0);
    }
    // Get a starting hint.
    let bits = ilog(entries) as u32;
    let mut vals = entries >> ((bits - 1) * (dimensions - 1) / dimensions);
    loop {
        let mut acc: u64 = 1;
        let mut acc1: u64 = 1;
        for _ in 0..dimensions {
            acc = acc.saturating_mul(vals as u64);
            acc1 = acc1.saturating_mul(vals as u64 + 1);
        }
        if acc <= entries as u64 && acc1 > entries as u64 {
            return Ok(vals);
        }
        if acc > entries as u64 {
            vals -= 1;
        } else {
            vals += 1;
        }
    }
}

/// Shared dictionary of packed codebooks, addressed by small integer id.
///
/// The blob layout is the codebook records back to back, followed by `N+1`
/// little-endian u32 offsets. The last offset equals the size of the record
/// area, which is also where the offset table starts.
#[derive(Debug, Clone)]
pub struct CodebookDictionary {
    data: Vec<u8>,
    offsets: Vec<usize>,
}

impl CodebookDictionary {
    pub fn from_bytes(blob: &[u8]) -> Result<Self> {
        let blob_size = blob.len();
        if blob_size < 4 {
            return Err(ConversionError::decode("codebook dictionary too small"));
        }
        let offset_offset = LittleEndian::read_u32(&blob[blob_size - 4..]) as usize;
        if offset_offset > blob_size - 4 {
            return Err(ConversionError::decode("codebook dictionary offset table out of range"));
        }
        let table = &blob[offset_offset..];
        if table.len() % 4 != 0 {
            return Err(ConversionError::decode("codebook dictionary offset table misaligned"));
        }

        let offsets: Vec<usize> = table
            .chunks_exact(4)
            .map(|entry| LittleEndian::read_u32(entry) as usize)
            .collect();
        if offsets.windows(2).any(|w| w[0] > w[1]) || offsets.iter().any(|&o| o > offset_offset) {
            return Err(ConversionError::decode("codebook dictionary offsets not ascending"));
        }

        let dictionary = Self {
            data: blob[..offset_offset].to_vec(),
            offsets,
        };
        tracing::debug!(count = dictionary.count(), "loaded codebook dictionary");
        Ok(dictionary)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let blob = fs::read(path)?;
        Self::from_bytes(&blob)
    }

    /// Number of codebooks addressable through [`get`](Self::get).
    pub fn count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn get(&self, id: usize) -> Result<&[u8]> {
        if id >= self.count() {
            return Err(ConversionError::out_of_range(
                "codebook id",
                id as u32,
                self.count() as u32,
            ));
        }
        Ok(&self.data[self.offsets[id]..self.offsets[id + 1]])
    }

    /// Expands codebook `id` into a full Vorbis codebook record on `os`.
    pub fn rebuild(&self, id: usize, os: &mut BitWriter) -> Result<()> {
        let cb = self.get(id)?;
        if cb.is_empty() {
            return Err(ConversionError::decode(format!("codebook {} is empty", id)));
        }
        let mut bis = BitReader::new(cb, "codebook");
        rebuild_codebook(&mut bis, 14, os)?;

        let consumed = bis.bits_read() / 8 + 1;
        if consumed != cb.len() as u64 {
            return Err(ConversionError::size_mismatch(
                "codebook",
                cb.len() as u64,
                consumed,
            ));
        }
        Ok(())
    }
}

/// Vector lookup of a codebook. Packed codebooks store it in a single bit,
/// so only the two lookup kinds below are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupType {
    NoLookup = 0,
    Lattice = 1,
}

impl TryFrom<u32> for LookupType {
    type Error = ConversionError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(LookupType::NoLookup),
            1 => Ok(LookupType::Lattice),
            other => Err(ConversionError::decode(format!("unsupported lookup type {}", other))),
        }
    }
}

/// Re-emits one packed codebook at full Vorbis field widths.
///
/// `entries_bits` is the stored width of the entry count.
pub fn rebuild_codebook(
    bis: &mut BitReader<'_>,
    entries_bits: u8,
    os: &mut BitWriter,
) -> Result<()> {
    let dimensions = BitUint::<4>::read_from(bis)?;
    let entries = BitUintV::read_from(bis, entries_bits)?;
    BitUint::<24>::new(CODEBOOK_SYNC)?.write_to(os);
    BitUint::<16>::new(dimensions.total)?.write_to(os);
    BitUint::<24>::new(entries.total)?.write_to(os);

    // Gather codeword lengths.
    let ordered = BitUint::<1>::read_from(bis)?;
    ordered.write_to(os);
    if ordered.total != 0 {
        let initial_length = BitUint::<5>::read_from(bis)?;
        initial_length.write_to(os);
        let mut current_entry: u32 = 0;
        while current_entry < entries.total {
            let bits = ilog(entries.total - current_entry);
            let number = BitUintV::read_from(bis, bits)?;
            number.write_to(os);
            current_entry += number.total;
        }
        if current_entry > entries.total {
            return Err(ConversionError::decode("codebook ordered lengths overrun entry count"));
        }
    } else {
        let codeword_length_length = BitUint::<3>::read_from(bis)?;
        let sparse = BitUint::<1>::read_from(bis)?;
        if codeword_length_length.total == 0 || codeword_length_length.total > 5 {
            return Err(ConversionError::decode(format!(
                "nonsense codeword length width {}",
                codeword_length_length.total
            )));
        }
        sparse.write_to(os);

        for _ in 0..entries.total {
            let mut present = true;
            if sparse.total != 0 {
                let flag = BitUint::<1>::read_from(bis)?;
                flag.write_to(os);
                present = flag.total != 0;
            }
            if present {
                let codeword_length =
                    BitUintV::read_from(bis, codeword_length_length.total as u8)?;
                BitUint::<5>::new(codeword_length.total)?.write_to(os);
            }
        }
    }

    let lookup_type = LookupType::try_from(BitUint::<1>::read_from(bis)?.total)?;
    BitUint::<4>::new(lookup_type as u32)?.write_to(os);
    match lookup_type {
        LookupType::NoLookup => {}
        LookupType::Lattice => {
            let min = BitUint::<32>::read_from(bis)?;
            let max = BitUint::<32>::read_from(bis)?;
            let value_length = BitUint::<4>::read_from(bis)?;
            let sequence_flag = BitUint::<1>::read_from(bis)?;
            min.write_to(os);
            max.write_to(os);
            value_length.write_to(os);
            sequence_flag.write_to(os);

            let quantvals = book_maptype1_quantvals(entries.total, dimensions.total)?;
            for _ in 0..quantvals {
                let val = BitUintV::read_from(bis, value_length.total as u8 + 1)?;
                val.write_to(os);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Packed form of a two-entry, one-dimension codebook with 1-bit codewords.
    pub(crate) fn trivial_packed_codebook() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(1, 4); // dimensions
        w.write_bits(2, 14); // entries
        w.write_bits(0, 1); // unordered
        w.write_bits(1, 3); // codeword length width
        w.write_bits(0, 1); // not sparse
        w.write_bits(0, 1); // length-1 of entry 0
        w.write_bits(0, 1); // length-1 of entry 1
        w.write_bits(0, 1); // no lookup
        w.into_bytes()
    }

    /// Packs records into the dictionary blob layout.
    pub(crate) fn dictionary_blob(records: &[Vec<u8>]) -> Vec<u8> {
        let mut blob = Vec::new();
        let mut offsets = Vec::new();
        for record in records {
            offsets.push(blob.len() as u32);
            blob.extend_from_slice(record);
        }
        offsets.push(blob.len() as u32);
        for offset in offsets {
            blob.extend_from_slice(&offset.to_le_bytes());
        }
        blob
    }

    #[test]
    fn test_ilog() {
        assert_eq!(ilog(0), 0);
        assert_eq!(ilog(1), 1);
        assert_eq!(ilog(2), 2);
        assert_eq!(ilog(3), 2);
        assert_eq!(ilog(4), 3);
        assert_eq!(ilog(255), 8);
        assert_eq!(ilog(256), 9);
        assert_eq!(ilog(u32::MAX), 32);
    }

    #[test]
    fn test_quantvals() {
        assert_eq!(book_maptype1_quantvals(8, 2).unwrap(), 2);
        assert_eq!(book_maptype1_quantvals(27, 3).unwrap(), 3);
        assert_eq!(book_maptype1_quantvals(16, 2).unwrap(), 4);
        assert_eq!(book_maptype1_quantvals(81, 4).unwrap(), 3);
        assert_eq!(book_maptype1_quantvals(1, 1).unwrap(), 1);
        assert_eq!(book_maptype1_quantvals(0, 2).unwrap(), 0);
        assert!(book_maptype1_quantvals(16, 0).is_err());
    }

    #[test]
    fn test_lookup_type() {
        assert_eq!(LookupType::try_from(1).unwrap(), LookupType::Lattice);
        assert!(LookupType::try_from(2).is_err());
    }

    #[test]
    fn test_dictionary_get_bounds() {
        let record = trivial_packed_codebook();
        let dict = CodebookDictionary::from_bytes(&dictionary_blob(&[record.clone()])).unwrap();
        assert_eq!(dict.count(), 1);
        assert_eq!(dict.get(0).unwrap(), record.as_slice());
        assert!(matches!(
            dict.get(1),
            Err(ConversionError::IndexOutOfRange { field: "codebook id", index: 1, bound: 1 })
        ));
    }

    #[test]
    fn test_dictionary_rejects_bad_blobs() {
        assert!(CodebookDictionary::from_bytes(&[1, 2]).is_err());
        // trailing offset points past the blob
        assert!(CodebookDictionary::from_bytes(&[0, 0, 0, 0, 0xFF, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_rebuild_trivial_codebook() {
        let dict =
            CodebookDictionary::from_bytes(&dictionary_blob(&[trivial_packed_codebook()])).unwrap();
        let mut os = BitWriter::new();
        dict.rebuild(0, &mut os).unwrap();
        let bytes = os.into_bytes();

        let mut r = BitReader::new(&bytes, "rebuilt");
        assert_eq!(r.read::<24>().unwrap(), CODEBOOK_SYNC);
        assert_eq!(r.read::<16>().unwrap(), 1);
        assert_eq!(r.read::<24>().unwrap(), 2);
        assert_eq!(r.read::<1>().unwrap(), 0); // ordered
        assert_eq!(r.read::<1>().unwrap(), 0); // sparse
        assert_eq!(r.read::<5>().unwrap(), 0);
        assert_eq!(r.read::<5>().unwrap(), 0);
        assert_eq!(r.read::<4>().unwrap(), 0); // lookup type
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let dict =
            CodebookDictionary::from_bytes(&dictionary_blob(&[trivial_packed_codebook()])).unwrap();
        let mut first = BitWriter::new();
        let mut second = BitWriter::new();
        dict.rebuild(0, &mut first).unwrap();
        dict.rebuild(0, &mut second).unwrap();
        assert_eq!(first.into_bytes(), second.into_bytes());
    }

    #[test]
    fn test_rebuild_lookup_type1_and_sparse() {
        let mut w = BitWriter::new();
        w.write_bits(2, 4); // dimensions
        w.write_bits(9, 14); // entries
        w.write_bits(0, 1); // unordered
        w.write_bits(3, 3); // length width
        w.write_bits(1, 1); // sparse
        for i in 0..9 {
            let present = i % 2 == 0;
            w.write_bit(present);
            if present {
                w.write_bits(3, 3);
            }
        }
        w.write_bits(1, 1); // lookup type 1
        w.write_bits(0x1111_1111, 32);
        w.write_bits(0x2222_2222, 32);
        w.write_bits(1, 4); // value width 2
        w.write_bits(0, 1);
        for v in 0..3 {
            w.write_bits(v, 2); // quantvals(9, 2) == 3
        }
        let record = w.into_bytes();
        let dict = CodebookDictionary::from_bytes(&dictionary_blob(&[record])).unwrap();

        let mut os = BitWriter::new();
        dict.rebuild(0, &mut os).unwrap();
        let bytes = os.into_bytes();
        let mut r = BitReader::new(&bytes, "rebuilt");
        assert_eq!(r.read::<24>().unwrap(), CODEBOOK_SYNC);
        assert_eq!(r.read::<16>().unwrap(), 2);
        assert_eq!(r.read::<24>().unwrap(), 9);
        assert_eq!(r.read::<1>().unwrap(), 0);
        assert_eq!(r.read::<1>().unwrap(), 1);
        for i in 0..9 {
            let present = r.read::<1>().unwrap() == 1;
            assert_eq!(present, i % 2 == 0);
            if present {
                assert_eq!(r.read::<5>().unwrap(), 3);
            }
        }
        assert_eq!(r.read::<4>().unwrap(), 1);
        assert_eq!(r.read::<32>().unwrap(), 0x1111_1111);
        assert_eq!(r.read::<32>().unwrap(), 0x2222_2222);
        assert_eq!(r.read::<4>().unwrap(), 1);
        assert_eq!(r.read::<1>().unwrap(), 0);
        for v in 0..3 {
            assert_eq!(r.read::<2>().unwrap(), v);
        }
    }

    #[test]
    fn test_rebuild_ordered_codebook() {
        let mut w = BitWriter::new();
        w.write_bits(1, 4);
        w.write_bits(4, 14); // entries
        w.write_bits(1, 1); // ordered
        w.write_bits(1, 5); // initial length
        w.write_bits(1, ilog(4)); // one entry of length 2
        w.write_bits(1, ilog(3)); // one entry of length 3
        w.write_bits(2, ilog(2)); // two entries of length 4
        w.write_bits(0, 1);
        // 32 bits exactly; packed records always carry a trailing byte then
        let mut record = w.into_bytes();
        record.push(0);
        let dict = CodebookDictionary::from_bytes(&dictionary_blob(&[record])).unwrap();

        let mut os = BitWriter::new();
        dict.rebuild(0, &mut os).unwrap();
        let bytes = os.into_bytes();
        let mut r = BitReader::new(&bytes, "rebuilt");
        r.read::<24>().unwrap();
        r.read::<16>().unwrap();
        assert_eq!(r.read::<24>().unwrap(), 4);
        assert_eq!(r.read::<1>().unwrap(), 1);
        assert_eq!(r.read::<5>().unwrap(), 1);
        assert_eq!(r.read_bits(3).unwrap(), 1);
        assert_eq!(r.read_bits(2).unwrap(), 1);
        assert_eq!(r.read_bits(2).unwrap(), 2);
        assert_eq!(r.read::<4>().unwrap(), 0);
    }

    #[test]
    fn test_rebuild_rejects_nonsense_length_width() {
        let mut w = BitWriter::new();
        w.write_bits(1, 4);
        w.write_bits(2, 14);
        w.write_bits(0, 1);
        w.write_bits(6, 3); // width 6 is not a codeword length width
        w.write_bits(0, 1);
        w.write_bits(0, 16);
        let dict = CodebookDictionary::from_bytes(&dictionary_blob(&[w.into_bytes()])).unwrap();
        let mut os = BitWriter::new();
        assert!(matches!(dict.rebuild(0, &mut os), Err(ConversionError::Decode(_))));
    }

    #[test]
    fn test_rebuild_detects_wrong_record_size() {
        let mut record = trivial_packed_codebook();
        record.push(0);
        let dict = CodebookDictionary::from_bytes(&dictionary_blob(&[record])).unwrap();
        let mut os = BitWriter::new();
        assert!(matches!(
            dict.rebuild(0, &mut os),
            Err(ConversionError::SizeMismatch { record: "codebook", expected: 5, actual: 4 })
        ));
    }
}
