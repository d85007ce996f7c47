use crate::errors::{ConversionError, Result};

//
// BitReader: LSB-first bit access over one in-memory record
//
pub struct BitReader<'a> {
    data: &'a [u8],
    record: &'static str,
    bits_read: u64,
}

impl<'a> BitReader<'a> {
    /// Wraps `data`; `record` names it in out-of-bits errors.
    pub fn new(data: &'a [u8], record: &'static str) -> Self {
        Self {
            data,
            record,
            bits_read: 0,
        }
    }

    /// Reads a single bit (LSB-first within the byte).
    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = (self.bits_read / 8) as usize;
        let Some(&value) = self.data.get(byte) else {
            return Err(ConversionError::decode(format!(
                "out of bits in {} ({} bytes)",
                self.record,
                self.data.len()
            )));
        };
        let bit = value & (1 << (self.bits_read % 8)) != 0;
        self.bits_read += 1;
        Ok(bit)
    }

    /// Reads `count` (0 to 32) bits, first bit read lands in bit 0 of the result.
    pub fn read_bits(&mut self, count: u8) -> Result<u32> {
        if count > 32 {
            return Err(ConversionError::decode("cannot read more than 32 bits at once"));
        }
        let mut total = 0u32;
        for i in 0..count {
            if self.read_bit()? {
                total |= 1 << i;
            }
        }
        Ok(total)
    }

    pub fn read<const N: usize>(&mut self) -> Result<u32> {
        Ok(BitUint::<N>::read_from(self)?.total)
    }

    /// Returns the total number of bits read so far.
    pub fn bits_read(&self) -> u64 {
        self.bits_read
    }

    /// Number of whole or partial bytes the reader has touched.
    pub fn bytes_touched(&self) -> usize {
        self.bits_read.div_ceil(8) as usize
    }
}

//
// BitWriter: LSB-first bit packing into a growable buffer
//
#[derive(Debug, Default)]
pub struct BitWriter {
    buffer: Vec<u8>,
    bit_buffer: u8,
    bits_stored: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bit(&mut self, bit: bool) {
        if bit {
            self.bit_buffer |= 1 << self.bits_stored;
        }
        self.bits_stored += 1;
        if self.bits_stored == 8 {
            self.buffer.push(self.bit_buffer);
            self.bit_buffer = 0;
            self.bits_stored = 0;
        }
    }

    /// Writes the low `count` bits of `value`. Widths above 32 are clamped.
    pub fn write_bits(&mut self, value: u32, count: u8) {
        for i in 0..count.min(32) {
            self.write_bit(value & (1 << i) != 0);
        }
    }

    /// Writes `value` at a compile-time width, rejecting values that don't fit.
    pub fn write<const N: usize>(&mut self, value: u32) -> Result<()> {
        BitUint::<N>::new(value)?.write_to(self);
        Ok(())
    }

    /// Appends whole bytes at the current bit position.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.bits_stored == 0 {
            self.buffer.extend_from_slice(bytes);
        } else {
            for &b in bytes {
                self.write_bits(b as u32, 8);
            }
        }
    }

    /// Finishes the buffer, padding the last byte with zero bits.
    pub fn into_bytes(mut self) -> Vec<u8> {
        if self.bits_stored != 0 {
            self.buffer.push(self.bit_buffer);
        }
        self.buffer
    }
}

//
// ByteReader: byte cursor over a record with a scoped bitwise mode
//
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    record: &'static str,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], record: &'static str) -> Self {
        Self {
            data,
            pos: 0,
            record,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes from the current position to the end of the record.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Runs `f` in bitwise mode starting at the current byte.
    ///
    /// Whether `f` succeeds or fails, the byte position afterwards is the first
    /// whole byte past the last bit `f` consumed.
    pub fn bitwise<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut BitReader<'a>) -> Result<T>,
    {
        let data: &'a [u8] = self.data;
        let mut bits = BitReader::new(&data[self.pos..], self.record);
        let result = f(&mut bits);
        self.pos += bits.bytes_touched();
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitUint<const BIT_SIZE: usize> {
    pub total: u32,
}

impl<const BIT_SIZE: usize> BitUint<BIT_SIZE> {
    /// Create a new BitUint from a u32 value.
    /// Returns an error if BIT_SIZE is greater than 32 or if the value doesn't fit.
    pub fn new(v: u32) -> Result<Self> {
        if BIT_SIZE > 32 {
            return Err(ConversionError::decode("too many bits"));
        }
        if BIT_SIZE < 32 && v >= (1 << BIT_SIZE) {
            return Err(ConversionError::decode(format!(
                "integer {} too big for {} bits",
                v, BIT_SIZE
            )));
        }
        Ok(Self { total: v })
    }

    pub fn read_from(stream: &mut BitReader<'_>) -> Result<Self> {
        if BIT_SIZE > 32 {
            return Err(ConversionError::decode("too many bits"));
        }
        Ok(Self {
            total: stream.read_bits(BIT_SIZE as u8)?,
        })
    }

    pub fn write_to(&self, stream: &mut BitWriter) {
        stream.write_bits(self.total, BIT_SIZE as u8);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitUintV {
    pub size: u8,
    pub total: u32,
}

impl BitUintV {
    pub fn read_from(stream: &mut BitReader<'_>, size: u8) -> Result<Self> {
        let total = stream.read_bits(size)?;
        Ok(Self { size, total })
    }

    pub fn write_to(&self, stream: &mut BitWriter) {
        stream.write_bits(self.total, self.size);
    }
}
