//! Bit-level cells for persisted records and message payloads.
//!
//! A cell is an ordered string of at most [`MAX_CELL_BITS`] bits. Integers are
//! written big-endian in exactly the declared width, signed values in two's
//! complement, so a record's layout is fixed by the widths its `store` uses.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Largest number of data bits a single cell may hold
pub const MAX_CELL_BITS: usize = 1023;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Cell overflow - {bits} bits exceed the cell capacity")]
    CellOverflow { bits: usize },
    #[error("Cell underflow - needed {needed} bits but only {remaining} remain")]
    CellUnderflow { needed: usize, remaining: usize },
    #[error("Value does not fit in {bits} bits")]
    ValueTooWide { bits: usize },
    #[error("{0} unread bits after the end of the record")]
    TrailingData(usize),
    #[error("Unknown opcode {0:#010x}")]
    UnknownOpcode(u32),
}

impl CodecError {
    /// Stable reason code carried in reply messages
    pub fn code(&self) -> u32 {
        match self {
            CodecError::CellOverflow { .. } => 0x2000,
            CodecError::CellUnderflow { .. } => 0x2001,
            CodecError::ValueTooWide { .. } => 0x2002,
            CodecError::TrailingData(_) => 0x2003,
            CodecError::UnknownOpcode(_) => 0x2004,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    data: Vec<u8>,
    bit_len: usize,
}

impl Cell {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    pub fn parse(&self) -> CellSlice<'_> {
        CellSlice { cell: self, pos: 0 }
    }

    fn bit(&self, pos: usize) -> bool {
        (self.data[pos / 8] >> (7 - pos % 8)) & 1 == 1
    }
}

#[derive(Clone, Debug, Default)]
pub struct CellBuilder {
    cell: Cell,
}

impl CellBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bit_len(&self) -> usize {
        self.cell.bit_len
    }

    pub fn build(self) -> Cell {
        self.cell
    }

    fn reserve(&self, bits: usize) -> Result<(), CodecError> {
        let total = self.cell.bit_len + bits;
        if total > MAX_CELL_BITS {
            return Err(CodecError::CellOverflow { bits: total });
        }
        Ok(())
    }

    fn push(&mut self, bit: bool) {
        let offset = self.cell.bit_len % 8;
        if offset == 0 {
            self.cell.data.push(0);
        }
        if bit {
            if let Some(byte) = self.cell.data.last_mut() {
                *byte |= 0x80 >> offset;
            }
        }
        self.cell.bit_len += 1;
    }

    pub fn store_bit(&mut self, bit: bool) -> Result<&mut Self, CodecError> {
        self.reserve(1)?;
        self.push(bit);
        Ok(self)
    }

    /// Unsigned integer of exactly `bits` width (at most 256)
    pub fn store_uint(&mut self, value: U256, bits: usize) -> Result<&mut Self, CodecError> {
        if bits > 256 || value.bit_len() > bits {
            return Err(CodecError::ValueTooWide { bits });
        }
        self.reserve(bits)?;
        for i in (0..bits).rev() {
            self.push(value.bit(i));
        }
        Ok(self)
    }

    pub fn store_u64(&mut self, value: u64, bits: usize) -> Result<&mut Self, CodecError> {
        self.store_uint(U256::from(value), bits)
    }

    pub fn store_u128(&mut self, value: u128, bits: usize) -> Result<&mut Self, CodecError> {
        self.store_uint(U256::from(value), bits)
    }

    /// Two's complement signed integer of exactly `bits` width (at most 128)
    pub fn store_int(&mut self, value: i128, bits: usize) -> Result<&mut Self, CodecError> {
        if bits == 0 || bits > 128 {
            return Err(CodecError::ValueTooWide { bits });
        }
        if bits < 128 {
            let bound = 1i128 << (bits - 1);
            if value < -bound || value >= bound {
                return Err(CodecError::ValueTooWide { bits });
            }
        }
        self.store_u128(value as u128 & mask(bits), bits)
    }

    /// VarUInteger 16: a 4-bit byte length followed by that many bytes
    pub fn store_coins(&mut self, amount: u128) -> Result<&mut Self, CodecError> {
        let len = (128 - amount.leading_zeros() as usize).div_ceil(8);
        if len > 15 {
            return Err(CodecError::ValueTooWide { bits: 120 });
        }
        self.store_u64(len as u64, 4)?;
        self.store_u128(amount, len * 8)
    }

    pub fn store_address(&mut self, address: &Address) -> Result<&mut Self, CodecError> {
        self.store_uint(U256::from_be_slice(address.as_slice()), 160)
    }
}

fn mask(bits: usize) -> u128 {
    if bits >= 128 {
        u128::MAX
    } else {
        (1u128 << bits) - 1
    }
}

#[derive(Clone, Debug)]
pub struct CellSlice<'a> {
    cell: &'a Cell,
    pos: usize,
}

impl CellSlice<'_> {
    pub fn remaining_bits(&self) -> usize {
        self.cell.bit_len - self.pos
    }

    fn take(&mut self, bits: usize) -> Result<usize, CodecError> {
        let remaining = self.remaining_bits();
        if bits > remaining {
            return Err(CodecError::CellUnderflow {
                needed: bits,
                remaining,
            });
        }
        let start = self.pos;
        self.pos += bits;
        Ok(start)
    }

    pub fn skip(&mut self, bits: usize) -> Result<(), CodecError> {
        self.take(bits).map(|_| ())
    }

    pub fn load_bit(&mut self) -> Result<bool, CodecError> {
        let pos = self.take(1)?;
        Ok(self.cell.bit(pos))
    }

    pub fn load_uint(&mut self, bits: usize) -> Result<U256, CodecError> {
        if bits > 256 {
            return Err(CodecError::ValueTooWide { bits });
        }
        let start = self.take(bits)?;
        let mut value = U256::ZERO;
        for pos in start..start + bits {
            value <<= 1;
            if self.cell.bit(pos) {
                value |= U256::from(1u8);
            }
        }
        Ok(value)
    }

    pub fn load_u128(&mut self, bits: usize) -> Result<u128, CodecError> {
        if bits > 128 {
            return Err(CodecError::ValueTooWide { bits });
        }
        let start = self.take(bits)?;
        let mut value = 0u128;
        for pos in start..start + bits {
            value = (value << 1) | self.cell.bit(pos) as u128;
        }
        Ok(value)
    }

    pub fn load_u64(&mut self, bits: usize) -> Result<u64, CodecError> {
        if bits > 64 {
            return Err(CodecError::ValueTooWide { bits });
        }
        Ok(self.load_u128(bits)? as u64)
    }

    pub fn load_int(&mut self, bits: usize) -> Result<i128, CodecError> {
        if bits == 0 {
            return Err(CodecError::ValueTooWide { bits });
        }
        let raw = self.load_u128(bits)?;
        let negative = (raw >> (bits - 1)) & 1 == 1;
        Ok(if negative { (raw | !mask(bits)) as i128 } else { raw as i128 })
    }

    pub fn load_coins(&mut self) -> Result<u128, CodecError> {
        let len = self.load_u64(4)? as usize;
        self.load_u128(len * 8)
    }

    pub fn load_address(&mut self) -> Result<Address, CodecError> {
        let value = self.load_uint(160)?;
        Ok(Address::from_slice(&value.to_be_bytes::<32>()[12..]))
    }

    /// Fails if any bits are left unread
    pub fn end_parse(&self) -> Result<(), CodecError> {
        match self.remaining_bits() {
            0 => Ok(()),
            left => Err(CodecError::TrailingData(left)),
        }
    }
}

/// A value with a fixed persisted bit layout
pub trait Record: Sized {
    fn store(&self, builder: &mut CellBuilder) -> Result<(), CodecError>;

    fn load(slice: &mut CellSlice<'_>) -> Result<Self, CodecError>;

    fn to_cell(&self) -> Result<Cell, CodecError> {
        let mut builder = CellBuilder::new();
        self.store(&mut builder)?;
        Ok(builder.build())
    }

    fn from_cell(cell: &Cell) -> Result<Self, CodecError> {
        let mut slice = cell.parse();
        let value = Self::load(&mut slice)?;
        slice.end_parse()?;
        Ok(value)
    }
}
