use num_enum::TryFromPrimitive;

use crate::cursor::Cursor;
use crate::error::{Error, Position};

/// Reserved abbreviation ids present in every block's abbreviation-id space.
pub mod reserved_abbrev_id {
    pub const END_BLOCK: u32 = 0;
    pub const ENTER_SUBBLOCK: u32 = 1;
    pub const DEFINE_ABBREV: u32 = 2;
    pub const UNABBREV_RECORD: u32 = 3;
    pub const FIRST_APPLICATION_ID: u32 = 4;
}

/// The reserved block id carrying cross-block metadata.
pub const BLOCKINFO_BLOCK_ID: u32 = 0;

/// Reserved record codes inside a BLOCKINFO block.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
pub enum BlockInfoCode {
    SetBid = 1,
    BlockName = 2,
    SetRecordName = 3,
}

/// The 6-bit alphabet `Char6` values decode through. Only indices `0..54`
/// are valid; `54..64` (unused by the format) are rejected by
/// [`char6_decode`].
pub const CHAR6_TABLE: &[u8; 54] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ._";

/// Decodes a 6-bit value into its `Char6` character.
pub fn char6_decode(value: u8, position: Position) -> Result<u8, Error> {
    if value >= 64 {
        return Err(Error::malformed("char6 value out of range", position, None));
    }
    CHAR6_TABLE
        .get(value as usize)
        .copied()
        .ok_or_else(|| Error::malformed("char6 value out of range", position, None))
}

/// One operand of an abbreviation definition.
///
/// `Array`'s element and `Blob` must each be the last operand of a
/// definition; `Array`'s element may not itself be `Array` or `Blob`. These
/// constraints are enforced while decoding the definition (see
/// [`AbbrevDef::decode`]), not by this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbbrevOp {
    Literal(u64),
    Fixed(u8),
    Vbr(u8),
    Array(Box<AbbrevOp>),
    Char6,
    Blob,
}

impl AbbrevOp {
    #[must_use]
    pub fn is_payload(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Blob)
    }
}

/// One decoded value inside a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(u64),
    Array(Vec<Value>),
    Blob(Vec<u8>),
}

impl Value {
    #[must_use]
    pub fn as_scalar(&self) -> Option<u64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }
}

/// An ordered sequence of operands describing how to decode one record.
///
/// The first operand always yields the record's `code`.
#[derive(Debug, Clone)]
pub struct AbbrevDef {
    pub ops: Vec<AbbrevOp>,
}

impl AbbrevDef {
    /// Decodes a `DEFINE_ABBREV` operand list: reads `n = read_vbr(5)` leaf
    /// operands, recursively decoding `Array`'s single element inline.
    pub(crate) fn decode(cursor: &mut Cursor<'_>) -> Result<Self, Error> {
        let n = cursor.read_vbr(5)?;
        if n < 1 {
            return Err(Error::malformed("abbrev definition has no operands", cursor.position(), None));
        }
        let mut ops = Vec::new();
        let mut count: u64 = 0;
        while count < n {
            let op = Self::decode_one_op(cursor, &mut count, n)?;
            ops.push(op);
        }
        if count > n {
            return Err(Error::malformed("abbrev operand count overflow", cursor.position(), None));
        }
        Ok(Self { ops })
    }

    fn decode_one_op(cursor: &mut Cursor<'_>, count: &mut u64, n: u64) -> Result<AbbrevOp, Error> {
        let is_literal = cursor.read_bits(1)?;
        if is_literal == 1 {
            let value = cursor.read_vbr(8)?;
            *count += 1;
            return Ok(AbbrevOp::Literal(value));
        }
        let encoding = cursor.read_bits(3)?;
        let op = match encoding {
            1 => {
                let width = cursor.read_vbr(5)? as u8;
                *count += 1;
                AbbrevOp::Fixed(width)
            }
            2 => {
                let width = cursor.read_vbr(5)? as u8;
                *count += 1;
                AbbrevOp::Vbr(width)
            }
            3 => {
                *count += 1;
                // The array header consumes the outer slot just counted; the
                // element type that follows consumes no additional slot.
                let mut elem_count = *count;
                let elem = Self::decode_one_op(cursor, &mut elem_count, n)?;
                if elem.is_payload() {
                    return Err(Error::malformed("array element must not be array or blob", cursor.position(), None));
                }
                AbbrevOp::Array(Box::new(elem))
            }
            4 => {
                *count += 1;
                AbbrevOp::Char6
            }
            5 => {
                *count += 1;
                if *count != n {
                    return Err(Error::malformed("blob must be the last operand", cursor.position(), None));
                }
                AbbrevOp::Blob
            }
            _ => {
                return Err(Error::malformed("unknown abbrev operand code", cursor.position(), None));
            }
        };
        Ok(op)
    }
}

/// Ordered mapping from abbreviation id to [`AbbrevDef`].
///
/// Ids start at 4 (the first id past the four reserved ones) and increment
/// by one on each definition added, whether seeded from BLOCKINFO or defined
/// locally within a block.
#[derive(Debug, Clone, Default)]
pub struct AbbrevTable {
    defs: Vec<(u32, AbbrevDef)>,
}

impl AbbrevTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, def: AbbrevDef) -> u32 {
        let id = self
            .defs
            .last()
            .map(|(id, _)| id + 1)
            .unwrap_or(reserved_abbrev_id::FIRST_APPLICATION_ID);
        self.defs.push((id, def));
        id
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<&AbbrevDef> {
        self.defs.iter().find(|(existing, _)| *existing == id).map(|(_, def)| def)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char6_table_matches_reference_alphabet() {
        let expected = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ._";
        for (i, &byte) in expected.iter().enumerate() {
            assert_eq!(char6_decode(i as u8, Position::default()).unwrap(), byte);
        }
    }

    #[test]
    fn char6_rejects_unused_high_indices() {
        for value in 54..=63u8 {
            assert!(char6_decode(value, Position::default()).is_err());
        }
    }

    #[test]
    fn table_ids_start_at_four_and_increment() {
        let mut table = AbbrevTable::new();
        let id0 = table.add(AbbrevDef { ops: vec![AbbrevOp::Fixed(1)] });
        let id1 = table.add(AbbrevDef { ops: vec![AbbrevOp::Fixed(2)] });
        assert_eq!(id0, 4);
        assert_eq!(id1, 5);
        assert!(table.get(4).is_some());
        assert!(table.get(6).is_none());
    }
}
