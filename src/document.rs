use crate::abbrev::Value;
use crate::blockinfo::BlockInfoStore;
use crate::error::Error;

const BITCODE_WRAPPER_MAGIC: u32 = 0x0B17C0DE;

/// Fields of the 20-byte Darwin bitcode-wrapper header, present when a
/// `.bc` file was produced by a driver that prepends one. `None` on
/// `Document::wrapper` means the input was a bare bitstream with no
/// wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapperHeader {
    pub version: u32,
    pub offset: u32,
    pub size: u32,
    pub cpu_type: u32,
}

/// Strips an optional bitcode-wrapper header from `data`, returning the
/// header (if present) and the slice of `data` the bitstream proper starts
/// at.
fn strip_wrapper(data: &[u8]) -> Result<(Option<WrapperHeader>, &[u8]), Error> {
    let Some(first_word) = data.get(0..4) else {
        return Ok((None, data));
    };
    let first_word = u32::from_le_bytes(first_word.try_into().unwrap());
    if first_word != BITCODE_WRAPPER_MAGIC || data.len() < 20 {
        return Ok((None, data));
    }
    let mut words = data[4..20].chunks_exact(4).map(|w| u32::from_le_bytes(w.try_into().unwrap()));
    let version = words.next().unwrap();
    let offset = words.next().unwrap();
    let size = words.next().unwrap();
    let cpu_type = words.next().unwrap();
    let start = offset as usize;
    let end = start
        .checked_add(size as usize)
        .ok_or_else(|| crate::error::Error::malformed("wrapper size overflow", crate::error::Position::default(), None))?;
    let bitstream = data
        .get(start..end)
        .ok_or_else(|| crate::error::Error::malformed("wrapper offset/size out of bounds", crate::error::Position::default(), None))?;
    Ok((
        Some(WrapperHeader {
            version,
            offset,
            size,
            cpu_type,
        }),
        bitstream,
    ))
}

/// A data record: either a self-describing `UNABBREV_RECORD` (`abbrev_id ==
/// 3`) or one decoded through a user-defined abbreviation (`abbrev_id >=
/// 4`).
#[derive(Debug, Clone)]
pub struct Record {
    pub abbrev_id: u32,
    pub code: u32,
    pub values: Vec<Value>,
}

/// A length-delimited, named region of the stream containing records and
/// nested blocks.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: u32,
    pub abbrev_id_width: u8,
    pub length_bytes: u32,
    pub records: Vec<Record>,
    pub sub_blocks: Vec<Block>,
}

impl Block {
    /// Interleaved view of this block's direct records and sub-blocks, in
    /// the order produced by the reader (which preserves stream order,
    /// even though LLVM itself always emits sub-blocks before records).
    pub fn elements(&self) -> impl Iterator<Item = BlockElementRef<'_>> {
        // Records and sub-blocks are stored in separate vecs; this just
        // threads a combined view back through for callers that want one.
        self.records
            .iter()
            .map(BlockElementRef::Record)
            .chain(self.sub_blocks.iter().map(BlockElementRef::Block))
    }
}

/// A borrowed reference to either a record or a sub-block, for
/// [`Block::elements`].
#[derive(Debug, Clone, Copy)]
pub enum BlockElementRef<'a> {
    Record(&'a Record),
    Block(&'a Block),
}

/// The root of a fully parsed bitstream: the magic number, every top-level
/// block, and the BLOCKINFO metadata accumulated along the way.
#[derive(Debug, Clone)]
pub struct Document {
    pub magic: u32,
    pub wrapper: Option<WrapperHeader>,
    pub top_blocks: Vec<Block>,
    pub block_info: BlockInfoStore,
}

impl Document {
    /// Parses a complete bitstream, optionally wrapped in a bitcode-wrapper
    /// header, into a `Document`.
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        crate::reader::read_document(data)
    }

    /// Like [`Document::from_bytes`], but routes non-fatal diagnostics to a
    /// caller-supplied sink instead of `log::warn!`.
    pub fn from_bytes_with_sink(data: &[u8], warn: &mut dyn crate::error::WarnSink) -> Result<Self, Error> {
        crate::reader::read_document_with_sink(data, warn)
    }

    /// The human-readable name attached to `block_id` via BLOCKINFO, if
    /// any.
    #[must_use]
    pub fn block_name(&self, block_id: u32) -> Option<&str> {
        self.block_info.block_name(block_id)
    }

    /// The human-readable name attached to `record_code` within
    /// `block_id`'s BLOCKINFO metadata, if any.
    #[must_use]
    pub fn record_name(&self, block_id: u32, record_code: u64) -> Option<&str> {
        self.block_info.record_name(block_id, record_code)
    }
}

pub(crate) fn split_signature(data: &[u8]) -> Result<(Option<WrapperHeader>, &[u8]), Error> {
    strip_wrapper(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_wrapper_passes_data_through() {
        let data = [0xDEu8, 0xC0, 0x17, 0x0B];
        let (wrapper, bitstream) = strip_wrapper(&data).unwrap();
        assert!(wrapper.is_none());
        assert_eq!(bitstream, &data);
    }

    #[test]
    fn wrapper_header_is_stripped() {
        let mut data = Vec::new();
        data.extend_from_slice(&BITCODE_WRAPPER_MAGIC.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes()); // version
        data.extend_from_slice(&20u32.to_le_bytes()); // offset
        data.extend_from_slice(&4u32.to_le_bytes()); // size
        data.extend_from_slice(&0u32.to_le_bytes()); // cpu_type
        data.extend_from_slice(&[0xDE, 0xC0, 0x17, 0x0B]);

        let (wrapper, bitstream) = strip_wrapper(&data).unwrap();
        let wrapper = wrapper.unwrap();
        assert_eq!(wrapper.offset, 20);
        assert_eq!(wrapper.size, 4);
        assert_eq!(bitstream, &[0xDE, 0xC0, 0x17, 0x0B]);
    }
}
