use crate::abbrev::{self, reserved_abbrev_id, AbbrevDef, AbbrevOp, AbbrevTable, BlockInfoCode, Value, BLOCKINFO_BLOCK_ID};
use crate::blockinfo::BlockInfoStore;
use crate::cursor::Cursor;
use crate::document::{split_signature, Block, Document, Record};
use crate::error::{Error, LogWarnSink, WarnSink};

const TOP_LEVEL_ABBREV_ID_WIDTH: u8 = 2;

/// One frame of the [`ParserStateStack`]: the block currently being parsed
/// (`None` for the synthetic top-level frame), its active abbreviation
/// table, and the byte offset its body started at (used to validate
/// `length_bytes` on exit).
struct Frame {
    current_block: Option<u32>,
    abbrev_id_width: u8,
    abbrevs: AbbrevTable,
    enter_position_bytes: u64,
}

impl Frame {
    fn top_level() -> Self {
        Self {
            current_block: None,
            abbrev_id_width: TOP_LEVEL_ABBREV_ID_WIDTH,
            abbrevs: AbbrevTable::new(),
            enter_position_bytes: 0,
        }
    }
}

/// Stack of frames mirroring block nesting. Depth is always ≥ 1: element 0
/// is the synthetic top-level frame.
struct ParserStateStack {
    frames: Vec<Frame>,
}

impl ParserStateStack {
    fn new() -> Self {
        Self {
            frames: vec![Frame::top_level()],
        }
    }

    fn top(&self) -> &Frame {
        self.frames.last().expect("stack always has a top-level frame")
    }

    fn top_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("stack always has a top-level frame")
    }
}

/// One top-level token decoded from the stream by [`read_token`].
enum Token {
    EndBlock,
    EnterSubBlock {
        block_id: u32,
        new_abbrev_id_width: u8,
        length_bytes: u32,
    },
    DefineAbbrev(AbbrevDef),
    UnabbrevRecord(Record),
    DefinedRecord(Record),
}

/// Decodes one token at the cursor's current position, dispatching on the
/// `abbrev_id` read with `frame`'s active width.
fn read_token(cursor: &mut Cursor<'_>, frame: &Frame) -> Result<Token, Error> {
    let block_id = frame.current_block;
    let abbrev_id = cursor.read_bits(frame.abbrev_id_width)? as u32;
    match abbrev_id {
        reserved_abbrev_id::END_BLOCK => {
            cursor.align_to(32)?;
            Ok(Token::EndBlock)
        }
        reserved_abbrev_id::ENTER_SUBBLOCK => {
            let new_block_id = u32::try_from(cursor.read_vbr(8)?)
                .map_err(|_| Error::malformed("block id overflow", cursor.position(), block_id))?;
            let new_abbrev_id_width = cursor.read_vbr(4)? as u8;
            if new_abbrev_id_width == 0 {
                return Err(Error::malformed("zero abbrev id width", cursor.position(), block_id));
            }
            cursor.align_to(32)?;
            let length_words = cursor.read_bits(32)?;
            let length_bytes = length_words
                .checked_mul(4)
                .and_then(|bytes| u32::try_from(bytes).ok())
                .ok_or_else(|| Error::malformed("block length overflow", cursor.position(), block_id))?;
            Ok(Token::EnterSubBlock {
                block_id: new_block_id,
                new_abbrev_id_width,
                length_bytes,
            })
        }
        reserved_abbrev_id::DEFINE_ABBREV => {
            let def = AbbrevDef::decode(cursor)?;
            Ok(Token::DefineAbbrev(def))
        }
        reserved_abbrev_id::UNABBREV_RECORD => {
            let code = u32::try_from(cursor.read_vbr(6)?)
                .map_err(|_| Error::malformed("record code overflow", cursor.position(), block_id))?;
            let count = cursor.read_vbr(6)?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(Value::Scalar(cursor.read_vbr(6)?));
            }
            Ok(Token::UnabbrevRecord(Record {
                abbrev_id: reserved_abbrev_id::UNABBREV_RECORD,
                code,
                values,
            }))
        }
        _ => {
            let def = frame
                .abbrevs
                .get(abbrev_id)
                .ok_or_else(|| Error::malformed("unknown abbrev id", cursor.position(), block_id))?
                .clone();
            let record = decode_defined_record(cursor, abbrev_id, &def, block_id)?;
            Ok(Token::DefinedRecord(record))
        }
    }
}

fn decode_operand(cursor: &mut Cursor<'_>, op: &AbbrevOp, block_id: Option<u32>) -> Result<Value, Error> {
    match op {
        AbbrevOp::Literal(value) => Ok(Value::Scalar(*value)),
        AbbrevOp::Fixed(0) => Ok(Value::Scalar(0)),
        AbbrevOp::Fixed(width) => Ok(Value::Scalar(cursor.read_bits(*width)?)),
        AbbrevOp::Vbr(width) => Ok(Value::Scalar(cursor.read_vbr(*width)?)),
        AbbrevOp::Char6 => {
            let index = cursor.read_bits(6)? as u8;
            let ch = abbrev::char6_decode(index, cursor.position())?;
            Ok(Value::Scalar(u64::from(ch)))
        }
        AbbrevOp::Array(elem) => {
            let count = cursor.read_vbr(6)?;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(decode_operand(cursor, elem, block_id)?);
            }
            Ok(Value::Array(items))
        }
        AbbrevOp::Blob => {
            let length = cursor.read_vbr(6)? as usize;
            cursor.align_to(32)?;
            let bytes = cursor.read_bytes(length)?.to_vec();
            cursor.align_to(32)?;
            Ok(Value::Blob(bytes))
        }
    }
}

fn decode_defined_record(
    cursor: &mut Cursor<'_>,
    abbrev_id: u32,
    def: &AbbrevDef,
    block_id: Option<u32>,
) -> Result<Record, Error> {
    let mut ops = def.ops.iter();
    let code_op = ops.next().ok_or_else(|| Error::malformed("empty abbreviation", cursor.position(), block_id))?;
    let code_value = decode_operand(cursor, code_op, block_id)?;
    let code = code_value
        .as_scalar()
        .ok_or_else(|| Error::malformed("record code not scalar", cursor.position(), block_id))?;
    let code = u32::try_from(code).map_err(|_| Error::malformed("record code overflow", cursor.position(), block_id))?;

    let mut values = Vec::new();
    for op in ops {
        values.push(decode_operand(cursor, op, block_id)?);
    }
    Ok(Record { abbrev_id, code, values })
}

fn enter_block(cursor: &Cursor<'_>, stack: &mut ParserStateStack, block_info: &BlockInfoStore, id: u32, abbrev_id_width: u8) -> Result<(), Error> {
    let position = cursor.position();
    if position.bit_offset != 0 {
        return Err(Error::malformed("block entered off byte boundary", position, Some(id)));
    }
    stack.frames.push(Frame {
        current_block: Some(id),
        abbrev_id_width,
        abbrevs: block_info.seed_table(id),
        enter_position_bytes: position.byte_offset,
    });
    Ok(())
}

fn exit_block(cursor: &Cursor<'_>, stack: &mut ParserStateStack, length_bytes: u32) -> Result<(), Error> {
    let frame = stack.frames.pop().expect("enter_block always pushes a frame first");
    let position = cursor.position();
    let expected = frame.enter_position_bytes + u64::from(length_bytes);
    if position.bit_offset != 0 || position.byte_offset != expected {
        return Err(Error::malformed("block length mismatch", position, frame.current_block));
    }
    Ok(())
}

fn decode_utf8_name(values: &[Value]) -> Option<String> {
    let bytes: Option<Vec<u8>> = values.iter().map(|v| v.as_scalar().map(|s| s as u8)).collect();
    let bytes = bytes?;
    String::from_utf8(bytes).ok()
}

/// Drives the reserved-record-code interpretation of a BLOCKINFO block:
/// `SET_BID` retargets subsequent `DEFINE_ABBREV` and name records at a
/// block id, `BLOCK_NAME`/`SET_RECORD_NAME` attach names.
fn read_block_info(cursor: &mut Cursor<'_>, stack: &mut ParserStateStack, block_info: &mut BlockInfoStore, warn: &mut dyn WarnSink) -> Result<(), Error> {
    let mut target_block_id: Option<u32> = None;
    loop {
        let token = read_token(cursor, stack.top())?;
        match token {
            Token::EndBlock => return Ok(()),
            Token::EnterSubBlock { length_bytes, .. } => {
                warn.warn("sub-block inside BLOCKINFO", cursor.position(), Some(BLOCKINFO_BLOCK_ID));
                cursor.read_bytes(length_bytes as usize)?;
            }
            Token::DefineAbbrev(def) => match target_block_id {
                Some(target) => {
                    block_info.entry(target).abbrev_defs.add(def);
                }
                None => {
                    return Err(Error::malformed("DEFINE_ABBREV before SET_BID in BLOCKINFO", cursor.position(), Some(BLOCKINFO_BLOCK_ID)));
                }
            },
            Token::UnabbrevRecord(record) => match u8::try_from(record.code).ok().and_then(|c| BlockInfoCode::try_from(c).ok()) {
                Some(BlockInfoCode::SetBid) => match record.values.as_slice() {
                    [single] => match single.as_scalar() {
                        Some(id) => target_block_id = Some(id as u32),
                        None => warn.warn("non-scalar SET_BID value", cursor.position(), Some(BLOCKINFO_BLOCK_ID)),
                    },
                    _ => warn.warn("malformed SET_BID record", cursor.position(), Some(BLOCKINFO_BLOCK_ID)),
                },
                Some(BlockInfoCode::BlockName) => match target_block_id {
                    Some(target) => match decode_utf8_name(&record.values) {
                        Some(name) => block_info.entry(target).name = Some(name),
                        None => warn.warn("invalid utf-8 in BLOCK_NAME", cursor.position(), Some(BLOCKINFO_BLOCK_ID)),
                    },
                    None => warn.warn("BLOCK_NAME before SET_BID", cursor.position(), Some(BLOCKINFO_BLOCK_ID)),
                },
                Some(BlockInfoCode::SetRecordName) => match target_block_id {
                    Some(target) => match record.values.split_first() {
                        Some((code, rest)) => match code.as_scalar() {
                            Some(code) => match decode_utf8_name(rest) {
                                Some(name) => {
                                    block_info.entry(target).record_names.insert(code, name);
                                }
                                None => warn.warn("invalid utf-8 in SET_RECORD_NAME", cursor.position(), Some(BLOCKINFO_BLOCK_ID)),
                            },
                            None => warn.warn("non-scalar record code in SET_RECORD_NAME", cursor.position(), Some(BLOCKINFO_BLOCK_ID)),
                        },
                        None => warn.warn("empty SET_RECORD_NAME record", cursor.position(), Some(BLOCKINFO_BLOCK_ID)),
                    },
                    None => warn.warn("SET_RECORD_NAME before SET_BID", cursor.position(), Some(BLOCKINFO_BLOCK_ID)),
                },
                None => warn.warn("unknown record code inside BLOCKINFO", cursor.position(), Some(BLOCKINFO_BLOCK_ID)),
            },
            Token::DefinedRecord(_) => {
                warn.warn("defined record inside BLOCKINFO is non-standard", cursor.position(), Some(BLOCKINFO_BLOCK_ID));
            }
        }
    }
}

/// Reads the body of an already-entered block: records and sub-blocks in
/// stream order, until `END_BLOCK`.
fn read_block(
    cursor: &mut Cursor<'_>,
    stack: &mut ParserStateStack,
    block_info: &mut BlockInfoStore,
    warn: &mut dyn WarnSink,
    id: u32,
    abbrev_id_width: u8,
    length_bytes: u32,
) -> Result<Block, Error> {
    let mut records = Vec::new();
    let mut sub_blocks = Vec::new();
    loop {
        let token = read_token(cursor, stack.top())?;
        match token {
            Token::EndBlock => break,
            Token::EnterSubBlock {
                block_id: sub_id,
                new_abbrev_id_width,
                length_bytes: sub_length,
            } => {
                sub_blocks.push(read_entered_sub_block(cursor, stack, block_info, warn, sub_id, new_abbrev_id_width, sub_length)?);
            }
            Token::DefineAbbrev(def) => {
                stack.top_mut().abbrevs.add(def);
            }
            Token::UnabbrevRecord(record) | Token::DefinedRecord(record) => {
                records.push(record);
            }
        }
    }
    Ok(Block {
        id,
        abbrev_id_width,
        length_bytes,
        records,
        sub_blocks,
    })
}

/// Enters, reads, and exits one sub-block, dispatching to the BLOCKINFO
/// pre-pass when `sub_id == BLOCKINFO_BLOCK_ID`.
fn read_entered_sub_block(
    cursor: &mut Cursor<'_>,
    stack: &mut ParserStateStack,
    block_info: &mut BlockInfoStore,
    warn: &mut dyn WarnSink,
    sub_id: u32,
    new_abbrev_id_width: u8,
    length_bytes: u32,
) -> Result<Block, Error> {
    enter_block(cursor, stack, block_info, sub_id, new_abbrev_id_width)?;
    if sub_id == BLOCKINFO_BLOCK_ID {
        read_block_info(cursor, stack, block_info, warn)?;
        exit_block(cursor, stack, length_bytes)?;
        Ok(Block {
            id: sub_id,
            abbrev_id_width: new_abbrev_id_width,
            length_bytes,
            records: Vec::new(),
            sub_blocks: Vec::new(),
        })
    } else {
        let block = read_block(cursor, stack, block_info, warn, sub_id, new_abbrev_id_width, length_bytes)?;
        exit_block(cursor, stack, length_bytes)?;
        Ok(block)
    }
}

fn read_top_level(cursor: &mut Cursor<'_>, block_info: &mut BlockInfoStore, warn: &mut dyn WarnSink) -> Result<Vec<Block>, Error> {
    let mut stack = ParserStateStack::new();
    let mut top_blocks = Vec::new();
    while !cursor.is_at_end() {
        let token = read_token(cursor, stack.top())?;
        match token {
            Token::EnterSubBlock {
                block_id,
                new_abbrev_id_width,
                length_bytes,
            } => {
                top_blocks.push(read_entered_sub_block(cursor, &mut stack, block_info, warn, block_id, new_abbrev_id_width, length_bytes)?);
            }
            Token::EndBlock => warn.warn("stray END_BLOCK at top level", cursor.position(), None),
            Token::DefineAbbrev(_) => warn.warn("stray DEFINE_ABBREV at top level", cursor.position(), None),
            Token::UnabbrevRecord(_) | Token::DefinedRecord(_) => {
                warn.warn("stray record at top level", cursor.position(), None);
            }
        }
    }
    Ok(top_blocks)
}

/// Parses a complete bitstream (optionally wrapped in a bitcode-wrapper
/// header) into a [`Document`], using the default `log`-backed warning
/// sink for non-fatal conditions.
pub fn read_document(data: &[u8]) -> Result<Document, Error> {
    let mut sink = LogWarnSink;
    read_document_with_sink(data, &mut sink)
}

/// Like [`read_document`], but routes non-fatal diagnostics to a
/// caller-supplied [`WarnSink`] instead of `log::warn!`.
pub fn read_document_with_sink(data: &[u8], warn: &mut dyn WarnSink) -> Result<Document, Error> {
    let (wrapper, bitstream) = split_signature(data)?;
    let mut cursor = Cursor::new(bitstream);
    let magic = cursor.read_bits(32)? as u32;
    let mut block_info = BlockInfoStore::new();
    let top_blocks = read_top_level(&mut cursor, &mut block_info, warn)?;
    Ok(Document {
        magic,
        wrapper,
        top_blocks,
        block_info,
    })
}

/// Scan-for-definitions mode: walks a block starting at `byte_offset`
/// applying only `DEFINE_ABBREV` to the returned table; sub-blocks are
/// skipped whole and records are decoded (to keep the cursor advancing
/// correctly) but discarded.
///
/// Takes the raw buffer and a byte offset rather than a [`Block`] value,
/// since the tree `Block` type does not retain a back-pointer into the
/// source bytes — see DESIGN.md.
pub fn scan_abbrevs(
    data: &[u8],
    byte_offset: u64,
    block_id: u32,
    abbrev_id_width: u8,
    block_info: &BlockInfoStore,
) -> Result<AbbrevTable, Error> {
    let mut cursor = Cursor::new(data);
    cursor.read_bytes(byte_offset as usize)?;
    let mut frame = Frame {
        current_block: Some(block_id),
        abbrev_id_width,
        abbrevs: block_info.seed_table(block_id),
        enter_position_bytes: byte_offset,
    };
    loop {
        let token = read_token(&mut cursor, &frame)?;
        match token {
            Token::EndBlock => break,
            Token::EnterSubBlock { length_bytes, .. } => {
                cursor.read_bytes(length_bytes as usize)?;
            }
            Token::DefineAbbrev(def) => {
                frame.abbrevs.add(def);
            }
            Token::UnabbrevRecord(_) | Token::DefinedRecord(_) => {}
        }
    }
    Ok(frame.abbrevs)
}
