//! LLVM bitstream container format decoder.
//!
//! The bitstream format is the bit-packed container LLVM wraps around both
//! bitcode modules and other block-structured payloads (module summary
//! indexes, serialized diagnostics, and so on). This crate decodes the
//! container itself: blocks, abbreviations, and records. It does not know
//! what any particular block id or record code *means* — that's a layer
//! callers build on top, helped along by [`Document::block_name`] and
//! [`Document::record_name`], which resolve the names a BLOCKINFO block
//! attaches.

/// Bit-level diagnostics: [`error::Position`], [`error::Error`], and the
/// [`error::WarnSink`] trait non-fatal conditions are routed through.
pub mod error;

/// Bit-addressed cursor over the input buffer.
pub mod cursor;

/// Abbreviation definitions, operand encodings, and the `Char6` alphabet.
pub mod abbrev;

/// Per-block-id metadata accumulated from BLOCKINFO blocks.
pub mod blockinfo;

/// The parsed document tree.
pub mod document;

/// The parser state machine that turns a byte buffer into a `Document`.
pub mod reader;

pub use self::abbrev::{AbbrevDef, AbbrevOp, AbbrevTable, Value};
pub use self::blockinfo::{BlockInfo, BlockInfoStore};
pub use self::cursor::Cursor;
pub use self::document::{Block, BlockElementRef, Document, Record, WrapperHeader};
pub use self::error::{Error, ErrorKind, LogWarnSink, NullWarnSink, Position, WarnSink};
pub use self::reader::{read_document, read_document_with_sink, scan_abbrevs};
