use llvm_bitstream::{read_document, Cursor};
use proptest::prelude::*;

const MAGIC: [u8; 4] = [0xDE, 0xC0, 0x17, 0x0B];

/// A Darwin bitcode-wrapper header followed by a bare (magic-only) stream
/// is parsed transparently: the wrapper is surfaced on `Document::wrapper`
/// and the bitstream proper is read from the offset it names.
#[test]
fn wrapper_header_round_trips_through_read_document() {
    let mut data = Vec::new();
    data.extend_from_slice(&0x0B17_C0DEu32.to_le_bytes()); // wrapper magic
    data.extend_from_slice(&0u32.to_le_bytes()); // version
    data.extend_from_slice(&20u32.to_le_bytes()); // offset
    data.extend_from_slice(&4u32.to_le_bytes()); // size
    data.extend_from_slice(&0u32.to_le_bytes()); // cpu_type
    data.extend_from_slice(&MAGIC);

    let doc = read_document(&data).unwrap();
    let wrapper = doc.wrapper.expect("wrapper header should be detected");
    assert_eq!(wrapper.offset, 20);
    assert_eq!(wrapper.size, 4);
    assert_eq!(doc.magic, 0x0B17_C0DE);
    assert!(doc.top_blocks.is_empty());
}

#[test]
fn bare_stream_has_no_wrapper() {
    let doc = read_document(&MAGIC).unwrap();
    assert!(doc.wrapper.is_none());
}

fn encode_vbr(mut value: u64, width: u8) -> Vec<u8> {
    let payload_width = width - 1;
    let mut bits = Vec::new();
    loop {
        let mut chunk = value & ((1u64 << payload_width) - 1);
        value >>= payload_width;
        let cont = value != 0;
        if cont {
            chunk |= 1 << payload_width;
        }
        for i in 0..width {
            bits.push((chunk >> i) & 1 == 1);
        }
        if !cont {
            break;
        }
    }
    let mut bytes = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

proptest! {
    /// Every value up to 60 bits round-trips through VBR encoding at every
    /// chunk width the format allows (2..=32), regardless of how many
    /// continuation chunks it takes.
    #[test]
    fn vbr_round_trips_arbitrary_values(value in 0u64..(1u64 << 60), width in 2u8..=32u8) {
        let bytes = encode_vbr(value, width);
        let mut cursor = Cursor::new(&bytes);
        prop_assert_eq!(cursor.read_vbr(width).unwrap(), value);
    }
}
