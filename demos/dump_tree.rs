//! Dumps the block/record tree of a bitstream file, resolving block and
//! record names through BLOCKINFO metadata where available.

use llvm_bitstream::{Block, BlockElementRef, Document, Value};

fn main() {
    let path = std::env::args()
        .nth(1)
        .expect("Provide a path to a bitstream file");
    let data = std::fs::read(&path).unwrap();

    let doc = llvm_bitstream::read_document(&data).unwrap();
    println!(
        "<STREAM magic=0x{:08x} wrapper={}>",
        doc.magic,
        doc.wrapper.is_some()
    );
    for block in &doc.top_blocks {
        print_block(&doc, block, 1);
    }
    println!("</STREAM>");
}

fn print_block(doc: &Document, block: &Block, depth: usize) {
    let indent = "  ".repeat(depth);
    let name = doc.block_name(block.id).unwrap_or("?");
    println!("{indent}<BLOCK id={} name={name} abbrev_width={}>", block.id, block.abbrev_id_width);
    for element in block.elements() {
        match element {
            BlockElementRef::Record(record) => {
                let name = doc.record_name(block.id, u64::from(record.code)).unwrap_or("?");
                print!("{indent}  <RECORD code={} name={name}", record.code);
                for value in &record.values {
                    print_value(value);
                }
                println!("/>");
            }
            BlockElementRef::Block(sub) => print_block(doc, sub, depth + 1),
        }
    }
    println!("{indent}</BLOCK>");
}

fn print_value(value: &Value) {
    match value {
        Value::Scalar(v) => print!(" {v}"),
        Value::Array(items) => {
            print!(" [");
            for item in items {
                print_value(item);
            }
            print!(" ]");
        }
        Value::Blob(bytes) => print!(" blob({} bytes)", bytes.len()),
    }
}
