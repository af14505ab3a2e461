use std::process;

use crate::style::*;

pub(crate) fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if args.is_empty() {
        eprintln!("Usage: bch-image-tool info <image>");
        process::exit(1);
    }

    let image = bch_image::Image::open(&args[0])?;
    let sb = image.superblock();

    header(&format!("bcachefs image: {}", args[0]));
    kv("Magic", &format!("{:02x}{:02x}{:02x}{:02x}...", sb.uuid[0], sb.uuid[1], sb.uuid[2], sb.uuid[3]));
    kv("UUID", &sb.uuid.iter().map(|b| format!("{b:02x}")).collect::<String>());
    kv("Block size", &format_size(sb.block_size as u64));
    kv("Node size", &format_size(sb.node_size as u64));
    println!();

    Ok(())
}
