use std::process;

use log::warn;

use crate::style::*;

pub(crate) fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if args.is_empty() {
        eprintln!("Usage: bch-image-tool extents <image> [inode]");
        process::exit(1);
    }

    let image = bch_image::Image::open(&args[0])?;
    let filter_inode: Option<u64> = args.get(1).map(|s| s.parse()).transpose()?;

    header(&format!("extents: {}", args[0]));
    println!("  {DIM}{:<10} {:>14} {:>14} {:>10}{RESET}", "inode", "file_offset", "offset", "size");

    let mut count = 0usize;
    for extent in image.iter_extents()? {
        let extent = match extent {
            Ok(e) => e,
            Err(e) => {
                warn!("skipping undecodable extent: {e}");
                continue;
            }
        };
        if let Some(inum) = filter_inode {
            if extent.inode != inum {
                continue;
            }
        }
        println!(
            "  {:<10} {:>14} {:>14} {:>10}",
            extent.inode, extent.file_offset, extent.offset, extent.size
        );
        count += 1;
    }
    println!();
    println!("  {DIM}{count} extent(s){RESET}");
    println!();

    Ok(())
}
