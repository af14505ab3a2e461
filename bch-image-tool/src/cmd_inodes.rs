use std::process;

use log::warn;

use crate::style::*;

pub(crate) fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if args.is_empty() {
        eprintln!("Usage: bch-image-tool inodes <image>");
        process::exit(1);
    }

    let image = bch_image::Image::open(&args[0])?;

    header(&format!("inodes: {}", args[0]));
    println!("  {DIM}{:<10} {:>12} {:>20}{RESET}", "inode", "size", "hash_seed");

    let mut count = 0usize;
    for inode in image.iter_inodes()? {
        let inode = match inode {
            Ok(i) => i,
            Err(e) => {
                warn!("skipping undecodable inode: {e}");
                continue;
            }
        };
        println!("  {:<10} {:>12} {:>20}", inode.inode, inode.size, inode.hash_seed);
        count += 1;
    }
    println!();
    println!("  {DIM}{count} inode(s){RESET}");
    println!();

    Ok(())
}
