use std::process;

use log::warn;

use crate::style::*;

pub(crate) fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if args.is_empty() {
        eprintln!("Usage: bch-image-tool dirents <image> [parent_inode]");
        process::exit(1);
    }

    let image = bch_image::Image::open(&args[0])?;
    let filter_parent: Option<u64> = args.get(1).map(|s| s.parse()).transpose()?;

    header(&format!("dirents: {}", args[0]));
    println!("  {DIM}{:<10} {:<10} {:>6}  {}{RESET}", "parent", "inode", "type", "name");

    let mut count = 0usize;
    for dirent in image.iter_dirents()? {
        let dirent = match dirent {
            Ok(d) => d,
            Err(e) => {
                warn!("skipping undecodable dirent: {e}");
                continue;
            }
        };
        if let Some(parent) = filter_parent {
            if dirent.parent_inode != parent {
                continue;
            }
        }
        println!(
            "  {:<10} {:<10} {:>6}  {}",
            dirent.parent_inode,
            dirent.inode,
            dirent.dtype,
            dirent.name_str()
        );
        count += 1;
    }
    println!();
    println!("  {DIM}{count} dirent(s){RESET}");
    println!();

    Ok(())
}
