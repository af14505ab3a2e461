use std::process;

use crate::style::*;

pub(crate) fn find_inode(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if args.len() < 2 {
        eprintln!("Usage: bch-image-tool find-inode <image> <inum>");
        process::exit(1);
    }
    let image = bch_image::Image::open(&args[0])?;
    let inum: u64 = args[1].parse()?;

    match image.find_inode(inum)? {
        Some(inode) => {
            header(&format!("inode {inum}"));
            kv("size", &inode.size.to_string());
            kv("hash_seed", &inode.hash_seed.to_string());
            println!();
        }
        None => println!("  {RED}not found{RESET}"),
    }
    Ok(())
}

pub(crate) fn find_dirent(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if args.len() < 3 {
        eprintln!("Usage: bch-image-tool find-dirent <image> <parent_inode> <name>");
        process::exit(1);
    }
    let image = bch_image::Image::open(&args[0])?;
    let parent: u64 = args[1].parse()?;
    let name = args[2].as_bytes();

    match image.find_dirent(parent, 0, name)? {
        Some(d) => {
            header(&format!("dirent {parent}/{}", args[2]));
            kv("inode", &d.inode.to_string());
            kv("type", &d.dtype.to_string());
            println!();
        }
        None => println!("  {RED}not found{RESET}"),
    }
    Ok(())
}

pub(crate) fn find_extent(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if args.len() < 3 {
        eprintln!("Usage: bch-image-tool find-extent <image> <inode> <file_offset>");
        process::exit(1);
    }
    let image = bch_image::Image::open(&args[0])?;
    let inode: u64 = args[1].parse()?;
    let file_offset: u64 = args[2].parse()?;

    match image.find_extent(inode, file_offset)? {
        Some(e) => {
            header(&format!("extent {inode}@{file_offset}"));
            kv("offset", &e.offset.to_string());
            kv("size", &format_size(e.size));
            println!();
        }
        None => println!("  {RED}not found{RESET}"),
    }
    Ok(())
}
