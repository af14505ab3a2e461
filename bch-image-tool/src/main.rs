//! bch-image-tool — a thin CLI over `bch_image`
//!
//! Demonstration/debugging harness for the decoder; not part of its
//! tested contract.
//!
//! # Usage
//!
//! ```text
//! bch-image-tool info <image>                               Superblock summary
//! bch-image-tool extents <image> [inode]                    Enumerate extents
//! bch-image-tool inodes <image>                              Enumerate inodes
//! bch-image-tool dirents <image> [parent_inode]              Enumerate dirents
//! bch-image-tool find-inode <image> <inum>                   Point lookup
//! bch-image-tool find-dirent <image> <parent_inode> <name>   Point lookup
//! bch-image-tool find-extent <image> <inode> <file_offset>   Point lookup
//! ```

mod cmd_dirents;
mod cmd_extents;
mod cmd_find;
mod cmd_inodes;
mod cmd_info;
mod style;

use std::env;
use std::process;

use log::debug;

use style::{RED, RESET};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    debug!("dispatching command {:?}", args[1]);

    let result = match args[1].as_str() {
        "info" => cmd_info::run(&args[2..]),
        "extents" => cmd_extents::run(&args[2..]),
        "inodes" => cmd_inodes::run(&args[2..]),
        "dirents" => cmd_dirents::run(&args[2..]),
        "find-inode" => cmd_find::find_inode(&args[2..]),
        "find-dirent" => cmd_find::find_dirent(&args[2..]),
        "find-extent" => cmd_find::find_extent(&args[2..]),
        "-h" | "--help" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            eprintln!("{RED}Unknown command: {}{RESET}", args[1]);
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("{RED}error:{RESET} {e}");
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!(
        r#"
bch-image-tool — bcachefs image explorer

USAGE:
    bch-image-tool <COMMAND> [OPTIONS]

COMMANDS:
    info          <image>                             Superblock summary
    extents       <image> [inode]                      Enumerate extents
    inodes        <image>                              Enumerate inodes
    dirents       <image> [parent_inode]                Enumerate dirents
    find-inode    <image> <inum>                         Point lookup
    find-dirent   <image> <parent_inode> <name>          Point lookup
    find-extent   <image> <inode> <file_offset>          Point lookup
"#
    );
}
