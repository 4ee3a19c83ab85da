//! Reader and writer for chunked binary `.skeleton` files
//!
//! ```no_run
//! use ossa_skel::{load_skeleton, save_skeleton};
//!
//! let skeleton = load_skeleton("robot.skeleton")?;
//! println!("{} bones", skeleton.num_bones());
//! save_skeleton("copy.skeleton", &skeleton)?;
//! # Ok::<(), ossa_skel::SkelError>(())
//! ```

pub mod chunks;
pub mod error;
pub mod reader;
pub mod writer;

pub use error::{Result, SkelError};
pub use reader::{ChunkStream, read_skeleton};
pub use writer::{write_file_header, write_skeleton};

use ossa_skeleton::Skeleton;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// File extension handled by this crate
pub const EXTENSION: &str = "skeleton";

fn check_extension(path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case(EXTENSION) => Ok(()),
        other => Err(SkelError::UnsupportedFormat(format!(
            "{}: expected a .{EXTENSION} file, got extension {:?}",
            path.display(),
            other.unwrap_or("")
        ))),
    }
}

/// Load a `.skeleton` file. The skeleton is named after the file stem.
pub fn load_skeleton(path: impl AsRef<Path>) -> Result<Skeleton> {
    let path = path.as_ref();
    check_extension(path)?;
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(EXTENSION)
        .to_string();
    let file = File::open(path)?;
    read_skeleton(BufReader::new(file), &name)
}

/// Save `skeleton` to a `.skeleton` file.
pub fn save_skeleton(path: impl AsRef<Path>, skeleton: &Skeleton) -> Result<()> {
    let path = path.as_ref();
    check_extension(path)?;
    let mut writer = BufWriter::new(File::create(path)?);
    write_skeleton(&mut writer, skeleton)?;
    writer.flush()?;
    Ok(())
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
