use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::block::{Block, BlockFS};
use crate::error::CoreError;

/// Append-only block log: one JSON `BlockFS` record per line. The hash
/// recorded next to each block is the only trust boundary for on-disk data;
/// replay verifies it line by line.
pub struct Storage {
    path: PathBuf,
    file: Mutex<File>,
}

impl Storage {
    /// Open the block database for appending. The file must already exist;
    /// a missing database is a startup error, not something to paper over.
    pub fn open(path: impl AsRef<Path>) -> Result<Storage, CoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).append(true).open(&path)?;

        Ok(Storage { path, file: Mutex::new(file) })
    }

    /// Append one block record. Writers are serialized by the internal lock.
    pub fn write(&self, block_fs: &BlockFS) -> Result<(), CoreError> {
        let mut line = serde_json::to_vec(block_fs)?;
        line.push(b'\n');

        let mut file = self.file.lock().unwrap();
        file.write_all(&line)?;
        file.flush()?;

        Ok(())
    }

    /// Replay the whole chain from disk. Opens a fresh read handle, so it
    /// never contends with the append handle. Fails with the index of the
    /// first record whose content no longer matches its recorded hash.
    pub fn read_all(&self) -> Result<Vec<Block>, CoreError> {
        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut blocks = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let block_fs: BlockFS = serde_json::from_str(&line)?;

            if block_fs.block.hash() != block_fs.hash {
                return Err(CoreError::TamperedBlock { index });
            }

            blocks.push(block_fs.block);
        }

        Ok(blocks)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
