use crate::file::File;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where asset files (`memlist.bin`, `bankNN`) come from.
pub trait Storage {
    fn open(&self, name: &str) -> Result<File>;
}

pub fn bank_name(bank_id: u8) -> String {
    format!("bank{:02x}", bank_id)
}

/// Assets read from a directory on disk.
pub struct DirStorage {
    data_dir: PathBuf,
}

impl DirStorage {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl Storage for DirStorage {
    fn open(&self, name: &str) -> Result<File> {
        File::open(name, &self.data_dir)
    }
}

impl fmt::Debug for DirStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirStorage")
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

/// Assets kept in memory, keyed by lowercase file name.
#[derive(Default)]
pub struct MemStorage {
    files: HashMap<String, Vec<u8>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, data: Vec<u8>) {
        self.files.insert(name.to_lowercase(), data);
    }
}

impl Storage for MemStorage {
    fn open(&self, name: &str) -> Result<File> {
        let data = self
            .files
            .get(&name.to_lowercase())
            .ok_or_else(|| anyhow!("MemStorage::open() no file named '{}'", name))?;
        Ok(File::from_bytes(data.clone()))
    }
}
