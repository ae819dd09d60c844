use anyhow::Result;
use awvm_core::{
    file::File,
    memlist::{MemEntry, ResType, MEM_ENTRY_SIZE},
    reference::Ref,
    resource::{ResourceManager, ResourceRef},
    storage::MemStorage,
};

/// Directory plus a single unpacked bank, built entry by entry.
#[derive(Default)]
pub(crate) struct Assets {
    entries: Vec<(ResType, Vec<u8>)>,
}

impl Assets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts `data` at `id`, padding the directory with small sounds.
    pub fn set(mut self, id: usize, res_type: ResType, data: Vec<u8>) -> Self {
        while self.entries.len() <= id {
            self.entries.push((ResType::Sound, vec![0; 2]));
        }
        self.entries[id] = (res_type, data);
        self
    }

    pub fn storage(&self) -> Result<MemStorage> {
        let mut memlist = File::in_memory();
        let mut bank = Vec::new();
        for (res_type, data) in &self.entries {
            let size = data.len() as u16;
            MemEntry::new(*res_type, 0, 1, bank.len() as u32, size, size).write(&mut memlist)?;
            bank.extend_from_slice(data);
        }
        memlist.write_u8(0xFF)?;
        memlist.write(&[0; MEM_ENTRY_SIZE - 1])?;

        let mut storage = MemStorage::new();
        storage.insert("memlist.bin", memlist.bytes().unwrap_or_default().to_vec());
        storage.insert("bank01", bank);
        Ok(storage)
    }

    pub fn resources(&self) -> Result<ResourceRef> {
        let mut res = ResourceManager::new(Box::new(self.storage()?));
        res.read_directory()?;
        Ok(Ref::new(res))
    }
}
