use crate::bank;
use crate::memlist::{read_mem_list, MemEntry, MemEntryState, ResType, ResourceStats};
use crate::memory::MemoryArena;
use crate::parts::*;
use crate::reference::Ref;
use crate::serializer::{Entry, Mode, Serializer};
use crate::storage::Storage;
use anyhow::{anyhow, bail, ensure, Context, Result};

const LOADED_LIST_SIZE: usize = 64;

pub type ResourceRef = Ref<ResourceManager>;

pub struct ResourceManager {
    storage: Box<dyn Storage>,
    mem_list: Vec<MemEntry>,
    stats: ResourceStats,
    arena: MemoryArena,
    current_part: u16,
    pub requested_next_part: Option<u16>,
    use_seg_video2: bool,
    seg_palette: Option<usize>,
    seg_code: Option<usize>,
    seg_cinematic: Option<usize>,
    seg_video2: Option<usize>,
    pending_bitmap: Option<Vec<u8>>,
}

impl ResourceManager {
    pub fn new(storage: Box<dyn Storage>) -> Self {
        Self {
            storage,
            mem_list: Vec::new(),
            stats: ResourceStats::default(),
            arena: MemoryArena::new(),
            current_part: 0,
            requested_next_part: None,
            use_seg_video2: false,
            seg_palette: None,
            seg_code: None,
            seg_cinematic: None,
            seg_video2: None,
            pending_bitmap: None,
        }
    }

    pub fn entries(&self) -> &[MemEntry] {
        &self.mem_list
    }

    pub fn entry(&self, res_id: u16) -> Option<&MemEntry> {
        self.mem_list.get(res_id as usize)
    }

    pub fn stats(&self) -> &ResourceStats {
        &self.stats
    }

    pub fn arena(&self) -> &MemoryArena {
        &self.arena
    }

    pub fn current_part(&self) -> u16 {
        self.current_part
    }

    pub fn use_seg_video2(&self) -> bool {
        self.use_seg_video2
    }

    pub fn set_use_seg_video2(&mut self, val: bool) {
        self.use_seg_video2 = val;
    }

    pub fn seg_palette(&self) -> Option<usize> {
        self.seg_palette
    }

    pub fn seg_code(&self) -> Option<usize> {
        self.seg_code
    }

    pub fn seg_cinematic(&self) -> Option<usize> {
        self.seg_cinematic
    }

    pub fn seg_video2(&self) -> Option<usize> {
        self.seg_video2
    }

    /// Bytecode of the active part, from its start to the end of the arena.
    pub fn bytecode(&self) -> Result<&[u8]> {
        let start = self
            .seg_code
            .ok_or_else(|| anyhow!("Resource::bytecode() no bytecode segment installed"))?;
        Ok(&self.arena.data()[start..])
    }

    /// Bytes of a loaded entry.
    pub fn entry_data(&self, res_id: u16) -> Result<&[u8]> {
        let me = self
            .entry(res_id)
            .ok_or_else(|| anyhow!("Resource::entry_data() unknown entry 0x{:X}", res_id))?;
        let offset = me
            .buf_offset
            .filter(|_| me.state == MemEntryState::Loaded)
            .ok_or_else(|| anyhow!("Resource::entry_data() entry 0x{:X} is not loaded", res_id))?;
        self.arena.slice(offset, me.size as usize)
    }

    /// Full screen bitmap decoded by the last load, waiting for the video.
    pub fn take_pending_bitmap(&mut self) -> Option<Vec<u8>> {
        self.pending_bitmap.take()
    }

    // Read all entries from memlist.bin. Do not load anything in memory,
    // this is just a fast way to access the data later based on their id.
    pub fn read_directory(&mut self) -> Result<()> {
        let mut f = self
            .storage
            .open("memlist.bin")
            .context("Resource::read_directory() unable to open 'memlist.bin' file")?;
        let (entries, stats) = read_mem_list(&mut f)?;
        self.mem_list = entries;
        self.stats = stats;
        Ok(())
    }

    /// Reads and unpacks an entry without touching the arena.
    pub fn read_entry(&self, res_id: u16) -> Result<Vec<u8>> {
        let me = self
            .entry(res_id)
            .ok_or_else(|| anyhow!("Resource::read_entry() unknown entry 0x{:X}", res_id))?;
        self.read_bank(res_id, me)
    }

    fn read_bank(&self, res_id: u16, me: &MemEntry) -> Result<Vec<u8>> {
        log::debug!(target: "awvm::bank", "Resource::read_bank({})", res_id);
        let (data, crc_ok) = bank::read(self.storage.as_ref(), me)
            .with_context(|| format!("Resource::read_bank() unable to unpack entry {}", res_id))?;
        ensure!(
            crc_ok,
            "Resource::read_bank() unable to unpack entry {}: bad CRC",
            res_id
        );
        Ok(data)
    }

    // Pick the pending entry with the highest rank, the last one on a tie.
    fn next_pending(&self) -> Option<usize> {
        let mut max_num = 0;
        let mut found = None;
        for (i, me) in self.mem_list.iter().enumerate() {
            if me.state == MemEntryState::LoadMe && max_num <= me.rank_num {
                max_num = me.rank_num;
                found = Some(i);
            }
        }
        found
    }

    pub fn load_pending(&mut self) -> Result<()> {
        while let Some(i) = self.next_pending() {
            let me = self.mem_list[i].clone();

            let load_destination = if me.res_type == ResType::PolyAnim {
                self.arena.vid_cur
            } else {
                if me.size as usize > self.arena.script_free() {
                    log::warn!(target: "awvm::res", "Resource::load_pending() not enough memory for entry {}", i);
                    self.mem_list[i].state = MemEntryState::NotNeeded;
                    continue;
                }
                self.arena.script_cur
            };

            if me.bank_id == 0 {
                log::warn!(target: "awvm::res", "Resource::load_pending() ec=0x{:X} (me.bank_id == 0)", 0xF00);
                self.mem_list[i].state = MemEntryState::NotNeeded;
                continue;
            }

            log::debug!(
                target: "awvm::bank",
                "Resource::load_pending() buf_pos={:X} size={:X} type={} pos={:X} bank_id={:X}",
                load_destination,
                me.packed_size,
                me.res_type,
                me.bank_offset,
                me.bank_id
            );
            let data = self.read_bank(i as u16, &me)?;
            self.arena.copy_in(load_destination, &data)?;

            if me.res_type == ResType::PolyAnim {
                self.pending_bitmap = Some(data);
                self.mem_list[i].state = MemEntryState::NotNeeded;
            } else {
                let me = &mut self.mem_list[i];
                me.buf_offset = Some(load_destination);
                me.state = MemEntryState::Loaded;
                self.arena.script_cur += me.size as usize;
            }
        }

        Ok(())
    }

    /// Drops everything but the palettes, bytecode and polygon banks and
    /// rewinds the script region to the part checkpoint.
    pub fn invalidate_soft(&mut self) {
        self.mem_list
            .iter_mut()
            .filter(|me| !me.res_type.survives_soft_reload())
            .for_each(|me| me.state = MemEntryState::NotNeeded);
        self.arena.script_cur = self.arena.script_bak;
    }

    pub fn invalidate_all(&mut self) {
        self.mem_list
            .iter_mut()
            .for_each(|me| me.state = MemEntryState::NotNeeded);
        self.arena.script_cur = 0;
    }

    fn mark_load_me(&mut self, res_id: u8) -> Result<()> {
        let me = self.mem_list.get_mut(res_id as usize).ok_or_else(|| {
            anyhow!("Resource::setup_part() entry 0x{:X} is not in the directory", res_id)
        })?;
        me.state = MemEntryState::LoadMe;
        Ok(())
    }

    fn segment_of(&self, res_id: u8) -> Option<usize> {
        self.mem_list.get(res_id as usize).and_then(|me| me.buf_offset)
    }

    // Protection screen and cinematic don't need the player and enemies polygon data
    // so the second polygon bank is never loaded for those parts of the game.
    pub fn setup_part(&mut self, part_id: u16) -> Result<()> {
        if part_id != self.current_part {
            let &[ipal, icod, ivd1, ivd2] = match part_resources(part_id) {
                Some(ids) => ids,
                None => bail!("Resource::setup_part() ec=0x{:X} invalid part_id 0x{:X}", 0xF07, part_id),
            };

            self.invalidate_all();

            self.mark_load_me(ipal)?;
            self.mark_load_me(icod)?;
            self.mark_load_me(ivd1)?;
            if ivd2 != MEMLIST_PART_NONE {
                self.mark_load_me(ivd2)?;
            }

            self.load_pending()?;

            self.seg_palette = self.segment_of(ipal);
            self.seg_code = self.segment_of(icod);
            self.seg_cinematic = self.segment_of(ivd1);
            if ivd2 != MEMLIST_PART_NONE {
                self.seg_video2 = self.segment_of(ivd2);
            }

            log::info!(target: "awvm::res", "setup_part({})", part_id - GAME_PART_FIRST);
            log::debug!(target: "awvm::res", "Loaded resource {} in seg_palette", ipal);
            log::debug!(target: "awvm::res", "Loaded resource {} in seg_code", icod);
            log::debug!(target: "awvm::res", "Loaded resource {} in seg_cinematic", ivd1);
            if ivd2 != MEMLIST_PART_NONE {
                log::debug!(target: "awvm::res", "Loaded resource {} in seg_video2", ivd2);
            }

            self.current_part = part_id;
        }

        // script_cur is moved by load_pending()
        self.arena.script_bak = self.arena.script_cur;

        Ok(())
    }

    /// Loads one entry now, or records a part switch for the next frame when
    /// the id is past the end of the directory.
    pub fn request_load(&mut self, res_id: u16) -> Result<()> {
        let len = self.mem_list.len();
        if res_id as usize > len {
            log::debug!(target: "awvm::res", "Resource::request_load() part switch to 0x{:X} requested", res_id);
            self.requested_next_part = Some(res_id);
        } else if let Some(me) = self.mem_list.get_mut(res_id as usize) {
            if me.state == MemEntryState::NotNeeded {
                me.state = MemEntryState::LoadMe;
                self.load_pending()?;
            }
        }
        Ok(())
    }

    fn loaded_list(&self) -> [u8; LOADED_LIST_SIZE] {
        let mut list = [0; LOADED_LIST_SIZE];
        let mut offset = 0;

        for slot in list.iter_mut() {
            let found = self
                .mem_list
                .iter()
                .enumerate()
                .filter(|(_, me)| me.state == MemEntryState::Loaded && me.buf_offset == Some(offset))
                .last();

            match found {
                Some((i, me)) if me.size > 0 => {
                    *slot = i as u8;
                    offset += me.size as usize;
                }
                _ => break,
            }
        }

        list
    }

    pub fn save_or_load(&mut self, ser: &mut Serializer) -> Result<()> {
        let mut loaded_list = if ser.mode() == Mode::Save {
            self.loaded_list()
        } else {
            [0; LOADED_LIST_SIZE]
        };

        let mut current_part = self.current_part;
        let mut script_bak = Some(self.arena.script_bak);
        let mut script_cur = Some(self.arena.script_cur);
        let mut vid_bak = Some(self.arena.vid_bak);
        let mut vid_cur = Some(self.arena.vid_cur);
        let mut use_seg_video2 = self.use_seg_video2;
        let mut seg_palette = self.seg_palette;
        let mut seg_code = self.seg_code;
        let mut seg_cinematic = self.seg_cinematic;
        let mut seg_video2 = self.seg_video2;

        ser.save_or_load_entries(&mut [
            Entry::array(&mut loaded_list, 1),
            Entry::int(&mut current_part, 1),
            Entry::ptr(&mut script_bak, 1),
            Entry::ptr(&mut script_cur, 1),
            Entry::ptr(&mut vid_bak, 1),
            Entry::ptr(&mut vid_cur, 1),
            Entry::int(&mut use_seg_video2, 1),
            Entry::ptr(&mut seg_palette, 1),
            Entry::ptr(&mut seg_code, 1),
            Entry::ptr(&mut seg_cinematic, 1),
            Entry::ptr(&mut seg_video2, 1),
        ])?;

        if ser.mode() == Mode::Load {
            self.invalidate_all();

            let mut offset = 0;
            for &res_id in loaded_list.iter().take_while(|&&id| id != 0) {
                let me = self.mem_list.get(res_id as usize).cloned().ok_or_else(|| {
                    anyhow!("Resource::save_or_load() unknown entry {} in save", res_id)
                })?;
                let data = self.read_bank(res_id as u16, &me)?;
                self.arena.copy_in(offset, &data)?;

                let me = &mut self.mem_list[res_id as usize];
                me.buf_offset = Some(offset);
                me.state = MemEntryState::Loaded;
                offset += me.size as usize;
            }

            let cursor = |ptr: Option<usize>, name: &str| {
                ptr.ok_or_else(|| anyhow!("Resource::save_or_load() unset {} in save", name))
            };
            self.arena.script_bak = cursor(script_bak, "script_bak")?;
            self.arena.script_cur = cursor(script_cur, "script_cur")?;
            self.arena.vid_bak = cursor(vid_bak, "vid_bak")?;
            self.arena.vid_cur = cursor(vid_cur, "vid_cur")?;

            self.current_part = current_part;
            self.use_seg_video2 = use_seg_video2;
            self.seg_palette = seg_palette;
            self.seg_code = seg_code;
            self.seg_cinematic = seg_cinematic;
            self.seg_video2 = seg_video2;
        }

        Ok(())
    }
}
