use crate::file::File;
use anyhow::{bail, Result};
use std::fmt;

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum MemEntryState {
    NotNeeded,
    Loaded,
    LoadMe,
    EndOfMemList,
}

impl MemEntryState {
    pub fn new(state: u8) -> Result<Self> {
        let res = match state {
            0 => MemEntryState::NotNeeded,
            1 => MemEntryState::Loaded,
            2 => MemEntryState::LoadMe,
            0xFF => MemEntryState::EndOfMemList,
            _ => bail!("Unknown entry state {}", state),
        };
        Ok(res)
    }

    pub fn code(self) -> u8 {
        match self {
            MemEntryState::NotNeeded => 0,
            MemEntryState::Loaded => 1,
            MemEntryState::LoadMe => 2,
            MemEntryState::EndOfMemList => 0xFF,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ResType {
    Sound,
    Music,
    PolyAnim, // full screen video buffer, size=0x7D00

    // 0x7D00 = 32000 = 320x200 / 2: 16 colors, two pixel palette indices per byte.
    Palette, // palette (1024=vga + 1024=ega), size=2048
    Bytecode,
    PolyCinematic,

    Unknown(u8),
}

impl ResType {
    pub fn new(code: u8) -> Self {
        match code {
            0 => ResType::Sound,
            1 => ResType::Music,
            2 => ResType::PolyAnim,
            3 => ResType::Palette,
            4 => ResType::Bytecode,
            5 => ResType::PolyCinematic,
            _ => ResType::Unknown(code),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            ResType::Sound => 0,
            ResType::Music => 1,
            ResType::PolyAnim => 2,
            ResType::Palette => 3,
            ResType::Bytecode => 4,
            ResType::PolyCinematic => 5,
            ResType::Unknown(code) => code,
        }
    }

    /// Whether entries of this type survive a soft invalidation.
    pub fn survives_soft_reload(self) -> bool {
        // Everything from the palette up to code 6 is kept.
        matches!(self.code(), 3..=6)
    }
}

impl fmt::Display for ResType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResType::Sound => f.pad("RT_SOUND"),
            ResType::Music => f.pad("RT_MUSIC"),
            ResType::PolyAnim => f.pad("RT_VIDBUF"),
            ResType::Palette => f.pad("RT_PAL"),
            ResType::Bytecode => f.pad("RT_SCRIPT"),
            ResType::PolyCinematic => f.pad("RT_VBMP"),
            ResType::Unknown(code) => f.pad(&format!("RT_{:02X}", code)),
        }
    }
}

pub const MEM_ENTRY_SIZE: usize = 20;

// This is a directory entry. When the game starts, it loads memlist.bin and
// populates an array of MemEntry.
#[derive(Clone, Debug, PartialEq)]
pub struct MemEntry {
    pub state: MemEntryState, // 0x0
    pub res_type: ResType,    // 0x1
    unk2: u16,                // 0x2, buffer pointer on disk, unused
    unk4: u16,                // 0x4, unused
    pub rank_num: u8,         // 0x6
    pub bank_id: u8,          // 0x7
    pub bank_offset: u32,     // 0x8 0xA
    unk_c: u16,               // 0xC, unused
    // All resources are packed (for a gain of 28% according to Chahi)
    pub packed_size: u16, // 0xE
    unk10: u16,           // 0x10, unused
    pub size: u16,        // 0x12
    /// Arena offset once loaded.
    pub buf_offset: Option<usize>,
}

impl MemEntry {
    pub fn new(
        res_type: ResType,
        rank_num: u8,
        bank_id: u8,
        bank_offset: u32,
        packed_size: u16,
        size: u16,
    ) -> Self {
        Self {
            state: MemEntryState::NotNeeded,
            res_type,
            unk2: 0,
            unk4: 0,
            rank_num,
            bank_id,
            bank_offset,
            unk_c: 0,
            packed_size,
            unk10: 0,
            size,
            buf_offset: None,
        }
    }

    pub fn is_packed(&self) -> bool {
        self.packed_size != self.size
    }

    fn read(f: &mut File) -> Result<Self> {
        Ok(Self {
            state: MemEntryState::new(f.read_u8()?)?,
            res_type: ResType::new(f.read_u8()?),
            unk2: f.read_u16()?,
            unk4: f.read_u16()?,
            rank_num: f.read_u8()?,
            bank_id: f.read_u8()?,
            bank_offset: f.read_u32()?,
            unk_c: f.read_u16()?,
            packed_size: f.read_u16()?,
            unk10: f.read_u16()?,
            size: f.read_u16()?,
            buf_offset: None,
        })
    }

    pub fn write(&self, f: &mut File) -> Result<()> {
        f.write_u8(self.state.code())?;
        f.write_u8(self.res_type.code())?;
        f.write_u16(self.unk2)?;
        f.write_u16(self.unk4)?;
        f.write_u8(self.rank_num)?;
        f.write_u8(self.bank_id)?;
        f.write_u32(self.bank_offset)?;
        f.write_u16(self.unk_c)?;
        f.write_u16(self.packed_size)?;
        f.write_u16(self.unk10)?;
        f.write_u16(self.size)
    }
}

const STATS_TOTAL: usize = 6;

/// Packed sizes and unit counts per resource type, plus totals.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct ResourceStats {
    pub size: [u32; 7],
    pub units: [u32; 7],
}

impl ResourceStats {
    fn add(&mut self, me: &MemEntry) {
        let code = me.res_type.code() as usize;
        if code < STATS_TOTAL {
            self.size[code] += me.packed_size as u32;
            self.units[code] += 1;
        }
        self.size[STATS_TOTAL] += me.packed_size as u32;
        self.units[STATS_TOTAL] += 1;
    }

    pub fn total_size(&self) -> u32 {
        self.size[STATS_TOTAL]
    }

    pub fn total_units(&self) -> u32 {
        self.units[STATS_TOTAL]
    }

    fn log(&self) {
        log::info!(target: "awvm::res", "Total bank size: {:7}", self.total_size());
        for code in 0..STATS_TOTAL {
            let percent = if self.total_size() == 0 {
                0.0
            } else {
                100.0 * self.size[code] as f32 / self.total_size() as f32
            };
            log::info!(
                target: "awvm::res",
                "Total {:<9} size: {:7} ({:2.0}%)",
                ResType::new(code as u8),
                self.size[code],
                percent
            );
        }
        log::info!(target: "awvm::res", "Total bank files: {}", self.total_units());
        for code in 0..STATS_TOTAL {
            log::info!(
                target: "awvm::res",
                "Total {:<9} files: {:3}",
                ResType::new(code as u8),
                self.units[code]
            );
        }
    }
}

/// Reads directory records until the end-of-list sentinel.
pub(crate) fn read_mem_list(f: &mut File) -> Result<(Vec<MemEntry>, ResourceStats)> {
    let mut entries = Vec::new();
    let mut stats = ResourceStats::default();

    loop {
        let entry = MemEntry::read(f)?;
        if entry.state == MemEntryState::EndOfMemList {
            break;
        }

        log::debug!(
            target: "awvm::res",
            "R:{:3}, {:<9} size={:5} (compacted={})",
            entries.len(),
            entry.res_type,
            entry.size,
            !entry.is_packed()
        );
        stats.add(&entry);
        entries.push(entry);
    }

    stats.log();

    Ok((entries, stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn end_of_list(f: &mut File) -> Result<()> {
        f.write_u8(0xFF)?;
        f.write(&[0; MEM_ENTRY_SIZE - 1])
    }

    #[test]
    fn test_read_mem_list() -> Result<()> {
        let mut f = File::in_memory();
        MemEntry::new(ResType::Palette, 0, 1, 0x100, 0x800, 0x800).write(&mut f)?;
        MemEntry::new(ResType::Bytecode, 3, 2, 0x1234_5678, 0x40, 0x80).write(&mut f)?;
        end_of_list(&mut f)?;
        assert_eq!(f.bytes().map(|b| b.len()), Some(3 * MEM_ENTRY_SIZE));

        f.seek(0)?;
        let (entries, stats) = read_mem_list(&mut f)?;

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].res_type, ResType::Bytecode);
        assert_eq!(entries[1].rank_num, 3);
        assert_eq!(entries[1].bank_id, 2);
        assert_eq!(entries[1].bank_offset, 0x1234_5678);
        assert!(entries[1].is_packed());
        assert!(!entries[0].is_packed());
        assert_eq!(stats.total_units(), 2);
        assert_eq!(stats.total_size(), 0x840);
        assert_eq!(stats.size[ResType::Palette.code() as usize], 0x800);

        Ok(())
    }

    #[test]
    fn test_unterminated_list_fails() -> Result<()> {
        let mut f = File::in_memory();
        MemEntry::new(ResType::Sound, 0, 1, 0, 4, 4).write(&mut f)?;
        f.seek(0)?;
        assert!(read_mem_list(&mut f).is_err());
        Ok(())
    }

    #[test]
    fn test_soft_reload_types() {
        assert!(!ResType::Sound.survives_soft_reload());
        assert!(!ResType::Music.survives_soft_reload());
        assert!(!ResType::PolyAnim.survives_soft_reload());
        assert!(ResType::Palette.survives_soft_reload());
        assert!(ResType::Bytecode.survives_soft_reload());
        assert!(ResType::PolyCinematic.survives_soft_reload());
        assert!(!ResType::Unknown(7).survives_soft_reload());
    }
}
