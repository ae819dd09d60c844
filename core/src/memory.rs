use anyhow::{ensure, Result};

pub const MEM_BLOCK_SIZE: usize = 600 * 1024; // 600kb total memory consumed by resources
/// 0x800 * 16 = 32KB at the top of the block are kept for the video region.
pub const VID_REGION_SIZE: usize = 0x800 * 16;

/// The single pre-allocated block resources are loaded into.
///
/// The script region grows upward from the base; the video region sits at
/// `MEM_BLOCK_SIZE - VID_REGION_SIZE` and is used for full screen bitmaps.
/// Every cursor is an offset from the base.
pub struct MemoryArena {
    buf: Vec<u8>,
    pub script_bak: usize,
    pub script_cur: usize,
    pub vid_bak: usize,
    pub vid_cur: usize,
}

impl Default for MemoryArena {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryArena {
    pub fn new() -> Self {
        let mut arena = Self {
            buf: vec![0; MEM_BLOCK_SIZE],
            script_bak: 0,
            script_cur: 0,
            vid_bak: 0,
            vid_cur: 0,
        };
        arena.reset();
        arena
    }

    pub fn reset(&mut self) {
        self.script_bak = 0;
        self.script_cur = 0;
        self.vid_bak = MEM_BLOCK_SIZE - VID_REGION_SIZE;
        self.vid_cur = self.vid_bak;
    }

    /// Bytes left between the script cursor and the video region.
    pub fn script_free(&self) -> usize {
        self.vid_bak.saturating_sub(self.script_cur)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    pub fn slice(&self, offset: usize, size: usize) -> Result<&[u8]> {
        ensure!(
            offset + size <= self.buf.len(),
            "MemoryArena::slice() 0x{:X}+0x{:X} is out of the block",
            offset,
            size
        );
        Ok(&self.buf[offset..offset + size])
    }

    pub fn copy_in(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        ensure!(
            offset + src.len() <= self.buf.len(),
            "MemoryArena::copy_in() 0x{:X}+0x{:X} is out of the block",
            offset,
            src.len()
        );
        self.buf[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        ensure!(
            offset < self.buf.len(),
            "MemoryArena::read_u8() 0x{:X} is out of the block",
            offset
        );
        Ok(self.buf[offset])
    }

    pub fn read_be_u16(&self, offset: usize) -> Result<u16> {
        let b = self.slice(offset, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }
}
