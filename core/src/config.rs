use crate::parts::GAME_PART_FIRST;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Directory holding `memlist.bin` and the banks.
    pub data_dir: PathBuf,
    /// Directory of the `raw.sNN` save slots.
    pub save_dir: PathBuf,
    pub start_part: u16,
    /// Skip the per-frame delay.
    pub fast_mode: bool,
    /// Save slot restored right after init.
    pub slot: Option<u8>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            save_dir: PathBuf::from("."),
            // This game part is the protection screen
            start_part: GAME_PART_FIRST,
            fast_mode: false,
            slot: None,
        }
    }
}
