use lazy_static::lazy_static;
use std::collections::HashMap;

pub const VM_VARIABLE_RANDOM_SEED: usize = 0x3C;
pub const VM_VARIABLE_LAST_KEYCHAR: usize = 0xDA;
pub const VM_VARIABLE_HERO_POS_UP_DOWN: usize = 0xE5;
pub const VM_VARIABLE_MUS_MARK: usize = 0xF4;
pub const VM_VARIABLE_SCROLL_Y: usize = 0xF9; // = 239
pub const VM_VARIABLE_HERO_ACTION: usize = 0xFA;
pub const VM_VARIABLE_HERO_POS_JUMP_DOWN: usize = 0xFB;
pub const VM_VARIABLE_HERO_POS_LEFT_RIGHT: usize = 0xFC;
pub const VM_VARIABLE_HERO_POS_MASK: usize = 0xFD;
pub const VM_VARIABLE_HERO_ACTION_POS_MASK: usize = 0xFE;
pub const VM_VARIABLE_PAUSE_SLICES: usize = 0xFF;

// Sample playback rates selected by the play sound opcode.
pub const FREQUENCE_TABLE: [u16; 40] = [
    0x0CFF, 0x0DC3, 0x0E91, 0x0F6F, 0x1056, 0x114E, 0x1259, 0x136C, 0x149F, 0x15D9, 0x1726, 0x1888,
    0x19FD, 0x1B86, 0x1D21, 0x1EDE, 0x20AB, 0x229C, 0x24B3, 0x26D7, 0x293F, 0x2BB2, 0x2E4C, 0x3110,
    0x33FB, 0x370D, 0x3A43, 0x3DDF, 0x4157, 0x4538, 0x4998, 0x4DAE, 0x5240, 0x5764, 0x5C9A, 0x61C8,
    0x6793, 0x6E19, 0x7485, 0x7BBD,
];

lazy_static! {
    /// Names of the reserved variables, used by listings and logs.
    pub static ref VARIABLE_NAME_BY_INDEX: HashMap<u8, &'static str> = {
        let mut m = HashMap::new();
        m.insert(VM_VARIABLE_RANDOM_SEED as u8, "RANDOM_SEED");
        m.insert(VM_VARIABLE_LAST_KEYCHAR as u8, "LAST_KEYCHAR");
        m.insert(VM_VARIABLE_HERO_POS_UP_DOWN as u8, "HERO_POS_UP_DOWN");
        m.insert(VM_VARIABLE_MUS_MARK as u8, "MUS_MARK");
        m.insert(VM_VARIABLE_SCROLL_Y as u8, "SCROLL_Y");
        m.insert(VM_VARIABLE_HERO_ACTION as u8, "HERO_ACTION");
        m.insert(VM_VARIABLE_HERO_POS_JUMP_DOWN as u8, "HERO_POS_JUMP_DOWN");
        m.insert(VM_VARIABLE_HERO_POS_LEFT_RIGHT as u8, "HERO_POS_LEFT_RIGHT");
        m.insert(VM_VARIABLE_HERO_POS_MASK as u8, "HERO_POS_MASK");
        m.insert(VM_VARIABLE_HERO_ACTION_POS_MASK as u8, "HERO_ACTION_POS_MASK");
        m.insert(VM_VARIABLE_PAUSE_SLICES as u8, "PAUSE_SLICES");
        m
    };
}

pub fn var_name(id: u8) -> String {
    if let Some(name) = VARIABLE_NAME_BY_INDEX.get(&id) {
        name.to_string()
    } else {
        format!("0x{:02X}", id)
    }
}
