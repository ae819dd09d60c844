// The game is divided in 10 parts.
pub const GAME_NUM_PARTS: usize = 10;

pub const GAME_PART_FIRST: u16 = 0x3E80;
pub const GAME_PART1: u16 = 0x3E80; // protection screens
pub const GAME_PART2: u16 = 0x3E81; // introduction
pub const GAME_PART3: u16 = 0x3E82;
pub const GAME_PART4: u16 = 0x3E83; // wake up in the suspended jail
pub const GAME_PART5: u16 = 0x3E84;
pub const GAME_PART6: u16 = 0x3E85; // battlechar sequence
pub const GAME_PART7: u16 = 0x3E86;
pub const GAME_PART8: u16 = 0x3E87;
pub const GAME_PART9: u16 = 0x3E88;
pub const GAME_PART10: u16 = 0x3E89; // password screen
pub const GAME_PART_LAST: u16 = 0x3E89;

// For each part of the game, four resources are referenced: palette,
// bytecode, cinematic polygons and the optional second polygon bank.
pub const MEMLIST_PART_NONE: u8 = 0x00;

/*
    The last two columns store polygons.

    - The cinematic bank contains the cinematic polygons.
    - The second bank contains the polygons for player and enemies animations.

    Protection screen and cinematic game parts do not load the second bank.
*/
pub const MEM_LIST_PARTS: [[u8; 4]; GAME_NUM_PARTS] = [
    // palette, code, video1, video2
    [0x14, 0x15, 0x16, 0x00], // protection screens
    [0x17, 0x18, 0x19, 0x00], // introduction cinematic
    [0x1A, 0x1B, 0x1C, 0x11],
    [0x1D, 0x1E, 0x1F, 0x11],
    [0x20, 0x21, 0x22, 0x11],
    [0x23, 0x24, 0x25, 0x00], // battlechar cinematic
    [0x26, 0x27, 0x28, 0x11],
    [0x29, 0x2A, 0x2B, 0x11],
    [0x7D, 0x7E, 0x7F, 0x00],
    [0x7D, 0x7E, 0x7F, 0x00], // password screen
];

pub fn is_valid_part(part_id: u16) -> bool {
    (GAME_PART_FIRST..=GAME_PART_LAST).contains(&part_id)
}

/// Resource ids referenced by a part, `None` for an invalid part id.
pub fn part_resources(part_id: u16) -> Option<&'static [u8; 4]> {
    if is_valid_part(part_id) {
        Some(&MEM_LIST_PARTS[(part_id - GAME_PART_FIRST) as usize])
    } else {
        None
    }
}
