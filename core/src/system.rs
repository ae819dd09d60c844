use crate::reference::Ref;

pub const DIR_LEFT: u8 = 1 << 0;
pub const DIR_RIGHT: u8 = 1 << 1;
pub const DIR_UP: u8 = 1 << 2;
pub const DIR_DOWN: u8 = 1 << 3;

#[derive(Default, Clone, Debug, PartialEq)]
pub struct PlayerInput {
    pub dir_mask: u8,
    pub button: bool,
    pub code: bool,
    pub pause: bool,
    pub quit: bool,
    pub last_char: u8,
    pub save: bool,
    pub load: bool,
    pub fast_mode: bool,
    /// Relative save slot change: -1, 0 or 1.
    pub state_slot: i8,
}

pub type SystemRef = Ref<Box<dyn System>>;

/*
    System is an abstract trait so any kind of platform can be plugged underneath.
*/
pub trait System {
    fn input(&self) -> &PlayerInput;
    fn input_mut(&mut self) -> &mut PlayerInput;

    fn process_events(&mut self);
    fn sleep(&self, duration: u32);
    /// Milliseconds since an arbitrary origin.
    fn get_timestamp(&self) -> u32;
}
