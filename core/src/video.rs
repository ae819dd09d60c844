use crate::reference::Ref;
use crate::serializer::Serializer;
use anyhow::Result;

pub const SCREEN_W: i16 = 320;
pub const SCREEN_H: i16 = 200;

/// Polygon bank a draw call reads from.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Segment {
    Cinematic,
    Video2,
}

#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct Point {
    pub x: i16,
    pub y: i16,
}

impl Point {
    pub fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }
}

pub type VideoRef = Ref<Box<dyn Video>>;

/// Rendering collaborator driven by the VM.
///
/// Pages are addressed the way the bytecode does: 0..=3 directly, 0xFE for
/// the displayed page and 0xFF for the background page.
pub trait Video {
    /// Selects the polygon bank and offset the next draw reads from.
    fn set_active_buffer(&mut self, segment: Segment, offset: usize);
    fn draw_polygon_at(&mut self, color: u8, zoom: u16, pt: Point);

    fn select_page(&mut self, page: u8);
    fn fill_page(&mut self, page: u8, color: u8);
    fn copy_page(&mut self, src: u8, dst: u8, vscroll: i16);
    /// Shows a page, applying a pending palette change first.
    fn present(&mut self, page: u8);
    fn request_palette(&mut self, palette_id: u8);
    fn draw_string(&mut self, color: u8, x: u16, y: u16, string_id: u16);

    /// Full screen planar bitmap loaded by the resource manager.
    fn copy_bitmap(&mut self, data: &[u8]);

    fn save_or_load(&mut self, ser: &mut Serializer) -> Result<()>;
}
