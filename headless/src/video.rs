use anyhow::Result;
use awvm_core::{
    resource::ResourceRef,
    serializer::{Entry, Mode, Serializer},
    video::{Point, Segment, Video, SCREEN_H, SCREEN_W},
};

// One byte holds two palette indices.
pub const VID_PAGE_SIZE: usize = SCREEN_W as usize * SCREEN_H as usize / 2;
const LINE_SIZE: usize = SCREEN_W as usize / 2;
const PLANE_SIZE: usize = VID_PAGE_SIZE / 4;

pub const NUM_COLORS: usize = 16;
const NUM_PALETTES: u8 = 32;

// Special value when no palette change is necessary
const NO_PALETTE_CHANGE_REQUESTED: u8 = 0xFF;

/// Keeps the four 4bpp pages and the palette the way a renderer would, but
/// never rasterizes polygons or text.
pub struct HeadlessVideo {
    res: ResourceRef,

    palette_id_requested: u8,
    current_palette_id: u8,
    palette: [u8; NUM_COLORS * 3],

    // page1 is drawn into, page2 is displayed, page3 is the background
    cur_page1: usize,
    cur_page2: usize,
    cur_page3: usize,
    pages: Box<[[u8; VID_PAGE_SIZE]; 4]>,

    segment: Segment,
    segment_offset: usize,
    draw_calls: u64,
    frames: u64,
}

impl HeadlessVideo {
    pub fn new(res: ResourceRef) -> Self {
        let mut video = Self {
            res,
            palette_id_requested: NO_PALETTE_CHANGE_REQUESTED,
            current_palette_id: 0,
            palette: [0; NUM_COLORS * 3],
            cur_page1: 0,
            cur_page2: 2,
            cur_page3: 1,
            pages: Box::new([[0; VID_PAGE_SIZE]; 4]),
            segment: Segment::Cinematic,
            segment_offset: 0,
            draw_calls: 0,
            frames: 0,
        };
        video.cur_page1 = video.page_index(0xFE);
        video
    }

    pub fn page(&self, idx: usize) -> &[u8] {
        &self.pages[idx & 3]
    }

    pub fn work_page(&self) -> usize {
        self.cur_page1
    }

    pub fn displayed_page(&self) -> usize {
        self.cur_page2
    }

    pub fn background_page(&self) -> usize {
        self.cur_page3
    }

    /// 6 bits per component, red green blue for each of the 16 colors.
    pub fn palette(&self) -> &[u8] {
        &self.palette
    }

    pub fn current_palette_id(&self) -> u8 {
        self.current_palette_id
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    fn page_index(&self, page: u8) -> usize {
        match page {
            0..=3 => page as usize,
            0xFF => self.cur_page3,
            0xFE => self.cur_page2,
            _ => {
                log::warn!(target: "awvm::video", "Video::page_index() p != [0,1,2,3,0xFF,0xFE] == 0x{:X}", page);
                0
            }
        }
    }

    fn copy_region(&mut self, src: usize, src_off: usize, dst: usize, dst_off: usize, len: usize) {
        if src == dst {
            self.pages[src].copy_within(src_off..src_off + len, dst_off);
            return;
        }

        let (from, to) = if src < dst {
            let (lo, hi) = self.pages.split_at_mut(dst);
            (&lo[src], &mut hi[0])
        } else {
            let (lo, hi) = self.pages.split_at_mut(src);
            (&hi[0], &mut lo[dst])
        };
        to[dst_off..dst_off + len].copy_from_slice(&from[src_off..src_off + len]);
    }

    fn change_pal(&mut self, pal_id: u8) {
        if pal_id >= NUM_PALETTES {
            return;
        }

        let res = self.res.get();
        let seg = match res.seg_palette() {
            Some(seg) => seg,
            None => {
                log::warn!(target: "awvm::video", "Video::change_pal({}) no palette segment loaded", pal_id);
                return;
            }
        };
        // 16 colors coded on 2 bytes each
        let colors = match res.arena().slice(seg + pal_id as usize * NUM_COLORS * 2, NUM_COLORS * 2) {
            Ok(colors) => colors,
            Err(e) => {
                log::warn!(target: "awvm::video", "Video::change_pal({}) {}", pal_id, e);
                return;
            }
        };

        for (rgb, c) in self.palette.chunks_mut(3).zip(colors.chunks(2)) {
            rgb[0] = ((c[0] & 0x0F) << 2) | ((c[0] & 0x0F) >> 2);
            rgb[1] = ((c[1] & 0xF0) >> 2) | ((c[1] & 0xF0) >> 6);
            rgb[2] = ((c[1] & 0x0F) >> 2) | ((c[1] & 0x0F) << 2);
        }
        self.current_palette_id = pal_id;
        log::debug!(target: "awvm::video", "Video::change_pal({})", pal_id);
    }
}

impl Video for HeadlessVideo {
    fn set_active_buffer(&mut self, segment: Segment, offset: usize) {
        self.segment = segment;
        self.segment_offset = offset;
    }

    fn draw_polygon_at(&mut self, color: u8, zoom: u16, pt: Point) {
        log::trace!(
            target: "awvm::video",
            "Video::draw_polygon_at({:?}+0x{:X}, color={}, zoom={}, {}, {})",
            self.segment,
            self.segment_offset,
            color,
            zoom,
            pt.x,
            pt.y
        );
        self.draw_calls += 1;
    }

    fn select_page(&mut self, page: u8) {
        log::trace!(target: "awvm::video", "Video::select_page({})", page);
        self.cur_page1 = self.page_index(page);
    }

    fn fill_page(&mut self, page: u8, color: u8) {
        log::trace!(target: "awvm::video", "Video::fill_page({}, {})", page, color);
        let idx = self.page_index(page);

        // Since a palette indice is coded on 4 bits, we need to duplicate the
        // clearing color to the upper part of the byte.
        let c = ((color & 0x0F) << 4) | (color & 0x0F);
        self.pages[idx] = [c; VID_PAGE_SIZE];
    }

    // Used once the background of a scene has been drawn in one of the pages:
    // it is copied to the current page at the start of a new frame.
    fn copy_page(&mut self, src: u8, dst: u8, vscroll: i16) {
        log::trace!(target: "awvm::video", "Video::copy_page({}, {}, {})", src, dst, vscroll);
        if src == dst {
            return;
        }

        let q = self.page_index(dst);
        if src >= 0xFE || src & 0x80 == 0 {
            let p = if src >= 0xFE {
                self.page_index(src)
            } else {
                self.page_index(src & 0xBF)
            };
            self.copy_region(p, 0, q, 0, VID_PAGE_SIZE);
        } else {
            let p = self.page_index(src & 3);
            if (-199..=199).contains(&vscroll) {
                let shift = vscroll.unsigned_abs() as usize;
                let len = (SCREEN_H as usize - shift) * LINE_SIZE;
                if vscroll < 0 {
                    self.copy_region(p, shift * LINE_SIZE, q, 0, len);
                } else {
                    self.copy_region(p, 0, q, shift * LINE_SIZE, len);
                }
            }
        }
    }

    fn present(&mut self, page: u8) {
        log::trace!(target: "awvm::video", "Video::present({})", page);
        if page != 0xFE {
            if page == 0xFF {
                std::mem::swap(&mut self.cur_page2, &mut self.cur_page3);
            } else {
                self.cur_page2 = self.page_index(page);
            }
        }

        if self.palette_id_requested != NO_PALETTE_CHANGE_REQUESTED {
            self.change_pal(self.palette_id_requested);
            self.palette_id_requested = NO_PALETTE_CHANGE_REQUESTED;
        }

        self.frames += 1;
    }

    fn request_palette(&mut self, palette_id: u8) {
        self.palette_id_requested = palette_id;
    }

    fn draw_string(&mut self, color: u8, x: u16, y: u16, string_id: u16) {
        log::trace!(target: "awvm::video", "Video::draw_string(0x{:X}, {}, {}, color={})", string_id, x, y, color);
        self.draw_calls += 1;
    }

    // Four planes of 8000 bytes, plane 0 holding the low bit of each pixel.
    fn copy_bitmap(&mut self, data: &[u8]) {
        if data.len() < PLANE_SIZE * 4 {
            log::warn!(target: "awvm::video", "Video::copy_bitmap() short bitmap of {} bytes", data.len());
            return;
        }

        let page = &mut self.pages[0];
        let mut dst = 0;
        for src in 0..PLANE_SIZE {
            let mut p = [
                data[src + PLANE_SIZE * 3],
                data[src + PLANE_SIZE * 2],
                data[src + PLANE_SIZE],
                data[src],
            ];
            for _ in 0..4 {
                let mut acc = 0;
                for i in 0..8 {
                    acc <<= 1;
                    acc |= (p[i & 3] >> 7) & 1;
                    p[i & 3] <<= 1;
                }
                page[dst] = acc;
                dst += 1;
            }
        }
    }

    fn save_or_load(&mut self, ser: &mut Serializer) -> Result<()> {
        let mut mask = 0u8;
        if ser.mode() == Mode::Save {
            mask = ((self.cur_page1 << 4) | (self.cur_page2 << 2) | self.cur_page3) as u8;
        }

        {
            let [p0, p1, p2, p3] = &mut *self.pages;
            ser.save_or_load_entries(&mut [
                Entry::int(&mut self.current_palette_id, 1),
                Entry::int(&mut self.palette_id_requested, 1),
                Entry::int(&mut mask, 1),
                Entry::array(p0, 1),
                Entry::array(p1, 1),
                Entry::array(p2, 1),
                Entry::array(p3, 1),
            ])?;
        }

        if ser.mode() == Mode::Load {
            self.cur_page1 = ((mask >> 4) & 3) as usize;
            self.cur_page2 = ((mask >> 2) & 3) as usize;
            self.cur_page3 = (mask & 3) as usize;
            self.change_pal(self.current_palette_id);
        }

        Ok(())
    }
}
