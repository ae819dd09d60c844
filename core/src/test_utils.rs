//! Reference bank encoder, in-memory game data and recording collaborators.

use crate::audio::{Mixer, MixerChunk, MixerRef, MusicPlayer, MusicPlayerRef};
use crate::file::File;
use crate::memlist::{MemEntry, MemEntryState, ResType};
use crate::reference::Ref;
use crate::resource::{ResourceManager, ResourceRef};
use crate::serializer::{Entry, Mode, Serializer};
use crate::storage::{bank_name, MemStorage};
use crate::system::{PlayerInput, System, SystemRef};
use crate::video::{Point, Segment, Video, VideoRef};
use crate::vm::VirtualMachine;
use anyhow::Result;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

const MAX_OFFSET: usize = (1 << 12) - 1;
const MAX_COPY: usize = 256;
const MAX_LITERALS: usize = 264;

/// Bit-stream in the order the decoder consumes it.
#[derive(Default)]
pub(crate) struct BitWriter {
    bits: Vec<bool>,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the `n` low bits of `value`, most significant first.
    pub fn push(&mut self, value: u32, n: u32) {
        for i in (0..n).rev() {
            self.bits.push((value >> i) & 1 != 0);
        }
    }

    /// Lays the stream out as a bank blob: later words first, then the first
    /// word (with its end marker), the CRC and the unpacked size.
    pub fn finish(&self, unpacked_size: usize) -> Vec<u8> {
        let k = self.bits.len().min(31);
        let fold = |bits: &[bool]| {
            bits.iter()
                .enumerate()
                .fold(0u32, |w, (i, &b)| if b { w | 1 << i } else { w })
        };

        let first = fold(&self.bits[..k]) | 1 << k;
        let words: Vec<u32> = self.bits[k..].chunks(32).map(fold).collect();
        let crc = words.iter().fold(first, |crc, w| crc ^ w);

        let mut out = Vec::new();
        for w in words.iter().rev() {
            out.extend_from_slice(&w.to_be_bytes());
        }
        out.extend_from_slice(&first.to_be_bytes());
        out.extend_from_slice(&crc.to_be_bytes());
        out.extend_from_slice(&(unpacked_size as u32).to_be_bytes());
        out
    }
}

/// Greedy encoder producing streams the bank decoder accepts.
pub(crate) fn pack(data: &[u8]) -> Vec<u8> {
    let mut bits = BitWriter::new();
    let mut literals = Vec::new();
    let mut remaining = data.len();

    while remaining > 0 {
        let pos = remaining - 1;
        let (len, offset) = longest_match(data, pos);
        if len >= 2 {
            flush_literals(&mut bits, &mut literals);
            push_copy(&mut bits, len, offset);
            remaining -= len;
        } else {
            literals.push(data[pos]);
            remaining -= 1;
            if literals.len() == MAX_LITERALS {
                flush_literals(&mut bits, &mut literals);
            }
        }
    }
    flush_literals(&mut bits, &mut literals);

    bits.finish(data.len())
}

// Output is written downwards, so position `pos` copies from `pos + offset`.
fn longest_match(data: &[u8], pos: usize) -> (usize, usize) {
    let mut best = (0, 0);
    for offset in 1..=MAX_OFFSET {
        if pos + offset >= data.len() {
            break;
        }
        let mut len = 0;
        while len < MAX_COPY && len <= pos && data[pos - len] == data[pos - len + offset] {
            len += 1;
        }
        if len > best.0 {
            best = (len, offset);
            if len == MAX_COPY {
                break;
            }
        }
    }
    best
}

fn push_copy(bits: &mut BitWriter, len: usize, offset: usize) {
    match len {
        2 if offset < 1 << 8 => {
            bits.push(0b01, 2);
            bits.push(offset as u32, 8);
        }
        3 if offset < 1 << 9 => {
            bits.push(0b100, 3);
            bits.push(offset as u32, 9);
        }
        4 if offset < 1 << 10 => {
            bits.push(0b101, 3);
            bits.push(offset as u32, 10);
        }
        _ => {
            bits.push(0b110, 3);
            bits.push(len as u32 - 1, 8);
            bits.push(offset as u32, 12);
        }
    }
}

fn flush_literals(bits: &mut BitWriter, literals: &mut Vec<u8>) {
    let n = literals.len() as u32;
    if n == 0 {
        return;
    }
    if n <= 8 {
        bits.push(0b00, 2);
        bits.push(n - 1, 3);
    } else {
        bits.push(0b111, 3);
        bits.push(n - 9, 8);
    }
    for b in literals.drain(..) {
        bits.push(b as u32, 8);
    }
}

#[derive(Clone)]
enum Asset {
    Data {
        res_type: ResType,
        rank: u8,
        data: Vec<u8>,
        corrupt: bool,
    },
    Raw(MemEntry),
}

/// Builds a `memlist.bin` plus a single bank holding every resource.
#[derive(Clone, Default)]
pub(crate) struct AssetBuilder {
    assets: Vec<Asset>,
}

impl AssetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn filler() -> Asset {
        Asset::Data {
            res_type: ResType::Sound,
            rank: 0,
            data: vec![0; 2],
            corrupt: false,
        }
    }

    /// Sets the resource at `id`, padding the directory with small sounds.
    pub fn entry(&mut self, id: u16, res_type: ResType, rank: u8, data: &[u8]) {
        let id = id as usize;
        while self.assets.len() <= id {
            self.assets.push(Self::filler());
        }
        self.assets[id] = Asset::Data {
            res_type,
            rank,
            data: data.to_vec(),
            corrupt: false,
        };
    }

    pub fn add(&mut self, res_type: ResType, rank: u8, data: &[u8]) -> u16 {
        let id = self.assets.len() as u16;
        self.entry(id, res_type, rank, data);
        id
    }

    pub fn add_entry(&mut self, me: MemEntry) -> u16 {
        self.assets.push(Asset::Raw(me));
        self.assets.len() as u16 - 1
    }

    pub fn corrupt_crc(&mut self, id: u16) {
        if let Some(Asset::Data { corrupt, .. }) = self.assets.get_mut(id as usize) {
            *corrupt = true;
        }
    }

    pub fn build(&self) -> MemStorage {
        let mut bank = Vec::new();
        let mut memlist = File::in_memory();

        for asset in &self.assets {
            let me = match asset {
                Asset::Raw(me) => me.clone(),
                Asset::Data {
                    res_type,
                    rank,
                    data,
                    corrupt,
                } => {
                    let mut blob = pack(data);
                    if *corrupt {
                        let crc_pos = blob.len() - 8;
                        blob[crc_pos] ^= 0x01;
                    } else if blob.len() >= data.len() {
                        blob = data.clone();
                    }
                    let me = MemEntry::new(
                        *res_type,
                        *rank,
                        1,
                        bank.len() as u32,
                        blob.len() as u16,
                        data.len() as u16,
                    );
                    bank.extend(blob);
                    me
                }
            };
            me.write(&mut memlist).unwrap();
        }

        let mut end = MemEntry::new(ResType::Sound, 0, 0, 0, 0, 0);
        end.state = MemEntryState::EndOfMemList;
        end.write(&mut memlist).unwrap();

        let mut storage = MemStorage::new();
        storage.insert("memlist.bin", memlist.bytes().unwrap().to_vec());
        storage.insert(&bank_name(1), bank);
        storage
    }
}

type CallLog = Rc<RefCell<Vec<String>>>;

struct TestSystem {
    input: PlayerInput,
    time: Cell<u32>,
    events: Rc<RefCell<VecDeque<PlayerInput>>>,
    log: CallLog,
}

impl System for TestSystem {
    fn input(&self) -> &PlayerInput {
        &self.input
    }

    fn input_mut(&mut self) -> &mut PlayerInput {
        &mut self.input
    }

    fn process_events(&mut self) {
        if let Some(input) = self.events.borrow_mut().pop_front() {
            self.input = input;
        }
    }

    fn sleep(&self, duration: u32) {
        self.log.borrow_mut().push(format!("sys.sleep({})", duration));
        self.time.set(self.time.get() + duration);
    }

    fn get_timestamp(&self) -> u32 {
        self.time.get()
    }
}

struct RecordingVideo {
    palette: u8,
    log: CallLog,
}

impl RecordingVideo {
    fn record(&self, call: String) {
        self.log.borrow_mut().push(call);
    }
}

impl Video for RecordingVideo {
    fn set_active_buffer(&mut self, segment: Segment, offset: usize) {
        self.record(format!("video.set_active_buffer({:?}, {})", segment, offset));
    }

    fn draw_polygon_at(&mut self, color: u8, zoom: u16, pt: Point) {
        self.record(format!("video.draw_polygon_at({}, {}, {}, {})", color, zoom, pt.x, pt.y));
    }

    fn select_page(&mut self, page: u8) {
        self.record(format!("video.select_page({})", page));
    }

    fn fill_page(&mut self, page: u8, color: u8) {
        self.record(format!("video.fill_page({}, {})", page, color));
    }

    fn copy_page(&mut self, src: u8, dst: u8, vscroll: i16) {
        self.record(format!("video.copy_page({}, {}, {})", src, dst, vscroll));
    }

    fn present(&mut self, page: u8) {
        self.record(format!("video.present({})", page));
    }

    fn request_palette(&mut self, palette_id: u8) {
        self.palette = palette_id;
        self.record(format!("video.request_palette({})", palette_id));
    }

    fn draw_string(&mut self, color: u8, x: u16, y: u16, string_id: u16) {
        self.record(format!("video.draw_string({}, {}, {}, {})", color, x, y, string_id));
    }

    fn copy_bitmap(&mut self, data: &[u8]) {
        self.record(format!("video.copy_bitmap({})", data.len()));
    }

    fn save_or_load(&mut self, ser: &mut Serializer) -> Result<()> {
        ser.save_or_load_entries(&mut [Entry::int(&mut self.palette, 1)])?;
        if ser.mode() == Mode::Load {
            self.record(format!("video.load(palette={})", self.palette));
        }
        Ok(())
    }
}

struct RecordingMixer {
    log: CallLog,
}

impl Mixer for RecordingMixer {
    fn play_sample(&mut self, channel: u8, chunk: MixerChunk, freq: u16, volume: u8) {
        self.log.borrow_mut().push(format!(
            "mixer.play_sample({}, {:?}, {}, {})",
            channel, chunk.data, freq, volume
        ));
    }

    fn stop_channel(&mut self, channel: u8) {
        self.log.borrow_mut().push(format!("mixer.stop_channel({})", channel));
    }

    fn set_channel_volume(&mut self, channel: u8, volume: u8) {
        self.log
            .borrow_mut()
            .push(format!("mixer.set_channel_volume({}, {})", channel, volume));
    }

    fn stop_all(&mut self) {
        self.log.borrow_mut().push("mixer.stop_all".to_string());
    }

    fn save_or_load(&mut self, _ser: &mut Serializer) -> Result<()> {
        Ok(())
    }
}

struct RecordingMusic {
    marks: Rc<RefCell<VecDeque<i16>>>,
    log: CallLog,
}

impl MusicPlayer for RecordingMusic {
    fn load(&mut self, res_id: u16, delay: u16, pos: u8) -> Result<()> {
        self.log
            .borrow_mut()
            .push(format!("music.load({}, {}, {})", res_id, delay, pos));
        Ok(())
    }

    fn start(&mut self) {
        self.log.borrow_mut().push("music.start".to_string());
    }

    fn stop(&mut self) {
        self.log.borrow_mut().push("music.stop".to_string());
    }

    fn set_event_delay(&mut self, delay: u16) {
        self.log
            .borrow_mut()
            .push(format!("music.set_event_delay({})", delay));
    }

    fn take_mark(&mut self) -> Option<i16> {
        self.marks.borrow_mut().pop_front()
    }

    fn save_or_load(&mut self, _ser: &mut Serializer) -> Result<()> {
        Ok(())
    }
}

/// Resource manager over built assets, wired to recording collaborators
/// that share one call log.
pub(crate) struct Harness {
    pub sys: SystemRef,
    pub res: ResourceRef,
    pub video: VideoRef,
    pub mixer: MixerRef,
    pub player: MusicPlayerRef,
    /// Inputs handed out by successive `process_events` calls.
    pub events: Rc<RefCell<VecDeque<PlayerInput>>>,
    /// Marks reported by the music player, oldest first.
    pub marks: Rc<RefCell<VecDeque<i16>>>,
    log: CallLog,
}

impl Harness {
    /// Directory not read yet.
    pub fn unread(assets: AssetBuilder) -> Self {
        let log = CallLog::default();
        let events = Rc::new(RefCell::new(VecDeque::new()));
        let marks = Rc::new(RefCell::new(VecDeque::new()));

        let sys: Box<dyn System> = Box::new(TestSystem {
            input: PlayerInput::default(),
            time: Cell::new(0),
            events: events.clone(),
            log: log.clone(),
        });
        let video: Box<dyn Video> = Box::new(RecordingVideo {
            palette: 0,
            log: log.clone(),
        });
        let mixer: Box<dyn Mixer> = Box::new(RecordingMixer { log: log.clone() });
        let player: Box<dyn MusicPlayer> = Box::new(RecordingMusic {
            marks: marks.clone(),
            log: log.clone(),
        });

        Self {
            sys: Ref::new(sys),
            res: Ref::new(ResourceManager::new(Box::new(assets.build()))),
            video: Ref::new(video),
            mixer: Ref::new(mixer),
            player: Ref::new(player),
            events,
            marks,
            log,
        }
    }

    pub fn new(assets: AssetBuilder) -> Result<Self> {
        let h = Self::unread(assets);
        h.res.get_mut().read_directory()?;
        Ok(h)
    }

    pub fn vm(&self) -> VirtualMachine {
        VirtualMachine::new(
            self.sys.clone(),
            self.res.clone(),
            self.video.clone(),
            self.mixer.clone(),
            self.player.clone(),
        )
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.log.borrow_mut().clear();
    }
}
