use anyhow::{bail, Result};
use awvm_core::{
    audio::MusicPlayer,
    memlist::{MemEntryState, ResType},
    resource::ResourceRef,
    serializer::{Entry, Mode, Serializer},
};

const NUM_INSTRUMENTS: usize = 15;
const ORDER_TABLE_SIZE: usize = 0x80;

#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct Instrument {
    /// Arena offset of the sound entry.
    pub data: Option<usize>,
    pub volume: u16,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Module {
    /// Arena offset of the first pattern.
    pub data: usize,
    pub cur_pos: u16,
    pub cur_order: u8,
    pub num_order: u8,
    pub order_table: [u8; ORDER_TABLE_SIZE],
    pub samples: [Instrument; NUM_INSTRUMENTS],
}

impl Default for Module {
    fn default() -> Self {
        Self {
            data: 0,
            cur_pos: 0,
            cur_order: 0,
            num_order: 0,
            order_table: [0; ORDER_TABLE_SIZE],
            samples: [Instrument::default(); NUM_INSTRUMENTS],
        }
    }
}

// Delays in the data are in 1/7050th of a second ticks.
fn event_delay_ms(delay: u16) -> u16 {
    (delay as u32 * 60 / 7050) as u16
}

/// Tracks the loaded module, order and tempo without playing patterns.
pub struct HeadlessMusic {
    res: ResourceRef,
    delay: u16,
    res_num: u16,
    module: Module,
    playing: bool,
}

impl HeadlessMusic {
    pub fn new(res: ResourceRef) -> Self {
        Self {
            res,
            delay: 0,
            res_num: 0,
            module: Module::default(),
            playing: false,
        }
    }

    pub fn res_num(&self) -> u16 {
        self.res_num
    }

    pub fn delay(&self) -> u16 {
        self.delay
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    fn prepare_instruments(&mut self, mut offset: usize) -> Result<()> {
        let res = self.res.get();
        let arena = res.arena();

        for ins in self.module.samples.iter_mut() {
            *ins = Instrument::default();
            let res_num = arena.read_be_u16(offset)?;
            if res_num != 0 {
                ins.volume = arena.read_be_u16(offset + 2)?;
                match res.entry(res_num) {
                    Some(me) if me.state == MemEntryState::Loaded && me.res_type == ResType::Sound => {
                        ins.data = me.buf_offset;
                        log::debug!(
                            target: "awvm::snd",
                            "Loaded instrument 0x{:X} volume={}",
                            res_num,
                            ins.volume
                        );
                    }
                    _ => bail!("Music::prepare_instruments() error loading instrument 0x{:X}", res_num),
                }
            }
            offset += 4;
        }

        Ok(())
    }
}

impl MusicPlayer for HeadlessMusic {
    fn load(&mut self, res_id: u16, delay: u16, pos: u8) -> Result<()> {
        log::debug!(target: "awvm::snd", "Music::load(0x{:X}, {}, {})", res_id, delay, pos);

        let offset = {
            let res = self.res.get();
            match res.entry(res_id) {
                Some(me) if me.state == MemEntryState::Loaded && me.res_type == ResType::Music => me.buf_offset,
                _ => None,
            }
        };
        let offset = match offset {
            Some(offset) => offset,
            None => {
                log::warn!(target: "awvm::snd", "Music::load() ec=0x{:X}", 0xF8);
                return Ok(());
            }
        };

        self.res_num = res_id;
        self.module = Module::default();
        self.module.cur_order = pos;
        {
            let res = self.res.get();
            let arena = res.arena();
            self.module.num_order = arena.read_be_u16(offset + 0x3E)? as u8;
            self.module
                .order_table
                .copy_from_slice(arena.slice(offset + 0x40, ORDER_TABLE_SIZE)?);
            let delay = if delay == 0 {
                arena.read_be_u16(offset)?
            } else {
                delay
            };
            self.delay = event_delay_ms(delay);
        }
        self.module.data = offset + 0xC0;
        log::debug!(
            target: "awvm::snd",
            "Music::load() cur_order=0x{:X} num_order=0x{:X} event_delay={}ms",
            self.module.cur_order,
            self.module.num_order,
            self.delay
        );

        self.prepare_instruments(offset + 2)
    }

    fn start(&mut self) {
        log::debug!(target: "awvm::snd", "Music::start()");
        self.module.cur_pos = 0;
        self.playing = self.res_num != 0;
    }

    fn stop(&mut self) {
        log::debug!(target: "awvm::snd", "Music::stop()");
        if self.res_num != 0 {
            self.res_num = 0;
            self.playing = false;
        }
    }

    fn set_event_delay(&mut self, delay: u16) {
        log::debug!(target: "awvm::snd", "Music::set_event_delay({})", delay);
        self.delay = event_delay_ms(delay);
    }

    // Marks come from pattern playback, which never runs here.
    fn take_mark(&mut self) -> Option<i16> {
        None
    }

    fn save_or_load(&mut self, ser: &mut Serializer) -> Result<()> {
        let mut delay = self.delay as u8;
        ser.save_or_load_entries(&mut [
            Entry::int(&mut delay, 2),
            Entry::int(&mut self.res_num, 2),
            Entry::int(&mut self.module.cur_pos, 2),
            Entry::int(&mut self.module.cur_order, 2),
        ])?;

        if ser.mode() == Mode::Load {
            self.delay = delay as u16;
            if self.res_num != 0 {
                let cur_pos = self.module.cur_pos;
                self.load(self.res_num, 0, self.module.cur_order)?;
                self.module.cur_pos = cur_pos;
                self.delay = delay as u16;
            }
            self.playing = self.res_num != 0;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Assets;
    use awvm_core::{file::File, serializer::CUR_VER};

    const MUSIC: u16 = 0x07;
    const INSTRUMENT: u16 = 0x03;

    fn module_data() -> Vec<u8> {
        let mut data = vec![0; 0xC0 + 0x10];
        // default delay 0x2C10 = 11280 ticks
        data[0] = 0x2C;
        data[1] = 0x10;
        // instrument 0 is sound 3 at volume 0x30
        data[2..6].copy_from_slice(&[0x00, INSTRUMENT as u8, 0x00, 0x30]);
        data[0x3F] = 3;
        data[0x40..0x43].copy_from_slice(&[1, 0, 2]);
        data
    }

    fn music(module: Vec<u8>) -> Result<HeadlessMusic> {
        let res = Assets::new()
            .set(INSTRUMENT as usize, ResType::Sound, vec![0; 16])
            .set(MUSIC as usize, ResType::Music, module)
            .resources()?;
        res.get_mut().request_load(INSTRUMENT)?;
        res.get_mut().request_load(MUSIC)?;
        Ok(HeadlessMusic::new(res))
    }

    #[test]
    fn test_load_module() -> Result<()> {
        let mut player = music(module_data())?;
        player.load(MUSIC, 0, 2)?;

        let music_offset = player.res.get().entry(MUSIC).and_then(|me| me.buf_offset);
        let ins_offset = player.res.get().entry(INSTRUMENT).and_then(|me| me.buf_offset);
        assert_eq!(player.res_num(), MUSIC);
        assert_eq!(player.delay(), 96);
        assert_eq!(player.module().cur_order, 2);
        assert_eq!(player.module().num_order, 3);
        assert_eq!(player.module().order_table[..3], [1, 0, 2]);
        assert_eq!(Some(player.module().data), music_offset.map(|off| off + 0xC0));
        assert_eq!(player.module().samples[0].data, ins_offset);
        assert_eq!(player.module().samples[0].volume, 0x30);
        assert_eq!(player.module().samples[1], Instrument::default());

        player.load(MUSIC, 7050, 0)?;
        assert_eq!(player.delay(), 60);

        player.start();
        assert!(player.is_playing());
        player.set_event_delay(705);
        assert_eq!(player.delay(), 6);
        player.stop();
        assert!(!player.is_playing());
        assert_eq!(player.res_num(), 0);
        Ok(())
    }

    #[test]
    fn test_load_unloaded_module_is_soft() -> Result<()> {
        let mut player = music(module_data())?;
        player.load(0x02, 0, 0)?;
        assert_eq!(player.res_num(), 0);
        player.load(INSTRUMENT, 0, 0)?;
        assert_eq!(player.res_num(), 0);

        player.start();
        assert!(!player.is_playing());
        Ok(())
    }

    #[test]
    fn test_missing_instrument_is_fatal() -> Result<()> {
        let mut data = module_data();
        data[6..8].copy_from_slice(&[0x00, 0x05]);
        let mut player = music(data)?;
        assert!(player.load(MUSIC, 0, 0).is_err());
        Ok(())
    }

    #[test]
    fn test_save_then_load() -> Result<()> {
        let mut player = music(module_data())?;
        player.load(MUSIC, 0, 1)?;
        player.start();
        player.set_event_delay(1175);

        let mut ser = Serializer::new(File::in_memory(), Mode::Save, CUR_VER);
        player.save_or_load(&mut ser)?;
        assert_eq!(ser.bytes_count(), 1 + 2 + 2 + 1);
        let data = ser.into_stream().bytes().unwrap_or_default().to_vec();

        let mut restored = music(module_data())?;
        let mut ser = Serializer::new(File::from_bytes(data), Mode::Load, CUR_VER);
        restored.save_or_load(&mut ser)?;
        assert_eq!(restored.res_num(), MUSIC);
        assert_eq!(restored.delay(), 10);
        assert_eq!(restored.module().cur_order, 1);
        assert_eq!(restored.module().num_order, 3);
        assert!(restored.is_playing());
        Ok(())
    }

    #[test]
    fn test_load_silent_state_stops_playback() -> Result<()> {
        let mut silent = music(module_data())?;
        silent.set_event_delay(705);
        let mut ser = Serializer::new(File::in_memory(), Mode::Save, CUR_VER);
        silent.save_or_load(&mut ser)?;
        let data = ser.into_stream().bytes().unwrap_or_default().to_vec();

        let mut player = music(module_data())?;
        player.load(MUSIC, 0, 0)?;
        player.start();
        assert!(player.is_playing());

        let mut ser = Serializer::new(File::from_bytes(data), Mode::Load, CUR_VER);
        player.save_or_load(&mut ser)?;
        assert_eq!(player.res_num(), 0);
        assert_eq!(player.delay(), 6);
        assert!(!player.is_playing());
        Ok(())
    }
}
