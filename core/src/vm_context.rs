use crate::{
    audio::{MixerChunk, MixerRef, MusicPlayerRef},
    memlist::MemEntryState,
    parts::{GAME_PART1, GAME_PART10, GAME_PART2, GAME_PART_FIRST, GAME_PART_LAST},
    resource::ResourceRef,
    serializer::{Entry, Mode, Serializer},
    staticres::*,
    system::*,
    video::VideoRef,
};
use anyhow::{ensure, Result};
use std::fmt;

pub const VM_NUM_THREADS: usize = 64;
pub const VM_NUM_VARIABLES: usize = 256;

pub(crate) const VM_NO_SETVEC_REQUESTED: u16 = 0xFFFF;
pub(crate) const VM_INACTIVE_THREAD: u16 = 0xFFFF;
pub(crate) const VM_DELETE_THREAD: u16 = 0xFFFE;

/// Scheduler slot of one channel. Requested values are applied at the
/// next frame boundary.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ThreadData {
    pub pc_offset: u16,
    pub requested_pc_offset: u16,
    pub paused: bool,
    pub requested_paused: bool,
}

impl Default for ThreadData {
    fn default() -> Self {
        Self {
            pc_offset: VM_INACTIVE_THREAD,
            requested_pc_offset: VM_NO_SETVEC_REQUESTED,
            paused: false,
            requested_paused: false,
        }
    }
}

/// VM state shared by every opcode, plus the collaborators opcodes talk to.
pub(crate) struct VmContext {
    pub sys: SystemRef,
    pub res: ResourceRef,
    pub video: VideoRef,
    mixer: MixerRef,
    player: MusicPlayerRef,

    pub fast_mode: bool,
    last_time_stamp: u32,

    pub variables: [i16; VM_NUM_VARIABLES],
    pub threads_data: [ThreadData; VM_NUM_THREADS],
}

impl VmContext {
    pub fn new(
        sys: SystemRef,
        res: ResourceRef,
        video: VideoRef,
        mixer: MixerRef,
        player: MusicPlayerRef,
    ) -> Self {
        Self {
            sys,
            res,
            video,
            mixer,
            player,
            fast_mode: false,
            last_time_stamp: 0,
            variables: [0; VM_NUM_VARIABLES],
            threads_data: [ThreadData::default(); VM_NUM_THREADS],
        }
    }

    pub fn init(&mut self) {
        self.variables = [0; VM_NUM_VARIABLES];
        self.variables[0x54] = 0x81;
        self.variables[VM_VARIABLE_RANDOM_SEED] = random_seed();
    }

    pub fn init_for_part(&mut self, part_id: u16) -> Result<()> {
        self.player.get_mut().stop();
        self.mixer.get_mut().stop_all();

        self.variables[0xE4] = 0x14;

        self.res.get_mut().setup_part(part_id)?;
        self.forward_pending_bitmap();

        self.threads_data = [ThreadData::default(); VM_NUM_THREADS];
        self.threads_data[0].pc_offset = 0;

        Ok(())
    }

    pub fn toggle_fast_mode(&mut self) {
        self.fast_mode = !self.fast_mode;
        log::info!(target: "awvm::vm", "fast mode {}", if self.fast_mode { "on" } else { "off" });
    }

    pub fn inp_update_player(&mut self) {
        let mut sys = self.sys.get_mut();
        sys.process_events();

        if self.res.get().current_part() == GAME_PART10 {
            let c = sys.input().last_char;
            if c == 8 || c == 0 || c.is_ascii_lowercase() {
                self.variables[VM_VARIABLE_LAST_KEYCHAR] = (c & !0x20) as i16;
                sys.input_mut().last_char = 0;
            }
        }

        let input = sys.input();
        let mut lr = 0;
        let mut m = 0;
        let mut ud = 0;

        if input.dir_mask & DIR_RIGHT != 0 {
            lr = 1;
            m |= 1;
        }
        if input.dir_mask & DIR_LEFT != 0 {
            lr = -1;
            m |= 2;
        }
        if input.dir_mask & DIR_DOWN != 0 {
            ud = 1;
            m |= 4;
        }

        self.variables[VM_VARIABLE_HERO_POS_UP_DOWN] = ud;

        if input.dir_mask & DIR_UP != 0 {
            self.variables[VM_VARIABLE_HERO_POS_UP_DOWN] = -1;
            // jump
            ud = -1;
            m |= 8;
        }

        self.variables[VM_VARIABLE_HERO_POS_JUMP_DOWN] = ud;
        self.variables[VM_VARIABLE_HERO_POS_LEFT_RIGHT] = lr;
        self.variables[VM_VARIABLE_HERO_POS_MASK] = m;

        let mut button = 0;
        if input.button {
            button = 1;
            m |= 0x80;
        }
        self.variables[VM_VARIABLE_HERO_ACTION] = button;
        self.variables[VM_VARIABLE_HERO_ACTION_POS_MASK] = m;
    }

    pub fn inp_handle_special_keys(&mut self) {
        let mut sys = self.sys.get_mut();
        let mut res = self.res.get_mut();

        if sys.input().pause {
            if res.current_part() != GAME_PART1 && res.current_part() != GAME_PART2 {
                sys.input_mut().pause = false;

                while !sys.input().pause && !sys.input().quit {
                    sys.process_events();
                    sys.sleep(200);
                }
            }
            sys.input_mut().pause = false;
        }

        if sys.input().code {
            sys.input_mut().code = false;

            if res.current_part() != GAME_PART_LAST && res.current_part() != GAME_PART_FIRST {
                res.requested_next_part = Some(GAME_PART_LAST);
            }
        }

        if self.variables[0xC9] == 1 {
            log::warn!(target: "awvm::vm", "VirtualMachine::inp_handle_special_keys() unhandled case (variables[0xC9] == 1)");
        }
    }

    pub fn blit_framebuffer(&mut self, page_id: u8) {
        log::debug!(target: "awvm::vm", "VirtualMachine::op_blit_framebuffer({})", page_id);
        self.inp_handle_special_keys();

        if self.res.get().current_part() == GAME_PART_FIRST && self.variables[0x67] == 1 {
            self.variables[0xDC] = 0x21;
        }

        if !self.fast_mode {
            let sys = self.sys.get();
            let delay = sys.get_timestamp().wrapping_sub(self.last_time_stamp) as i32;
            // PAUSE_SLICES tells how many 20ms slices the frame stays on screen.
            let time_to_sleep = self.variables[VM_VARIABLE_PAUSE_SLICES] as i32 * 20 - delay;

            if time_to_sleep > 0 {
                sys.sleep(time_to_sleep as u32);
            }

            self.last_time_stamp = sys.get_timestamp();
        }

        self.variables[0xF7] = 0;

        self.video.get_mut().present(page_id);
    }

    pub fn play_sound(&mut self, res_id: u16, freq: u8, vol: u8, channel: u8) -> Result<()> {
        log::debug!(target: "awvm::snd", "snd_play_sound(0x{:X}, {}, {}, {})", res_id, freq, vol, channel);

        let chunk = {
            let res = self.res.get();
            let offset = match res.entry(res_id) {
                Some(me) if me.state == MemEntryState::Loaded => me.buf_offset,
                _ => None,
            };
            let Some(offset) = offset else {
                return Ok(());
            };
            if vol == 0 {
                None
            } else {
                Some(MixerChunk::from_sound(offset, res.arena().slice(offset, 8)?)?)
            }
        };

        match chunk {
            None => self.mixer.get_mut().stop_channel(channel),
            Some(chunk) => {
                ensure!(freq < 40, "VirtualMachine::play_sound() invalid frequency index {}", freq);
                self.mixer.get_mut().play_sample(
                    channel & 3,
                    chunk,
                    FREQUENCE_TABLE[freq as usize],
                    u8::min(vol, 0x3F),
                );
            }
        }

        Ok(())
    }

    pub fn play_music(&mut self, res_id: u16, delay: u16, pos: u8) -> Result<()> {
        log::debug!(target: "awvm::snd", "snd_play_music(0x{:X}, {}, {})", res_id, delay, pos);

        let mut player = self.player.get_mut();
        if res_id != 0 {
            player.load(res_id, delay, pos)?;
            player.start();
        } else if delay != 0 {
            player.set_event_delay(delay);
        } else {
            player.stop();
        }

        Ok(())
    }

    pub fn update_mem_list(&mut self, res_id: u16) -> Result<()> {
        if res_id == 0 {
            self.player.get_mut().stop();
            self.mixer.get_mut().stop_all();
            self.res.get_mut().invalidate_soft();
        } else {
            self.res.get_mut().request_load(res_id)?;
            self.forward_pending_bitmap();
        }

        Ok(())
    }

    /// Copies the music mark reached since the last frame into its variable.
    pub fn poll_music_mark(&mut self) {
        if let Some(mark) = self.player.get_mut().take_mark() {
            log::debug!(target: "awvm::snd", "music mark {}", mark);
            self.variables[VM_VARIABLE_MUS_MARK] = mark;
        }
    }

    fn forward_pending_bitmap(&mut self) {
        let bitmap = self.res.get_mut().take_pending_bitmap();
        if let Some(bitmap) = bitmap {
            self.video.get_mut().copy_bitmap(&bitmap);
        }
    }

    pub fn save_or_load(&mut self, ser: &mut Serializer, stack: &mut [u16; 256]) -> Result<()> {
        let mut pcs = [[0u16; VM_NUM_THREADS]; 2];
        let mut states = [[false; VM_NUM_THREADS]; 2];
        if ser.mode() == Mode::Save {
            for (i, thread) in self.threads_data.iter().enumerate() {
                pcs[0][i] = thread.pc_offset;
                pcs[1][i] = thread.requested_pc_offset;
                states[0][i] = thread.paused;
                states[1][i] = thread.requested_paused;
            }
        }

        ser.save_or_load_entries(&mut [
            Entry::array(&mut self.variables, 1),
            Entry::array(stack, 1),
            Entry::array(&mut pcs, 1),
            Entry::array(&mut states, 1),
        ])?;

        if ser.mode() == Mode::Load {
            for (i, thread) in self.threads_data.iter_mut().enumerate() {
                thread.pc_offset = pcs[0][i];
                thread.requested_pc_offset = pcs[1][i];
                thread.paused = states[0][i];
                thread.requested_paused = states[1][i];
            }
        }

        Ok(())
    }
}

fn random_seed() -> i16 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default() as i16
}

impl fmt::Debug for VmContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = self
            .threads_data
            .iter()
            .filter(|t| t.pc_offset != VM_INACTIVE_THREAD)
            .count();
        f.debug_struct("VmContext")
            .field("fast_mode", &self.fast_mode)
            .field("last_time_stamp", &self.last_time_stamp)
            .field("active_threads", &active)
            .finish()
    }
}
