use crate::audio::{MixerRef, MusicPlayerRef};
use crate::config::EngineConfig;
use crate::file::File;
use crate::parts::is_valid_part;
use crate::resource::ResourceRef;
use crate::serializer::{Mode, Serializer, CUR_VER};
use crate::system::SystemRef;
use crate::video::VideoRef;
use crate::vm::VirtualMachine;
use anyhow::{bail, ensure, Context, Result};

pub const MAX_SAVE_SLOTS: u8 = 100;
const FORMAT_SIG: u32 = 0x4157_5356; // 'AWSV'
const DESCRIPTION_LEN: usize = 32;

pub fn make_game_state_name(slot: u8) -> String {
    format!("raw.s{:02}", slot)
}

/// Owns the VM and drives it one frame at a time. Collaborators are shared
/// with the platform layer that created them.
pub struct Engine {
    config: EngineConfig,
    sys: SystemRef,
    res: ResourceRef,
    video: VideoRef,
    mixer: MixerRef,
    player: MusicPlayerRef,
    vm: VirtualMachine,
    state_slot: u8,
    frames: u64,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        sys: SystemRef,
        res: ResourceRef,
        video: VideoRef,
        mixer: MixerRef,
        player: MusicPlayerRef,
    ) -> Self {
        let vm = VirtualMachine::new(
            sys.clone(),
            res.clone(),
            video.clone(),
            mixer.clone(),
            player.clone(),
        );

        Self {
            config,
            sys,
            res,
            video,
            mixer,
            player,
            vm,
            state_slot: 0,
            frames: 0,
        }
    }

    pub fn vm(&self) -> &VirtualMachine {
        &self.vm
    }

    pub fn state_slot(&self) -> u8 {
        self.state_slot
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn init(&mut self) -> Result<()> {
        ensure!(
            is_valid_part(self.config.start_part),
            "Engine::init() invalid start part 0x{:04X}",
            self.config.start_part
        );

        self.res
            .get_mut()
            .read_directory()
            .with_context(|| format!("Engine::init() no game data in '{}'", self.config.data_dir.display()))?;

        self.vm.init();
        if self.config.fast_mode {
            self.vm.toggle_fast_mode();
        }
        self.vm.init_for_part(self.config.start_part)?;

        if let Some(slot) = self.config.slot {
            self.state_slot = slot;
            self.load_game_state(slot)?;
        }

        Ok(())
    }

    pub fn run_frame(&mut self) -> Result<()> {
        self.vm.check_thread_requests()?;
        self.vm.inp_update_player();
        self.process_input()?;
        self.vm.host_frame()?;
        self.frames += 1;
        Ok(())
    }

    /// Runs until the player quits or `max_frames` frames have run.
    pub fn run(&mut self, max_frames: Option<u64>) -> Result<u64> {
        while !self.sys.get().input().quit {
            if max_frames.map_or(false, |max| self.frames >= max) {
                break;
            }
            self.run_frame()?;
        }

        Ok(self.frames)
    }

    fn process_input(&mut self) -> Result<()> {
        let (load, save, fast_mode, state_slot) = {
            let mut sys = self.sys.get_mut();
            let input = sys.input_mut();
            let flags = (input.load, input.save, input.fast_mode, input.state_slot);
            input.load = false;
            input.save = false;
            input.fast_mode = false;
            input.state_slot = 0;
            flags
        };

        if load {
            self.load_game_state(self.state_slot)?;
        }
        if save {
            self.save_game_state(self.state_slot, "quicksave")?;
        }
        if fast_mode {
            self.vm.toggle_fast_mode();
        }
        if state_slot != 0 {
            let slot = self.state_slot as i16 + state_slot as i16;
            if slot >= 0 && slot < MAX_SAVE_SLOTS as i16 {
                self.state_slot = slot as u8;
                log::info!(target: "awvm::info", "Current game state slot is {}", self.state_slot);
            }
        }

        Ok(())
    }

    /// Writes the slot file. A slot that cannot be written is reported and
    /// play continues.
    pub fn save_game_state(&mut self, slot: u8, desc: &str) -> Result<()> {
        let name = make_game_state_name(slot);
        let f = match File::create(&name, &self.config.save_dir) {
            Ok(f) => f,
            Err(e) => {
                log::warn!(target: "awvm::info", "Unable to save state file '{}': {:#}", name, e);
                return Ok(());
            }
        };

        match self.save_state(f, desc) {
            Ok(_) => log::info!(target: "awvm::info", "Saved state to slot {}", slot),
            Err(e) => log::warn!(target: "awvm::info", "I/O error when saving game state: {:#}", e),
        }
        Ok(())
    }

    /// Restores the slot file. A missing slot or a foreign file is reported
    /// and play continues; a damaged body is fatal since the VM state may be
    /// half restored.
    pub fn load_game_state(&mut self, slot: u8) -> Result<()> {
        let name = make_game_state_name(slot);
        let f = match File::open(&name, &self.config.save_dir) {
            Ok(f) => f,
            Err(e) => {
                log::warn!(target: "awvm::info", "Unable to open state file '{}': {:#}", name, e);
                return Ok(());
            }
        };

        match self.load_state(f) {
            Ok(desc) => {
                log::info!(target: "awvm::info", "Loaded state '{}' from slot {}", desc, slot);
                Ok(())
            }
            Err(e) if e.is::<BadSignature>() => {
                log::warn!(target: "awvm::info", "Bad savegame format in '{}'", name);
                Ok(())
            }
            Err(e) => Err(e.context(format!("Engine::load_game_state() slot {}", slot))),
        }
    }

    /// Writes the header and every subsystem in save order, returning the
    /// stream.
    pub fn save_state(&mut self, mut f: File, desc: &str) -> Result<File> {
        f.write_u32(FORMAT_SIG)?;
        f.write_u16(CUR_VER)?;
        f.write_u16(0)?;

        let mut hdrdesc = [0u8; DESCRIPTION_LEN];
        let len = desc.len().min(DESCRIPTION_LEN - 1);
        hdrdesc[..len].copy_from_slice(&desc.as_bytes()[..len]);
        f.write(&hdrdesc)?;

        let mut ser = Serializer::new(f, Mode::Save, CUR_VER);
        self.save_or_load(&mut ser)?;
        Ok(ser.into_stream())
    }

    /// Reads a stream written by `save_state`, returning its description.
    pub fn load_state(&mut self, mut f: File) -> Result<String> {
        let id = f.read_u32()?;
        if id != FORMAT_SIG {
            bail!(BadSignature(id));
        }

        // mute
        self.player.get_mut().stop();
        self.mixer.get_mut().stop_all();

        let ver = f.read_u16()?;
        f.read_u16()?;
        let mut hdrdesc = [0u8; DESCRIPTION_LEN];
        f.read(&mut hdrdesc)?;
        let end = hdrdesc.iter().position(|&b| b == 0).unwrap_or(DESCRIPTION_LEN);
        let desc = String::from_utf8_lossy(&hdrdesc[..end]).into_owned();

        let mut ser = Serializer::new(f, Mode::Load, ver);
        self.save_or_load(&mut ser)?;
        Ok(desc)
    }

    fn save_or_load(&mut self, ser: &mut Serializer) -> Result<()> {
        self.vm.save_or_load(ser)?;
        self.res.get_mut().save_or_load(ser)?;
        self.video.get_mut().save_or_load(ser)?;
        self.player.get_mut().save_or_load(ser)?;
        self.mixer.get_mut().save_or_load(ser)?;
        Ok(())
    }
}

#[derive(Debug)]
struct BadSignature(u32);

impl std::fmt::Display for BadSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bad savegame signature 0x{:08X}", self.0)
    }
}

impl std::error::Error for BadSignature {}
