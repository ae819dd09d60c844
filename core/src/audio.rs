use crate::reference::Ref;
use crate::serializer::Serializer;
use anyhow::{ensure, Result};

pub const AUDIO_NUM_CHANNELS: usize = 4;

/// Sample handed to the mixer. `data` is the arena offset of the first
/// sample byte, lengths are in bytes.
#[derive(Default, Clone, PartialEq, Debug)]
pub struct MixerChunk {
    pub data: Option<usize>,
    pub len: u16,
    pub loop_pos: u16,
    pub loop_len: u16,
}

impl MixerChunk {
    /// Builds a chunk from a sound resource: a big-endian header with the
    /// length and loop length in words, then the samples after 8 bytes.
    pub fn from_sound(buf_offset: usize, header: &[u8]) -> Result<Self> {
        ensure!(
            header.len() >= 4,
            "MixerChunk::from_sound() header too short: {} bytes",
            header.len()
        );
        let len = u16::from_be_bytes([header[0], header[1]]).wrapping_mul(2);
        let loop_len = u16::from_be_bytes([header[2], header[3]]).wrapping_mul(2);
        Ok(Self {
            data: Some(buf_offset + 8),
            len,
            loop_pos: if loop_len != 0 { len } else { 0 },
            loop_len,
        })
    }
}

pub type MixerRef = Ref<Box<dyn Mixer>>;
pub type MusicPlayerRef = Ref<Box<dyn MusicPlayer>>;

/// Four channel sample mixer. Implementations run their mixing on an audio
/// thread and lock around every call.
pub trait Mixer {
    fn play_sample(&mut self, channel: u8, chunk: MixerChunk, freq: u16, volume: u8);
    fn stop_channel(&mut self, channel: u8);
    fn set_channel_volume(&mut self, channel: u8, volume: u8);
    fn stop_all(&mut self);

    fn save_or_load(&mut self, ser: &mut Serializer) -> Result<()>;
}

/// Tracker music player.
pub trait MusicPlayer {
    fn load(&mut self, res_id: u16, delay: u16, pos: u8) -> Result<()>;
    fn start(&mut self);
    fn stop(&mut self);
    fn set_event_delay(&mut self, delay: u16);
    /// Pattern mark reached since the last call, if any.
    fn take_mark(&mut self) -> Option<i16>;

    fn save_or_load(&mut self, ser: &mut Serializer) -> Result<()>;
}
