use anyhow::Result;
use awvm_core::{
    audio::{Mixer, MixerChunk, AUDIO_NUM_CHANNELS},
    serializer::{Entry, Serializer},
};
use std::sync::{Arc, Mutex, MutexGuard};

// sound sample rate
pub const OUTPUT_SAMPLE_RATE: u32 = 22050;

#[derive(Default, Clone, PartialEq, Debug)]
pub struct MixerChannel {
    pub active: bool,
    pub volume: u8,
    /// 24.8 fixed point position in the chunk.
    pub chunk_pos: u32,
    pub chunk_inc: u32,
    pub chunk: MixerChunk,
}

type Channels = [MixerChannel; AUDIO_NUM_CHANNELS];

/// Channel state shared with whoever consumes the samples. Clones are
/// handles to the same channels.
#[derive(Clone, Default)]
pub struct HeadlessMixer {
    channels: Arc<Mutex<Channels>>,
}

impl HeadlessMixer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Channels> {
        // Channels are plain data, a panic while holding the lock leaves them usable.
        match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn channel(&self, channel: u8) -> Option<MixerChannel> {
        self.lock().get(channel as usize).cloned()
    }

    pub fn active_channels(&self) -> usize {
        self.lock().iter().filter(|ch| ch.active).count()
    }

    fn with_channel<F: FnOnce(&mut MixerChannel)>(&self, caller: &str, channel: u8, f: F) {
        match self.lock().get_mut(channel as usize) {
            Some(ch) => f(ch),
            None => log::warn!(target: "awvm::snd", "Mixer::{}() invalid channel {}", caller, channel),
        }
    }
}

impl Mixer for HeadlessMixer {
    fn play_sample(&mut self, channel: u8, chunk: MixerChunk, freq: u16, volume: u8) {
        log::debug!(target: "awvm::snd", "Mixer::play_channel({}, {}, {})", channel, freq, volume);
        self.with_channel("play_channel", channel, |ch| {
            *ch = MixerChannel {
                active: true,
                volume,
                chunk_pos: 0,
                chunk_inc: ((freq as u32) << 8) / OUTPUT_SAMPLE_RATE,
                chunk,
            };
        });
    }

    fn stop_channel(&mut self, channel: u8) {
        log::debug!(target: "awvm::snd", "Mixer::stop_channel({})", channel);
        self.with_channel("stop_channel", channel, |ch| ch.active = false);
    }

    fn set_channel_volume(&mut self, channel: u8, volume: u8) {
        log::debug!(target: "awvm::snd", "Mixer::set_channel_volume({}, {})", channel, volume);
        self.with_channel("set_channel_volume", channel, |ch| ch.volume = volume);
    }

    fn stop_all(&mut self) {
        log::debug!(target: "awvm::snd", "Mixer::stop_all()");
        self.lock().iter_mut().for_each(|ch| ch.active = false);
    }

    fn save_or_load(&mut self, ser: &mut Serializer) -> Result<()> {
        let mut channels = self.lock();
        for ch in channels.iter_mut() {
            let chunk = &mut ch.chunk;
            ser.save_or_load_entries(&mut [
                Entry::int(&mut ch.active, 2),
                Entry::int(&mut ch.volume, 2),
                Entry::int(&mut ch.chunk_pos, 2),
                Entry::int(&mut ch.chunk_inc, 2),
                Entry::ptr(&mut chunk.data, 2),
                Entry::int(&mut chunk.len, 2),
                Entry::int(&mut chunk.loop_pos, 2),
                Entry::int(&mut chunk.loop_len, 2),
            ])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use awvm_core::{
        file::File,
        serializer::{Mode, CUR_VER},
    };

    fn chunk() -> MixerChunk {
        MixerChunk {
            data: Some(0x1008),
            len: 0x200,
            loop_pos: 0x200,
            loop_len: 0x40,
        }
    }

    #[test]
    fn test_play_and_stop() {
        let mut mixer = HeadlessMixer::new();
        mixer.play_sample(1, chunk(), 11025, 0x3F);

        let ch = mixer.channel(1).unwrap_or_default();
        assert!(ch.active);
        assert_eq!(ch.volume, 0x3F);
        assert_eq!(ch.chunk_inc, 0x80);
        assert_eq!(ch.chunk, chunk());
        assert_eq!(mixer.active_channels(), 1);

        mixer.set_channel_volume(1, 0x10);
        assert_eq!(mixer.channel(1).map(|ch| ch.volume), Some(0x10));

        mixer.stop_channel(1);
        assert_eq!(mixer.active_channels(), 0);
    }

    #[test]
    fn test_invalid_channel_is_ignored() {
        let mut mixer = HeadlessMixer::new();
        mixer.play_sample(4, chunk(), 8000, 0x20);
        mixer.stop_channel(9);
        assert_eq!(mixer.active_channels(), 0);
        assert_eq!(mixer.channel(4), None);
    }

    #[test]
    fn test_handles_share_channels() {
        let mixer = HeadlessMixer::new();
        let mut handle = mixer.clone();
        handle.play_sample(0, chunk(), 8000, 0x20);
        handle.play_sample(3, chunk(), 8000, 0x20);
        assert_eq!(mixer.active_channels(), 2);

        let consumer = mixer.clone();
        let count = std::thread::spawn(move || consumer.active_channels()).join();
        assert_eq!(count.ok(), Some(2));

        handle.stop_all();
        assert_eq!(mixer.active_channels(), 0);
    }

    #[test]
    fn test_save_then_load() -> Result<()> {
        let mut mixer = HeadlessMixer::new();
        mixer.play_sample(2, chunk(), 22050, 0x30);
        mixer.play_sample(
            0,
            MixerChunk {
                data: None,
                ..chunk()
            },
            4000,
            1,
        );

        let mut ser = Serializer::new(File::in_memory(), Mode::Save, CUR_VER);
        mixer.save_or_load(&mut ser)?;
        // one channel per call
        assert_eq!(ser.bytes_count(), 1 + 1 + 4 + 4 + 4 + 2 + 2 + 2);
        let data = ser.into_stream().bytes().unwrap_or_default().to_vec();
        assert_eq!(data.len(), 4 * 20);

        let mut restored = HeadlessMixer::new();
        let mut ser = Serializer::new(File::from_bytes(data), Mode::Load, CUR_VER);
        restored.save_or_load(&mut ser)?;
        for i in 0..AUDIO_NUM_CHANNELS as u8 {
            assert_eq!(restored.channel(i), mixer.channel(i));
        }
        assert_eq!(restored.channel(2).map(|ch| ch.chunk_inc), Some(0x100));

        // version 1 saves carry no mixer state
        let mut ser = Serializer::new(File::in_memory(), Mode::Load, 1);
        let mut empty = HeadlessMixer::new();
        empty.save_or_load(&mut ser)?;
        assert_eq!(empty.active_channels(), 0);
        Ok(())
    }
}
