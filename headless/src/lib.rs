//! Platform layer without a window or an audio device.

pub mod args;
pub mod logger;
pub mod mixer;
pub mod music;
pub mod system;
pub mod video;

#[cfg(test)]
mod testing;
