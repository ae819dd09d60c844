mod bank;
mod slice_reader;
mod vm_context;

pub mod audio;
pub mod command;
pub mod config;
pub mod engine;
pub mod file;
pub mod memlist;
pub mod memory;
pub mod parts;
pub mod program;
pub mod reference;
pub mod resource;
pub mod serializer;
pub mod staticres;
pub mod storage;
pub mod system;
pub mod video;
pub mod vm;

#[cfg(test)]
mod test_utils;
