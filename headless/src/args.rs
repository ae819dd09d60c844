//! Hand-parsed command line of the `awvm` binary.

use awvm_core::{config::EngineConfig, engine::MAX_SAVE_SLOTS, parts::is_valid_part};
use std::path::PathBuf;

pub const USAGE: &str = "\
Usage: awvm [OPTIONS]

Options:
  --data <DIR>     directory holding memlist.bin and the banks [env AWVM_DATA, default .]
  --save <DIR>     directory of the raw.sNN save slots [env AWVM_SAVE, default data dir]
  --part <ID>      start part, 0x3E80..=0x3E89 or 1..=10 [default 0x3E80]
  --frames <N>     stop after N frames
  --fast           skip the frame delay
  --slot <N>       restore save slot N after init
  --disasm         list every bytecode resource and exit
  -h, --help       print this help
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Run,
    Disasm,
    PrintHelp,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    pub mode: Mode,
    pub config: EngineConfig,
    pub frames: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    MissingValue(&'static str),
    InvalidValue(&'static str, String),
    UnknownFlag(String),
}

impl std::fmt::Display for ArgError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgError::MissingValue(flag) => write!(f, "Argument expected for the {} option", flag),
            ArgError::InvalidValue(flag, val) => write!(f, "Invalid value '{}' for the {} option", val, flag),
            ArgError::UnknownFlag(flag) => write!(f, "Unknown option: {}", flag),
        }
    }
}

impl std::error::Error for ArgError {}

fn parse_number(flag: &'static str, val: &str) -> Result<u64, ArgError> {
    let parsed = match val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => val.parse(),
    };
    parsed.map_err(|_| ArgError::InvalidValue(flag, val.to_string()))
}

/// Accepts either a raw part id or its 1-based index.
fn parse_part(val: &str) -> Result<u16, ArgError> {
    let n = parse_number("--part", val)?;
    let part = match n {
        1..=10 => awvm_core::parts::GAME_PART_FIRST + n as u16 - 1,
        _ if n <= u16::MAX as u64 => n as u16,
        _ => return Err(ArgError::InvalidValue("--part", val.to_string())),
    };
    if !is_valid_part(part) {
        return Err(ArgError::InvalidValue("--part", val.to_string()));
    }
    Ok(part)
}

fn parse_slot(val: &str) -> Result<u8, ArgError> {
    match parse_number("--slot", val)? {
        n if n < MAX_SAVE_SLOTS as u64 => Ok(n as u8),
        _ => Err(ArgError::InvalidValue("--slot", val.to_string())),
    }
}

/// Parses the arguments after the program name. `env` looks up the
/// environment fallbacks.
pub fn parse_args<F>(args: &[String], env: F) -> Result<Args, ArgError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut mode = Mode::Run;
    let mut data_dir = None;
    let mut save_dir = None;
    let mut config = EngineConfig::default();
    let mut frames = None;

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        let mut value = |flag: &'static str| -> Result<String, ArgError> {
            i += 1;
            args.get(i).cloned().ok_or(ArgError::MissingValue(flag))
        };

        match arg {
            "--data" => data_dir = Some(PathBuf::from(value("--data")?)),
            "--save" => save_dir = Some(PathBuf::from(value("--save")?)),
            "--part" => config.start_part = parse_part(&value("--part")?)?,
            "--frames" => frames = Some(parse_number("--frames", &value("--frames")?)?),
            "--slot" => config.slot = Some(parse_slot(&value("--slot")?)?),
            "--fast" => config.fast_mode = true,
            "--disasm" => mode = Mode::Disasm,
            "-h" | "--help" => {
                mode = Mode::PrintHelp;
                break;
            }
            _ => return Err(ArgError::UnknownFlag(arg.to_string())),
        }
        i += 1;
    }

    config.data_dir = data_dir
        .or_else(|| env("AWVM_DATA").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    config.save_dir = save_dir
        .or_else(|| env("AWVM_SAVE").map(PathBuf::from))
        .unwrap_or_else(|| config.data_dir.clone());

    Ok(Args { mode, config, frames })
}
