use crate::slice_reader::SliceReader;
use crate::staticres::var_name;
use anyhow::{bail, Result};
use std::fmt;

pub const DEFAULT_ZOOM: u16 = 0x40;

#[derive(Clone, Copy, PartialEq)]
pub struct OpVar(pub u8);

impl OpVar {
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for OpVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("[{}]", var_name(self.0)))
    }
}

/// Operand that is either a variable or an immediate.
#[derive(Clone, Copy, PartialEq)]
pub enum Operand {
    Var(u8),
    Byte(u8),
    Word(u16),
}

impl Operand {
    pub fn value(self, variables: &[i16]) -> i16 {
        match self {
            Self::Var(id) => variables[id as usize],
            Self::Byte(val) => val as i16,
            Self::Word(val) => val as i16,
        }
    }
}

impl fmt::Debug for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Var(id) => f.pad(&format!("[{}]", var_name(id))),
            Self::Byte(val) => f.pad(&format!("0x{:02X}", val)),
            Self::Word(val) => f.pad(&format!("0x{:04X}", val)),
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
pub enum JmpType {
    Je,
    Jne,
    Jg,
    Jge,
    Jl,
    Jle,
    Unknown(u8),
}

impl JmpType {
    fn new(code: u8) -> Self {
        match code {
            0 => Self::Je,
            1 => Self::Jne,
            2 => Self::Jg,
            3 => Self::Jge,
            4 => Self::Jl,
            5 => Self::Jle,
            _ => Self::Unknown(code),
        }
    }

    /// `None` for an unknown operator.
    pub fn test(self, a: i16, b: i16) -> Option<bool> {
        let res = match self {
            Self::Je => a == b,
            Self::Jne => a != b,
            Self::Jg => a > b,
            Self::Jge => a >= b,
            Self::Jl => a < b,
            Self::Jle => a <= b,
            Self::Unknown(_) => return None,
        };
        Some(res)
    }
}

impl fmt::Debug for JmpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Je => f.pad("je"),
            Self::Jne => f.pad("jne"),
            Self::Jg => f.pad("jg"),
            Self::Jge => f.pad("jge"),
            Self::Jl => f.pad("jl"),
            Self::Jle => f.pad("jle"),
            Self::Unknown(code) => f.pad(&format!("j?{}", code)),
        }
    }
}

/// What the channel range opcode does to its channels.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ResetType {
    Unfreeze,
    Freeze,
    Delete,
    Unknown(u8),
}

impl ResetType {
    fn new(code: u8) -> Self {
        match code {
            0 => Self::Unfreeze,
            1 => Self::Freeze,
            2 => Self::Delete,
            _ => Self::Unknown(code),
        }
    }
}

#[derive(PartialEq)]
pub enum Command {
    MovConst {
        var_id: OpVar,
        val: i16,
    },
    Mov {
        dst_id: OpVar,
        src_id: OpVar,
    },
    Add {
        dst_id: OpVar,
        src_id: OpVar,
    },
    AddConst {
        var_id: OpVar,
        val: i16,
    },
    Call {
        offset: u16,
    },
    Ret,
    PauseThread,
    Jmp {
        offset: u16,
    },
    SetVect {
        thr_id: u8,
        offset: u16,
    },
    Jnz {
        var_id: OpVar,
        offset: u16,
    },
    CondJmp {
        jmp_type: JmpType,
        var_id: OpVar,
        op2: Operand,
        offset: u16,
    },
    SetPalette {
        pal_id: u16,
    },
    /// `reset_type` is `None` when `last < first`; the opcode then ends
    /// after its second byte.
    ResetThread {
        first: u8,
        last: u8,
        reset_type: Option<ResetType>,
    },
    SelectVideoPage {
        page_id: u8,
    },
    FillVideoPage {
        page_id: u8,
        color: u8,
    },
    CopyVideoPage {
        src_page_id: u8,
        dst_page_id: u8,
    },
    BlitFramebuffer {
        page_id: u8,
    },
    KillThread,
    DrawString {
        str_id: u16,
        x: u8,
        y: u8,
        color: u8,
    },
    Sub {
        dst_id: OpVar,
        src_id: OpVar,
    },
    And {
        var_id: OpVar,
        val: u16,
    },
    Or {
        var_id: OpVar,
        val: u16,
    },
    Shl {
        var_id: OpVar,
        val: u16,
    },
    Shr {
        var_id: OpVar,
        val: u16,
    },
    PlaySound {
        res_id: u16,
        freq: u8,
        vol: u8,
        channel: u8,
    },
    UpdateMemList {
        res_id: u16,
    },
    PlayMusic {
        res_id: u16,
        delay: u16,
        pos: u8,
    },
    /// Background polygon from the cinematic bank.
    Video1 {
        offset: u16,
        x: i16,
        y: i16,
    },
    /// Sprite polygon, from the second bank when `video2` is set.
    Video2 {
        offset: u16,
        x: Operand,
        y: Operand,
        zoom: Operand,
        video2: bool,
    },
}

impl Command {
    /// Decodes the instruction starting with `opcode`, reading its operands.
    pub fn parse(opcode: u8, reader: &mut SliceReader) -> Result<Self> {
        let res = match opcode {
            0x00 => Self::MovConst {
                var_id: OpVar(reader.read_u8()?),
                val: reader.read_u16()? as i16,
            },
            0x01 => Self::Mov {
                dst_id: OpVar(reader.read_u8()?),
                src_id: OpVar(reader.read_u8()?),
            },
            0x02 => Self::Add {
                dst_id: OpVar(reader.read_u8()?),
                src_id: OpVar(reader.read_u8()?),
            },
            0x03 => Self::AddConst {
                var_id: OpVar(reader.read_u8()?),
                val: reader.read_u16()? as i16,
            },
            0x04 => Self::Call {
                offset: reader.read_u16()?,
            },
            0x05 => Self::Ret,
            0x06 => Self::PauseThread,
            0x07 => Self::Jmp {
                offset: reader.read_u16()?,
            },
            0x08 => Self::SetVect {
                thr_id: reader.read_u8()?,
                offset: reader.read_u16()?,
            },
            0x09 => Self::Jnz {
                var_id: OpVar(reader.read_u8()?),
                offset: reader.read_u16()?,
            },
            0x0A => {
                let oc = reader.read_u8()?;
                let var_id = OpVar(reader.read_u8()?);
                let c = reader.read_u8()?;
                let op2 = if oc & 0x80 != 0 {
                    Operand::Var(c)
                } else if oc & 0x40 != 0 {
                    Operand::Word(((c as u16) << 8) | reader.read_u8()? as u16)
                } else {
                    Operand::Byte(c)
                };

                Self::CondJmp {
                    jmp_type: JmpType::new(oc & 7),
                    var_id,
                    op2,
                    offset: reader.read_u16()?,
                }
            }
            0x0B => Self::SetPalette {
                pal_id: reader.read_u16()?,
            },
            0x0C => {
                let first = reader.read_u8()?;
                let last = reader.read_u8()? & 0x3F;
                let reset_type = if last < first {
                    None
                } else {
                    Some(ResetType::new(reader.read_u8()?))
                };
                Self::ResetThread {
                    first,
                    last,
                    reset_type,
                }
            }
            0x0D => Self::SelectVideoPage {
                page_id: reader.read_u8()?,
            },
            0x0E => Self::FillVideoPage {
                page_id: reader.read_u8()?,
                color: reader.read_u8()?,
            },
            0x0F => Self::CopyVideoPage {
                src_page_id: reader.read_u8()?,
                dst_page_id: reader.read_u8()?,
            },
            0x10 => Self::BlitFramebuffer {
                page_id: reader.read_u8()?,
            },
            0x11 => Self::KillThread,
            0x12 => Self::DrawString {
                str_id: reader.read_u16()?,
                x: reader.read_u8()?,
                y: reader.read_u8()?,
                color: reader.read_u8()?,
            },
            0x13 => Self::Sub {
                dst_id: OpVar(reader.read_u8()?),
                src_id: OpVar(reader.read_u8()?),
            },
            0x14 => Self::And {
                var_id: OpVar(reader.read_u8()?),
                val: reader.read_u16()?,
            },
            0x15 => Self::Or {
                var_id: OpVar(reader.read_u8()?),
                val: reader.read_u16()?,
            },
            0x16 => Self::Shl {
                var_id: OpVar(reader.read_u8()?),
                val: reader.read_u16()?,
            },
            0x17 => Self::Shr {
                var_id: OpVar(reader.read_u8()?),
                val: reader.read_u16()?,
            },
            0x18 => Self::PlaySound {
                res_id: reader.read_u16()?,
                freq: reader.read_u8()?,
                vol: reader.read_u8()?,
                channel: reader.read_u8()?,
            },
            0x19 => Self::UpdateMemList {
                res_id: reader.read_u16()?,
            },
            0x1A => Self::PlayMusic {
                res_id: reader.read_u16()?,
                delay: reader.read_u16()?,
                pos: reader.read_u8()?,
            },
            _ if opcode & 0x80 != 0 => {
                let offset = (((opcode as u16) << 8) | reader.read_u8()? as u16).wrapping_mul(2);
                let mut x = reader.read_u8()? as i16;
                let mut y = reader.read_u8()? as i16;
                let h = y - 199;
                if h > 0 {
                    y = 199;
                    x += h;
                }
                Self::Video1 { offset, x, y }
            }
            _ if opcode & 0x40 != 0 => Self::parse_sprite(opcode, reader)?,
            _ => bail!("Command::parse() ec=0x{:X} invalid opcode=0x{:02X}", 0xFFF, opcode),
        };

        Ok(res)
    }

    fn parse_sprite(opcode: u8, reader: &mut SliceReader) -> Result<Self> {
        let offset = reader.read_u16()?.wrapping_mul(2);

        let x_val = reader.read_u8()?;
        let x = match (opcode & 0x20 != 0, opcode & 0x10 != 0) {
            (false, false) => Operand::Word(((x_val as u16) << 8) | reader.read_u8()? as u16),
            (false, true) => Operand::Var(x_val),
            (true, true) => Operand::Word(x_val as u16 + 0x100),
            (true, false) => Operand::Byte(x_val),
        };

        let y_val = reader.read_u8()?;
        let y = match (opcode & 8 != 0, opcode & 4 != 0) {
            (false, false) => Operand::Word(((y_val as u16) << 8) | reader.read_u8()? as u16),
            (false, true) => Operand::Var(y_val),
            (true, _) => Operand::Byte(y_val),
        };

        // Zoom byte is only present in two of the four encodings.
        let (zoom, video2) = match (opcode & 2 != 0, opcode & 1 != 0) {
            (false, false) => (Operand::Word(DEFAULT_ZOOM), false),
            (false, true) => (Operand::Var(reader.read_u8()?), false),
            (true, true) => (Operand::Word(DEFAULT_ZOOM), true),
            (true, false) => (Operand::Byte(reader.read_u8()?), false),
        };

        Ok(Self::Video2 {
            offset,
            x,
            y,
            zoom,
            video2,
        })
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MovConst { var_id, val } => f.pad(&format!("mov {:?}, {}", var_id, val)),
            Self::Mov { dst_id, src_id } => f.pad(&format!("mov {:?}, {:?}", dst_id, src_id)),
            Self::Add { dst_id, src_id } => f.pad(&format!("add {:?}, {:?}", dst_id, src_id)),
            Self::AddConst { var_id, val } => f.pad(&format!("add {:?}, {}", var_id, val)),
            Self::Call { offset } => f.pad(&format!("call 0x{:04X}", offset)),
            Self::Ret => f.pad("ret"),
            Self::PauseThread => f.pad("break"),
            Self::Jmp { offset } => f.pad(&format!("jmp 0x{:04X}", offset)),
            Self::SetVect { thr_id, offset } => f.pad(&format!(
                "setvec channel:0x{:02X}, address:0x{:04X}",
                thr_id, offset
            )),
            Self::Jnz { var_id, offset } => f.pad(&format!("djnz {:?}, 0x{:04X}", var_id, offset)),
            Self::CondJmp {
                jmp_type,
                var_id,
                op2,
                offset,
            } => f.pad(&format!(
                "{:?} {:?}, {:?}, 0x{:04X}",
                jmp_type, var_id, op2, offset
            )),
            Self::SetPalette { pal_id } => f.pad(&format!("setPalette 0x{:04X}", pal_id)),
            Self::ResetThread {
                first,
                last,
                reset_type,
            } => {
                let name = match reset_type {
                    Some(ResetType::Freeze) => "freezeChannels".to_string(),
                    Some(ResetType::Unfreeze) => "unfreezeChannels".to_string(),
                    Some(ResetType::Delete) => "deleteChannels".to_string(),
                    Some(ResetType::Unknown(code)) => format!("resetChannels?{}", code),
                    None => "resetChannels(empty)".to_string(),
                };
                f.pad(&format!(
                    "{} first:0x{:02X}, last:0x{:02X}",
                    name, first, last
                ))
            }
            Self::SelectVideoPage { page_id } => {
                f.pad(&format!("selectVideoPage 0x{:02X}", page_id))
            }
            Self::FillVideoPage { page_id, color } => f.pad(&format!(
                "fillVideoPage 0x{:02X}, color:0x{:02X}",
                page_id, color
            )),
            Self::CopyVideoPage {
                src_page_id,
                dst_page_id,
            } => f.pad(&format!(
                "copyVideoPage src:0x{:02X}, dst:0x{:02X}",
                src_page_id, dst_page_id
            )),
            Self::BlitFramebuffer { page_id } => {
                f.pad(&format!("blitFramebuffer 0x{:02X}", page_id))
            }
            Self::KillThread => f.pad("killChannel"),
            Self::DrawString {
                str_id,
                x,
                y,
                color,
            } => f.pad(&format!(
                "text id:0x{:04X}, x:{}, y:{}, color:0x{:02X}",
                str_id, x, y, color
            )),
            Self::Sub { dst_id, src_id } => f.pad(&format!("sub {:?}, {:?}", dst_id, src_id)),
            Self::And { var_id, val } => f.pad(&format!("and {:?}, 0x{:04X}", var_id, val)),
            Self::Or { var_id, val } => f.pad(&format!("or {:?}, 0x{:04X}", var_id, val)),
            Self::Shl { var_id, val } => f.pad(&format!("shl {:?}, {}", var_id, val)),
            Self::Shr { var_id, val } => f.pad(&format!("shr {:?}, {}", var_id, val)),
            Self::PlaySound {
                res_id,
                freq,
                vol,
                channel,
            } => f.pad(&format!(
                "play id:0x{:04X}, freq:0x{:02X}, vol:0x{:02X}, channel:0x{:02X}",
                res_id, freq, vol, channel
            )),
            Self::UpdateMemList { res_id } => f.pad(&format!("load id:0x{:04X}", res_id)),
            Self::PlayMusic { res_id, delay, pos } => f.pad(&format!(
                "song id:0x{:04X}, delay:0x{:04X}, pos:0x{:02X}",
                res_id, delay, pos
            )),
            Self::Video1 { offset, x, y } => f.pad(&format!(
                "video: off=0x{:04X} x={} y={}",
                offset, x, y
            )),
            Self::Video2 {
                offset,
                x,
                y,
                zoom,
                video2,
            } => f.pad(&format!(
                "video: off=0x{:04X} x={:?} y={:?} zoom:{:?}{}",
                offset,
                x,
                y,
                zoom,
                if *video2 { " seg:video2" } else { "" }
            )),
        }
    }
}
