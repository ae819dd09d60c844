use crate::{command::Command, slice_reader::SliceReader};
use std::fmt;

/// Static listing of one bytecode resource.
///
/// Decoding never fails: a byte that does not start a valid instruction is
/// listed as data and decoding resumes right after it.
pub struct Program {
    id: u16,
    code: Vec<u8>,
    instructions: Vec<(usize, Option<Command>, usize)>,
}

impl Program {
    pub fn new(id: u16, code: Vec<u8>) -> Self {
        Self {
            id,
            code,
            instructions: Vec::new(),
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn parse(&mut self) {
        self.instructions.clear();

        let mut slice_reader = SliceReader::new(&self.code, 0);
        while slice_reader.can_read() {
            let addr = slice_reader.pos();
            let decoded = slice_reader
                .read_u8()
                .and_then(|opcode| Command::parse(opcode, &mut slice_reader));

            match decoded {
                Ok(cmd) => {
                    self.instructions
                        .push((addr, Some(cmd), slice_reader.pos() - addr));
                }
                Err(e) => {
                    log::debug!(target: "awvm::vm", "Program::parse() 0x{:02X} at 0x{:04X}: {}", self.id, addr, e);
                    self.instructions.push((addr, None, 1));
                    slice_reader = SliceReader::new(&self.code, addr + 1);
                }
            }
        }
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (addr, cmd, size) in &self.instructions {
            let bytes: Vec<_> = self.code[*addr..*addr + *size]
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect();
            match cmd {
                Some(cmd) => f.pad(&format!("{:05X}:\t  {:?}\n# {}\n", addr, cmd, bytes.join("")))?,
                None => f.pad(&format!("{:05X}:\t  db 0x{}\n", addr, bytes.join("")))?,
            }
        }

        Ok(())
    }
}
