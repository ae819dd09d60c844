use anyhow::{ensure, Result};

/// Big-endian cursor over bytecode.
pub struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub fn can_read(&self) -> bool {
        self.pos < self.data.len()
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        ensure!(
            self.pos < self.data.len(),
            "SliceReader::read_u8() 0x{:04X} is past the end of the code",
            self.pos
        );
        let addr = self.pos;
        self.pos += 1;
        Ok(self.data[addr])
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        let hi = self.read_u8()?;
        let lo = self.read_u8()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads() -> Result<()> {
        let code = [0x12, 0x34, 0x56];
        let mut reader = SliceReader::new(&code, 1);
        assert_eq!(reader.read_u16()?, 0x3456);
        assert!(!reader.can_read());
        assert!(reader.read_u8().is_err());
        assert_eq!(reader.pos(), 3);

        Ok(())
    }
}
