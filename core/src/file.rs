use anyhow::{Context, Result};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Big-endian reader/writer over a disk file or an in-memory buffer.
pub struct File {
    file_impl: Box<dyn FileImpl>,
}

impl File {
    pub fn open<P: AsRef<Path>>(filename: &str, directory: P) -> Result<Self> {
        let path = directory.as_ref().join(filename.to_lowercase());
        let file = std::fs::File::open(&path)
            .with_context(|| format!("File::open() unable to open '{}'", path.display()))?;
        Ok(Self {
            file_impl: Box::new(StdFile { file }),
        })
    }

    pub fn create<P: AsRef<Path>>(filename: &str, directory: P) -> Result<Self> {
        let path = directory.as_ref().join(filename.to_lowercase());
        let file = std::fs::File::create(&path)
            .with_context(|| format!("File::create() unable to create '{}'", path.display()))?;
        Ok(Self {
            file_impl: Box::new(StdFile { file }),
        })
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            file_impl: Box::new(MemFile {
                cursor: Cursor::new(data),
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::from_bytes(Vec::new())
    }

    /// Contents of an in-memory file, `None` for disk files.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.file_impl.bytes()
    }

    pub fn seek(&mut self, off: u64) -> Result<()> {
        self.file_impl.seek(off)
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        self.file_impl.read(buf)
    }

    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        self.file_impl.read_all()
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0; 1];
        self.read(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0; 2];
        self.read(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0; 4];
        self.read(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.file_impl.write(buf)
    }

    pub fn write_u8(&mut self, b: u8) -> Result<()> {
        self.write(&[b])
    }

    pub fn write_u16(&mut self, n: u16) -> Result<()> {
        self.write(&n.to_be_bytes())
    }

    pub fn write_u32(&mut self, n: u32) -> Result<()> {
        self.write(&n.to_be_bytes())
    }
}

trait FileImpl {
    fn seek(&mut self, off: u64) -> Result<()>;
    fn read(&mut self, buf: &mut [u8]) -> Result<()>;
    fn read_all(&mut self) -> Result<Vec<u8>>;
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    fn bytes(&self) -> Option<&[u8]> {
        None
    }
}

struct StdFile {
    file: std::fs::File,
}

impl FileImpl for StdFile {
    fn seek(&mut self, off: u64) -> Result<()> {
        self.file.seek(SeekFrom::Start(off))?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.file.write_all(buf)?;
        Ok(())
    }
}

struct MemFile {
    cursor: Cursor<Vec<u8>>,
}

impl FileImpl for MemFile {
    fn seek(&mut self, off: u64) -> Result<()> {
        self.cursor.seek(SeekFrom::Start(off))?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        self.cursor.read_exact(buf)?;
        Ok(())
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.cursor.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.cursor.write_all(buf)?;
        Ok(())
    }

    fn bytes(&self) -> Option<&[u8]> {
        Some(self.cursor.get_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_round() -> Result<()> {
        let mut f = File::in_memory();
        f.write_u8(0xAB)?;
        f.write_u16(0x1234)?;
        f.write_u32(0x4157_5356)?;
        assert_eq!(
            f.bytes(),
            Some(&[0xAB, 0x12, 0x34, 0x41, 0x57, 0x53, 0x56][..])
        );

        f.seek(0)?;
        assert_eq!(f.read_u8()?, 0xAB);
        assert_eq!(f.read_u16()?, 0x1234);
        assert_eq!(f.read_u32()?, 0x4157_5356);
        assert!(f.read_u8().is_err());

        Ok(())
    }
}
