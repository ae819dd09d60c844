use crate::file::File;
use anyhow::Result;

pub const CUR_VER: u16 = 2;

/// Stored value of a pointer entry that does not point anywhere.
const NULL_PTR: u32 = 0xFFFF_FFFF;

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Mode {
    Save,
    Load,
}

/// Fixed width big-endian value of a save-state entry.
pub trait AccessorWrap {
    fn read(&mut self, stream: &mut File) -> Result<()>;
    fn write(&self, stream: &mut File) -> Result<()>;
    fn size(&self) -> usize;
}

impl AccessorWrap for bool {
    fn read(&mut self, stream: &mut File) -> Result<()> {
        *self = stream.read_u8()? != 0;
        Ok(())
    }

    fn write(&self, stream: &mut File) -> Result<()> {
        stream.write_u8(*self as u8)
    }

    fn size(&self) -> usize {
        std::mem::size_of::<u8>()
    }
}

impl AccessorWrap for u8 {
    fn read(&mut self, stream: &mut File) -> Result<()> {
        *self = stream.read_u8()?;
        Ok(())
    }

    fn write(&self, stream: &mut File) -> Result<()> {
        stream.write_u8(*self)
    }

    fn size(&self) -> usize {
        std::mem::size_of::<u8>()
    }
}

impl AccessorWrap for u16 {
    fn read(&mut self, stream: &mut File) -> Result<()> {
        *self = stream.read_u16()?;
        Ok(())
    }

    fn write(&self, stream: &mut File) -> Result<()> {
        stream.write_u16(*self)
    }

    fn size(&self) -> usize {
        std::mem::size_of::<u16>()
    }
}

impl AccessorWrap for i16 {
    fn read(&mut self, stream: &mut File) -> Result<()> {
        *self = stream.read_u16()? as i16;
        Ok(())
    }

    fn write(&self, stream: &mut File) -> Result<()> {
        stream.write_u16(*self as u16)
    }

    fn size(&self) -> usize {
        std::mem::size_of::<i16>()
    }
}

impl AccessorWrap for u32 {
    fn read(&mut self, stream: &mut File) -> Result<()> {
        *self = stream.read_u32()?;
        Ok(())
    }

    fn write(&self, stream: &mut File) -> Result<()> {
        stream.write_u32(*self)
    }

    fn size(&self) -> usize {
        std::mem::size_of::<u32>()
    }
}

impl<T: AccessorWrap, const N: usize> AccessorWrap for [T; N] {
    fn read(&mut self, stream: &mut File) -> Result<()> {
        for val in self.iter_mut() {
            val.read(stream)?;
        }
        Ok(())
    }

    fn write(&self, stream: &mut File) -> Result<()> {
        for val in self.iter() {
            val.write(stream)?;
        }
        Ok(())
    }

    fn size(&self) -> usize {
        self.iter().map(|val| val.size()).sum()
    }
}

enum Field<'a> {
    Value(&'a mut dyn AccessorWrap),
    /// Arena offset, stored relative to the arena base.
    Ptr(&'a mut Option<usize>),
}

/// One field of a save-state record, valid from `min_ver` to `max_ver`.
pub struct Entry<'a> {
    field: Field<'a>,
    min_ver: u16,
    max_ver: u16,
}

impl<'a> Entry<'a> {
    pub fn int(value: &'a mut dyn AccessorWrap, min_ver: u16) -> Self {
        Self {
            field: Field::Value(value),
            min_ver,
            max_ver: CUR_VER,
        }
    }

    pub fn array(values: &'a mut dyn AccessorWrap, min_ver: u16) -> Self {
        Self::int(values, min_ver)
    }

    pub fn ptr(ptr: &'a mut Option<usize>, min_ver: u16) -> Self {
        Self {
            field: Field::Ptr(ptr),
            min_ver,
            max_ver: CUR_VER,
        }
    }

    /// Retires the entry after version `max_ver`.
    pub fn until(mut self, max_ver: u16) -> Self {
        self.max_ver = max_ver;
        self
    }

    fn save(&self, stream: &mut File) -> Result<usize> {
        match &self.field {
            Field::Value(value) => {
                value.write(stream)?;
                Ok(value.size())
            }
            Field::Ptr(ptr) => {
                stream.write_u32(ptr.map_or(NULL_PTR, |off| off as u32))?;
                Ok(4)
            }
        }
    }

    fn load(&mut self, stream: &mut File) -> Result<usize> {
        match &mut self.field {
            Field::Value(value) => {
                value.read(stream)?;
                Ok(value.size())
            }
            Field::Ptr(ptr) => {
                let off = stream.read_u32()?;
                **ptr = if off == NULL_PTR {
                    None
                } else {
                    Some(off as usize)
                };
                Ok(4)
            }
        }
    }
}

pub struct Serializer {
    stream: File,
    mode: Mode,
    save_ver: u16,
    bytes_count: u32,
}

impl Serializer {
    pub fn new(stream: File, mode: Mode, save_ver: u16) -> Self {
        Self {
            stream,
            mode,
            save_ver,
            bytes_count: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn save_ver(&self) -> u16 {
        self.save_ver
    }

    /// Bytes moved by the last `save_or_load_entries` call.
    pub fn bytes_count(&self) -> u32 {
        self.bytes_count
    }

    pub fn into_stream(self) -> File {
        self.stream
    }

    pub fn save_or_load_entries(&mut self, entries: &mut [Entry]) -> Result<()> {
        log::trace!(target: "awvm::ser", "Serializer::save_or_load_entries() mode={:?}", self.mode);
        self.bytes_count = 0;

        for entry in entries.iter_mut() {
            let count = match self.mode {
                Mode::Save if entry.max_ver == CUR_VER => entry.save(&mut self.stream)?,
                Mode::Load if self.save_ver >= entry.min_ver && self.save_ver <= entry.max_ver => {
                    entry.load(&mut self.stream)?
                }
                _ => 0,
            };
            self.bytes_count += count as u32;
        }

        log::trace!(target: "awvm::ser", "Serializer::save_or_load_entries() bytes_count={}", self.bytes_count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, PartialEq, Debug)]
    struct Record {
        flag: bool,
        id: u16,
        values: [i16; 3],
        seg: Option<usize>,
        unset: Option<usize>,
        retired: u8,
        added: u32,
    }

    impl Record {
        fn save_or_load(&mut self, ser: &mut Serializer) -> Result<()> {
            let mut entries = [
                Entry::int(&mut self.flag, 1),
                Entry::int(&mut self.id, 1),
                Entry::array(&mut self.values, 1),
                Entry::ptr(&mut self.seg, 1),
                Entry::ptr(&mut self.unset, 1),
                Entry::int(&mut self.retired, 1).until(1),
                Entry::int(&mut self.added, 2),
            ];
            ser.save_or_load_entries(&mut entries)
        }
    }

    #[test]
    fn test_save_then_load() -> Result<()> {
        let mut saved = Record {
            flag: true,
            id: 0x3E85,
            values: [-1, 2, 0x7FFF],
            seg: Some(0x1_2345),
            unset: None,
            retired: 9,
            added: 0xDEAD_BEEF,
        };

        let mut ser = Serializer::new(File::in_memory(), Mode::Save, CUR_VER);
        saved.save_or_load(&mut ser)?;
        assert_eq!(ser.bytes_count(), 1 + 2 + 6 + 4 + 4 + 4);

        let mut stream = ser.into_stream();
        stream.seek(0)?;
        let mut loaded = Record::default();
        let mut ser = Serializer::new(stream, Mode::Load, CUR_VER);
        loaded.save_or_load(&mut ser)?;

        saved.retired = 0;
        assert_eq!(loaded, saved);

        Ok(())
    }

    #[test]
    fn test_load_skips_entries_outside_version() -> Result<()> {
        let mut f = File::in_memory();
        f.write_u8(1)?; // flag
        f.write_u16(0x3E80)?; // id
        for v in &[1u16, 2, 3] {
            f.write_u16(*v)?;
        }
        f.write_u32(0x20)?; // seg
        f.write_u32(0xFFFF_FFFF)?; // unset
        f.write_u8(7)?; // retired, present in version 1 files
        f.seek(0)?;

        let mut loaded = Record {
            added: 42,
            ..Default::default()
        };
        let mut ser = Serializer::new(f, Mode::Load, 1);
        loaded.save_or_load(&mut ser)?;

        assert!(loaded.flag);
        assert_eq!(loaded.id, 0x3E80);
        assert_eq!(loaded.values, [1, 2, 3]);
        assert_eq!(loaded.seg, Some(0x20));
        assert_eq!(loaded.unset, None);
        assert_eq!(loaded.retired, 7);
        assert_eq!(loaded.added, 42);

        Ok(())
    }
}
