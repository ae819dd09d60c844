use crate::memlist::MemEntry;
use crate::storage::{bank_name, Storage};
use anyhow::{ensure, Context, Result};

/// Packed data. Access values in reverse order.
struct PackedData<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PackedData<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: data.len(),
        }
    }

    fn read(&mut self) -> Result<u32> {
        ensure!(self.pos >= 4, "Bank::unpack() packed stream exhausted");
        self.pos -= 4;
        Ok(u32::from_be_bytes([
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ]))
    }
}

/// Unpacked data. Written in reverse order.
struct UnpackedData {
    data: Vec<u8>,
    pos: usize,
}

impl UnpackedData {
    fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
            pos: size,
        }
    }

    fn write(&mut self, b: u8) {
        self.pos -= 1;
        self.data[self.pos] = b;
    }

    /// Byte `offset` bytes above the next write position.
    fn back_ref(&self, offset: usize) -> Result<u8> {
        let src = self.pos - 1 + offset;
        ensure!(
            src < self.data.len(),
            "Bank::copy_pattern() offset {} reaches past the end of output",
            offset
        );
        Ok(self.data[src])
    }
}

/// 32 bit queue fed by the packed stream, lowest bit first.
/// Every word pulled in is folded into the running CRC.
struct BitQueue {
    bits: u32,
    count: u32,
}

impl BitQueue {
    // The highest set bit of the first word marks its end and is not data.
    fn new(first: u32) -> Self {
        let count = if first == 0 {
            0
        } else {
            31 - first.leading_zeros()
        };
        Self { bits: first, count }
    }
}

#[derive(Default, Debug)]
struct UnpackContext {
    crc: u32,
    data_size: u32,
}

struct Unpacker<'a> {
    ctx: UnpackContext,
    queue: BitQueue,
    packed: PackedData<'a>,
    unpacked: UnpackedData,
}

/// Decodes a packed bank blob. The blob trails with the unpacked size,
/// the CRC and the first word of the bit-stream, all big-endian.
///
/// Returns the unpacked bytes and whether the CRC check passed.
pub fn decompress(packed: &[u8], unpacked_size: usize) -> Result<(Vec<u8>, bool)> {
    let mut packed = PackedData::new(packed);

    let data_size = packed.read()?;
    ensure!(
        data_size as usize == unpacked_size,
        "Bank::unpack() declared size {} differs from entry size {}",
        data_size,
        unpacked_size
    );
    let crc = packed.read()?;
    let chk = packed.read()?;

    let mut unpacker = Unpacker {
        ctx: UnpackContext {
            crc: crc ^ chk,
            data_size,
        },
        queue: BitQueue::new(chk),
        packed,
        unpacked: UnpackedData::new(unpacked_size),
    };
    unpacker.unpack()?;

    log::trace!(target: "awvm::bank", "Bank::unpack() crc=0x{:08X}", unpacker.ctx.crc);

    let crc_ok = unpacker.ctx.crc == 0;
    Ok((unpacker.unpacked.data, crc_ok))
}

impl<'a> Unpacker<'a> {
    fn unpack(&mut self) -> Result<()> {
        while self.ctx.data_size > 0 {
            if !self.next_bit()? {
                if !self.next_bit()? {
                    // 1 to 8 literal bytes
                    self.decode_byte_sequence(1, 3)?;
                } else {
                    self.copy_pattern(2, 8)?;
                }
            } else {
                match self.get_code(2)? {
                    0 => self.copy_pattern(3, 9)?,
                    1 => self.copy_pattern(4, 10)?,
                    2 => {
                        let count = self.get_code(8)? + 1;
                        self.copy_pattern(count, 12)?;
                    }
                    // 9 to 264 literal bytes
                    _ => self.decode_byte_sequence(9, 8)?,
                }
            }
        }
        Ok(())
    }

    fn consume(&mut self, count: u16) -> Result<()> {
        ensure!(
            count as u32 <= self.ctx.data_size,
            "Bank::unpack() sequence of {} bytes overruns the {} remaining",
            count,
            self.ctx.data_size
        );
        self.ctx.data_size -= count as u32;
        Ok(())
    }

    fn decode_byte_sequence(&mut self, min_size: u16, size_bits: u8) -> Result<()> {
        let count = self.get_code(size_bits)? + min_size;
        log::trace!(target: "awvm::bank", "Bank::decode_byte_sequence({}, {}) count={}", min_size, size_bits, count);
        self.consume(count)?;
        for _ in 0..count {
            let val = self.get_code(8)? as u8;
            self.unpacked.write(val);
        }
        Ok(())
    }

    // Copies `count` bytes from already decoded data `offset` bytes above.
    fn copy_pattern(&mut self, count: u16, offset_bits: u8) -> Result<()> {
        let offset = self.get_code(offset_bits)? as usize;
        log::trace!(target: "awvm::bank", "Bank::copy_pattern({}, {}) offset={}", count, offset_bits, offset);
        self.consume(count)?;
        for _ in 0..count {
            let val = self.unpacked.back_ref(offset)?;
            self.unpacked.write(val);
        }
        Ok(())
    }

    fn get_code(&mut self, num_bits: u8) -> Result<u16> {
        let mut c = 0;
        for _ in 0..num_bits {
            c <<= 1;
            if self.next_bit()? {
                c |= 1;
            }
        }
        Ok(c)
    }

    fn next_bit(&mut self) -> Result<bool> {
        if self.queue.count == 0 {
            let word = self.packed.read()?;
            self.ctx.crc ^= word;
            self.queue.bits = word;
            self.queue.count = 32;
        }
        let bit = self.queue.bits & 1 != 0;
        self.queue.bits >>= 1;
        self.queue.count -= 1;
        Ok(bit)
    }
}

/// Reads the blob of `me` from its bank file. Stored blobs come back as is.
///
/// Returns the resource bytes and whether the CRC check passed.
pub(crate) fn read(storage: &dyn Storage, me: &MemEntry) -> Result<(Vec<u8>, bool)> {
    let name = bank_name(me.bank_id);
    let mut f = storage
        .open(&name)
        .with_context(|| format!("Bank::read() unable to open '{}'", name))?;

    let mut buf = vec![0; me.packed_size as usize];
    f.seek(me.bank_offset as u64)?;
    f.read(&mut buf)
        .with_context(|| format!("Bank::read() short read in '{}'", name))?;

    // Depending if the resource is packed or not we
    // can read directly or unpack it.
    if me.is_packed() {
        decompress(&buf, me.size as usize)
    } else {
        Ok((buf, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{pack, BitWriter};

    #[test]
    fn test_literal_and_copy_roundtrip() -> Result<()> {
        let data: Vec<u8> = b"ANOTHER WORLD ANOTHER WORLD ANOTHER WORLD out of this world"
            .iter()
            .cloned()
            .collect();
        let packed = pack(&data);
        assert!(packed.len() < data.len() + 12);

        let (unpacked, crc_ok) = decompress(&packed, data.len())?;
        assert!(crc_ok);
        assert_eq!(unpacked, data);

        Ok(())
    }

    #[test]
    fn test_long_runs_roundtrip() -> Result<()> {
        let mut data = Vec::new();
        for i in 0..3000u32 {
            data.push((i * 7 % 251) as u8);
        }
        data.extend(std::iter::repeat(0x55).take(700));
        data.extend((0..300u32).map(|i| (i * i) as u8));

        let (unpacked, crc_ok) = decompress(&pack(&data), data.len())?;
        assert!(crc_ok);
        assert_eq!(unpacked, data);

        Ok(())
    }

    #[test]
    fn test_hand_encoded_stream() -> Result<()> {
        // Output is produced back to front: literal "CD", then copy 2 bytes
        // from 2 bytes above, giving "CDCD".
        let mut bits = BitWriter::new();
        bits.push(0, 2); // literal run
        bits.push(1, 3); // 1 + 1 bytes
        bits.push(b'D' as u32, 8);
        bits.push(b'C' as u32, 8);
        bits.push(0b01, 2); // copy 2
        bits.push(2, 8); // offset

        let packed = bits.finish(4);
        let (unpacked, crc_ok) = decompress(&packed, 4)?;
        assert!(crc_ok);
        assert_eq!(unpacked, b"CDCD");

        Ok(())
    }

    #[test]
    fn test_bit_order_in_first_word() {
        // 0b1_101: marker at bit 3, data bits 1, 0, 1 lowest first.
        let queue = BitQueue::new(0b1101);
        assert_eq!(queue.count, 3);
        assert_eq!(BitQueue::new(0).count, 0);
        assert_eq!(BitQueue::new(1).count, 0);
        assert_eq!(BitQueue::new(0x8000_0000).count, 31);
    }

    #[test]
    fn test_bad_crc_rejected() -> Result<()> {
        let data = b"polygon bank".to_vec();
        let mut packed = pack(&data);
        let crc_pos = packed.len() - 8;
        packed[crc_pos] ^= 0x10;

        let (unpacked, crc_ok) = decompress(&packed, data.len())?;
        assert!(!crc_ok);
        assert_eq!(unpacked, data);

        Ok(())
    }

    #[test]
    fn test_footer_corruption_detected() {
        let data: Vec<u8> = (0..200u32).map(|i| (i % 13) as u8).collect();
        let packed = pack(&data);

        for bit in 0..96 {
            let mut corrupted = packed.clone();
            let byte = corrupted.len() - 12 + bit / 8;
            corrupted[byte] ^= 1 << (bit % 8);

            let accepted = match decompress(&corrupted, data.len()) {
                Ok((out, crc_ok)) => crc_ok && out == data,
                Err(_) => false,
            };
            assert!(!accepted, "flipped footer bit {} went unnoticed", bit);
        }
    }

    #[test]
    fn test_size_mismatch_is_error() {
        let data = b"abcdef".to_vec();
        let packed = pack(&data);
        assert!(decompress(&packed, data.len() + 1).is_err());
        assert!(decompress(&packed[..8], data.len()).is_err());
    }
}
