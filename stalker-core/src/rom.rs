use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{debug, warn};
use thiserror::Error;

use crate::asm::{AsmError, Code};
use crate::{RandomiserError, Result};

pub const ROM_SIZE: usize = 2_097_152;

/// First byte of the free code area at the tail of the original image.
pub const CODE_INJECTION_START: u32 = 0x1F_FAD0;

const CHECKSUM_START: usize = 0x200;
pub const CHECKSUM_ADDRESS: u32 = 0x18E;

#[derive(Debug, Error)]
pub enum RomError {
    #[error("not enough free space to inject {size} bytes for '{name}'")]
    OutOfSpace { name: String, size: usize },

    #[error("cannot inject code '{name}': {source}")]
    Code {
        name: String,
        #[source]
        source: AsmError,
    },
}

/// In-memory game image with the bookkeeping needed by patches: a
/// symbolic address table plus two injection cursors.
#[derive(Clone)]
pub struct GameRom {
    data: Vec<u8>,
    code_cursor: u32,
    data_cursor: u32,
    stored_addresses: HashMap<String, u32>,
    dropped_writes: usize,
}

impl GameRom {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(mut bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < ROM_SIZE {
            return Err(RandomiserError::InvalidRom { len: bytes.len() });
        }
        if bytes.len() > ROM_SIZE {
            warn!(
                "input image is {} bytes long, ignoring everything past {:#X}",
                bytes.len(),
                ROM_SIZE
            );
            bytes.truncate(ROM_SIZE);
        }

        Ok(GameRom {
            data: bytes,
            code_cursor: CODE_INJECTION_START,
            data_cursor: ROM_SIZE as u32,
            stored_addresses: HashMap::new(),
            dropped_writes: 0,
        })
    }

    /// Blank image, all zeroes. Mostly useful for tests and tools.
    pub fn blank() -> Self {
        GameRom {
            data: vec![0; ROM_SIZE],
            code_cursor: CODE_INJECTION_START,
            data_cursor: ROM_SIZE as u32,
            stored_addresses: HashMap::new(),
            dropped_writes: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Number of writes discarded because they fell outside the image.
    pub fn dropped_writes(&self) -> usize {
        self.dropped_writes
    }

    fn fits(&self, addr: u32, len: usize) -> bool {
        (addr as usize)
            .checked_add(len)
            .map_or(false, |end| end <= self.data.len())
    }

    fn drop_write(&mut self, kind: &str, addr: u32) {
        self.dropped_writes += 1;
        warn!("dropped out-of-range {kind} write at {addr:#08X}");
    }

    pub fn byte(&self, addr: u32) -> u8 {
        self.data.get(addr as usize).copied().unwrap_or_else(|| {
            debug!("out-of-range byte read at {addr:#08X}");
            0
        })
    }

    pub fn word(&self, addr: u32) -> u16 {
        if !self.fits(addr, 2) {
            debug!("out-of-range word read at {addr:#08X}");
            return 0;
        }
        let a = addr as usize;
        u16::from_be_bytes([self.data[a], self.data[a + 1]])
    }

    pub fn long(&self, addr: u32) -> u32 {
        if !self.fits(addr, 4) {
            debug!("out-of-range long read at {addr:#08X}");
            return 0;
        }
        let a = addr as usize;
        u32::from_be_bytes([
            self.data[a],
            self.data[a + 1],
            self.data[a + 2],
            self.data[a + 3],
        ])
    }

    /// Copy of `len` bytes starting at `addr`, cut short at the end of the image.
    pub fn chunk(&self, addr: u32, len: usize) -> Vec<u8> {
        let start = (addr as usize).min(self.data.len());
        let end = start.saturating_add(len).min(self.data.len());
        self.data[start..end].to_vec()
    }

    pub fn set_byte(&mut self, addr: u32, value: u8) {
        if !self.fits(addr, 1) {
            self.drop_write("byte", addr);
            return;
        }
        self.data[addr as usize] = value;
    }

    pub fn set_word(&mut self, addr: u32, value: u16) {
        if !self.fits(addr, 2) {
            self.drop_write("word", addr);
            return;
        }
        let a = addr as usize;
        self.data[a..a + 2].copy_from_slice(&value.to_be_bytes());
    }

    pub fn set_long(&mut self, addr: u32, value: u32) {
        if !self.fits(addr, 4) {
            self.drop_write("long", addr);
            return;
        }
        let a = addr as usize;
        self.data[a..a + 4].copy_from_slice(&value.to_be_bytes());
    }

    /// Writes a contiguous run. Whatever does not fit in the image is cut off.
    pub fn set_bytes(&mut self, addr: u32, bytes: &[u8]) {
        let start = addr as usize;
        if start >= self.data.len() {
            if !bytes.is_empty() {
                self.drop_write("block", addr);
            }
            return;
        }
        let room = self.data.len() - start;
        let kept = bytes.len().min(room);
        self.data[start..start + kept].copy_from_slice(&bytes[..kept]);
        if kept < bytes.len() {
            self.drop_write("block tail", addr + kept as u32);
        }
    }

    pub fn fill(&mut self, addr: u32, len: usize, value: u8) {
        self.set_bytes(addr, &vec![value; len]);
    }

    pub fn store_address(&mut self, name: &str, addr: u32) {
        self.stored_addresses.insert(name.to_string(), addr);
    }

    pub fn stored_address(&self, name: &str) -> Option<u32> {
        self.stored_addresses.get(name).copied()
    }

    /// Appends finished code in the free code area and returns where it landed.
    pub fn inject_code(&mut self, code: &Code, label: Option<&str>) -> Result<u32> {
        let name = label.unwrap_or("<anonymous>");
        let bytes = code.finish().map_err(|source| RomError::Code {
            name: name.to_string(),
            source,
        })?;

        let addr = self.code_cursor;
        let end = addr as usize + bytes.len();
        if end > self.data_cursor as usize {
            return Err(RomError::OutOfSpace {
                name: name.to_string(),
                size: bytes.len(),
            }
            .into());
        }

        self.set_bytes(addr, &bytes);
        self.code_cursor = end as u32;
        if let Some(label) = label {
            self.store_address(label, addr);
        }
        debug!("injected {} bytes of code '{name}' at {addr:#08X}", bytes.len());
        Ok(addr)
    }

    /// Reserves `size` bytes below the data cursor and records them under `name`.
    pub fn reserve_data_block(&mut self, size: usize, name: &str) -> Result<u32> {
        let cursor = self.data_cursor as usize;
        let start = match cursor.checked_sub(size) {
            Some(start) if start >= self.code_cursor as usize => start,
            _ => {
                return Err(RomError::OutOfSpace {
                    name: name.to_string(),
                    size,
                }
                .into())
            }
        };
        self.data_cursor = start as u32;
        self.store_address(name, self.data_cursor);
        Ok(self.data_cursor)
    }

    pub fn inject_data(&mut self, bytes: &[u8], name: &str) -> Result<u32> {
        let addr = self.reserve_data_block(bytes.len(), name)?;
        self.set_bytes(addr, bytes);
        debug!("injected {} bytes of data '{name}' at {addr:#08X}", bytes.len());
        Ok(addr)
    }

    pub fn checksum(&self) -> u16 {
        self.data[CHECKSUM_START..]
            .chunks(2)
            .map(|pair| {
                let hi = pair[0];
                let lo = pair.get(1).copied().unwrap_or(0);
                u16::from_be_bytes([hi, lo])
            })
            .fold(0u16, |acc, word| acc.wrapping_add(word))
    }

    pub fn update_checksum(&mut self) {
        let checksum = self.checksum();
        self.set_word(CHECKSUM_ADDRESS, checksum);
    }

    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.update_checksum();
        if self.dropped_writes > 0 {
            warn!(
                "{} out-of-range writes were dropped while patching",
                self.dropped_writes
            );
        }
        fs::write(path, &self.data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{Code, Cond};

    #[test]
    fn rejects_short_images() {
        let err = GameRom::from_bytes(vec![0; 1024]).err().unwrap();
        assert!(matches!(err, RandomiserError::InvalidRom { len: 1024 }));
    }

    #[test]
    fn writes_big_endian_values() {
        let mut rom = GameRom::blank();
        rom.set_word(0x1000, 0xBEEF);
        rom.set_long(0x1002, 0x0102_0304);
        assert_eq!(rom.chunk(0x1000, 6), vec![0xBE, 0xEF, 1, 2, 3, 4]);
        assert_eq!(rom.word(0x1000), 0xBEEF);
        assert_eq!(rom.long(0x1002), 0x0102_0304);
    }

    #[test]
    fn drops_out_of_range_writes_without_touching_neighbours() {
        let mut rom = GameRom::blank();
        let last = ROM_SIZE as u32 - 1;
        rom.set_byte(last, 0xAA);
        rom.set_word(last, 0x1234);
        rom.set_long(ROM_SIZE as u32 - 3, 0xDEAD_BEEF);
        rom.set_byte(ROM_SIZE as u32, 0x55);

        assert_eq!(rom.byte(last), 0xAA);
        assert_eq!(rom.byte(last - 1), 0);
        assert_eq!(rom.dropped_writes(), 3);
    }

    #[test]
    fn set_bytes_truncates_at_end_of_image() {
        let mut rom = GameRom::blank();
        rom.set_bytes(ROM_SIZE as u32 - 2, &[1, 2, 3, 4]);
        assert_eq!(rom.chunk(ROM_SIZE as u32 - 2, 8), vec![1, 2]);
        assert_eq!(rom.dropped_writes(), 1);
    }

    #[test]
    fn checksum_sums_words_after_header() {
        let mut rom = GameRom::blank();
        rom.set_word(0x100, 0xFFFF); // header area is not summed
        rom.set_word(0x200, 0x8000);
        rom.set_word(0x300, 0x8001);
        rom.set_word(0x400, 0x0010);
        assert_eq!(rom.checksum(), 0x0011);

        rom.update_checksum();
        assert_eq!(rom.word(0x18E), 0x0011);
    }

    #[test]
    fn data_blocks_grow_downward_from_the_end() {
        let mut rom = GameRom::blank();
        let first = rom.inject_data(&[1, 2, 3, 4], "first").unwrap();
        let second = rom.reserve_data_block(0x10, "second").unwrap();
        assert_eq!(first, ROM_SIZE as u32 - 4);
        assert_eq!(second, first - 0x10);
        assert_eq!(rom.stored_address("first"), Some(first));
        assert_eq!(rom.chunk(first, 4), vec![1, 2, 3, 4]);
    }

    #[test]
    fn injected_code_is_recorded_under_its_label() {
        let mut rom = GameRom::blank();
        let mut code = Code::new();
        code.nop().rts();
        let addr = rom.inject_code(&code, Some("stub")).unwrap();
        assert_eq!(addr, CODE_INJECTION_START);
        assert_eq!(rom.stored_address("stub"), Some(addr));
        assert_eq!(rom.chunk(addr, 4), vec![0x4E, 0x71, 0x4E, 0x75]);

        let next = rom.inject_code(&code, None).unwrap();
        assert_eq!(next, addr + 4);
    }

    #[test]
    fn refuses_code_with_pending_branches() {
        let mut rom = GameRom::blank();
        let mut code = Code::new();
        code.branch(Cond::Ne, 3).nop();
        let err = rom.inject_code(&code, Some("broken")).unwrap_err();
        assert!(matches!(
            err,
            RandomiserError::Rom(RomError::Code { ref name, .. }) if name == "broken"
        ));
        assert_eq!(rom.stored_address("broken"), None);
    }
}
