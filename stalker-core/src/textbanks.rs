use log::{debug, info, warn};

use crate::huffman::{HuffmanTrees, TextEncodeMode, TextError};
use crate::rom::GameRom;

pub const TEXT_AREA_START: u32 = 0x2B27A;
pub const TEXT_AREA_END: u32 = 0x38368;

/// Bank start addresses in the unmodified game, followed by the end of the area.
pub const VANILLA_BANK_BOUNDARIES: [u32; 10] = [
    0x2B27A, 0x2C29B, 0x2DCC8, 0x2F787, 0x3153E, 0x330AB, 0x34830, 0x36087, 0x377E3, 0x38368,
];

/// One big-endian long per bank, right after the text area.
pub const BANK_POINTERS: u32 = 0x38368;
pub const MAX_BANKS: usize = VANILLA_BANK_BOUNDARIES.len() - 1;
pub const LINES_PER_BANK: usize = 256;

/// Byte written over unused text space.
pub const TEXT_FILLER: u8 = 0xFF;

/// Compressed text ready to be laid out in ROM.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TextBanks {
    banks: Vec<Vec<u8>>,
}

impl TextBanks {
    /// Decodes every line of every bank. Lines that decode with an anomaly
    /// are kept as far as they got and reported in the log.
    pub fn read(rom: &GameRom, trees: &HuffmanTrees) -> Result<Vec<String>, TextError> {
        let mut starts = Vec::with_capacity(MAX_BANKS);
        for bank in 0..MAX_BANKS {
            let address = rom.long(BANK_POINTERS + 4 * bank as u32);
            // a full text area leaves unused slots pointing at its end
            if !(TEXT_AREA_START..=TEXT_AREA_END).contains(&address) {
                return Err(TextError::InvalidBankPointer { bank, address });
            }
            starts.push(address);
        }

        let mut lines = Vec::new();
        for (bank, &start) in starts.iter().enumerate() {
            let end = starts
                .iter()
                .copied()
                .filter(|&s| s > start)
                .min()
                .unwrap_or(TEXT_AREA_END);
            let data = rom.chunk(start, (end - start) as usize);
            let before = lines.len();
            read_bank(&data, trees, bank, &mut lines);
            debug!("bank {bank} at {start:#08X}: {} lines", lines.len() - before);
        }
        Ok(lines)
    }

    /// Compresses `strings` and splits them in banks of [`LINES_PER_BANK`].
    pub fn encode<S: AsRef<str>>(
        strings: &[S],
        trees: &HuffmanTrees,
        mode: TextEncodeMode,
    ) -> Result<Self, TextError> {
        let mut banks = Vec::new();
        for (chunk_index, chunk) in strings.chunks(LINES_PER_BANK).enumerate() {
            let mut bank = Vec::new();
            for (i, string) in chunk.iter().enumerate() {
                let compressed = trees.encode_string(string.as_ref(), mode)?;
                let len = compressed.len() + 1;
                // a length byte equal to the filler reads as the end of the bank
                if len >= TEXT_FILLER as usize {
                    return Err(TextError::LineTooLong {
                        index: chunk_index * LINES_PER_BANK + i,
                        len,
                    });
                }
                bank.push(len as u8);
                bank.extend(compressed);
            }
            banks.push(bank);
        }

        if banks.len() > MAX_BANKS {
            return Err(TextError::TooManyBanks {
                count: banks.len(),
                max: MAX_BANKS,
            });
        }
        Ok(TextBanks { banks })
    }

    pub fn banks(&self) -> &[Vec<u8>] {
        &self.banks
    }

    pub fn total_size(&self) -> usize {
        self.banks.iter().map(Vec::len).sum()
    }

    /// Lays the banks out back to back from the start of the text area and
    /// fills whatever is left with [`TEXT_FILLER`]. Pointer slots past the
    /// last bank point at that filler.
    pub fn write_to_rom(&self, rom: &mut GameRom) -> Result<(), TextError> {
        let capacity = (TEXT_AREA_END - TEXT_AREA_START) as usize;
        let size = self.total_size();
        if size > capacity {
            return Err(TextError::TextAreaOverflow { size, capacity });
        }

        let mut address = TEXT_AREA_START;
        for (i, bank) in self.banks.iter().enumerate() {
            rom.set_long(BANK_POINTERS + 4 * i as u32, address);
            rom.set_bytes(address, bank);
            address += bank.len() as u32;
        }
        for slot in self.banks.len()..MAX_BANKS {
            rom.set_long(BANK_POINTERS + 4 * slot as u32, address);
        }
        rom.fill(address, (TEXT_AREA_END - address) as usize, TEXT_FILLER);
        info!(
            "wrote {} text banks ({size} bytes, {} bytes free)",
            self.banks.len(),
            capacity - size
        );
        Ok(())
    }
}

fn read_bank(data: &[u8], trees: &HuffmanTrees, bank: usize, lines: &mut Vec<String>) {
    let mut offset = 0usize;
    for line in 0..LINES_PER_BANK {
        let Some(&len) = data.get(offset) else {
            break;
        };
        if len == 0 || len == TEXT_FILLER {
            break;
        }
        let end = offset + len as usize;
        let Some(bytes) = data.get(offset + 1..end) else {
            warn!("line {line} of bank {bank} runs past the end of the bank");
            break;
        };

        let decoded = trees.decode_string(bytes);
        if let Some(anomaly) = &decoded.anomaly {
            warn!("line {line} of bank {bank} decoded with {anomaly:?}");
        }
        lines.push(decoded.text);
        offset = end;
    }
}

/// Decodes the whole game text, retrains the trees on it and writes both
/// back. Returns the decoded lines.
pub fn reencode_game_text(
    rom: &mut GameRom,
    mode: TextEncodeMode,
) -> Result<Vec<String>, TextError> {
    let trees = HuffmanTrees::parse_from_rom(rom)?;
    let lines = TextBanks::read(rom, &trees)?;
    info!("decoded {} lines of text", lines.len());

    let trees = HuffmanTrees::build_from_corpus(&lines);
    let banks = TextBanks::encode(&lines, &trees, mode)?;
    trees.write_to_rom(rom)?;
    banks.write_to_rom(rom)?;
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn sample_lines(count: usize) -> Vec<String> {
        (0..count)
            .map(|i| format!("Line {i}: Nigel found {} golds.", i * 5))
            .collect()
    }

    #[test]
    fn banks_hold_at_most_256_lines() {
        let lines = sample_lines(600);
        let trees = HuffmanTrees::build_from_corpus(&lines);
        let banks = TextBanks::encode(&lines, &trees, TextEncodeMode::Strict).unwrap();
        assert_eq!(banks.banks().len(), 3);

        // every line record starts with its own length
        let first = &banks.banks()[0];
        let len = first[0] as usize;
        assert_eq!(
            trees.decode_string(&first[1..len]).text,
            "Line 0: Nigel found 0 golds."
        );
    }

    #[test]
    fn writes_contiguously_and_pads_with_filler() {
        let lines = sample_lines(300);
        let trees = HuffmanTrees::build_from_corpus(&lines);
        let banks = TextBanks::encode(&lines, &trees, TextEncodeMode::Strict).unwrap();

        let mut rom = GameRom::blank();
        banks.write_to_rom(&mut rom).unwrap();

        let first_len = banks.banks()[0].len() as u32;
        assert_eq!(rom.long(BANK_POINTERS), TEXT_AREA_START);
        assert_eq!(rom.long(BANK_POINTERS + 4), TEXT_AREA_START + first_len);

        let end = TEXT_AREA_START + banks.total_size() as u32;
        assert_eq!(rom.byte(end), TEXT_FILLER);
        assert_eq!(rom.byte(TEXT_AREA_END - 1), TEXT_FILLER);
        assert_eq!(rom.byte(TEXT_AREA_END), 0);
    }

    #[test]
    fn written_text_reads_back() {
        let lines = sample_lines(400);
        let trees = HuffmanTrees::build_from_corpus(&lines);
        let banks = TextBanks::encode(&lines, &trees, TextEncodeMode::Strict).unwrap();

        let mut rom = GameRom::blank();
        trees.write_to_rom(&mut rom).unwrap();
        banks.write_to_rom(&mut rom).unwrap();

        let parsed = HuffmanTrees::parse_from_rom(&rom).unwrap();
        assert_eq!(TextBanks::read(&rom, &parsed).unwrap(), lines);
    }

    #[test]
    fn reencoding_keeps_the_text() {
        let lines = sample_lines(20);
        let trees = HuffmanTrees::build_from_corpus(&lines);
        let banks = TextBanks::encode(&lines, &trees, TextEncodeMode::Strict).unwrap();
        let mut rom = GameRom::blank();
        trees.write_to_rom(&mut rom).unwrap();
        banks.write_to_rom(&mut rom).unwrap();

        let decoded = reencode_game_text(&mut rom, TextEncodeMode::Strict).unwrap();
        assert_eq!(decoded, lines);
    }

    #[test]
    fn unused_pointer_slots_point_past_the_last_bank() {
        let lines = sample_lines(300);
        let trees = HuffmanTrees::build_from_corpus(&lines);
        let banks = TextBanks::encode(&lines, &trees, TextEncodeMode::Strict).unwrap();

        let mut rom = GameRom::blank();
        rom.set_long(BANK_POINTERS + 4 * 5, TEXT_AREA_START + 0x10);
        trees.write_to_rom(&mut rom).unwrap();
        banks.write_to_rom(&mut rom).unwrap();

        let tail = TEXT_AREA_START + banks.total_size() as u32;
        for slot in 2..MAX_BANKS {
            assert_eq!(rom.long(BANK_POINTERS + 4 * slot as u32), tail);
        }
        let parsed = HuffmanTrees::parse_from_rom(&rom).unwrap();
        assert_eq!(TextBanks::read(&rom, &parsed).unwrap(), lines);
    }

    #[test]
    fn line_length_byte_never_collides_with_filler() {
        // a lone 'a' tree: each 'a' after the first and the terminator cost one bit
        let trees = HuffmanTrees::build_from_corpus(&["a".repeat(3000)]);

        let too_long = vec!["a".repeat(2032)];
        let res = TextBanks::encode(&too_long, &trees, TextEncodeMode::Strict);
        assert!(matches!(
            res,
            Err(TextError::LineTooLong { index: 0, len: 255 })
        ));

        let lines = vec!["a".repeat(2024), "aa".to_string(), "a".to_string()];
        let banks = TextBanks::encode(&lines, &trees, TextEncodeMode::Strict).unwrap();
        assert_eq!(banks.banks()[0][0], 0xFE);

        let mut rom = GameRom::blank();
        trees.write_to_rom(&mut rom).unwrap();
        banks.write_to_rom(&mut rom).unwrap();
        let parsed = HuffmanTrees::parse_from_rom(&rom).unwrap();
        assert_eq!(TextBanks::read(&rom, &parsed).unwrap(), lines);
    }

    #[test]
    fn bad_bank_pointer_is_reported() {
        let rom = GameRom::blank();
        let res = TextBanks::read(&rom, &HuffmanTrees::empty());
        assert!(matches!(
            res,
            Err(TextError::InvalidBankPointer { bank: 0, address: 0 })
        ));
    }

    #[test]
    fn overflowing_text_area_writes_nothing() {
        let banks = TextBanks {
            banks: vec![vec![0x42; 0x4000]; 4],
        };
        let mut rom = GameRom::blank();
        let res = banks.write_to_rom(&mut rom);
        assert!(matches!(res, Err(TextError::TextAreaOverflow { .. })));
        assert_eq!(rom.byte(TEXT_AREA_START), 0);
        assert_eq!(rom.long(BANK_POINTERS), 0);
    }

    #[test]
    fn too_many_banks_is_an_error() {
        let lines = vec!["a"; LINES_PER_BANK * MAX_BANKS + 1];
        let trees = HuffmanTrees::build_from_corpus(&lines);
        let res = TextBanks::encode(&lines, &trees, TextEncodeMode::Strict);
        assert!(matches!(
            res,
            Err(TextError::TooManyBanks { count: 10, max: 9 })
        ));
    }
}
