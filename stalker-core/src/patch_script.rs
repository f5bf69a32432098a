use thiserror::Error;

use crate::rom::GameRom;

#[derive(Debug, Error)]
pub enum PatchScriptError {
    #[error("unknown opcode '{opcode}' on line {line}")]
    UnknownOpcode { line: usize, opcode: String },

    #[error("wrong argument count for {opcode} on line {line}: expected {expected}, got {got}")]
    WrongArgCount {
        line: usize,
        opcode: String,
        expected: String,
        got: usize,
    },

    #[error("failed to parse integer '{token}' on line {line}")]
    ParseInt {
        line: usize,
        token: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("value '{token}' on line {line} is out of range for {kind}")]
    ValueOutOfRange {
        line: usize,
        token: String,
        kind: &'static str,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RomPatch {
    Byte { address: u32, value: u8 },
    Word { address: u32, value: u16 },
    Long { address: u32, value: u32 },
    Bytes { address: u32, bytes: Vec<u8> },
    Fill { address: u32, count: usize, value: u8 },
}

fn parse_u32(line: usize, token: &str) -> Result<u32, PatchScriptError> {
    let t = token.trim_end_matches(',');
    let res = if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        t.parse::<u32>()
    };

    res.map_err(|e| PatchScriptError::ParseInt {
        line,
        token: t.to_string(),
        source: e,
    })
}

fn parse_u8(line: usize, token: &str) -> Result<u8, PatchScriptError> {
    let v = parse_u32(line, token)?;
    u8::try_from(v).map_err(|_| PatchScriptError::ValueOutOfRange {
        line,
        token: token.trim_end_matches(',').to_string(),
        kind: "byte",
    })
}

fn parse_u16(line: usize, token: &str) -> Result<u16, PatchScriptError> {
    let v = parse_u32(line, token)?;
    u16::try_from(v).map_err(|_| PatchScriptError::ValueOutOfRange {
        line,
        token: token.trim_end_matches(',').to_string(),
        kind: "word",
    })
}

fn expect_args(
    line: usize,
    opcode: &str,
    args: &[&str],
    expected: usize,
) -> Result<(), PatchScriptError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(PatchScriptError::WrongArgCount {
            line,
            opcode: opcode.to_string(),
            expected: expected.to_string(),
            got: args.len(),
        })
    }
}

/// Parse a patch script into ROM patches.
///
/// Line format (case-insensitive opcodes; decimal or 0x-prefixed hex numbers):
///
/// - BYTE  address value
/// - WORD  address value
/// - LONG  address value
/// - BYTES address b0 b1 ...
/// - FILL  address count value
///
/// Blank lines, lines starting with `#` or `//` and anything after a `;`
/// are ignored.
pub fn parse_patch_script(src: &str) -> Result<Vec<RomPatch>, PatchScriptError> {
    let mut patches = Vec::new();

    for (idx, raw_line) in src.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split(';').next().unwrap_or_default();
        let mut parts = line.split_whitespace();
        let Some(op_tok) = parts.next() else {
            continue;
        };
        if op_tok.starts_with('#') || op_tok.starts_with("//") {
            continue;
        }

        let opcode = op_tok.to_ascii_uppercase();
        let args: Vec<&str> = parts.collect();

        let patch = match opcode.as_str() {
            "BYTE" => {
                expect_args(line_no, &opcode, &args, 2)?;
                RomPatch::Byte {
                    address: parse_u32(line_no, args[0])?,
                    value: parse_u8(line_no, args[1])?,
                }
            }

            "WORD" => {
                expect_args(line_no, &opcode, &args, 2)?;
                RomPatch::Word {
                    address: parse_u32(line_no, args[0])?,
                    value: parse_u16(line_no, args[1])?,
                }
            }

            "LONG" => {
                expect_args(line_no, &opcode, &args, 2)?;
                RomPatch::Long {
                    address: parse_u32(line_no, args[0])?,
                    value: parse_u32(line_no, args[1])?,
                }
            }

            "BYTES" => {
                if args.len() < 2 {
                    return Err(PatchScriptError::WrongArgCount {
                        line: line_no,
                        opcode,
                        expected: "at least 2".to_string(),
                        got: args.len(),
                    });
                }
                let bytes = args[1..]
                    .iter()
                    .map(|t| parse_u8(line_no, t))
                    .collect::<Result<Vec<u8>, _>>()?;
                RomPatch::Bytes {
                    address: parse_u32(line_no, args[0])?,
                    bytes,
                }
            }

            "FILL" => {
                expect_args(line_no, &opcode, &args, 3)?;
                RomPatch::Fill {
                    address: parse_u32(line_no, args[0])?,
                    count: parse_u32(line_no, args[1])? as usize,
                    value: parse_u8(line_no, args[2])?,
                }
            }

            _ => {
                return Err(PatchScriptError::UnknownOpcode {
                    line: line_no,
                    opcode,
                });
            }
        };
        patches.push(patch);
    }

    Ok(patches)
}

/// Applies patches in order and returns how many were applied.
pub fn apply_patches(rom: &mut GameRom, patches: &[RomPatch]) -> usize {
    for patch in patches {
        match patch {
            RomPatch::Byte { address, value } => rom.set_byte(*address, *value),
            RomPatch::Word { address, value } => rom.set_word(*address, *value),
            RomPatch::Long { address, value } => rom.set_long(*address, *value),
            RomPatch::Bytes { address, bytes } => rom.set_bytes(*address, bytes),
            RomPatch::Fill {
                address,
                count,
                value,
            } => rom.fill(*address, *count, *value),
        }
    }
    patches.len()
}
