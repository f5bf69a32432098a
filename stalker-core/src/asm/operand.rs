use std::fmt;

/// Operation size of an instruction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Size {
    Byte,
    Word,
    Long,
}

impl Size {
    /// Size field used by most arithmetic/logic opcodes (bits 7-6).
    pub fn bits(self) -> u16 {
        match self {
            Size::Byte => 0,
            Size::Word => 1,
            Size::Long => 2,
        }
    }

    /// Size field of `move` (bits 13-12), which uses its own numbering.
    pub fn move_bits(self) -> u16 {
        match self {
            Size::Byte => 1,
            Size::Word => 3,
            Size::Long => 2,
        }
    }
}

/// Register used as index in `d8(An,Xn)` addressing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IndexReg {
    D(u8),
    A(u8),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Operand {
    /// Data register direct `Dn`.
    D(u8),
    /// Address register direct `An`.
    A(u8),
    /// `(An)`
    Ind(u8),
    /// `(An)+`
    PostInc(u8),
    /// `-(An)`
    PreDec(u8),
    /// `d16(An)`
    Disp(i16, u8),
    /// `d8(An,Xn.W|L)`
    Index {
        disp: i8,
        base: u8,
        index: IndexReg,
        long_index: bool,
    },
    /// Absolute short address.
    AbsW(u16),
    /// Absolute long address.
    AbsL(u32),
    /// Immediate data. Its width follows the instruction size.
    Imm(u32),
}

impl Operand {
    pub fn mode(&self) -> u16 {
        match self {
            Operand::D(_) => 0,
            Operand::A(_) => 1,
            Operand::Ind(_) => 2,
            Operand::PostInc(_) => 3,
            Operand::PreDec(_) => 4,
            Operand::Disp(..) => 5,
            Operand::Index { .. } => 6,
            Operand::AbsW(_) | Operand::AbsL(_) | Operand::Imm(_) => 7,
        }
    }

    pub fn reg(&self) -> u16 {
        match *self {
            Operand::D(n)
            | Operand::A(n)
            | Operand::Ind(n)
            | Operand::PostInc(n)
            | Operand::PreDec(n)
            | Operand::Disp(_, n) => u16::from(n & 7),
            Operand::Index { base, .. } => u16::from(base & 7),
            Operand::AbsW(_) => 0,
            Operand::AbsL(_) => 1,
            Operand::Imm(_) => 4,
        }
    }

    /// Effective address field as found in the low bits of an opcode.
    pub fn mxn(&self) -> u16 {
        (self.mode() << 3) | self.reg()
    }

    /// Swapped form used for the destination field of `move`.
    pub fn xnm(&self) -> u16 {
        (self.reg() << 3) | self.mode()
    }

    pub fn is_data_reg(&self) -> bool {
        matches!(self, Operand::D(_))
    }

    pub fn is_addr_reg(&self) -> bool {
        matches!(self, Operand::A(_))
    }

    /// Register numbers above 7 do not exist.
    pub fn is_well_formed(&self) -> bool {
        match *self {
            Operand::D(n)
            | Operand::A(n)
            | Operand::Ind(n)
            | Operand::PostInc(n)
            | Operand::PreDec(n)
            | Operand::Disp(_, n) => n < 8,
            Operand::Index { base, index, .. } => {
                let idx = match index {
                    IndexReg::D(n) | IndexReg::A(n) => n,
                };
                base < 8 && idx < 8
            }
            _ => true,
        }
    }

    /// Addressing modes usable by `lea`, `jsr` and `jmp`.
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Operand::Ind(_)
                | Operand::Disp(..)
                | Operand::Index { .. }
                | Operand::AbsW(_)
                | Operand::AbsL(_)
        )
    }

    /// Anything that can be written to, address registers excluded.
    pub fn is_data_alterable(&self) -> bool {
        !matches!(self, Operand::A(_) | Operand::Imm(_))
    }

    /// Appends the extension words following the opcode.
    pub fn push_extension(&self, size: Size, out: &mut Vec<u8>) {
        match *self {
            Operand::Disp(d, _) => out.extend_from_slice(&d.to_be_bytes()),
            Operand::Index {
                disp,
                index,
                long_index,
                ..
            } => {
                let (is_addr, n) = match index {
                    IndexReg::D(n) => (0u16, n),
                    IndexReg::A(n) => (1u16, n),
                };
                let word = (is_addr << 15)
                    | (u16::from(n & 7) << 12)
                    | (u16::from(long_index) << 11)
                    | u16::from(disp as u8);
                out.extend_from_slice(&word.to_be_bytes());
            }
            Operand::AbsW(a) => out.extend_from_slice(&a.to_be_bytes()),
            Operand::AbsL(a) => out.extend_from_slice(&a.to_be_bytes()),
            Operand::Imm(v) => match size {
                Size::Byte => out.extend_from_slice(&[0, v as u8]),
                Size::Word => out.extend_from_slice(&(v as u16).to_be_bytes()),
                Size::Long => out.extend_from_slice(&v.to_be_bytes()),
            },
            _ => {}
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Operand::D(n) => write!(f, "d{n}"),
            Operand::A(n) => write!(f, "a{n}"),
            Operand::Ind(n) => write!(f, "(a{n})"),
            Operand::PostInc(n) => write!(f, "(a{n})+"),
            Operand::PreDec(n) => write!(f, "-(a{n})"),
            Operand::Disp(d, n) => write!(f, "{d}(a{n})"),
            Operand::Index {
                disp,
                base,
                index,
                long_index,
            } => {
                let (kind, n) = match index {
                    IndexReg::D(n) => ('d', n),
                    IndexReg::A(n) => ('a', n),
                };
                let suffix = if long_index { 'l' } else { 'w' };
                write!(f, "{disp}(a{base},{kind}{n}.{suffix})")
            }
            Operand::AbsW(a) => write!(f, "(${a:04X}).w"),
            Operand::AbsL(a) => write!(f, "(${a:08X}).l"),
            Operand::Imm(v) => write!(f, "#${v:X}"),
        }
    }
}
