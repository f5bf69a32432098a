//! Minimal 68000 assembler used to build injected routines.
//!
//! Instructions are appended to a byte buffer. Conditional and
//! unconditional branches can target either a named label or "the N-th
//! instruction from here"; the latter are kept in a pending table that is
//! aged every time a new opcode word is emitted.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

pub mod operand;

pub use operand::{IndexReg, Operand, Size};

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AsmError {
    #[error("{count} branch(es) were never resolved")]
    UnresolvedBranches { count: usize },

    #[error("label '{0}' is defined twice")]
    DuplicateLabel(String),

    #[error("invalid operand {operand} for {instruction}")]
    InvalidOperand {
        instruction: &'static str,
        operand: String,
    },

    #[error("value {value} out of range for {instruction}")]
    ValueOutOfRange {
        instruction: &'static str,
        value: i64,
    },
}

/// Branch conditions, stored as their opcode word.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Cond {
    Bra,
    Bsr,
    Hi,
    Ls,
    Cc,
    Cs,
    Ne,
    Eq,
    Pl,
    Mi,
    Ge,
    Lt,
    Gt,
    Le,
}

impl Cond {
    pub fn opcode(self) -> u16 {
        match self {
            Cond::Bra => 0x6000,
            Cond::Bsr => 0x6100,
            Cond::Hi => 0x6200,
            Cond::Ls => 0x6300,
            Cond::Cc => 0x6400,
            Cond::Cs => 0x6500,
            Cond::Ne => 0x6600,
            Cond::Eq => 0x6700,
            Cond::Pl => 0x6A00,
            Cond::Mi => 0x6B00,
            Cond::Ge => 0x6C00,
            Cond::Lt => 0x6D00,
            Cond::Gt => 0x6E00,
            Cond::Le => 0x6F00,
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Branch {
    /// Offset of the opcode word.
    at: usize,
    target: usize,
    /// An extension word holds the displacement.
    long: bool,
    /// `dbra` and friends: the opcode low byte is not a displacement.
    word_only: bool,
}

impl Branch {
    fn displacement(&self) -> i64 {
        self.target as i64 - (self.at as i64 + 2)
    }
}

#[derive(Clone, Debug)]
struct LabelRef {
    at: usize,
    label: String,
    word_only: bool,
}

fn fits_in_byte(disp: i64) -> bool {
    disp != 0 && disp != -1 && (-0x80..=0x7F).contains(&disp)
}

#[derive(Clone, Debug, Default)]
pub struct Code {
    bytes: Vec<u8>,
    /// Offset right after a branch opcode -> instructions left until its target.
    pending: BTreeMap<usize, u32>,
    resolved: Vec<Branch>,
    labels: HashMap<String, usize>,
    label_refs: Vec<LabelRef>,
    error: Option<AsmError>,
}

impl Code {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Current bytes, including unresolved displacement placeholders.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn pending_branches(&self) -> usize {
        self.pending.len() + self.label_refs.len()
    }

    /// Final bytes. Fails on the first encoding error or any unresolved branch.
    pub fn finish(&self) -> Result<Vec<u8>, AsmError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let count = self.pending_branches();
        if count > 0 {
            return Err(AsmError::UnresolvedBranches { count });
        }
        Ok(self.bytes.clone())
    }

    fn fail(&mut self, err: AsmError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn check(&mut self, instruction: &'static str, op: &Operand, ok: bool) -> bool {
        if ok && op.is_well_formed() {
            return true;
        }
        self.fail(AsmError::InvalidOperand {
            instruction,
            operand: op.to_string(),
        });
        false
    }

    /// Decrements every pending branch; those reaching zero target the
    /// instruction about to be emitted.
    pub fn age_pending_branches(&mut self) {
        let target = self.bytes.len();
        let mut due = Vec::new();
        for (&key, remaining) in self.pending.iter_mut() {
            debug_assert!(*remaining > 0, "pending branch count underflow");
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                due.push(key);
            }
        }
        if due.is_empty() {
            return;
        }
        for key in due {
            self.pending.remove(&key);
            self.resolved.push(Branch {
                at: key - 2,
                target,
                long: false,
                word_only: false,
            });
        }
        self.settle();
    }

    fn opcode(&mut self, word: u16) {
        self.age_pending_branches();
        self.bytes.extend_from_slice(&word.to_be_bytes());
    }

    fn extension(&mut self, op: &Operand, size: Size) {
        op.push_extension(size, &mut self.bytes);
    }

    /// Opens a two byte hole at `at` and moves every recorded offset behind it.
    fn insert_extension_word(&mut self, at: usize) {
        self.bytes.splice(at..at, [0u8, 0u8]);

        self.pending = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(key, n)| if key > at { (key + 2, n) } else { (key, n) })
            .collect();
        for branch in &mut self.resolved {
            if branch.at >= at {
                branch.at += 2;
            }
            if branch.target >= at {
                branch.target += 2;
            }
        }
        for offset in self.labels.values_mut() {
            if *offset >= at {
                *offset += 2;
            }
        }
        for r in &mut self.label_refs {
            if r.at >= at {
                r.at += 2;
            }
        }
    }

    /// Promotes short branches that no longer fit, then rewrites every
    /// displacement.
    fn settle(&mut self) {
        loop {
            let promote = self
                .resolved
                .iter()
                .position(|b| !b.long && !fits_in_byte(b.displacement()));
            match promote {
                Some(i) => {
                    let at = self.resolved[i].at + 2;
                    self.insert_extension_word(at);
                    self.resolved[i].long = true;
                }
                None => break,
            }
        }

        for i in 0..self.resolved.len() {
            let branch = self.resolved[i];
            let disp = branch.displacement();
            if branch.long {
                if !(-0x8000..=0x7FFF).contains(&disp) {
                    self.fail(AsmError::ValueOutOfRange {
                        instruction: "branch",
                        value: disp,
                    });
                    continue;
                }
                if !branch.word_only {
                    self.bytes[branch.at + 1] = 0;
                }
                let word = (disp as i16).to_be_bytes();
                self.bytes[branch.at + 2..branch.at + 4].copy_from_slice(&word);
            } else {
                self.bytes[branch.at + 1] = disp as i8 as u8;
            }
        }
    }

    /// Marks the position of the next instruction.
    pub fn label(&mut self, name: &str) -> &mut Self {
        let here = self.bytes.len();
        if self.labels.insert(name.to_string(), here).is_some() {
            self.fail(AsmError::DuplicateLabel(name.to_string()));
            return self;
        }

        let (hits, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.label_refs)
            .into_iter()
            .partition(|r| r.label == name);
        self.label_refs = rest;
        if hits.is_empty() {
            return self;
        }
        for r in hits {
            self.resolved.push(Branch {
                at: r.at,
                target: here,
                long: r.word_only,
                word_only: r.word_only,
            });
        }
        self.settle();
        self
    }

    /// Branch to the `count`-th instruction after this one. Zero means the
    /// very next instruction, resolved on the spot.
    pub fn branch(&mut self, cond: Cond, count: u32) -> &mut Self {
        self.opcode(cond.opcode());
        let after = self.bytes.len();
        if count == 0 {
            self.resolved.push(Branch {
                at: after - 2,
                target: after,
                long: false,
                word_only: false,
            });
            self.settle();
        } else {
            self.pending.insert(after, count);
        }
        self
    }

    pub fn branch_to(&mut self, cond: Cond, label: &str) -> &mut Self {
        self.opcode(cond.opcode());
        let at = self.bytes.len() - 2;
        self.reference_label(at, label, false);
        self
    }

    fn reference_label(&mut self, at: usize, label: &str, word_only: bool) {
        match self.labels.get(label) {
            Some(&target) => {
                self.resolved.push(Branch {
                    at,
                    target,
                    long: word_only,
                    word_only,
                });
                self.settle();
            }
            None => self.label_refs.push(LabelRef {
                at,
                label: label.to_string(),
                word_only,
            }),
        }
    }

    pub fn bra(&mut self, count: u32) -> &mut Self {
        self.branch(Cond::Bra, count)
    }

    pub fn beq(&mut self, count: u32) -> &mut Self {
        self.branch(Cond::Eq, count)
    }

    pub fn bne(&mut self, count: u32) -> &mut Self {
        self.branch(Cond::Ne, count)
    }

    /// `dbra Dn, label` (always word displacement).
    pub fn dbra(&mut self, dn: u8, label: &str) -> &mut Self {
        let op = Operand::D(dn);
        if !self.check("dbra", &op, true) {
            return self;
        }
        self.opcode(0x51C8 | u16::from(dn));
        let at = self.bytes.len() - 2;
        self.bytes.extend_from_slice(&[0, 0]);
        self.reference_label(at, label, true);
        self
    }

    pub fn mov(&mut self, size: Size, src: Operand, dst: Operand) -> &mut Self {
        let dst_ok = match dst {
            Operand::A(_) => size != Size::Byte,
            Operand::Imm(_) => false,
            _ => true,
        };
        let src_ok = !(src.is_addr_reg() && size == Size::Byte);
        if !self.check("move", &src, src_ok) || !self.check("move", &dst, dst_ok) {
            return self;
        }
        self.opcode((size.move_bits() << 12) | (dst.xnm() << 6) | src.mxn());
        self.extension(&src, size);
        self.extension(&dst, size);
        self
    }

    pub fn moveq(&mut self, value: i8, dn: u8) -> &mut Self {
        if !self.check("moveq", &Operand::D(dn), true) {
            return self;
        }
        self.opcode(0x7000 | (u16::from(dn) << 9) | u16::from(value as u8));
        self
    }

    fn movem_mask(&mut self, regs: &[Operand], to_stack: bool) -> Option<u16> {
        let mut mask = 0u16;
        for reg in regs {
            let bit = match *reg {
                Operand::D(n) if n < 8 => {
                    if to_stack {
                        0x8000 >> n
                    } else {
                        1 << n
                    }
                }
                Operand::A(n) if n < 8 => {
                    if to_stack {
                        0x0080 >> n
                    } else {
                        0x0100 << n
                    }
                }
                _ => {
                    self.check("movem", reg, false);
                    return None;
                }
            };
            mask |= bit;
        }
        Some(mask)
    }

    /// `movem.l regs, -(sp)`
    pub fn movem_to_stack(&mut self, regs: &[Operand]) -> &mut Self {
        if let Some(mask) = self.movem_mask(regs, true) {
            self.opcode(0x48E7);
            self.bytes.extend_from_slice(&mask.to_be_bytes());
        }
        self
    }

    /// `movem.l (sp)+, regs`
    pub fn movem_from_stack(&mut self, regs: &[Operand]) -> &mut Self {
        if let Some(mask) = self.movem_mask(regs, false) {
            self.opcode(0x4CDF);
            self.bytes.extend_from_slice(&mask.to_be_bytes());
        }
        self
    }

    pub fn lea(&mut self, src: Operand, an: u8) -> &mut Self {
        if !self.check("lea", &src, src.is_control())
            || !self.check("lea", &Operand::A(an), true)
        {
            return self;
        }
        self.opcode(0x41C0 | (u16::from(an) << 9) | src.mxn());
        self.extension(&src, Size::Long);
        self
    }

    pub fn jsr(&mut self, target: Operand) -> &mut Self {
        self.jump_like("jsr", 0x4E80, target)
    }

    pub fn jmp(&mut self, target: Operand) -> &mut Self {
        self.jump_like("jmp", 0x4EC0, target)
    }

    fn jump_like(&mut self, name: &'static str, base: u16, target: Operand) -> &mut Self {
        if !self.check(name, &target, target.is_control()) {
            return self;
        }
        self.opcode(base | target.mxn());
        self.extension(&target, Size::Long);
        self
    }

    /// `<op>.size <ea>, Dn` family (add, sub, cmp, and, or).
    fn ea_to_dn(
        &mut self,
        name: &'static str,
        base: u16,
        size: Size,
        src: Operand,
        dn: u8,
    ) -> &mut Self {
        let src_ok = !(src.is_addr_reg() && size == Size::Byte);
        if !self.check(name, &src, src_ok) || !self.check(name, &Operand::D(dn), true) {
            return self;
        }
        self.opcode(base | (u16::from(dn) << 9) | (size.bits() << 6) | src.mxn());
        self.extension(&src, size);
        self
    }

    pub fn add(&mut self, size: Size, src: Operand, dn: u8) -> &mut Self {
        self.ea_to_dn("add", 0xD000, size, src, dn)
    }

    pub fn sub(&mut self, size: Size, src: Operand, dn: u8) -> &mut Self {
        self.ea_to_dn("sub", 0x9000, size, src, dn)
    }

    pub fn cmp(&mut self, size: Size, src: Operand, dn: u8) -> &mut Self {
        self.ea_to_dn("cmp", 0xB000, size, src, dn)
    }

    pub fn and(&mut self, size: Size, src: Operand, dn: u8) -> &mut Self {
        self.ea_to_dn("and", 0xC000, size, src, dn)
    }

    pub fn or(&mut self, size: Size, src: Operand, dn: u8) -> &mut Self {
        self.ea_to_dn("or", 0x8000, size, src, dn)
    }

    /// `<op>a.size <ea>, An` family (adda, suba, cmpa).
    fn ea_to_an(
        &mut self,
        name: &'static str,
        base: u16,
        size: Size,
        src: Operand,
        an: u8,
    ) -> &mut Self {
        if !self.check(name, &Operand::A(an), size != Size::Byte)
            || !self.check(name, &src, true)
        {
            return self;
        }
        let long = if size == Size::Long { 0x100 } else { 0 };
        self.opcode(base | (u16::from(an) << 9) | long | src.mxn());
        self.extension(&src, size);
        self
    }

    pub fn adda(&mut self, size: Size, src: Operand, an: u8) -> &mut Self {
        self.ea_to_an("adda", 0xD0C0, size, src, an)
    }

    pub fn suba(&mut self, size: Size, src: Operand, an: u8) -> &mut Self {
        self.ea_to_an("suba", 0x90C0, size, src, an)
    }

    pub fn cmpa(&mut self, size: Size, src: Operand, an: u8) -> &mut Self {
        self.ea_to_an("cmpa", 0xB0C0, size, src, an)
    }

    /// `<op>i.size #imm, <ea>` family.
    fn immediate(
        &mut self,
        name: &'static str,
        base: u16,
        size: Size,
        value: u32,
        dst: Operand,
    ) -> &mut Self {
        if !self.check(name, &dst, dst.is_data_alterable()) {
            return self;
        }
        self.opcode(base | (size.bits() << 6) | dst.mxn());
        self.extension(&Operand::Imm(value), size);
        self.extension(&dst, size);
        self
    }

    pub fn addi(&mut self, size: Size, value: u32, dst: Operand) -> &mut Self {
        self.immediate("addi", 0x0600, size, value, dst)
    }

    pub fn subi(&mut self, size: Size, value: u32, dst: Operand) -> &mut Self {
        self.immediate("subi", 0x0400, size, value, dst)
    }

    pub fn cmpi(&mut self, size: Size, value: u32, dst: Operand) -> &mut Self {
        self.immediate("cmpi", 0x0C00, size, value, dst)
    }

    pub fn andi(&mut self, size: Size, value: u32, dst: Operand) -> &mut Self {
        self.immediate("andi", 0x0200, size, value, dst)
    }

    pub fn ori(&mut self, size: Size, value: u32, dst: Operand) -> &mut Self {
        self.immediate("ori", 0x0000, size, value, dst)
    }

    fn quick(&mut self, name: &'static str, base: u16, size: Size, value: u8, dst: Operand) -> &mut Self {
        if !(1..=8).contains(&value) {
            self.fail(AsmError::ValueOutOfRange {
                instruction: name,
                value: i64::from(value),
            });
            return self;
        }
        let dst_ok = !matches!(dst, Operand::Imm(_)) && !(dst.is_addr_reg() && size == Size::Byte);
        if !self.check(name, &dst, dst_ok) {
            return self;
        }
        let data = u16::from(value & 7);
        self.opcode(base | (data << 9) | (size.bits() << 6) | dst.mxn());
        self.extension(&dst, size);
        self
    }

    pub fn addq(&mut self, size: Size, value: u8, dst: Operand) -> &mut Self {
        self.quick("addq", 0x5000, size, value, dst)
    }

    pub fn subq(&mut self, size: Size, value: u8, dst: Operand) -> &mut Self {
        self.quick("subq", 0x5100, size, value, dst)
    }

    fn single_ea(&mut self, name: &'static str, base: u16, size: Size, op: Operand) -> &mut Self {
        if !self.check(name, &op, op.is_data_alterable()) {
            return self;
        }
        self.opcode(base | (size.bits() << 6) | op.mxn());
        self.extension(&op, size);
        self
    }

    pub fn tst(&mut self, size: Size, op: Operand) -> &mut Self {
        self.single_ea("tst", 0x4A00, size, op)
    }

    pub fn clr(&mut self, size: Size, op: Operand) -> &mut Self {
        self.single_ea("clr", 0x4200, size, op)
    }

    /// Bit operations; `bit` is either `Imm(n)` or `D(n)`.
    fn bit_op(
        &mut self,
        name: &'static str,
        imm_base: u16,
        reg_base: u16,
        bit: Operand,
        dst: Operand,
    ) -> &mut Self {
        if !self.check(name, &dst, !matches!(dst, Operand::A(_))) {
            return self;
        }
        // Size only matters for the extension words of `dst`.
        let size = if dst.is_data_reg() { Size::Long } else { Size::Byte };
        match bit {
            Operand::Imm(n) => {
                self.opcode(imm_base | dst.mxn());
                self.bytes.extend_from_slice(&(n as u16 & 0xFF).to_be_bytes());
            }
            Operand::D(n) if n < 8 => {
                self.opcode(reg_base | (u16::from(n) << 9) | dst.mxn());
            }
            other => {
                self.check(name, &other, false);
                return self;
            }
        }
        self.extension(&dst, size);
        self
    }

    pub fn btst(&mut self, bit: Operand, dst: Operand) -> &mut Self {
        self.bit_op("btst", 0x0800, 0x0100, bit, dst)
    }

    pub fn bclr(&mut self, bit: Operand, dst: Operand) -> &mut Self {
        self.bit_op("bclr", 0x0880, 0x0180, bit, dst)
    }

    pub fn bset(&mut self, bit: Operand, dst: Operand) -> &mut Self {
        self.bit_op("bset", 0x08C0, 0x01C0, bit, dst)
    }

    pub fn mulu(&mut self, src: Operand, dn: u8) -> &mut Self {
        self.ea_word_to_dn("mulu", 0xC0C0, src, dn)
    }

    pub fn divu(&mut self, src: Operand, dn: u8) -> &mut Self {
        self.ea_word_to_dn("divu", 0x80C0, src, dn)
    }

    fn ea_word_to_dn(&mut self, name: &'static str, base: u16, src: Operand, dn: u8) -> &mut Self {
        if !self.check(name, &src, !src.is_addr_reg()) || !self.check(name, &Operand::D(dn), true) {
            return self;
        }
        self.opcode(base | (u16::from(dn) << 9) | src.mxn());
        self.extension(&src, Size::Word);
        self
    }

    pub fn ext(&mut self, size: Size, dn: u8) -> &mut Self {
        if !self.check("ext", &Operand::D(dn), size != Size::Byte) {
            return self;
        }
        let base = if size == Size::Long { 0x48C0 } else { 0x4880 };
        self.opcode(base | u16::from(dn));
        self
    }

    pub fn swap(&mut self, dn: u8) -> &mut Self {
        if !self.check("swap", &Operand::D(dn), true) {
            return self;
        }
        self.opcode(0x4840 | u16::from(dn));
        self
    }

    pub fn trap(&mut self, vector: u8) -> &mut Self {
        if vector > 15 {
            self.fail(AsmError::ValueOutOfRange {
                instruction: "trap",
                value: i64::from(vector),
            });
            return self;
        }
        self.opcode(0x4E40 | u16::from(vector));
        self
    }

    pub fn rts(&mut self) -> &mut Self {
        self.opcode(0x4E75);
        self
    }

    pub fn rte(&mut self) -> &mut Self {
        self.opcode(0x4E73);
        self
    }

    pub fn nop(&mut self) -> &mut Self {
        self.opcode(0x4E71);
        self
    }
}
