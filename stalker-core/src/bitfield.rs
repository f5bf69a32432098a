use bitvec::prelude::*;

/// Append-only bit sequence, most significant bit first in each byte.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Bitfield {
    bits: BitVec<u8, Msb0>,
}

impl Bitfield {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bit: bool) {
        self.bits.push(bit);
    }

    pub fn extend_from(&mut self, other: &Bitfield) {
        self.bits.extend_from_bitslice(&other.bits);
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        self.bits.get(index).map(|b| *b)
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Packed bytes; the last one is padded with zero bits.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut padded = self.bits.clone();
        let pad = (8 - padded.len() % 8) % 8;
        padded.extend(std::iter::repeat(false).take(pad));
        padded.into_vec()
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits.iter().by_vals()
    }
}

impl FromIterator<bool> for Bitfield {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        Bitfield {
            bits: iter.into_iter().collect(),
        }
    }
}
