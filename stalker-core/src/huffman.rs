//! Context-dependent Huffman coding of game text.
//!
//! Each symbol owns its own tree used to encode whatever symbol follows it.
//! Strings start with [`EOS`] as previous symbol and end with it.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use bitreader::BitReader;
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bitfield::Bitfield;
use crate::rom::GameRom;

pub const SYMBOL_COUNT: usize = 101;

/// Entries in the tree offset table. Slots past [`SYMBOL_COUNT`] stay empty.
pub const TREE_SLOTS: usize = 108;

/// End of string, also the previous symbol before the first character.
pub const EOS: u8 = 0x55;

pub const TREE_OFFSETS_START: u32 = 0x23D60;
pub const TREE_DATA_START: u32 = 0x23E38;
pub const TREE_DATA_END: u32 = 0x2469C;

const NO_TREE: u16 = 0xFFFF;

/// Character for each symbol code. `'\0'` marks codes the game never uses.
pub const SYMBOL_TABLE: [char; SYMBOL_COUNT] = [
    ' ', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H',
    'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'a',
    'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't',
    'u', 'v', 'w', 'x', 'y', 'z', '*', '.', ',', '?', '!', '/', '<', '>', ':', '-', '\'', '"', '%',
    '#', '&', '(', ')', '=',
    '\x10', // up-left arrow
    '\x11', // up-right arrow
    '\x12', // down-right arrow
    '\x13', // down-left arrow
    '\x02', // end of string
    '\x18', // cursor
    '\x0A', // line feed
    '\x19', // yes/no prompt
    '\x1A', // long delay
    '\x1B', // number
    '\x1C', // character name
    '\0', '\0',
    '\x03', // end of sentence
    '\x1D', // item name
    '\0', '\0',
    '\x1E', // clear panel
    '\0',
    '\x1F', // short delay
];

pub fn symbol_for_char(c: char) -> Option<u8> {
    if c == '\0' {
        return None;
    }
    SYMBOL_TABLE.iter().position(|&s| s == c).map(|i| i as u8)
}

pub fn char_for_symbol(symbol: u8) -> Option<char> {
    SYMBOL_TABLE
        .get(symbol as usize)
        .copied()
        .filter(|&c| c != '\0')
}

fn describe(symbol: u8) -> String {
    match char_for_symbol(symbol) {
        Some(c) if !c.is_control() => format!("'{c}'"),
        _ => format!("<{symbol:#04X}>"),
    }
}

#[derive(Debug, Error)]
pub enum TextError {
    #[error("huffman tree at offset {offset:#X} runs past the tree data")]
    TruncatedTree { offset: usize },

    #[error("huffman tree data is {size} bytes, only {capacity} bytes are available")]
    TreeDataTooLarge { size: usize, capacity: usize },

    #[error("symbol {next} never follows {previous} in the trained trees")]
    MissingTransition { previous: String, next: String },

    #[error("cannot terminate string {text:?}: no end-of-string transition")]
    UnterminatedString { text: String },

    #[error("line {index} compresses to {len} bytes, a line holds at most 254")]
    LineTooLong { index: usize, len: usize },

    #[error("text banks need {size} bytes, only {capacity} bytes are available")]
    TextAreaOverflow { size: usize, capacity: usize },

    #[error("text needs {count} banks, the pointer table holds {max}")]
    TooManyBanks { count: usize, max: usize },

    #[error("bank {bank} points at {address:#08X}, outside the text area")]
    InvalidBankPointer { bank: usize, address: u32 },
}

/// How to react to a character pair the trees cannot express.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncodeMode {
    /// Drop the symbol and keep going.
    #[default]
    Lenient,
    /// Refuse to encode the string.
    Strict,
}

/// Why decoding a string stopped before its terminator.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DecodeAnomaly {
    /// No tree exists for the previous symbol.
    MissingTree { previous: u8 },
    /// The line ended in the middle of a code.
    OutOfBits { previous: u8 },
    /// A tree produced a code outside the alphabet.
    UnknownSymbol { symbol: u8 },
    /// Bail-out for trees that keep producing zero-length codes.
    SymbolLimit,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedString {
    pub text: String,
    pub anomaly: Option<DecodeAnomaly>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Node {
    Branch { left: usize, right: usize },
    Leaf(u8),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HuffmanTree {
    nodes: Vec<Node>,
    root: usize,
    codes: BTreeMap<u8, Bitfield>,
}

impl HuffmanTree {
    /// Reads a tree stored with its node bits starting at `offset` and its
    /// leaf symbols laid out backwards right before it.
    pub fn parse(data: &[u8], offset: usize) -> Result<Self, TextError> {
        let node_bytes = data.get(offset..).ok_or(TextError::TruncatedTree { offset })?;
        let mut reader = BitReader::new(node_bytes);
        let mut nodes = Vec::new();
        let mut leaves = 0usize;
        let root = parse_node(&mut reader, data, offset, &mut nodes, &mut leaves, 0)?;
        Ok(Self::with_codes(nodes, root))
    }

    /// Classic Huffman construction over `(symbol, frequency)` pairs.
    /// Equal weights are merged in creation order, so the result only
    /// depends on the input order.
    pub fn build(counts: &[(u8, u32)]) -> Option<Self> {
        if counts.is_empty() {
            return None;
        }
        let mut nodes: Vec<Node> = counts.iter().map(|&(s, _)| Node::Leaf(s)).collect();
        let mut heap: BinaryHeap<Reverse<(u64, usize)>> = counts
            .iter()
            .enumerate()
            .map(|(i, &(_, c))| Reverse((u64::from(c), i)))
            .collect();

        while heap.len() > 1 {
            let (Some(Reverse((w1, a))), Some(Reverse((w2, b)))) = (heap.pop(), heap.pop()) else {
                break;
            };
            nodes.push(Node::Branch { left: a, right: b });
            heap.push(Reverse((w1 + w2, nodes.len() - 1)));
        }

        let root = heap.pop().map(|Reverse((_, i))| i)?;
        Some(Self::with_codes(nodes, root))
    }

    fn with_codes(nodes: Vec<Node>, root: usize) -> Self {
        let mut tree = HuffmanTree {
            nodes,
            root,
            codes: BTreeMap::new(),
        };
        let mut stack = vec![(root, Bitfield::new())];
        while let Some((idx, path)) = stack.pop() {
            match tree.nodes[idx] {
                Node::Leaf(symbol) => {
                    tree.codes.entry(symbol).or_insert(path);
                }
                Node::Branch { left, right } => {
                    let mut right_path = path.clone();
                    right_path.push(true);
                    let mut left_path = path;
                    left_path.push(false);
                    stack.push((right, right_path));
                    stack.push((left, left_path));
                }
            }
        }
        tree
    }

    pub fn encode(&self, symbol: u8) -> Option<&Bitfield> {
        self.codes.get(&symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = u8> + '_ {
        self.codes.keys().copied()
    }

    /// Walks the tree one bit at a time. `None` once the reader runs dry.
    pub fn decode_next(&self, reader: &mut BitReader<'_>) -> Option<u8> {
        let mut current = self.root;
        loop {
            match self.nodes[current] {
                Node::Leaf(symbol) => return Some(symbol),
                Node::Branch { left, right } => {
                    let bit = reader.read_bool().ok()?;
                    current = if bit { right } else { left };
                }
            }
        }
    }

    fn preorder(&self, mut visit: impl FnMut(&Node)) {
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            visit(node);
            if let Node::Branch { left, right } = *node {
                stack.push(right);
                stack.push(left);
            }
        }
    }

    /// Leaf symbols in reverse preorder.
    pub fn symbol_bytes(&self) -> Vec<u8> {
        let mut symbols = Vec::new();
        self.preorder(|node| {
            if let Node::Leaf(s) = node {
                symbols.push(*s);
            }
        });
        symbols.reverse();
        symbols
    }

    /// Preorder node bits (0 = branch, 1 = leaf), zero padded.
    pub fn node_bytes(&self) -> Vec<u8> {
        let mut bits = Bitfield::new();
        self.preorder(|node| bits.push(matches!(node, Node::Leaf(_))));
        bits.to_bytes()
    }
}

fn parse_node(
    reader: &mut BitReader<'_>,
    data: &[u8],
    offset: usize,
    nodes: &mut Vec<Node>,
    leaves: &mut usize,
    depth: usize,
) -> Result<usize, TextError> {
    // A sane tree never gets deeper than the alphabet is large.
    if depth > TREE_SLOTS {
        return Err(TextError::TruncatedTree { offset });
    }
    let is_leaf = reader
        .read_bool()
        .map_err(|_| TextError::TruncatedTree { offset })?;

    if is_leaf {
        let symbol = offset
            .checked_sub(*leaves + 1)
            .and_then(|i| data.get(i))
            .copied()
            .ok_or(TextError::TruncatedTree { offset })?;
        *leaves += 1;
        nodes.push(Node::Leaf(symbol));
        return Ok(nodes.len() - 1);
    }

    let idx = nodes.len();
    nodes.push(Node::Branch { left: 0, right: 0 });
    let left = parse_node(reader, data, offset, nodes, leaves, depth + 1)?;
    let right = parse_node(reader, data, offset, nodes, leaves, depth + 1)?;
    nodes[idx] = Node::Branch { left, right };
    Ok(idx)
}

/// Converts text to symbol codes, skipping characters outside the alphabet
/// and end-of-string markers, which only ever close a string.
pub fn text_to_symbols(text: &str) -> Vec<u8> {
    let mut symbols = Vec::with_capacity(text.len() + 1);
    for c in text.chars() {
        match symbol_for_char(c) {
            Some(EOS) => warn!("end-of-string marker inside {text:?} is skipped"),
            Some(s) => symbols.push(s),
            None => warn!("character {c:?} in {text:?} has no symbol and is skipped"),
        }
    }
    symbols
}

/// One optional tree per previous symbol.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HuffmanTrees {
    trees: Vec<Option<HuffmanTree>>,
}

impl Default for HuffmanTrees {
    fn default() -> Self {
        HuffmanTrees {
            trees: vec![None; TREE_SLOTS],
        }
    }
}

impl HuffmanTrees {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn tree(&self, previous: u8) -> Option<&HuffmanTree> {
        self.trees.get(previous as usize).and_then(Option::as_ref)
    }

    pub fn set_tree(&mut self, previous: u8, tree: Option<HuffmanTree>) {
        if let Some(slot) = self.trees.get_mut(previous as usize) {
            *slot = tree;
        }
    }

    pub fn parse_from_rom(rom: &GameRom) -> Result<Self, TextError> {
        let data = rom.chunk(TREE_DATA_START, (TREE_DATA_END - TREE_DATA_START) as usize);
        let mut trees = Self::empty();
        for slot in 0..TREE_SLOTS {
            let offset = rom.word(TREE_OFFSETS_START + 2 * slot as u32);
            if offset == NO_TREE {
                continue;
            }
            trees.trees[slot] = Some(HuffmanTree::parse(&data, offset as usize)?);
        }
        Ok(trees)
    }

    /// Counts which symbol follows which across the corpus and builds one
    /// tree per previous symbol.
    pub fn build_from_corpus<S: AsRef<str>>(strings: &[S]) -> Self {
        let mut counts = vec![[0u32; SYMBOL_COUNT]; SYMBOL_COUNT];
        for string in strings {
            let mut previous = EOS;
            for symbol in text_to_symbols(string.as_ref()).into_iter().chain([EOS]) {
                counts[previous as usize][symbol as usize] += 1;
                previous = symbol;
            }
        }

        let mut trees = Self::empty();
        for (previous, row) in counts.iter().enumerate() {
            let mut followers: Vec<(u8, u32)> = row
                .iter()
                .enumerate()
                .filter(|(_, &n)| n > 0)
                .map(|(s, &n)| (s as u8, n))
                .collect();
            // most frequent first, lower symbol first on ties
            followers.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            trees.trees[previous] = HuffmanTree::build(&followers);
        }
        trees
    }

    /// Offset table and tree data block, in ROM layout.
    pub fn serialize(&self) -> (Vec<u16>, Vec<u8>) {
        let mut offsets = Vec::with_capacity(TREE_SLOTS);
        let mut data = Vec::new();
        for tree in &self.trees {
            match tree {
                None => offsets.push(NO_TREE),
                Some(tree) => {
                    data.extend(tree.symbol_bytes());
                    offsets.push(data.len() as u16);
                    data.extend(tree.node_bytes());
                }
            }
        }
        (offsets, data)
    }

    pub fn write_to_rom(&self, rom: &mut GameRom) -> Result<(), TextError> {
        let (offsets, data) = self.serialize();
        let capacity = (TREE_DATA_END - TREE_DATA_START) as usize;
        if data.len() > capacity {
            return Err(TextError::TreeDataTooLarge {
                size: data.len(),
                capacity,
            });
        }
        for (i, offset) in offsets.iter().enumerate() {
            rom.set_word(TREE_OFFSETS_START + 2 * i as u32, *offset);
        }
        rom.set_bytes(TREE_DATA_START, &data);
        Ok(())
    }

    /// Compresses one string, terminator included, into zero padded bytes.
    pub fn encode_string(&self, text: &str, mode: TextEncodeMode) -> Result<Vec<u8>, TextError> {
        let mut bits = Bitfield::new();
        let mut previous = EOS;
        for symbol in text_to_symbols(text) {
            match self.tree(previous).and_then(|t| t.encode(symbol)) {
                Some(code) => {
                    bits.extend_from(code);
                    previous = symbol;
                }
                None if mode == TextEncodeMode::Strict => {
                    return Err(TextError::MissingTransition {
                        previous: describe(previous),
                        next: describe(symbol),
                    });
                }
                None => warn!(
                    "{} cannot follow {} in {text:?}, symbol dropped",
                    describe(symbol),
                    describe(previous)
                ),
            }
        }

        let end = self
            .tree(previous)
            .and_then(|t| t.encode(EOS))
            .ok_or_else(|| TextError::UnterminatedString {
                text: text.to_string(),
            })?;
        bits.extend_from(end);
        Ok(bits.to_bytes())
    }

    /// Decodes one compressed string. Never loops forever and never panics
    /// on malformed input; the reason for an early stop is reported.
    pub fn decode_string(&self, bytes: &[u8]) -> DecodedString {
        let mut reader = BitReader::new(bytes);
        let mut text = String::new();
        let mut previous = EOS;
        let limit = bytes.len() * 8 + TREE_SLOTS;

        for _ in 0..limit {
            let Some(tree) = self.tree(previous) else {
                return DecodedString {
                    text,
                    anomaly: Some(DecodeAnomaly::MissingTree { previous }),
                };
            };
            let Some(symbol) = tree.decode_next(&mut reader) else {
                return DecodedString {
                    text,
                    anomaly: Some(DecodeAnomaly::OutOfBits { previous }),
                };
            };
            if symbol == EOS {
                return DecodedString { text, anomaly: None };
            }
            match char_for_symbol(symbol) {
                Some(c) => text.push(c),
                None => {
                    return DecodedString {
                        text,
                        anomaly: Some(DecodeAnomaly::UnknownSymbol { symbol }),
                    }
                }
            }
            previous = symbol;
        }

        DecodedString {
            text,
            anomaly: Some(DecodeAnomaly::SymbolLimit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn sym(c: char) -> u8 {
        symbol_for_char(c).unwrap()
    }

    #[test]
    fn alphabet_layout() {
        assert_eq!(sym(' '), 0);
        assert_eq!(sym('A'), 11);
        assert_eq!(sym('a'), 37);
        assert_eq!(sym('='), 80);
        assert_eq!(sym('\x02'), EOS);
        assert_eq!(sym('\x1F'), 100);
        assert_eq!(symbol_for_char('\0'), None);
        assert_eq!(symbol_for_char('~'), None);
    }

    #[test]
    fn builds_classic_huffman_tree() {
        let (a, b, c) = (sym('a'), sym('b'), sym('c'));
        let tree = HuffmanTree::build(&[(a, 5), (b, 2), (c, 1)]).unwrap();

        assert_eq!(tree.encode(a).unwrap().len(), 1);
        assert_eq!(tree.encode(b).unwrap().len(), 2);
        assert_eq!(tree.encode(c).unwrap().len(), 2);
        assert_eq!(tree.symbol_bytes(), vec![a, b, c]);
        assert_eq!(tree.node_bytes(), vec![0b0011_1000]);
    }

    #[test]
    fn tree_build_is_deterministic() {
        let counts: Vec<(u8, u32)> = (0..20u8).map(|s| (s, u32::from(s % 4) + 1)).collect();
        let first = HuffmanTree::build(&counts).unwrap();
        let second = HuffmanTree::build(&counts).unwrap();
        assert_eq!(first.symbol_bytes(), second.symbol_bytes());
        assert_eq!(first.node_bytes(), second.node_bytes());
    }

    #[test]
    fn serialized_tree_parses_back() {
        let counts = [(sym('e'), 9), (sym('t'), 7), (sym(' '), 4), (sym('x'), 1), (EOS, 3)];
        let tree = HuffmanTree::build(&counts).unwrap();
        let mut data = tree.symbol_bytes();
        let offset = data.len();
        data.extend(tree.node_bytes());

        let parsed = HuffmanTree::parse(&data, offset).unwrap();
        for (symbol, _) in counts {
            assert_eq!(parsed.encode(symbol), tree.encode(symbol));
        }
    }

    #[test]
    fn single_symbol_tree_has_empty_code() {
        let tree = HuffmanTree::build(&[(sym('q'), 3)]).unwrap();
        assert!(tree.encode(sym('q')).unwrap().is_empty());
        assert_eq!(tree.node_bytes(), vec![0b1000_0000]);

        let mut data = tree.symbol_bytes();
        data.extend(tree.node_bytes());
        assert_eq!(HuffmanTree::parse(&data, 1).unwrap(), tree);
    }

    #[test]
    fn truncated_tree_is_an_error() {
        // Three branch bits and nothing else.
        let data = [0b0000_0000];
        assert!(matches!(
            HuffmanTree::parse(&data, 0),
            Err(TextError::TruncatedTree { .. })
        ));
    }

    #[test]
    fn round_trips_corpus_strings() {
        let corpus = [
            "Hello, Nigel!",
            "Welcome to Massan.\x0AThe elder awaits.",
            "You got 200 golds.\x03",
            "Hello Friday",
        ];
        let trees = HuffmanTrees::build_from_corpus(&corpus);
        for line in corpus {
            let bytes = trees.encode_string(line, TextEncodeMode::Strict).unwrap();
            let decoded = trees.decode_string(&bytes);
            assert_eq!(decoded.anomaly, None);
            assert_eq!(decoded.text, line);
        }
    }

    #[test]
    fn rom_round_trip_of_trees() {
        let trees = HuffmanTrees::build_from_corpus(&["Landstalker", "King Nole's treasure"]);
        let mut rom = GameRom::blank();
        trees.write_to_rom(&mut rom).unwrap();
        let parsed = HuffmanTrees::parse_from_rom(&rom).unwrap();
        assert_eq!(parsed.serialize(), trees.serialize());
        assert_eq!(rom.word(TREE_OFFSETS_START + 2 * 107), 0xFFFF);
    }

    #[test]
    fn lenient_mode_drops_untrained_pairs() {
        let trees = HuffmanTrees::build_from_corpus(&["ab", "a"]);

        let lenient = trees.encode_string("ba", TextEncodeMode::Lenient).unwrap();
        assert_eq!(trees.decode_string(&lenient).text, "a");

        let strict = trees.encode_string("ba", TextEncodeMode::Strict);
        assert!(matches!(strict, Err(TextError::MissingTransition { .. })));
    }

    #[test]
    fn unknown_characters_are_skipped() {
        let trees = HuffmanTrees::build_from_corpus(&["ab", "a"]);
        let plain = trees.encode_string("a", TextEncodeMode::Strict).unwrap();
        let noisy = trees.encode_string("a~", TextEncodeMode::Strict).unwrap();
        assert_eq!(plain, noisy);
    }

    #[test]
    fn missing_terminator_is_always_an_error() {
        let trees = HuffmanTrees::build_from_corpus(&["ab"]);
        let res = trees.encode_string("a", TextEncodeMode::Lenient);
        assert!(matches!(res, Err(TextError::UnterminatedString { .. })));
    }

    #[test]
    fn empty_tree_decode_reports_anomaly() {
        let trees = HuffmanTrees::empty();
        let decoded = trees.decode_string(&[0xFF, 0x00]);
        assert_eq!(decoded.text, "");
        assert_eq!(
            decoded.anomaly,
            Some(DecodeAnomaly::MissingTree { previous: EOS })
        );
    }

    #[test]
    fn decode_stops_when_bits_run_out() {
        let trees = HuffmanTrees::build_from_corpus(&["abc", "abd", "b"]);
        let decoded = trees.decode_string(&[]);
        assert!(matches!(
            decoded.anomaly,
            Some(DecodeAnomaly::OutOfBits { .. })
        ));
    }

    #[test]
    fn zero_length_code_cycles_terminate() {
        let a = sym('a');
        let mut trees = HuffmanTrees::empty();
        trees.set_tree(EOS, HuffmanTree::build(&[(a, 1)]));
        trees.set_tree(a, HuffmanTree::build(&[(a, 1)]));
        let decoded = trees.decode_string(&[0x00]);
        assert_eq!(decoded.anomaly, Some(DecodeAnomaly::SymbolLimit));
    }

    #[test]
    fn embedded_end_marker_does_not_cut_the_string() {
        let trees = HuffmanTrees::build_from_corpus(&["ab", "a\x02b"]);
        assert_eq!(text_to_symbols("a\x02b"), vec![sym('a'), sym('b')]);

        let bytes = trees.encode_string("a\x02b", TextEncodeMode::Strict).unwrap();
        assert_eq!(bytes, trees.encode_string("ab", TextEncodeMode::Strict).unwrap());
        let decoded = trees.decode_string(&bytes);
        assert_eq!(decoded.text, "ab");
        assert_eq!(decoded.anomaly, None);
    }

    #[test]
    fn oversized_tree_data_is_rejected_before_writing() {
        let printable: Vec<char> = SYMBOL_TABLE
            .iter()
            .copied()
            .filter(|&c| c != '\0' && c != '\x02')
            .collect();
        let mut corpus = Vec::new();
        for &x in &printable {
            for &y in &printable {
                corpus.push(format!("{x}{y}"));
            }
        }
        let trees = HuffmanTrees::build_from_corpus(&corpus);

        let mut rom = GameRom::blank();
        let res = trees.write_to_rom(&mut rom);
        assert!(matches!(res, Err(TextError::TreeDataTooLarge { .. })));
        assert_eq!(rom.word(TREE_OFFSETS_START), 0);
    }
}
