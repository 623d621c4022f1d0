//! Derived Huffman code-length tables.
//!
//! The trellis optimizer never emits bits; it only needs the code length of
//! each symbol to price candidate coefficients. This module derives those
//! lengths (and the codes themselves) from a raw `bits`/`huffval` table
//! following Figures C.1-C.3 of ITU-T T.81.
//!
//! Trellis runs with more than one loop re-price symbols against tables fit
//! to the previous loop's output; [`SymbolCounts`] and [`gen_optimal_table`]
//! build those tables following Section K.2.

use crate::consts::{
    AC_CHROMINANCE_BITS, AC_CHROMINANCE_VALUES, AC_LUMINANCE_BITS, AC_LUMINANCE_VALUES,
    DC_CHROMINANCE_BITS, DC_CHROMINANCE_VALUES, DC_LUMINANCE_BITS, DC_LUMINANCE_VALUES,
};
use crate::error::{Error, Result};
use crate::types::HuffmanTable;

/// EOB (End of Block) symbol - encodes as run=0, size=0
pub const EOB: usize = 0x00;

/// ZRL (Zero Run Length 16) symbol - encodes 16 consecutive zeros
pub const ZRL: usize = 0xF0;

/// Derived Huffman table indexed by symbol value.
#[derive(Clone, Debug)]
pub struct DerivedTable {
    /// Huffman code for each symbol
    pub ehufco: [u32; 256],
    /// Code length for each symbol (0 means no code assigned)
    pub ehufsi: [u8; 256],
}

impl Default for DerivedTable {
    fn default() -> Self {
        Self {
            ehufco: [0; 256],
            ehufsi: [0; 256],
        }
    }
}

impl DerivedTable {
    /// Build a derived table from a raw Huffman table.
    ///
    /// `is_dc` restricts symbols to 0..=15.
    pub fn from_huff_table(htbl: &HuffmanTable, is_dc: bool) -> Result<Self> {
        let mut dtbl = Self::default();

        // Figure C.1: make table of Huffman code length for each symbol
        let mut huffsize = [0u8; 257];
        let mut p = 0usize;
        for l in 1..=16 {
            let count = htbl.bits[l] as usize;
            if p + count > 256 {
                return Err(Error::InvalidHuffmanTable);
            }
            for _ in 0..count {
                huffsize[p] = l as u8;
                p += 1;
            }
        }
        let lastp = p;
        if htbl.huffval.len() < lastp {
            return Err(Error::InvalidHuffmanTable);
        }

        // Figure C.2: generate the codes themselves
        let mut huffcode = [0u32; 257];
        let mut code = 0u32;
        let mut si = huffsize[0] as usize;
        p = 0;
        while p < lastp && huffsize[p] != 0 {
            while p < lastp && huffsize[p] as usize == si {
                huffcode[p] = code;
                code += 1;
                p += 1;
            }
            if code >= (1 << si) {
                return Err(Error::HuffmanCodeLengthOverflow);
            }
            code <<= 1;
            si += 1;
        }

        // Figure C.3: generate encoding tables indexed by symbol
        let max_symbol = if is_dc { 15 } else { 255 };
        for i in 0..lastp {
            let symbol = htbl.huffval[i] as usize;
            if symbol > max_symbol || dtbl.ehufsi[symbol] != 0 {
                return Err(Error::InvalidHuffmanTable);
            }
            dtbl.ehufco[symbol] = huffcode[i];
            dtbl.ehufsi[symbol] = huffsize[i];
        }

        Ok(dtbl)
    }

    /// Build a table directly from per-symbol code lengths.
    ///
    /// Only the lengths are meaningful; codes are left at zero. Useful when
    /// pricing against a hypothetical table.
    pub fn from_code_lengths(lengths: &[u8; 256]) -> Self {
        Self {
            ehufco: [0; 256],
            ehufsi: *lengths,
        }
    }

    /// Code length of `symbol`, or 0 if it has no code.
    #[inline]
    pub fn code_length(&self, symbol: usize) -> u8 {
        self.ehufsi[symbol & 0xFF]
    }

    /// Get the code and length for a symbol.
    #[inline]
    pub fn get_code(&self, symbol: u8) -> (u32, u8) {
        let idx = symbol as usize;
        (self.ehufco[idx], self.ehufsi[idx])
    }
}

/// Number of bits needed to represent `value` (the JPEG magnitude category).
#[inline]
pub fn jpeg_nbits(value: i32) -> u32 {
    if value == 0 {
        return 0;
    }
    32 - value.unsigned_abs().leading_zeros()
}

/// Longest code length the tree may produce before length limiting.
const MAX_TREE_CLEN: usize = 32;

/// Build a length-limited Huffman table for the given symbol frequencies.
///
/// Symbols with a zero count get no code. A reserved pseudo-symbol keeps any
/// real code from being all ones.
pub fn gen_optimal_table(freq: &[u32; 257]) -> Result<HuffmanTable> {
    let mut freq: [u64; 257] = core::array::from_fn(|i| freq[i] as u64);
    let mut codesize = [0usize; 257];
    let mut others = [usize::MAX; 257];
    freq[256] = 1;

    loop {
        // Smallest nonzero count, ties going to the larger symbol
        let mut c1 = None;
        let mut v = u64::MAX;
        for (i, &f) in freq.iter().enumerate() {
            if f != 0 && f <= v {
                v = f;
                c1 = Some(i);
            }
        }
        // Next smallest
        let mut c2 = None;
        v = u64::MAX;
        for (i, &f) in freq.iter().enumerate() {
            if f != 0 && f <= v && Some(i) != c1 {
                v = f;
                c2 = Some(i);
            }
        }
        let (Some(c1), Some(c2)) = (c1, c2) else {
            break;
        };

        freq[c1] += freq[c2];
        freq[c2] = 0;

        codesize[c1] += 1;
        let mut node = c1;
        while others[node] != usize::MAX {
            node = others[node];
            codesize[node] += 1;
        }
        others[node] = c2;

        codesize[c2] += 1;
        node = c2;
        while others[node] != usize::MAX {
            node = others[node];
            codesize[node] += 1;
        }
    }

    let mut bits = [0u32; MAX_TREE_CLEN + 1];
    for &size in codesize.iter().filter(|&&size| size != 0) {
        if size > MAX_TREE_CLEN {
            return Err(Error::HuffmanCodeLengthOverflow);
        }
        bits[size] += 1;
    }

    // Fold lengths above 16 by moving a prefix one level down (Figure K.3)
    for i in (17..=MAX_TREE_CLEN).rev() {
        while bits[i] > 0 {
            let mut j = i - 2;
            while j > 0 && bits[j] == 0 {
                j -= 1;
            }
            if j == 0 {
                return Err(Error::HuffmanCodeLengthOverflow);
            }
            bits[i] -= 2;
            bits[i - 1] += 1;
            bits[j + 1] += 2;
            bits[j] -= 1;
        }
    }

    // Drop the pseudo-symbol from the longest length in use
    if let Some(longest) = (1..=16).rev().find(|&l| bits[l] != 0) {
        bits[longest] -= 1;
    }

    let mut out_bits = [0u8; 17];
    for l in 1..=16 {
        out_bits[l] = bits[l] as u8;
    }

    // Symbols by original length, then by value; the folded table assigns
    // lengths in the same order.
    let mut huffval = Vec::with_capacity(256);
    for size in 1..=MAX_TREE_CLEN {
        for (symbol, &s) in codesize[..256].iter().enumerate() {
            if s == size {
                huffval.push(symbol as u8);
            }
        }
    }

    Ok(HuffmanTable::new(out_bits, huffval))
}

/// Symbol occurrence counts gathered while pricing a row.
#[derive(Clone, Debug)]
pub struct SymbolCounts {
    /// Count per symbol; entry 256 is reserved
    pub counts: [u32; 257],
}

impl Default for SymbolCounts {
    fn default() -> Self {
        Self { counts: [0; 257] }
    }
}

impl SymbolCounts {
    /// Record one occurrence of `symbol`.
    #[inline]
    pub fn count(&mut self, symbol: usize) {
        self.counts[symbol & 0xFF] += 1;
    }

    /// Occurrences recorded so far.
    pub fn total(&self) -> u64 {
        self.counts[..256].iter().map(|&c| c as u64).sum()
    }

    /// Table fit to the counts, derived for pricing.
    pub fn derive(&self, is_dc: bool) -> Result<DerivedTable> {
        DerivedTable::from_huff_table(&gen_optimal_table(&self.counts)?, is_dc)
    }
}

/// Standard luminance DC table (Annex K.3).
pub fn std_dc_luma() -> HuffmanTable {
    HuffmanTable::new(DC_LUMINANCE_BITS, DC_LUMINANCE_VALUES.to_vec())
}

/// Standard chrominance DC table (Annex K.3).
pub fn std_dc_chroma() -> HuffmanTable {
    HuffmanTable::new(DC_CHROMINANCE_BITS, DC_CHROMINANCE_VALUES.to_vec())
}

/// Standard luminance AC table (Annex K.3).
pub fn std_ac_luma() -> HuffmanTable {
    HuffmanTable::new(AC_LUMINANCE_BITS, AC_LUMINANCE_VALUES.to_vec())
}

/// Standard chrominance AC table (Annex K.3).
pub fn std_ac_chroma() -> HuffmanTable {
    HuffmanTable::new(AC_CHROMINANCE_BITS, AC_CHROMINANCE_VALUES.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_dc_derived_table() {
        let dtbl = DerivedTable::from_huff_table(&std_dc_luma(), true).unwrap();
        // Category 0 is the single 2-bit code 00
        assert_eq!(dtbl.get_code(0), (0b00, 2));
        // Categories 1..5 share 3-bit codes
        for sym in 1..=5u8 {
            assert_eq!(dtbl.get_code(sym).1, 3);
        }
        assert_eq!(dtbl.get_code(11).1, 9);
        assert_eq!(dtbl.code_length(12), 0);
    }

    #[test]
    fn test_build_ac_derived_table() {
        let dtbl = DerivedTable::from_huff_table(&std_ac_luma(), false).unwrap();
        assert_eq!(dtbl.code_length(EOB), 4);
        assert_eq!(dtbl.code_length(ZRL), 11);
        assert_eq!(dtbl.get_code(0x01), (0b00, 2));
        assert_eq!(dtbl.get_code(0x02), (0b01, 2));
        // Symbols 0xNA (size 10) beyond run 0 have 16-bit codes
        assert_eq!(dtbl.code_length(0xFA), 16);

        let chroma = DerivedTable::from_huff_table(&std_ac_chroma(), false).unwrap();
        assert_eq!(chroma.code_length(EOB), 2);
        assert_eq!(chroma.code_length(ZRL), 10);
    }

    #[test]
    fn test_dc_symbol_range() {
        let mut htbl = std_dc_luma();
        htbl.huffval[0] = 16;
        assert_eq!(
            DerivedTable::from_huff_table(&htbl, true).unwrap_err(),
            Error::InvalidHuffmanTable
        );
        // The same table is acceptable as an AC table
        assert!(DerivedTable::from_huff_table(&htbl, false).is_ok());
    }

    #[test]
    fn test_duplicate_symbol_rejected() {
        let mut htbl = std_dc_luma();
        htbl.huffval[1] = htbl.huffval[0];
        assert_eq!(
            DerivedTable::from_huff_table(&htbl, true).unwrap_err(),
            Error::InvalidHuffmanTable
        );
    }

    #[test]
    fn test_code_space_overflow() {
        let mut bits = [0u8; 17];
        bits[1] = 3; // three 1-bit codes cannot exist
        let htbl = HuffmanTable::new(bits, vec![0, 1, 2]);
        assert_eq!(
            DerivedTable::from_huff_table(&htbl, false).unwrap_err(),
            Error::HuffmanCodeLengthOverflow
        );
    }

    #[test]
    fn test_short_huffval_rejected() {
        let htbl = HuffmanTable::new(DC_LUMINANCE_BITS, vec![0, 1]);
        assert_eq!(
            DerivedTable::from_huff_table(&htbl, true).unwrap_err(),
            Error::InvalidHuffmanTable
        );
    }

    #[test]
    fn test_jpeg_nbits() {
        assert_eq!(jpeg_nbits(0), 0);
        assert_eq!(jpeg_nbits(1), 1);
        assert_eq!(jpeg_nbits(-1), 1);
        assert_eq!(jpeg_nbits(2), 2);
        assert_eq!(jpeg_nbits(-3), 2);
        assert_eq!(jpeg_nbits(255), 8);
        assert_eq!(jpeg_nbits(1023), 10);
        assert_eq!(jpeg_nbits(-1024), 11);
    }

    #[test]
    fn test_from_code_lengths() {
        let mut lengths = [0u8; 256];
        lengths[EOB] = 4;
        let dtbl = DerivedTable::from_code_lengths(&lengths);
        assert_eq!(dtbl.code_length(EOB), 4);
        assert_eq!(dtbl.code_length(ZRL), 0);
    }

    #[test]
    fn test_optimal_table_for_skewed_counts() {
        let mut counts = SymbolCounts::default();
        for _ in 0..100 {
            counts.count(0);
        }
        for _ in 0..10 {
            counts.count(1);
        }
        counts.count(2);
        counts.count(3);

        let htbl = gen_optimal_table(&counts.counts).unwrap();
        assert_eq!(htbl.huffval.len(), 4);
        let dtbl = DerivedTable::from_huff_table(&htbl, true).unwrap();
        assert_eq!(dtbl.code_length(0), 1);
        assert_eq!(dtbl.code_length(1), 2);
        assert!(dtbl.code_length(2) >= 3 && dtbl.code_length(3) >= 3);
        // No code is all ones
        for sym in 0..4u8 {
            let (code, len) = dtbl.get_code(sym);
            assert_ne!(code, (1u32 << len) - 1, "symbol {sym}");
        }
        assert_eq!(counts.total(), 112);
    }

    #[test]
    fn test_optimal_table_for_uniform_counts() {
        let counts = [5u32; 257];
        let htbl = gen_optimal_table(&counts).unwrap();
        assert_eq!(htbl.huffval.len(), 256);
        let total: u32 = htbl.bits.iter().map(|&b| b as u32).sum();
        assert_eq!(total, 256);
        let dtbl = DerivedTable::from_huff_table(&htbl, false).unwrap();
        assert!((0..256).all(|s| (8..=9).contains(&dtbl.code_length(s))));
    }

    #[test]
    fn test_optimal_table_limits_code_length() {
        // Fibonacci counts build a maximally deep tree
        let mut counts = [0u32; 257];
        let (mut a, mut b) = (1u32, 1u32);
        for c in counts.iter_mut().take(30) {
            *c = a;
            (a, b) = (b, a + b);
        }
        let htbl = gen_optimal_table(&counts).unwrap();
        let dtbl = DerivedTable::from_huff_table(&htbl, false).unwrap();
        assert!((0..30).all(|s| (1..=16).contains(&dtbl.code_length(s))));
        assert_eq!(dtbl.code_length(30), 0);
    }

    #[test]
    fn test_single_symbol_gets_a_code() {
        let mut counts = SymbolCounts::default();
        counts.count(EOB);
        let dtbl = counts.derive(false).unwrap();
        assert_eq!(dtbl.code_length(EOB), 1);
    }
}
