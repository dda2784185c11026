/*!
Bit-exact instruction word formats of the four slot kinds plus the kernel
descriptor word.

Conventions
===========
- Layouts are documented MSB-first; `encode`/`decode` place the first
  documented field in the most significant bits of the word.
- Each word type offers: construction from fields, `encode() -> u32`,
  `decode(u32) -> Result<Self, DecodeError>`, `from_hex`/`to_hex`
  (zero-extending to the exact width, rejecting wider values), a
  disassembler `asm(..)` parameterized by the cycle's MXCU-supplied SRF
  index (and selected VWR where VWRs are reachable), and a mnemonic parser
  `parse(..)` returning the word plus its shared-resource uses.
- `decode(encode(w)) == w` for every constructible word.
*/

pub mod kmem;
pub mod lcu;
pub mod lsu;
pub mod mxcu;
pub mod rc;

use std::fmt;

use crate::error::{DecodeError, Slot};

/// Extract `bits` bits of `word` starting at bit `lo` (LSB = 0).
#[inline]
pub(crate) fn field(word: u32, lo: u32, bits: u32) -> u32 {
    (word >> lo) & ((1 << bits) - 1)
}

/// Parse a hex string (with or without `0x`) into a word of exactly `bits`.
pub(crate) fn word_from_hex(text: &str, bits: u32, slot: Slot) -> Result<u32, DecodeError> {
    let digits = text
        .trim()
        .strip_prefix("0x")
        .or_else(|| text.trim().strip_prefix("0X"))
        .unwrap_or_else(|| text.trim());
    let word = u32::from_str_radix(digits, 16).map_err(|_| DecodeError {
        slot,
        word: 0,
        reason: "not a hexadecimal word",
    })?;
    if bits < 32 && word >> bits != 0 {
        return Err(DecodeError {
            slot,
            word,
            reason: "wider than the instruction word",
        });
    }
    Ok(word)
}

/// SRF register uses collected from one slot mnemonic. `None` = untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SrfUse {
    pub read: Option<usize>,
    pub write: Option<usize>,
}

/// One of the three very-wide registers of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VwrLetter {
    A,
    B,
    C,
}

impl VwrLetter {
    pub const ALL: [VwrLetter; 3] = [VwrLetter::A, VwrLetter::B, VwrLetter::C];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub(crate) fn bits(self) -> u32 {
        self as u32
    }

    pub(crate) fn from_bits(v: u32, slot: Slot, word: u32) -> Result<Self, DecodeError> {
        match v {
            0 => Ok(VwrLetter::A),
            1 => Ok(VwrLetter::B),
            2 => Ok(VwrLetter::C),
            _ => Err(DecodeError {
                slot,
                word,
                reason: "VWR select out of range",
            }),
        }
    }

    pub(crate) fn parse(token: &str) -> Option<Self> {
        match token {
            "VWR_A" => Some(VwrLetter::A),
            "VWR_B" => Some(VwrLetter::B),
            "VWR_C" => Some(VwrLetter::C),
            _ => None,
        }
    }
}

impl fmt::Display for VwrLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VwrLetter::A => write!(f, "VWR_A"),
            VwrLetter::B => write!(f, "VWR_B"),
            VwrLetter::C => write!(f, "VWR_C"),
        }
    }
}

/// Split a mnemonic on commas and whitespace. Tokens are case-sensitive.
pub(crate) fn tokens(instr: &str) -> Vec<&str> {
    instr
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect()
}

/// `R<n>` operand, bounded by the slot's register file size.
pub(crate) fn parse_reg(token: &str, limit: usize) -> Option<Result<usize, ()>> {
    let rest = token.strip_prefix('R')?;
    let n: usize = rest.parse().ok()?;
    Some(if n < limit { Ok(n) } else { Err(()) })
}

/// `SRF(<n>)` operand.
pub(crate) fn parse_srf(token: &str) -> Option<Result<usize, ()>> {
    let inner = token.strip_prefix("SRF(")?.strip_suffix(')')?;
    let n: usize = inner.parse().ok()?;
    Some(if n < crate::params::SRF_N_REGS {
        Ok(n)
    } else {
        Err(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_extracts_lsb_first() {
        assert_eq!(field(0b1011_0100, 2, 4), 0b1101);
    }

    #[test]
    fn hex_rejects_wide_words() {
        assert!(word_from_hex("0x7ffff", 18, Slot::Rc(0)).is_err());
        assert_eq!(word_from_hex("0x3ffff", 18, Slot::Rc(0)).unwrap(), 0x3ffff);
        assert_eq!(word_from_hex("0x3ffff", 20, Slot::Lcu).unwrap(), 0x3ffff);
    }

    #[test]
    fn hex_accepts_short_words() {
        assert_eq!(word_from_hex("4", 20, Slot::Lcu).unwrap(), 4);
        assert_eq!(word_from_hex("0x0", 20, Slot::Lcu).unwrap(), 0);
    }

    #[test]
    fn token_split_eats_commas_and_spaces() {
        assert_eq!(tokens("SADD R0,  R1, ONE"), vec!["SADD", "R0", "R1", "ONE"]);
    }

    #[test]
    fn reg_and_srf_operands() {
        assert_eq!(parse_reg("R3", 4), Some(Ok(3)));
        assert_eq!(parse_reg("R4", 4), Some(Err(())));
        assert_eq!(parse_reg("SRF(1)", 4), None);
        assert_eq!(parse_srf("SRF(7)"), Some(Ok(7)));
        assert_eq!(parse_srf("SRF(8)"), Some(Err(())));
    }
}
