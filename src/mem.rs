/*!
Shared storage of a column and of the whole array: the shared register
file, the very-wide registers and the scratchpad.

All cells are `i32` (fixed 32-bit two's complement). Accessors that take a
computed index are bounds-checked and return `Option`; the slot that asked
turns a miss into a contextual `RunError`. Indices that come straight from
instruction fields are validated at decode/assembly time and use plain
indexing.
*/

use crate::params::{SPM_NLINES, SPM_NWORDS, SPM_TOTAL_WORDS, SRF_N_REGS, VWR_NWORDS};

/// Shared register file: 8 x 32-bit per column, one index live per cycle.
#[derive(Debug, Clone, Default)]
pub struct Srf {
    pub regs: [i32; SRF_N_REGS],
}

impl Srf {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Very-wide register: 128 x 32-bit, row-sliced between the four RCs.
#[derive(Debug, Clone)]
pub struct Vwr {
    pub words: [i32; VWR_NWORDS],
}

impl Default for Vwr {
    fn default() -> Self {
        Self {
            words: [0; VWR_NWORDS],
        }
    }
}

impl Vwr {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn read(&self, idx: usize) -> Option<i32> {
        self.words.get(idx).copied()
    }

    #[inline]
    pub fn write(&mut self, idx: usize, value: i32) -> Option<()> {
        *self.words.get_mut(idx)? = value;
        Some(())
    }
}

/// Scratchpad memory: 64 lines x 128 words, banked by contiguous line
/// ranges that the kernel descriptor selects through `LSU.R7`.
#[derive(Debug, Clone)]
pub struct Spm {
    words: Vec<i32>,
}

impl Default for Spm {
    fn default() -> Self {
        Self::new()
    }
}

impl Spm {
    pub fn new() -> Self {
        Self {
            words: vec![0; SPM_TOTAL_WORDS],
        }
    }

    #[inline]
    pub fn word(&self, addr: usize) -> Option<i32> {
        self.words.get(addr).copied()
    }

    #[inline]
    pub fn set_word(&mut self, addr: usize, value: i32) -> Option<()> {
        *self.words.get_mut(addr)? = value;
        Some(())
    }

    pub fn line(&self, n: usize) -> Option<&[i32]> {
        if n < SPM_NLINES {
            Some(&self.words[n * SPM_NWORDS..(n + 1) * SPM_NWORDS])
        } else {
            None
        }
    }

    /// Overwrite line `n`. Short data is zero-padded to the line width.
    pub fn set_line(&mut self, n: usize, data: &[i32]) -> Option<()> {
        if n >= SPM_NLINES || data.len() > SPM_NWORDS {
            return None;
        }
        let line = &mut self.words[n * SPM_NWORDS..(n + 1) * SPM_NWORDS];
        line[..data.len()].copy_from_slice(data);
        line[data.len()..].fill(0);
        Some(())
    }

    /// Load consecutive lines starting at line 0.
    pub fn load_data(&mut self, lines: &[Vec<i32>]) -> Option<()> {
        for (n, data) in lines.iter().enumerate() {
            self.set_line(n, data)?;
        }
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vwr_bounds() {
        let mut vwr = Vwr::new();
        assert!(vwr.write(127, 5).is_some());
        assert_eq!(vwr.read(127), Some(5));
        assert!(vwr.write(128, 1).is_none());
        assert_eq!(vwr.read(128), None);
    }

    #[test]
    fn spm_line_and_word_views_agree() {
        let mut spm = Spm::new();
        spm.set_word(SPM_NWORDS + 3, 42).unwrap();
        assert_eq!(spm.line(1).unwrap()[3], 42);
        assert!(spm.word(SPM_TOTAL_WORDS).is_none());
        assert!(spm.line(SPM_NLINES).is_none());
    }

    #[test]
    fn short_line_writes_zero_pad() {
        let mut spm = Spm::new();
        spm.set_line(2, &[1, 2, 3]).unwrap();
        spm.set_line(2, &[9]).unwrap();
        let line = spm.line(2).unwrap();
        assert_eq!(line[0], 9);
        assert_eq!(line[1], 0);
    }
}
