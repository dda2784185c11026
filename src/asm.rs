/*!
Kernel assembly: mnemonics to packed words, one cycle at a time.

A cycle row carries the seven slot mnemonics of one horizontal
instruction. The slots are parsed first; the MXCU's shared-control fields
are filled last because the other slots' SRF and VWR uses determine them:

1. Parse LCU, LSU, RC0..RC3 and the MXCU's own-ALU part, collecting each
   slot's SRF read/write indices and VWR write letters.
2. Reconcile: all referenced SRF indices must be one index; at most one
   slot may write it; all referenced VWR letters must be one letter.
3. Fill the MXCU word: `srf_sel`, `srf_we`, `alu_srf_write`, `vwr_sel` and
   the per-row VWR write-enable map.
4. Emit the seven words.

Columns assemble independently: with both columns active, column 0's
`n` instructions occupy IMEM lines `[start, start+n)` and column 1's the
`n` lines after them.
*/

use crate::engine::Imem;
use crate::error::{AsmError, Slot};
use crate::isa::lsu::LsuOp;
use crate::isa::{SrfUse, VwrLetter, lcu, lsu, mxcu, rc};
use crate::params::{CGRA_ROWS, IMEM_N_LINES};

/// The seven mnemonics of one cycle.
#[derive(Debug, Clone)]
pub struct CycleRow {
    pub lcu: String,
    pub lsu: String,
    pub mxcu: String,
    pub rcs: [String; CGRA_ROWS],
}

/// The seven packed words of one cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleWords {
    pub lcu: u32,
    pub lsu: u32,
    pub mxcu: u32,
    pub rcs: [u32; CGRA_ROWS],
}

/// Running SRF reconciliation state for one cycle.
#[derive(Default)]
struct SrfMerge {
    index: Option<usize>,
    writer: Option<Slot>,
}

impl SrfMerge {
    fn add(&mut self, slot: Slot, use_: SrfUse, cycle: usize, col: usize) -> Result<(), AsmError> {
        for idx in [use_.read, use_.write].into_iter().flatten() {
            match self.index {
                Some(prev) if prev != idx => {
                    return Err(AsmError::SrfIndexConflict {
                        cycle,
                        col,
                        first: prev,
                        second: idx,
                    });
                }
                _ => self.index = Some(idx),
            }
        }
        if use_.write.is_some() {
            if self.writer.is_some() {
                return Err(AsmError::MultipleSrfWriters { cycle, col });
            }
            self.writer = Some(slot);
        }
        Ok(())
    }
}

/// Assemble one cycle row into its seven words.
pub fn assemble_row(row: &CycleRow, cycle: usize, col: usize) -> Result<CycleWords, AsmError> {
    let at = |e: AsmError| e.at(cycle, col);

    let (lcu_word, lcu_srf) = lcu::parse(&row.lcu).map_err(at)?;
    let (lsu_word, lsu_srf, lsu_vwr) = lsu::parse(&row.lsu).map_err(at)?;
    let (mut mxcu_word, mxcu_srf) = mxcu::parse(&row.mxcu).map_err(at)?;

    let mut rc_words = [0u32; CGRA_ROWS];
    let mut rc_vwr: [Option<VwrLetter>; CGRA_ROWS] = [None; CGRA_ROWS];
    let mut srf = SrfMerge::default();
    srf.add(Slot::Lcu, lcu_srf, cycle, col)?;
    srf.add(Slot::Lsu, lsu_srf, cycle, col)?;
    srf.add(Slot::Mxcu, mxcu_srf, cycle, col)?;

    for (r, text) in row.rcs.iter().enumerate() {
        let (word, use_, vwr) = rc::parse(text).map_err(|e| {
            // The RC parser does not know its row; patch it in.
            match e {
                AsmError::Invalid { instr, reason, .. } => AsmError::Invalid {
                    slot: Slot::Rc(r),
                    instr,
                    reason,
                }
                .at(cycle, col),
                other => other.at(cycle, col),
            }
        })?;
        rc_words[r] = word.encode();
        rc_vwr[r] = vwr;
        srf.add(Slot::Rc(r), use_, cycle, col)?;
    }

    // One VWR letter per cycle, across the RC lane writes and the LSU
    // line transfer.
    let mut letter: Option<VwrLetter> = None;
    for l in rc_vwr.iter().copied().chain([lsu_vwr]).flatten() {
        match letter {
            Some(prev) if prev != l => {
                return Err(AsmError::VwrLetterConflict { cycle, col });
            }
            _ => letter = Some(l),
        }
    }
    let any_lane_write = rc_vwr.iter().any(Option::is_some);
    if lsu_word.op == LsuOp::Lvwr && any_lane_write {
        return Err(AsmError::VwrLineLaneClash { cycle, col });
    }

    mxcu_word.srf_sel = srf.index.unwrap_or(0) as u8;
    mxcu_word.srf_we = srf.writer.is_some();
    mxcu_word.alu_srf_write = srf.writer.is_some_and(|s| s != Slot::Mxcu);
    mxcu_word.vwr_sel = letter.unwrap_or(VwrLetter::A);
    for (r, vwr) in rc_vwr.iter().enumerate() {
        mxcu_word.vwr_row_we[r] = vwr.is_some();
    }

    Ok(CycleWords {
        lcu: lcu_word.encode(),
        lsu: lsu_word.encode(),
        mxcu: mxcu_word.encode(),
        rcs: rc_words,
    })
}

/// Assemble one column's instruction stream into the global IMEM starting
/// at line `start`. `col` only labels error messages.
pub fn assemble_column(
    imem: &mut Imem,
    start: usize,
    col: usize,
    rows: &[CycleRow],
) -> Result<(), AsmError> {
    for (cycle, row) in rows.iter().enumerate() {
        let words = assemble_row(row, cycle, col)?;
        let line = start + cycle;
        assert!(line < IMEM_N_LINES, "IMEM window checked by the caller");
        imem.lcu[line] = words.lcu;
        imem.lsu[line] = words.lsu;
        imem.mxcu[line] = words.mxcu;
        for r in 0..CGRA_ROWS {
            imem.rcs[r][line] = words.rcs[r];
        }
    }
    Ok(())
}

/// Convenience for tests and drivers: a cycle row from plain strings.
pub fn cycle(lcu: &str, lsu: &str, mxcu: &str, rcs: [&str; CGRA_ROWS]) -> CycleRow {
    CycleRow {
        lcu: lcu.to_string(),
        lsu: lsu.to_string(),
        mxcu: mxcu.to_string(),
        rcs: rcs.map(str::to_string),
    }
}

/// Disassemble an IMEM window back into cycle rows. The MXCU word of each
/// line supplies the SRF index and VWR letter the other slots render with.
pub fn disassemble_window(
    imem: &Imem,
    start: usize,
    n: usize,
) -> Result<Vec<CycleRow>, AsmError> {
    use crate::isa::lcu::LcuWord;
    use crate::isa::lsu::LsuWord;
    use crate::isa::mxcu::MxcuWord;
    use crate::isa::rc::RcWord;

    let mut rows = Vec::with_capacity(n);
    for line in start..start + n {
        let mxcu_word = MxcuWord::decode(imem.mxcu[line])?;
        let srf_sel = mxcu_word.srf_sel as usize;
        let vwr_sel = mxcu_word.vwr_sel;
        let mut rcs: [String; CGRA_ROWS] = Default::default();
        for (r, text) in rcs.iter_mut().enumerate() {
            *text = RcWord::decode(imem.rcs[r][line])?.asm(
                srf_sel,
                vwr_sel,
                mxcu_word.vwr_row_we[r],
            );
        }
        rows.push(CycleRow {
            lcu: LcuWord::decode(imem.lcu[line])?.asm(srf_sel),
            lsu: LsuWord::decode(imem.lsu[line])?.asm(srf_sel, vwr_sel),
            mxcu: mxcu_word.asm(),
            rcs,
        });
    }
    Ok(rows)
}
