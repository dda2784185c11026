/*!
Lockstep cycle engine for the whole array.

Orchestrates a kernel run with exact per-cycle ordering:

1. Snapshot the committed RC state of the array (neighbour links read it).
2. Per active column: decode the MXCU word into the cycle's shared
   controls, then run LSU, MXCU, RC0..RC3 against the start-of-cycle
   state, and the LCU last with this cycle's RC flags.
3. Commit every collected write at once: local registers, the SRF write
   port (routed to its single claiming slot), VWR lines and lanes, SPM
   words, and every ALU's pending result/flags.
4. Arbitrate: two columns branching in one cycle is a hard error; one
   branch redirects the shared pc; any EXIT ends the run.

The engine owns all state; slots only ever see borrowed views.
*/

use log::{debug, trace};

use crate::error::{RunError, Slot};
use crate::isa::kmem::{Kmem, KmemWord};
use crate::mem::{Spm, Srf, Vwr};
use crate::params::{CGRA_COLS, CGRA_ROWS, IMEM_N_LINES, N_VWR_PER_COL};
use crate::slots::lcu::Lcu;
use crate::slots::lsu::Lsu;
use crate::slots::mxcu::Mxcu;
use crate::slots::rc::Rc;
use crate::slots::{CycleCtx, LcuOutcome, LsuOutcome, MxcuCtrl, MxcuOutcome, RcOutcome, RcView};

/// Global instruction memory: one packed word per slot per line.
#[derive(Debug, Clone)]
pub struct Imem {
    pub lcu: [u32; IMEM_N_LINES],
    pub lsu: [u32; IMEM_N_LINES],
    pub mxcu: [u32; IMEM_N_LINES],
    pub rcs: [[u32; IMEM_N_LINES]; CGRA_ROWS],
}

impl Default for Imem {
    fn default() -> Self {
        Self::new()
    }
}

impl Imem {
    pub fn new() -> Self {
        Self {
            lcu: [0; IMEM_N_LINES],
            lsu: [0; IMEM_N_LINES],
            mxcu: [0; IMEM_N_LINES],
            rcs: [[0; IMEM_N_LINES]; CGRA_ROWS],
        }
    }
}

/// One column: its four slot kinds plus the shared storage.
#[derive(Debug, Clone, Default)]
pub struct Column {
    pub lcu: Lcu,
    pub lsu: Lsu,
    pub mxcu: Mxcu,
    pub rcs: [Rc; CGRA_ROWS],
    pub srf: Srf,
    pub vwrs: [Vwr; N_VWR_PER_COL],
}

/// How a kernel run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// An LCU executed EXIT.
    Exit,
    /// The pc ran past the last instruction.
    Drained,
    /// The optional step limit was reached before termination.
    LimitReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub status: RunStatus,
    pub cycles: u64,
}

/// Everything one column produced in a cycle, pending commit.
struct ColOutcome {
    col: usize,
    ctrl: MxcuCtrl,
    lcu: LcuOutcome,
    lsu: LsuOutcome,
    mxcu: MxcuOutcome,
    rc: [RcOutcome; CGRA_ROWS],
}

/// The VWR2A array: global memories plus the two columns.
#[derive(Debug, Clone, Default)]
pub struct Cgra {
    pub imem: Imem,
    pub kmem: Kmem,
    pub spm: Spm,
    pub cols: [Column; CGRA_COLS],
}

impl Cgra {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a kernel descriptor. Ids 1..=15; slot 0 stays empty.
    pub fn configure_kernel(&mut self, id: usize, desc: KmemWord) -> Result<(), RunError> {
        self.kmem.set(id, desc)
    }

    fn rc_views(&self) -> [[RcView; CGRA_ROWS]; CGRA_COLS] {
        let mut views = [[RcView::default(); CGRA_ROWS]; CGRA_COLS];
        for (c, col) in self.cols.iter().enumerate() {
            for (r, rc) in col.rcs.iter().enumerate() {
                views[c][r] = RcView {
                    res: rc.alu.res(),
                    sign: rc.alu.sign(),
                    zero: rc.alu.zero(),
                };
            }
        }
        views
    }

    /// Copy the kernel's IMEM window into the per-slot memories and bind
    /// the per-column run state.
    fn stage_kernel(&mut self, desc: &KmemWord) {
        let n = desc.n_instr;
        for (k, &c) in desc.cols.columns().iter().enumerate() {
            let base = desc.imem_start + k * n;
            let col = &mut self.cols[c];
            col.lsu.regs[7] = desc.srf_spm_bank as i32;
            col.lsu.reset_streams();
            col.lcu.imem[..n].copy_from_slice(&self.imem.lcu[base..base + n]);
            col.lsu.imem[..n].copy_from_slice(&self.imem.lsu[base..base + n]);
            col.mxcu.imem[..n].copy_from_slice(&self.imem.mxcu[base..base + n]);
            for (r, rc) in col.rcs.iter_mut().enumerate() {
                rc.imem[..n].copy_from_slice(&self.imem.rcs[r][base..base + n]);
            }
        }
    }

    fn run_column(
        &mut self,
        c: usize,
        pc: usize,
        rc_snap: &[[RcView; CGRA_ROWS]; CGRA_COLS],
    ) -> Result<ColOutcome, RunError> {
        debug!("col {c}:");
        let spm = &self.spm;
        let Column {
            lcu,
            lsu,
            mxcu,
            rcs,
            srf,
            vwrs,
        } = &mut self.cols[c];

        let mxcu_word = mxcu.word_at(pc, c)?;
        let ctrl = MxcuCtrl::new(&mxcu_word, &mxcu.regs);
        let ctx = CycleCtx {
            pc,
            col: c,
            srf,
            vwrs,
            spm,
            ctrl,
            rcs: rc_snap,
        };

        let lsu_out = lsu.run(&ctx)?;
        let mxcu_out = mxcu.run(&ctx, &mxcu_word)?;
        let mut rc_out: [RcOutcome; CGRA_ROWS] = Default::default();
        for (r, rc) in rcs.iter_mut().enumerate() {
            rc_out[r] = rc.run(&ctx, r)?;
        }
        // The LCU runs last: its flag-branch mode reads this cycle's flags.
        let mut rc_now = [RcView::default(); CGRA_ROWS];
        for (r, rc) in rcs.iter().enumerate() {
            rc_now[r] = RcView {
                res: rc.alu.pending_res(),
                sign: rc.alu.pending_sign(),
                zero: rc.alu.pending_zero(),
            };
        }
        let lcu_out = lcu.run(&ctx, &rc_now)?;

        Ok(ColOutcome {
            col: c,
            ctrl,
            lcu: lcu_out,
            lsu: lsu_out,
            mxcu: mxcu_out,
            rc: rc_out,
        })
    }

    /// Apply one column's writes at the cycle boundary.
    fn commit_column(&mut self, out: &ColOutcome, pc: usize) -> Result<(), RunError> {
        let col = &mut self.cols[out.col];
        let ctrl = &out.ctrl;

        if let Some((i, v)) = out.lcu.reg_write {
            col.lcu.regs[i] = v;
        }
        if let Some((i, v)) = out.lsu.reg_write {
            col.lsu.regs[i] = v;
        }
        if let Some((i, v)) = out.mxcu.reg_write {
            col.mxcu.regs[i] = v;
        }
        for (r, rc_out) in out.rc.iter().enumerate() {
            if let Some((i, v)) = rc_out.reg_write {
                col.rcs[r].regs[i] = v;
            }
        }

        // SRF write port: one register, one writer.
        if ctrl.srf_we {
            let value = if ctrl.alu_srf_write {
                let claims: Vec<i32> = out
                    .lcu
                    .srf_claim
                    .into_iter()
                    .chain(out.lsu.srf_claim)
                    .chain(out.rc.iter().filter_map(|o| o.srf_claim))
                    .collect();
                if claims.len() != 1 {
                    return Err(RunError::SrfWriteClaims {
                        pc,
                        col: out.col,
                        claims: claims.len(),
                    });
                }
                claims[0]
            } else {
                out.mxcu.srf_claim.ok_or(RunError::SrfWriteClaims {
                    pc,
                    col: out.col,
                    claims: 0,
                })?
            };
            col.srf.regs[ctrl.srf_sel] = value;
        }

        // VWR traffic: a whole-line load first, then the lane writes
        // (the assembler rejects combining both on the same cycle).
        let vwr = &mut col.vwrs[ctrl.vwr_sel.index()];
        if let Some(line) = out.lsu.vwr_line {
            vwr.words = line;
        }
        for rc_out in &out.rc {
            if let Some((idx, v)) = rc_out.vwr_write {
                vwr.words[idx] = v;
            }
        }

        // SPM traffic. Addresses were validated when the LSU ran.
        if let Some((addr, v)) = out.lsu.spm_word {
            self.spm
                .set_word(addr, v)
                .ok_or(RunError::SpmOutOfRange {
                    pc,
                    col: out.col,
                    slot: Slot::Lsu,
                    addr: addr as i64,
                })?;
        }
        if let Some((line, data)) = out.lsu.spm_line {
            self.spm
                .set_line(line, &data)
                .ok_or(RunError::SpmOutOfRange {
                    pc,
                    col: out.col,
                    slot: Slot::Lsu,
                    addr: line as i64,
                })?;
        }

        // Publish every ALU's pending result and flags.
        col.lcu.alu.commit();
        col.lsu.alu.commit();
        col.mxcu.alu.commit();
        for rc in &mut col.rcs {
            rc.alu.commit();
        }
        Ok(())
    }

    /// Run a configured kernel to completion. `limit` bounds the cycle
    /// count; reaching it reports `LimitReached` instead of an error.
    pub fn run_kernel(&mut self, id: usize, limit: Option<u64>) -> Result<RunReport, RunError> {
        let desc = self.kmem.get(id)?;
        self.stage_kernel(&desc);
        let active = desc.cols.columns();

        let mut pc = 0usize;
        let mut cycles = 0u64;
        loop {
            if pc >= desc.n_instr {
                return Ok(RunReport {
                    status: RunStatus::Drained,
                    cycles,
                });
            }
            if limit.is_some_and(|l| cycles >= l) {
                return Ok(RunReport {
                    status: RunStatus::LimitReached,
                    cycles,
                });
            }
            trace!("pc {pc}");

            let rc_snap = self.rc_views();
            let mut outcomes = Vec::with_capacity(active.len());
            for &c in active {
                outcomes.push(self.run_column(c, pc, &rc_snap)?);
            }

            let mut exit = false;
            let mut branch: Option<i64> = None;
            let mut branch_col = 0;
            for out in &outcomes {
                exit |= out.lcu.exit;
                if let Some(target) = out.lcu.branch {
                    if branch.is_some() {
                        return Err(RunError::TwoBranches { pc });
                    }
                    branch = Some(target);
                    branch_col = out.col;
                }
            }

            for out in &outcomes {
                self.commit_column(out, pc)?;
            }
            cycles += 1;

            if exit {
                return Ok(RunReport {
                    status: RunStatus::Exit,
                    cycles,
                });
            }
            match branch {
                Some(target) => {
                    if target < 0 {
                        return Err(RunError::BranchOutOfRange {
                            pc,
                            col: branch_col,
                            target,
                        });
                    }
                    pc = target as usize;
                }
                None => pc += 1,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{CycleRow, assemble_column, cycle};
    use crate::error::Slot;
    use crate::isa::kmem::ColUsage;
    use crate::params::SPM_NWORDS;

    /// Assemble `rows` for column 0 at IMEM line 0 and configure kernel 1.
    fn kernel(cgra: &mut Cgra, rows: &[CycleRow]) {
        kernel_on(cgra, rows, ColUsage::Col0);
    }

    fn kernel_on(cgra: &mut Cgra, rows: &[CycleRow], cols: ColUsage) {
        for (k, _) in cols.columns().iter().enumerate() {
            assemble_column(&mut cgra.imem, k * rows.len(), 0, rows).unwrap();
        }
        cgra.configure_kernel(
            1,
            KmemWord {
                n_instr: rows.len(),
                imem_start: 0,
                cols,
                srf_spm_bank: 0,
            },
        )
        .unwrap();
    }

    fn nops() -> CycleRow {
        cycle("NOP", "NOP", "NOP", ["NOP"; CGRA_ROWS])
    }

    #[test]
    fn empty_loop_exits_at_pc_zero() {
        let mut cgra = Cgra::new();
        let rows = vec![cycle("EXIT", "NOP", "NOP", ["NOP"; CGRA_ROWS]), nops()];
        kernel(&mut cgra, &rows);
        let before = cgra.spm.clone();
        let report = cgra.run_kernel(1, None).unwrap();
        assert_eq!(report.status, RunStatus::Exit);
        assert_eq!(report.cycles, 1);
        // No SPM mutation.
        for line in 0..4 {
            assert_eq!(before.line(line), cgra.spm.line(line));
        }
    }

    #[test]
    fn countdown_via_bgepd_runs_four_iterations() {
        let mut cgra = Cgra::new();
        let rows = vec![
            cycle("SSUBI R0, R0, 1", "NOP", "NOP", ["NOP"; CGRA_ROWS]),
            cycle("BGEPD R0, ZERO, 0", "NOP", "NOP", ["NOP"; CGRA_ROWS]),
        ];
        kernel(&mut cgra, &rows);
        cgra.cols[0].lcu.regs[0] = 3;
        let report = cgra.run_kernel(1, Some(100)).unwrap();
        assert_eq!(report.status, RunStatus::Drained);
        // Four countdowns (3->2->1->0->-1), three taken branches.
        assert_eq!(cgra.cols[0].lcu.regs[0], -1);
        assert_eq!(report.cycles, 8);
    }

    #[test]
    fn spm_copy_mirrors_the_bank_line() {
        let mut cgra = Cgra::new();
        let data: Vec<i32> = (0..8).map(|i| 100 + i).collect();
        cgra.spm.set_line(0, &data).unwrap();
        let mut rows = Vec::new();
        for _ in 0..8 {
            rows.push(cycle("NOP", "LWD R0", "NOP", ["NOP"; CGRA_ROWS]));
            rows.push(cycle("NOP", "SWD R0", "NOP", ["NOP"; CGRA_ROWS]));
        }
        kernel(&mut cgra, &rows);
        let report = cgra.run_kernel(1, None).unwrap();
        assert_eq!(report.status, RunStatus::Drained);
        assert_eq!(cgra.cols[0].lsu.load_cursor(), 8);
        assert_eq!(cgra.cols[0].lsu.store_cursor(), 8);
        assert_eq!(&cgra.spm.line(1).unwrap()[..8], &data[..]);
    }

    #[test]
    fn neighbour_reduction_wraps_around() {
        let mut cgra = Cgra::new();
        let rows = vec![cycle(
            "NOP",
            "NOP",
            "NOP",
            ["SADD R0, RCT, R0"; CGRA_ROWS],
        )];
        kernel(&mut cgra, &rows);
        for (r, rc) in cgra.cols[0].rcs.iter_mut().enumerate() {
            let seed = (r + 1) as i32;
            rc.regs[0] = seed;
            // Previous-cycle results the neighbour links will read.
            rc.alu.sadd(seed, 0);
            rc.alu.commit();
        }
        cgra.run_kernel(1, None).unwrap();
        let results: Vec<i32> = cgra.cols[0]
            .rcs
            .iter()
            .map(|rc| rc.alu.res())
            .collect();
        // Row r adds the committed result of row r-1 (wrapping) to its R0.
        assert_eq!(results, vec![4 + 1, 1 + 2, 2 + 3, 3 + 4]);
    }

    #[test]
    fn two_branches_in_one_cycle_is_a_hard_error() {
        let mut cgra = Cgra::new();
        let rows = vec![
            cycle("JUMP 0", "NOP", "NOP", ["NOP"; CGRA_ROWS]),
            nops(),
        ];
        kernel_on(&mut cgra, &rows, ColUsage::Both);
        assert_eq!(
            cgra.run_kernel(1, None),
            Err(RunError::TwoBranches { pc: 0 })
        );
    }

    #[test]
    fn single_branch_redirects_both_columns() {
        let mut cgra = Cgra::new();
        // Column 0 branches over the EXIT; column 1 follows the shared pc.
        let rows_c0 = vec![
            cycle("JUMP 2", "NOP", "NOP", ["NOP"; CGRA_ROWS]),
            cycle("EXIT", "NOP", "NOP", ["NOP"; CGRA_ROWS]),
            nops(),
        ];
        let rows_c1 = vec![nops(), nops(), nops()];
        assemble_column(&mut cgra.imem, 0, 0, &rows_c0).unwrap();
        assemble_column(&mut cgra.imem, 3, 1, &rows_c1).unwrap();
        cgra.configure_kernel(
            1,
            KmemWord {
                n_instr: 3,
                imem_start: 0,
                cols: ColUsage::Both,
                srf_spm_bank: 0,
            },
        )
        .unwrap();
        let report = cgra.run_kernel(1, None).unwrap();
        assert_eq!(report.status, RunStatus::Drained);
        assert_eq!(report.cycles, 2);
    }

    #[test]
    fn step_limit_reports_distinct_status() {
        let mut cgra = Cgra::new();
        let rows = vec![cycle("JUMP 0", "NOP", "NOP", ["NOP"; CGRA_ROWS])];
        kernel(&mut cgra, &rows);
        let report = cgra.run_kernel(1, Some(10)).unwrap();
        assert_eq!(report.status, RunStatus::LimitReached);
        assert_eq!(report.cycles, 10);
    }

    #[test]
    fn srf_write_lands_at_cycle_end() {
        let mut cgra = Cgra::new();
        let rows = vec![cycle(
            "SADD SRF(3), R0, ONE",
            "NOP",
            "NOP",
            ["NOP"; CGRA_ROWS],
        )];
        kernel(&mut cgra, &rows);
        cgra.cols[0].lcu.regs[0] = 9;
        cgra.run_kernel(1, None).unwrap();
        assert_eq!(cgra.cols[0].srf.regs[3], 10);
    }

    #[test]
    fn mxcu_cursor_update_is_invisible_to_same_cycle_rcs() {
        let mut cgra = Cgra::new();
        // MXCU advances R0 while the RCs read lane R0: the RCs must see
        // the old cursor.
        let rows = vec![cycle(
            "NOP",
            "NOP",
            "SADD R0, R0, ONE",
            ["SADD R1, VWR_A, ZERO", "NOP", "NOP", "NOP"],
        )];
        kernel(&mut cgra, &rows);
        cgra.cols[0].vwrs[0].words[0] = 55; // lane 0 of row 0
        cgra.cols[0].vwrs[0].words[1] = 77;
        cgra.run_kernel(1, None).unwrap();
        assert_eq!(cgra.cols[0].rcs[0].regs[1], 55);
        assert_eq!(cgra.cols[0].mxcu.regs[0], 1);
    }

    #[test]
    fn rc_lane_write_uses_row_slice_and_letter() {
        let mut cgra = Cgra::new();
        let rows = vec![cycle(
            "NOP",
            "NOP",
            "NOP",
            ["NOP", "SADD VWR_C, ZERO, ONE", "NOP", "NOP"],
        )];
        kernel(&mut cgra, &rows);
        cgra.cols[0].mxcu.regs[0] = 3; // lane 3
        cgra.run_kernel(1, None).unwrap();
        // Row 1 slice starts at word 32.
        assert_eq!(cgra.cols[0].vwrs[2].words[32 + 3], 1);
    }

    #[test]
    fn lvwr_loads_a_whole_line() {
        let mut cgra = Cgra::new();
        let data: Vec<i32> = (0..SPM_NWORDS as i32).collect();
        cgra.spm.set_line(5, &data).unwrap();
        let rows = vec![cycle("NOP", "LVWR VWR_B, 5", "NOP", ["NOP"; CGRA_ROWS])];
        kernel(&mut cgra, &rows);
        cgra.run_kernel(1, None).unwrap();
        assert_eq!(cgra.cols[0].vwrs[1].words[..], data[..]);
    }

    #[test]
    fn division_by_zero_aborts_with_context() {
        let mut cgra = Cgra::new();
        let rows = vec![cycle(
            "NOP",
            "NOP",
            "NOP",
            ["NOP", "NOP", "SDIV R0, ONE, ZERO", "NOP"],
        )];
        kernel(&mut cgra, &rows);
        assert_eq!(
            cgra.run_kernel(1, None),
            Err(RunError::DivideByZero {
                pc: 0,
                col: 0,
                slot: Slot::Rc(2)
            })
        );
    }

    #[test]
    fn locals_persist_across_runs() {
        let mut cgra = Cgra::new();
        let rows = vec![cycle(
            "SADDI R1, R1, 5",
            "NOP",
            "NOP",
            ["NOP"; CGRA_ROWS],
        )];
        kernel(&mut cgra, &rows);
        cgra.run_kernel(1, None).unwrap();
        cgra.run_kernel(1, None).unwrap();
        assert_eq!(cgra.cols[0].lcu.regs[1], 10);
    }
}
