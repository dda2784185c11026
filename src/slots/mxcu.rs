/*!
Multiplexer Control Unit: holder of the cycle's shared-resource controls
and of the VWR slice cursor.

At runtime the shared fields of its word are consumed by the engine (they
become the `MxcuCtrl` every other slot sees); what executes here is only
the MXCU's own register/ALU update, typically advancing R0, the slice
cursor, or adjusting a mask register.
*/

use log::debug;

use crate::alu::Alu;
use crate::error::RunError;
use crate::isa::mxcu::{MxcuAluOp, MxcuMux, MxcuWord, NUM_REGS};
use crate::params::{CGRA_ROWS, SLOT_IMEM_DEPTH, SPM_NWORDS};
use crate::slots::{CycleCtx, MxcuOutcome};

/// Reset value of the three VWR mask registers: a full row slice.
pub const MASK_RESET: i32 = (SPM_NWORDS / CGRA_ROWS - 1) as i32;

#[derive(Debug, Clone)]
pub struct Mxcu {
    pub regs: [i32; NUM_REGS],
    pub imem: [u32; SLOT_IMEM_DEPTH],
    pub alu: Alu,
}

impl Default for Mxcu {
    fn default() -> Self {
        Self::new()
    }
}

impl Mxcu {
    pub fn new() -> Self {
        let mut regs = [0; NUM_REGS];
        // R5/R6/R7 are the VWR A/B/C lane masks.
        regs[5] = MASK_RESET;
        regs[6] = MASK_RESET;
        regs[7] = MASK_RESET;
        Self {
            regs,
            imem: [0; SLOT_IMEM_DEPTH],
            alu: Alu::new(),
        }
    }

    /// Decode the word at `pc`; the engine needs the shared fields before
    /// any slot of the column runs.
    pub fn word_at(&self, pc: usize, col: usize) -> Result<MxcuWord, RunError> {
        MxcuWord::decode(self.imem[pc]).map_err(|source| RunError::BadWord { pc, col, source })
    }

    fn mux(&self, sel: MxcuMux, ctx: &CycleCtx) -> i32 {
        match sel {
            MxcuMux::R0 => self.regs[0],
            MxcuMux::R1 => self.regs[1],
            MxcuMux::R2 => self.regs[2],
            MxcuMux::R3 => self.regs[3],
            MxcuMux::R4 => self.regs[4],
            MxcuMux::R5 => self.regs[5],
            MxcuMux::R6 => self.regs[6],
            MxcuMux::R7 => self.regs[7],
            MxcuMux::Srf => ctx.srf_read(),
            MxcuMux::Zero => 0,
            MxcuMux::One => 1,
            MxcuMux::Last => MASK_RESET,
        }
    }

    /// Execute the MXCU's own update for the cycle.
    pub fn run(&mut self, ctx: &CycleCtx, word: &MxcuWord) -> Result<MxcuOutcome, RunError> {
        let mut out = MxcuOutcome::default();
        if word.alu_op == MxcuAluOp::Nop {
            self.alu.nop();
            debug!("MXCU: NOP");
            return Ok(out);
        }
        let a = self.mux(word.muxa, ctx);
        let b = self.mux(word.muxb, ctx);
        match word.alu_op {
            MxcuAluOp::Sadd => self.alu.sadd(a, b),
            MxcuAluOp::Ssub => self.alu.ssub(a, b),
            MxcuAluOp::Sll => self.alu.sll(a, b),
            MxcuAluOp::Srl => self.alu.srl(a, b),
            MxcuAluOp::Sra => self.alu.sra(a, b),
            MxcuAluOp::Land => self.alu.land(a, b),
            MxcuAluOp::Lor => self.alu.lor(a, b),
            MxcuAluOp::Lxor => self.alu.lxor(a, b),
            MxcuAluOp::Nop => unreachable!(),
        }
        let res = self.alu.pending_res();
        if word.rf_we {
            out.reg_write = Some((word.rf_wsel as usize, res));
        } else {
            out.srf_claim = Some(res);
        }
        debug!("MXCU: {} --> {}", word.asm(), res);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::mxcu::parse;
    use crate::mem::{Spm, Srf, Vwr};
    use crate::params::{CGRA_COLS, N_VWR_PER_COL};
    use crate::slots::{MxcuCtrl, RcView};

    fn ctx_parts() -> (Srf, [Vwr; N_VWR_PER_COL], Spm, [[RcView; CGRA_ROWS]; CGRA_COLS]) {
        (
            Srf::new(),
            [Vwr::new(), Vwr::new(), Vwr::new()],
            Spm::new(),
            [[RcView::default(); CGRA_ROWS]; CGRA_COLS],
        )
    }

    #[test]
    fn masks_reset_to_full_slice() {
        let mxcu = Mxcu::new();
        assert_eq!(mxcu.regs[5], 31);
        assert_eq!(mxcu.regs[7], 31);
        assert_eq!(mxcu.regs[0], 0);
    }

    #[test]
    fn cursor_increment() {
        let (srf, vwrs, spm, rcs) = ctx_parts();
        let mut mxcu = Mxcu::new();
        mxcu.regs[0] = 4;
        let (word, _) = parse("SADD R0, R0, ONE").unwrap();
        let ctx = CycleCtx {
            pc: 0,
            col: 0,
            srf: &srf,
            vwrs: &vwrs,
            spm: &spm,
            ctrl: MxcuCtrl::new(&word, &mxcu.regs),
            rcs: &rcs,
        };
        let out = mxcu.run(&ctx, &word).unwrap();
        assert_eq!(out.reg_write, Some((0, 5)));
        // The write is deferred: the register itself is untouched until commit.
        assert_eq!(mxcu.regs[0], 4);
    }

    #[test]
    fn srf_destination_claims_the_write_port() {
        let (mut srf, vwrs, spm, rcs) = ctx_parts();
        srf.regs[2] = 5;
        let mut mxcu = Mxcu::new();
        let (mut word, use_) = parse("SADD SRF(2), SRF(2), ONE").unwrap();
        word.srf_sel = use_.read.unwrap() as u8;
        word.srf_we = true;
        let ctx = CycleCtx {
            pc: 0,
            col: 0,
            srf: &srf,
            vwrs: &vwrs,
            spm: &spm,
            ctrl: MxcuCtrl::new(&word, &mxcu.regs),
            rcs: &rcs,
        };
        let out = mxcu.run(&ctx, &word).unwrap();
        assert_eq!(out.srf_claim, Some(6));
    }
}
