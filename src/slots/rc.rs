/*!
Reconfigurable Cell: one datapath lane of the 4x2 toroidal mesh.

Neighbour links read the *committed* (previous-cycle) result of the linked
cell, so the order the engine runs the RCs in never matters. `RCT`/`RCB`
wrap within the column's rows, `RCL`/`RCR` wrap across columns.
*/

use log::debug;

use crate::alu::{Alu, AluTrap};
use crate::error::{RunError, Slot};
use crate::isa::rc::{NUM_REGS, RcAluOp, RcMux, RcMuxF, RcWord};
use crate::params::{CGRA_COLS, CGRA_ROWS, SLOT_IMEM_DEPTH};
use crate::slots::{CycleCtx, RcOutcome, RcView};

/// Toroidal neighbour coordinates of `(row, col)` along one link.
/// `RCT` is the row above, `RCB` below, `RCL`/`RCR` the adjacent columns.
pub fn neighbour(row: usize, col: usize, link: RcMuxF) -> (usize, usize) {
    match link {
        RcMuxF::Own => (row, col),
        RcMuxF::Rct => ((row + CGRA_ROWS - 1) % CGRA_ROWS, col),
        RcMuxF::Rcb => ((row + 1) % CGRA_ROWS, col),
        RcMuxF::Rcl => (row, (col + CGRA_COLS - 1) % CGRA_COLS),
        RcMuxF::Rcr => (row, (col + 1) % CGRA_COLS),
    }
}

#[derive(Debug, Clone)]
pub struct Rc {
    pub regs: [i32; NUM_REGS],
    pub imem: [u32; SLOT_IMEM_DEPTH],
    pub alu: Alu,
}

impl Default for Rc {
    fn default() -> Self {
        Self::new()
    }
}

impl Rc {
    pub fn new() -> Self {
        Self {
            regs: [0; NUM_REGS],
            imem: [0; SLOT_IMEM_DEPTH],
            alu: Alu::new(),
        }
    }

    fn neighbour_view(ctx: &CycleCtx, row: usize, link: RcMuxF) -> RcView {
        let (r, c) = neighbour(row, ctx.col, link);
        ctx.rcs[c][r]
    }

    fn mux(&self, sel: RcMux, ctx: &CycleCtx, row: usize) -> Result<i32, RunError> {
        use crate::isa::VwrLetter;
        Ok(match sel {
            RcMux::VwrA => ctx.vwr_read(VwrLetter::A, row, Slot::Rc(row))?,
            RcMux::VwrB => ctx.vwr_read(VwrLetter::B, row, Slot::Rc(row))?,
            RcMux::VwrC => ctx.vwr_read(VwrLetter::C, row, Slot::Rc(row))?,
            RcMux::Srf => ctx.srf_read(),
            RcMux::R0 => self.regs[0],
            RcMux::R1 => self.regs[1],
            RcMux::Rct => Self::neighbour_view(ctx, row, RcMuxF::Rct).res,
            RcMux::Rcb => Self::neighbour_view(ctx, row, RcMuxF::Rcb).res,
            RcMux::Rcl => Self::neighbour_view(ctx, row, RcMuxF::Rcl).res,
            RcMux::Rcr => Self::neighbour_view(ctx, row, RcMuxF::Rcr).res,
            RcMux::Zero => 0,
            RcMux::One => 1,
            RcMux::MaxInt => i32::MAX,
            RcMux::MinInt => i32::MIN,
        })
    }

    fn trap(ctx: &CycleCtx, row: usize, trap: AluTrap) -> RunError {
        match trap {
            AluTrap::DivideByZero => RunError::DivideByZero {
                pc: ctx.pc,
                col: ctx.col,
                slot: Slot::Rc(row),
            },
            AluTrap::FxpDivReserved => RunError::FxpDivReserved {
                pc: ctx.pc,
                col: ctx.col,
                slot: Slot::Rc(row),
            },
        }
    }

    /// Execute this cell's word at `ctx.pc`. `row` is the cell's own row.
    pub fn run(&mut self, ctx: &CycleCtx, row: usize) -> Result<RcOutcome, RunError> {
        let word = RcWord::decode(self.imem[ctx.pc]).map_err(|mut source| {
            source.slot = Slot::Rc(row);
            RunError::BadWord {
                pc: ctx.pc,
                col: ctx.col,
                source,
            }
        })?;
        let a = self.mux(word.muxa, ctx, row)?;
        let b = self.mux(word.muxb, ctx, row)?;
        let mut out = RcOutcome::default();

        match word.alu_op {
            RcAluOp::Nop => {
                self.alu.nop();
                debug!("RC{row}: NOP");
                return Ok(out);
            }
            RcAluOp::Sadd if word.op_mode => self.alu.saddh(a, b),
            RcAluOp::Sadd => self.alu.sadd(a, b),
            RcAluOp::Ssub if word.op_mode => self.alu.ssubh(a, b),
            RcAluOp::Ssub => self.alu.ssub(a, b),
            RcAluOp::Smul if word.op_mode => self.alu.smulh(a, b),
            RcAluOp::Smul => self.alu.smul(a, b),
            RcAluOp::Sdiv => {
                if word.op_mode {
                    self.alu.sdivh(a, b)
                } else {
                    self.alu.sdiv(a, b)
                }
                .map_err(|t| Self::trap(ctx, row, t))?
            }
            RcAluOp::Sll if word.op_mode => self.alu.sllh(a, b),
            RcAluOp::Sll => self.alu.sll(a, b),
            RcAluOp::Srl if word.op_mode => self.alu.srlh(a, b),
            RcAluOp::Srl => self.alu.srl(a, b),
            RcAluOp::Sra if word.op_mode => self.alu.srah(a, b),
            RcAluOp::Sra => self.alu.sra(a, b),
            RcAluOp::Land if word.op_mode => self.alu.landh(a, b),
            RcAluOp::Land => self.alu.land(a, b),
            RcAluOp::Lor if word.op_mode => self.alu.lorh(a, b),
            RcAluOp::Lor => self.alu.lor(a, b),
            RcAluOp::Lxor if word.op_mode => self.alu.lxorh(a, b),
            RcAluOp::Lxor => self.alu.lxor(a, b),
            RcAluOp::InbSfIna | RcAluOp::InbZfIna => {
                // Flags come from committed state: own previous op or a
                // neighbour's, never a value produced this cycle.
                let view = match word.muxf {
                    RcMuxF::Own => RcView {
                        res: self.alu.res(),
                        sign: self.alu.sign(),
                        zero: self.alu.zero(),
                    },
                    link => Self::neighbour_view(ctx, row, link),
                };
                if word.alu_op == RcAluOp::InbSfIna {
                    self.alu.sfga(a, b, view.sign);
                } else {
                    self.alu.zfga(a, b, view.zero);
                }
            }
            RcAluOp::FxpMul => self.alu.fxp_mul(a, b),
            RcAluOp::FxpDiv => {
                self.alu.fxp_div(a, b).map_err(|t| Self::trap(ctx, row, t))?;
            }
        }

        let res = self.alu.pending_res();
        if word.rf_we {
            out.reg_write = Some((word.rf_wsel as usize, res));
        } else if ctx.ctrl.vwr_row_we[row] {
            let idx = ctx.vwr_lane_index(ctx.ctrl.vwr_sel, row, Slot::Rc(row))?;
            out.vwr_write = Some((idx, res));
        } else {
            out.srf_claim = Some(res);
        }

        debug!(
            "RC{row}: {} --> {}",
            word.asm(ctx.ctrl.srf_sel, ctx.ctrl.vwr_sel, ctx.ctrl.vwr_row_we[row]),
            res
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::VwrLetter;
    use crate::isa::mxcu::MxcuWord;
    use crate::isa::rc::parse;
    use crate::mem::{Spm, Srf, Vwr};
    use crate::params::N_VWR_PER_COL;
    use crate::slots::MxcuCtrl;

    struct Fixture {
        srf: Srf,
        vwrs: [Vwr; N_VWR_PER_COL],
        spm: Spm,
        rcs: [[RcView; CGRA_ROWS]; CGRA_COLS],
        ctrl: MxcuCtrl,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                srf: Srf::new(),
                vwrs: [Vwr::new(), Vwr::new(), Vwr::new()],
                spm: Spm::new(),
                rcs: [[RcView::default(); CGRA_ROWS]; CGRA_COLS],
                ctrl: MxcuCtrl::new(&MxcuWord::default(), &[0, 0, 0, 0, 0, 31, 31, 31]),
            }
        }

        fn ctx(&self) -> CycleCtx<'_> {
            CycleCtx {
                pc: 0,
                col: 0,
                srf: &self.srf,
                vwrs: &self.vwrs,
                spm: &self.spm,
                ctrl: self.ctrl,
                rcs: &self.rcs,
            }
        }
    }

    fn rc_with(text: &str) -> Rc {
        let mut rc = Rc::new();
        let (word, _, _) = parse(text).unwrap();
        rc.imem[0] = word.encode();
        rc
    }

    #[test]
    fn torus_wraps_on_every_side() {
        assert_eq!(neighbour(0, 0, RcMuxF::Rct), (3, 0));
        assert_eq!(neighbour(3, 0, RcMuxF::Rcb), (0, 0));
        assert_eq!(neighbour(2, 0, RcMuxF::Rcl), (2, 1));
        assert_eq!(neighbour(2, 1, RcMuxF::Rcr), (2, 0));
    }

    #[test]
    fn neighbour_data_comes_from_committed_results() {
        let mut fx = Fixture::new();
        fx.rcs[0][3].res = 40; // RCT of row 0 wraps to row 3
        let mut rc = rc_with("SADD R0, RCT, ONE");
        let out = rc.run(&fx.ctx(), 0).unwrap();
        assert_eq!(out.reg_write, Some((0, 41)));
    }

    #[test]
    fn vwr_read_uses_the_row_slice() {
        let mut fx = Fixture::new();
        // Lane 2 selected (R0 = 2, masks = 31); row 1 owns words 32..64.
        fx.ctrl = MxcuCtrl::new(&MxcuWord::default(), &[2, 0, 0, 0, 0, 31, 31, 31]);
        fx.vwrs[0].words[34] = 7;
        let mut rc = rc_with("SADD R1, VWR_A, ZERO");
        let out = rc.run(&fx.ctx(), 1).unwrap();
        assert_eq!(out.reg_write, Some((1, 7)));
    }

    #[test]
    fn vwr_write_goes_through_the_row_enable() {
        let mut fx = Fixture::new();
        let mut word = MxcuWord::default();
        word.vwr_sel = VwrLetter::B;
        word.vwr_row_we = [false, false, true, false];
        fx.ctrl = MxcuCtrl::new(&word, &[5, 0, 0, 0, 0, 31, 31, 31]);
        let mut rc = rc_with("SADD VWR_B, ZERO, ONE");
        let out = rc.run(&fx.ctx(), 2).unwrap();
        // Row 2, lane 5: word 2*32 + 5.
        assert_eq!(out.vwr_write, Some((69, 1)));
        assert_eq!(out.srf_claim, None);
    }

    #[test]
    fn masked_lane_out_of_slice_faults() {
        let mut fx = Fixture::new();
        // Mask of VWR_A left wide open: lane 40 is outside the 32-lane slice.
        fx.ctrl = MxcuCtrl::new(&MxcuWord::default(), &[40, 0, 0, 0, 0, 127, 31, 31]);
        let mut rc = rc_with("SADD R0, VWR_A, ZERO");
        assert!(matches!(
            rc.run(&fx.ctx(), 0),
            Err(RunError::VwrOutOfRange { .. })
        ));
    }

    #[test]
    fn gated_select_consults_a_neighbour_flag() {
        let mut fx = Fixture::new();
        fx.rcs[0][1].sign = true; // RCB of row 0
        let mut rc = rc_with("SFGA R0, ONE, ZERO, RCB");
        let out = rc.run(&fx.ctx(), 0).unwrap();
        assert_eq!(out.reg_write, Some((0, 1)));
        fx.rcs[0][1].sign = false;
        let out = rc.run(&fx.ctx(), 0).unwrap();
        assert_eq!(out.reg_write, Some((0, 0)));
    }

    #[test]
    fn own_flag_is_previous_cycle_state() {
        let fx = Fixture::new();
        let mut rc = rc_with("ZFGA R0, ONE, ZERO, OWN");
        // Pending zero flag set but not committed: OWN still reads false.
        rc.alu.ssub(1, 1);
        let out = rc.run(&fx.ctx(), 0).unwrap();
        assert_eq!(out.reg_write, Some((0, 0)));
        rc.alu.ssub(1, 1);
        rc.alu.commit();
        let out = rc.run(&fx.ctx(), 0).unwrap();
        assert_eq!(out.reg_write, Some((0, 1)));
    }

    #[test]
    fn half_precision_path() {
        let fx = Fixture::new();
        let mut rc = rc_with("SADD.H R0, MAX_INT, ONE");
        let out = rc.run(&fx.ctx(), 0).unwrap();
        // Low 16 bits of MAX_INT are 0xFFFF = -1; -1 + 1 = 0.
        assert_eq!(out.reg_write, Some((0, 0)));
    }

    #[test]
    fn division_by_zero_faults_with_context() {
        let fx = Fixture::new();
        let mut rc = rc_with("SDIV R0, ONE, ZERO");
        assert_eq!(
            rc.run(&fx.ctx(), 3),
            Err(RunError::DivideByZero {
                pc: 0,
                col: 0,
                slot: Slot::Rc(3)
            })
        );
    }

    #[test]
    fn fxp_div_is_reserved() {
        let fx = Fixture::new();
        let mut rc = rc_with("DIV.FP R0, R0, R1");
        assert!(matches!(
            rc.run(&fx.ctx(), 0),
            Err(RunError::FxpDivReserved { .. })
        ));
    }

    #[test]
    fn srf_claim_when_no_other_destination() {
        let mut fx = Fixture::new();
        fx.srf.regs[4] = 10;
        let mut word = MxcuWord::default();
        word.srf_sel = 4;
        word.srf_we = true;
        word.alu_srf_write = true;
        fx.ctrl = MxcuCtrl::new(&word, &[0; 8]);
        let mut rc = rc_with("SADD SRF(4), SRF(4), ONE");
        let out = rc.run(&fx.ctx(), 0).unwrap();
        assert_eq!(out.srf_claim, Some(11));
    }
}
