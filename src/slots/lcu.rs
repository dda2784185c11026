/*!
Loop Control Unit: the slot that owns the program counter.

Runs last in every cycle so its RC-flag branch mode can observe the flags
the RCs produced this cycle. Reports a branch target and/or the column
exit flag to the engine; the engine arbitrates across columns.

BGEPD is the one post-effect instruction: the comparison is made on the
undecremented A operand, and `a - 1` is written back only where a write
enable exists (local register via `rf_we`, SRF via the MXCU write-enable).
*/

use log::debug;

use crate::alu::Alu;
use crate::error::RunError;
use crate::isa::lcu::{LAST, LcuAluOp, LcuMuxA, LcuMuxB, LcuWord, NUM_REGS};
use crate::params::SLOT_IMEM_DEPTH;
use crate::slots::{CycleCtx, LcuOutcome, RcView};

#[derive(Debug, Clone)]
pub struct Lcu {
    pub regs: [i32; NUM_REGS],
    pub imem: [u32; SLOT_IMEM_DEPTH],
    pub alu: Alu,
}

impl Default for Lcu {
    fn default() -> Self {
        Self::new()
    }
}

impl Lcu {
    pub fn new() -> Self {
        Self {
            regs: [0; NUM_REGS],
            imem: [0; SLOT_IMEM_DEPTH],
            alu: Alu::new(),
        }
    }

    fn mux_a(&self, sel: LcuMuxA, ctx: &CycleCtx, imm: i32) -> i32 {
        match sel {
            LcuMuxA::R0 => self.regs[0],
            LcuMuxA::R1 => self.regs[1],
            LcuMuxA::R2 => self.regs[2],
            LcuMuxA::R3 => self.regs[3],
            LcuMuxA::Srf => ctx.srf_read(),
            LcuMuxA::Last => LAST,
            LcuMuxA::Zero => 0,
            LcuMuxA::Imm => imm,
        }
    }

    fn mux_b(&self, sel: LcuMuxB, ctx: &CycleCtx) -> i32 {
        match sel {
            LcuMuxB::R0 => self.regs[0],
            LcuMuxB::R1 => self.regs[1],
            LcuMuxB::R2 => self.regs[2],
            LcuMuxB::R3 => self.regs[3],
            LcuMuxB::Srf => ctx.srf_read(),
            LcuMuxB::Last => LAST,
            LcuMuxB::Zero => 0,
            LcuMuxB::One => 1,
        }
    }

    fn cond(op: LcuAluOp, sign: bool, zero: bool) -> bool {
        match op {
            LcuAluOp::Beq => zero,
            LcuAluOp::Bne => !zero,
            LcuAluOp::Blt => sign && !zero,
            LcuAluOp::Bgepd => !sign || zero,
            _ => false,
        }
    }

    /// Execute the LCU's word at `pc`. `rc_flags` are this cycle's pending
    /// RC ALU states of the same column.
    pub fn run(
        &mut self,
        ctx: &CycleCtx,
        rc_flags: &[RcView; crate::params::CGRA_ROWS],
    ) -> Result<LcuOutcome, RunError> {
        let word = LcuWord::decode(self.imem[ctx.pc]).map_err(|source| RunError::BadWord {
            pc: ctx.pc,
            col: ctx.col,
            source,
        })?;
        let imm = word.imm as i32;
        let a = self.mux_a(word.muxa, ctx, imm);
        let b = self.mux_b(word.muxb, ctx);
        let mut out = LcuOutcome::default();

        match word.alu_op {
            LcuAluOp::Nop => self.alu.nop(),
            LcuAluOp::Exit => out.exit = true,
            LcuAluOp::Jump => out.branch = Some(a.wrapping_add(b) as i64),
            op if op.is_branch() => {
                let taken = if word.br_mode {
                    // Any-true across the column's rows.
                    rc_flags.iter().any(|f| Self::cond(op, f.sign, f.zero))
                } else {
                    self.alu.ssub(a, b);
                    Self::cond(op, self.alu.pending_sign(), self.alu.pending_zero())
                };
                if taken {
                    out.branch = Some(imm as i64);
                }
                if op == LcuAluOp::Bgepd && !word.br_mode {
                    let dec = a.wrapping_sub(1);
                    if word.rf_we {
                        out.reg_write = Some((word.rf_wsel as usize, dec));
                    } else if word.muxa == LcuMuxA::Srf {
                        out.srf_claim = Some(dec);
                    }
                }
            }
            op => {
                // Arithmetic. An immediate always serves as second operand.
                let (x, y) = if word.muxa == LcuMuxA::Imm {
                    (b, imm)
                } else {
                    (a, b)
                };
                match op {
                    LcuAluOp::Sadd => self.alu.sadd(x, y),
                    LcuAluOp::Ssub => self.alu.ssub(x, y),
                    LcuAluOp::Sll => self.alu.sll(x, y),
                    LcuAluOp::Srl => self.alu.srl(x, y),
                    LcuAluOp::Sra => self.alu.sra(x, y),
                    LcuAluOp::Land => self.alu.land(x, y),
                    LcuAluOp::Lor => self.alu.lor(x, y),
                    LcuAluOp::Lxor => self.alu.lxor(x, y),
                    _ => unreachable!(),
                }
                let res = self.alu.pending_res();
                if word.rf_we {
                    out.reg_write = Some((word.rf_wsel as usize, res));
                } else {
                    out.srf_claim = Some(res);
                }
            }
        }

        debug!(
            "LCU: {} --> {}",
            word.asm(ctx.ctrl.srf_sel),
            self.alu.pending_res()
        );
        Ok(out)
    }
}
