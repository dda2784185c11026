/*!
Load/Store Unit: the column's mover between the SPM, the VWRs and its own
register file.

Stream cursors
==============
`LWD`/`SWD` walk two word-granular cursors over the kernel's SPM bank:
the input stream starts at word 0 of the bank line (`R7`), the output
stream at word 0 of the following line. Both cursors reset at kernel
start and spill across lines.
*/

use log::debug;

use crate::alu::Alu;
use crate::error::{RunError, Slot};
use crate::isa::lsu::{LsuMuxA, LsuMuxB, LsuOp, LsuWord, NUM_REGS};
use crate::params::{SLOT_IMEM_DEPTH, SPM_NLINES, SPM_NWORDS, SPM_TOTAL_WORDS};
use crate::slots::{CycleCtx, LsuOutcome};

#[derive(Debug, Clone)]
pub struct Lsu {
    pub regs: [i32; NUM_REGS],
    pub imem: [u32; SLOT_IMEM_DEPTH],
    pub alu: Alu,
    load_cursor: usize,
    store_cursor: usize,
}

impl Default for Lsu {
    fn default() -> Self {
        Self::new()
    }
}

impl Lsu {
    pub fn new() -> Self {
        Self {
            regs: [0; NUM_REGS],
            imem: [0; SLOT_IMEM_DEPTH],
            alu: Alu::new(),
            load_cursor: 0,
            store_cursor: 0,
        }
    }

    /// Rewind both stream cursors. Called at kernel start.
    pub fn reset_streams(&mut self) {
        self.load_cursor = 0;
        self.store_cursor = 0;
    }

    #[inline]
    pub fn load_cursor(&self) -> usize {
        self.load_cursor
    }

    #[inline]
    pub fn store_cursor(&self) -> usize {
        self.store_cursor
    }

    fn mux_a(&self, sel: LsuMuxA, ctx: &CycleCtx, imm: i32) -> i32 {
        match sel {
            LsuMuxA::R0 => self.regs[0],
            LsuMuxA::R1 => self.regs[1],
            LsuMuxA::R2 => self.regs[2],
            LsuMuxA::R3 => self.regs[3],
            LsuMuxA::R7 => self.regs[7],
            LsuMuxA::Srf => ctx.srf_read(),
            LsuMuxA::Zero => 0,
            LsuMuxA::Imm => imm,
        }
    }

    fn mux_b(&self, sel: LsuMuxB, ctx: &CycleCtx) -> i32 {
        match sel {
            LsuMuxB::R0 => self.regs[0],
            LsuMuxB::R1 => self.regs[1],
            LsuMuxB::R2 => self.regs[2],
            LsuMuxB::R3 => self.regs[3],
            LsuMuxB::R7 => self.regs[7],
            LsuMuxB::Srf => ctx.srf_read(),
            LsuMuxB::Zero => 0,
            LsuMuxB::One => 1,
        }
    }

    fn spm_fault(ctx: &CycleCtx, addr: i64) -> RunError {
        RunError::SpmOutOfRange {
            pc: ctx.pc,
            col: ctx.col,
            slot: Slot::Lsu,
            addr,
        }
    }

    fn spm_word_addr(&self, ctx: &CycleCtx, addr: i64) -> Result<usize, RunError> {
        if !(0..SPM_TOTAL_WORDS as i64).contains(&addr) {
            return Err(Self::spm_fault(ctx, addr));
        }
        Ok(addr as usize)
    }

    fn spm_read(ctx: &CycleCtx, addr: i64) -> Result<i32, RunError> {
        usize::try_from(addr)
            .ok()
            .and_then(|a| ctx.spm.word(a))
            .ok_or_else(|| Self::spm_fault(ctx, addr))
    }

    fn spm_line_addr(&self, ctx: &CycleCtx, line: i64) -> Result<usize, RunError> {
        if !(0..SPM_NLINES as i64).contains(&line) {
            return Err(RunError::SpmOutOfRange {
                pc: ctx.pc,
                col: ctx.col,
                slot: Slot::Lsu,
                addr: line,
            });
        }
        Ok(line as usize)
    }

    fn write_back(word: &LsuWord, value: i32, out: &mut LsuOutcome) {
        if word.rf_we {
            out.reg_write = Some((word.rf_wsel as usize, value));
        } else {
            out.srf_claim = Some(value);
        }
    }

    /// Execute the LSU's word at `ctx.pc`.
    pub fn run(&mut self, ctx: &CycleCtx) -> Result<LsuOutcome, RunError> {
        let word = LsuWord::decode(self.imem[ctx.pc]).map_err(|source| RunError::BadWord {
            pc: ctx.pc,
            col: ctx.col,
            source,
        })?;
        let imm = word.imm as i32;
        let a = self.mux_a(word.muxa, ctx, imm);
        let b = self.mux_b(word.muxb, ctx);
        let bank = self.regs[7] as i64;
        let mut out = LsuOutcome::default();
        let mut shown = self.alu.pending_res();

        match word.op {
            LsuOp::Nop => self.alu.nop(),
            LsuOp::Lwd => {
                let value =
                    Self::spm_read(ctx, bank * SPM_NWORDS as i64 + self.load_cursor as i64)?;
                self.load_cursor += 1;
                Self::write_back(&word, value, &mut out);
                shown = value;
            }
            LsuOp::Swd => {
                let addr = self
                    .spm_word_addr(ctx, (bank + 1) * SPM_NWORDS as i64 + self.store_cursor as i64)?;
                self.store_cursor += 1;
                out.spm_word = Some((addr, b));
                shown = b;
            }
            LsuOp::Lwi => {
                let value = Self::spm_read(ctx, a as i64)?;
                Self::write_back(&word, value, &mut out);
                shown = value;
            }
            LsuOp::Swi => {
                let addr = self.spm_word_addr(ctx, a as i64)?;
                out.spm_word = Some((addr, b));
                shown = b;
            }
            LsuOp::Lvwr => {
                let line = self.spm_line_addr(ctx, a as i64)?;
                let src = ctx.spm.line(line).ok_or_else(|| Self::spm_fault(ctx, a as i64))?;
                let mut data = [0i32; SPM_NWORDS];
                data.copy_from_slice(src);
                out.vwr_line = Some(data);
            }
            LsuOp::Svwr => {
                let line = self.spm_line_addr(ctx, a as i64)?;
                out.spm_line = Some((line, ctx.vwrs[ctx.ctrl.vwr_sel.index()].words));
            }
            op => {
                let (x, y) = if word.muxa == LsuMuxA::Imm {
                    (b, imm)
                } else {
                    (a, b)
                };
                match op {
                    LsuOp::Sadd => self.alu.sadd(x, y),
                    LsuOp::Ssub => self.alu.ssub(x, y),
                    LsuOp::Sll => self.alu.sll(x, y),
                    LsuOp::Srl => self.alu.srl(x, y),
                    LsuOp::Sra => self.alu.sra(x, y),
                    LsuOp::Land => self.alu.land(x, y),
                    LsuOp::Lor => self.alu.lor(x, y),
                    LsuOp::Lxor => self.alu.lxor(x, y),
                    _ => unreachable!(),
                }
                let res = self.alu.pending_res();
                Self::write_back(&word, res, &mut out);
                shown = res;
            }
        }

        debug!(
            "LSU: {} --> {}",
            word.asm(ctx.ctrl.srf_sel, ctx.ctrl.vwr_sel),
            shown
        );
        Ok(out)
    }
}
