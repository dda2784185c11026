/*!
LCU instruction word (20 bits).

Layout, MSB first:
`muxa_sel(3) | muxb_sel(3) | br_mode(1) | alu_op(4) | rf_we(1) | rf_wsel(2) | imm(6)`

The immediate is unsigned on the wire: branch target for the conditional
branches, ALU input through the `IMM` mux A selector otherwise. `alu_op`
pattern 15 is a duplicate encoding of NOP and decodes as such.
*/

use crate::error::{AsmError, DecodeError, Slot};
use crate::isa::{SrfUse, field, parse_reg, parse_srf, tokens, word_from_hex};

pub const WORD_BITS: u32 = 20;
/// Local data registers of the LCU.
pub const NUM_REGS: usize = 4;
/// Value of the `LAST` mux selector: last VWR lane index of a row.
pub const LAST: i32 = (crate::params::SPM_NWORDS / crate::params::CGRA_ROWS - 1) as i32;

/// LCU ALU operation codes. The numbering is part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LcuAluOp {
    Nop = 0,
    Sadd = 1,
    Ssub = 2,
    Sll = 3,
    Srl = 4,
    Sra = 5,
    Land = 6,
    Lor = 7,
    Lxor = 8,
    Beq = 9,
    Bne = 10,
    Bgepd = 11,
    Blt = 12,
    Jump = 13,
    Exit = 14,
}

impl LcuAluOp {
    fn from_bits(v: u32) -> Self {
        match v {
            1 => LcuAluOp::Sadd,
            2 => LcuAluOp::Ssub,
            3 => LcuAluOp::Sll,
            4 => LcuAluOp::Srl,
            5 => LcuAluOp::Sra,
            6 => LcuAluOp::Land,
            7 => LcuAluOp::Lor,
            8 => LcuAluOp::Lxor,
            9 => LcuAluOp::Beq,
            10 => LcuAluOp::Bne,
            11 => LcuAluOp::Bgepd,
            12 => LcuAluOp::Blt,
            13 => LcuAluOp::Jump,
            14 => LcuAluOp::Exit,
            // 0 and the duplicate pattern 15.
            _ => LcuAluOp::Nop,
        }
    }

    pub fn is_branch(self) -> bool {
        matches!(
            self,
            LcuAluOp::Beq | LcuAluOp::Bne | LcuAluOp::Bgepd | LcuAluOp::Blt
        )
    }

    fn name(self) -> &'static str {
        match self {
            LcuAluOp::Nop => "NOP",
            LcuAluOp::Sadd => "SADD",
            LcuAluOp::Ssub => "SSUB",
            LcuAluOp::Sll => "SLL",
            LcuAluOp::Srl => "SRL",
            LcuAluOp::Sra => "SRA",
            LcuAluOp::Land => "LAND",
            LcuAluOp::Lor => "LOR",
            LcuAluOp::Lxor => "LXOR",
            LcuAluOp::Beq => "BEQ",
            LcuAluOp::Bne => "BNE",
            LcuAluOp::Bgepd => "BGEPD",
            LcuAluOp::Blt => "BLT",
            LcuAluOp::Jump => "JUMP",
            LcuAluOp::Exit => "EXIT",
        }
    }

    /// Mnemonic in RC-flag branch mode (`br_mode = 1`).
    fn flag_mode_name(self) -> &'static str {
        match self {
            LcuAluOp::Beq => "BEQR",
            LcuAluOp::Bne => "BNER",
            LcuAluOp::Bgepd => "BGER",
            LcuAluOp::Blt => "BLTR",
            _ => self.name(),
        }
    }
}

/// Input A selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LcuMuxA {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    Srf = 4,
    Last = 5,
    Zero = 6,
    Imm = 7,
}

/// Input B selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LcuMuxB {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    Srf = 4,
    Last = 5,
    Zero = 6,
    One = 7,
}

impl LcuMuxA {
    fn from_bits(v: u32) -> Self {
        [
            LcuMuxA::R0,
            LcuMuxA::R1,
            LcuMuxA::R2,
            LcuMuxA::R3,
            LcuMuxA::Srf,
            LcuMuxA::Last,
            LcuMuxA::Zero,
            LcuMuxA::Imm,
        ][v as usize & 7]
    }
}

impl LcuMuxB {
    fn from_bits(v: u32) -> Self {
        [
            LcuMuxB::R0,
            LcuMuxB::R1,
            LcuMuxB::R2,
            LcuMuxB::R3,
            LcuMuxB::Srf,
            LcuMuxB::Last,
            LcuMuxB::Zero,
            LcuMuxB::One,
        ][v as usize & 7]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LcuWord {
    pub muxa: LcuMuxA,
    pub muxb: LcuMuxB,
    pub br_mode: bool,
    pub alu_op: LcuAluOp,
    pub rf_we: bool,
    pub rf_wsel: u8,
    pub imm: u8,
}

impl Default for LcuWord {
    /// The all-zero word: `NOP` with both muxes on R0.
    fn default() -> Self {
        Self {
            muxa: LcuMuxA::R0,
            muxb: LcuMuxB::R0,
            br_mode: false,
            alu_op: LcuAluOp::Nop,
            rf_we: false,
            rf_wsel: 0,
            imm: 0,
        }
    }
}

impl LcuWord {
    pub fn encode(&self) -> u32 {
        (self.muxa as u32) << 17
            | (self.muxb as u32) << 14
            | (self.br_mode as u32) << 13
            | (self.alu_op as u32) << 9
            | (self.rf_we as u32) << 8
            | (self.rf_wsel as u32) << 6
            | self.imm as u32
    }

    pub fn decode(word: u32) -> Result<Self, DecodeError> {
        if word >> WORD_BITS != 0 {
            return Err(DecodeError {
                slot: Slot::Lcu,
                word,
                reason: "wider than the instruction word",
            });
        }
        Ok(Self {
            muxa: LcuMuxA::from_bits(field(word, 17, 3)),
            muxb: LcuMuxB::from_bits(field(word, 14, 3)),
            br_mode: field(word, 13, 1) != 0,
            alu_op: LcuAluOp::from_bits(field(word, 9, 4)),
            rf_we: field(word, 8, 1) != 0,
            rf_wsel: field(word, 6, 2) as u8,
            imm: field(word, 0, 6) as u8,
        })
    }

    pub fn from_hex(text: &str) -> Result<Self, DecodeError> {
        Self::decode(word_from_hex(text, WORD_BITS, Slot::Lcu)?)
    }

    pub fn to_hex(&self) -> String {
        format!("{:#x}", self.encode())
    }

    fn muxa_str(&self, srf_sel: usize) -> String {
        match self.muxa {
            LcuMuxA::R0 => "R0".into(),
            LcuMuxA::R1 => "R1".into(),
            LcuMuxA::R2 => "R2".into(),
            LcuMuxA::R3 => "R3".into(),
            LcuMuxA::Srf => format!("SRF({srf_sel})"),
            LcuMuxA::Last => "LAST".into(),
            LcuMuxA::Zero => "ZERO".into(),
            LcuMuxA::Imm => self.imm.to_string(),
        }
    }

    fn muxb_str(&self, srf_sel: usize) -> String {
        match self.muxb {
            LcuMuxB::R0 => "R0".into(),
            LcuMuxB::R1 => "R1".into(),
            LcuMuxB::R2 => "R2".into(),
            LcuMuxB::R3 => "R3".into(),
            LcuMuxB::Srf => format!("SRF({srf_sel})"),
            LcuMuxB::Last => "LAST".into(),
            LcuMuxB::Zero => "ZERO".into(),
            LcuMuxB::One => "ONE".into(),
        }
    }

    /// Disassemble. `srf_sel` is the cycle's MXCU-selected SRF register, so
    /// shared references render concretely.
    pub fn asm(&self, srf_sel: usize) -> String {
        let op = self.alu_op;
        if self.br_mode && op.is_branch() {
            return format!("{} {}", op.flag_mode_name(), self.imm);
        }
        match op {
            LcuAluOp::Nop | LcuAluOp::Exit => op.name().to_string(),
            LcuAluOp::Jump => {
                if self.muxa == LcuMuxA::Imm && self.muxb == LcuMuxB::Zero {
                    format!("JUMP {}", self.imm)
                } else {
                    format!("JUMP {}, {}", self.muxa_str(srf_sel), self.muxb_str(srf_sel))
                }
            }
            _ if op.is_branch() => format!(
                "{} {}, {}, {}",
                op.name(),
                self.muxa_str(srf_sel),
                self.muxb_str(srf_sel),
                self.imm
            ),
            _ => {
                let dest = if self.rf_we {
                    format!("R{}", self.rf_wsel)
                } else {
                    format!("SRF({srf_sel})")
                };
                if self.muxa == LcuMuxA::Imm {
                    format!(
                        "{}I {}, {}, {}",
                        op.name(),
                        dest,
                        self.muxb_str(srf_sel),
                        self.imm
                    )
                } else {
                    format!(
                        "{} {}, {}, {}",
                        op.name(),
                        dest,
                        self.muxa_str(srf_sel),
                        self.muxb_str(srf_sel)
                    )
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Mnemonic parsing
// ---------------------------------------------------------------------------

fn err(instr: &str, reason: impl Into<String>) -> AsmError {
    AsmError::Invalid {
        slot: Slot::Lcu,
        instr: instr.to_string(),
        reason: reason.into(),
    }
}

fn arith_op(name: &str) -> Option<LcuAluOp> {
    Some(match name {
        "SADD" => LcuAluOp::Sadd,
        "SSUB" => LcuAluOp::Ssub,
        "SLL" => LcuAluOp::Sll,
        "SRL" => LcuAluOp::Srl,
        "SRA" => LcuAluOp::Sra,
        "LAND" => LcuAluOp::Land,
        "LOR" => LcuAluOp::Lor,
        "LXOR" => LcuAluOp::Lxor,
        _ => return None,
    })
}

fn branch_op(name: &str) -> Option<LcuAluOp> {
    Some(match name {
        "BEQ" => LcuAluOp::Beq,
        "BNE" => LcuAluOp::Bne,
        "BGEPD" => LcuAluOp::Bgepd,
        "BLT" => LcuAluOp::Blt,
        _ => return None,
    })
}

fn flag_branch_op(name: &str) -> Option<LcuAluOp> {
    Some(match name {
        "BEQR" => LcuAluOp::Beq,
        "BNER" => LcuAluOp::Bne,
        "BGER" => LcuAluOp::Bgepd,
        "BLTR" => LcuAluOp::Blt,
        _ => return None,
    })
}

/// Record an SRF read, enforcing the one-index-per-cycle rule inside a
/// single instruction.
fn note_srf(use_: &mut Option<usize>, idx: usize, instr: &str) -> Result<(), AsmError> {
    match *use_ {
        Some(prev) if prev != idx => Err(err(
            instr,
            "expected only reads/writes to the same reg of the SRF",
        )),
        _ => {
            *use_ = Some(idx);
            Ok(())
        }
    }
}

fn parse_muxa(token: &str, srf: &mut Option<usize>, instr: &str) -> Result<LcuMuxA, AsmError> {
    if let Some(r) = parse_reg(token, NUM_REGS) {
        let n = r.map_err(|_| err(instr, format!("register must be below R{NUM_REGS}")))?;
        return Ok(LcuMuxA::from_bits(n as u32));
    }
    if let Some(s) = parse_srf(token) {
        let n = s.map_err(|_| err(instr, "SRF index out of range"))?;
        note_srf(srf, n, instr)?;
        return Ok(LcuMuxA::Srf);
    }
    match token {
        "LAST" => Ok(LcuMuxA::Last),
        "ZERO" => Ok(LcuMuxA::Zero),
        _ => Err(err(instr, format!("bad A operand `{token}`"))),
    }
}

fn parse_muxb(token: &str, srf: &mut Option<usize>, instr: &str) -> Result<LcuMuxB, AsmError> {
    if let Some(r) = parse_reg(token, NUM_REGS) {
        let n = r.map_err(|_| err(instr, format!("register must be below R{NUM_REGS}")))?;
        return Ok(LcuMuxB::from_bits(n as u32));
    }
    if let Some(s) = parse_srf(token) {
        let n = s.map_err(|_| err(instr, "SRF index out of range"))?;
        note_srf(srf, n, instr)?;
        return Ok(LcuMuxB::Srf);
    }
    match token {
        "LAST" => Ok(LcuMuxB::Last),
        "ZERO" => Ok(LcuMuxB::Zero),
        "ONE" => Ok(LcuMuxB::One),
        _ => Err(err(instr, format!("bad B operand `{token}`"))),
    }
}

fn parse_imm(token: &str, instr: &str) -> Result<u8, AsmError> {
    let v: i64 = token
        .parse()
        .map_err(|_| err(instr, format!("expected an immediate, got `{token}`")))?;
    if !(0..64).contains(&v) {
        return Err(err(instr, "immediate out of range for the 6-bit field"));
    }
    Ok(v as u8)
}

/// Destination: local register or SRF. Returns `(rf_we, rf_wsel, srf_write)`.
fn parse_dest(token: &str, instr: &str) -> Result<(bool, u8, Option<usize>), AsmError> {
    if let Some(r) = parse_reg(token, NUM_REGS) {
        let n = r.map_err(|_| err(instr, format!("destination must be below R{NUM_REGS}")))?;
        return Ok((true, n as u8, None));
    }
    if let Some(s) = parse_srf(token) {
        let n = s.map_err(|_| err(instr, "SRF index out of range"))?;
        // The SRF write commits through the MXCU write-enable, not rf_we.
        return Ok((false, 0, Some(n)));
    }
    Err(err(instr, format!("bad destination `{token}`")))
}

/// Parse one LCU mnemonic into its word and SRF uses.
pub fn parse(instr: &str) -> Result<(LcuWord, SrfUse), AsmError> {
    let toks = tokens(instr);
    let op_name = *toks.first().ok_or_else(|| err(instr, "empty instruction"))?;
    let mut word = LcuWord::default();
    let mut use_ = SrfUse::default();

    if op_name == "NOP" || op_name == "EXIT" {
        if toks.len() > 1 {
            return Err(err(instr, format!("{op_name} does not take operands")));
        }
        word.alu_op = if op_name == "NOP" {
            LcuAluOp::Nop
        } else {
            LcuAluOp::Exit
        };
        return Ok((word, use_));
    }

    if let Some(op) = flag_branch_op(op_name) {
        if toks.len() != 2 {
            return Err(err(instr, "expected 1 operand (branch target)"));
        }
        word.alu_op = op;
        word.br_mode = true;
        word.imm = parse_imm(toks[1], instr)?;
        return Ok((word, use_));
    }

    if let Some(op) = branch_op(op_name) {
        if toks.len() != 4 {
            return Err(err(instr, "expected 3 operands"));
        }
        word.alu_op = op;
        word.muxa = parse_muxa(toks[1], &mut use_.read, instr)?;
        word.muxb = parse_muxb(toks[2], &mut use_.read, instr)?;
        word.imm = parse_imm(toks[3], instr)?;
        // BGEPD writes the decremented A operand back when A is the SRF.
        if op == LcuAluOp::Bgepd && word.muxa == LcuMuxA::Srf {
            use_.write = use_.read;
        }
        return Ok((word, use_));
    }

    if op_name == "JUMP" {
        word.alu_op = LcuAluOp::Jump;
        match toks.len() {
            2 => {
                word.muxa = LcuMuxA::Imm;
                word.muxb = LcuMuxB::Zero;
                word.imm = parse_imm(toks[1], instr)?;
            }
            3 => {
                word.muxa = parse_muxa(toks[1], &mut use_.read, instr)?;
                word.muxb = parse_muxb(toks[2], &mut use_.read, instr)?;
            }
            _ => return Err(err(instr, "expected 1 or 2 operands")),
        }
        return Ok((word, use_));
    }

    // Arithmetic, register or immediate form.
    let (base, imm_form) = match arith_op(op_name) {
        Some(op) => (op, false),
        None => match op_name.strip_suffix('I').and_then(arith_op) {
            Some(op) => (op, true),
            None => return Err(err(instr, "operation not recognised")),
        },
    };
    if toks.len() != 4 {
        return Err(err(instr, "expected 3 operands"));
    }
    word.alu_op = base;
    let (rf_we, rf_wsel, srf_write) = parse_dest(toks[1], instr)?;
    word.rf_we = rf_we;
    word.rf_wsel = rf_wsel;
    if let Some(n) = srf_write {
        note_srf(&mut use_.read, n, instr)?; // same index rule spans read and write
        use_.write = Some(n);
    }
    if imm_form {
        // The immediate always rides mux A; the source operand moves to B.
        word.muxb = parse_muxb(toks[2], &mut use_.read, instr)?;
        word.muxa = LcuMuxA::Imm;
        word.imm = parse_imm(toks[3], instr)?;
    } else {
        word.muxa = parse_muxa(toks[2], &mut use_.read, instr)?;
        word.muxb = parse_muxb(toks[3], &mut use_.read, instr)?;
    }
    Ok((word, use_))
}
