/*!
MXCU instruction word (27 bits).

Layout, MSB first:
`vwr_row_we(4) | vwr_sel(2) | srf_we(1) | alu_srf_write(1) | srf_sel(3) |
 muxa_sel(4) | muxb_sel(4) | alu_op(4) | rf_we(1) | rf_wsel(3)`

The first five fields are the cycle's shared-resource controls and are
filled by the assembler *after* the other six slots of the cycle have been
parsed; the mnemonic itself only describes the MXCU's own register/ALU
update. Bit `r` of `vwr_row_we` enables RC row `r`'s VWR lane write.
`alu_srf_write = 0` routes the MXCU's own ALU result to the SRF write port;
`1` routes the unique datapath slot claiming the SRF destination.
*/

use crate::error::{AsmError, DecodeError, Slot};
use crate::isa::{SrfUse, VwrLetter, field, parse_reg, parse_srf, tokens, word_from_hex};
use crate::params::CGRA_ROWS;

pub const WORD_BITS: u32 = 27;
/// Local registers: R0 = VWR slice index, R5/R6/R7 = VWR A/B/C lane masks.
pub const NUM_REGS: usize = 8;

/// MXCU ALU operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MxcuAluOp {
    Nop = 0,
    Sadd = 1,
    Ssub = 2,
    Sll = 3,
    Srl = 4,
    Sra = 5,
    Land = 6,
    Lor = 7,
    Lxor = 8,
}

impl MxcuAluOp {
    fn from_bits(v: u32, word: u32) -> Result<Self, DecodeError> {
        Ok(match v {
            0 => MxcuAluOp::Nop,
            1 => MxcuAluOp::Sadd,
            2 => MxcuAluOp::Ssub,
            3 => MxcuAluOp::Sll,
            4 => MxcuAluOp::Srl,
            5 => MxcuAluOp::Sra,
            6 => MxcuAluOp::Land,
            7 => MxcuAluOp::Lor,
            8 => MxcuAluOp::Lxor,
            _ => {
                return Err(DecodeError {
                    slot: Slot::Mxcu,
                    word,
                    reason: "ALU op out of range",
                });
            }
        })
    }

    fn name(self) -> &'static str {
        match self {
            MxcuAluOp::Nop => "NOP",
            MxcuAluOp::Sadd => "SADD",
            MxcuAluOp::Ssub => "SSUB",
            MxcuAluOp::Sll => "SLL",
            MxcuAluOp::Srl => "SRL",
            MxcuAluOp::Sra => "SRA",
            MxcuAluOp::Land => "LAND",
            MxcuAluOp::Lor => "LOR",
            MxcuAluOp::Lxor => "LXOR",
        }
    }
}

/// Input selector, shared by A and B.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MxcuMux {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    R5 = 5,
    R6 = 6,
    R7 = 7,
    Srf = 8,
    Zero = 9,
    One = 10,
    Last = 11,
}

impl MxcuMux {
    fn from_bits(v: u32, word: u32) -> Result<Self, DecodeError> {
        Ok(match v {
            0 => MxcuMux::R0,
            1 => MxcuMux::R1,
            2 => MxcuMux::R2,
            3 => MxcuMux::R3,
            4 => MxcuMux::R4,
            5 => MxcuMux::R5,
            6 => MxcuMux::R6,
            7 => MxcuMux::R7,
            8 => MxcuMux::Srf,
            9 => MxcuMux::Zero,
            10 => MxcuMux::One,
            11 => MxcuMux::Last,
            _ => {
                return Err(DecodeError {
                    slot: Slot::Mxcu,
                    word,
                    reason: "mux select out of range",
                });
            }
        })
    }

    fn name(self) -> &'static str {
        match self {
            MxcuMux::R0 => "R0",
            MxcuMux::R1 => "R1",
            MxcuMux::R2 => "R2",
            MxcuMux::R3 => "R3",
            MxcuMux::R4 => "R4",
            MxcuMux::R5 => "R5",
            MxcuMux::R6 => "R6",
            MxcuMux::R7 => "R7",
            MxcuMux::Srf => "SRF",
            MxcuMux::Zero => "ZERO",
            MxcuMux::One => "ONE",
            MxcuMux::Last => "LAST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MxcuWord {
    pub vwr_row_we: [bool; CGRA_ROWS],
    pub vwr_sel: VwrLetter,
    pub srf_we: bool,
    pub alu_srf_write: bool,
    pub srf_sel: u8,
    pub muxa: MxcuMux,
    pub muxb: MxcuMux,
    pub alu_op: MxcuAluOp,
    pub rf_we: bool,
    pub rf_wsel: u8,
}

impl Default for MxcuWord {
    fn default() -> Self {
        Self {
            vwr_row_we: [false; CGRA_ROWS],
            vwr_sel: VwrLetter::A,
            srf_we: false,
            alu_srf_write: false,
            srf_sel: 0,
            muxa: MxcuMux::R0,
            muxb: MxcuMux::R0,
            alu_op: MxcuAluOp::Nop,
            rf_we: false,
            rf_wsel: 0,
        }
    }
}

impl MxcuWord {
    pub fn encode(&self) -> u32 {
        let mut row_we = 0u32;
        for (r, &we) in self.vwr_row_we.iter().enumerate() {
            row_we |= (we as u32) << r;
        }
        row_we << 23
            | self.vwr_sel.bits() << 21
            | (self.srf_we as u32) << 20
            | (self.alu_srf_write as u32) << 19
            | (self.srf_sel as u32) << 16
            | (self.muxa as u32) << 12
            | (self.muxb as u32) << 8
            | (self.alu_op as u32) << 4
            | (self.rf_we as u32) << 3
            | self.rf_wsel as u32
    }

    pub fn decode(word: u32) -> Result<Self, DecodeError> {
        if word >> WORD_BITS != 0 {
            return Err(DecodeError {
                slot: Slot::Mxcu,
                word,
                reason: "wider than the instruction word",
            });
        }
        let row_we = field(word, 23, 4);
        let mut vwr_row_we = [false; CGRA_ROWS];
        for (r, we) in vwr_row_we.iter_mut().enumerate() {
            *we = row_we >> r & 1 != 0;
        }
        Ok(Self {
            vwr_row_we,
            vwr_sel: VwrLetter::from_bits(field(word, 21, 2), Slot::Mxcu, word)?,
            srf_we: field(word, 20, 1) != 0,
            alu_srf_write: field(word, 19, 1) != 0,
            srf_sel: field(word, 16, 3) as u8,
            muxa: MxcuMux::from_bits(field(word, 12, 4), word)?,
            muxb: MxcuMux::from_bits(field(word, 8, 4), word)?,
            alu_op: MxcuAluOp::from_bits(field(word, 4, 4), word)?,
            rf_we: field(word, 3, 1) != 0,
            rf_wsel: field(word, 0, 3) as u8,
        })
    }

    pub fn from_hex(text: &str) -> Result<Self, DecodeError> {
        Self::decode(word_from_hex(text, WORD_BITS, Slot::Mxcu)?)
    }

    pub fn to_hex(&self) -> String {
        format!("{:#x}", self.encode())
    }

    fn mux_str(mux: MxcuMux, srf_sel: usize) -> String {
        match mux {
            MxcuMux::Srf => format!("SRF({srf_sel})"),
            other => other.name().to_string(),
        }
    }

    /// Disassemble the MXCU's own register/ALU update.
    pub fn asm(&self) -> String {
        if self.alu_op == MxcuAluOp::Nop {
            return "NOP".to_string();
        }
        let srf_sel = self.srf_sel as usize;
        let dest = if self.rf_we {
            format!("R{}", self.rf_wsel)
        } else {
            format!("SRF({srf_sel})")
        };
        format!(
            "{} {}, {}, {}",
            self.alu_op.name(),
            dest,
            Self::mux_str(self.muxa, srf_sel),
            Self::mux_str(self.muxb, srf_sel)
        )
    }
}

// ---------------------------------------------------------------------------
// Mnemonic parsing (own-ALU part only)
// ---------------------------------------------------------------------------

fn err(instr: &str, reason: impl Into<String>) -> AsmError {
    AsmError::Invalid {
        slot: Slot::Mxcu,
        instr: instr.to_string(),
        reason: reason.into(),
    }
}

fn arith_op(name: &str) -> Option<MxcuAluOp> {
    Some(match name {
        "SADD" => MxcuAluOp::Sadd,
        "SSUB" => MxcuAluOp::Ssub,
        "SLL" => MxcuAluOp::Sll,
        "SRL" => MxcuAluOp::Srl,
        "SRA" => MxcuAluOp::Sra,
        "LAND" => MxcuAluOp::Land,
        "LOR" => MxcuAluOp::Lor,
        "LXOR" => MxcuAluOp::Lxor,
        _ => return None,
    })
}

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

fn parse_mux(token: &str, srf: &mut Option<usize>, instr: &str) -> Result<MxcuMux, AsmError> {
    if let Some(r) = parse_reg(token, NUM_REGS) {
        let n = r.map_err(|_| err(instr, format!("register must be below R{NUM_REGS}")))?;
        return MxcuMux::from_bits(n as u32, 0).map_err(|_| err(instr, "bad register"));
    }
    if let Some(s) = parse_srf(token) {
        let n = s.map_err(|_| err(instr, "SRF index out of range"))?;
        note_srf(srf, n, instr)?;
        return Ok(MxcuMux::Srf);
    }
    match token {
        "ZERO" => Ok(MxcuMux::Zero),
        "ONE" => Ok(MxcuMux::One),
        "LAST" => Ok(MxcuMux::Last),
        _ => Err(err(instr, format!("bad operand `{token}`"))),
    }
}

/// Parse one MXCU mnemonic. Only the own-ALU fields are set; the assembler
/// fills the shared-control fields once the whole cycle is known.
pub fn parse(instr: &str) -> Result<(MxcuWord, SrfUse), AsmError> {
    let toks = tokens(instr);
    let op_name = *toks.first().ok_or_else(|| err(instr, "empty instruction"))?;
    let mut word = MxcuWord::default();
    let mut use_ = SrfUse::default();

    if op_name == "NOP" {
        if toks.len() > 1 {
            return Err(err(instr, "NOP does not take operands"));
        }
        return Ok((word, use_));
    }

    let op = arith_op(op_name).ok_or_else(|| err(instr, "operation not recognised"))?;
    if toks.len() != 4 {
        return Err(err(instr, "expected 3 operands"));
    }
    word.alu_op = op;
    if let Some(r) = parse_reg(toks[1], NUM_REGS) {
        let n = r.map_err(|_| err(instr, format!("destination must be below R{NUM_REGS}")))?;
        word.rf_we = true;
        word.rf_wsel = n as u8;
    } else if let Some(s) = parse_srf(toks[1]) {
        let n = s.map_err(|_| err(instr, "SRF index out of range"))?;
        note_srf(&mut use_.read, n, instr)?;
        use_.write = Some(n);
    } else {
        return Err(err(instr, format!("bad destination `{}`", toks[1])));
    }
    word.muxa = parse_mux(toks[2], &mut use_.read, instr)?;
    word.muxb = parse_mux(toks[3], &mut use_.read, instr)?;
    Ok((word, use_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let word = MxcuWord {
            vwr_row_we: [true, false, true, true],
            vwr_sel: VwrLetter::C,
            srf_we: true,
            alu_srf_write: true,
            srf_sel: 5,
            muxa: MxcuMux::R0,
            muxb: MxcuMux::Last,
            alu_op: MxcuAluOp::Land,
            rf_we: true,
            rf_wsel: 7,
        };
        assert_eq!(MxcuWord::decode(word.encode()).unwrap(), word);
        assert!(word.encode() >> WORD_BITS == 0);
    }

    #[test]
    fn undefined_vwr_select_fails_decode() {
        assert!(MxcuWord::decode(3 << 21).is_err());
    }

    #[test]
    fn parse_slice_cursor_increment() {
        let (word, use_) = parse("SADD R0, R0, ONE").unwrap();
        assert_eq!(word.alu_op, MxcuAluOp::Sadd);
        assert!(word.rf_we);
        assert_eq!(word.rf_wsel, 0);
        assert_eq!(use_, SrfUse::default());
        assert_eq!(word.asm(), "SADD R0, R0, ONE");
    }

    #[test]
    fn parse_srf_destination() {
        let (word, use_) = parse("LXOR SRF(1), R4, R4").unwrap();
        assert!(!word.rf_we);
        assert_eq!(use_.write, Some(1));
    }

    #[test]
    fn nop_keeps_shared_fields_clear() {
        let (word, _) = parse("NOP").unwrap();
        assert_eq!(word, MxcuWord::default());
        assert_eq!(word.asm(), "NOP");
    }
}
