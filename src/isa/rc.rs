/*!
RC instruction word (18 bits).

Layout, MSB first:
`muxa_sel(4) | muxb_sel(4) | op_mode(1) | alu_op(4) | muxf_sel(3) | rf_we(1) | rf_wsel(1)`

`op_mode = 1` selects the 16-bit half-precision datapath. The word itself
cannot tell an SRF destination from a VWR destination (both have
`rf_we = 0`); that split lives in the cycle's MXCU control fields, which is
why disassembly takes the row's VWR write-enable.
*/

use crate::error::{AsmError, DecodeError, Slot};
use crate::isa::{SrfUse, VwrLetter, field, parse_reg, parse_srf, tokens, word_from_hex};

pub const WORD_BITS: u32 = 18;
/// Local data registers of an RC.
pub const NUM_REGS: usize = 2;

/// RC ALU operation codes. The numbering is part of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcAluOp {
    Nop = 0,
    Sadd = 1,
    Ssub = 2,
    Smul = 3,
    Sdiv = 4,
    Sll = 5,
    Srl = 6,
    Sra = 7,
    Land = 8,
    Lor = 9,
    Lxor = 10,
    InbSfIna = 11,
    InbZfIna = 12,
    FxpMul = 13,
    FxpDiv = 14,
}

impl RcAluOp {
    fn from_bits(v: u32, word: u32) -> Result<Self, DecodeError> {
        Ok(match v {
            0 => RcAluOp::Nop,
            1 => RcAluOp::Sadd,
            2 => RcAluOp::Ssub,
            3 => RcAluOp::Smul,
            4 => RcAluOp::Sdiv,
            5 => RcAluOp::Sll,
            6 => RcAluOp::Srl,
            7 => RcAluOp::Sra,
            8 => RcAluOp::Land,
            9 => RcAluOp::Lor,
            10 => RcAluOp::Lxor,
            11 => RcAluOp::InbSfIna,
            12 => RcAluOp::InbZfIna,
            13 => RcAluOp::FxpMul,
            14 => RcAluOp::FxpDiv,
            _ => {
                return Err(DecodeError {
                    slot: Slot::Rc(0),
                    word,
                    reason: "ALU op out of range",
                });
            }
        })
    }

    fn name(self) -> &'static str {
        match self {
            RcAluOp::Nop => "NOP",
            RcAluOp::Sadd => "SADD",
            RcAluOp::Ssub => "SSUB",
            RcAluOp::Smul => "SMUL",
            RcAluOp::Sdiv => "SDIV",
            RcAluOp::Sll => "SLL",
            RcAluOp::Srl => "SRL",
            RcAluOp::Sra => "SRA",
            RcAluOp::Land => "LAND",
            RcAluOp::Lor => "LOR",
            RcAluOp::Lxor => "LXOR",
            RcAluOp::InbSfIna => "SFGA",
            RcAluOp::InbZfIna => "ZFGA",
            RcAluOp::FxpMul => "MUL.FP",
            RcAluOp::FxpDiv => "DIV.FP",
        }
    }
}

/// Input A/B selector (shared set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcMux {
    VwrA = 0,
    VwrB = 1,
    VwrC = 2,
    Srf = 3,
    R0 = 4,
    R1 = 5,
    Rct = 6,
    Rcb = 7,
    Rcl = 8,
    Rcr = 9,
    Zero = 10,
    One = 11,
    MaxInt = 12,
    MinInt = 13,
}

impl RcMux {
    fn from_bits(v: u32, word: u32) -> Result<Self, DecodeError> {
        Ok(match v {
            0 => RcMux::VwrA,
            1 => RcMux::VwrB,
            2 => RcMux::VwrC,
            3 => RcMux::Srf,
            4 => RcMux::R0,
            5 => RcMux::R1,
            6 => RcMux::Rct,
            7 => RcMux::Rcb,
            8 => RcMux::Rcl,
            9 => RcMux::Rcr,
            10 => RcMux::Zero,
            11 => RcMux::One,
            12 => RcMux::MaxInt,
            13 => RcMux::MinInt,
            _ => {
                return Err(DecodeError {
                    slot: Slot::Rc(0),
                    word,
                    reason: "mux select out of range",
                });
            }
        })
    }

    fn name(self) -> &'static str {
        match self {
            RcMux::VwrA => "VWR_A",
            RcMux::VwrB => "VWR_B",
            RcMux::VwrC => "VWR_C",
            RcMux::Srf => "SRF",
            RcMux::R0 => "R0",
            RcMux::R1 => "R1",
            RcMux::Rct => "RCT",
            RcMux::Rcb => "RCB",
            RcMux::Rcl => "RCL",
            RcMux::Rcr => "RCR",
            RcMux::Zero => "ZERO",
            RcMux::One => "ONE",
            RcMux::MaxInt => "MAX_INT",
            RcMux::MinInt => "MIN_INT",
        }
    }
}

/// Source of the flag consulted by the gated selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcMuxF {
    Own = 0,
    Rct = 1,
    Rcb = 2,
    Rcl = 3,
    Rcr = 4,
}

impl RcMuxF {
    fn from_bits(v: u32, word: u32) -> Result<Self, DecodeError> {
        Ok(match v {
            0 => RcMuxF::Own,
            1 => RcMuxF::Rct,
            2 => RcMuxF::Rcb,
            3 => RcMuxF::Rcl,
            4 => RcMuxF::Rcr,
            _ => {
                return Err(DecodeError {
                    slot: Slot::Rc(0),
                    word,
                    reason: "flag select out of range",
                });
            }
        })
    }

    fn name(self) -> &'static str {
        match self {
            RcMuxF::Own => "OWN",
            RcMuxF::Rct => "RCT",
            RcMuxF::Rcb => "RCB",
            RcMuxF::Rcl => "RCL",
            RcMuxF::Rcr => "RCR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcWord {
    pub muxa: RcMux,
    pub muxb: RcMux,
    pub op_mode: bool,
    pub alu_op: RcAluOp,
    pub muxf: RcMuxF,
    pub rf_we: bool,
    pub rf_wsel: u8,
}

impl Default for RcWord {
    /// The all-zero word: `NOP` with both muxes on VWR_A.
    fn default() -> Self {
        Self {
            muxa: RcMux::VwrA,
            muxb: RcMux::VwrA,
            op_mode: false,
            alu_op: RcAluOp::Nop,
            muxf: RcMuxF::Own,
            rf_we: false,
            rf_wsel: 0,
        }
    }
}

impl RcWord {
    pub fn encode(&self) -> u32 {
        (self.muxa as u32) << 14
            | (self.muxb as u32) << 10
            | (self.op_mode as u32) << 9
            | (self.alu_op as u32) << 5
            | (self.muxf as u32) << 2
            | (self.rf_we as u32) << 1
            | self.rf_wsel as u32
    }

    pub fn decode(word: u32) -> Result<Self, DecodeError> {
        if word >> WORD_BITS != 0 {
            return Err(DecodeError {
                slot: Slot::Rc(0),
                word,
                reason: "wider than the instruction word",
            });
        }
        Ok(Self {
            muxa: RcMux::from_bits(field(word, 14, 4), word)?,
            muxb: RcMux::from_bits(field(word, 10, 4), word)?,
            op_mode: field(word, 9, 1) != 0,
            alu_op: RcAluOp::from_bits(field(word, 5, 4), word)?,
            muxf: RcMuxF::from_bits(field(word, 2, 3), word)?,
            rf_we: field(word, 1, 1) != 0,
            rf_wsel: field(word, 0, 1) as u8,
        })
    }

    pub fn from_hex(text: &str) -> Result<Self, DecodeError> {
        Self::decode(word_from_hex(text, WORD_BITS, Slot::Rc(0))?)
    }

    pub fn to_hex(&self) -> String {
        format!("{:#x}", self.encode())
    }

    fn mux_str(mux: RcMux, srf_sel: usize) -> String {
        match mux {
            RcMux::Srf => format!("SRF({srf_sel})"),
            other => other.name().to_string(),
        }
    }

    /// Disassemble. `vwr_write` is this row's VWR write-enable for the
    /// cycle; it disambiguates the SRF and VWR destinations.
    pub fn asm(&self, srf_sel: usize, vwr_sel: VwrLetter, vwr_write: bool) -> String {
        if self.alu_op == RcAluOp::Nop {
            return "NOP".to_string();
        }
        let dest = if self.rf_we {
            format!("R{}", self.rf_wsel)
        } else if vwr_write {
            vwr_sel.to_string()
        } else {
            format!("SRF({srf_sel})")
        };
        let a = Self::mux_str(self.muxa, srf_sel);
        let b = Self::mux_str(self.muxb, srf_sel);
        match self.alu_op {
            RcAluOp::InbSfIna | RcAluOp::InbZfIna => {
                format!(
                    "{} {}, {}, {}, {}",
                    self.alu_op.name(),
                    dest,
                    a,
                    b,
                    self.muxf.name()
                )
            }
            op => {
                let suffix = if self.op_mode { ".H" } else { "" };
                format!("{}{} {}, {}, {}", op.name(), suffix, dest, a, b)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Mnemonic parsing
// ---------------------------------------------------------------------------

fn err(instr: &str, reason: impl Into<String>) -> AsmError {
    AsmError::Invalid {
        slot: Slot::Rc(0),
        instr: instr.to_string(),
        reason: reason.into(),
    }
}

fn arith_op(name: &str) -> Option<RcAluOp> {
    Some(match name {
        "SADD" => RcAluOp::Sadd,
        "SSUB" => RcAluOp::Ssub,
        "SMUL" => RcAluOp::Smul,
        "SDIV" => RcAluOp::Sdiv,
        "SLL" => RcAluOp::Sll,
        "SRL" => RcAluOp::Srl,
        "SRA" => RcAluOp::Sra,
        "LAND" => RcAluOp::Land,
        "LOR" => RcAluOp::Lor,
        "LXOR" => RcAluOp::Lxor,
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

fn parse_mux(token: &str, srf: &mut Option<usize>, instr: &str) -> Result<RcMux, AsmError> {
    if let Some(r) = parse_reg(token, NUM_REGS) {
        let n = r.map_err(|_| err(instr, format!("register must be below R{NUM_REGS}")))?;
        return Ok(if n == 0 { RcMux::R0 } else { RcMux::R1 });
    }
    if let Some(s) = parse_srf(token) {
        let n = s.map_err(|_| err(instr, "SRF index out of range"))?;
        note_srf(srf, n, instr)?;
        return Ok(RcMux::Srf);
    }
    if let Some(letter) = VwrLetter::parse(token) {
        return Ok(match letter {
            VwrLetter::A => RcMux::VwrA,
            VwrLetter::B => RcMux::VwrB,
            VwrLetter::C => RcMux::VwrC,
        });
    }
    match token {
        "RCT" => Ok(RcMux::Rct),
        "RCB" => Ok(RcMux::Rcb),
        "RCL" => Ok(RcMux::Rcl),
        "RCR" => Ok(RcMux::Rcr),
        "ZERO" => Ok(RcMux::Zero),
        "ONE" => Ok(RcMux::One),
        "MAX_INT" => Ok(RcMux::MaxInt),
        "MIN_INT" => Ok(RcMux::MinInt),
        _ => Err(err(instr, format!("bad operand `{token}`"))),
    }
}

fn parse_flag(token: &str, instr: &str) -> Result<RcMuxF, AsmError> {
    match token {
        "OWN" => Ok(RcMuxF::Own),
        "RCT" => Ok(RcMuxF::Rct),
        "RCB" => Ok(RcMuxF::Rcb),
        "RCL" => Ok(RcMuxF::Rcl),
        "RCR" => Ok(RcMuxF::Rcr),
        _ => Err(err(
            instr,
            "flag source must be OWN, RCT, RCB, RCL or RCR",
        )),
    }
}

/// Destination: local register, SRF, or a VWR lane.
/// Returns `(rf_we, rf_wsel, srf_write, vwr_write)`.
fn parse_dest(
    token: &str,
    instr: &str,
) -> Result<(bool, u8, Option<usize>, Option<VwrLetter>), AsmError> {
    if let Some(r) = parse_reg(token, NUM_REGS) {
        let n = r.map_err(|_| err(instr, format!("destination must be below R{NUM_REGS}")))?;
        return Ok((true, n as u8, None, None));
    }
    if let Some(s) = parse_srf(token) {
        let n = s.map_err(|_| err(instr, "SRF index out of range"))?;
        return Ok((false, 0, Some(n), None));
    }
    if let Some(letter) = VwrLetter::parse(token) {
        return Ok((false, 0, None, Some(letter)));
    }
    Err(err(instr, format!("bad destination `{token}`")))
}

/// Parse one RC mnemonic into its word, SRF uses and VWR write target.
pub fn parse(instr: &str) -> Result<(RcWord, SrfUse, Option<VwrLetter>), AsmError> {
    let toks = tokens(instr);
    let op_name = *toks.first().ok_or_else(|| err(instr, "empty instruction"))?;
    let mut word = RcWord::default();
    let mut use_ = SrfUse::default();

    if op_name == "NOP" {
        if toks.len() > 1 {
            return Err(err(instr, "NOP does not take operands"));
        }
        return Ok((word, use_, None));
    }

    if op_name == "SFGA" || op_name == "ZFGA" {
        word.alu_op = if op_name == "SFGA" {
            RcAluOp::InbSfIna
        } else {
            RcAluOp::InbZfIna
        };
        // Short form `SFGA dest, flag` leaves A/B on their VWR_A default.
        let flag_tok = match toks.len() {
            3 => toks[2],
            5 => {
                word.muxa = parse_mux(toks[2], &mut use_.read, instr)?;
                word.muxb = parse_mux(toks[3], &mut use_.read, instr)?;
                toks[4]
            }
            _ => return Err(err(instr, "expected 2 or 4 operands")),
        };
        word.muxf = parse_flag(flag_tok, instr)?;
        let (rf_we, rf_wsel, srf_write, vwr_write) = parse_dest(toks[1], instr)?;
        word.rf_we = rf_we;
        word.rf_wsel = rf_wsel;
        if let Some(n) = srf_write {
            note_srf(&mut use_.read, n, instr)?;
            use_.write = Some(n);
        }
        return Ok((word, use_, vwr_write));
    }

    // Arithmetic family, with optional half-precision / fixed-point spelling.
    let (base, half) = if let Some(op) = arith_op(op_name) {
        (op, false)
    } else if let Some(op) = op_name.strip_suffix(".H").and_then(arith_op) {
        (op, true)
    } else if op_name == "MUL.FP" {
        (RcAluOp::FxpMul, false)
    } else if op_name == "DIV.FP" {
        (RcAluOp::FxpDiv, false)
    } else {
        return Err(err(instr, "operation not recognised"));
    };
    if toks.len() != 4 {
        return Err(err(instr, "expected 3 operands"));
    }
    word.alu_op = base;
    word.op_mode = half;
    let (rf_we, rf_wsel, srf_write, vwr_write) = parse_dest(toks[1], instr)?;
    word.rf_we = rf_we;
    word.rf_wsel = rf_wsel;
    if let Some(n) = srf_write {
        note_srf(&mut use_.read, n, instr)?;
        use_.write = Some(n);
    }
    word.muxa = parse_mux(toks[2], &mut use_.read, instr)?;
    word.muxb = parse_mux(toks[3], &mut use_.read, instr)?;
    Ok((word, use_, vwr_write))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let word = RcWord {
            muxa: RcMux::Rcl,
            muxb: RcMux::MinInt,
            op_mode: true,
            alu_op: RcAluOp::Smul,
            muxf: RcMuxF::Rcb,
            rf_we: true,
            rf_wsel: 1,
        };
        assert_eq!(RcWord::decode(word.encode()).unwrap(), word);
    }

    #[test]
    fn undefined_selectors_fail_decode() {
        // muxa = 15
        assert!(RcWord::decode(15 << 14).is_err());
        // alu_op = 15
        assert!(RcWord::decode(15 << 5).is_err());
        // muxf = 6
        assert!(RcWord::decode(6 << 2).is_err());
    }

    #[test]
    fn parse_arith_with_neighbours() {
        let (word, use_, vwr) = parse("SADD R0, RCT, R0").unwrap();
        assert_eq!(word.muxa, RcMux::Rct);
        assert_eq!(word.muxb, RcMux::R0);
        assert!(word.rf_we);
        assert_eq!(use_, SrfUse::default());
        assert_eq!(vwr, None);
    }

    #[test]
    fn parse_vwr_destination() {
        let (word, _, vwr) = parse("SMUL VWR_B, VWR_A, SRF(2)").unwrap();
        assert!(!word.rf_we);
        assert_eq!(vwr, Some(VwrLetter::B));
        assert_eq!(word.muxb, RcMux::Srf);
    }

    #[test]
    fn parse_half_precision_suffix() {
        let (word, _, _) = parse("SADD.H R1, R0, ONE").unwrap();
        assert!(word.op_mode);
        assert_eq!(word.alu_op, RcAluOp::Sadd);
        assert_eq!(word.asm(0, VwrLetter::A, false), "SADD.H R1, R0, ONE");
    }

    #[test]
    fn parse_fixed_point_spellings() {
        let (word, _, _) = parse("MUL.FP R0, R0, R1").unwrap();
        assert_eq!(word.alu_op, RcAluOp::FxpMul);
        let (word, _, _) = parse("DIV.FP R0, R0, R1").unwrap();
        assert_eq!(word.alu_op, RcAluOp::FxpDiv);
    }

    #[test]
    fn flag_select_forms() {
        let (short, _, _) = parse("SFGA R0, RCL").unwrap();
        assert_eq!(short.muxf, RcMuxF::Rcl);
        assert_eq!(short.muxa, RcMux::VwrA);
        let (full, _, _) = parse("ZFGA R1, R0, ZERO, OWN").unwrap();
        assert_eq!(full.alu_op, RcAluOp::InbZfIna);
        assert_eq!(full.asm(0, VwrLetter::A, false), "ZFGA R1, R0, ZERO, OWN");
    }

    #[test]
    fn disassembly_names_the_selected_vwr() {
        let (word, _, vwr) = parse("SADD VWR_C, VWR_C, ONE").unwrap();
        let text = word.asm(0, vwr.unwrap(), true);
        assert_eq!(text, "SADD VWR_C, VWR_C, ONE");
        let (reparsed, _, letter) = parse(&text).unwrap();
        assert_eq!(reparsed, word);
        assert_eq!(letter, Some(VwrLetter::C));
    }

    #[test]
    fn srf_indices_must_agree_within_instruction() {
        assert!(parse("SADD SRF(1), SRF(3), ZERO").is_err());
    }
}
