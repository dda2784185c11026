/*!
LSU instruction word (20 bits).

Layout, MSB first:
`muxa_sel(3) | muxb_sel(3) | alu_op(4) | rf_we(1) | rf_wsel(3) | imm(6)`

The A path carries addresses (register, SRF or immediate); the B path
carries store data. R4..R6 of the LSU register file are reachable only as
write destinations; R7 (the SRF-SPM bank register) is on both muxes.
*/

use crate::error::{AsmError, DecodeError, Slot};
use crate::isa::{SrfUse, VwrLetter, field, parse_reg, parse_srf, tokens, word_from_hex};

pub const WORD_BITS: u32 = 20;
/// Local data registers of the LSU. R7 holds the kernel's SRF-SPM bank.
pub const NUM_REGS: usize = 8;

/// LSU operation codes (address ALU plus the memory ops).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsuOp {
    Nop = 0,
    Sadd = 1,
    Ssub = 2,
    Sll = 3,
    Srl = 4,
    Sra = 5,
    Land = 6,
    Lor = 7,
    Lxor = 8,
    /// Load the next word of the input stream.
    Lwd = 9,
    /// Store to the next word of the output stream.
    Swd = 10,
    /// Word-indexed SPM load.
    Lwi = 11,
    /// Word-indexed SPM store.
    Swi = 12,
    /// SPM line into the selected VWR.
    Lvwr = 13,
    /// Selected VWR into an SPM line.
    Svwr = 14,
}

impl LsuOp {
    fn from_bits(v: u32, word: u32) -> Result<Self, DecodeError> {
        Ok(match v {
            0 => LsuOp::Nop,
            1 => LsuOp::Sadd,
            2 => LsuOp::Ssub,
            3 => LsuOp::Sll,
            4 => LsuOp::Srl,
            5 => LsuOp::Sra,
            6 => LsuOp::Land,
            7 => LsuOp::Lor,
            8 => LsuOp::Lxor,
            9 => LsuOp::Lwd,
            10 => LsuOp::Swd,
            11 => LsuOp::Lwi,
            12 => LsuOp::Swi,
            13 => LsuOp::Lvwr,
            14 => LsuOp::Svwr,
            _ => {
                return Err(DecodeError {
                    slot: Slot::Lsu,
                    word,
                    reason: "ALU op out of range",
                });
            }
        })
    }

    fn name(self) -> &'static str {
        match self {
            LsuOp::Nop => "NOP",
            LsuOp::Sadd => "SADD",
            LsuOp::Ssub => "SSUB",
            LsuOp::Sll => "SLL",
            LsuOp::Srl => "SRL",
            LsuOp::Sra => "SRA",
            LsuOp::Land => "LAND",
            LsuOp::Lor => "LOR",
            LsuOp::Lxor => "LXOR",
            LsuOp::Lwd => "LWD",
            LsuOp::Swd => "SWD",
            LsuOp::Lwi => "LWI",
            LsuOp::Swi => "SWI",
            LsuOp::Lvwr => "LVWR",
            LsuOp::Svwr => "SVWR",
        }
    }
}

/// Input A selector (address path).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsuMuxA {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R7 = 4,
    Srf = 5,
    Zero = 6,
    Imm = 7,
}

/// Input B selector (data path).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsuMuxB {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R7 = 4,
    Srf = 5,
    Zero = 6,
    One = 7,
}

impl LsuMuxA {
    fn from_bits(v: u32) -> Self {
        [
            LsuMuxA::R0,
            LsuMuxA::R1,
            LsuMuxA::R2,
            LsuMuxA::R3,
            LsuMuxA::R7,
            LsuMuxA::Srf,
            LsuMuxA::Zero,
            LsuMuxA::Imm,
        ][v as usize & 7]
    }
}

impl LsuMuxB {
    fn from_bits(v: u32) -> Self {
        [
            LsuMuxB::R0,
            LsuMuxB::R1,
            LsuMuxB::R2,
            LsuMuxB::R3,
            LsuMuxB::R7,
            LsuMuxB::Srf,
            LsuMuxB::Zero,
            LsuMuxB::One,
        ][v as usize & 7]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LsuWord {
    pub muxa: LsuMuxA,
    pub muxb: LsuMuxB,
    pub op: LsuOp,
    pub rf_we: bool,
    pub rf_wsel: u8,
    pub imm: u8,
}

impl Default for LsuWord {
    fn default() -> Self {
        Self {
            muxa: LsuMuxA::R0,
            muxb: LsuMuxB::R0,
            op: LsuOp::Nop,
            rf_we: false,
            rf_wsel: 0,
            imm: 0,
        }
    }
}

impl LsuWord {
    pub fn encode(&self) -> u32 {
        (self.muxa as u32) << 17
            | (self.muxb as u32) << 14
            | (self.op as u32) << 10
            | (self.rf_we as u32) << 9
            | (self.rf_wsel as u32) << 6
            | self.imm as u32
    }

    pub fn decode(word: u32) -> Result<Self, DecodeError> {
        if word >> WORD_BITS != 0 {
            return Err(DecodeError {
                slot: Slot::Lsu,
                word,
                reason: "wider than the instruction word",
            });
        }
        Ok(Self {
            muxa: LsuMuxA::from_bits(field(word, 17, 3)),
            muxb: LsuMuxB::from_bits(field(word, 14, 3)),
            op: LsuOp::from_bits(field(word, 10, 4), word)?,
            rf_we: field(word, 9, 1) != 0,
            rf_wsel: field(word, 6, 3) as u8,
            imm: field(word, 0, 6) as u8,
        })
    }

    pub fn from_hex(text: &str) -> Result<Self, DecodeError> {
        Self::decode(word_from_hex(text, WORD_BITS, Slot::Lsu)?)
    }

    pub fn to_hex(&self) -> String {
        format!("{:#x}", self.encode())
    }

    fn muxa_str(&self, srf_sel: usize) -> String {
        match self.muxa {
            LsuMuxA::R0 => "R0".into(),
            LsuMuxA::R1 => "R1".into(),
            LsuMuxA::R2 => "R2".into(),
            LsuMuxA::R3 => "R3".into(),
            LsuMuxA::R7 => "R7".into(),
            LsuMuxA::Srf => format!("SRF({srf_sel})"),
            LsuMuxA::Zero => "ZERO".into(),
            LsuMuxA::Imm => self.imm.to_string(),
        }
    }

    fn muxb_str(&self, srf_sel: usize) -> String {
        match self.muxb {
            LsuMuxB::R0 => "R0".into(),
            LsuMuxB::R1 => "R1".into(),
            LsuMuxB::R2 => "R2".into(),
            LsuMuxB::R3 => "R3".into(),
            LsuMuxB::R7 => "R7".into(),
            LsuMuxB::Srf => format!("SRF({srf_sel})"),
            LsuMuxB::Zero => "ZERO".into(),
            LsuMuxB::One => "ONE".into(),
        }
    }

    /// Disassemble. `vwr_sel` names the line-transfer target.
    pub fn asm(&self, srf_sel: usize, vwr_sel: VwrLetter) -> String {
        let dest = if self.rf_we {
            format!("R{}", self.rf_wsel)
        } else {
            format!("SRF({srf_sel})")
        };
        match self.op {
            LsuOp::Nop => "NOP".into(),
            LsuOp::Lwd => format!("LWD {dest}"),
            LsuOp::Swd => format!("SWD {}", self.muxb_str(srf_sel)),
            LsuOp::Lwi => format!("LWI {dest}, {}", self.muxa_str(srf_sel)),
            LsuOp::Swi => format!("SWI {}, {}", self.muxa_str(srf_sel), self.muxb_str(srf_sel)),
            LsuOp::Lvwr => format!("LVWR {vwr_sel}, {}", self.muxa_str(srf_sel)),
            LsuOp::Svwr => format!("SVWR {}, {vwr_sel}", self.muxa_str(srf_sel)),
            op => {
                if self.muxa == LsuMuxA::Imm {
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
        slot: Slot::Lsu,
        instr: instr.to_string(),
        reason: reason.into(),
    }
}

fn arith_op(name: &str) -> Option<LsuOp> {
    Some(match name {
        "SADD" => LsuOp::Sadd,
        "SSUB" => LsuOp::Ssub,
        "SLL" => LsuOp::Sll,
        "SRL" => LsuOp::Srl,
        "SRA" => LsuOp::Sra,
        "LAND" => LsuOp::Land,
        "LOR" => LsuOp::Lor,
        "LXOR" => LsuOp::Lxor,
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

/// Mux-reachable source registers. R4..R6 exist but have no read port.
fn readable_reg(token: &str, instr: &str) -> Result<Option<u32>, AsmError> {
    match parse_reg(token, NUM_REGS) {
        None => Ok(None),
        Some(Err(())) => Err(err(instr, format!("register must be below R{NUM_REGS}"))),
        Some(Ok(n)) => match n {
            0..=3 => Ok(Some(n as u32)),
            7 => Ok(Some(4)),
            _ => Err(err(instr, "R4..R6 have no read port")),
        },
    }
}

fn parse_muxa(token: &str, srf: &mut Option<usize>, instr: &str) -> Result<LsuMuxA, AsmError> {
    if let Some(bits) = readable_reg(token, instr)? {
        return Ok(LsuMuxA::from_bits(bits));
    }
    if let Some(s) = parse_srf(token) {
        let n = s.map_err(|_| err(instr, "SRF index out of range"))?;
        note_srf(srf, n, instr)?;
        return Ok(LsuMuxA::Srf);
    }
    match token {
        "ZERO" => Ok(LsuMuxA::Zero),
        _ => Err(err(instr, format!("bad A operand `{token}`"))),
    }
}

fn parse_muxb(token: &str, srf: &mut Option<usize>, instr: &str) -> Result<LsuMuxB, AsmError> {
    if let Some(bits) = readable_reg(token, instr)? {
        return Ok(LsuMuxB::from_bits(bits));
    }
    if let Some(s) = parse_srf(token) {
        let n = s.map_err(|_| err(instr, "SRF index out of range"))?;
        note_srf(srf, n, instr)?;
        return Ok(LsuMuxB::Srf);
    }
    match token {
        "ZERO" => Ok(LsuMuxB::Zero),
        "ONE" => Ok(LsuMuxB::One),
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

/// Address operand: register/SRF or a small immediate through mux A.
fn parse_addr(
    token: &str,
    word: &mut LsuWord,
    srf: &mut Option<usize>,
    instr: &str,
) -> Result<(), AsmError> {
    if token.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        word.muxa = LsuMuxA::Imm;
        word.imm = parse_imm(token, instr)?;
        Ok(())
    } else {
        word.muxa = parse_muxa(token, srf, instr)?;
        Ok(())
    }
}

fn parse_dest(token: &str, instr: &str) -> Result<(bool, u8, Option<usize>), AsmError> {
    if let Some(r) = parse_reg(token, NUM_REGS) {
        let n = r.map_err(|_| err(instr, format!("destination must be below R{NUM_REGS}")))?;
        return Ok((true, n as u8, None));
    }
    if let Some(s) = parse_srf(token) {
        let n = s.map_err(|_| err(instr, "SRF index out of range"))?;
        return Ok((false, 0, Some(n)));
    }
    Err(err(instr, format!("bad destination `{token}`")))
}

/// Parse one LSU mnemonic into its word, SRF uses and VWR letter (for the
/// line-transfer ops, which participate in the cycle's VWR reconciliation).
pub fn parse(instr: &str) -> Result<(LsuWord, SrfUse, Option<VwrLetter>), AsmError> {
    let toks = tokens(instr);
    let op_name = *toks.first().ok_or_else(|| err(instr, "empty instruction"))?;
    let mut word = LsuWord::default();
    let mut use_ = SrfUse::default();

    match op_name {
        "NOP" => {
            if toks.len() > 1 {
                return Err(err(instr, "NOP does not take operands"));
            }
            return Ok((word, use_, None));
        }
        "LWD" => {
            if toks.len() != 2 {
                return Err(err(instr, "expected 1 operand (destination)"));
            }
            word.op = LsuOp::Lwd;
            let (rf_we, rf_wsel, srf_write) = parse_dest(toks[1], instr)?;
            word.rf_we = rf_we;
            word.rf_wsel = rf_wsel;
            if let Some(n) = srf_write {
                use_.write = Some(n);
                note_srf(&mut use_.read, n, instr)?;
            }
            return Ok((word, use_, None));
        }
        "SWD" => {
            if toks.len() != 2 {
                return Err(err(instr, "expected 1 operand (source)"));
            }
            word.op = LsuOp::Swd;
            word.muxb = parse_muxb(toks[1], &mut use_.read, instr)?;
            return Ok((word, use_, None));
        }
        "LWI" => {
            if toks.len() != 3 {
                return Err(err(instr, "expected 2 operands (destination, address)"));
            }
            word.op = LsuOp::Lwi;
            let (rf_we, rf_wsel, srf_write) = parse_dest(toks[1], instr)?;
            word.rf_we = rf_we;
            word.rf_wsel = rf_wsel;
            if let Some(n) = srf_write {
                use_.write = Some(n);
                note_srf(&mut use_.read, n, instr)?;
            }
            parse_addr(toks[2], &mut word, &mut use_.read, instr)?;
            return Ok((word, use_, None));
        }
        "SWI" => {
            if toks.len() != 3 {
                return Err(err(instr, "expected 2 operands (address, source)"));
            }
            word.op = LsuOp::Swi;
            parse_addr(toks[1], &mut word, &mut use_.read, instr)?;
            word.muxb = parse_muxb(toks[2], &mut use_.read, instr)?;
            return Ok((word, use_, None));
        }
        "LVWR" => {
            if toks.len() != 3 {
                return Err(err(instr, "expected 2 operands (VWR, line)"));
            }
            word.op = LsuOp::Lvwr;
            let letter = VwrLetter::parse(toks[1])
                .ok_or_else(|| err(instr, "expected VWR_A, VWR_B or VWR_C"))?;
            parse_addr(toks[2], &mut word, &mut use_.read, instr)?;
            return Ok((word, use_, Some(letter)));
        }
        "SVWR" => {
            if toks.len() != 3 {
                return Err(err(instr, "expected 2 operands (line, VWR)"));
            }
            word.op = LsuOp::Svwr;
            parse_addr(toks[1], &mut word, &mut use_.read, instr)?;
            let letter = VwrLetter::parse(toks[2])
                .ok_or_else(|| err(instr, "expected VWR_A, VWR_B or VWR_C"))?;
            return Ok((word, use_, Some(letter)));
        }
        _ => {}
    }

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
    word.op = base;
    let (rf_we, rf_wsel, srf_write) = parse_dest(toks[1], instr)?;
    word.rf_we = rf_we;
    word.rf_wsel = rf_wsel;
    if let Some(n) = srf_write {
        note_srf(&mut use_.read, n, instr)?;
        use_.write = Some(n);
    }
    if imm_form {
        word.muxb = parse_muxb(toks[2], &mut use_.read, instr)?;
        word.muxa = LsuMuxA::Imm;
        word.imm = parse_imm(toks[3], instr)?;
    } else {
        word.muxa = parse_muxa(toks[2], &mut use_.read, instr)?;
        word.muxb = parse_muxb(toks[3], &mut use_.read, instr)?;
    }
    Ok((word, use_, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let word = LsuWord {
            muxa: LsuMuxA::Imm,
            muxb: LsuMuxB::R7,
            op: LsuOp::Swi,
            rf_we: true,
            rf_wsel: 6,
            imm: 63,
        };
        assert_eq!(LsuWord::decode(word.encode()).unwrap(), word);
    }

    #[test]
    fn op_15_fails_decode() {
        assert!(LsuWord::decode(15 << 10).is_err());
    }

    #[test]
    fn parse_stream_ops() {
        let (word, _, _) = parse("LWD R0").unwrap();
        assert_eq!(word.op, LsuOp::Lwd);
        assert!(word.rf_we);
        let (word, _, _) = parse("SWD R2").unwrap();
        assert_eq!(word.op, LsuOp::Swd);
        assert_eq!(word.muxb, LsuMuxB::R2);
    }

    #[test]
    fn parse_indexed_ops() {
        let (word, _, _) = parse("LWI R1, 40").unwrap();
        assert_eq!(word.muxa, LsuMuxA::Imm);
        assert_eq!(word.imm, 40);
        let (word, use_, _) = parse("SWI R3, SRF(6)").unwrap();
        assert_eq!(word.muxa, LsuMuxA::R3);
        assert_eq!(word.muxb, LsuMuxB::Srf);
        assert_eq!(use_.read, Some(6));
    }

    #[test]
    fn parse_line_transfers_report_the_letter() {
        let (word, _, letter) = parse("LVWR VWR_B, 3").unwrap();
        assert_eq!(word.op, LsuOp::Lvwr);
        assert_eq!(letter, Some(VwrLetter::B));
        let (word, _, letter) = parse("SVWR 5, VWR_C").unwrap();
        assert_eq!(word.op, LsuOp::Svwr);
        assert_eq!(letter, Some(VwrLetter::C));
    }

    #[test]
    fn bank_register_rides_mux_position_4() {
        let (word, _, _) = parse("SADD R0, R7, ONE").unwrap();
        assert_eq!(word.muxa, LsuMuxA::R7);
        assert_eq!(word.muxa as u32, 4);
    }

    #[test]
    fn unreadable_registers_are_rejected() {
        assert!(parse("SADD R0, R5, ONE").is_err());
        // ...but they are writable.
        let (word, _, _) = parse("SADD R5, R0, ONE").unwrap();
        assert_eq!(word.rf_wsel, 5);
    }

    #[test]
    fn disassembly_is_canonical() {
        for text in [
            "NOP",
            "LWD R0",
            "SWD R1",
            "LWI R2, 17",
            "SWI 3, R0",
            "LVWR VWR_A, 0",
            "SVWR 1, VWR_A",
            "SADDI R7, R7, 1",
            "LAND R0, SRF(4), R1",
        ] {
            let (word, use_, letter) = parse(text).unwrap();
            let rendered = word.asm(
                use_.read.or(use_.write).unwrap_or(0),
                letter.unwrap_or(VwrLetter::A),
            );
            assert_eq!(rendered, text);
        }
    }

    #[test]
    fn lwd_to_srf_claims_the_write() {
        let (word, use_, _) = parse("LWD SRF(2)").unwrap();
        assert!(!word.rf_we);
        assert_eq!(use_.write, Some(2));
    }
}
