/*!
Error types shared across the assembler and the cycle engine.

Two families:
- `AsmError`: anything that goes wrong turning text into bits: mnemonic
  parsing, per-cycle SRF/VWR reconciliation, hex/CSV loading. Carries the
  cycle and column where the assembler was when it failed.
- `RunError`: anything that goes wrong executing assembled words: range
  faults, divide by zero, shared-resource violations the assembler should
  have prevented (asserted here), branch conflicts. Carries pc, column and
  slot so a failing kernel can be located.

Nothing is recovered locally; a corrupt instruction aborts the kernel run.
*/

use std::fmt;

use thiserror::Error;

/// Which specialized slot an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Lcu,
    Lsu,
    Mxcu,
    Rc(usize),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Lcu => write!(f, "LCU"),
            Slot::Lsu => write!(f, "LSU"),
            Slot::Mxcu => write!(f, "MXCU"),
            Slot::Rc(r) => write!(f, "RC{r}"),
        }
    }
}

/// A bit pattern that does not decode to a valid instruction word.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{slot} word {word:#x} does not decode: {reason}")]
pub struct DecodeError {
    pub slot: Slot,
    pub word: u32,
    pub reason: &'static str,
}

/// Assembly-time failure.
#[derive(Debug, Error)]
pub enum AsmError {
    /// A single slot mnemonic that could not be parsed.
    #[error("instruction not valid for {slot}: `{instr}`: {reason}")]
    Invalid {
        slot: Slot,
        instr: String,
        reason: String,
    },

    /// Slot-level error annotated with its position in the kernel.
    #[error("cycle {cycle}, column {col}: {source}")]
    AtCycle {
        cycle: usize,
        col: usize,
        #[source]
        source: Box<AsmError>,
    },

    /// Two slots referenced different SRF registers in one cycle.
    #[error(
        "cycle {cycle}, column {col}: expected a single SRF index per cycle, saw {first} and {second}"
    )]
    SrfIndexConflict {
        cycle: usize,
        col: usize,
        first: usize,
        second: usize,
    },

    /// More than one slot wants to drive the SRF write port.
    #[error("cycle {cycle}, column {col}: more than one slot writes the SRF")]
    MultipleSrfWriters { cycle: usize, col: usize },

    /// RCs (or the LSU) named different VWR letters in one cycle.
    #[error("cycle {cycle}, column {col}: writes to different VWRs in the same cycle")]
    VwrLetterConflict { cycle: usize, col: usize },

    /// A whole-line VWR load and per-lane RC writes cannot both commit.
    #[error(
        "cycle {cycle}, column {col}: LSU line load and RC lane writes target a VWR in the same cycle"
    )]
    VwrLineLaneClash { cycle: usize, col: usize },

    /// A stored hex word failed to decode while loading a kernel.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// CSV file does not have the expected number of instruction rows.
    #[error("{path}: expected {expected} instruction rows plus the header, found {found}")]
    CsvShape {
        path: String,
        expected: usize,
        found: usize,
    },

    /// A CSV row does not have one cell per slot.
    #[error("{path}, row {row}: expected {expected} cells (LCU, LSU, MXCU, RC0..RC{last}), found {found}")]
    CsvRow {
        path: String,
        row: usize,
        expected: usize,
        last: usize,
        found: usize,
    },

    /// A CSV cell whose content could not be parsed.
    #[error("{path}, row {row}: {reason}")]
    CsvCell {
        path: String,
        row: usize,
        reason: String,
    },

    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl AsmError {
    /// Annotate a slot-level error with the cycle/column being assembled.
    pub fn at(self, cycle: usize, col: usize) -> Self {
        AsmError::AtCycle {
            cycle,
            col,
            source: Box::new(self),
        }
    }
}

/// Runtime failure. The engine aborts the kernel and surfaces one of these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("pc {pc}, column {col}, {slot}: division by zero")]
    DivideByZero { pc: usize, col: usize, slot: Slot },

    #[error("pc {pc}, column {col}, {slot}: FXP_DIV is reserved")]
    FxpDivReserved { pc: usize, col: usize, slot: Slot },

    #[error("pc {pc}, column {col}, {slot}: SPM address {addr} out of range")]
    SpmOutOfRange {
        pc: usize,
        col: usize,
        slot: Slot,
        addr: i64,
    },

    #[error("pc {pc}, column {col}, {slot}: VWR index {idx} out of range")]
    VwrOutOfRange {
        pc: usize,
        col: usize,
        slot: Slot,
        idx: i64,
    },

    #[error("pc {pc}, column {col}: {source}")]
    BadWord {
        pc: usize,
        col: usize,
        #[source]
        source: DecodeError,
    },

    #[error("pc {pc}: two branches taken in the same cycle")]
    TwoBranches { pc: usize },

    #[error("pc {pc}, column {col}: branch target {target} out of range")]
    BranchOutOfRange { pc: usize, col: usize, target: i64 },

    /// SRF write enabled but the number of slots claiming it is not one.
    #[error("pc {pc}, column {col}: SRF write enabled with {claims} claiming slots")]
    SrfWriteClaims { pc: usize, col: usize, claims: usize },

    #[error("kernel {id} is not configured")]
    KernelNotConfigured { id: usize },

    #[error("kernel id {id} out of range (1..={max})")]
    KernelIdOutOfRange { id: usize, max: usize },

    /// Descriptor whose IMEM window or length does not fit the hardware.
    #[error("kernel {id}: descriptor out of range ({reason})")]
    BadDescriptor { id: usize, reason: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_display() {
        assert_eq!(Slot::Lcu.to_string(), "LCU");
        assert_eq!(Slot::Rc(2).to_string(), "RC2");
    }

    #[test]
    fn at_cycle_wraps_message() {
        let inner = AsmError::Invalid {
            slot: Slot::Lsu,
            instr: "LWD X9".into(),
            reason: "bad destination".into(),
        };
        let wrapped = inner.at(3, 1);
        let text = wrapped.to_string();
        assert!(text.starts_with("cycle 3, column 1"));
    }
}
