//! Machine geometry of the VWR2A array.
//!
//! Every size that the instruction encodings, the memories and the cycle
//! engine agree on lives here. Field widths inside instruction words are
//! kept next to the word definitions in `isa::*`; this module only holds
//! the architectural dimensions.

/// Columns in the array. Each column is an independent lockstep group.
pub const CGRA_COLS: usize = 2;
/// Reconfigurable cells (rows) per column.
pub const CGRA_ROWS: usize = 4;
/// Very-wide registers per column (`A`, `B`, `C`).
pub const N_VWR_PER_COL: usize = 3;

/// Scratchpad lines.
pub const SPM_NLINES: usize = 64;
/// 32-bit words per scratchpad line (also the VWR width).
pub const SPM_NWORDS: usize = 128;
/// Flat word capacity of the scratchpad.
pub const SPM_TOTAL_WORDS: usize = SPM_NLINES * SPM_NWORDS;

/// Words per very-wide register.
pub const VWR_NWORDS: usize = SPM_NWORDS;
/// Lanes of a VWR owned by one RC row. The slice index selects within this.
pub const VWR_LANES_PER_ROW: usize = VWR_NWORDS / CGRA_ROWS;

/// Shared register file depth per column.
pub const SRF_N_REGS: usize = 8;

/// Lines in the global instruction memory (7 slot words per line).
pub const IMEM_N_LINES: usize = 512;
/// Per-slot instruction memory depth (one kernel's maximum length).
pub const SLOT_IMEM_DEPTH: usize = 64;

/// Kernel descriptor slots. Slot 0 is reserved empty; usable ids are 1..=15.
pub const KMEM_N_SLOTS: usize = 16;

/// Fractional bits of the fixed-point multiply (Q1.15 convention).
pub const FXP_SHIFT: u32 = 15;
