#![doc = r#"
VWR2A simulator library crate.

A cycle-accurate functional simulator and assembler/disassembler for the
VWR2A coarse-grained reconfigurable array: two columns of heterogeneous
lockstep slots (loop control, load/store, mux control, four
reconfigurable cells) sharing very-wide registers, a shared register file
per column and a global scratchpad.

Modules:
- params: machine geometry constants
- alu: fixed-width signed ALU with double-buffered result/flags
- isa: bit-exact instruction words (LCU/LSU/MXCU/RC) and kernel descriptors
- mem: SRF, VWR and SPM storage models
- slots: the execution units and their borrowed cycle context
- asm: mnemonic parsing and per-cycle SRF/VWR reconciliation
- engine: the lockstep cycle engine and kernel runner
- io: kernel-directory CSV files and the C bitstream header
- error: assembly-time and run-time error types
"#]

pub mod alu;
pub mod asm;
pub mod engine;
pub mod error;
pub mod io;
pub mod isa;
pub mod mem;
pub mod params;
pub mod slots;

// Re-export the types a driver touches most.
pub use asm::{CycleRow, assemble_column, disassemble_window};
pub use engine::{Cgra, Imem, RunReport, RunStatus};
pub use error::{AsmError, RunError};
pub use isa::kmem::{ColUsage, KmemWord};
