/*!
CLI driver for the VWR2A simulator.

Subcommands mirror the kernel workflow: `assemble` turns the mnemonic CSV
of a kernel directory into the hex CSV and the C bitstream header, `run`
loads the hex CSV and executes the kernel, `disasm` prints the assembled
kernel back as mnemonics.
*/

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};

use vwr2a::engine::Cgra;
use vwr2a::io::{
    EXT, FILENAME_INSTR, load_hex_csv, read_asm_csv, read_spm_csv, write_bitstream_header,
    write_hex_csv,
};
use vwr2a::isa::kmem::{ColUsage, KmemWord};
use vwr2a::params::SPM_NLINES;
use vwr2a::{assemble_column, disassemble_window};

#[derive(Parser)]
#[command(name = "vwr2a", about = "VWR2A CGRA simulator and assembler")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

/// Kernel shape flags shared by every subcommand.
#[derive(Args)]
struct KernelArgs {
    /// Kernel directory containing the instruction CSV files.
    kernel: PathBuf,

    /// Instructions per active column.
    #[arg(long)]
    n_instr: usize,

    /// Active columns: 0, 1 or both.
    #[arg(long, default_value = "0")]
    cols: String,

    /// First IMEM line of the kernel.
    #[arg(long, default_value_t = 0)]
    imem_start: usize,

    /// Optional version suffix of the instruction files.
    #[arg(long, default_value = "")]
    version: String,
}

impl KernelArgs {
    fn col_usage(&self) -> Result<ColUsage> {
        Ok(match self.cols.as_str() {
            "0" => ColUsage::Col0,
            "1" => ColUsage::Col1,
            "both" | "01" => ColUsage::Both,
            other => bail!("bad --cols `{other}`: expected 0, 1 or both"),
        })
    }

    fn file(&self, kind: &str) -> PathBuf {
        self.kernel
            .join(format!("{FILENAME_INSTR}_{kind}{}{EXT}", self.version))
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// Assemble instructions_asm.csv into instructions_hex.csv and
    /// dsip_bitstream.h.
    Assemble(KernelArgs),

    /// Load instructions_hex.csv and run the kernel.
    Run {
        #[command(flatten)]
        kernel: KernelArgs,

        /// SPM bank line bound to LSU.R7 at kernel start.
        #[arg(long, default_value_t = 0)]
        bank: u8,

        /// Abort after this many cycles.
        #[arg(long)]
        limit: Option<u64>,

        /// CSV of decimal words to preload into the SPM, one line per row.
        #[arg(long)]
        spm_in: Option<PathBuf>,

        /// SPM lines to print after the run.
        #[arg(long)]
        dump_spm: Vec<usize>,
    },

    /// Print the assembled kernel as mnemonics.
    Disasm(KernelArgs),
}

fn configure(cgra: &mut Cgra, args: &KernelArgs, bank: u8) -> Result<()> {
    cgra.configure_kernel(
        1,
        KmemWord {
            n_instr: args.n_instr,
            imem_start: args.imem_start,
            cols: args.col_usage()?,
            srf_spm_bank: bank,
        },
    )
    .context("kernel descriptor rejected")?;
    Ok(())
}

fn assemble_into(cgra: &mut Cgra, args: &KernelArgs) -> Result<()> {
    let cols = args.col_usage()?;
    let path = args.file("asm");
    let rows = read_asm_csv(&path, args.n_instr * cols.n_cols())
        .with_context(|| format!("reading {}", path.display()))?;
    for (k, &col) in cols.columns().iter().enumerate() {
        let start = args.imem_start + k * args.n_instr;
        assemble_column(
            &mut cgra.imem,
            start,
            col,
            &rows[k * args.n_instr..(k + 1) * args.n_instr],
        )?;
    }
    Ok(())
}

fn load_kernel(cgra: &mut Cgra, args: &KernelArgs) -> Result<()> {
    let cols = args.col_usage()?;
    let path = args.file("hex");
    load_hex_csv(
        &path,
        &mut cgra.imem,
        args.imem_start,
        args.n_instr * cols.n_cols(),
    )
    .with_context(|| format!("reading {}", path.display()))?;
    Ok(())
}

fn dump_line(cgra: &Cgra, n: usize) {
    match cgra.spm.line(n) {
        Some(line) => {
            let cells: Vec<String> = line.iter().map(i32::to_string).collect();
            println!("SPM {n}: [{}]", cells.join(", "));
        }
        None => println!("SPM {n}: <no such line, max {}>", SPM_NLINES - 1),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Assemble(args) => {
            let mut cgra = Cgra::new();
            assemble_into(&mut cgra, &args)?;
            let hex = args.file("hex");
            write_hex_csv(&hex, &cgra.imem)?;
            let header = args.kernel.join("dsip_bitstream.h");
            write_bitstream_header(&header, &cgra.imem)?;
            println!("wrote {} and {}", hex.display(), header.display());
        }
        Cmd::Run {
            kernel,
            bank,
            limit,
            spm_in,
            dump_spm,
        } => {
            let mut cgra = Cgra::new();
            configure(&mut cgra, &kernel, bank)?;
            load_kernel(&mut cgra, &kernel)?;
            if let Some(path) = spm_in {
                let data = read_spm_csv(&path)?;
                if cgra.spm.load_data(&data).is_none() {
                    bail!("{}: more data than the SPM holds", path.display());
                }
            }
            let report = cgra
                .run_kernel(1, limit)
                .context("kernel execution failed")?;
            println!("{:?} after {} cycles", report.status, report.cycles);
            for n in dump_spm {
                dump_line(&cgra, n);
            }
        }
        Cmd::Disasm(args) => {
            let mut cgra = Cgra::new();
            load_kernel(&mut cgra, &args)?;
            let cols = args.col_usage()?;
            for (k, &col) in cols.columns().iter().enumerate() {
                println!("column {col}:");
                let start = args.imem_start + k * args.n_instr;
                let rows = disassemble_window(&cgra.imem, start, args.n_instr)?;
                print_table(&rows);
            }
        }
    }
    Ok(())
}

fn print_table(rows: &[vwr2a::CycleRow]) {
    for (pc, row) in rows.iter().enumerate() {
        let mut cells = vec![row.lcu.clone(), row.lsu.clone(), row.mxcu.clone()];
        cells.extend(row.rcs.iter().cloned());
        println!("{pc:>4}: {}", cells.join(" | "));
    }
}
