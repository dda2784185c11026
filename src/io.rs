/*!
Kernel directory I/O: the mnemonic and hex CSV files plus the generated C
header with the IMEM bitstreams.

A kernel directory holds:
- `instructions_asm[<version>].csv`: header row, then one row of seven
  quoted mnemonic cells per cycle per active column.
- `instructions_hex[<version>].csv`: same shape, hex cells, always
  emitted for the full IMEM.
- `dsip_bitstream.h`: four flat `uint32_t` arrays ready for the host
  toolchain.

Mnemonics contain commas, so the reader speaks just enough CSV: quoted
cells with doubled-quote escapes.
*/

use std::fs;
use std::io::Write as _;
use std::path::Path;

use crate::asm::CycleRow;
use crate::engine::Imem;
use crate::error::{AsmError, Slot};
use crate::isa::{lcu, lsu, mxcu, rc, word_from_hex};
use crate::params::{CGRA_ROWS, IMEM_N_LINES};

pub const FILENAME_INSTR: &str = "instructions";
pub const EXT: &str = ".csv";
/// Cells per CSV row: LCU, LSU, MXCU and one per RC row.
const ROW_CELLS: usize = 3 + CGRA_ROWS;

fn io_err(path: &Path, source: std::io::Error) -> AsmError {
    AsmError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Split one CSV line into cells, honouring double-quoted cells.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    cell.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                cell.push(c);
            }
        } else {
            match c {
                '"' => in_quotes = true,
                ',' => cells.push(std::mem::take(&mut cell)),
                _ => cell.push(c),
            }
        }
    }
    cells.push(cell);
    cells
}

fn quote_csv_cell(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// Read `expected_rows` cycle rows from a mnemonic CSV (header skipped).
pub fn read_asm_csv(path: &Path, expected_rows: usize) -> Result<Vec<CycleRow>, AsmError> {
    let text = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut rows = Vec::with_capacity(expected_rows);
    for (i, line) in text.lines().skip(1).enumerate() {
        if rows.len() == expected_rows {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let cells = split_csv_line(line);
        if cells.len() != ROW_CELLS {
            return Err(AsmError::CsvRow {
                path: path.display().to_string(),
                row: i + 2, // 1-based, after the header
                expected: ROW_CELLS,
                last: CGRA_ROWS - 1,
                found: cells.len(),
            });
        }
        let mut cells = cells.into_iter();
        let lcu = cells.next().unwrap_or_default();
        let lsu = cells.next().unwrap_or_default();
        let mxcu = cells.next().unwrap_or_default();
        let mut rcs: [String; CGRA_ROWS] = Default::default();
        for slot in rcs.iter_mut() {
            *slot = cells.next().unwrap_or_default();
        }
        rows.push(CycleRow {
            lcu: lcu.trim().to_string(),
            lsu: lsu.trim().to_string(),
            mxcu: mxcu.trim().to_string(),
            rcs: rcs.map(|s| s.trim().to_string()),
        });
    }
    if rows.len() < expected_rows {
        return Err(AsmError::CsvShape {
            path: path.display().to_string(),
            expected: expected_rows,
            found: rows.len(),
        });
    }
    Ok(rows)
}

fn csv_header() -> String {
    let mut header = String::from("LCU,LSU,MXCU");
    for r in 0..CGRA_ROWS {
        header.push_str(&format!(",RC{r}"));
    }
    header
}

/// Write the full IMEM as a hex CSV.
pub fn write_hex_csv(path: &Path, imem: &Imem) -> Result<(), AsmError> {
    let mut out = String::new();
    out.push_str(&csv_header());
    out.push('\n');
    for line in 0..IMEM_N_LINES {
        out.push_str(&format!("{:#x},{:#x},{:#x}", imem.lcu[line], imem.lsu[line], imem.mxcu[line]));
        for r in 0..CGRA_ROWS {
            out.push_str(&format!(",{:#x}", imem.rcs[r][line]));
        }
        out.push('\n');
    }
    fs::write(path, out).map_err(|e| io_err(path, e))
}

/// Load packed hex words into the IMEM window starting at `start`.
pub fn load_hex_csv(
    path: &Path,
    imem: &mut Imem,
    start: usize,
    rows: usize,
) -> Result<(), AsmError> {
    let text = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut loaded = 0usize;
    for (i, line) in text.lines().skip(1).enumerate() {
        if loaded == rows {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let cells = split_csv_line(line);
        if cells.len() != ROW_CELLS {
            return Err(AsmError::CsvRow {
                path: path.display().to_string(),
                row: i + 2,
                expected: ROW_CELLS,
                last: CGRA_ROWS - 1,
                found: cells.len(),
            });
        }
        let at = start + loaded;
        imem.lcu[at] = word_from_hex(&cells[0], lcu::WORD_BITS, Slot::Lcu)?;
        imem.lsu[at] = word_from_hex(&cells[1], lsu::WORD_BITS, Slot::Lsu)?;
        imem.mxcu[at] = word_from_hex(&cells[2], mxcu::WORD_BITS, Slot::Mxcu)?;
        for r in 0..CGRA_ROWS {
            imem.rcs[r][at] = word_from_hex(&cells[3 + r], rc::WORD_BITS, Slot::Rc(r))?;
        }
        loaded += 1;
    }
    if loaded < rows {
        return Err(AsmError::CsvShape {
            path: path.display().to_string(),
            expected: rows,
            found: loaded,
        });
    }
    Ok(())
}

/// Write a mnemonic CSV for `rows` (the inverse of `read_asm_csv`).
pub fn write_asm_csv(path: &Path, rows: &[CycleRow]) -> Result<(), AsmError> {
    let mut out = String::new();
    out.push_str(&csv_header());
    out.push('\n');
    for row in rows {
        let mut cells = vec![row.lcu.clone(), row.lsu.clone(), row.mxcu.clone()];
        cells.extend(row.rcs.iter().cloned());
        let line: Vec<String> = cells.iter().map(|c| quote_csv_cell(c)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    fs::write(path, out).map_err(|e| io_err(path, e))
}

fn write_array(
    out: &mut impl std::io::Write,
    name: &str,
    size_expr: &str,
    words: impl Iterator<Item = u32>,
    total: usize,
) -> std::io::Result<()> {
    writeln!(out, "uint32_t {name}[{size_expr}] = {{")?;
    for (i, word) in words.enumerate() {
        let sep = if i < total - 1 { "," } else { "" };
        writeln!(out, "  {word:#x}{sep}")?;
    }
    writeln!(out, "}};\n\n")
}

/// Emit `dsip_bitstream.h`: the four IMEM bitstream arrays, RC rows
/// concatenated.
pub fn write_bitstream_header(path: &Path, imem: &Imem) -> Result<(), AsmError> {
    let mut out = Vec::new();
    (|| -> std::io::Result<()> {
        writeln!(out, "#ifndef _DSIP_BITSTREAM_H_")?;
        writeln!(out, "#define _DSIP_BITSTREAM_H_\n")?;
        writeln!(out, "#include <stdint.h>\n")?;
        writeln!(out, "#include \"dsip.h\"\n")?;
        write_array(
            &mut out,
            "dsip_lcu_imem_bitstream",
            "DSIP_IMEM_SIZE",
            imem.lcu.iter().copied(),
            IMEM_N_LINES,
        )?;
        write_array(
            &mut out,
            "dsip_lsu_imem_bitstream",
            "DSIP_IMEM_SIZE",
            imem.lsu.iter().copied(),
            IMEM_N_LINES,
        )?;
        write_array(
            &mut out,
            "dsip_mxcu_imem_bitstream",
            "DSIP_IMEM_SIZE",
            imem.mxcu.iter().copied(),
            IMEM_N_LINES,
        )?;
        write_array(
            &mut out,
            "dsip_rcs_imem_bitstream",
            &format!("{CGRA_ROWS}*DSIP_IMEM_SIZE"),
            imem.rcs.iter().flat_map(|row| row.iter().copied()),
            CGRA_ROWS * IMEM_N_LINES,
        )?;
        write!(out, "#endif // _DSIP_BITSTREAM_H_")?;
        Ok(())
    })()
    .map_err(|e| io_err(path, e))?;
    fs::write(path, out).map_err(|e| io_err(path, e))
}

/// Read SPM preload data: one CSV line of decimal words per SPM line.
pub fn read_spm_csv(path: &Path) -> Result<Vec<Vec<i32>>, AsmError> {
    let text = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut lines = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let mut words = Vec::new();
        for cell in line.split(',') {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            words.push(cell.parse::<i32>().map_err(|_| AsmError::CsvCell {
                path: path.display().to_string(),
                row: i + 1,
                reason: format!("`{cell}` is not a 32-bit decimal word"),
            })?);
        }
        lines.push(words);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::{assemble_column, cycle};

    fn tmp(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("vwr2a-io-{name}-{}", std::process::id()));
        p
    }

    #[test]
    fn csv_line_splitting_handles_quotes() {
        assert_eq!(
            split_csv_line(r#"NOP,"SADD R0, R0, R1",X"#),
            vec!["NOP", "SADD R0, R0, R1", "X"]
        );
        assert_eq!(split_csv_line("a,b"), vec!["a", "b"]);
        assert_eq!(split_csv_line(r#""he said ""hi""""#), vec![r#"he said "hi""#]);
    }

    #[test]
    fn asm_csv_round_trip() {
        let rows = vec![
            cycle(
                "SADD R0, R1, ONE",
                "LWD R0",
                "NOP",
                ["SADD R0, RCT, R0", "NOP", "NOP", "NOP"],
            ),
            cycle("EXIT", "NOP", "NOP", ["NOP"; CGRA_ROWS]),
        ];
        let path = tmp("asm");
        write_asm_csv(&path, &rows).unwrap();
        let read = read_asm_csv(&path, 2).unwrap();
        assert_eq!(read[0].lcu, rows[0].lcu);
        assert_eq!(read[0].rcs, rows[0].rcs);
        assert_eq!(read[1].lcu, "EXIT");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn short_asm_csv_reports_shape() {
        let path = tmp("short");
        std::fs::write(&path, "LCU,LSU,MXCU,RC0,RC1,RC2,RC3\nNOP,NOP,NOP,NOP,NOP,NOP,NOP\n")
            .unwrap();
        let err = read_asm_csv(&path, 3).unwrap_err();
        assert!(matches!(err, AsmError::CsvShape { found: 1, .. }));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn hex_csv_round_trip() {
        let mut imem = Imem::new();
        let rows = vec![cycle(
            "SADDI R0, R0, 5",
            "SWD ONE",
            "SADD R0, R0, ONE",
            ["NOP"; CGRA_ROWS],
        )];
        assemble_column(&mut imem, 0, 0, &rows).unwrap();
        let path = tmp("hex");
        write_hex_csv(&path, &imem).unwrap();

        let mut loaded = Imem::new();
        load_hex_csv(&path, &mut loaded, 0, 1).unwrap();
        assert_eq!(loaded.lcu[0], imem.lcu[0]);
        assert_eq!(loaded.lsu[0], imem.lsu[0]);
        assert_eq!(loaded.mxcu[0], imem.mxcu[0]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn bitstream_header_shape() {
        let imem = Imem::new();
        let path = tmp("header");
        write_bitstream_header(&path, &imem).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("#ifndef _DSIP_BITSTREAM_H_"));
        assert!(text.contains("uint32_t dsip_lcu_imem_bitstream[DSIP_IMEM_SIZE] = {"));
        assert!(text.contains("uint32_t dsip_rcs_imem_bitstream[4*DSIP_IMEM_SIZE] = {"));
        assert!(text.trim_end().ends_with("#endif // _DSIP_BITSTREAM_H_"));
        // 512 lines per slot array, 2048 for the concatenated RC array.
        assert_eq!(text.matches("  0x0,").count(), 3 * 511 + 2047);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn spm_csv_parses_decimal_lines() {
        let path = tmp("spm");
        std::fs::write(&path, "1, 2, 3\n-4,5\n").unwrap();
        let lines = read_spm_csv(&path).unwrap();
        assert_eq!(lines, vec![vec![1, 2, 3], vec![-4, 5]]);
        std::fs::remove_file(&path).ok();
    }
}
