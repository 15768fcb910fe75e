//! # capture
//!
//! Output files:
//!   - `.dat` capture: the parameter section followed by every complete record,
//!     so a capture can be replayed by the simulator with `--dat`
//!   - parameter table: one fixed-width text row per record for a single
//!     logged parameter (`sl.no | time | v0..v4 | valid`)

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use telemetry_types::{ContainerFile, DecodedValue, ParameterSet, MINOR_SAMPLES};

// ── .dat capture ──────────────────────────────────────────────────────────────

pub struct DatCapture<W: Write> {
    out: W,
    records: u64,
}

impl DatCapture<BufWriter<File>> {
    /// Create (overwrite) `path`.
    pub fn create(path: impl AsRef<Path>, params: &ParameterSet) -> io::Result<Self> {
        Self::new(BufWriter::new(File::create(path)?), params)
    }
}

impl<W: Write> DatCapture<W> {
    pub fn new(mut out: W, params: &ParameterSet) -> io::Result<Self> {
        out.write_all(&ContainerFile::new(params.clone(), Vec::new()).to_bytes())?;
        Ok(Self { out, records: 0 })
    }

    pub fn append(&mut self, record: &[u8]) -> io::Result<()> {
        self.out.write_all(record)?;
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

// ── Parameter table ───────────────────────────────────────────────────────────

pub struct ParameterTable<W: Write> {
    out: W,
    rows: u64,
}

impl ParameterTable<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::new(BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> ParameterTable<W> {
    pub fn new(mut out: W) -> io::Result<Self> {
        writeln!(
            out,
            "{:>5} | {:>8} | {:>8} | {:>8} | {:>8} | {:>8} | {:>8} | {:>6}",
            "sl.no", "time", "v0", "v1", "v2", "v3", "v4", "valid"
        )?;
        writeln!(out, "{}+{}+{}", "-".repeat(5), vec!["-".repeat(10); 6].join("+"), "-".repeat(8))?;
        Ok(Self { out, rows: 0 })
    }

    /// Append one row; returns the formatted line without its newline.
    pub fn write_row(&mut self, time: f64, value: &DecodedValue) -> io::Result<String> {
        self.rows += 1;
        let line = format_row(self.rows, time, value);
        writeln!(self.out, "{line}")?;
        self.out.flush()?;
        Ok(line)
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Five columns regardless of cadence: a major value is repeated, a missing
/// value is NaN with `valid = 0`.
pub fn format_row(sl_no: u64, time: f64, value: &DecodedValue) -> String {
    let mut vals = [f64::NAN; MINOR_SAMPLES];
    match value {
        DecodedValue::Major(s) => vals = [s.value; MINOR_SAMPLES],
        DecodedValue::Minor(samples) => {
            for (v, s) in vals.iter_mut().zip(samples) {
                *v = s.value;
            }
        }
        DecodedValue::Missing(_) => {}
    }
    let valid = u8::from(!value.is_missing());
    format!(
        "{sl_no:5} | {time:8.3} | {:8.3} | {:8.3} | {:8.3} | {:8.3} | {:8.3} | {valid:6}",
        vals[0], vals[1], vals[2], vals[3], vals[4]
    )
}
