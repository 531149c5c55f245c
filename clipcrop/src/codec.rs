//! Identities that survive the round trip through the external mapper.
//!
//! A clipped fragment is written to FASTQ under a name that encodes the
//! breakpoint it came from ([`BreakpointIdentity`]), and every flanking
//! reference window is named after its genomic origin ([`FlankingWindow`]).
//! Both use `::` between columns. Values containing the separator, a tab or
//! whitespace are rejected on encode instead of silently shifting columns.

use std::fmt;
use std::str::FromStr;

use itertools::Itertools;

use crate::breakpoint::{RawBreakpoint, Side};
use crate::chrom::ChromCode;
use crate::error::{Error, Result};

pub const SEPARATOR: &str = "::";

const BREAKPOINT_COLUMNS: usize = 7;
const WINDOW_COLUMNS: usize = 3;

fn check_field(column: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::format(format!("{} is empty", column)));
    }
    if value.contains(SEPARATOR)
        || value.starts_with(':')
        || value.ends_with(':')
        || value.contains(char::is_whitespace)
    {
        return Err(Error::format(format!(
            "{} '{}' contains the field separator or whitespace",
            column, value
        )));
    }
    Ok(())
}

fn split_columns(s: &str, expected: usize) -> Result<Vec<&str>> {
    let fields: Vec<&str> = s.split(SEPARATOR).collect();
    if fields.len() != expected {
        return Err(Error::format(format!(
            "'{}' has {} columns, expected {}",
            s,
            fields.len(),
            expected
        )));
    }
    Ok(fields)
}

fn parse_number(column: &str, value: &str) -> Result<u64> {
    lexical::parse(value).map_err(|_| Error::format(format!("invalid {}: {}", column, value)))
}

/// The breakpoint a clipped fragment was cut from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointIdentity {
    pub read_name: String,
    pub side: Side,
    pub start: u64,
    pub cigar: String,
    pub reference_name: String,
    pub is_reverse: bool,
    pub size: u64,
    chrom_code: ChromCode,
}

impl BreakpointIdentity {
    pub fn new(
        read_name: impl Into<String>,
        side: Side,
        start: u64,
        cigar: impl Into<String>,
        reference_name: impl Into<String>,
        is_reverse: bool,
        size: u64,
    ) -> Self {
        let reference_name = reference_name.into();
        Self {
            read_name: read_name.into(),
            side,
            start,
            cigar: cigar.into(),
            chrom_code: ChromCode::new(&reference_name),
            reference_name,
            is_reverse,
            size,
        }
    }

    /// Identity of a clustered breakpoint, `size` being the cluster size.
    pub fn from_breakpoint(bp: &RawBreakpoint, size: u64) -> Self {
        Self::new(
            bp.read_name.clone(),
            bp.side,
            bp.position,
            bp.cigar.clone(),
            bp.reference_name.clone(),
            bp.is_reverse,
            size,
        )
    }

    pub fn chrom_code(&self) -> &ChromCode {
        &self.chrom_code
    }

    pub fn encode(&self) -> Result<String> {
        check_field("read name", &self.read_name)?;
        check_field("CIGAR", &self.cigar)?;
        check_field("reference name", &self.reference_name)?;
        Ok([
            self.read_name.clone(),
            self.side.to_string(),
            self.start.to_string(),
            self.cigar.clone(),
            self.reference_name.clone(),
            if self.is_reverse { "-" } else { "+" }.to_string(),
            self.size.to_string(),
        ]
        .into_iter()
        .join(SEPARATOR))
    }

    pub fn decode(s: &str) -> Result<Self> {
        let fields = split_columns(s, BREAKPOINT_COLUMNS)?;
        let is_reverse = match fields[5] {
            "+" => false,
            "-" => true,
            x => return Err(Error::format(format!("invalid strand: {}", x))),
        };
        Ok(Self::new(
            fields[0],
            fields[1].parse()?,
            parse_number("start", fields[2])?,
            fields[3],
            fields[4],
            is_reverse,
            parse_number("size", fields[6])?,
        ))
    }
}

impl FromStr for BreakpointIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

/// Genomic origin of a synthetic flanking reference sequence, `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlankingWindow {
    pub reference_name: String,
    pub start: u64,
    pub end: u64,
    chrom_code: ChromCode,
}

impl FlankingWindow {
    pub fn new(reference_name: impl Into<String>, start: u64, end: u64) -> Self {
        let reference_name = reference_name.into();
        Self {
            chrom_code: ChromCode::new(&reference_name),
            reference_name,
            start,
            end,
        }
    }

    pub fn chrom_code(&self) -> &ChromCode {
        &self.chrom_code
    }

    pub fn encode(&self) -> Result<String> {
        check_field("reference name", &self.reference_name)?;
        Ok(format!(
            "{}{sep}{}{sep}{}",
            self.reference_name,
            self.start,
            self.end,
            sep = SEPARATOR
        ))
    }

    pub fn decode(s: &str) -> Result<Self> {
        let fields = split_columns(s, WINDOW_COLUMNS)?;
        Ok(Self::new(
            fields[0],
            parse_number("start", fields[1])?,
            parse_number("end", fields[2])?,
        ))
    }
}

impl FromStr for FlankingWindow {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

impl fmt::Display for FlankingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.reference_name, self.start, self.end)
    }
}
