use std::fmt;
use std::str::FromStr;

use bed_utils::bed::{BEDLike, Strand};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::alignment::AlignedRead;
use crate::chrom::ChromCode;
use crate::error::Error;
use crate::qc::ExtractStat;

/// Quality column of breakpoints cut from reads stored without qualities.
pub const MISSING_QUALITY: &str = "*";

/// Which end of the read was soft clipped.
#[derive(
    Encode, Decode, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd,
    Ord,
)]
pub enum Side {
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "R")]
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "L"),
            Side::Right => write!(f, "R"),
        }
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L" => Ok(Side::Left),
            "R" => Ok(Side::Right),
            _ => Err(Error::format(format!("invalid clip side: {}", s))),
        }
    }
}

/// A clip boundary observed in a single primary alignment, together with the
/// clipped bases.
#[derive(Encode, Decode, Debug, Clone, PartialEq, Eq)]
pub struct RawBreakpoint {
    pub reference_name: String,
    pub position: u64, // 0-based coordinate of the clip boundary
    pub side: Side,
    pub cigar: String,
    pub sequence: String,
    pub quality: String,
    pub is_reverse: bool,
    pub read_name: String,
}

impl RawBreakpoint {
    /// `<reference>_<zero padded position>`, so that a plain string sort groups
    /// breakpoints by reference and orders them by position.
    pub fn sort_key(&self) -> String {
        format!("{}_{:010}", self.reference_name, self.position)
    }

    pub fn chrom_code(&self) -> ChromCode {
        ChromCode::new(&self.reference_name)
    }

    pub fn strand_symbol(&self) -> Strand {
        if self.is_reverse {
            Strand::Reverse
        } else {
            Strand::Forward
        }
    }

    pub fn has_quality(&self) -> bool {
        !self.quality.is_empty() && self.quality != MISSING_QUALITY
    }

    /// Mean of `byte - 32` over the quality string, `None` when the source
    /// alignment had no qualities.
    pub fn mean_quality(&self) -> Option<f64> {
        if !self.has_quality() {
            return None;
        }
        let total: u64 = self.quality.bytes().map(|b| b.saturating_sub(32) as u64).sum();
        Some(total as f64 / self.quality.len() as f64)
    }
}

impl BEDLike for RawBreakpoint {
    fn chrom(&self) -> &str {
        &self.reference_name
    }
    fn set_chrom(&mut self, chrom: &str) -> &mut Self {
        self.reference_name = chrom.to_string();
        self
    }
    fn start(&self) -> u64 {
        self.position
    }
    fn set_start(&mut self, start: u64) -> &mut Self {
        self.position = start;
        self
    }
    fn end(&self) -> u64 {
        self.position + 1
    }
    fn set_end(&mut self, end: u64) -> &mut Self {
        self.position = end.saturating_sub(1);
        self
    }
    fn name(&self) -> Option<&str> {
        Some(&self.read_name)
    }
    fn score(&self) -> Option<bed_utils::bed::Score> {
        None
    }
    fn strand(&self) -> Option<Strand> {
        Some(self.strand_symbol())
    }
}

impl fmt::Display for RawBreakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.chrom(),
            self.start(),
            self.end(),
            self.side,
            self.cigar,
            self.sequence,
            self.quality,
            self.strand_symbol(),
            self.read_name,
            self.sort_key(),
        )
    }
}

impl FromStr for RawBreakpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split('\t').collect();
        if fields.len() < 9 {
            return Err(Error::format(format!(
                "raw breakpoint row has {} fields, expected at least 9",
                fields.len()
            )));
        }
        let position = lexical::parse(fields[1])
            .map_err(|_| Error::format(format!("invalid breakpoint position: {}", fields[1])))?;
        let is_reverse = match fields[7] {
            "+" => false,
            "-" => true,
            x => return Err(Error::format(format!("invalid strand: {}", x))),
        };
        Ok(RawBreakpoint {
            reference_name: fields[0].to_string(),
            position,
            side: fields[3].parse()?,
            cigar: fields[4].to_string(),
            sequence: fields[5].to_string(),
            quality: fields[6].to_string(),
            is_reverse,
            read_name: fields[8].to_string(),
        })
    }
}

/// Turns soft clipped primary alignments into raw breakpoints.
#[derive(Debug, Clone, Default)]
pub struct BreakpointExtractor {
    filter_n: bool,
}

impl BreakpointExtractor {
    pub fn new(filter_n: bool) -> Self {
        Self { filter_n }
    }

    /// Emit one breakpoint per clipped end of `read`. Records that are invalid,
    /// unmapped, not primary or carry no soft clip produce nothing.
    pub fn extract(&self, read: &AlignedRead, stat: &mut ExtractStat) -> Vec<RawBreakpoint> {
        stat.total += 1;
        if read.flags.is_secondary() || read.flags.is_supplementary() {
            stat.non_primary += 1;
            return Vec::new();
        }
        if !read.is_valid() {
            stat.invalid += 1;
            return Vec::new();
        }
        if read.is_unmapped() {
            stat.unmapped += 1;
            return Vec::new();
        }
        if !read.cigar.has_soft_clip() || read.sequence.is_empty() {
            stat.unclipped += 1;
            return Vec::new();
        }
        let Some(pos) = read.position else {
            stat.invalid += 1;
            return Vec::new();
        };

        let n = read.sequence.len();
        let cigar = read.cigar.to_string();

        let mut result = Vec::with_capacity(2);
        for side in [Side::Left, Side::Right] {
            let (len, bp) = match side {
                Side::Left => (read.cigar.left_clip_length(), read.cigar.left_breakpoint(pos)),
                Side::Right => (read.cigar.right_clip_length(), read.cigar.right_breakpoint(pos)),
            };
            if len == 0 {
                continue;
            }
            let range = match side {
                Side::Left => 0..len,
                Side::Right => n - len..n,
            };
            let sequence = &read.sequence[range.clone()];
            if self.filter_n && sequence.iter().all(|b| b.eq_ignore_ascii_case(&b'N')) {
                stat.n_filtered += 1;
                continue;
            }
            result.push(RawBreakpoint {
                reference_name: read.reference_name.clone(),
                position: bp,
                side,
                cigar: cigar.clone(),
                sequence: String::from_utf8_lossy(sequence).into_owned(),
                quality: if read.quality.is_empty() {
                    MISSING_QUALITY.to_string()
                } else {
                    String::from_utf8_lossy(&read.quality[range]).into_owned()
                },
                is_reverse: read.is_reverse_complemented(),
                read_name: read.name.clone(),
            });
        }
        stat.breakpoints += result.len() as u64;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::tests::{header_with, parse_sam_line};

    fn read(line: &str) -> AlignedRead {
        parse_sam_line(&header_with(&[("chr1", 100000)]), line)
    }

    #[test]
    fn test_right_clip() {
        // 1-based POS 101 is the 0-based position 100
        let seq = "A".repeat(30) + &"C".repeat(20);
        let qual = "I".repeat(50);
        let r = read(&format!("r1\t0\tchr1\t101\t60\t30M20S\t*\t0\t0\t{}\t{}", seq, qual));
        let mut stat = ExtractStat::default();
        let bps = BreakpointExtractor::default().extract(&r, &mut stat);
        assert_eq!(bps.len(), 1);
        let bp = &bps[0];
        assert_eq!(bp.side, Side::Right);
        assert_eq!(bp.position, 130);
        assert_eq!(bp.sequence, "C".repeat(20));
        assert_eq!(bp.quality.len(), 20);
        assert_eq!(bp.sort_key(), "chr1_0000000130");
        assert_eq!(stat.breakpoints, 1);
    }

    #[test]
    fn test_both_sides() {
        let r = read("r2\t16\tchr1\t11\t60\t2S4M3S\t*\t0\t0\tGGACGTTTT\t##IIII$$$");
        let mut stat = ExtractStat::default();
        let bps = BreakpointExtractor::default().extract(&r, &mut stat);
        assert_eq!(bps.len(), 2);
        assert_eq!((bps[0].side, bps[0].position), (Side::Left, 10));
        assert_eq!((bps[0].sequence.as_str(), bps[0].quality.as_str()), ("GG", "##"));
        assert_eq!((bps[1].side, bps[1].position), (Side::Right, 14));
        assert_eq!((bps[1].sequence.as_str(), bps[1].quality.as_str()), ("TTT", "$$$"));
        assert!(bps[1].is_reverse);
    }

    #[test]
    fn test_skipped_records() {
        let mut stat = ExtractStat::default();
        let extractor = BreakpointExtractor::default();
        let plain = read("r\t0\tchr1\t11\t60\t4M\t*\t0\t0\tACGT\tIIII");
        assert!(extractor.extract(&plain, &mut stat).is_empty());
        let unmapped = read("r\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\tIIII");
        assert!(extractor.extract(&unmapped, &mut stat).is_empty());
        assert_eq!(stat.total, 2);
        assert_eq!(stat.unclipped, 1);
        assert_eq!(stat.unmapped, 1);
    }

    #[test]
    fn test_filter_n() {
        let r = read("r\t0\tchr1\t11\t60\t3S4M\t*\t0\t0\tNNNACGT\tIIIIIII");
        let mut stat = ExtractStat::default();
        assert_eq!(BreakpointExtractor::new(false).extract(&r, &mut stat).len(), 1);
        assert!(BreakpointExtractor::new(true).extract(&r, &mut stat).is_empty());
        assert_eq!(stat.n_filtered, 1);
    }

    #[test]
    fn test_bed_row() -> anyhow::Result<()> {
        let r = parse_sam_line(
            &header_with(&[("chr2", 1000)]),
            "r3\t0\tchr2\t11\t60\t3S4M\t*\t0\t0\tTTTACGT\t+++IIII",
        );
        let bp = BreakpointExtractor::default().extract(&r, &mut ExtractStat::default()).remove(0);
        let line = bp.to_string();
        assert_eq!(line, "chr2\t10\t11\tL\t3S4M\tTTT\t+++\t+\tr3\tchr2_0000000010");
        let parsed: RawBreakpoint = line.parse()?;
        assert_eq!(parsed, bp);
        assert!("chr2\t10\t11\tL".parse::<RawBreakpoint>().is_err());
        Ok(())
    }

    #[test]
    fn test_mean_quality() {
        let mut bp: RawBreakpoint = "chr1\t0\t1\tL\t2S2M\tAA\t%%\t+\tr".parse().unwrap();
        assert_eq!(bp.mean_quality(), Some(5.0));
        bp.quality = "!#".to_string();
        assert_eq!(bp.mean_quality(), Some(2.0));
        bp.quality = MISSING_QUALITY.to_string();
        assert_eq!(bp.mean_quality(), None);
    }

    #[test]
    fn test_missing_quality() {
        let r = read("r\t0\tchr1\t11\t60\t3S4M\t*\t0\t0\tTTTACGT\t*");
        let bps = BreakpointExtractor::default().extract(&r, &mut ExtractStat::default());
        assert_eq!(bps.len(), 1);
        assert_eq!(bps[0].quality, "*");
        assert!(!bps[0].has_quality());
    }

    #[test]
    fn test_non_primary_records() {
        let mut stat = ExtractStat::default();
        let extractor = BreakpointExtractor::default();
        let lines = [
            "r1\t0\tchr1\t11\t60\t3S5M\t*\t0\t0\tTTTACGTA\tIIIIIIII",
            "r1\t2048\tchr1\t51\t60\t5M3S\t*\t0\t0\tACGTATTT\tIIIIIIII",
            "r1\t256\tchr1\t91\t60\t5M3S\t*\t0\t0\tACGTATTT\tIIIIIIII",
        ];
        let bps: Vec<_> = lines
            .iter()
            .flat_map(|l| extractor.extract(&read(l), &mut stat))
            .collect();
        assert_eq!(bps.len(), 1);
        assert_eq!((bps[0].side, bps[0].position), (Side::Left, 10));
        assert_eq!((stat.total, stat.non_primary, stat.breakpoints), (3, 2, 1));
    }
}
