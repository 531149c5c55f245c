use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use bed_utils::extsort::ExternalSorterBuilder;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::alignment::AlignedRead;
use crate::breakpoint::Side;
use crate::chrom::ChromCode;
use crate::codec::{BreakpointIdentity, FlankingWindow};
use crate::error::{Error, Result};
use crate::qc::ClassifyStat;

/// Second reference name of a call that stays on one reference.
pub const SAME_REFERENCE: &str = "=";

#[derive(
    Encode, Decode, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd,
    Ord,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum SvType {
    Del,
    Dup,
    Inv,
    Ins,
    Ctx,
}

impl SvType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SvType::Del => "DEL",
            SvType::Dup => "DUP",
            SvType::Inv => "INV",
            SvType::Ins => "INS",
            SvType::Ctx => "CTX",
        }
    }

    /// Types whose calls span an interval on a single reference.
    pub fn has_span(&self) -> bool {
        matches!(self, SvType::Del | SvType::Dup | SvType::Inv)
    }
}

impl fmt::Display for SvType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SvType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DEL" => Ok(SvType::Del),
            "DUP" => Ok(SvType::Dup),
            "INV" => Ok(SvType::Inv),
            "INS" => Ok(SvType::Ins),
            "CTX" => Ok(SvType::Ctx),
            _ => Err(Error::format(format!("unknown SV type: {}", s))),
        }
    }
}

/// SV evidence from one re-aligned clipped fragment. Coordinates are 0-based,
/// `[start, end)`.
#[derive(Encode, Decode, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SvCandidate {
    pub reference_name: String,
    pub start: u64,
    pub end: u64,
    pub sv_type: SvType,
    pub length: Option<u64>, // None when unknown
    pub second_reference_name: String,
    pub second_start: Option<u64>,
    pub side: Side,
}

impl SvCandidate {
    pub fn chrom_code(&self) -> ChromCode {
        ChromCode::new(&self.reference_name)
    }

    /// Code of the partner reference, or of the first one for intra-reference calls.
    pub fn second_chrom_code(&self) -> ChromCode {
        if self.second_reference_name == SAME_REFERENCE {
            self.chrom_code()
        } else {
            ChromCode::new(&self.second_reference_name)
        }
    }

    /// Fixed-width key that orders candidates by reference pair, start,
    /// length, clip side and type.
    pub fn sort_key(&self) -> String {
        format!(
            "{:03}{:03}{:011}{:010}{}{}",
            self.chrom_code().code(),
            self.second_chrom_code().code(),
            self.start,
            self.length.unwrap_or(0),
            self.side,
            self.sv_type,
        )
    }

    /// `sort key \t JSON`, one candidate per line.
    pub fn to_line(&self) -> Result<String> {
        let json = serde_json::to_string(self).map_err(|e| Error::format(e.to_string()))?;
        Ok(format!("{}\t{}", self.sort_key(), json))
    }

    pub fn from_line(line: &str) -> Result<Self> {
        let (_, json) = line
            .split_once('\t')
            .ok_or_else(|| Error::format(format!("missing sort key column: {}", line)))?;
        serde_json::from_str(json)
            .map_err(|e| Error::format(format!("invalid SV candidate: {}", e)))
    }
}

/// Infer the SV implied by where a clipped fragment re-aligned.
///
/// The read name of `read` must encode the originating breakpoint and its
/// reference name must encode the flanking window it aligned to. Returns
/// `Ok(None)` for pairings of zero length, which carry no signal.
pub fn classify(read: &AlignedRead, stat: &mut ClassifyStat) -> Result<Option<SvCandidate>> {
    let bp = BreakpointIdentity::decode(&read.name)?;

    if read.is_unmapped() {
        stat.add_candidate(SvType::Ins);
        return Ok(Some(SvCandidate {
            reference_name: bp.reference_name,
            start: bp.start,
            end: bp.start + 1,
            sv_type: SvType::Ins,
            length: None,
            second_reference_name: SAME_REFERENCE.to_string(),
            second_start: None,
            side: bp.side,
        }));
    }

    let window = FlankingWindow::decode(&read.reference_name)?;
    let pos = read
        .position
        .ok_or_else(|| {
            Error::validation(format!("mapped fragment {} has no position", read.name))
        })?;
    let rev = read.is_reverse_complemented();
    // The partner breakpoint sits at the far end of the re-aligned span when a
    // left clip aligns forward or a right clip aligns reversed.
    let offset = if (bp.side == Side::Left) ^ rev {
        pos + read.cigar.reference_length()
    } else {
        pos
    };
    let partner = window.start + offset;

    if window.chrom_code() != bp.chrom_code() {
        stat.add_candidate(SvType::Ctx);
        return Ok(Some(SvCandidate {
            start: bp.start,
            end: bp.start + 1,
            sv_type: SvType::Ctx,
            length: None,
            second_reference_name: window.reference_name,
            second_start: Some(partner),
            side: bp.side,
            reference_name: bp.reference_name,
        }));
    }

    if partner == bp.start {
        stat.degenerate += 1;
        return Ok(None);
    }

    let start = bp.start.min(partner);
    let length = bp.start.abs_diff(partner);
    let is_dup = (bp.side == Side::Left) ^ (bp.start > partner);
    let sv_type = if rev {
        SvType::Inv
    } else if is_dup {
        SvType::Dup
    } else {
        SvType::Del
    };
    stat.add_candidate(sv_type);
    Ok(Some(SvCandidate {
        reference_name: bp.reference_name,
        start,
        end: start + length,
        sv_type,
        length: Some(length),
        second_reference_name: SAME_REFERENCE.to_string(),
        second_start: None,
        side: bp.side,
    }))
}

fn compare_candidates(a: &SvCandidate, b: &SvCandidate) -> Ordering {
    a.chrom_code()
        .cmp(&b.chrom_code())
        .then_with(|| a.second_chrom_code().cmp(&b.second_chrom_code()))
        .then_with(|| a.sort_key().cmp(&b.sort_key()))
}

/// Externally sort candidates so that members of one cluster are adjacent.
pub fn sort_candidates<I>(
    candidates: I,
    temp_dir: Option<PathBuf>,
    chunk_size: usize,
) -> anyhow::Result<impl Iterator<Item = anyhow::Result<SvCandidate>>>
where
    I: IntoIterator<Item = SvCandidate>,
{
    let mut sorter = ExternalSorterBuilder::new()
        .with_chunk_size(chunk_size)
        .with_compression(2);
    if let Some(tmp) = temp_dir {
        sorter = sorter.with_tmp_dir(tmp);
    }
    Ok(sorter
        .build()?
        .sort_by(candidates.into_iter(), compare_candidates)?
        .map(|x| x.map_err(anyhow::Error::from)))
}
