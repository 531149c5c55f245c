use std::fmt;
use std::str::FromStr;

use noodles::sam::alignment::record::cigar::{op::Kind, Op};

use crate::error::Error;

/// An ordered list of CIGAR operations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cigar(Vec<Op>);

impl Cigar {
    pub fn new(ops: Vec<Op>) -> Self {
        Self(ops)
    }

    pub fn ops(&self) -> &[Op] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of reference bases covered by the alignment.
    pub fn reference_length(&self) -> u64 {
        self.0
            .iter()
            .filter(|op| op.kind().consumes_reference())
            .map(|op| op.len() as u64)
            .sum()
    }

    /// Number of read bases described by the CIGAR, clips included.
    pub fn read_length(&self) -> usize {
        self.0
            .iter()
            .filter(|op| op.kind().consumes_read())
            .map(|op| op.len())
            .sum()
    }

    pub fn has_soft_clip(&self) -> bool {
        self.0.iter().any(|op| op.kind() == Kind::SoftClip)
    }

    /// Length of the soft clip opening the alignment, if any.
    pub fn left_clip_length(&self) -> usize {
        match self.0.first() {
            Some(op) if op.kind() == Kind::SoftClip => op.len(),
            _ => 0,
        }
    }

    /// Length of the soft clip closing the alignment, if any.
    pub fn right_clip_length(&self) -> usize {
        match self.0.last() {
            Some(op) if op.kind() == Kind::SoftClip && self.0.len() > 1 => op.len(),
            _ => 0,
        }
    }

    /// The left clip boundary is the alignment start itself.
    pub fn left_breakpoint(&self, pos: u64) -> u64 {
        pos
    }

    /// First reference coordinate after the last aligned base.
    pub fn right_breakpoint(&self, pos: u64) -> u64 {
        pos + self.reference_length()
    }
}

impl From<Vec<Op>> for Cigar {
    fn from(ops: Vec<Op>) -> Self {
        Self(ops)
    }
}

impl FromStr for Cigar {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(Cigar::default());
        }
        let mut ops = Vec::new();
        let mut len_start = 0;
        for (i, c) in s.char_indices() {
            if c.is_ascii_digit() {
                continue;
            }
            let len_str = &s[len_start..i];
            if len_str.is_empty() {
                let msg = format!("missing length before '{}' in CIGAR {}", c, s);
                return Err(Error::format(msg));
            }
            let len: usize = lexical::parse(len_str).map_err(|_| {
                Error::format(format!("invalid length {} in CIGAR {}", len_str, s))
            })?;
            let kind = parse_kind(c).ok_or_else(|| {
                Error::format(format!("unknown operator '{}' in CIGAR {}", c, s))
            })?;
            ops.push(Op::new(kind, len));
            len_start = i + c.len_utf8();
        }
        if len_start != s.len() {
            return Err(Error::format(format!("dangling length in CIGAR {}", s)));
        }
        if ops.is_empty() {
            return Err(Error::format("empty CIGAR"));
        }
        Ok(Cigar(ops))
    }
}

impl fmt::Display for Cigar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "*");
        }
        for op in &self.0 {
            write!(f, "{}{}", op.len(), kind_to_char(op.kind()))?;
        }
        Ok(())
    }
}

fn parse_kind(c: char) -> Option<Kind> {
    let kind = match c {
        'M' => Kind::Match,
        'I' => Kind::Insertion,
        'D' => Kind::Deletion,
        'N' => Kind::Skip,
        'S' => Kind::SoftClip,
        'H' => Kind::HardClip,
        'P' => Kind::Pad,
        '=' => Kind::SequenceMatch,
        'X' => Kind::SequenceMismatch,
        _ => return None,
    };
    Some(kind)
}

fn kind_to_char(kind: Kind) -> char {
    match kind {
        Kind::Match => 'M',
        Kind::Insertion => 'I',
        Kind::Deletion => 'D',
        Kind::Skip => 'N',
        Kind::SoftClip => 'S',
        Kind::HardClip => 'H',
        Kind::Pad => 'P',
        Kind::SequenceMatch => '=',
        Kind::SequenceMismatch => 'X',
    }
}
