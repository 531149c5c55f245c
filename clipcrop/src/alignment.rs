use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use bstr::ByteSlice;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::RecordBuf;
use noodles::{bam, sam};

use crate::cigar::Cigar;
use crate::error::{Error, Result};
use crate::io::open_file_for_read;

/// Phred offset of the quality strings carried by breakpoints and FASTQ output.
pub const PHRED_OFFSET: u8 = 33;

/// A decoded alignment record.
///
/// `position` is 0-based. This is the only place where the 1-based
/// coordinates of SAM/BAM are converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedRead {
    pub name: String,
    pub reference_name: String,
    pub position: Option<u64>,
    pub cigar: Cigar,
    pub flags: Flags,
    pub sequence: Vec<u8>,
    pub quality: Vec<u8>, // Phred+33 ASCII
}

impl AlignedRead {
    pub fn from_record_buf(header: &sam::Header, rec: &RecordBuf) -> Result<Self> {
        let name = match rec.name() {
            Some(name) => name
                .to_str()
                .map_err(|_| Error::format("read name is not valid UTF-8"))?
                .to_string(),
            None => "*".to_string(),
        };
        let reference_name = match rec.reference_sequence_id() {
            Some(id) => {
                let (name, _) = header.reference_sequences().get_index(id).ok_or_else(|| {
                    Error::format(format!("reference sequence {} missing from header", id))
                })?;
                name.to_str()
                    .map_err(|_| Error::format("reference name is not valid UTF-8"))?
                    .to_string()
            }
            None => "*".to_string(),
        };
        let position = rec.alignment_start().map(|p| p.get() as u64 - 1);
        Ok(Self {
            name,
            reference_name,
            position,
            cigar: Cigar::new(rec.cigar().as_ref().to_vec()),
            flags: rec.flags(),
            sequence: rec.sequence().as_ref().to_vec(),
            quality: rec
                .quality_scores()
                .as_ref()
                .iter()
                .map(|q| q.saturating_add(PHRED_OFFSET))
                .collect(),
        })
    }

    pub fn is_unmapped(&self) -> bool {
        self.flags.is_unmapped()
    }

    pub fn is_reverse_complemented(&self) -> bool {
        self.flags.is_reverse_complemented()
    }

    /// Mapped records need a position, a reference and a sequence that agrees
    /// with the CIGAR.
    pub fn is_valid(&self) -> bool {
        if self.is_unmapped() {
            return true;
        }
        if self.position.is_none() || self.reference_name == "*" || self.cigar.is_empty() {
            return false;
        }
        let seq_ok = self.sequence.is_empty() || self.sequence.len() == self.cigar.read_length();
        let qual_ok = self.quality.is_empty() || self.quality.len() == self.sequence.len();
        seq_ok && qual_ok
    }
}

trait RecordSource {
    fn read_record(&mut self, header: &sam::Header, record: &mut RecordBuf) -> io::Result<usize>;
}

impl<R: BufRead> RecordSource for sam::io::Reader<R> {
    fn read_record(&mut self, header: &sam::Header, record: &mut RecordBuf) -> io::Result<usize> {
        self.read_record_buf(header, record)
    }
}

impl<R: Read> RecordSource for bam::io::Reader<R> {
    fn read_record(&mut self, header: &sam::Header, record: &mut RecordBuf) -> io::Result<usize> {
        self.read_record_buf(header, record)
    }
}

/// Streams alignment records from a SAM or BAM file.
pub struct AlignmentReader {
    header: sam::Header,
    source: Box<dyn RecordSource + Send>,
}

impl AlignmentReader {
    /// Open a SAM (optionally compressed) or BAM file. BAM is recognized by
    /// its extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let is_bam = path.extension().is_some_and(|ext| ext == "bam");
        if is_bam {
            let file = File::open(path).map_err(|e| Error::resource(e, path))?;
            let mut reader = bam::io::Reader::new(file);
            let header = reader.read_header()?;
            Ok(Self {
                header,
                source: Box::new(reader),
            })
        } else {
            let mut reader = sam::io::Reader::new(BufReader::new(open_file_for_read(path)?));
            let header = reader.read_header()?;
            Ok(Self {
                header,
                source: Box::new(reader),
            })
        }
    }

    pub fn header(&self) -> &sam::Header {
        &self.header
    }
}

/// Records that cannot be parsed come out as [`Error::Format`] and the
/// reader moves on to the next record. Any other read failure is an
/// [`Error::Io`].
impl Iterator for AlignmentReader {
    type Item = Result<RecordBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = RecordBuf::default();
        match self.source.read_record(&self.header, &mut record) {
            Ok(0) => None,
            Ok(_) => Some(Ok(record)),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                Some(Err(Error::format(format!("malformed alignment record: {}", e))))
            }
            Err(e) => Some(Err(e.into())),
        }
    }
}
