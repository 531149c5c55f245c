use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::{info, warn};
use rayon::prelude::*;

use crate::cluster::ConsensusSvRecord;
use crate::error::{Error, Result};
use crate::io::open_file_for_write;
use crate::sv::SvType;

pub const SV_BED_COLUMNS: [&str; 10] = [
    "referenceName",
    "start",
    "end",
    "type",
    "length",
    "score",
    "secondReferenceName",
    "secondStart",
    "caller",
    "otherInfo",
];

pub const ALL_TYPES_FILE: &str = "all.bed";

pub fn sv_bed_header() -> String {
    format!("#{}", SV_BED_COLUMNS.iter().join("\t"))
}

/// Output file of one SV type, e.g. `del.bed`.
pub fn type_file_name(ty: SvType) -> String {
    format!("{}.bed", ty.as_str().to_lowercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Type(SvType),
    All,
}

impl Channel {
    fn file_name(&self) -> String {
        match self {
            Channel::Type(ty) => type_file_name(*ty),
            Channel::All => ALL_TYPES_FILE.to_string(),
        }
    }

    fn accepts(&self, record: &ConsensusSvRecord) -> bool {
        match self {
            Channel::Type(ty) => record.sv_type == *ty,
            Channel::All => true,
        }
    }
}

/// Buffers consensus calls and writes them, best score first, into one BED
/// file per SV type plus `all.bed`.
#[derive(Debug, Default)]
pub struct SvWriter {
    records: Vec<ConsensusSvRecord>,
    types: BTreeSet<SvType>,
    rejected: u64,
}

impl SvWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a call. Calls without a reference name or with an empty
    /// interval are rejected; the writer stays usable.
    pub fn accept(&mut self, record: ConsensusSvRecord) -> Result<()> {
        if record.reference_name.is_empty() {
            self.rejected += 1;
            return Err(Error::validation("SV call without a reference name"));
        }
        if record.end <= record.start {
            self.rejected += 1;
            return Err(Error::validation(format!(
                "SV call {}:{}-{} has an empty interval",
                record.reference_name, record.start, record.end
            )));
        }
        self.types.insert(record.sv_type);
        self.records.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Write every buffered call and return the files written. Returns only
    /// after all of them are flushed.
    pub fn finalize<P: AsRef<Path>>(mut self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        // stable, so equal scores keep their arrival order
        self.records
            .sort_by(|a, b| b.score.unwrap_or(-1).cmp(&a.score.unwrap_or(-1)));
        let channels: Vec<Channel> = self
            .types
            .iter()
            .map(|ty| Channel::Type(*ty))
            .chain(std::iter::once(Channel::All))
            .collect();
        let header = sv_bed_header();
        let records = &self.records;
        let files = channels
            .par_iter()
            .map(|channel| {
                let path = dir.join(channel.file_name());
                let mut writer = open_file_for_write(&path, None, None, 1)?;
                let mut n = 0usize;
                writeln!(writer, "{}", header).map_err(|e| Error::resource(e, &path))?;
                for record in records.iter().filter(|r| channel.accepts(r)) {
                    writeln!(writer, "{}", record).map_err(|e| Error::resource(e, &path))?;
                    n += 1;
                }
                writer.flush().map_err(|e| Error::resource(e, &path))?;
                info!("Wrote {} SV calls to {}", n, path.display());
                Ok(path)
            })
            .collect::<Result<Vec<_>>>()?;
        if self.rejected > 0 {
            warn!("{} SV calls were rejected before writing", self.rejected);
        }
        Ok(files)
    }
}
