use std::collections::HashMap;
use std::io::{BufRead, Seek, Write};
use std::path::Path;

use itertools::Itertools;
use log::{debug, warn};
use noodles::core::{Position, Region};
use noodles::fasta;

use crate::codec::FlankingWindow;
use crate::error::{Error, Result};
use crate::io::read_data_lines;

pub const FASTA_LINE_WIDTH: usize = 50;

/// Random access to reference sequences, 0-based half-open coordinates.
pub trait SequenceFetcher {
    fn reference_length(&self, name: &str) -> Option<u64>;

    fn fetch(&mut self, name: &str, start: u64, end: u64) -> Result<Vec<u8>>;
}

/// Reference backed by a FASTA file with a `.fai` index next to it.
pub struct IndexedFasta<R> {
    reader: fasta::io::IndexedReader<R>,
    lengths: HashMap<String, u64>,
}

pub fn open_indexed_fasta<P: AsRef<Path>>(
    path: P,
) -> Result<IndexedFasta<impl BufRead + Seek + Send>> {
    let path = path.as_ref();
    let reader = fasta::io::indexed_reader::Builder::default()
        .build_from_path(path)
        .map_err(|e| Error::resource(e, path))?;
    let lengths = reader
        .index()
        .as_ref()
        .iter()
        .map(|rec| (String::from_utf8_lossy(rec.name().as_ref()).into_owned(), rec.length()))
        .collect();
    Ok(IndexedFasta { reader, lengths })
}

impl<R: BufRead + Seek> SequenceFetcher for IndexedFasta<R> {
    fn reference_length(&self, name: &str) -> Option<u64> {
        self.lengths.get(name).copied()
    }

    fn fetch(&mut self, name: &str, start: u64, end: u64) -> Result<Vec<u8>> {
        let to_position = |x: u64| {
            Position::try_from(x as usize)
                .map_err(|_| Error::format(format!("invalid position in {}: {}", name, x)))
        };
        let region = Region::new(name, to_position(start + 1)?..=to_position(end)?);
        let record = self.reader.query(&region)?;
        Ok(record.sequence().as_ref().to_vec())
    }
}

/// Reference name and start of every clustered breakpoint in a BED file.
/// Lines with fewer than three columns are skipped.
pub fn read_breakpoint_positions<P: AsRef<Path>>(path: P) -> Result<Vec<(String, u64)>> {
    let mut result = Vec::new();
    for line in read_data_lines(path)? {
        let line = line?;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            debug!("skipping short breakpoint line: {}", line);
            continue;
        }
        let start = lexical::parse(fields[1])
            .map_err(|_| Error::format(format!("invalid breakpoint start: {}", fields[1])))?;
        result.push((fields[0].to_string(), start));
    }
    Ok(result)
}

/// Windows of `flank` bases around each breakpoint, merged where they
/// overlap, in (chromosome code, start) order.
pub fn flanking_windows<I>(breakpoints: I, flank: u64) -> Vec<FlankingWindow>
where
    I: IntoIterator<Item = (String, u64)>,
{
    breakpoints
        .into_iter()
        .map(|(name, pos)| FlankingWindow::new(name, pos.saturating_sub(flank), pos + flank))
        .sorted_by(|a, b| {
            a.chrom_code()
                .cmp(b.chrom_code())
                .then_with(|| a.start.cmp(&b.start))
                .then_with(|| a.end.cmp(&b.end))
        })
        .dedup()
        .coalesce(|a, b| {
            if a.reference_name == b.reference_name && b.start <= a.end {
                let end = a.end.max(b.end);
                Ok(FlankingWindow::new(a.reference_name, a.start, end))
            } else {
                Err((a, b))
            }
        })
        .collect()
}

/// Fetch every window and write it as a FASTA record named after its origin.
/// Windows on unknown references are skipped. Returns the records written.
pub fn write_flanking_fasta<F, W>(
    windows: &[FlankingWindow],
    fetcher: &mut F,
    output: W,
) -> Result<usize>
where
    F: SequenceFetcher,
    W: Write,
{
    let mut writer = fasta::io::writer::Builder::default()
        .set_line_base_count(FASTA_LINE_WIDTH)
        .build_from_writer(output);
    let mut n = 0;
    for window in windows {
        let Some(len) = fetcher.reference_length(&window.reference_name) else {
            warn!("reference {} not found, skipping {}", window.reference_name, window);
            continue;
        };
        let end = window.end.min(len);
        if end <= window.start {
            continue;
        }
        let clamped = FlankingWindow::new(window.reference_name.clone(), window.start, end);
        let sequence = fetcher.fetch(&clamped.reference_name, clamped.start, end)?;
        let record = fasta::Record::new(
            fasta::record::Definition::new(clamped.encode()?, None),
            fasta::record::Sequence::from(sequence),
        );
        writer.write_record(&record)?;
        n += 1;
    }
    Ok(n)
}
