use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bed_utils::extsort::ExternalSorterBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use log::{debug, info, warn};
use noodles::fastq;
use rayon::prelude::*;

use crate::alignment::{AlignedRead, AlignmentReader};
use crate::breakpoint::{BreakpointExtractor, RawBreakpoint};
use crate::cluster::{
    BreakpointClusterOpts, ClusterBreakpoints, ClusterSvCandidates, SvClusterOpts,
    BREAKPOINT_BED_HEADER,
};
use crate::config::Config;
use crate::flank::{
    flanking_windows, read_breakpoint_positions, write_flanking_fasta, SequenceFetcher,
};
use crate::io::{open_file_for_write, parse_data_lines, ParsedRows};
use crate::qc::{ClassifyStat, ExtractStat, Metrics};
use crate::sv::{classify, sort_candidates, SvCandidate};
use crate::writer::SvWriter;

pub const RAW_BREAKPOINTS_FILE: &str = "rawbreaks.bed";
pub const BREAKPOINTS_FILE: &str = "bp.bed";
pub const BREAKPOINT_FASTQ_FILE: &str = "bp.fastq";
pub const FLANKING_FASTA_FILE: &str = "bp.fasta";
pub const SV_CANDIDATES_FILE: &str = "svinfo.tsv";

const RECORD_CHUNK_SIZE: usize = 50_000;

/// Re-aligns clipped fragments to the flanking reference.
pub trait Mapper {
    /// Align the reads in `reads` (FASTQ) against `reference` (FASTA) and
    /// return the path of the resulting SAM or BAM file, written under `out_dir`.
    fn map(&self, reference: &Path, reads: &Path, out_dir: &Path) -> Result<PathBuf>;
}

/// Extract raw breakpoints from every record of a SAM/BAM file, in parallel
/// over chunks of records, and write them to `output` as raw breakpoint rows.
/// Malformed records are counted and skipped; read failures abort the
/// extraction.
pub fn extract_breakpoints<P: AsRef<Path>, W: Write>(
    input: P,
    extractor: &BreakpointExtractor,
    num_threads: usize,
    output: &mut W,
) -> Result<ExtractStat> {
    let input = input.as_ref();
    let mut reader = AlignmentReader::from_path(input)
        .with_context(|| format!("cannot read alignments from {}", input.display()))?;
    let header = reader.header().clone();
    let pool = rayon::ThreadPoolBuilder::new().num_threads(num_threads).build()?;

    let style = ProgressStyle::with_template("[{elapsed}] {spinner} {human_pos} records")?;
    let progress_bar = ProgressBar::new_spinner().with_style(style);
    let mut stat = ExtractStat::default();
    let chunks = reader.by_ref().chunks(RECORD_CHUNK_SIZE);
    for chunk in &chunks {
        let mut records = Vec::with_capacity(RECORD_CHUNK_SIZE);
        for rec in chunk {
            match rec {
                Ok(rec) => records.push(rec),
                Err(e) if e.is_recoverable() => {
                    debug!("skipping record: {}", e);
                    stat.total += 1;
                    stat.format_errors += 1;
                }
                Err(e) => {
                    let e = anyhow::Error::from(e);
                    return Err(e.context(format!("failed to read {}", input.display())));
                }
            }
        }
        let (bps, chunk_stat) = pool.install(|| {
            records
                .par_iter()
                .map(|rec| {
                    let mut stat = ExtractStat::default();
                    let bps = match AlignedRead::from_record_buf(&header, rec) {
                        Ok(read) => extractor.extract(&read, &mut stat),
                        Err(e) => {
                            debug!("skipping undecodable record: {}", e);
                            stat.total += 1;
                            stat.format_errors += 1;
                            Vec::new()
                        }
                    };
                    (bps, stat)
                })
                .reduce(
                    || (Vec::new(), ExtractStat::default()),
                    |(mut a, mut stat_a), (b, stat_b)| {
                        a.extend(b);
                        stat_a.combine(&stat_b);
                        (a, stat_a)
                    },
                )
        });
        progress_bar.inc(records.len() as u64);
        for bp in &bps {
            writeln!(output, "{}", bp)?;
        }
        stat.combine(&chunk_stat);
    }
    progress_bar.finish_and_clear();
    Ok(stat)
}

/// Raw breakpoint rows of a file, parsed as they are consumed. Rows that
/// cannot be parsed are skipped and counted.
pub fn read_raw_breakpoints<P: AsRef<Path>>(path: P) -> Result<ParsedRows<RawBreakpoint>> {
    Ok(parse_data_lines(path, |line| line.parse::<RawBreakpoint>())?)
}

/// Externally sort breakpoints by reference and position.
pub fn sort_breakpoints<I>(
    breakpoints: I,
    temp_dir: Option<PathBuf>,
    chunk_size: usize,
) -> Result<impl Iterator<Item = Result<RawBreakpoint>>>
where
    I: IntoIterator<Item = RawBreakpoint>,
{
    let mut sorter = ExternalSorterBuilder::new()
        .with_chunk_size(chunk_size)
        .with_compression(2);
    if let Some(tmp) = temp_dir {
        sorter = sorter.with_tmp_dir(tmp);
    }
    Ok(sorter
        .build()?
        .sort_by(breakpoints.into_iter(), |a, b| a.sort_key().cmp(&b.sort_key()))?
        .map(|x| x.map_err(anyhow::Error::from)))
}

/// The full structural variant calling pipeline.
///
/// Output files are written to the output directory:
/// `rawbreaks.bed`, `bp.bed`, `bp.fastq`, `bp.fasta`, `svinfo.tsv`, one
/// `<type>.bed` per SV type found, and `all.bed`.
pub struct ClipCrop<M, F> {
    mapper: M,
    fetcher: F,
    config: Config,
    output_dir: PathBuf,
}

impl<M: Mapper, F: SequenceFetcher> ClipCrop<M, F> {
    pub fn new(mapper: M, fetcher: F) -> Self {
        Self {
            mapper,
            fetcher,
            config: Config::default(),
            output_dir: PathBuf::from("./"),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_output_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.output_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Call SVs from the soft clipped reads of a SAM/BAM file.
    pub fn run<P: AsRef<Path>>(&mut self, alignments: P) -> Result<Metrics> {
        self.prepare()?;
        let mut metrics = Metrics::default();
        let raw = self.extract(alignments.as_ref(), &mut metrics)?;
        self.call(&raw, &mut metrics)?;
        Ok(metrics)
    }

    /// Call SVs from previously extracted raw breakpoint rows.
    pub fn run_from_raw_breakpoints<P: AsRef<Path>>(&mut self, raw: P) -> Result<Metrics> {
        self.prepare()?;
        let mut metrics = Metrics::default();
        self.call(raw.as_ref(), &mut metrics)?;
        Ok(metrics)
    }

    fn prepare(&self) -> Result<()> {
        self.config.validate()?;
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("cannot create {}", self.output_dir.display()))
    }

    fn call(&mut self, raw: &Path, metrics: &mut Metrics) -> Result<()> {
        let clusters = self.cluster_breakpoints(raw, metrics)?;
        let fasta = self.write_flanking_reference(&clusters)?;
        let fastq = self.output_dir.join(BREAKPOINT_FASTQ_FILE);
        info!("Mapping clipped sequences to {}", fasta.display());
        let mapped = self
            .mapper
            .map(&fasta, &fastq, &self.output_dir)
            .context("failed to map clipped sequences")?;
        let candidates = self.classify_fragments(&mapped, metrics)?;
        self.call_svs(&candidates, metrics)
    }

    fn extract(&self, alignments: &Path, metrics: &mut Metrics) -> Result<PathBuf> {
        info!("Extracting breakpoints from {}", alignments.display());
        let extractor = BreakpointExtractor::new(self.config.filter_n);
        let path = self.output_dir.join(RAW_BREAKPOINTS_FILE);
        let mut output = open_file_for_write(&path, None, None, 1)?;
        let num_threads = self.config.num_threads;
        let stat = extract_breakpoints(alignments, &extractor, num_threads, &mut output)?;
        output.flush()?;
        stat.report(metrics);
        info!("Wrote {} breakpoints to {}", stat.breakpoints, path.display());
        Ok(path)
    }

    /// Sort and cluster raw breakpoints, write the clusters and their clipped
    /// sequences, and return the path of the cluster BED file.
    fn cluster_breakpoints(&self, raw: &Path, metrics: &mut Metrics) -> Result<PathBuf> {
        let mut rows = read_raw_breakpoints(raw)?;
        let temp_dir = self.config.temp_dir.clone();
        let sorted = sort_breakpoints(&mut rows, temp_dir, self.config.chunk_size)?;

        let bed_path = self.output_dir.join(BREAKPOINTS_FILE);
        let mut bed = open_file_for_write(&bed_path, None, None, 1)?;
        writeln!(bed, "{}", BREAKPOINT_BED_HEADER)?;
        let fastq_path = self.output_dir.join(BREAKPOINT_FASTQ_FILE);
        let mut fastq_output = open_file_for_write(&fastq_path, None, None, 1)?;
        let mut fastq = fastq::io::Writer::new(&mut fastq_output);

        let min_seq_length = self.config.min_seq_length;
        let opts = BreakpointClusterOpts::from(&self.config);
        let mut stat = itertools::process_results(sorted, |bps| -> Result<_> {
            let mut clusterer = bps.cluster_breakpoints(opts);
            let mut short = 0;
            let mut unnamed = 0;
            for cluster in clusterer.by_ref() {
                writeln!(bed, "{}", cluster)?;
                short += cluster
                    .members
                    .iter()
                    .filter(|bp| bp.sequence.len() < min_seq_length)
                    .count() as u64;
                for record in cluster.fastq_records(min_seq_length) {
                    match record {
                        Ok(record) => fastq.write_record(&record)?,
                        Err(e) => {
                            warn!("clipped sequence not written: {}", e);
                            unnamed += 1;
                        }
                    }
                }
            }
            let mut stat = clusterer.stat().clone();
            stat.short_sequences = short;
            stat.format_errors = unnamed;
            Ok(stat)
        })??;
        drop(fastq);
        bed.flush()?;
        fastq_output.flush()?;

        stat.format_errors += rows
            .finish()
            .with_context(|| format!("failed to read {}", raw.display()))?;
        stat.report(metrics);
        info!("Found {} breakpoint clusters", stat.clusters);
        Ok(bed_path)
    }

    fn write_flanking_reference(&mut self, clusters: &Path) -> Result<PathBuf> {
        let positions = read_breakpoint_positions(clusters)?;
        let windows = flanking_windows(positions, self.config.flank_length);
        let path = self.output_dir.join(FLANKING_FASTA_FILE);
        let mut output = open_file_for_write(&path, None, None, 1)?;
        let n = write_flanking_fasta(&windows, &mut self.fetcher, &mut output)?;
        output.flush()?;
        info!("Wrote {} flanking sequences to {}", n, path.display());
        Ok(path)
    }

    /// Classify every re-aligned fragment and write the candidates as
    /// `sort key \t JSON` rows.
    fn classify_fragments(&self, mapped: &Path, metrics: &mut Metrics) -> Result<PathBuf> {
        let mut reader = AlignmentReader::from_path(mapped)
            .with_context(|| format!("cannot read mapped fragments from {}", mapped.display()))?;
        let header = reader.header().clone();
        let path = self.output_dir.join(SV_CANDIDATES_FILE);
        let mut output = open_file_for_write(&path, None, None, 1)?;
        let mut stat = ClassifyStat::default();

        for rec in reader.by_ref() {
            let rec = match rec {
                Ok(rec) => rec,
                Err(e) if e.is_recoverable() => {
                    debug!("skipping mapped record: {}", e);
                    stat.format_errors += 1;
                    continue;
                }
                Err(e) => {
                    let e = anyhow::Error::from(e);
                    return Err(e.context(format!("failed to read {}", mapped.display())));
                }
            };
            if rec.flags().is_secondary() || rec.flags().is_supplementary() {
                continue;
            }
            let result = AlignedRead::from_record_buf(&header, &rec)
                .and_then(|read| classify(&read, &mut stat))
                .and_then(|sv| sv.map(|sv| sv.to_line()).transpose());
            match result {
                Ok(Some(line)) => writeln!(output, "{}", line)?,
                Ok(None) => {}
                Err(e) if e.is_recoverable() => {
                    debug!("skipping mapped fragment: {}", e);
                    stat.format_errors += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        output.flush()?;
        stat.report(metrics);
        Ok(path)
    }

    fn call_svs(&self, candidates: &Path, metrics: &mut Metrics) -> Result<()> {
        let mut rows = parse_data_lines(candidates, SvCandidate::from_line)?;
        let temp_dir = self.config.temp_dir.clone();
        let sorted = sort_candidates(&mut rows, temp_dir, self.config.chunk_size)?;

        let opts = SvClusterOpts::from(&self.config);
        let mut writer = SvWriter::new();
        let mut stat = itertools::process_results(sorted, |svs| {
            let mut clusterer = svs.cluster_sv_candidates(opts);
            for call in clusterer.by_ref() {
                if let Err(e) = writer.accept(call) {
                    warn!("{}", e);
                }
            }
            clusterer.stat().clone()
        })?;
        stat.format_errors += rows
            .finish()
            .with_context(|| format!("failed to read {}", candidates.display()))?;
        stat.report(metrics);
        metrics.add("writer.calls", writer.len() as u64);
        metrics.add("writer.rejected", writer.rejected());

        let files = writer.finalize(&self.output_dir)?;
        info!("Wrote SV calls to {} files", files.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_raw_breakpoints() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(RAW_BREAKPOINTS_FILE);
        std::fs::write(
            &path,
            "chr2\t30\t31\tR\t10M5S\tAAAAA\tIIIII\t+\tr1\tchr2_0000000030\n\
             chr1\t900\t901\tL\t5S10M\tCCCCC\tIIIII\t-\tr2\tchr1_0000000900\n\
             chr1\tx\t1\tL\n\
             chr1\t85\t86\tL\t5S10M\tGGGGG\tIIIII\t+\tr3\tchr1_0000000085\n",
        )?;
        let mut rows = read_raw_breakpoints(&path)?;
        let sorted = sort_breakpoints(&mut rows, Some(dir.path().to_path_buf()), 2)?
            .collect::<Result<Vec<_>>>()?;
        let names: Vec<_> = sorted.iter().map(|bp| bp.read_name.as_str()).collect();
        assert_eq!(names, vec!["r3", "r2", "r1"]);
        assert_eq!(rows.finish()?, 1);
        Ok(())
    }

    fn extract(sam: &str) -> Result<(Vec<String>, ExtractStat)> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("input.sam");
        std::fs::write(&path, sam)?;
        let mut output = Vec::new();
        let stat = extract_breakpoints(&path, &BreakpointExtractor::default(), 2, &mut output)?;
        let rows = String::from_utf8(output)?.lines().map(str::to_string).collect();
        Ok((rows, stat))
    }

    #[test]
    fn test_extract_breakpoints() -> Result<()> {
        let (rows, stat) = extract(
            "@SQ\tSN:chr1\tLN:1000\n\
             r1\t0\tchr1\t11\t60\t3S5M2S\t*\t0\t0\tTTTACGTAGG\tIIIIIIIIII\n\
             r2\t0\tchr1\t21\t60\t8M\t*\t0\t0\tACGTACGT\tIIIIIIII\n\
             r3\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\tIIII\n",
        )?;
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("chr1\t10\t11\tL\t3S5M2S\tTTT"));
        assert_eq!((stat.total, stat.unclipped, stat.unmapped), (3, 1, 1));
        Ok(())
    }

    #[test]
    fn test_extract_skips_malformed_records() -> Result<()> {
        let (rows, stat) = extract(
            "@SQ\tSN:chr1\tLN:1000\n\
             r1\t0\tchr1\t11\t60\t3S5M\t*\t0\t0\tTTTACGTA\tIIIIIIII\n\
             bad\t0\tchr1\t21\t60\t3Q5M\t*\t0\t0\tTTTACGTA\tIIIIIIII\n\
             r2\t0\tchr1\t31\t60\t3S5M\t*\t0\t0\tTTTACGTA\tIIIIIIII\n",
        )?;
        assert_eq!(rows.len(), 2);
        assert!(rows[1].ends_with("\tr2\tchr1_0000000030"));
        assert_eq!((stat.total, stat.format_errors, stat.breakpoints), (3, 1, 2));
        Ok(())
    }

    #[test]
    fn test_extract_skips_non_primary_records() -> Result<()> {
        let (rows, stat) = extract(
            "@SQ\tSN:chr1\tLN:1000\n\
             r1\t0\tchr1\t11\t60\t3S5M\t*\t0\t0\tTTTACGTA\tIIIIIIII\n\
             r1\t2048\tchr1\t51\t60\t5M3S\t*\t0\t0\tACGTATTT\tIIIIIIII\n",
        )?;
        assert_eq!(rows.len(), 1);
        assert_eq!(stat.non_primary, 1);
        Ok(())
    }
}
