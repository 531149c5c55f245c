use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use clipcrop::{
    open_indexed_fasta, BreakpointIdentity, ClipCrop, Config, FlankingWindow, Mapper, Side,
};
use noodles::fastq;

const REFERENCE_LENGTH: usize = 5000;
const DELETION: (u64, u64) = (1000, 1800);

fn reference_sequence() -> Vec<u8> {
    let mut state = 17u64;
    (0..REFERENCE_LENGTH)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            b"ACGT"[(state >> 33) as usize % 4]
        })
        .collect()
}

fn write_reference(dir: &Path) -> Result<PathBuf> {
    let path = dir.join("genome.fa");
    let mut fa = File::create(&path)?;
    writeln!(fa, ">chr1")?;
    for line in reference_sequence().chunks(60) {
        fa.write_all(line)?;
        writeln!(fa)?;
    }
    fs::write(dir.join("genome.fa.fai"), format!("chr1\t{}\t6\t60\t61\n", REFERENCE_LENGTH))?;
    Ok(path)
}

fn sam_line(name: &str, flag: u16, pos: usize, cigar: &str, seq: &[u8]) -> String {
    format!(
        "{}\t{}\tchr1\t{}\t60\t{}\t*\t0\t0\t{}\t{}",
        name,
        flag,
        pos,
        cigar,
        String::from_utf8_lossy(seq),
        "I".repeat(seq.len())
    )
}

/// Reads spanning a deletion of `DELETION`, plus a few that carry no signal.
fn write_alignments(dir: &Path) -> Result<PathBuf> {
    let genome = reference_sequence();
    let (del_start, del_end) = (DELETION.0 as usize, DELETION.1 as usize);
    let path = dir.join("input.sam");
    let mut sam = File::create(&path)?;
    writeln!(sam, "@HD\tVN:1.6\n@SQ\tSN:chr1\tLN:{}", REFERENCE_LENGTH)?;
    for i in 0..12 {
        // 30 bases before the deletion, then 20 bases after it
        let seq = [&genome[del_start - 30..del_start], &genome[del_end..del_end + 20]].concat();
        let pos = del_start - 30 + 1;
        writeln!(sam, "{}", sam_line(&format!("right{}", i), 0, pos, "30M20S", &seq))?;
        // 20 bases before the deletion, then 30 bases after it
        let seq = [&genome[del_start - 20..del_start], &genome[del_end..del_end + 30]].concat();
        writeln!(sam, "{}", sam_line(&format!("left{}", i), 16, del_end + 1, "20S30M", &seq))?;
    }
    for i in 0..2 {
        let seq = &genome[2970..3020];
        writeln!(sam, "{}", sam_line(&format!("lonely{}", i), 0, 2971, "30M20S", seq))?;
    }
    writeln!(sam, "{}", sam_line("plain", 0, 101, "50M", &genome[100..150]))?;
    // a supplementary copy of a clipped read and a line no parser accepts
    writeln!(sam, "{}", sam_line("right0", 2048, 3501, "30M20S", &genome[3500..3550]))?;
    writeln!(sam, "{}", sam_line("broken", 0, 4001, "3Q47M", &genome[4000..4050]))?;
    writeln!(sam, "unmapped\t4\t*\t0\t0\t*\t*\t0\t0\tACGTACGTAC\tIIIIIIIIII")?;
    Ok(path)
}

/// Places every clipped sequence where it belongs on the other side of the
/// deletion, as a real aligner would.
struct DeletionMapper;

impl Mapper for DeletionMapper {
    fn map(&self, reference: &Path, reads: &Path, out_dir: &Path) -> Result<PathBuf> {
        let mut header = String::new();
        BufReader::new(File::open(reference)?).read_line(&mut header)?;
        let window = FlankingWindow::decode(header.trim_start_matches('>').trim_end())?;

        let path = out_dir.join("mapped.sam");
        let mut sam = File::create(&path)?;
        writeln!(sam, "@SQ\tSN:{}\tLN:{}", window.encode()?, window.end - window.start)?;
        let mut reader = fastq::io::Reader::new(BufReader::new(File::open(reads)?));
        for record in reader.records() {
            let record = record?;
            let name = String::from_utf8_lossy(record.name().as_ref()).into_owned();
            let bp = BreakpointIdentity::decode(&name)?;
            let len = record.sequence().len() as u64;
            let target = match bp.side {
                Side::Right => DELETION.1,
                Side::Left => DELETION.0 - len,
            };
            writeln!(
                sam,
                "{}\t0\t{}\t{}\t60\t{}M\t*\t0\t0\t{}\t{}",
                name,
                window.encode()?,
                target - window.start + 1,
                len,
                String::from_utf8_lossy(record.sequence()),
                String::from_utf8_lossy(record.quality_scores()),
            )?;
        }
        writeln!(sam, "garbage\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\tIIII")?;
        Ok(path)
    }
}

#[test]
fn test_call_deletion() -> Result<()> {
    clipcrop::init_logging();
    let dir = tempfile::tempdir()?;
    let reference = write_reference(dir.path())?;
    let alignments = write_alignments(dir.path())?;
    let out_dir = dir.path().join("out");

    let config = Config::new().with_num_threads(2).with_chunk_size(8);
    let mut pipeline = ClipCrop::new(DeletionMapper, open_indexed_fasta(&reference)?)
        .with_config(config)
        .with_output_dir(&out_dir);
    let metrics = pipeline.run(&alignments)?;

    assert_eq!(metrics["extract.records"], 30.0);
    assert_eq!(metrics["extract.non_primary"], 1.0);
    assert_eq!(metrics["extract.format_errors"], 1.0);
    assert_eq!(metrics["extract.breakpoints"], 26.0);
    assert_eq!(metrics["bp_cluster.clusters"], 2.0);
    assert_eq!(metrics["bp_cluster.small_clusters"], 1.0);
    assert_eq!(metrics["classify.del"], 24.0);
    assert_eq!(metrics["classify.format_errors"], 1.0);
    assert_eq!(metrics["sv_cluster.emitted"], 1.0);

    let bp_bed = fs::read_to_string(out_dir.join("bp.bed"))?;
    let bp_lines: Vec<_> = bp_bed.lines().skip(1).collect();
    assert_eq!(bp_lines, vec!["chr1\t1000\t1001\tR\t12", "chr1\t1800\t1801\tL\t12"]);

    let fasta = fs::read_to_string(out_dir.join("bp.fasta"))?;
    assert!(fasta.starts_with(">chr1::0::2800\n"));
    assert!(fasta.lines().skip(1).all(|line| line.len() <= 50));

    let expected = "chr1\t1000\t1800\tDEL\t800\t7\t=\t*\tclipcrop\tnum:24 LR:12/12";
    for file in ["del.bed", "all.bed"] {
        let text = fs::read_to_string(out_dir.join(file))?;
        let lines: Vec<_> = text.lines().collect();
        assert!(lines[0].starts_with("#referenceName\tstart\tend\ttype"));
        assert_eq!(lines[1..], [expected]);
    }
    assert!(!out_dir.join("dup.bed").exists());

    // the raw breakpoints alone are enough to repeat the calling
    let rerun_dir = dir.path().join("rerun");
    let mut pipeline = ClipCrop::new(DeletionMapper, open_indexed_fasta(&reference)?)
        .with_config(Config::new().with_num_threads(2))
        .with_output_dir(&rerun_dir);
    pipeline.run_from_raw_breakpoints(out_dir.join("rawbreaks.bed"))?;
    assert_eq!(
        fs::read_to_string(rerun_dir.join("all.bed"))?,
        fs::read_to_string(out_dir.join("all.bed"))?
    );
    Ok(())
}

#[test]
fn test_invalid_config_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let reference = write_reference(dir.path())?;
    let alignments = write_alignments(dir.path())?;
    let mut pipeline = ClipCrop::new(DeletionMapper, open_indexed_fasta(&reference)?)
        .with_config(Config::new().with_min_cluster_size(0))
        .with_output_dir(dir.path().join("out"));
    assert!(pipeline.run(&alignments).is_err());
    Ok(())
}
