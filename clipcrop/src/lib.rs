//! Structural variant calling from soft clipped alignments.
//!
//! Clipped read ends are collected as breakpoints, clustered, re-aligned to
//! the reference around the breakpoints, and the geometry of each re-alignment
//! is turned into a typed SV candidate. Candidates are clustered into scored
//! consensus calls and written as BED files, one per SV type.

pub mod alignment;
pub mod breakpoint;
pub mod chrom;
pub mod cigar;
pub mod cluster;
pub mod codec;
pub mod config;
pub mod error;
pub mod flank;
pub mod io;
pub mod pipeline;
pub mod qc;
pub mod sv;
pub mod writer;

pub use alignment::{AlignedRead, AlignmentReader};
pub use breakpoint::{BreakpointExtractor, RawBreakpoint, Side};
pub use chrom::{chrom_code, ChromCode};
pub use cigar::Cigar;
pub use cluster::{reliability_score, BreakpointCluster, ConsensusSvRecord};
pub use codec::{BreakpointIdentity, FlankingWindow};
pub use config::Config;
pub use error::{Error, Result};
pub use flank::{open_indexed_fasta, IndexedFasta, SequenceFetcher};
pub use pipeline::{ClipCrop, Mapper};
pub use qc::Metrics;
pub use sv::{SvCandidate, SvType};
pub use writer::SvWriter;

/// Initialise `env_logger` with `info` as the default level. Calling it more
/// than once is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
