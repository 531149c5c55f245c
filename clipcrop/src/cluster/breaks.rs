use std::collections::VecDeque;
use std::fmt;

use log::debug;
use noodles::fastq;

use super::{Cluster, Mean};
use crate::breakpoint::{RawBreakpoint, Side};
use crate::chrom::ChromCode;
use crate::codec::BreakpointIdentity;
use crate::config::Config;
use crate::error::Result;
use crate::qc::BreakpointClusterStat;

pub const BREAKPOINT_BED_HEADER: &str = "#referenceName\tstart\tend\tside\tsupport";

#[derive(Debug, Clone)]
pub struct BreakpointClusterOpts {
    pub max_diff: u64,
    pub min_cluster_size: usize,
    pub min_quality: f64,
}

impl Default for BreakpointClusterOpts {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for BreakpointClusterOpts {
    fn from(config: &Config) -> Self {
        Self {
            max_diff: config.bp_max_diff,
            min_cluster_size: config.bp_min_cluster_size,
            min_quality: config.min_quality,
        }
    }
}

/// Breakpoints on the same side that lie within the clustering tolerance of
/// their predecessor.
#[derive(Debug, Clone)]
pub struct BreakpointCluster {
    pub side: Side,
    pub members: Cluster<RawBreakpoint>,
}

impl BreakpointCluster {
    pub fn reference_name(&self) -> &str {
        &self.members[0].reference_name
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// Rounded mean position of the members.
    pub fn position(&self) -> u64 {
        match self.members.mean_of(|bp| Some(bp.position as i64)) {
            Mean::Numeric(x) => x as u64,
            Mean::Unavailable => self.members[0].position,
        }
    }

    /// One synthetic read per member long enough to be re-aligned, named after
    /// the breakpoint it came from.
    pub fn fastq_records(
        &self,
        min_seq_length: usize,
    ) -> impl Iterator<Item = Result<fastq::Record>> + '_ {
        let size = self.size() as u64;
        self.members
            .iter()
            .filter(move |bp| bp.sequence.len() >= min_seq_length)
            .map(move |bp| {
                let name = BreakpointIdentity::from_breakpoint(bp, size).encode()?;
                let quality = if bp.has_quality() {
                    bp.quality.as_bytes().to_vec()
                } else {
                    vec![b'!'; bp.sequence.len()]
                };
                Ok(fastq::Record::new(
                    fastq::record::Definition::new(name, ""),
                    bp.sequence.as_bytes().to_vec(),
                    quality,
                ))
            })
    }
}

impl fmt::Display for BreakpointCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pos = self.position();
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.reference_name(),
            pos,
            pos + 1,
            self.side,
            self.size()
        )
    }
}

#[derive(Debug, Default)]
struct SideState {
    previous: Option<(ChromCode, u64)>,
    cluster: Cluster<RawBreakpoint>,
}

/// Single pass clustering of breakpoints sorted by reference and position.
/// Left and right clips are clustered independently.
pub struct BreakpointClusterer<I> {
    input: I,
    opts: BreakpointClusterOpts,
    left: SideState,
    right: SideState,
    pending: VecDeque<BreakpointCluster>,
    stat: BreakpointClusterStat,
    exhausted: bool,
}

impl<I: Iterator<Item = RawBreakpoint>> BreakpointClusterer<I> {
    pub fn new(input: I, opts: BreakpointClusterOpts) -> Self {
        Self {
            input,
            opts,
            left: SideState::default(),
            right: SideState::default(),
            pending: VecDeque::new(),
            stat: BreakpointClusterStat::default(),
            exhausted: false,
        }
    }

    pub fn stat(&self) -> &BreakpointClusterStat {
        &self.stat
    }

    fn add(&mut self, bp: RawBreakpoint) {
        if bp.mean_quality().is_some_and(|q| q < self.opts.min_quality) {
            self.stat.low_quality += 1;
            return;
        }
        let side = bp.side;
        let code = bp.chrom_code();
        let pos = bp.position;
        let state = match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        };
        let diverged = state.previous.as_ref().is_some_and(|(prev_code, prev_pos)| {
            *prev_code != code || prev_pos.abs_diff(pos) > self.opts.max_diff
        });
        if diverged {
            let cluster = std::mem::take(&mut state.cluster);
            self.flush(side, cluster);
        }
        let state = match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        };
        state.cluster.push(bp);
        state.previous = Some((code, pos));
    }

    fn flush(&mut self, side: Side, cluster: Cluster<RawBreakpoint>) {
        if cluster.is_empty() {
            return;
        }
        if cluster.len() < self.opts.min_cluster_size {
            self.stat.small_clusters += 1;
            return;
        }
        self.stat.clusters += 1;
        self.pending.push_back(BreakpointCluster { side, members: cluster });
    }
}

impl<I: Iterator<Item = RawBreakpoint>> Iterator for BreakpointClusterer<I> {
    type Item = BreakpointCluster;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(cluster) = self.pending.pop_front() {
                return Some(cluster);
            }
            if self.exhausted {
                return None;
            }
            match self.input.next() {
                Some(bp) => self.add(bp),
                None => {
                    self.exhausted = true;
                    let left = std::mem::take(&mut self.left.cluster);
                    let right = std::mem::take(&mut self.right.cluster);
                    self.flush(Side::Left, left);
                    self.flush(Side::Right, right);
                    debug!(
                        "breakpoint clustering finished: {} clusters, {} too small, {} low quality",
                        self.stat.clusters, self.stat.small_clusters, self.stat.low_quality
                    );
                }
            }
        }
    }
}

pub trait ClusterBreakpoints: Iterator {
    /// Cluster a stream of breakpoints sorted by reference and position.
    fn cluster_breakpoints(self, opts: BreakpointClusterOpts) -> BreakpointClusterer<Self>
    where
        Self: Iterator<Item = RawBreakpoint> + Sized,
    {
        BreakpointClusterer::new(self, opts)
    }
}

impl<T> ClusterBreakpoints for T where T: Iterator<Item = RawBreakpoint> + Sized {}
