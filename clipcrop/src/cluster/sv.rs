use std::collections::VecDeque;
use std::fmt;

use indexmap::IndexMap;
use log::debug;

use super::{Cluster, Mean, RunningMean};
use crate::breakpoint::Side;
use crate::config::Config;
use crate::qc::SvClusterStat;
use crate::sv::{SvCandidate, SvType};

pub const CALLER: &str = "clipcrop";

/// Balance between left and right evidence: 0 for one-sided support, close
/// to `n * (2 - sqrt(2))` for `n` fragments on each side.
pub fn reliability_score(left: u64, right: u64) -> i64 {
    let (l, r) = (left as f64, right as f64);
    (l + r - (l * l + r * r).sqrt() + 0.5).floor() as i64
}

#[derive(Debug, Clone)]
pub struct SvClusterOpts {
    pub max_diff: u64,
    pub min_cluster_size: usize,
    pub require_nondegenerate: bool,
}

impl Default for SvClusterOpts {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SvClusterOpts {
    fn from(config: &Config) -> Self {
        Self {
            max_diff: config.max_diff,
            min_cluster_size: config.min_cluster_size,
            require_nondegenerate: config.require_nondegenerate,
        }
    }
}

/// A clustered SV call.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusSvRecord {
    pub reference_name: String,
    pub start: u64,
    pub end: u64,
    pub sv_type: SvType,
    pub length: Option<u64>,
    pub second_reference_name: Option<String>,
    pub second_start: Option<u64>,
    pub score: Option<i64>,
    pub support: u64,
    pub left_support: u64,
    pub right_support: u64,
    pub caller: Option<String>,
    pub other_info: Option<String>,
}

impl ConsensusSvRecord {
    fn from_cluster(cluster: &Cluster<SvCandidate>) -> Self {
        let first = &cluster[0];
        let support = cluster.len() as u64;
        // fragments clipped on the right end carry the left breakpoint
        let left_support = cluster.iter().filter(|x| x.side == Side::Right).count() as u64;
        let right_support = support - left_support;
        let start = mean_or(cluster.mean_of(|x| Some(x.start as i64)), first.start);
        let length = match first.sv_type {
            SvType::Ins => None,
            _ => cluster.mean_of(|x| x.length.map(|l| l as i64)).value().map(|l| l as u64),
        };
        let second_start = cluster
            .mean_of(|x| x.second_start.map(|s| s as i64))
            .value()
            .map(|s| s as u64);
        Self {
            reference_name: first.reference_name.clone(),
            start,
            end: start + length.unwrap_or(1),
            sv_type: first.sv_type,
            length,
            second_reference_name: Some(first.second_reference_name.clone()),
            second_start,
            score: Some(reliability_score(left_support, right_support)),
            support,
            left_support,
            right_support,
            caller: Some(CALLER.to_string()),
            other_info: Some(format!("num:{} LR:{}/{}", support, left_support, right_support)),
        }
    }

    /// Spanning calls of a single base are artifacts of the pairing.
    pub fn is_degenerate(&self) -> bool {
        self.sv_type.has_span() && self.length.map_or(true, |l| l <= 1)
    }
}

fn mean_or(mean: Mean, default: u64) -> u64 {
    mean.value().map_or(default, |x| x.max(0) as u64)
}

fn or_sentinel<T: ToString>(value: Option<T>, sentinel: &str) -> String {
    value.map_or_else(|| sentinel.to_string(), |x| x.to_string())
}

impl fmt::Display for ConsensusSvRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.reference_name,
            self.start,
            self.end,
            self.sv_type,
            or_sentinel(self.length, "*"),
            or_sentinel(self.score, "-1"),
            or_sentinel(self.second_reference_name.as_deref(), "="),
            or_sentinel(self.second_start, "*"),
            or_sentinel(self.caller.as_deref(), "*"),
            or_sentinel(self.other_info.as_deref(), "*"),
        )
    }
}

type ClusterKey = (SvType, String, String);

#[derive(Debug, Default)]
struct OpenCluster {
    members: Cluster<SvCandidate>,
    start: RunningMean,
    end: RunningMean,
    second_start: RunningMean,
}

impl OpenCluster {
    fn push(&mut self, sv: SvCandidate) {
        self.start.add(Some(sv.start as i64));
        self.end.add(Some(sv.end as i64));
        self.second_start.add(sv.second_start.map(|s| s as i64));
        self.members.push(sv);
    }
}

/// Single pass clustering of SV candidates sorted by reference pair and
/// start. One cluster is open per (type, reference, second reference).
pub struct SvClusterer<I> {
    input: I,
    opts: SvClusterOpts,
    open: IndexMap<ClusterKey, OpenCluster>,
    pending: VecDeque<ConsensusSvRecord>,
    stat: SvClusterStat,
    exhausted: bool,
}

impl<I: Iterator<Item = SvCandidate>> SvClusterer<I> {
    pub fn new(input: I, opts: SvClusterOpts) -> Self {
        Self {
            input,
            opts,
            open: IndexMap::new(),
            pending: VecDeque::new(),
            stat: SvClusterStat::default(),
            exhausted: false,
        }
    }

    pub fn stat(&self) -> &SvClusterStat {
        &self.stat
    }

    fn diverges(&self, cluster: &OpenCluster, sv: &SvCandidate) -> bool {
        let far = |mean: Mean, value: Option<u64>| match (mean, value) {
            (Mean::Numeric(m), Some(v)) => m.abs_diff(v as i64) > self.opts.max_diff,
            _ => false,
        };
        far(cluster.start.mean(), Some(sv.start))
            || (sv.sv_type.has_span() && far(cluster.end.mean(), Some(sv.end)))
            || (sv.sv_type == SvType::Ctx && far(cluster.second_start.mean(), sv.second_start))
    }

    fn add(&mut self, sv: SvCandidate) {
        let key = (sv.sv_type, sv.reference_name.clone(), sv.second_reference_name.clone());
        let diverged = self.open.get(&key).is_some_and(|cl| self.diverges(cl, &sv));
        if diverged {
            if let Some(cluster) = self.open.shift_remove(&key) {
                self.flush(cluster.members);
            }
        }
        self.open.entry(key).or_default().push(sv);
    }

    fn flush(&mut self, cluster: Cluster<SvCandidate>) {
        if cluster.len() < self.opts.min_cluster_size {
            self.stat.small_clusters += 1;
            return;
        }
        let record = ConsensusSvRecord::from_cluster(&cluster);
        if self.opts.require_nondegenerate && record.is_degenerate() {
            self.stat.degenerate += 1;
            return;
        }
        self.stat.emitted += 1;
        self.pending.push_back(record);
    }
}

impl<I: Iterator<Item = SvCandidate>> Iterator for SvClusterer<I> {
    type Item = ConsensusSvRecord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(record);
            }
            if self.exhausted {
                return None;
            }
            match self.input.next() {
                Some(sv) => self.add(sv),
                None => {
                    self.exhausted = true;
                    let open = std::mem::take(&mut self.open);
                    open.into_values().for_each(|cluster| self.flush(cluster.members));
                    debug!(
                        "SV clustering finished: {} calls, {} too small, {} degenerate",
                        self.stat.emitted, self.stat.small_clusters, self.stat.degenerate
                    );
                }
            }
        }
    }
}

pub trait ClusterSvCandidates: Iterator {
    /// Cluster SV candidates sorted so that members of a cluster are adjacent.
    fn cluster_sv_candidates(self, opts: SvClusterOpts) -> SvClusterer<Self>
    where
        Self: Iterator<Item = SvCandidate> + Sized,
    {
        SvClusterer::new(self, opts)
    }
}

impl<T> ClusterSvCandidates for T where T: Iterator<Item = SvCandidate> + Sized {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sv::SAME_REFERENCE;
    use proptest::prelude::*;

    fn del(start: u64, len: u64, side: Side) -> SvCandidate {
        SvCandidate {
            reference_name: "chr1".to_string(),
            start,
            end: start + len,
            sv_type: SvType::Del,
            length: Some(len),
            second_reference_name: SAME_REFERENCE.to_string(),
            second_start: None,
            side,
        }
    }

    fn opts(max_diff: u64, min_cluster_size: usize) -> SvClusterOpts {
        SvClusterOpts { max_diff, min_cluster_size, require_nondegenerate: true }
    }

    #[test]
    fn test_consensus_call() {
        let input: Vec<_> = (0..10)
            .map(|i| del(1000 + i % 2, 500, if i < 6 { Side::Right } else { Side::Left }))
            .collect();
        let calls: Vec<_> = input.into_iter().cluster_sv_candidates(opts(2, 10)).collect();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.support, 10);
        assert_eq!((call.left_support, call.right_support), (6, 4));
        assert_eq!(call.score, Some(3));
        assert_eq!((call.start, call.end, call.length), (1001, 1501, Some(500)));
        assert_eq!(
            call.to_string(),
            "chr1\t1001\t1501\tDEL\t500\t3\t=\t*\tclipcrop\tnum:10 LR:6/4"
        );
    }

    #[test]
    fn test_min_cluster_size() {
        let input: Vec<_> = (0..9).map(|_| del(1000, 500, Side::Left)).collect();
        let mut clusterer = input.clone().into_iter().cluster_sv_candidates(opts(2, 10));
        assert_eq!(clusterer.by_ref().count(), 0);
        assert_eq!(clusterer.stat().small_clusters, 1);
        assert_eq!(input.into_iter().cluster_sv_candidates(opts(2, 9)).count(), 1);
    }

    #[test]
    fn test_divergence_boundary() {
        let input = vec![del(1000, 500, Side::Left), del(1002, 500, Side::Left)];
        assert_eq!(input.into_iter().cluster_sv_candidates(opts(2, 1)).count(), 1);
        let input = vec![del(1000, 500, Side::Left), del(1003, 500, Side::Left)];
        assert_eq!(input.into_iter().cluster_sv_candidates(opts(2, 1)).count(), 2);
        // same start, end too far away
        let input = vec![del(1000, 500, Side::Left), del(1000, 510, Side::Left)];
        assert_eq!(input.into_iter().cluster_sv_candidates(opts(2, 1)).count(), 2);
    }

    #[test]
    fn test_insertions_and_translocations() {
        let ins = |start: u64, side: Side| SvCandidate {
            reference_name: "chr3".to_string(),
            start,
            end: start + 1,
            sv_type: SvType::Ins,
            length: None,
            second_reference_name: SAME_REFERENCE.to_string(),
            second_start: None,
            side,
        };
        let ctx = |start2: u64| SvCandidate {
            reference_name: "chr3".to_string(),
            start: 700,
            end: 701,
            sv_type: SvType::Ctx,
            length: None,
            second_reference_name: "chr9".to_string(),
            second_start: Some(start2),
            side: Side::Left,
        };
        let input = vec![
            ins(700, Side::Left),
            ctx(5000),
            ins(701, Side::Right),
            ctx(5002),
            ctx(5100),
        ];
        let calls: Vec<_> = input.into_iter().cluster_sv_candidates(opts(2, 1)).collect();
        assert_eq!(calls.len(), 3);
        // the translocation at 5100 closes the first one; the rest flush in opening order
        assert_eq!(calls[0].sv_type, SvType::Ctx);
        assert_eq!(calls[0].second_start, Some(5001));
        assert_eq!(calls[1].sv_type, SvType::Ins);
        assert_eq!(calls[1].support, 2);
        assert_eq!((calls[1].start, calls[1].end, calls[1].length), (701, 702, None));
        assert!(calls[1].to_string().contains("\tINS\t*\t"));
        assert_eq!(calls[2].second_reference_name.as_deref(), Some("chr9"));
    }

    #[test]
    fn test_degenerate_gate() {
        let input = vec![del(1000, 1, Side::Left)];
        let mut clusterer = input.clone().into_iter().cluster_sv_candidates(opts(2, 1));
        assert_eq!(clusterer.by_ref().count(), 0);
        assert_eq!(clusterer.stat().degenerate, 1);
        let lenient = SvClusterOpts { require_nondegenerate: false, ..opts(2, 1) };
        assert_eq!(input.into_iter().cluster_sv_candidates(lenient).count(), 1);
    }

    #[test]
    fn test_reliability_score() {
        assert_eq!(reliability_score(6, 4), 3);
        assert_eq!(reliability_score(10, 10), 6);
        assert_eq!(reliability_score(1, 1), 1);
        assert_eq!(reliability_score(0, 0), 0);
    }

    proptest! {
        #[test]
        fn prop_reliability_score(a in 0u64..100_000, b in 0u64..100_000) {
            prop_assert_eq!(reliability_score(a, b), reliability_score(b, a));
            prop_assert_eq!(reliability_score(a, 0), 0);
            prop_assert!(reliability_score(a, b) <= a.min(b) as i64 + 1);
        }
    }
}
