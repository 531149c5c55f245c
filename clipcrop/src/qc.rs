use std::collections::BTreeMap;
use std::fmt::Display;
use std::ops::{Deref, DerefMut};

use crate::sv::SvType;

/// Named run statistics. Every stage reports into one of these instead of
/// sharing mutable state.
#[derive(Debug, Default, Clone)]
pub struct Metrics(BTreeMap<String, f64>);

impl From<BTreeMap<String, f64>> for Metrics {
    fn from(map: BTreeMap<String, f64>) -> Self {
        Metrics(map)
    }
}

impl From<Metrics> for BTreeMap<String, f64> {
    fn from(val: Metrics) -> Self {
        val.0
    }
}

impl Deref for Metrics {
    type Target = BTreeMap<String, f64>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Metrics {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (key, value) in &self.0 {
            writeln!(f, "{}\t{}", key, value)?;
        }
        Ok(())
    }
}

impl Metrics {
    pub fn add(&mut self, key: &str, value: u64) {
        *self.0.entry(key.to_string()).or_insert(0.0) += value as f64;
    }

    pub fn merge(&mut self, other: &Metrics) {
        other.0.iter().for_each(|(k, v)| {
            *self.0.entry(k.clone()).or_insert(0.0) += v;
        });
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractStat {
    pub total: u64,         // Records seen
    pub non_primary: u64,   // Secondary and supplementary records
    pub invalid: u64,       // Records failing validation
    pub unmapped: u64,
    pub unclipped: u64,     // Mapped records without a soft clip
    pub n_filtered: u64,    // Clipped ends made only of N
    pub breakpoints: u64,
    pub format_errors: u64, // Records that could not be parsed or decoded
}

impl ExtractStat {
    pub fn combine(&mut self, other: &Self) {
        self.total += other.total;
        self.non_primary += other.non_primary;
        self.invalid += other.invalid;
        self.unmapped += other.unmapped;
        self.unclipped += other.unclipped;
        self.n_filtered += other.n_filtered;
        self.breakpoints += other.breakpoints;
        self.format_errors += other.format_errors;
    }

    pub fn report(&self, metric: &mut Metrics) {
        metric.add("extract.records", self.total);
        metric.add("extract.non_primary", self.non_primary);
        metric.add("extract.invalid", self.invalid);
        metric.add("extract.unmapped", self.unmapped);
        metric.add("extract.unclipped", self.unclipped);
        metric.add("extract.n_filtered", self.n_filtered);
        metric.add("extract.breakpoints", self.breakpoints);
        metric.add("extract.format_errors", self.format_errors);
        let skipped = self.non_primary + self.invalid + self.unmapped + self.unclipped;
        if self.total > 0 {
            metric.insert(
                "extract.frac_clipped".to_string(),
                self.total.saturating_sub(skipped) as f64 / self.total as f64,
            );
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct BreakpointClusterStat {
    pub low_quality: u64,   // Breakpoints dropped by the mean quality filter
    pub clusters: u64,      // Clusters passing the size filter
    pub small_clusters: u64,
    pub short_sequences: u64, // Members too short for FASTQ output
    pub format_errors: u64,   // Unparsable rows and members whose identity cannot be encoded
}

impl BreakpointClusterStat {
    pub fn report(&self, metric: &mut Metrics) {
        metric.add("bp_cluster.low_quality", self.low_quality);
        metric.add("bp_cluster.clusters", self.clusters);
        metric.add("bp_cluster.small_clusters", self.small_clusters);
        metric.add("bp_cluster.short_sequences", self.short_sequences);
        metric.add("bp_cluster.format_errors", self.format_errors);
    }
}

#[derive(Debug, Default, Clone)]
pub struct ClassifyStat {
    pub candidates: BTreeMap<SvType, u64>,
    pub degenerate: u64,     // Zero-length pairings, dropped silently
    pub format_errors: u64,  // Unparsable read or reference names
}

impl ClassifyStat {
    pub fn add_candidate(&mut self, ty: SvType) {
        *self.candidates.entry(ty).or_insert(0) += 1;
    }

    pub fn report(&self, metric: &mut Metrics) {
        self.candidates.iter().for_each(|(ty, n)| {
            metric.add(&format!("classify.{}", ty.as_str().to_lowercase()), *n);
        });
        metric.add("classify.degenerate", self.degenerate);
        metric.add("classify.format_errors", self.format_errors);
    }
}

#[derive(Debug, Default, Clone)]
pub struct SvClusterStat {
    pub emitted: u64,
    pub small_clusters: u64,
    pub degenerate: u64, // DEL/DUP/INV calls rejected for length <= 1
    pub format_errors: u64,
}

impl SvClusterStat {
    pub fn report(&self, metric: &mut Metrics) {
        metric.add("sv_cluster.emitted", self.emitted);
        metric.add("sv_cluster.small_clusters", self.small_clusters);
        metric.add("sv_cluster.degenerate", self.degenerate);
        metric.add("sv_cluster.format_errors", self.format_errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_report() {
        let mut a = ExtractStat {
            total: 10,
            unmapped: 2,
            unclipped: 4,
            breakpoints: 5,
            ..Default::default()
        };
        let b = ExtractStat {
            total: 10,
            invalid: 2,
            unclipped: 4,
            breakpoints: 6,
            ..Default::default()
        };
        a.combine(&b);
        let mut metrics = Metrics::default();
        a.report(&mut metrics);
        assert_eq!(metrics["extract.records"], 20.0);
        assert_eq!(metrics["extract.breakpoints"], 11.0);
        assert_eq!(metrics["extract.frac_clipped"], 0.4);
    }

    #[test]
    fn test_merge_and_display() {
        let mut m1 = Metrics::default();
        m1.add("a", 1);
        let mut m2 = Metrics::default();
        m2.add("a", 2);
        m2.add("b", 3);
        m1.merge(&m2);
        assert_eq!(m1.to_string(), "a\t3\nb\t3\n");
    }
}
