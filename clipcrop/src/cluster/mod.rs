mod breaks;
mod sv;

pub use breaks::{
    BreakpointCluster, BreakpointClusterOpts, BreakpointClusterer, ClusterBreakpoints,
    BREAKPOINT_BED_HEADER,
};
pub use sv::{
    reliability_score, ClusterSvCandidates, ConsensusSvRecord, SvClusterOpts, SvClusterer,
};

use std::ops::Deref;

/// Mean of a numeric field over a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mean {
    Numeric(i64),
    /// At least one member has no numeric value for the field.
    Unavailable,
}

impl Mean {
    pub fn value(self) -> Option<i64> {
        match self {
            Mean::Numeric(x) => Some(x),
            Mean::Unavailable => None,
        }
    }
}

/// Candidates that share a clustering key, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster<T>(Vec<T>);

impl<T> Default for Cluster<T> {
    fn default() -> Self {
        Cluster(Vec::new())
    }
}

impl<T> Cluster<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T) {
        self.0.push(item);
    }

    /// Mean of `field` over all members, rounded half up. `field` returns
    /// `None` for a member without a numeric value, which makes the whole
    /// mean unavailable.
    pub fn mean_of<F>(&self, field: F) -> Mean
    where
        F: Fn(&T) -> Option<i64>,
    {
        let mut mean = RunningMean::default();
        self.0.iter().for_each(|x| mean.add(field(x)));
        mean.mean()
    }
}

/// Mean of a field kept up to date as members join a cluster.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningMean {
    total: i128,
    count: u64,
    unavailable: bool,
}

impl RunningMean {
    pub fn add(&mut self, value: Option<i64>) {
        match value {
            Some(x) => self.total += x as i128,
            None => self.unavailable = true,
        }
        self.count += 1;
    }

    pub fn mean(&self) -> Mean {
        if self.unavailable || self.count == 0 {
            return Mean::Unavailable;
        }
        let mean = self.total as f64 / self.count as f64;
        Mean::Numeric((mean + 0.5).floor() as i64)
    }
}

impl<T> Deref for Cluster<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> FromIterator<T> for Cluster<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Cluster(iter.into_iter().collect())
    }
}
