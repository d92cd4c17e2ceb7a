use std::fmt;
use std::time::Duration;

/// Aggregation key: request method plus path tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub method: String,
    pub path_tag: String,
}

impl GroupKey {
    pub fn new(method: impl Into<String>, path_tag: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path_tag: path_tag.into(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.method, self.path_tag)
    }
}

/// Latency statistics for one group.
///
/// `median` is the sample at index `count / 2` of the sorted samples, which for an even
/// count is the upper of the two middle values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatedStats {
    pub count: u64,
    pub min: Duration,
    pub max: Duration,
    pub median: Duration,
    pub mean: Duration,
}

impl AggregatedStats {
    pub fn from_samples(mut samples: Vec<Duration>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_unstable();

        let count = samples.len();
        let total: u128 = samples.iter().map(Duration::as_nanos).sum();
        let mean_nanos = total / count as u128;

        Self {
            count: count as u64,
            min: samples[0],
            max: samples[count - 1],
            median: samples[count / 2],
            mean: Duration::from_nanos(u64::try_from(mean_nanos).unwrap_or(u64::MAX)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupStats {
    pub key: GroupKey,
    pub stats: AggregatedStats,
    /// Exchanges in the group that never got a response.
    pub failures: u64,
}
