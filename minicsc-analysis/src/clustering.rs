//! Adjacency clustering of channel lists.
//!
//! Both extractors group hits whose channel numbers are consecutive
//! integers. The scan is a single greedy left-to-right pass: a hit
//! consumed into a cluster is never reconsidered, so the input must
//! already be in ascending channel order.

use std::ops::Range;

/// A maximal run of consecutive channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCluster {
    /// Channel of the first member.
    pub first_channel: u32,
    /// Positions of the members in the scanned hit list.
    pub members: Range<usize>,
}

impl ChannelCluster {
    /// Number of members (the hit width).
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// True if the cluster has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Groups consecutive channels without any gating.
///
/// Every hit belongs to exactly one cluster.
#[must_use]
pub fn cluster_adjacent(channels: &[u32]) -> Vec<ChannelCluster> {
    cluster_gated(channels, |_| true)
}

/// Groups consecutive channels whose hits pass `accept`.
///
/// A rejected hit or a channel gap ends the current cluster; rejected
/// hits belong to no cluster.
pub fn cluster_gated(channels: &[u32], accept: impl Fn(usize) -> bool) -> Vec<ChannelCluster> {
    let mut clusters = Vec::new();
    let mut current: Option<ChannelCluster> = None;

    for (idx, &channel) in channels.iter().enumerate() {
        if !accept(idx) {
            clusters.extend(current.take());
            continue;
        }

        match current.as_mut() {
            Some(cluster) if channels[cluster.members.end - 1].checked_add(1) == Some(channel) => {
                cluster.members.end = idx + 1;
            }
            _ => {
                clusters.extend(current.replace(ChannelCluster {
                    first_channel: channel,
                    members: idx..idx + 1,
                }));
            }
        }
    }
    clusters.extend(current);

    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(clusters: &[ChannelCluster]) -> Vec<usize> {
        clusters.iter().map(ChannelCluster::len).collect()
    }

    #[test]
    fn test_adjacent_splits_on_gap() {
        let clusters = cluster_adjacent(&[5, 6, 7, 10, 11]);
        assert_eq!(sizes(&clusters), vec![3, 2]);
        assert_eq!(clusters[0].first_channel, 5);
        assert_eq!(clusters[1].first_channel, 10);
        assert_eq!(clusters[1].members, 3..5);
    }

    #[test]
    fn test_adjacent_single_and_empty() {
        assert!(cluster_adjacent(&[]).is_empty());
        assert_eq!(sizes(&cluster_adjacent(&[42])), vec![1]);
        assert_eq!(sizes(&cluster_adjacent(&[1, 3, 5])), vec![1, 1, 1]);
    }

    #[test]
    fn test_repeated_channel_starts_new_cluster() {
        assert_eq!(sizes(&cluster_adjacent(&[4, 4, 5])), vec![1, 2]);
    }

    #[test]
    fn test_gated_rejected_hit_ends_cluster() {
        let channels = [1, 2, 3, 4, 5];
        let signal = [true, true, false, true, true];
        let clusters = cluster_gated(&channels, |i| signal[i]);
        assert_eq!(sizes(&clusters), vec![2, 2]);
        assert_eq!(clusters[1].first_channel, 4);
        assert_eq!(clusters[1].members, 3..5);
    }

    #[test]
    fn test_gated_all_rejected() {
        let clusters = cluster_gated(&[1, 2, 3], |_| false);
        assert!(clusters.is_empty());
    }
}
