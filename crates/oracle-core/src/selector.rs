//! Top-K-per-channel, then top-N-overall selection over catalog videos.
//!
//! The per-channel cap is applied before the global cut, so one prolific
//! channel can never take more than `per_channel` of the `total` slots.

use crate::models::ChannelVideo;
use std::cmp::Ordering;
use std::collections::HashMap;

pub const PER_CHANNEL_CAP: usize = 3;
pub const TOTAL_CAP: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOrder {
    /// Channel rank descending, then newest first.
    RankThenRecency,
    /// Newest first, rank ignored.
    Recency,
}

#[derive(Debug, Clone, Copy)]
pub struct RankedVideoSelector {
    pub per_channel: usize,
    pub total: usize,
    pub order: SelectionOrder,
}

impl RankedVideoSelector {
    pub fn new(order: SelectionOrder) -> Self {
        Self {
            per_channel: PER_CHANNEL_CAP,
            total: TOTAL_CAP,
            order,
        }
    }

    pub fn with_caps(order: SelectionOrder, per_channel: usize, total: usize) -> Self {
        Self {
            per_channel,
            total,
            order,
        }
    }

    pub fn select(&self, candidates: Vec<ChannelVideo>) -> Vec<ChannelVideo> {
        let mut by_channel: HashMap<String, Vec<ChannelVideo>> = HashMap::new();
        for candidate in candidates {
            by_channel
                .entry(candidate.video.channel_id.clone())
                .or_default()
                .push(candidate);
        }

        let mut windowed: Vec<ChannelVideo> = Vec::new();
        for (_, mut videos) in by_channel {
            videos.sort_by(newest_first);
            videos.truncate(self.per_channel);
            windowed.extend(videos);
        }

        match self.order {
            SelectionOrder::RankThenRecency => {
                windowed.sort_by(|a, b| b.rank.cmp(&a.rank).then_with(|| newest_first(a, b)))
            }
            SelectionOrder::Recency => windowed.sort_by(newest_first),
        }
        windowed.truncate(self.total);
        windowed
    }
}

fn newest_first(a: &ChannelVideo, b: &ChannelVideo) -> Ordering {
    b.video
        .published_at
        .cmp(&a.video.published_at)
        .then_with(|| a.video.id.cmp(&b.video.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Video;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashMap;

    fn candidate(id: &str, channel: &str, rank: i64, hours_ago: i64) -> ChannelVideo {
        let base = Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap();
        ChannelVideo {
            video: Video {
                id: id.into(),
                title: id.into(),
                channel_id: channel.into(),
                thumbnail: String::new(),
                url: String::new(),
                published_at: base - Duration::hours(hours_ago),
                is_shorts: false,
                sync_at: base,
            },
            channel_title: channel.into(),
            rank,
        }
    }

    fn per_channel_counts(selected: &[ChannelVideo]) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for c in selected {
            *counts.entry(c.video.channel_id.as_str()).or_default() += 1;
        }
        counts
    }

    #[test]
    fn caps_each_channel_at_three_newest() {
        let candidates = (0..10)
            .map(|i| candidate(&format!("a{i}"), "A", 5, i))
            .chain(std::iter::once(candidate("b0", "B", 3, 100)))
            .collect();
        let selected = RankedVideoSelector::new(SelectionOrder::RankThenRecency).select(candidates);

        let ids: Vec<_> = selected.iter().map(|c| c.video.id.as_str()).collect();
        assert_eq!(ids, vec!["a0", "a1", "a2", "b0"]);
    }

    #[test]
    fn prolific_channel_cannot_crowd_out_others() {
        let mut candidates = Vec::new();
        for i in 0..50 {
            candidates.push(candidate(&format!("big{i}"), "BIG", 10, i));
        }
        for ch in 0..10 {
            candidates.push(candidate(&format!("s{ch}"), &format!("S{ch}"), 1, 200));
        }
        let selected = RankedVideoSelector::new(SelectionOrder::RankThenRecency).select(candidates);

        assert_eq!(selected.len(), 13);
        let counts = per_channel_counts(&selected);
        assert_eq!(counts["BIG"], 3);
        assert!(counts.values().all(|&n| n <= PER_CHANNEL_CAP));
    }

    #[test]
    fn total_capped_at_twenty() {
        let mut candidates = Vec::new();
        for ch in 0..15 {
            for i in 0..5 {
                candidates.push(candidate(&format!("c{ch}v{i}"), &format!("C{ch}"), ch, i));
            }
        }
        let selected = RankedVideoSelector::new(SelectionOrder::RankThenRecency).select(candidates);
        assert_eq!(selected.len(), TOTAL_CAP);
        assert!(per_channel_counts(&selected).values().all(|&n| n <= 3));
    }

    #[test]
    fn strictly_ordered_by_rank_then_recency() {
        let candidates = vec![
            candidate("low-new", "L", 1, 0),
            candidate("high-old", "H", 9, 48),
            candidate("high-new", "H", 9, 1),
            candidate("mid", "M", 5, 2),
        ];
        let selected = RankedVideoSelector::new(SelectionOrder::RankThenRecency).select(candidates);
        let ids: Vec<_> = selected.iter().map(|c| c.video.id.as_str()).collect();
        assert_eq!(ids, vec!["high-new", "high-old", "mid", "low-new"]);

        for pair in selected.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(
                a.rank > b.rank
                    || (a.rank == b.rank && a.video.published_at >= b.video.published_at)
            );
        }
    }

    #[test]
    fn recency_order_ignores_rank() {
        let candidates = vec![
            candidate("old", "A", 0, 30),
            candidate("new", "B", 0, 1),
            candidate("mid", "C", 0, 10),
        ];
        let selected = RankedVideoSelector::new(SelectionOrder::Recency).select(candidates);
        let ids: Vec<_> = selected.iter().map(|c| c.video.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn empty_in_empty_out() {
        let selected = RankedVideoSelector::new(SelectionOrder::Recency).select(Vec::new());
        assert!(selected.is_empty());
    }
}
