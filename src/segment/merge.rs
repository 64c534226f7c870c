//! Tiered merge policy for segment management
//!
//! Segment size & merge policy:
//! - segments_per_tier = 10
//! - Merge score accounts for size, deletes %, and search cost (segment count)
//!
//! The policy only sees segment summaries; live counts come from the snapshot
//! the merge is planned against.

use super::types::SegmentId;

/// Configuration for the tiered merge policy
#[derive(Clone, Debug)]
pub struct MergePolicyConfig {
    /// Maximum size for a merged segment (default: 5GB)
    pub max_merged_segment_bytes: u64,
    /// Target number of segments per tier (default: 10)
    pub segments_per_tier: usize,
    /// Minimum number of segments to merge at once
    pub min_merge_count: usize,
    /// Maximum number of segments to merge at once
    pub max_merge_count: usize,
    /// Delete ratio threshold to force merge (default: 0.15 = 15%)
    pub delete_ratio_threshold: f64,
    /// Segments below this size all share the lowest tier
    pub floor_segment_bytes: u64,
}

impl Default for MergePolicyConfig {
    fn default() -> Self {
        Self {
            max_merged_segment_bytes: 5 * 1024 * 1024 * 1024, // 5GB
            segments_per_tier: 10,
            min_merge_count: 2,
            max_merge_count: 10,
            delete_ratio_threshold: 0.15,
            floor_segment_bytes: 1024 * 1024, // 1MB
        }
    }
}

impl MergePolicyConfig {
    pub fn with_segments_per_tier(mut self, segments_per_tier: usize) -> Self {
        self.segments_per_tier = segments_per_tier.max(1);
        self
    }

    pub fn with_delete_ratio_threshold(mut self, threshold: f64) -> Self {
        self.delete_ratio_threshold = threshold;
        self
    }
}

/// What the merge policy knows about one segment
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentSummary {
    pub id: SegmentId,
    pub size_bytes: u64,
    /// Documents stored, dead entries included
    pub doc_count: u32,
    /// Documents not killed by a tombstone
    pub live_doc_count: u32,
}

impl SegmentSummary {
    pub fn delete_ratio(&self) -> f64 {
        if self.doc_count == 0 {
            0.0
        } else {
            1.0 - (self.live_doc_count as f64 / self.doc_count as f64)
        }
    }
}

/// A candidate merge operation
#[derive(Clone, Debug)]
pub struct MergeCandidate {
    /// Segment IDs to merge
    pub segment_ids: Vec<SegmentId>,
    /// Total size after merge (estimate)
    pub estimated_size: u64,
    /// Merge score (higher = more urgent)
    pub score: f64,
    /// Reason for merge
    pub reason: MergeReason,
}

impl MergeCandidate {
    fn overlaps(&self, segment_ids: &[SegmentId]) -> bool {
        self.segment_ids.iter().any(|id| segment_ids.contains(id))
    }
}

/// Reason why segments should be merged
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeReason {
    /// Too many segments in a tier
    TierOverflow,
    /// High delete ratio
    HighDeleteRatio,
    /// Forced merge into a single segment
    Forced,
}

impl std::fmt::Display for MergeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MergeReason::TierOverflow => "tier-overflow",
            MergeReason::HighDeleteRatio => "high-delete-ratio",
            MergeReason::Forced => "forced",
        };
        f.write_str(name)
    }
}

/// Tiered merge policy implementation
#[derive(Clone, Debug)]
pub struct TieredMergePolicy {
    config: MergePolicyConfig,
}

impl TieredMergePolicy {
    pub fn new(config: MergePolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MergePolicyConfig {
        &self.config
    }

    /// Find merge candidates, most urgent first
    pub fn find_merges(&self, segments: &[SegmentSummary]) -> Vec<MergeCandidate> {
        let mut candidates = Vec::new();

        if segments.len() < self.config.min_merge_count {
            return candidates;
        }

        // Check for high-delete segments first (priority)
        if let Some(candidate) = self.find_high_delete_merge(segments) {
            candidates.push(candidate);
        }

        candidates.extend(self.find_tiered_merges(segments));

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        candidates
    }

    /// Merge everything into one segment
    ///
    /// A single segment is still rewritten when it holds dead entries.
    pub fn find_forced_merge(&self, segments: &[SegmentSummary]) -> Option<MergeCandidate> {
        let needed = match segments {
            [] => false,
            [only] => only.live_doc_count < only.doc_count,
            _ => true,
        };
        if !needed {
            return None;
        }
        Some(MergeCandidate {
            segment_ids: segments.iter().map(|s| s.id).collect(),
            estimated_size: segments.iter().map(|s| s.size_bytes).sum(),
            score: f64::MAX,
            reason: MergeReason::Forced,
        })
    }

    /// Find segments with high delete ratios that should be merged
    fn find_high_delete_merge(&self, segments: &[SegmentSummary]) -> Option<MergeCandidate> {
        let high_delete: Vec<&SegmentSummary> = segments
            .iter()
            .filter(|s| s.delete_ratio() > self.config.delete_ratio_threshold)
            .take(self.config.max_merge_count)
            .collect();

        if high_delete.len() < self.config.min_merge_count {
            return None;
        }

        let avg_delete_ratio: f64 =
            high_delete.iter().map(|s| s.delete_ratio()).sum::<f64>() / high_delete.len() as f64;

        Some(MergeCandidate {
            segment_ids: high_delete.iter().map(|s| s.id).collect(),
            estimated_size: high_delete.iter().map(|s| s.size_bytes).sum(),
            // High priority for deletes
            score: avg_delete_ratio * 100.0,
            reason: MergeReason::HighDeleteRatio,
        })
    }

    /// Find tiered merge candidates
    fn find_tiered_merges(&self, segments: &[SegmentSummary]) -> Vec<MergeCandidate> {
        let mut candidates = Vec::new();

        for (tier_idx, tier_segments) in self.group_by_tier(segments).into_iter().enumerate() {
            if tier_segments.len() <= self.config.segments_per_tier {
                continue;
            }

            let merge_count = (tier_segments.len() - self.config.segments_per_tier + 1)
                .min(self.config.max_merge_count)
                .max(self.config.min_merge_count);

            // Select smallest segments in the tier
            let mut sorted = tier_segments;
            sorted.sort_by_key(|s| (s.size_bytes, s.id));
            let mut to_merge: Vec<&SegmentSummary> = Vec::with_capacity(merge_count);
            let mut total = 0u64;
            for segment in sorted {
                if to_merge.len() == merge_count {
                    break;
                }
                if total + segment.size_bytes > self.config.max_merged_segment_bytes {
                    break;
                }
                total += segment.size_bytes;
                to_merge.push(segment);
            }

            if to_merge.len() >= self.config.min_merge_count {
                // Score based on tier (lower tier = more urgent) and segment count
                let score = (10.0 - tier_idx as f64).max(1.0) * to_merge.len() as f64;
                candidates.push(MergeCandidate {
                    segment_ids: to_merge.iter().map(|s| s.id).collect(),
                    estimated_size: total,
                    score,
                    reason: MergeReason::TierOverflow,
                });
            }
        }

        candidates
    }

    /// Group segments into tiers by size
    fn group_by_tier<'a>(&self, segments: &'a [SegmentSummary]) -> Vec<Vec<&'a SegmentSummary>> {
        // Tier 0: up to floor * segments_per_tier
        // Tier 1: up to floor * segments_per_tier^2
        // etc.
        let floor = self.config.floor_segment_bytes.max(1);
        let ratio = self.config.segments_per_tier.max(2) as u64;

        let max_tier = 10;
        let mut tiers: Vec<Vec<&SegmentSummary>> = vec![Vec::new(); max_tier];

        for segment in segments {
            let size = segment.size_bytes.max(floor);
            let tier = self.size_to_tier(size, floor, ratio).min(max_tier - 1);
            tiers[tier].push(segment);
        }

        while tiers.last().map(|t| t.is_empty()).unwrap_or(false) {
            tiers.pop();
        }

        tiers
    }

    /// Calculate which tier a segment belongs to based on size
    fn size_to_tier(&self, size: u64, floor: u64, ratio: u64) -> usize {
        if size <= floor {
            return 0;
        }

        let mut tier_max = floor.saturating_mul(ratio);
        let mut tier = 0;

        while size > tier_max && tier < 10 {
            tier += 1;
            tier_max = tier_max.saturating_mul(ratio);
        }

        tier
    }
}

impl Default for TieredMergePolicy {
    fn default() -> Self {
        Self::new(MergePolicyConfig::default())
    }
}

/// Tracks pending and running merges so no two merges share a segment
#[derive(Debug)]
pub struct MergeScheduler {
    /// Pending merge candidates
    pending: Vec<MergeCandidate>,
    /// Currently running merges (segment IDs being merged)
    running: Vec<Vec<SegmentId>>,
    /// Maximum concurrent merges
    max_concurrent: usize,
}

impl MergeScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            pending: Vec::new(),
            running: Vec::new(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    fn overlaps_running(&self, candidate: &MergeCandidate) -> bool {
        self.running.iter().any(|running| candidate.overlaps(running))
    }

    /// Add merge candidates
    pub fn add_candidates(&mut self, candidates: Vec<MergeCandidate>) {
        for candidate in candidates {
            let duplicate = self.pending.iter().any(|p| candidate.overlaps(&p.segment_ids));
            if !duplicate && !self.overlaps_running(&candidate) {
                self.pending.push(candidate);
            }
        }

        self.pending.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Get the next merge to execute (if any)
    pub fn next_merge(&mut self) -> Option<MergeCandidate> {
        if self.running.len() >= self.max_concurrent {
            return None;
        }

        // Find first candidate that doesn't overlap with running merges
        let idx = self
            .pending
            .iter()
            .position(|candidate| !self.overlaps_running(candidate))?;

        let candidate = self.pending.remove(idx);
        self.running.push(candidate.segment_ids.clone());
        Some(candidate)
    }

    /// Mark a candidate as running right away, bypassing the queue
    ///
    /// Returns false when it overlaps a running merge.
    pub fn try_start(&mut self, candidate: &MergeCandidate) -> bool {
        if self.overlaps_running(candidate) {
            return false;
        }
        self.pending.retain(|p| !p.overlaps(&candidate.segment_ids));
        self.running.push(candidate.segment_ids.clone());
        true
    }

    /// Mark a merge as complete
    pub fn complete_merge(&mut self, segment_ids: &[SegmentId]) {
        self.running.retain(|running| running != segment_ids);
    }

    /// Drop queued candidates (their segments may be gone)
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Check if any merges are pending
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Check if any merges are running
    pub fn has_running(&self) -> bool {
        !self.running.is_empty()
    }

    /// Get number of running merges
    pub fn running_count(&self) -> usize {
        self.running.len()
    }
}

impl Default for MergeScheduler {
    fn default() -> Self {
        Self::new(2) // Default to 2 concurrent merges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: u64, size_bytes: u64, delete_ratio: f64) -> SegmentSummary {
        let doc_count = 100u32;
        SegmentSummary {
            id: SegmentId::new(id),
            size_bytes,
            doc_count,
            live_doc_count: (doc_count as f64 * (1.0 - delete_ratio)).round() as u32,
        }
    }

    fn candidate(ids: &[u64], score: f64) -> MergeCandidate {
        MergeCandidate {
            segment_ids: ids.iter().map(|&i| SegmentId::new(i)).collect(),
            estimated_size: 1000,
            score,
            reason: MergeReason::TierOverflow,
        }
    }

    #[test]
    fn test_tier_calculation() {
        let policy = TieredMergePolicy::default();

        // Floor is 1MB, ratio is 10
        let floor = 1024 * 1024;
        let ratio = 10;

        assert_eq!(policy.size_to_tier(floor / 2, floor, ratio), 0);
        assert_eq!(policy.size_to_tier(floor, floor, ratio), 0);
        assert_eq!(policy.size_to_tier(floor * 10, floor, ratio), 0);
        assert_eq!(policy.size_to_tier(floor * 11, floor, ratio), 1);
        assert_eq!(policy.size_to_tier(floor * 100, floor, ratio), 1);
        assert_eq!(policy.size_to_tier(floor * 101, floor, ratio), 2);
    }

    #[test]
    fn test_high_delete_merge() {
        let policy = TieredMergePolicy::new(MergePolicyConfig::default().with_delete_ratio_threshold(0.10));

        let segments = vec![
            summary(1, 1024 * 1024, 0.20),
            summary(2, 1024 * 1024, 0.15),
            summary(3, 1024 * 1024, 0.05),
        ];

        let candidates = policy.find_merges(&segments);
        let high_delete = candidates
            .iter()
            .find(|c| c.reason == MergeReason::HighDeleteRatio)
            .unwrap();
        assert_eq!(high_delete.segment_ids, vec![SegmentId::new(1), SegmentId::new(2)]);
    }

    #[test]
    fn test_tiered_merge() {
        let policy = TieredMergePolicy::new(MergePolicyConfig {
            segments_per_tier: 3,
            floor_segment_bytes: 1024,
            ..Default::default()
        });

        // 5 small segments overflow tier 0
        let segments: Vec<_> = (0..5).map(|i| summary(i, 2048 + i, 0.0)).collect();

        let candidates = policy.find_merges(&segments);
        let tiered = candidates
            .iter()
            .find(|c| c.reason == MergeReason::TierOverflow)
            .unwrap();
        // Smallest first
        assert_eq!(tiered.segment_ids, vec![SegmentId::new(0), SegmentId::new(1), SegmentId::new(2)]);

        // Within the tier budget nothing is proposed
        assert!(policy.find_merges(&segments[..3]).is_empty());
    }

    #[test]
    fn test_forced_merge() {
        let policy = TieredMergePolicy::default();
        assert!(policy.find_forced_merge(&[]).is_none());
        assert!(policy.find_forced_merge(&[summary(1, 10, 0.0)]).is_none());

        let single = policy.find_forced_merge(&[summary(1, 10, 0.5)]).unwrap();
        assert_eq!(single.reason, MergeReason::Forced);

        let all = policy
            .find_forced_merge(&[summary(1, 10, 0.0), summary(2, 20, 0.0)])
            .unwrap();
        assert_eq!(all.segment_ids.len(), 2);
        assert_eq!(all.estimated_size, 30);
    }

    #[test]
    fn test_merge_scheduler() {
        let mut scheduler = MergeScheduler::new(2);

        let candidate1 = candidate(&[1, 2], 50.0);
        let candidate2 = candidate(&[3, 4], 30.0);
        scheduler.add_candidates(vec![candidate2.clone(), candidate1.clone()]);
        assert!(scheduler.has_pending());

        // Highest score first
        let merge1 = scheduler.next_merge().unwrap();
        assert_eq!(merge1.segment_ids, candidate1.segment_ids);
        assert!(scheduler.next_merge().is_some());
        assert_eq!(scheduler.running_count(), 2);

        // At max concurrent
        scheduler.add_candidates(vec![candidate(&[5, 6], 10.0)]);
        assert!(scheduler.next_merge().is_none());

        scheduler.complete_merge(&candidate1.segment_ids);
        assert_eq!(scheduler.running_count(), 1);
        assert!(scheduler.next_merge().is_some());
    }

    #[test]
    fn test_overlapping_merges() {
        let mut scheduler = MergeScheduler::new(2);

        scheduler.add_candidates(vec![candidate(&[1, 2], 50.0)]);
        assert!(scheduler.next_merge().is_some());

        // Overlaps the running merge on segment 2
        scheduler.add_candidates(vec![candidate(&[2, 3], 30.0)]);
        assert!(scheduler.next_merge().is_none());
        assert!(!scheduler.try_start(&candidate(&[2, 9], 1.0)));

        assert!(scheduler.try_start(&candidate(&[7, 8], 1.0)));
        assert_eq!(scheduler.running_count(), 2);

        scheduler.complete_merge(&[SegmentId::new(1), SegmentId::new(2)]);
        scheduler.complete_merge(&[SegmentId::new(7), SegmentId::new(8)]);
        assert!(!scheduler.has_running());
    }
}
