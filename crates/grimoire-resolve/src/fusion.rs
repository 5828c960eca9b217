//! Score normalization and reciprocal rank fusion.

use std::collections::HashMap;

use crate::types::{MatchType, RankedEntry};
use grimoire_store::ScoredEntry;

/// Tag backend hits with `match_type`, dividing scores by the batch maximum.
///
/// A batch whose maximum is not positive gets all-zero scores.
pub fn normalize_by_max(hits: &[ScoredEntry], match_type: MatchType) -> Vec<RankedEntry> {
    let max = hits.iter().map(|h| h.score).fold(f64::NEG_INFINITY, f64::max);
    hits.iter()
        .map(|h| RankedEntry {
            entry_id: h.entry_id,
            score: if max.is_finite() && max > 0.0 {
                (h.score / max).max(0.0)
            } else {
                0.0
            },
            match_type,
        })
        .collect()
}

/// Fuse two best-first lists with RRF.
///
/// Each entry scores `sum(1 / (k + rank + 1))` over the lists it appears in, with
/// zero-based ranks. Entries in both lists become [`MatchType::Hybrid`]. The result is
/// ordered by descending fused score, ties keeping first-seen order (lexical list
/// first), and scores are divided by the maximum.
pub fn reciprocal_rank_fusion(
    lexical: &[RankedEntry],
    semantic: &[RankedEntry],
    k: f64,
) -> Vec<RankedEntry> {
    let mut fused: Vec<RankedEntry> = Vec::with_capacity(lexical.len() + semantic.len());
    let mut positions: HashMap<i64, usize> = HashMap::new();

    for list in [lexical, semantic] {
        for (rank, hit) in list.iter().enumerate() {
            let contribution = 1.0 / (k + rank as f64 + 1.0);
            match positions.get(&hit.entry_id) {
                Some(&pos) => {
                    let entry = &mut fused[pos];
                    entry.score += contribution;
                    if entry.match_type != hit.match_type {
                        entry.match_type = MatchType::Hybrid;
                    }
                }
                None => {
                    positions.insert(hit.entry_id, fused.len());
                    fused.push(RankedEntry {
                        entry_id: hit.entry_id,
                        score: contribution,
                        match_type: hit.match_type,
                    });
                }
            }
        }
    }

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let max = fused.first().map(|e| e.score).unwrap_or(0.0);
    if max > 0.0 {
        for entry in &mut fused {
            entry.score /= max;
        }
    }
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(ids: &[i64], scores: &[f64]) -> Vec<ScoredEntry> {
        ids.iter()
            .zip(scores)
            .map(|(&entry_id, &score)| ScoredEntry { entry_id, score })
            .collect()
    }

    fn ranked(ids: &[i64], match_type: MatchType) -> Vec<RankedEntry> {
        ids.iter()
            .map(|&entry_id| RankedEntry {
                entry_id,
                score: 1.0,
                match_type,
            })
            .collect()
    }

    #[test]
    fn test_normalize_by_max() {
        let out = normalize_by_max(&hits(&[1, 2, 3], &[8.0, 4.0, 2.0]), MatchType::Fulltext);
        let scores: Vec<f64> = out.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![1.0, 0.5, 0.25]);
        assert!(out.iter().all(|r| r.match_type == MatchType::Fulltext));
    }

    #[test]
    fn test_normalize_all_zero_and_empty() {
        let out = normalize_by_max(&hits(&[1, 2], &[0.0, 0.0]), MatchType::Fulltext);
        assert!(out.iter().all(|r| r.score == 0.0));
        assert!(normalize_by_max(&[], MatchType::Semantic).is_empty());
    }

    #[test]
    fn test_identical_lists_keep_order_and_are_hybrid() {
        let lexical = ranked(&[5, 3, 9, 1], MatchType::Fulltext);
        let semantic = ranked(&[5, 3, 9, 1], MatchType::Semantic);
        let fused = reciprocal_rank_fusion(&lexical, &semantic, 60.0);

        let ids: Vec<i64> = fused.iter().map(|r| r.entry_id).collect();
        assert_eq!(ids, vec![5, 3, 9, 1]);
        assert!(fused.iter().all(|r| r.match_type == MatchType::Hybrid));
        assert_eq!(fused[0].score, 1.0);
    }

    #[test]
    fn test_rrf_scores() {
        let lexical = ranked(&[1, 2], MatchType::Fulltext);
        let semantic = ranked(&[2, 3], MatchType::Semantic);
        let fused = reciprocal_rank_fusion(&lexical, &semantic, 60.0);

        // 2: 1/62 + 1/61; 1: 1/61; 3: 1/62
        let ids: Vec<i64> = fused.iter().map(|r| r.entry_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(fused[0].match_type, MatchType::Hybrid);
        assert_eq!(fused[1].match_type, MatchType::Fulltext);
        assert_eq!(fused[2].match_type, MatchType::Semantic);

        let top = 1.0 / 62.0 + 1.0 / 61.0;
        assert!((fused[1].score - (1.0 / 61.0) / top).abs() < 1e-12);
    }

    #[test]
    fn test_ties_keep_lexical_first() {
        let lexical = ranked(&[7], MatchType::Fulltext);
        let semantic = ranked(&[8], MatchType::Semantic);
        let fused = reciprocal_rank_fusion(&lexical, &semantic, 60.0);
        let ids: Vec<i64> = fused.iter().map(|r| r.entry_id).collect();
        assert_eq!(ids, vec![7, 8]);
        assert_eq!(fused[1].score, 1.0);
    }
}
