//! Rating-based scores
//!
//! All scores are percentages of the best possible rating, rounded half-up to
//! two decimals. Ratings are folded in the order the store returns them (id
//! order) and grouped with ordered maps, so equal inputs give equal outputs.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use super::bucket::TimeBucket;
use crate::key::TimeWindow;
use crate::model::{MAX_RATING, Rating};
use crate::result::round_half_up;

/// A rating as a percentage of the best possible rating.
pub fn rating_percent(rating: u8) -> f64 {
    f64::from(rating) / f64::from(MAX_RATING) * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedScore {
    /// Ratings that carried a weight
    pub counted: usize,
    pub score: f64,
}

/// `sum(rating * weight) * 100 / sum(weight * 5)`; ratings whose category has
/// no weight are skipped, and a zero total weight scores 0.
pub fn weighted_score(ratings: &[Rating], weights: &BTreeMap<u32, f64>) -> WeightedScore {
    let mut counted = 0;
    let mut achieved = 0.0;
    let mut possible = 0.0;
    for rating in ratings {
        let Some(weight) = weights.get(&rating.category_id) else {
            continue;
        };
        counted += 1;
        achieved += f64::from(rating.rating) * weight;
        possible += weight * f64::from(MAX_RATING);
    }

    let score = if possible > 0.0 {
        round_half_up(achieved * 100.0 / possible, 2)
    } else {
        0.0
    };
    WeightedScore { counted, score }
}

pub fn overall_score(ratings: &[Rating], weights: &BTreeMap<u32, f64>) -> BTreeMap<String, f64> {
    let weighted = weighted_score(ratings, weights);
    BTreeMap::from([
        ("ratings".to_string(), weighted.counted as f64),
        ("score".to_string(), weighted.score),
    ])
}

/// Per-ticket score: each category's mean rating percentage, averaged with
/// the category weights.
pub fn ticket_score(ratings: &[Rating], weights: &BTreeMap<u32, f64>) -> BTreeMap<String, f64> {
    let mut by_category: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
    for rating in ratings {
        by_category
            .entry(rating.category_id)
            .or_default()
            .push(rating.rating);
    }

    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    let mut counted = 0usize;
    for (category_id, values) in &by_category {
        let Some(weight) = weights.get(category_id) else {
            continue;
        };
        counted += values.len();
        weighted_sum += mean_percent(values) * weight;
        total_weight += weight;
    }

    let score = if total_weight > 0.0 {
        round_half_up(weighted_sum / total_weight, 2)
    } else {
        0.0
    };
    BTreeMap::from([
        ("ratings".to_string(), counted as f64),
        ("score".to_string(), score),
    ])
}

/// Per-category scores with a timeline of bucket scores.
pub fn category_scores(ratings: &[Rating], window: &TimeWindow) -> BTreeMap<String, f64> {
    let bucket = TimeBucket::for_window(window);

    let mut grouped: BTreeMap<u32, BTreeMap<NaiveDate, Vec<u8>>> = BTreeMap::new();
    for rating in ratings {
        grouped
            .entry(rating.category_id)
            .or_default()
            .entry(bucket.start_of(rating.created_at))
            .or_default()
            .push(rating.rating);
    }

    let mut values = BTreeMap::new();
    values.insert("categories".to_string(), grouped.len() as f64);

    for (category_id, timeline) in &grouped {
        let prefix = format!("category.{}", category_id);
        let mut bucket_total = 0.0;
        let mut count = 0usize;

        for (start, ratings) in timeline {
            let bucket_score = round_half_up(mean_percent(ratings), 2);
            bucket_total += bucket_score;
            count += ratings.len();
            values.insert(
                format!("{}.timeline.{}", prefix, start.format("%Y-%m-%d")),
                bucket_score,
            );
        }

        values.insert(format!("{}.ratings", prefix), count as f64);
        values.insert(
            format!("{}.score", prefix),
            round_half_up(bucket_total / timeline.len() as f64, 2),
        );
    }
    values
}

/// Weighted score of this window against the window of the same length
/// immediately before it.
pub fn period_over_period(
    current: &[Rating],
    previous: &[Rating],
    weights: &BTreeMap<u32, f64>,
) -> BTreeMap<String, f64> {
    let current = weighted_score(current, weights).score;
    let previous = weighted_score(previous, weights).score;
    BTreeMap::from([
        ("current_score".to_string(), current),
        ("previous_score".to_string(), previous),
        ("change".to_string(), round_half_up(current - previous, 2)),
    ])
}

/// Weighted score of every (ticket, category) pair that has ratings, as
/// `ticket.<id>.category.<cid>`, at six decimals.
pub fn ticket_category_matrix(
    ratings: &[Rating],
    weights: &BTreeMap<u32, f64>,
) -> BTreeMap<String, f64> {
    let mut cells: BTreeMap<(u32, u32), (f64, f64)> = BTreeMap::new();
    for rating in ratings {
        let Some(weight) = weights.get(&rating.category_id) else {
            continue;
        };
        let (achieved, total_weight) = cells
            .entry((rating.ticket_id, rating.category_id))
            .or_default();
        *achieved += f64::from(rating.rating) * weight;
        *total_weight += weight;
    }

    let mut tickets = BTreeSet::new();
    let mut values = BTreeMap::new();
    for ((ticket_id, category_id), (achieved, total_weight)) in &cells {
        tickets.insert(*ticket_id);
        let score = if *total_weight > 0.0 {
            round_half_up(achieved * 100.0 / (total_weight * f64::from(MAX_RATING)), 6)
        } else {
            0.0
        };
        values.insert(format!("ticket.{}.category.{}", ticket_id, category_id), score);
    }
    values.insert("tickets".to_string(), tickets.len() as f64);
    values
}

fn mean_percent(ratings: &[u8]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: f64 = ratings.iter().map(|r| rating_percent(*r)).sum();
    sum / ratings.len() as f64
}
