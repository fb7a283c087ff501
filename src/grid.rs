//! Daily review mosaic layout.
//!
//! Arranges reviews into a grid of [`CellSize::Small`] (1×1),
//! [`CellSize::Tall`] (1×2) and [`CellSize::Large`] (2×2) cells. The layout
//! is a pure function of the input list, the options and the random streams;
//! production callers seed the streams from the calendar date so the mosaic
//! changes daily but every visitor sees the same one.
//!
//! ## Placement
//!
//! ```text
//! slot:    0     1     2     3     4     5     6 ...
//! size:    L     S     S     T     S     S     L      (big every `big_interval`)
//!          └─ first `featured_slots` prefer featured items ─┘
//! ```
//!
//! - Big slots prefer videos; small slots prefer a round-robin mix of
//!   before/after and static reviews, falling back to videos.
//! - If there are more videos than big slots, small slots are promoted to big
//!   in order until every video can get one.
//! - A featured non-video only takes a big slot while the big slots left
//!   outnumber the videos left, so every video still lands in a big cell.
//! - Within each content type, featured reviews precede the rest.
//! - Each review id is placed at most once. Slots with nothing left to place
//!   are dropped, never padded.

use crate::config::GridConfig;
use crate::rng::{DailySeed, RandomStreams, shuffle};
use crate::types::{Review, ReviewType};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellSize {
    Small,
    Tall,
    Large,
}

impl CellSize {
    pub fn is_big(self) -> bool {
        !matches!(self, CellSize::Small)
    }

    /// `(columns, rows)` spanned by the cell.
    pub fn span(self) -> (u8, u8) {
        match self {
            CellSize::Small => (1, 1),
            CellSize::Tall => (1, 2),
            CellSize::Large => (2, 2),
        }
    }
}

/// One placed review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridCell {
    pub review: Review,
    pub kind: ReviewType,
    pub size: CellSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridOptions {
    /// Leading slots that take featured reviews first.
    pub featured_slots: usize,
    /// Every n-th slot (starting at 0) is big.
    pub big_interval: usize,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self::from(&GridConfig::default())
    }
}

impl From<&GridConfig> for GridOptions {
    fn from(config: &GridConfig) -> Self {
        Self {
            featured_slots: config.featured_slots,
            big_interval: config.big_interval,
        }
    }
}

/// Content types in partition order.
const KINDS: [ReviewType; 3] = [ReviewType::Video, ReviewType::BeforeAfter, ReviewType::Static];

/// Non-video kinds, in round-robin order.
const MIX: [ReviewType; 2] = [ReviewType::BeforeAfter, ReviewType::Static];

/// Stream offset of a partition: featured and non-featured of each kind get
/// their own stream.
fn stream_offset(kind: ReviewType, featured: bool) -> u64 {
    let base = match kind {
        ReviewType::Video => 1,
        ReviewType::BeforeAfter => 3,
        ReviewType::Static => 5,
    };
    if featured { base } else { base + 1 }
}

/// Sizes for `n` slots given how many videos need a big slot.
pub fn slot_pattern(n: usize, video_count: usize, big_interval: usize) -> Vec<CellSize> {
    let interval = big_interval.max(1);
    let mut big: Vec<bool> = (0..n).map(|i| i % interval == 0).collect();

    let mut big_count = big.iter().filter(|b| **b).count();
    for slot in big.iter_mut() {
        if big_count >= video_count {
            break;
        }
        if !*slot {
            *slot = true;
            big_count += 1;
        }
    }

    let mut next_large = true;
    big.into_iter()
        .map(|is_big| {
            if !is_big {
                return CellSize::Small;
            }
            let size = if next_large {
                CellSize::Large
            } else {
                CellSize::Tall
            };
            next_large = !next_large;
            size
        })
        .collect()
}

/// Mosaic for `date`, seeded from the date.
pub fn generate_grid(reviews: &[Review], date: NaiveDate, options: GridOptions) -> Vec<GridCell> {
    generate_grid_with(reviews, options, &DailySeed::for_date(date))
}

/// Mosaic with explicit random streams.
pub fn generate_grid_with(
    reviews: &[Review],
    options: GridOptions,
    streams: &dyn RandomStreams,
) -> Vec<GridCell> {
    let mut seen = HashSet::new();
    let unique: Vec<&Review> = reviews
        .iter()
        .filter(|r| seen.insert(r.id.as_str()))
        .collect();

    let mut queues = Queues::new(&unique, streams);
    let video_count = unique
        .iter()
        .filter(|r| r.review_type == ReviewType::Video)
        .count();
    let pattern = slot_pattern(unique.len(), video_count, options.big_interval);

    let mut big_left = pattern.iter().filter(|s| s.is_big()).count();
    let mut cells = Vec::with_capacity(pattern.len());
    for (index, size) in pattern.into_iter().enumerate() {
        let featured_phase = index < options.featured_slots;
        let spare_big = size.is_big() && big_left > queues.videos_left();
        if size.is_big() {
            big_left -= 1;
        }
        let picked = if featured_phase {
            queues
                .take_featured(size.is_big(), spare_big)
                .or_else(|| queues.take(size.is_big()))
        } else {
            queues.take(size.is_big())
        };
        let Some(review) = picked else {
            continue;
        };
        cells.push(GridCell {
            kind: review.review_type,
            review: review.clone(),
            size,
        });
    }

    tracing::debug!(
        reviews = unique.len(),
        cells = cells.len(),
        "generated review grid"
    );
    cells
}

/// Per-kind queues, featured reviews first, each partition shuffled.
struct Queues<'a> {
    by_kind: [VecDeque<&'a Review>; 3],
    placed: HashSet<&'a str>,
    mix_cursor: usize,
}

impl<'a> Queues<'a> {
    fn new(reviews: &[&'a Review], streams: &dyn RandomStreams) -> Self {
        let by_kind = KINDS.map(|kind| {
            let mut queue = VecDeque::new();
            for featured in [true, false] {
                let mut partition: Vec<&Review> = reviews
                    .iter()
                    .copied()
                    .filter(|r| r.review_type == kind && r.is_featured == featured)
                    .collect();
                let mut rng = streams.stream(stream_offset(kind, featured));
                shuffle(&mut partition, rng.as_mut());
                queue.extend(partition);
            }
            queue
        });
        Self {
            by_kind,
            placed: HashSet::new(),
            mix_cursor: 0,
        }
    }

    fn queue(&mut self, kind: ReviewType) -> &mut VecDeque<&'a Review> {
        let idx = match kind {
            ReviewType::Video => 0,
            ReviewType::BeforeAfter => 1,
            ReviewType::Static => 2,
        };
        &mut self.by_kind[idx]
    }

    /// Pop the next unplaced review of `kind`, optionally only if featured.
    fn pop(&mut self, kind: ReviewType, featured_only: bool) -> Option<&'a Review> {
        loop {
            let front = *self.queue(kind).front()?;
            if self.placed.contains(front.id.as_str()) {
                self.queue(kind).pop_front();
                continue;
            }
            if featured_only && !front.is_featured {
                return None;
            }
            self.queue(kind).pop_front();
            self.placed.insert(front.id.as_str());
            return Some(front);
        }
    }

    /// Next review from the before/after and static rotation.
    fn pop_mix(&mut self, featured_only: bool) -> Option<&'a Review> {
        for step in 0..MIX.len() {
            let kind = MIX[(self.mix_cursor + step) % MIX.len()];
            if let Some(review) = self.pop(kind, featured_only) {
                self.mix_cursor = (self.mix_cursor + step + 1) % MIX.len();
                return Some(review);
            }
        }
        None
    }

    fn videos_left(&self) -> usize {
        self.by_kind[0]
            .iter()
            .filter(|r| !self.placed.contains(r.id.as_str()))
            .count()
    }

    /// Featured review for the slot. A big slot goes to a featured non-video
    /// only if `spare_big`: no remaining video would lose its big slot.
    fn take_featured(&mut self, big: bool, spare_big: bool) -> Option<&'a Review> {
        if big {
            let video = self.pop(ReviewType::Video, true);
            if video.is_some() || !spare_big {
                return video;
            }
            self.pop_mix(true)
        } else {
            self.pop_mix(true)
        }
    }

    fn take(&mut self, big: bool) -> Option<&'a Review> {
        if big {
            self.pop(ReviewType::Video, false)
                .or_else(|| self.pop_mix(false))
        } else {
            self.pop_mix(false)
                .or_else(|| self.pop(ReviewType::Video, false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::FixedSequence;
    use crate::test_helpers::{review, reviews};
    use pretty_assertions::assert_eq;

    fn ids(cells: &[GridCell]) -> Vec<&str> {
        cells.iter().map(|c| c.review.id.as_str()).collect()
    }

    fn in_order() -> FixedSequence {
        FixedSequence::new([0.999])
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // =========================================================================
    // slot_pattern
    // =========================================================================

    #[test]
    fn pattern_big_every_interval() {
        use CellSize::*;
        assert_eq!(
            slot_pattern(7, 0, 3),
            vec![Large, Small, Small, Tall, Small, Small, Large]
        );
    }

    #[test]
    fn pattern_promotes_small_slots_for_videos() {
        use CellSize::*;
        assert_eq!(
            slot_pattern(5, 4, 3),
            vec![Large, Tall, Large, Tall, Small]
        );
    }

    #[test]
    fn pattern_cannot_exceed_slot_count() {
        let pattern = slot_pattern(2, 5, 3);
        assert!(pattern.iter().all(|s| s.is_big()));
        assert_eq!(pattern.len(), 2);
    }

    #[test]
    fn pattern_zero_interval_treated_as_one() {
        assert!(slot_pattern(3, 0, 0).iter().all(|s| s.is_big()));
    }

    #[test]
    fn pattern_empty() {
        assert!(slot_pattern(0, 0, 3).is_empty());
    }

    // =========================================================================
    // generate_grid
    // =========================================================================

    #[test]
    fn featured_video_lands_first() {
        let input = vec![
            review("a", ReviewType::Video, true),
            review("b", ReviewType::Static, false),
        ];
        let cells = generate_grid(&input, date(2025, 1, 1), GridOptions::default());

        assert_eq!(ids(&cells), vec!["a", "b"]);
        assert_eq!(cells[0].size, CellSize::Large);
        assert_eq!(cells[0].kind, ReviewType::Video);
        assert_eq!(cells[1].size, CellSize::Small);
    }

    #[test]
    fn same_date_same_layout() {
        let mut input = reviews("v", ReviewType::Video, 4);
        input.extend(reviews("b", ReviewType::BeforeAfter, 6));
        input.extend(reviews("s", ReviewType::Static, 7));

        let first = generate_grid(&input, date(2025, 3, 14), GridOptions::default());
        let second = generate_grid(&input, date(2025, 3, 14), GridOptions::default());
        assert_eq!(first, second);
    }

    #[test]
    fn different_dates_shuffle_differently() {
        let input = reviews("s", ReviewType::Static, 12);
        let a = generate_grid(&input, date(2025, 3, 14), GridOptions::default());
        let b = generate_grid(&input, date(2025, 3, 15), GridOptions::default());
        assert_ne!(ids(&a), ids(&b));
    }

    #[test]
    fn every_review_placed_exactly_once() {
        let mut input = reviews("v", ReviewType::Video, 5);
        input.extend(reviews("b", ReviewType::BeforeAfter, 3));
        input.extend(reviews("s", ReviewType::Static, 9));
        input.push(review("fb", ReviewType::BeforeAfter, true));

        let cells = generate_grid(&input, date(2026, 10, 18), GridOptions::default());
        let mut placed = ids(&cells);
        placed.sort();
        let mut expected: Vec<&str> = input.iter().map(|r| r.id.as_str()).collect();
        expected.sort();
        assert_eq!(placed, expected);
    }

    #[test]
    fn duplicate_ids_placed_once() {
        let input = vec![
            review("x", ReviewType::Static, false),
            review("x", ReviewType::Static, false),
            review("y", ReviewType::Video, false),
        ];
        let cells = generate_grid_with(&input, GridOptions::default(), &in_order());
        assert_eq!(ids(&cells), vec!["y", "x"]);
    }

    #[test]
    fn featured_precede_non_featured_of_same_kind() {
        let mut input = reviews("s", ReviewType::Static, 6);
        input.push(review("fs1", ReviewType::Static, true));
        input.push(review("fs2", ReviewType::Static, true));

        for day in 1..=28 {
            let cells = generate_grid(&input, date(2025, 2, day), GridOptions::default());
            let static_ids: Vec<&str> = cells
                .iter()
                .filter(|c| c.kind == ReviewType::Static)
                .map(|c| c.review.id.as_str())
                .collect();
            assert!(static_ids[0].starts_with("fs"), "day {day}: {static_ids:?}");
            assert!(static_ids[1].starts_with("fs"), "day {day}: {static_ids:?}");
        }
    }

    #[test]
    fn small_slots_alternate_mix() {
        let mut input = reviews("b", ReviewType::BeforeAfter, 2);
        input.extend(reviews("s", ReviewType::Static, 2));
        let options = GridOptions {
            featured_slots: 0,
            big_interval: 100,
        };
        let cells = generate_grid_with(&input, options, &in_order());

        // Slot 0 is big but there are no videos, so it takes the mix too.
        assert_eq!(ids(&cells), vec!["b1", "s1", "b2", "s2"]);
    }

    #[test]
    fn every_video_gets_a_big_slot() {
        let input = reviews("v", ReviewType::Video, 2);
        let options = GridOptions {
            featured_slots: 0,
            big_interval: 1_000,
        };
        let cells = generate_grid_with(&input, options, &in_order());
        assert_eq!(ids(&cells), vec!["v1", "v2"]);
        assert!(cells.iter().all(|c| c.size.is_big()));
    }

    #[test]
    fn featured_review_leaves_the_only_big_slot_to_the_video() {
        let input = vec![
            review("v1", ReviewType::Video, false),
            review("s1", ReviewType::Static, false),
            review("fb", ReviewType::BeforeAfter, true),
        ];
        let cells = generate_grid_with(&input, GridOptions::default(), &in_order());

        assert_eq!(ids(&cells), vec!["v1", "fb", "s1"]);
        assert_eq!(
            cells.iter().map(|c| c.size).collect::<Vec<_>>(),
            vec![CellSize::Large, CellSize::Small, CellSize::Small]
        );
    }

    #[test]
    fn featured_review_cannot_push_videos_into_small_cells() {
        let input = vec![
            review("v1", ReviewType::Video, false),
            review("v2", ReviewType::Video, false),
            review("fs", ReviewType::Static, true),
        ];
        let options = GridOptions {
            featured_slots: 6,
            big_interval: 1_000,
        };
        let cells = generate_grid(&input, date(2025, 1, 1), options);

        assert_eq!(cells.len(), 3);
        for cell in cells.iter().filter(|c| c.kind == ReviewType::Video) {
            assert!(cell.size.is_big(), "{} is small", cell.review.id);
        }
        assert_eq!(cells[2].review.id, "fs");
        assert_eq!(cells[2].size, CellSize::Small);
    }

    #[test]
    fn featured_review_takes_spare_big_slot() {
        let input = vec![
            review("v1", ReviewType::Video, false),
            review("fs", ReviewType::Static, true),
            review("s1", ReviewType::Static, false),
            review("s2", ReviewType::Static, false),
        ];
        let options = GridOptions {
            featured_slots: 1,
            big_interval: 2,
        };
        let cells = generate_grid_with(&input, options, &in_order());

        // Two big slots, one video: the featured review may take the first.
        assert_eq!(ids(&cells), vec!["fs", "s1", "v1", "s2"]);
        assert!(cells[2].size.is_big());
    }

    #[test]
    fn kind_comes_from_review_type() {
        let input = vec![review("x", ReviewType::BeforeAfter, false)];
        let cells = generate_grid_with(&input, GridOptions::default(), &in_order());
        assert_eq!(cells[0].kind, ReviewType::BeforeAfter);
    }

    #[test]
    fn empty_input_empty_grid() {
        assert!(generate_grid(&[], date(2025, 1, 1), GridOptions::default()).is_empty());
    }
}
