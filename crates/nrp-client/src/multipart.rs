//! AWS-style multipart sizing math.
//!
//! A single deterministic function computes how many parts a transfer of a
//! given size is split into, and how large each part is. Both the upload
//! engine (splitting a local file into parts to `PUT`) and the download
//! engine (splitting a remote object into ranged `GET`s) call this same
//! function, so the two halves of a transfer always agree on part
//! boundaries without either one hard-coding the other's limits.

use thiserror::Error;

/// Minimum size of any part except the last, in bytes (5 MiB).
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum size of a single part, in bytes (5 GiB).
pub const MAX_PART_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Maximum number of parts a single transfer may be split into.
pub const MAX_PARTS: u32 = 10_000;

/// Maximum total transfer size, in bytes (5 TiB).
pub const MAX_TOTAL_SIZE: u64 = 5 * 1024 * 1024 * 1024 * 1024;

/// Below this size, the download engine always uses a single sequential
/// GET rather than ranged multipart GETs, even when the server advertises
/// range support.
pub const MINIMAL_DOWNLOAD_PART_SIZE: u64 = MIN_PART_SIZE;

/// Errors raised while computing a part plan.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum MultipartMathError {
    /// `total_size` exceeds [`MAX_TOTAL_SIZE`].
    #[error("total size {total} bytes exceeds the {MAX_TOTAL_SIZE}-byte maximum")]
    TotalTooLarge { total: u64 },

    /// Splitting at the requested (or computed) part size would need more
    /// than [`MAX_PARTS`] parts even after raising the part size to the
    /// [`MAX_PART_SIZE`] ceiling.
    #[error("total size {total} bytes at part size {part_size} bytes would need {needed} parts, exceeding the {MAX_PARTS}-part maximum")]
    TooManyParts {
        total: u64,
        part_size: u64,
        needed: u32,
    },
}

/// One entry in a [`PartPlan`]: a single part's zero-based index, byte
/// offset into the transfer, and length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    pub index: u32,
    pub offset: u64,
    pub length: u64,
}

/// A complete split of a transfer into parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartPlan {
    pub total_size: u64,
    pub part_size: u64,
    pub parts: Vec<Part>,
}

/// Compute a [`PartPlan`] for a transfer of `total_size` bytes, given
/// optional caller hints for the desired part count and/or part size.
///
/// This is the single arbiter of part counts for both the upload engine
/// (splitting a source into parts to `PUT`) and the download engine
/// (splitting a remote object into ranged `GET`s) — both call this same
/// function so the two halves of a transfer always agree on boundaries.
///
/// Resolution order:
/// 1. `total_size == 0` always yields a single zero-length part.
/// 2. Both hints supplied: `part_size` is clamped to
///    `[MIN_PART_SIZE, MAX_PART_SIZE]` and the part count is recomputed
///    from it (the `parts` hint only signals that a hint pair was given;
///    `part_size` wins any conflict, matching upstream's own tie-break).
/// 3. Only `parts` supplied: `part_size` is derived as
///    `ceil(total_size / parts)`, clamped, then the part count is
///    recomputed from the clamped value (so the caller's hint may be
///    adjusted upward if it implied too small a part).
/// 4. Only `part_size` supplied: clamped; if that still needs more than
///    [`MAX_PARTS`] parts, the part size is raised to
///    `ceil(total_size / MAX_PARTS)` (re-clamped) and recomputed.
/// 5. Neither supplied: [`MIN_PART_SIZE`] is tried first; if that keeps
///    the part count within [`MAX_PARTS`] it is used as-is, otherwise the
///    part size is raised the same way as step 4.
///
/// # Errors
///
/// Returns [`MultipartMathError::TotalTooLarge`] if `total_size` exceeds
/// [`MAX_TOTAL_SIZE`], or [`MultipartMathError::TooManyParts`] if no
/// legal part size (even [`MAX_PART_SIZE`]) keeps the split within
/// [`MAX_PARTS`] parts.
pub fn part_plan(
    total_size: u64,
    requested_parts: Option<u32>,
    requested_part_size: Option<u64>,
) -> Result<PartPlan, MultipartMathError> {
    if total_size > MAX_TOTAL_SIZE {
        return Err(MultipartMathError::TotalTooLarge { total: total_size });
    }
    if total_size == 0 {
        return Ok(PartPlan {
            total_size,
            part_size: 0,
            parts: vec![Part {
                index: 0,
                offset: 0,
                length: 0,
            }],
        });
    }

    let part_size = match (requested_parts, requested_part_size) {
        (Some(_), Some(size)) => clamp_part_size(size),
        (Some(parts), None) => clamp_part_size(total_size.div_ceil(u64::from(parts.max(1)))),
        (None, Some(size)) => raise_if_too_many(total_size, clamp_part_size(size)),
        (None, None) => raise_if_too_many(total_size, MIN_PART_SIZE),
    };

    let needed = part_count(total_size, part_size);
    if needed > MAX_PARTS {
        return Err(MultipartMathError::TooManyParts {
            total: total_size,
            part_size,
            needed,
        });
    }

    Ok(PartPlan {
        total_size,
        part_size,
        parts: build_parts(total_size, part_size, needed),
    })
}

fn clamp_part_size(size: u64) -> u64 {
    size.clamp(MIN_PART_SIZE, MAX_PART_SIZE)
}

/// If `candidate` would need more than [`MAX_PARTS`] parts, raise it to
/// the smallest clamped size that fits, otherwise return it unchanged.
fn raise_if_too_many(total_size: u64, candidate: u64) -> u64 {
    if part_count(total_size, candidate) > MAX_PARTS {
        clamp_part_size(total_size.div_ceil(u64::from(MAX_PARTS)))
    } else {
        candidate
    }
}

fn part_count(total_size: u64, part_size: u64) -> u32 {
    if total_size == 0 {
        return 1;
    }
    u32::try_from(total_size.div_ceil(part_size)).unwrap_or(u32::MAX)
}

fn build_parts(total_size: u64, part_size: u64, needed: u32) -> Vec<Part> {
    if total_size == 0 {
        return vec![Part {
            index: 0,
            offset: 0,
            length: 0,
        }];
    }
    (0..needed)
        .map(|index| {
            let offset = u64::from(index) * part_size;
            let length = part_size.min(total_size - offset);
            Part {
                index,
                offset,
                length,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_length_transfer_is_one_empty_part() {
        let plan = part_plan(0, None, None).expect("plan");
        assert_eq!(plan.parts.len(), 1);
        assert_eq!(plan.parts[0].length, 0);
    }

    #[test]
    fn small_transfer_is_single_part() {
        let plan = part_plan(1024, None, None).expect("plan");
        assert_eq!(plan.parts.len(), 1);
        assert_eq!(plan.parts[0].length, 1024);
    }

    #[test]
    fn explicit_part_size_splits_evenly() {
        let plan = part_plan(20 * 1024 * 1024, None, Some(MIN_PART_SIZE)).expect("plan");
        assert_eq!(plan.parts.len(), 4);
        for part in &plan.parts {
            assert_eq!(part.length, MIN_PART_SIZE);
        }
    }

    #[test]
    fn last_part_absorbs_remainder() {
        let total = MIN_PART_SIZE * 3 + 7;
        let plan = part_plan(total, None, Some(MIN_PART_SIZE)).expect("plan");
        assert_eq!(plan.parts.len(), 4);
        assert_eq!(plan.parts[3].length, 7);
        assert_eq!(plan.parts[0].length, MIN_PART_SIZE);
    }

    #[test]
    fn parts_are_contiguous_and_cover_total() {
        let total = MIN_PART_SIZE * 5 + 123;
        let plan = part_plan(total, None, Some(MIN_PART_SIZE)).expect("plan");
        let mut covered = 0u64;
        for (i, part) in plan.parts.iter().enumerate() {
            assert_eq!(part.index as usize, i);
            assert_eq!(part.offset, covered);
            covered += part.length;
        }
        assert_eq!(covered, total);
    }

    #[test]
    fn part_size_below_minimum_is_clamped_up() {
        let plan = part_plan(1024, None, Some(1024)).expect("plan");
        assert_eq!(plan.part_size, MIN_PART_SIZE);
        assert_eq!(plan.parts.len(), 1);
    }

    #[test]
    fn part_size_above_maximum_is_clamped_down() {
        let plan = part_plan(1024, None, Some(MAX_PART_SIZE + 1)).expect("plan");
        assert_eq!(plan.part_size, MAX_PART_SIZE);
    }

    #[test]
    fn rejects_total_size_above_maximum() {
        let err = part_plan(MAX_TOTAL_SIZE + 1, None, None).expect_err("should reject");
        assert_eq!(
            err,
            MultipartMathError::TotalTooLarge {
                total: MAX_TOTAL_SIZE + 1
            }
        );
    }

    #[test]
    fn explicit_part_size_too_small_for_total_is_raised() {
        let total = MIN_PART_SIZE * (u64::from(MAX_PARTS) + 1);
        let plan = part_plan(total, None, Some(MIN_PART_SIZE)).expect("plan");
        assert!(plan.parts.len() as u32 <= MAX_PARTS);
        assert!(plan.part_size > MIN_PART_SIZE);
    }

    #[test]
    fn auto_sizing_keeps_part_count_within_limit() {
        let total = MAX_TOTAL_SIZE;
        let plan = part_plan(total, None, None).expect("plan");
        assert!(plan.parts.len() as u32 <= MAX_PARTS);
    }

    #[test]
    fn parts_hint_derives_part_size() {
        let total = 20 * 1024 * 1024;
        let plan = part_plan(total, Some(4), None).expect("plan");
        assert_eq!(plan.parts.len(), 4);
        assert_eq!(plan.part_size, 5 * 1024 * 1024);
    }

    #[test]
    fn parts_hint_below_minimum_part_size_is_clamped() {
        // Asking for 1000 parts of a 1 MiB transfer implies part_size < MIN,
        // so the engine clamps up and ends with far fewer parts than asked.
        let total = 1024 * 1024;
        let plan = part_plan(total, Some(1000), None).expect("plan");
        assert_eq!(plan.part_size, MIN_PART_SIZE);
        assert_eq!(plan.parts.len(), 1);
    }

    #[test]
    fn both_hints_supplied_part_size_wins_after_clamp() {
        let total = 20 * 1024 * 1024;
        let plan = part_plan(total, Some(999), Some(MIN_PART_SIZE)).expect("plan");
        assert_eq!(plan.part_size, MIN_PART_SIZE);
        assert_eq!(plan.parts.len(), 4);
    }

    #[test]
    fn total_too_large_even_at_max_part_size_is_rejected() {
        // Slightly above the largest splittable size at MAX_PART_SIZE * MAX_PARTS.
        let total = MAX_PART_SIZE * u64::from(MAX_PARTS) + 1;
        if total <= MAX_TOTAL_SIZE {
            let err = part_plan(total, None, None).expect_err("should reject");
            assert!(matches!(err, MultipartMathError::TooManyParts { .. }));
        }
    }
}
