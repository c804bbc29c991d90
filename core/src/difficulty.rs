//! Epoch → difficulty schedule.
//!
//! Epochs 0..=2 grow a zero suffix by one hex nibble per epoch. From epoch 3
//! the rule switches to a trailing-zero-bit count, because nibble steps
//! (16x each) are too coarse beyond that point. The switch changes units
//! (hex nibbles to binary bits) and is intentional: 18 bits sits between
//! four and five nibbles, and legacy UI text still renders it as five zeros.

use cartlock_types::{DifficultyRule, EpochDifficulty};

/// Suffix length at epoch 0 (and any negative epoch).
pub const BASE_SUFFIX_LEN: usize = 2;
/// First epoch that uses the bit-count rule.
pub const BIT_RULE_FROM_EPOCH: i64 = 3;
/// Trailing zero bits required once the bit-count rule applies.
pub const BIT_RULE_ZERO_BITS: u32 = 18;

/// Difficulty for `epoch`. Pure: the same epoch always yields the same rule.
#[must_use]
pub fn difficulty_for_epoch(epoch: i64) -> EpochDifficulty {
    let rule = if epoch >= BIT_RULE_FROM_EPOCH {
        DifficultyRule::TrailingZeroBits {
            bits: BIT_RULE_ZERO_BITS,
        }
    } else {
        // epoch is in (-inf, 2] here; clamp negatives to the base length.
        let extra = usize::try_from(epoch.max(0)).unwrap_or(0);
        DifficultyRule::zero_suffix(BASE_SUFFIX_LEN + extra)
    };
    EpochDifficulty { epoch, rule }
}

/// Rough expected hash count for a rule. Logged with every issued job.
#[must_use]
pub fn expected_attempts(rule: &DifficultyRule) -> u64 {
    match rule {
        DifficultyRule::Suffix { suffix } => 16u64.saturating_pow(suffix.len() as u32),
        DifficultyRule::TrailingZeroBits { bits } => 2u64.saturating_pow(*bits),
    }
}
