//! Proof-of-work acceptance rules.
//!
//! A rule is a predicate over a digest produced by the client. The service
//! never hashes anything itself; `accepts` exists so the settlement side and
//! tests can check a reported digest against the rule a job was issued with.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DifficultyRule {
    /// Lower-case hex rendering of the digest must end with `suffix`.
    Suffix { suffix: String },
    /// The digest, read as a big-endian integer, must end in `bits` zero bits.
    #[serde(rename_all = "camelCase")]
    TrailingZeroBits { bits: u32 },
}

impl DifficultyRule {
    #[must_use]
    pub fn zero_suffix(len: usize) -> Self {
        Self::Suffix {
            suffix: "0".repeat(len),
        }
    }

    /// Nibble rendering used by legacy UI text.
    ///
    /// Bit rules are shown as `ceil(bits / 4)` zeros, which overstates the
    /// requirement whenever `bits` is not a multiple of four.
    #[must_use]
    pub fn display_suffix(&self) -> String {
        match self {
            Self::Suffix { suffix } => suffix.clone(),
            Self::TrailingZeroBits { bits } => "0".repeat(bits.div_ceil(4) as usize),
        }
    }

    #[must_use]
    pub fn accepts(&self, digest: &[u8]) -> bool {
        match self {
            Self::Suffix { suffix } => {
                let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
                hex.ends_with(&suffix.to_ascii_lowercase())
            }
            Self::TrailingZeroBits { bits } => trailing_zero_bits(digest) >= *bits,
        }
    }
}

impl fmt::Display for DifficultyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Suffix { suffix } => write!(f, "suffix \"{suffix}\""),
            Self::TrailingZeroBits { bits } => write!(f, "{bits} trailing zero bits"),
        }
    }
}

fn trailing_zero_bits(digest: &[u8]) -> u32 {
    let mut count = 0;
    for byte in digest.iter().rev() {
        if *byte == 0 {
            count += 8;
        } else {
            count += byte.trailing_zeros();
            break;
        }
    }
    count
}

/// Difficulty in force for one epoch. Derived on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochDifficulty {
    pub epoch: i64,
    pub rule: DifficultyRule,
}

impl EpochDifficulty {
    #[must_use]
    pub fn display_suffix(&self) -> String {
        self.rule.display_suffix()
    }
}
