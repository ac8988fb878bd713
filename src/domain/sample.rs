// ============================================================
// Layer 3 — Age Sample Records
// ============================================================
// One row of the dataset manifest: a path to a face image,
// its continuous age label, and the split it belongs to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which partition of the dataset a record belongs to.
/// Training applies augmentation and shuffling; val/test do neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Split {
    Train,
    Val,
    Test,
}

impl FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Split::Train),
            "val"   => Ok(Split::Val),
            "test"  => Ok(Split::Test),
            other   => Err(format!("unknown split '{other}' (expected train/val/test)")),
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Val   => write!(f, "val"),
            Split::Test  => write!(f, "test"),
        }
    }
}

/// One manifest entry. The image itself is loaded lazily by the
/// dataset adapter — this struct stays cheap to clone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgeRecord {
    /// Image path relative to the dataset root
    pub path: String,

    /// Ground-truth age in years (continuous label)
    pub age: f32,

    /// Which split this record belongs to
    pub split: Split,
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_round_trip() {
        for s in ["train", "val", "test"] {
            let split: Split = s.parse().unwrap();
            assert_eq!(split.to_string(), s);
        }
    }

    #[test]
    fn test_unknown_split_is_rejected() {
        assert!("validation".parse::<Split>().is_err());
    }
}
