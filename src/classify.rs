//! Double-page (spread) classifier.
//!
//! A page is an intrinsic spread when its long axis lines up with the
//! reading width after rotation. Square pages are never spreads.

use crate::transform::Rotation;

/// Which rotation the classifier should see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationPolicy {
    /// Classify with the user's current rotation.
    RotationAware,
    /// Always classify as if unrotated, so spreads stay stable when the
    /// user turns the page.
    Unrotated,
}

impl ClassificationPolicy {
    pub fn from_flag(force_rotation_aware: bool) -> Self {
        if force_rotation_aware {
            Self::RotationAware
        } else {
            Self::Unrotated
        }
    }

    /// Rotation to feed into [`is_double_spread`].
    pub fn effective_rotation(self, current: Rotation) -> Rotation {
        match self {
            Self::RotationAware => current,
            Self::Unrotated => Rotation::NONE,
        }
    }
}

pub fn is_double_spread(width: u32, height: u32, rotation: Rotation) -> bool {
    if rotation.is_odd() {
        height > width
    } else {
        width > height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_rotations_compare_width() {
        for rotation in [Rotation::NONE, Rotation::HALF] {
            assert!(is_double_spread(1600, 1000, rotation));
            assert!(!is_double_spread(1000, 1600, rotation));
        }
    }

    #[test]
    fn odd_rotations_compare_height() {
        for rotation in [Rotation::QUARTER, Rotation::THREE_QUARTERS] {
            assert!(is_double_spread(1000, 1600, rotation));
            assert!(!is_double_spread(1600, 1000, rotation));
        }
    }

    #[test]
    fn square_is_never_a_spread() {
        for turns in 0..4 {
            assert!(!is_double_spread(800, 800, Rotation::from_quarter_turns(turns)));
        }
    }

    #[test]
    fn unrotated_policy_ignores_user_rotation() {
        let policy = ClassificationPolicy::from_flag(false);
        assert_eq!(policy.effective_rotation(Rotation::QUARTER), Rotation::NONE);

        let policy = ClassificationPolicy::from_flag(true);
        assert_eq!(policy.effective_rotation(Rotation::QUARTER), Rotation::QUARTER);
    }
}
