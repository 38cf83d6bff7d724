//! Per-task computation parameters
//!
//! The frame count is the only dynamic parameter. It is resolved by strict
//! precedence (task payload, then static config, then the built-in default)
//! and must have the form `4n+1`.

use thiserror::Error;

use crate::domain::task::Task;

/// Frame count used when neither the task nor the config supplies one
pub const DEFAULT_FRAME_COUNT: i64 = 121;

/// A frame count that violates the `4n+1` constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameCountError {
    #[error("frame_num must be positive, got {0}")]
    NotPositive(i64),

    #[error("frame_num must be 4n+1, got {0}")]
    NotFourNPlusOne(i64),
}

/// Picks the effective frame count: task value > config value > built-in default
pub fn resolve_frame_count(
    task_value: Option<i64>,
    config_value: Option<i64>,
    builtin_default: i64,
) -> i64 {
    task_value.or(config_value).unwrap_or(builtin_default)
}

/// Checks `n > 0` and `(n - 1) mod 4 == 0`
///
/// Holds over the whole `i64` range; the accepted value is passed on
/// unchanged.
pub fn validate_frame_count(n: i64) -> Result<i64, FrameCountError> {
    if n <= 0 {
        return Err(FrameCountError::NotPositive(n));
    }
    if (n - 1) % 4 != 0 {
        return Err(FrameCountError::NotFourNPlusOne(n));
    }
    Ok(n)
}

pub fn is_valid_frame_count(n: i64) -> bool {
    validate_frame_count(n).is_ok()
}

/// Effective computation parameters for one task
///
/// Recomputed every time a task is processed; never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedParams {
    pub frame_count: i64,
    pub prompt: Option<String>,
}

impl ResolvedParams {
    /// Resolves and validates the parameters of `task`
    ///
    /// # Arguments
    /// * `task` - The claimed task
    /// * `config_frame_count` - The worker's configured default, if any
    pub fn resolve(task: &Task, config_frame_count: Option<i64>) -> Result<Self, FrameCountError> {
        let frame_count = validate_frame_count(resolve_frame_count(
            task.frame_count,
            config_frame_count,
            DEFAULT_FRAME_COUNT,
        ))?;

        let prompt = task
            .prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        Ok(Self {
            frame_count,
            prompt,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn task_with(frame_count: Option<i64>, prompt: Option<&str>) -> Task {
        Task {
            item_id: "item-1".to_string(),
            group_id: None,
            photo_id: None,
            source_reference: "uploads/photo.png".to_string(),
            prompt: prompt.map(str::to_string),
            frame_count,
            lease_expiry: Utc::now(),
        }
    }

    #[test]
    fn test_validate_accepts_4n_plus_1() {
        for n in [1, 5, 9, 81, 121] {
            assert_eq!(validate_frame_count(n), Ok(n), "n = {}", n);
        }
    }

    #[test]
    fn test_validate_rejects_other_values() {
        for n in [10, 20, 100, 2, 3, 4] {
            assert_eq!(
                validate_frame_count(n),
                Err(FrameCountError::NotFourNPlusOne(n))
            );
        }
        for n in [0, -3, -4, i64::MIN] {
            assert_eq!(validate_frame_count(n), Err(FrameCountError::NotPositive(n)));
        }
    }

    #[test]
    fn test_validate_matches_predicate_over_range() {
        for n in -50i64..=500 {
            let expected = n > 0 && (n - 1) % 4 == 0;
            assert_eq!(is_valid_frame_count(n), expected, "n = {}", n);
        }
    }

    #[test]
    fn test_validate_accepts_large_values() {
        let n = (u32::MAX as i64) * 4 + 1;
        assert_eq!(validate_frame_count(n), Ok(n));
        assert_eq!(
            validate_frame_count(i64::MAX),
            Err(FrameCountError::NotFourNPlusOne(i64::MAX))
        );
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            validate_frame_count(100).unwrap_err().to_string(),
            "frame_num must be 4n+1, got 100"
        );
    }

    #[test]
    fn test_precedence() {
        assert_eq!(resolve_frame_count(Some(81), Some(121), 121), 81);
        assert_eq!(resolve_frame_count(None, Some(121), 121), 121);
        assert_eq!(resolve_frame_count(None, None, 121), 121);
        assert_eq!(resolve_frame_count(None, Some(45), 121), 45);
    }

    #[test]
    fn test_resolve_params() {
        let params = ResolvedParams::resolve(&task_with(Some(81), Some("  waves ")), Some(121)).unwrap();
        assert_eq!(params.frame_count, 81);
        assert_eq!(params.prompt.as_deref(), Some("waves"));

        let params = ResolvedParams::resolve(&task_with(None, Some("   ")), None).unwrap();
        assert_eq!(params.frame_count, DEFAULT_FRAME_COUNT);
        assert_eq!(params.prompt, None);
    }

    #[test]
    fn test_resolve_params_rejects_invalid_task_value() {
        let err = ResolvedParams::resolve(&task_with(Some(100), None), Some(121)).unwrap_err();
        assert_eq!(err, FrameCountError::NotFourNPlusOne(100));
    }
}
