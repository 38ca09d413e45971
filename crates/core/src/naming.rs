//! File naming convention linking generated pictures to their task.
//!
//! Convention: `task-{id}{sep}{anything}.{ext}` where `sep` is one of `-`,
//! `_` or `.`, or the id is directly followed by the extension.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::DbId;

static TASK_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^task-(\d+)(?:[-_.]|$)").expect("valid regex"));

/// Build the canonical file name for output `index` of task `task_id`.
///
/// ```
/// use genpic_core::naming::task_file_name;
///
/// assert_eq!(task_file_name(42, 0, "png"), "task-42-0.png");
/// ```
pub fn task_file_name(task_id: DbId, index: u32, extension: &str) -> String {
    format!("task-{task_id}-{index}.{extension}")
}

/// Extract the owning task id from a generated file name.
///
/// Returns `None` when the name does not follow the convention or the id
/// does not fit in a [`DbId`].
///
/// ```
/// use genpic_core::naming::task_id_from_file_name;
///
/// assert_eq!(task_id_from_file_name("task-42-0.png"), Some(42));
/// assert_eq!(task_id_from_file_name("portrait.png"), None);
/// ```
pub fn task_id_from_file_name(file_name: &str) -> Option<DbId> {
    let caps = TASK_FILE_RE.captures(file_name)?;
    caps[1].parse::<DbId>().ok().filter(|id| *id > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dash_separated_index() {
        assert_eq!(task_id_from_file_name("task-7-3.png"), Some(7));
    }

    #[test]
    fn underscore_suffix() {
        assert_eq!(task_id_from_file_name("task-12_seed99.webp"), Some(12));
    }

    #[test]
    fn id_followed_by_extension() {
        assert_eq!(task_id_from_file_name("task-5.jpg"), Some(5));
    }

    #[test]
    fn bare_stem() {
        assert_eq!(task_id_from_file_name("task-5"), Some(5));
    }

    #[test]
    fn digits_must_be_terminated() {
        assert_eq!(task_id_from_file_name("task-5abc.png"), None);
    }

    #[test]
    fn missing_prefix() {
        assert_eq!(task_id_from_file_name("a.png"), None);
        assert_eq!(task_id_from_file_name("mytask-5.png"), None);
    }

    #[test]
    fn zero_id_rejected() {
        assert_eq!(task_id_from_file_name("task-0-1.png"), None);
    }

    #[test]
    fn overflowing_id_rejected() {
        assert_eq!(
            task_id_from_file_name("task-99999999999999999999-0.png"),
            None
        );
    }

    #[test]
    fn round_trip_with_builder() {
        let name = task_file_name(314, 2, "png");
        assert_eq!(name, "task-314-2.png");
        assert_eq!(task_id_from_file_name(&name), Some(314));
    }
}
