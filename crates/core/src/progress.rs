//! Sequential unlock resolution.
//!
//! Progress is never stored: it is recomputed from the ordered catalog and a
//! student's attempt history every time it is queried.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Attempt, AttemptId, AttemptStatus, QuestionSet, QuestionSetId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Locked,
    Available,
    InProgress,
    Completed,
}

/// Derived status of one question set for one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetProgress {
    pub question_set_id: QuestionSetId,
    pub status: ProgressStatus,
    pub total_questions: usize,
    /// Percentage of the latest submitted attempt.
    pub score: Option<u8>,
    /// Latest submitted attempt when completed, the open attempt when in progress.
    pub attempt_id: Option<AttemptId>,
    /// Open attempt, including a retry started after completion.
    pub open_attempt_id: Option<AttemptId>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct SetHistory<'a> {
    latest_submitted: Option<&'a Attempt>,
    open: Option<&'a Attempt>,
}

/// Returns active sets in student-facing order: `sort_order` ascending, then id.
#[must_use]
pub fn ordered_active_sets(sets: &[QuestionSet]) -> Vec<&QuestionSet> {
    let mut active: Vec<&QuestionSet> = sets.iter().filter(|s| s.is_active()).collect();
    active.sort_by_key(|s| (s.sort_order(), s.id()));
    active
}

/// Resolve one progress record per active question set.
///
/// A set is `completed` once any attempt for it is submitted, `in_progress`
/// while an attempt is open, `available` when it is first or its predecessor
/// is completed, and `locked` otherwise. Attempts for sets outside `sets` are
/// ignored, as are draft sets.
#[must_use]
pub fn resolve_progress(sets: &[QuestionSet], attempts: &[Attempt]) -> Vec<SetProgress> {
    let ordered = ordered_active_sets(sets);

    let mut history: HashMap<QuestionSetId, SetHistory<'_>> = ordered
        .iter()
        .map(|s| (s.id(), SetHistory::default()))
        .collect();

    for attempt in attempts {
        let Some(entry) = history.get_mut(&attempt.question_set_id()) else {
            continue;
        };
        match attempt.status() {
            AttemptStatus::Submitted => {
                let newer = entry.latest_submitted.is_none_or(|cur| {
                    (attempt.submitted_at(), attempt.id()) > (cur.submitted_at(), cur.id())
                });
                if newer {
                    entry.latest_submitted = Some(attempt);
                }
            }
            AttemptStatus::InProgress => {
                let newer = entry.open.is_none_or(|cur| {
                    (attempt.started_at(), attempt.id()) > (cur.started_at(), cur.id())
                });
                if newer {
                    entry.open = Some(attempt);
                }
            }
        }
    }

    let mut out = Vec::with_capacity(ordered.len());
    let mut previous: Option<ProgressStatus> = None;

    for set in ordered {
        let entry = history.remove(&set.id()).unwrap_or_default();
        let open_attempt_id = entry.open.map(Attempt::id);

        let (status, score, attempt_id, completed_at) = if let Some(done) = entry.latest_submitted
        {
            (
                ProgressStatus::Completed,
                done.score().map(|s| s.percentage()),
                Some(done.id()),
                done.submitted_at(),
            )
        } else if let Some(open) = entry.open {
            (ProgressStatus::InProgress, None, Some(open.id()), None)
        } else if matches!(previous, None | Some(ProgressStatus::Completed)) {
            (ProgressStatus::Available, None, None, None)
        } else {
            (ProgressStatus::Locked, None, None, None)
        };

        out.push(SetProgress {
            question_set_id: set.id(),
            status,
            total_questions: set.question_count(),
            score,
            attempt_id,
            open_attempt_id,
            completed_at,
        });
        previous = Some(status);
    }

    out
}

//
// ─── STATS ─────────────────────────────────────────────────────────────────────
//

/// Aggregate figures for a student dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    pub completed_quizzes: usize,
    pub total_quizzes: usize,
    /// Rounded mean percentage over completed sets.
    pub average_score: u8,
    /// Completed sets in an unbroken run from the first set.
    pub current_streak: usize,
}

impl StudentStats {
    #[must_use]
    pub fn from_progress(progress: &[SetProgress]) -> Self {
        let scores: Vec<u64> = progress
            .iter()
            .filter(|p| p.status == ProgressStatus::Completed)
            .map(|p| u64::from(p.score.unwrap_or(0)))
            .collect();

        let average_score = if scores.is_empty() {
            0
        } else {
            let n = scores.len() as u64;
            let sum: u64 = scores.iter().sum();
            u8::try_from((2 * sum + n) / (2 * n)).unwrap_or(100)
        };

        let current_streak = progress
            .iter()
            .take_while(|p| p.status == ProgressStatus::Completed)
            .count();

        Self {
            completed_quizzes: scores.len(),
            total_quizzes: progress.len(),
            average_score,
            current_streak,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AnswerOption, OptionId, Question, QuestionId, QuestionKind, SetStatus, UserId,
    };
    use crate::scoring::fixtures;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn set(id: u64, sort_order: i64, status: SetStatus) -> QuestionSet {
        let q = Question::new(
            QuestionId::new(id * 100),
            "Q",
            QuestionKind::TrueFalse,
            vec![
                AnswerOption::new(OptionId::new(1), "True", true),
                AnswerOption::new(OptionId::new(2), "False", false),
            ],
        )
        .unwrap();
        QuestionSet::new(
            QuestionSetId::new(id),
            format!("Week {id}"),
            None,
            sort_order,
            None,
            status,
            vec![q],
        )
        .unwrap()
    }

    fn catalog() -> Vec<QuestionSet> {
        vec![
            set(1, 1, SetStatus::Active),
            set(2, 2, SetStatus::Active),
            set(3, 3, SetStatus::Active),
        ]
    }

    fn open(id: u64, set_id: u64) -> Attempt {
        Attempt::start(
            AttemptId::new(id),
            UserId::new(1),
            QuestionSetId::new(set_id),
            fixed_now(),
        )
    }

    fn submitted(id: u64, set_id: u64, pct: u8, minutes: i64) -> Attempt {
        let mut a = open(id, set_id);
        let correct = u32::from(pct / 10);
        a.submit(
            fixtures::grading(correct, 10, pct, pct >= 70),
            fixed_now() + Duration::minutes(minutes),
        )
        .unwrap();
        a
    }

    fn statuses(progress: &[SetProgress]) -> Vec<ProgressStatus> {
        progress.iter().map(|p| p.status).collect()
    }

    #[test]
    fn fresh_student_sees_first_set_only() {
        let progress = resolve_progress(&catalog(), &[]);
        assert_eq!(
            statuses(&progress),
            vec![
                ProgressStatus::Available,
                ProgressStatus::Locked,
                ProgressStatus::Locked
            ]
        );
    }

    #[test]
    fn submitting_first_set_unlocks_second() {
        let progress = resolve_progress(&catalog(), &[submitted(1, 1, 80, 5)]);
        assert_eq!(
            statuses(&progress),
            vec![
                ProgressStatus::Completed,
                ProgressStatus::Available,
                ProgressStatus::Locked
            ]
        );
        assert_eq!(progress[0].score, Some(80));
        assert_eq!(progress[0].attempt_id, Some(AttemptId::new(1)));
    }

    #[test]
    fn open_attempt_marks_in_progress_and_keeps_next_locked() {
        let progress = resolve_progress(&catalog(), &[open(1, 1)]);
        assert_eq!(
            statuses(&progress),
            vec![
                ProgressStatus::InProgress,
                ProgressStatus::Locked,
                ProgressStatus::Locked
            ]
        );
        assert_eq!(progress[0].attempt_id, Some(AttemptId::new(1)));
    }

    #[test]
    fn ordering_follows_sort_order_not_id() {
        let sets = vec![set(1, 20, SetStatus::Active), set(2, 10, SetStatus::Active)];
        let progress = resolve_progress(&sets, &[]);
        assert_eq!(progress[0].question_set_id, QuestionSetId::new(2));
        assert_eq!(progress[0].status, ProgressStatus::Available);
        assert_eq!(progress[1].status, ProgressStatus::Locked);
    }

    #[test]
    fn draft_sets_are_invisible() {
        let sets = vec![
            set(1, 1, SetStatus::Draft),
            set(2, 2, SetStatus::Active),
        ];
        let progress = resolve_progress(&sets, &[submitted(1, 1, 100, 1)]);
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].question_set_id, QuestionSetId::new(2));
        assert_eq!(progress[0].status, ProgressStatus::Available);
    }

    #[test]
    fn unknown_set_attempts_are_ignored() {
        let progress = resolve_progress(&catalog(), &[submitted(9, 42, 100, 1)]);
        assert_eq!(progress[0].status, ProgressStatus::Available);
    }

    #[test]
    fn empty_catalog_yields_nothing() {
        assert!(resolve_progress(&[], &[open(1, 1)]).is_empty());
    }

    #[test]
    fn later_set_can_complete_without_unlocking_gaps() {
        // Set 2 submitted while set 1 is not: set 3 follows set 2.
        let progress = resolve_progress(&catalog(), &[submitted(1, 2, 90, 1)]);
        assert_eq!(
            statuses(&progress),
            vec![
                ProgressStatus::Available,
                ProgressStatus::Completed,
                ProgressStatus::Available
            ]
        );
    }

    #[test]
    fn retry_keeps_set_completed_and_reports_latest_score() {
        let attempts = vec![
            submitted(1, 1, 60, 1),
            submitted(2, 1, 90, 10),
            open(3, 1),
        ];
        let progress = resolve_progress(&catalog(), &attempts);
        assert_eq!(progress[0].status, ProgressStatus::Completed);
        assert_eq!(progress[0].score, Some(90));
        assert_eq!(progress[0].attempt_id, Some(AttemptId::new(2)));
        assert_eq!(progress[0].open_attempt_id, Some(AttemptId::new(3)));
        assert_eq!(progress[1].status, ProgressStatus::Available);
    }

    #[test]
    fn first_set_never_locked_and_completed_predecessor_unlocks() {
        let sets = catalog();
        let histories: Vec<Vec<Attempt>> = vec![
            vec![],
            vec![open(1, 1)],
            vec![submitted(1, 1, 10, 1)],
            vec![submitted(1, 1, 10, 1), submitted(2, 2, 10, 2)],
            vec![open(1, 2), submitted(2, 3, 50, 2)],
        ];
        for attempts in histories {
            let progress = resolve_progress(&sets, &attempts);
            assert_ne!(progress[0].status, ProgressStatus::Locked);
            for pair in progress.windows(2) {
                if pair[0].status == ProgressStatus::Completed {
                    assert_ne!(pair[1].status, ProgressStatus::Locked);
                }
            }
        }
    }

    #[test]
    fn stats_average_and_streak() {
        let attempts = vec![submitted(1, 1, 80, 1), submitted(2, 3, 75, 2)];
        let progress = resolve_progress(&catalog(), &attempts);
        let stats = StudentStats::from_progress(&progress);

        assert_eq!(stats.completed_quizzes, 2);
        assert_eq!(stats.total_quizzes, 3);
        assert_eq!(stats.average_score, 78);
        assert_eq!(stats.current_streak, 1);
    }

    #[test]
    fn stats_for_new_student_are_zero() {
        let progress = resolve_progress(&catalog(), &[]);
        let stats = StudentStats::from_progress(&progress);
        assert_eq!(stats.completed_quizzes, 0);
        assert_eq!(stats.average_score, 0);
        assert_eq!(stats.current_streak, 0);
        assert_eq!(stats.total_quizzes, 3);
    }
}
