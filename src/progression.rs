use crate::error::{ProgressionError, Result};
use crate::models::{LectureStatus, PromptType};

/// Score at or above which a mastery submission completes the lecture.
pub const MASTERY_THRESHOLD: f64 = 70.0;

/// Events a progress record can receive. Reflections carry their word count
/// (derived from content before the event is built); the mastery score event
/// carries the evaluated score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    Unlock,
    Start,
    Viewed,
    Reflection { prompt: PromptType, word_count: usize },
    MasteryScore { score: f64 },
}

impl ProgressEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Unlock => "unlock",
            ProgressEvent::Start => "start",
            ProgressEvent::Viewed => "viewed",
            ProgressEvent::Reflection { .. } => "reflection",
            ProgressEvent::MasteryScore { .. } => "mastery_score",
        }
    }
}

/// Result of applying one event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub next: LectureStatus,
    /// True only on the first entry into MASTERED; drives the write-once
    /// completion timestamp.
    pub newly_mastered: bool,
    /// True when the event refreshes the last-viewed timestamp.
    pub viewed: bool,
}

impl Transition {
    fn to(next: LectureStatus) -> Self {
        Transition {
            next,
            newly_mastered: false,
            viewed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MasteryOutcome {
    pub mastered: bool,
    pub next_status: LectureStatus,
}

/// Mastery gate: threshold 70, inclusive. Rejects scores outside [0,100].
pub fn evaluate_mastery(score: f64) -> Result<MasteryOutcome> {
    if !(0.0..=100.0).contains(&score) {
        return Err(ProgressionError::Validation(format!(
            "mastery score {score} outside 0..=100"
        )));
    }
    if score >= MASTERY_THRESHOLD {
        Ok(MasteryOutcome {
            mastered: true,
            next_status: LectureStatus::Mastered,
        })
    } else {
        Ok(MasteryOutcome {
            mastered: false,
            next_status: LectureStatus::InitialReflection,
        })
    }
}

/// Whitespace-delimited word count, the measure the word floors apply to.
pub fn count_words(content: &str) -> usize {
    content.split_whitespace().count()
}

/// Rejects a reflection shorter than its prompt type's floor.
pub fn check_word_count(prompt: PromptType, word_count: usize) -> Result<()> {
    let min = prompt.min_words();
    if word_count < min {
        return Err(ProgressionError::Validation(format!(
            "{prompt} reflection needs at least {min} words, got {word_count}"
        )));
    }
    Ok(())
}

fn sequence_error(current: LectureStatus, event: &ProgressEvent) -> ProgressionError {
    ProgressionError::Sequence(format!(
        "event '{}' not allowed from status '{current}'",
        event.name()
    ))
}

/// The progression state machine. Statuses only move forward, with two
/// exceptions: `viewed` is idempotent once WATCHED is reached, and a failed
/// mastery score cycles MASTERY_TESTING back to INITIAL_REFLECTION.
/// MASTERED is terminal.
pub fn transition(current: LectureStatus, event: &ProgressEvent) -> Result<Transition> {
    match *event {
        ProgressEvent::Unlock => match current {
            LectureStatus::Locked => Ok(Transition::to(LectureStatus::Ready)),
            _ => Err(sequence_error(current, event)),
        },
        ProgressEvent::Start => match current {
            LectureStatus::Ready => Ok(Transition::to(LectureStatus::Started)),
            _ => Err(sequence_error(current, event)),
        },
        ProgressEvent::Viewed => {
            let next = if current >= LectureStatus::Watched {
                current
            } else {
                LectureStatus::Watched
            };
            Ok(Transition {
                next,
                newly_mastered: false,
                viewed: true,
            })
        }
        ProgressEvent::Reflection { prompt, word_count } => {
            check_word_count(prompt, word_count)?;
            match prompt {
                PromptType::PreLecture | PromptType::Initial => match current {
                    LectureStatus::Watched => Ok(Transition::to(LectureStatus::InitialReflection)),
                    _ => Err(sequence_error(current, event)),
                },
                PromptType::Mastery => match current {
                    LectureStatus::InitialReflection | LectureStatus::MasteryTesting => {
                        Ok(Transition::to(LectureStatus::MasteryTesting))
                    }
                    _ => Err(sequence_error(current, event)),
                },
                PromptType::Discussion => {
                    if current >= LectureStatus::Watched {
                        Ok(Transition::to(current))
                    } else {
                        Err(sequence_error(current, event))
                    }
                }
            }
        }
        ProgressEvent::MasteryScore { score } => {
            let eligible = matches!(
                current,
                LectureStatus::Watched
                    | LectureStatus::InitialReflection
                    | LectureStatus::MasteryTesting
                    | LectureStatus::Mastered
            );
            if !eligible {
                return Err(sequence_error(current, event));
            }
            let outcome = evaluate_mastery(score)?;
            if current == LectureStatus::Mastered {
                // Terminal: a retake score is recorded but never regresses.
                return Ok(Transition::to(LectureStatus::Mastered));
            }
            Ok(Transition {
                next: outcome.next_status,
                newly_mastered: outcome.mastered,
                viewed: false,
            })
        }
    }
}

/// Status shown (and transitioned from) when no progress row exists yet:
/// READY if the readiness gate is satisfied, LOCKED otherwise.
pub fn effective_status(stored: Option<LectureStatus>, gate_satisfied: bool) -> LectureStatus {
    match stored {
        Some(status) => status,
        None if gate_satisfied => LectureStatus::Ready,
        None => LectureStatus::Locked,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reflection(prompt: PromptType, word_count: usize) -> ProgressEvent {
        ProgressEvent::Reflection { prompt, word_count }
    }

    #[test]
    fn happy_path_reaches_mastered() {
        let mut status = LectureStatus::Locked;
        let events = [
            ProgressEvent::Unlock,
            ProgressEvent::Start,
            ProgressEvent::Viewed,
            reflection(PromptType::Initial, 40),
            reflection(PromptType::Mastery, 60),
            ProgressEvent::MasteryScore { score: 85.0 },
        ];
        for event in &events {
            status = transition(status, event).unwrap().next;
        }
        assert_eq!(status, LectureStatus::Mastered);
    }

    #[test]
    fn failed_mastery_returns_to_initial_reflection() {
        let result =
            transition(LectureStatus::MasteryTesting, &ProgressEvent::MasteryScore { score: 69.9 })
                .unwrap();
        assert_eq!(result.next, LectureStatus::InitialReflection);
        assert!(!result.newly_mastered);
    }

    #[test]
    fn threshold_is_inclusive() {
        let result =
            transition(LectureStatus::MasteryTesting, &ProgressEvent::MasteryScore { score: 70.0 })
                .unwrap();
        assert_eq!(result.next, LectureStatus::Mastered);
        assert!(result.newly_mastered);
    }

    #[test]
    fn retry_cycle_allows_resubmitting_mastery_reflection() {
        let failed =
            transition(LectureStatus::MasteryTesting, &ProgressEvent::MasteryScore { score: 40.0 })
                .unwrap();
        assert_eq!(failed.next, LectureStatus::InitialReflection);
        let retried = transition(failed.next, &reflection(PromptType::Mastery, 55)).unwrap();
        assert_eq!(retried.next, LectureStatus::MasteryTesting);
    }

    #[test]
    fn mastered_is_terminal() {
        let result =
            transition(LectureStatus::Mastered, &ProgressEvent::MasteryScore { score: 10.0 })
                .unwrap();
        assert_eq!(result.next, LectureStatus::Mastered);
        assert!(!result.newly_mastered);
    }

    #[test]
    fn score_outside_domain_is_rejected() {
        for score in [-0.1, 100.1] {
            let err =
                transition(LectureStatus::MasteryTesting, &ProgressEvent::MasteryScore { score })
                    .unwrap_err();
            assert!(matches!(err, ProgressionError::Validation(_)));
        }
    }

    #[test]
    fn mastery_score_while_locked_is_a_sequence_error() {
        let err = transition(LectureStatus::Locked, &ProgressEvent::MasteryScore { score: 90.0 })
            .unwrap_err();
        assert!(matches!(err, ProgressionError::Sequence(_)));
    }

    #[test]
    fn mastery_score_allowed_straight_from_watched() {
        let result =
            transition(LectureStatus::Watched, &ProgressEvent::MasteryScore { score: 75.0 })
                .unwrap();
        assert_eq!(result.next, LectureStatus::Mastered);
    }

    #[test]
    fn viewed_is_idempotent_past_watched() {
        for status in [
            LectureStatus::Watched,
            LectureStatus::InitialReflection,
            LectureStatus::MasteryTesting,
            LectureStatus::Mastered,
        ] {
            let result = transition(status, &ProgressEvent::Viewed).unwrap();
            assert_eq!(result.next, status);
            assert!(result.viewed);
        }
    }

    #[test]
    fn viewed_advances_early_stages_to_watched() {
        for status in [
            LectureStatus::Locked,
            LectureStatus::Ready,
            LectureStatus::Started,
        ] {
            let result = transition(status, &ProgressEvent::Viewed).unwrap();
            assert_eq!(result.next, LectureStatus::Watched);
        }
    }

    #[test]
    fn short_reflections_are_rejected() {
        let err = transition(LectureStatus::Watched, &reflection(PromptType::Initial, 29))
            .unwrap_err();
        assert!(matches!(err, ProgressionError::Validation(_)));

        let err = transition(
            LectureStatus::InitialReflection,
            &reflection(PromptType::Mastery, 49),
        )
        .unwrap_err();
        assert!(matches!(err, ProgressionError::Validation(_)));
    }

    #[test]
    fn discussion_has_no_floor_and_no_transition() {
        let result =
            transition(LectureStatus::MasteryTesting, &reflection(PromptType::Discussion, 1))
                .unwrap();
        assert_eq!(result.next, LectureStatus::MasteryTesting);
    }

    #[test]
    fn discussion_before_watching_is_out_of_order() {
        let err = transition(LectureStatus::Started, &reflection(PromptType::Discussion, 5))
            .unwrap_err();
        assert!(matches!(err, ProgressionError::Sequence(_)));
    }

    #[test]
    fn unlock_only_from_locked() {
        assert!(transition(LectureStatus::Locked, &ProgressEvent::Unlock).is_ok());
        for status in [
            LectureStatus::Ready,
            LectureStatus::Watched,
            LectureStatus::Mastered,
        ] {
            let err = transition(status, &ProgressEvent::Unlock).unwrap_err();
            assert!(matches!(err, ProgressionError::Sequence(_)));
        }
    }

    #[test]
    fn count_words_splits_on_any_whitespace() {
        assert_eq!(count_words("the unexamined  life\nis not worth living"), 7);
        assert_eq!(count_words("   "), 0);
    }

    #[test]
    fn effective_status_derives_from_gate() {
        assert_eq!(effective_status(None, true), LectureStatus::Ready);
        assert_eq!(effective_status(None, false), LectureStatus::Locked);
        assert_eq!(
            effective_status(Some(LectureStatus::Watched), false),
            LectureStatus::Watched
        );
    }
}
