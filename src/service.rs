use chrono::Utc;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::db;
use crate::error::{ProgressionError, Result};
use crate::models::{
    CatalogRow, EntityKind, LectureRecord, LectureStatus, PrerequisiteStanding, PromptType,
    ReadinessReport, UserContext, UserRecord,
};
use crate::progression::{self, ProgressEvent};
use crate::readiness;

/// Inbound events as the caller hands them over; word counts and score
/// checks are derived here before the state machine runs.
#[derive(Debug)]
pub enum EventRequest<'a> {
    Unlock,
    Start,
    Viewed,
    Reflection {
        prompt: PromptType,
        content: &'a str,
    },
    MasteryScore {
        score: f64,
        evaluation: Option<serde_json::Value>,
    },
}

fn authorize_subject(actor: &UserContext, subject: &UserRecord) -> Result<()> {
    if actor.is_admin() || actor.user_id == subject.id {
        Ok(())
    } else {
        Err(ProgressionError::Forbidden(format!(
            "only {} or an admin may act on this progress",
            subject.email
        )))
    }
}

fn require_admin(actor: &UserContext) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(ProgressionError::Forbidden(
            "admin role required".to_string(),
        ))
    }
}

pub async fn resolve_user(pool: &PgPool, email: &str) -> Result<UserRecord> {
    db::fetch_user_by_email(pool, email)
        .await?
        .ok_or_else(|| ProgressionError::NotFound(format!("no user with email '{email}'")))
}

async fn resolve_lecture(pool: &PgPool, slug: &str) -> Result<LectureRecord> {
    db::fetch_lecture_by_slug(pool, slug)
        .await?
        .ok_or_else(|| ProgressionError::NotFound(format!("no lecture with slug '{slug}'")))
}

/// Readiness report plus the per-prerequisite standings it was computed
/// from, for display.
pub async fn get_readiness(
    pool: &PgPool,
    actor: &UserContext,
    subject: &UserRecord,
    lecture_slug: &str,
) -> Result<(ReadinessReport, Vec<PrerequisiteStanding>)> {
    authorize_subject(actor, subject)?;
    let lecture = resolve_lecture(pool, lecture_slug).await?;
    let standings = db::fetch_prerequisite_standings(pool, lecture.id, subject.id).await?;
    let report = readiness::compute_readiness(&standings);
    Ok((report, standings))
}

/// Current workflow status, derived from the readiness gate when no
/// progress row has been materialized yet.
pub async fn get_status(
    pool: &PgPool,
    actor: &UserContext,
    subject: &UserRecord,
    lecture_slug: &str,
) -> Result<LectureStatus> {
    authorize_subject(actor, subject)?;
    let lecture = resolve_lecture(pool, lecture_slug).await?;
    let standings = db::fetch_prerequisite_standings(pool, lecture.id, subject.id).await?;
    let gate = readiness::compute_readiness(&standings);
    let stored = db::fetch_progress(pool, subject.id, lecture.id).await?;
    Ok(progression::effective_status(
        stored.map(|p| p.status),
        gate.satisfied,
    ))
}

/// Applies one progression event as a single read-modify-write. Concurrent
/// submissions for the same (user, lecture) pair are last-write-wins; there
/// is no application-level serialization.
pub async fn apply_event(
    pool: &PgPool,
    actor: &UserContext,
    subject: &UserRecord,
    lecture_slug: &str,
    request: EventRequest<'_>,
) -> Result<LectureStatus> {
    authorize_subject(actor, subject)?;
    let lecture = resolve_lecture(pool, lecture_slug).await?;
    let standings = db::fetch_prerequisite_standings(pool, lecture.id, subject.id).await?;
    let gate = readiness::compute_readiness(&standings);
    let stored = db::fetch_progress(pool, subject.id, lecture.id).await?;
    let current = progression::effective_status(stored.map(|p| p.status), gate.satisfied);

    if matches!(&request, EventRequest::Unlock) && !gate.satisfied {
        return Err(ProgressionError::Sequence(format!(
            "required prerequisites for '{}' are not yet mastered",
            lecture.slug
        )));
    }

    let event = match &request {
        EventRequest::Unlock => ProgressEvent::Unlock,
        EventRequest::Start => ProgressEvent::Start,
        EventRequest::Viewed => ProgressEvent::Viewed,
        EventRequest::Reflection { prompt, content } => ProgressEvent::Reflection {
            prompt: *prompt,
            word_count: progression::count_words(content),
        },
        EventRequest::MasteryScore { score, .. } => ProgressEvent::MasteryScore { score: *score },
    };

    let outcome = progression::transition(current, &event)?;

    let now = Utc::now();
    let last_viewed = outcome.viewed.then_some(now);
    let completed_at = outcome.newly_mastered.then_some(now);
    db::upsert_progress(
        pool,
        subject.id,
        lecture.id,
        outcome.next,
        last_viewed,
        completed_at,
    )
    .await?;

    match request {
        EventRequest::Reflection { prompt, content } => {
            let word_count = progression::count_words(content);
            db::insert_reflection(pool, subject.id, lecture.id, prompt, content, word_count)
                .await?;
        }
        EventRequest::MasteryScore { score, evaluation } => {
            db::attach_mastery_score(pool, subject.id, lecture.id, score, evaluation.as_ref())
                .await?;
        }
        _ => {}
    }

    info!(
        user = %subject.email,
        lecture = %lecture.slug,
        event = event.name(),
        from = %current,
        to = %outcome.next,
        "applied progress event"
    );
    Ok(outcome.next)
}

/// Per-user listing of every lecture with effective status and readiness.
pub async fn catalog(
    pool: &PgPool,
    actor: &UserContext,
    subject: &UserRecord,
) -> Result<Vec<CatalogRow>> {
    authorize_subject(actor, subject)?;
    let lectures = db::fetch_lectures(pool).await?;
    let mut rows = Vec::with_capacity(lectures.len());

    for lecture in lectures {
        let standings = db::fetch_prerequisite_standings(pool, lecture.id, subject.id).await?;
        let gate = readiness::compute_readiness(&standings);
        let stored = db::fetch_progress(pool, subject.id, lecture.id).await?;
        let status = progression::effective_status(stored.map(|p| p.status), gate.satisfied);
        rows.push(CatalogRow {
            slug: lecture.slug,
            title: lecture.title,
            position: lecture.position,
            status,
            readiness: gate,
        });
    }

    Ok(rows)
}

pub async fn add_entity(
    pool: &PgPool,
    actor: &UserContext,
    kind: EntityKind,
    name: &str,
    era: Option<&str>,
    summary: Option<&str>,
) -> Result<Uuid> {
    require_admin(actor)?;
    if name.trim().is_empty() {
        return Err(ProgressionError::Validation(
            "entity name must not be empty".to_string(),
        ));
    }
    let id = db::upsert_entity(pool, kind, name, era, summary).await?;
    info!(%kind, name, "entity upserted");
    Ok(id)
}

async fn resolve_entity(pool: &PgPool, kind: EntityKind, name: &str) -> Result<Uuid> {
    db::fetch_entity(pool, kind, name)
        .await?
        .map(|entity| entity.id)
        .ok_or_else(|| ProgressionError::NotFound(format!("no {kind} named '{name}'")))
}

pub async fn relate_entities(
    pool: &PgPool,
    actor: &UserContext,
    from: (EntityKind, &str),
    to: (EntityKind, &str),
    relation: &str,
) -> Result<()> {
    require_admin(actor)?;
    if relation.trim().is_empty() {
        return Err(ProgressionError::Validation(
            "relation kind must not be empty".to_string(),
        ));
    }
    let from_id = resolve_entity(pool, from.0, from.1).await?;
    let to_id = resolve_entity(pool, to.0, to.1).await?;
    db::insert_entity_relation(pool, from_id, to_id, relation).await?;
    info!(from = from.1, to = to.1, relation, "entities related");
    Ok(())
}

pub async fn tag_lecture(
    pool: &PgPool,
    actor: &UserContext,
    lecture_slug: &str,
    kind: EntityKind,
    name: &str,
) -> Result<()> {
    require_admin(actor)?;
    let lecture = resolve_lecture(pool, lecture_slug).await?;
    let entity_id = resolve_entity(pool, kind, name).await?;
    db::link_lecture_entity(pool, lecture.id, entity_id).await?;
    info!(lecture = %lecture.slug, entity = name, "lecture tagged");
    Ok(())
}

/// Declares a prerequisite edge. Importance must sit in 1..=5 and the edge
/// must keep the prerequisite graph acyclic.
pub async fn add_prerequisite(
    pool: &PgPool,
    actor: &UserContext,
    lecture_slug: &str,
    prerequisite_slug: &str,
    is_required: bool,
    importance: i32,
) -> Result<()> {
    require_admin(actor)?;
    if !(1..=5).contains(&importance) {
        return Err(ProgressionError::Validation(format!(
            "importance level {importance} outside 1..=5"
        )));
    }
    let lecture = resolve_lecture(pool, lecture_slug).await?;
    let prerequisite = resolve_lecture(pool, prerequisite_slug).await?;
    let edges = db::fetch_prerequisite_edges(pool).await?;
    if readiness::creates_cycle(&edges, lecture.id, prerequisite.id) {
        return Err(ProgressionError::Validation(format!(
            "'{prerequisite_slug}' as a prerequisite of '{lecture_slug}' would make the curriculum cyclic"
        )));
    }
    db::upsert_prerequisite(pool, lecture.id, prerequisite.id, is_required, importance).await?;
    info!(
        lecture = %lecture.slug,
        prerequisite = %prerequisite.slug,
        is_required,
        importance,
        "prerequisite declared"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn user(id: Uuid, role: Role) -> UserRecord {
        UserRecord {
            id,
            full_name: "Noah Vance".to_string(),
            email: "noah.vance@philosophia.edu".to_string(),
            role,
        }
    }

    #[test]
    fn students_may_only_act_on_themselves() {
        let subject = user(Uuid::new_v4(), Role::Student);
        let own = subject.context();
        assert!(authorize_subject(&own, &subject).is_ok());

        let other = UserContext {
            user_id: Uuid::new_v4(),
            role: Role::Student,
        };
        let err = authorize_subject(&other, &subject).unwrap_err();
        assert!(matches!(err, ProgressionError::Forbidden(_)));
    }

    #[test]
    fn admins_may_act_on_any_subject() {
        let subject = user(Uuid::new_v4(), Role::Student);
        let admin = UserContext {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };
        assert!(authorize_subject(&admin, &subject).is_ok());
        assert!(require_admin(&admin).is_ok());
    }

    #[test]
    fn admin_gate_rejects_students() {
        let student = UserContext {
            user_id: Uuid::new_v4(),
            role: Role::Student,
        };
        let err = require_admin(&student).unwrap_err();
        assert!(matches!(err, ProgressionError::Forbidden(_)));
    }
}
