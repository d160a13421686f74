use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    EntityKind, EntityRecord, LectureRecord, LectureStatus, PrerequisiteStanding, ProgressRecord,
    PromptType, Role, UserRecord,
};
use crate::readiness;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn fetch_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let row = sqlx::query(
        "SELECT id, full_name, email, role FROM lecture_progression.users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(UserRecord {
            id: row.get("id"),
            full_name: row.get("full_name"),
            email: row.get("email"),
            role: Role::from_code(row.get::<String, _>("role").as_str())?,
        })),
        None => Ok(None),
    }
}

pub async fn fetch_lecture_by_slug(pool: &PgPool, slug: &str) -> Result<Option<LectureRecord>> {
    let row = sqlx::query(
        "SELECT id, slug, title, position FROM lecture_progression.lectures WHERE slug = $1",
    )
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| LectureRecord {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        position: row.get("position"),
    }))
}

pub async fn fetch_lectures(pool: &PgPool) -> Result<Vec<LectureRecord>> {
    let rows = sqlx::query(
        "SELECT id, slug, title, position FROM lecture_progression.lectures ORDER BY position",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| LectureRecord {
            id: row.get("id"),
            slug: row.get("slug"),
            title: row.get("title"),
            position: row.get("position"),
        })
        .collect())
}

pub async fn fetch_progress(
    pool: &PgPool,
    user_id: Uuid,
    lecture_id: Uuid,
) -> Result<Option<ProgressRecord>> {
    let row = sqlx::query(
        "SELECT user_id, lecture_id, status, created_at, last_viewed, completed_at \
         FROM lecture_progression.progress \
         WHERE user_id = $1 AND lecture_id = $2",
    )
    .bind(user_id)
    .bind(lecture_id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(ProgressRecord {
            user_id: row.get("user_id"),
            lecture_id: row.get("lecture_id"),
            status: LectureStatus::from_code(row.get::<String, _>("status").as_str())?,
            created_at: row.get("created_at"),
            last_viewed: row.get("last_viewed"),
            completed_at: row.get("completed_at"),
        })),
        None => Ok(None),
    }
}

/// Single write per transition. `last_viewed` only moves forward when the
/// event carries a view; `completed_at` is write-once via COALESCE on the
/// existing row.
pub async fn upsert_progress(
    pool: &PgPool,
    user_id: Uuid,
    lecture_id: Uuid,
    status: LectureStatus,
    last_viewed: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO lecture_progression.progress
        (user_id, lecture_id, status, created_at, last_viewed, completed_at)
        VALUES ($1, $2, $3, NOW(), $4, $5)
        ON CONFLICT (user_id, lecture_id) DO UPDATE
        SET status = EXCLUDED.status,
            last_viewed = COALESCE(EXCLUDED.last_viewed, progress.last_viewed),
            completed_at = COALESCE(progress.completed_at, EXCLUDED.completed_at)
        "#,
    )
    .bind(user_id)
    .bind(lecture_id)
    .bind(status.as_code())
    .bind(last_viewed)
    .bind(completed_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_prerequisite_standings(
    pool: &PgPool,
    lecture_id: Uuid,
    user_id: Uuid,
) -> Result<Vec<PrerequisiteStanding>> {
    let rows = sqlx::query(
        r#"
        SELECT l.slug AS prerequisite_slug, p.is_required, p.importance_level,
               COALESCE(pr.status = 'mastered', FALSE) AS satisfied
        FROM lecture_progression.lecture_prerequisites p
        JOIN lecture_progression.lectures l ON l.id = p.prerequisite_id
        LEFT JOIN lecture_progression.progress pr
          ON pr.lecture_id = p.prerequisite_id AND pr.user_id = $2
        WHERE p.lecture_id = $1
        ORDER BY l.position
        "#,
    )
    .bind(lecture_id)
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| PrerequisiteStanding {
            prerequisite_slug: row.get("prerequisite_slug"),
            required: row.get("is_required"),
            importance: row.get("importance_level"),
            satisfied: row.get("satisfied"),
        })
        .collect())
}

pub async fn fetch_prerequisite_edges(pool: &PgPool) -> Result<Vec<(Uuid, Uuid)>> {
    let rows = sqlx::query(
        "SELECT lecture_id, prerequisite_id FROM lecture_progression.lecture_prerequisites",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("lecture_id"), row.get("prerequisite_id")))
        .collect())
}

pub async fn upsert_prerequisite(
    pool: &PgPool,
    lecture_id: Uuid,
    prerequisite_id: Uuid,
    is_required: bool,
    importance_level: i32,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO lecture_progression.lecture_prerequisites
        (lecture_id, prerequisite_id, is_required, importance_level)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (lecture_id, prerequisite_id) DO UPDATE
        SET is_required = EXCLUDED.is_required,
            importance_level = EXCLUDED.importance_level
        "#,
    )
    .bind(lecture_id)
    .bind(prerequisite_id)
    .bind(is_required)
    .bind(importance_level)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn insert_reflection(
    pool: &PgPool,
    user_id: Uuid,
    lecture_id: Uuid,
    prompt: PromptType,
    content: &str,
    word_count: usize,
) -> Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO lecture_progression.reflections
        (id, user_id, lecture_id, prompt_type, content, word_count, submitted_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW())
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(lecture_id)
    .bind(prompt.as_code())
    .bind(content)
    .bind(word_count as i32)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

/// Attaches an evaluated score (and optional AI-evaluation payload) to the
/// user's most recent mastery reflection for the lecture. Returns false when
/// no mastery reflection exists yet, which is legal: a score may arrive
/// straight from WATCHED.
pub async fn attach_mastery_score(
    pool: &PgPool,
    user_id: Uuid,
    lecture_id: Uuid,
    score: f64,
    evaluation: Option<&serde_json::Value>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE lecture_progression.reflections
        SET score = $1, evaluation = $2
        WHERE id = (
            SELECT id FROM lecture_progression.reflections
            WHERE user_id = $3 AND lecture_id = $4 AND prompt_type = 'mastery'
            ORDER BY submitted_at DESC
            LIMIT 1
        )
        "#,
    )
    .bind(score)
    .bind(evaluation)
    .bind(user_id)
    .bind(lecture_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn upsert_user(
    pool: &PgPool,
    id: Uuid,
    full_name: &str,
    email: &str,
    role: Role,
) -> Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO lecture_progression.users (id, full_name, email, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name, role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(id)
    .bind(full_name)
    .bind(email)
    .bind(role.as_code())
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

pub async fn upsert_lecture(
    pool: &PgPool,
    id: Uuid,
    slug: &str,
    title: &str,
    position: i32,
) -> Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO lecture_progression.lectures (id, slug, title, position)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (slug) DO UPDATE
        SET title = EXCLUDED.title, position = EXCLUDED.position
        RETURNING id
        "#,
    )
    .bind(id)
    .bind(slug)
    .bind(title)
    .bind(position)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

pub async fn upsert_entity(
    pool: &PgPool,
    kind: EntityKind,
    name: &str,
    era: Option<&str>,
    summary: Option<&str>,
) -> Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO lecture_progression.entities (id, kind, name, era, summary)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (kind, name) DO UPDATE
        SET era = COALESCE(EXCLUDED.era, entities.era),
            summary = COALESCE(EXCLUDED.summary, entities.summary)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(kind.as_code())
    .bind(name)
    .bind(era)
    .bind(summary)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

pub async fn fetch_entity(
    pool: &PgPool,
    kind: EntityKind,
    name: &str,
) -> Result<Option<EntityRecord>> {
    let row = sqlx::query(
        "SELECT id, kind, name, era, summary FROM lecture_progression.entities \
         WHERE kind = $1 AND name = $2",
    )
    .bind(kind.as_code())
    .bind(name)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(EntityRecord {
            id: row.get("id"),
            kind: EntityKind::from_code(row.get::<String, _>("kind").as_str())?,
            name: row.get("name"),
            era: row.get("era"),
            summary: row.get("summary"),
        })),
        None => Ok(None),
    }
}

pub async fn insert_entity_relation(
    pool: &PgPool,
    from_entity: Uuid,
    to_entity: Uuid,
    relation: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO lecture_progression.entity_relations (id, from_entity, to_entity, relation)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (from_entity, to_entity, relation) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(from_entity)
    .bind(to_entity)
    .bind(relation)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn link_lecture_entity(pool: &PgPool, lecture_id: Uuid, entity_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO lecture_progression.lecture_entities (lecture_id, entity_id)
        VALUES ($1, $2)
        ON CONFLICT (lecture_id, entity_id) DO NOTHING
        "#,
    )
    .bind(lecture_id)
    .bind(entity_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let users = vec![
        (
            Uuid::parse_str("b1f5e6a0-4c2d-4e8a-9f3b-0d6c1a2b3c4d")?,
            "Iris Calloway",
            "iris.calloway@philosophia.edu",
            Role::Admin,
        ),
        (
            Uuid::parse_str("5a9d2c71-83fe-4b62-9a57-1c0d8e4f6a2b")?,
            "Noah Vance",
            "noah.vance@philosophia.edu",
            Role::Student,
        ),
        (
            Uuid::parse_str("c3e8f0d2-6b14-47a9-8c35-9e7a5b1d2f60")?,
            "Priya Raman",
            "priya.raman@philosophia.edu",
            Role::Student,
        ),
    ];

    for (id, full_name, email, role) in users {
        upsert_user(pool, id, full_name, email, role).await?;
    }

    let lectures = vec![
        (
            Uuid::parse_str("1f0a3b58-7c2e-4d91-b6a4-8e5f0c3d7a19")?,
            "intro-socratic-method",
            "The Socratic Method",
            1,
        ),
        (
            Uuid::parse_str("2d7b9c40-5e1a-4f83-a2c6-7b9d0e4f1a35")?,
            "plato-forms",
            "Plato and the Theory of Forms",
            2,
        ),
        (
            Uuid::parse_str("3c5e8d12-9a4b-4c70-8f2e-6d1a7b3c9e58")?,
            "aristotle-ethics",
            "Aristotle's Virtue Ethics",
            3,
        ),
        (
            Uuid::parse_str("4b9a7e36-2d8c-4a15-9e60-3f7c5d2b8a41")?,
            "stoicism-epictetus",
            "Stoic Practice in Epictetus",
            4,
        ),
    ];

    for (id, slug, title, position) in lectures {
        upsert_lecture(pool, id, slug, title, position).await?;
    }

    let prerequisites = vec![
        ("plato-forms", "intro-socratic-method", true, 5),
        ("aristotle-ethics", "plato-forms", true, 4),
        ("aristotle-ethics", "intro-socratic-method", false, 2),
        ("stoicism-epictetus", "aristotle-ethics", false, 3),
    ];

    for (lecture_slug, prerequisite_slug, is_required, importance) in prerequisites {
        let lecture = fetch_lecture_by_slug(pool, lecture_slug)
            .await?
            .context("seed lecture missing")?;
        let prerequisite = fetch_lecture_by_slug(pool, prerequisite_slug)
            .await?
            .context("seed prerequisite missing")?;
        upsert_prerequisite(pool, lecture.id, prerequisite.id, is_required, importance).await?;
    }

    let entities = vec![
        (EntityKind::Philosopher, "Socrates", Some("470-399 BC")),
        (EntityKind::Philosopher, "Plato", Some("428-348 BC")),
        (EntityKind::Philosopher, "Aristotle", Some("384-322 BC")),
        (EntityKind::Philosopher, "Epictetus", Some("c. 50-135")),
        (EntityKind::Concept, "Theory of Forms", None),
        (EntityKind::Concept, "Virtue Ethics", None),
    ];

    for (kind, name, era) in entities {
        upsert_entity(pool, kind, name, era, None).await?;
    }

    let relations = vec![
        (EntityKind::Philosopher, "Socrates", EntityKind::Philosopher, "Plato", "influenced"),
        (EntityKind::Philosopher, "Plato", EntityKind::Philosopher, "Aristotle", "influenced"),
        (EntityKind::Philosopher, "Plato", EntityKind::Concept, "Theory of Forms", "formulated"),
        (EntityKind::Philosopher, "Aristotle", EntityKind::Concept, "Virtue Ethics", "formulated"),
        (EntityKind::Philosopher, "Aristotle", EntityKind::Concept, "Theory of Forms", "critiques"),
    ];

    for (from_kind, from_name, to_kind, to_name, relation) in relations {
        let from = fetch_entity(pool, from_kind, from_name)
            .await?
            .context("seed entity missing")?;
        let to = fetch_entity(pool, to_kind, to_name)
            .await?
            .context("seed entity missing")?;
        insert_entity_relation(pool, from.id, to.id, relation).await?;
    }

    let tags = vec![
        ("intro-socratic-method", EntityKind::Philosopher, "Socrates"),
        ("plato-forms", EntityKind::Philosopher, "Plato"),
        ("plato-forms", EntityKind::Concept, "Theory of Forms"),
        ("aristotle-ethics", EntityKind::Philosopher, "Aristotle"),
        ("aristotle-ethics", EntityKind::Concept, "Virtue Ethics"),
        ("stoicism-epictetus", EntityKind::Philosopher, "Epictetus"),
    ];

    for (lecture_slug, kind, name) in tags {
        let lecture = fetch_lecture_by_slug(pool, lecture_slug)
            .await?
            .context("seed lecture missing")?;
        let entity = fetch_entity(pool, kind, name)
            .await?
            .context("seed entity missing")?;
        link_lecture_entity(pool, lecture.id, entity.id).await?;
    }

    Ok(())
}

/// Imports a curriculum definition: one row per lecture, optionally carrying
/// a prerequisite edge. Upserts keyed on slug; returns (lectures, edges)
/// inserted or updated. Rows are processed in order, so a prerequisite must
/// appear before (or already exist when) the rows that depend on it.
pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<(usize, usize)> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        slug: String,
        title: String,
        position: i32,
        prerequisite_slug: Option<String>,
        is_required: Option<bool>,
        importance_level: Option<i32>,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut edges = fetch_prerequisite_edges(pool).await?;
    let mut lectures = 0usize;
    let mut edge_count = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2; // header is line 1
        let row = result.with_context(|| format!("invalid row at line {line}"))?;

        let lecture_id =
            upsert_lecture(pool, Uuid::new_v4(), &row.slug, &row.title, row.position).await?;
        lectures += 1;

        let Some(prerequisite_slug) = row.prerequisite_slug else {
            continue;
        };
        if prerequisite_slug.trim().is_empty() {
            continue;
        }

        let importance = row.importance_level.unwrap_or(1);
        if !(1..=5).contains(&importance) {
            bail!("line {line}: importance_level {importance} outside 1..=5");
        }
        let prerequisite = fetch_lecture_by_slug(pool, &prerequisite_slug)
            .await?
            .with_context(|| {
                format!("line {line}: prerequisite lecture '{prerequisite_slug}' not found")
            })?;
        if readiness::creates_cycle(&edges, lecture_id, prerequisite.id) {
            bail!(
                "line {line}: prerequisite '{prerequisite_slug}' would make the curriculum cyclic"
            );
        }

        upsert_prerequisite(
            pool,
            lecture_id,
            prerequisite.id,
            row.is_required.unwrap_or(true),
            importance,
        )
        .await?;
        edges.push((lecture_id, prerequisite.id));
        edge_count += 1;
    }

    Ok((lectures, edge_count))
}
