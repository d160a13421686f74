use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod db;
mod error;
mod models;
mod progression;
mod readiness;
mod service;

use models::{EntityKind, PromptType, UserContext, UserRecord};
use service::EventRequest;

#[derive(Parser)]
#[command(name = "philosophia-progression")]
#[command(about = "Lecture progression tracker for the Philosophia curriculum", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a realistic starter curriculum
    Seed,
    /// Import lectures and prerequisite edges from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List every lecture with this user's status and readiness
    Catalog {
        #[arg(long)]
        email: String,
    },
    /// Show this user's workflow status for one lecture
    Status {
        #[arg(long)]
        email: String,
        #[arg(long)]
        lecture: String,
    },
    /// Show the prerequisite readiness breakdown for one lecture
    Readiness {
        #[arg(long)]
        email: String,
        #[arg(long)]
        lecture: String,
    },
    /// Unlock a lecture whose required prerequisites are mastered
    Unlock {
        #[arg(long)]
        email: String,
        #[arg(long)]
        lecture: String,
        #[arg(long)]
        actor: Option<String>,
    },
    /// Mark a lecture as started
    Start {
        #[arg(long)]
        email: String,
        #[arg(long)]
        lecture: String,
        #[arg(long)]
        actor: Option<String>,
    },
    /// Record a lecture view
    View {
        #[arg(long)]
        email: String,
        #[arg(long)]
        lecture: String,
        #[arg(long)]
        actor: Option<String>,
    },
    /// Submit a reflection (pre_lecture, initial, mastery, or discussion)
    #[command(group(
        ArgGroup::new("source")
            .args(["content", "file"])
            .required(true)
            .multiple(false)
    ))]
    Reflect {
        #[arg(long)]
        email: String,
        #[arg(long)]
        lecture: String,
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        actor: Option<String>,
    },
    /// Record an evaluated mastery score for a lecture
    SubmitScore {
        #[arg(long)]
        email: String,
        #[arg(long)]
        lecture: String,
        #[arg(long)]
        score: f64,
        /// JSON file with the evaluator's full payload
        #[arg(long)]
        evaluation: Option<PathBuf>,
        #[arg(long)]
        actor: Option<String>,
    },
    /// Create or update a philosophical entity (admin)
    AddEntity {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        kind: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        era: Option<String>,
        #[arg(long)]
        summary: Option<String>,
    },
    /// Relate two entities (admin)
    Relate {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        from_kind: String,
        #[arg(long)]
        from_name: String,
        #[arg(long)]
        to_kind: String,
        #[arg(long)]
        to_name: String,
        #[arg(long)]
        relation: String,
    },
    /// Tag a lecture with an entity it covers (admin)
    TagLecture {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        lecture: String,
        #[arg(long)]
        kind: String,
        #[arg(long)]
        name: String,
    },
    /// Declare a prerequisite edge between lectures (admin)
    AddPrerequisite {
        #[arg(long)]
        actor: String,
        #[arg(long)]
        lecture: String,
        #[arg(long)]
        prerequisite: String,
        /// Declare the edge as recommended instead of required
        #[arg(long)]
        recommended: bool,
        #[arg(long, default_value_t = 3)]
        importance: i32,
    },
}

async fn subject_and_actor(
    pool: &PgPool,
    email: &str,
    actor: Option<&str>,
) -> anyhow::Result<(UserRecord, UserContext)> {
    let subject = service::resolve_user(pool, email).await?;
    let actor = match actor {
        Some(actor_email) => service::resolve_user(pool, actor_email).await?.context(),
        None => subject.context(),
    };
    Ok((subject, actor))
}

async fn admin_context(pool: &PgPool, email: &str) -> anyhow::Result<UserContext> {
    Ok(service::resolve_user(pool, email).await?.context())
}

fn read_reflection(content: Option<String>, file: Option<PathBuf>) -> anyhow::Result<String> {
    match (content, file) {
        (Some(content), _) => Ok(content),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read reflection from {}", path.display())),
        (None, None) => unreachable!("clap group requires one source"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed curriculum inserted.");
        }
        Commands::Import { csv } => {
            let (lectures, edges) = db::import_csv(&pool, &csv).await?;
            println!(
                "Imported {lectures} lectures and {edges} prerequisite edges from {}.",
                csv.display()
            );
        }
        Commands::Catalog { email } => {
            let (subject, actor) = subject_and_actor(&pool, &email, None).await?;
            let rows = service::catalog(&pool, &actor, &subject).await?;
            println!("Lectures for {} ({}):", subject.full_name, subject.email);
            for row in rows {
                let gate = if row.readiness.satisfied { "open" } else { "gated" };
                println!(
                    "- {}. {} [{}] status {}, readiness {:.0}% ({})",
                    row.position, row.title, row.slug, row.status, row.readiness.score, gate
                );
            }
        }
        Commands::Status { email, lecture } => {
            let (subject, actor) = subject_and_actor(&pool, &email, None).await?;
            let status = service::get_status(&pool, &actor, &subject, &lecture).await?;
            println!("{} is at '{status}' for {lecture}.", subject.email);
        }
        Commands::Readiness { email, lecture } => {
            let (subject, actor) = subject_and_actor(&pool, &email, None).await?;
            let (report, standings) =
                service::get_readiness(&pool, &actor, &subject, &lecture).await?;
            println!(
                "Readiness for {lecture}: {:.0}% (required gate {}, 70% mark {})",
                report.score,
                if report.satisfied { "open" } else { "blocked" },
                if report.meets_threshold { "met" } else { "not met" }
            );
            for standing in standings {
                println!(
                    "- {} ({}, importance {}): {}",
                    standing.prerequisite_slug,
                    if standing.required { "required" } else { "recommended" },
                    standing.importance,
                    if standing.satisfied { "mastered" } else { "outstanding" }
                );
            }
        }
        Commands::Unlock {
            email,
            lecture,
            actor,
        } => {
            let (subject, actor) = subject_and_actor(&pool, &email, actor.as_deref()).await?;
            let status =
                service::apply_event(&pool, &actor, &subject, &lecture, EventRequest::Unlock)
                    .await?;
            println!("{} is now '{status}' for {lecture}.", subject.email);
        }
        Commands::Start {
            email,
            lecture,
            actor,
        } => {
            let (subject, actor) = subject_and_actor(&pool, &email, actor.as_deref()).await?;
            let status =
                service::apply_event(&pool, &actor, &subject, &lecture, EventRequest::Start)
                    .await?;
            println!("{} is now '{status}' for {lecture}.", subject.email);
        }
        Commands::View {
            email,
            lecture,
            actor,
        } => {
            let (subject, actor) = subject_and_actor(&pool, &email, actor.as_deref()).await?;
            let status =
                service::apply_event(&pool, &actor, &subject, &lecture, EventRequest::Viewed)
                    .await?;
            println!("{} is now '{status}' for {lecture}.", subject.email);
        }
        Commands::Reflect {
            email,
            lecture,
            prompt,
            content,
            file,
            actor,
        } => {
            let (subject, actor) = subject_and_actor(&pool, &email, actor.as_deref()).await?;
            let prompt = PromptType::from_code(&prompt)?;
            let content = read_reflection(content, file)?;
            let status = service::apply_event(
                &pool,
                &actor,
                &subject,
                &lecture,
                EventRequest::Reflection {
                    prompt,
                    content: &content,
                },
            )
            .await?;
            println!(
                "{} reflection accepted; {} is now '{status}' for {lecture}.",
                prompt, subject.email
            );
        }
        Commands::SubmitScore {
            email,
            lecture,
            score,
            evaluation,
            actor,
        } => {
            let (subject, actor) = subject_and_actor(&pool, &email, actor.as_deref()).await?;
            let evaluation = match evaluation {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path).with_context(|| {
                        format!("failed to read evaluation from {}", path.display())
                    })?;
                    Some(serde_json::from_str(&raw).context("evaluation file is not valid JSON")?)
                }
                None => None,
            };
            let status = service::apply_event(
                &pool,
                &actor,
                &subject,
                &lecture,
                EventRequest::MasteryScore { score, evaluation },
            )
            .await?;
            println!(
                "Mastery score {score:.1} recorded; {} is now '{status}' for {lecture}.",
                subject.email
            );
        }
        Commands::AddEntity {
            actor,
            kind,
            name,
            era,
            summary,
        } => {
            let actor = admin_context(&pool, &actor).await?;
            let kind = EntityKind::from_code(&kind)?;
            service::add_entity(
                &pool,
                &actor,
                kind,
                &name,
                era.as_deref(),
                summary.as_deref(),
            )
            .await?;
            println!("{kind} '{name}' saved.");
        }
        Commands::Relate {
            actor,
            from_kind,
            from_name,
            to_kind,
            to_name,
            relation,
        } => {
            let actor = admin_context(&pool, &actor).await?;
            let from_kind = EntityKind::from_code(&from_kind)?;
            let to_kind = EntityKind::from_code(&to_kind)?;
            service::relate_entities(
                &pool,
                &actor,
                (from_kind, &from_name),
                (to_kind, &to_name),
                &relation,
            )
            .await?;
            println!("'{from_name}' {relation} '{to_name}' recorded.");
        }
        Commands::TagLecture {
            actor,
            lecture,
            kind,
            name,
        } => {
            let actor = admin_context(&pool, &actor).await?;
            let kind = EntityKind::from_code(&kind)?;
            service::tag_lecture(&pool, &actor, &lecture, kind, &name).await?;
            println!("{lecture} tagged with {kind} '{name}'.");
        }
        Commands::AddPrerequisite {
            actor,
            lecture,
            prerequisite,
            recommended,
            importance,
        } => {
            let actor = admin_context(&pool, &actor).await?;
            service::add_prerequisite(
                &pool,
                &actor,
                &lecture,
                &prerequisite,
                !recommended,
                importance,
            )
            .await?;
            println!(
                "{prerequisite} declared as a {} prerequisite of {lecture} (importance {importance}).",
                if recommended { "recommended" } else { "required" }
            );
        }
    }

    Ok(())
}
