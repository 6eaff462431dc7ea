use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};

#[derive(Parser, Debug)]
#[command(author, version, about = "peopleops admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show applied migrations
    MigrateStatus,
    /// List roles and their permission rows
    ListRoles,
    /// Assign a role to a user, by email and role name
    GrantRole { email: String, role: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load env from CWD, falling back to the crate-local `.env` when the
    // binary runs from somewhere else (Docker).
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            sqlx::migrate!().run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            print_migration_status(&pool).await?;
        }
        Commands::ListRoles => {
            let pool = get_pool().await?;
            print_roles(&pool).await?;
        }
        Commands::GrantRole { email, role } => {
            let pool = get_pool().await?;
            grant_role(&pool, &email, &role).await?;
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    Ok(SqlitePoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?)
}

async fn print_migration_status(pool: &SqlitePool) -> anyhow::Result<()> {
    let rows = sqlx::query(
        "SELECT version, description, success FROM _sqlx_migrations ORDER BY version",
    )
    .fetch_all(pool)
    .await?;

    if rows.is_empty() {
        println!("No migrations applied yet");
        return Ok(());
    }

    for row in rows {
        let version: i64 = row.get("version");
        let description: String = row.get("description");
        let success: bool = row.get("success");
        println!(
            "{} {} [{}]",
            version,
            description,
            if success { "ok" } else { "FAILED" }
        );
    }

    Ok(())
}

async fn print_roles(pool: &SqlitePool) -> anyhow::Result<()> {
    let rows = sqlx::query(
        "SELECT r.name AS role_name, r.created_by, p.permission, p.capabilities \
         FROM roles r \
         LEFT JOIN permission_rows p ON p.role_id = r.id \
         ORDER BY r.name, p.permission",
    )
    .fetch_all(pool)
    .await?;

    let mut current: Option<String> = None;
    for row in rows {
        let role_name: String = row.get("role_name");
        let created_by: String = row.get("created_by");
        if current.as_deref() != Some(role_name.as_str()) {
            println!("{} (created by {})", role_name, created_by);
            current = Some(role_name);
        }
        if let Some(permission) = row.get::<Option<String>, _>("permission") {
            let capabilities: String = row.get("capabilities");
            println!("  {} {}", permission, capabilities);
        }
    }

    Ok(())
}

async fn grant_role(pool: &SqlitePool, email: &str, role: &str) -> anyhow::Result<()> {
    let user_id: String = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no user with email {email}"))?;

    let role_id: String = sqlx::query_scalar("SELECT id FROM roles WHERE name = ?")
        .bind(role)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no role named {role}"))?;

    sqlx::query("INSERT OR IGNORE INTO role_assignments (user_id, role_id, created_at) VALUES (?, ?, ?)")
        .bind(&user_id)
        .bind(&role_id)
        .bind(Utc::now())
        .execute(pool)
        .await?;

    println!("Granted {role} to {email}");
    Ok(())
}
