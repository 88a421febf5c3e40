//! Operator user provisioning.
//!
//! The original identity provider is out of scope; users and their API
//! tokens are provisioned locally from the CLI. Tokens are printed exactly
//! once at creation and only their digest is stored.

use anyhow::{bail, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::auth::token_digest;
use crate::config::Config;
use crate::db;
use crate::models::Role;

pub struct NewUser {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub token: String,
}

pub async fn create_user(pool: &SqlitePool, email: &str, role: Role) -> Result<NewUser> {
    if email.trim().is_empty() {
        bail!("email must not be empty");
    }

    let id = Uuid::new_v4().to_string();
    let token = format!("ak_{}", Uuid::new_v4().simple());
    let now = Utc::now().timestamp();

    sqlx::query("INSERT INTO users (id, email, created_at) VALUES (?, ?, ?)")
        .bind(&id)
        .bind(email)
        .bind(now)
        .execute(pool)
        .await?;

    sqlx::query("INSERT INTO user_tokens (token_hash, user_id) VALUES (?, ?)")
        .bind(token_digest(&token))
        .bind(&id)
        .execute(pool)
        .await?;

    if role != Role::Unassigned {
        sqlx::query("INSERT INTO user_roles (user_id, role) VALUES (?, ?)")
            .bind(&id)
            .bind(role.as_str())
            .execute(pool)
            .await?;
    }

    Ok(NewUser {
        id,
        email: email.to_string(),
        role,
        token,
    })
}

/// CLI entry point — creates a user and prints the one-time token.
pub async fn run_user_add(config: &Config, email: &str, role: &str) -> Result<()> {
    let role = Role::parse(role);
    let pool = db::connect(config).await?;

    let user = create_user(&pool, email, role).await?;

    println!("user added");
    println!("  id:    {}", user.id);
    println!("  email: {}", user.email);
    println!("  role:  {}", user.role);
    println!("  token: {}", user.token);
    println!("The token is shown once; store it now.");

    pool.close().await;
    Ok(())
}

/// CLI entry point — lists users and their roles.
pub async fn run_user_list(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let rows = sqlx::query(
        r#"
        SELECT u.id AS id, u.email AS email, r.role AS role
        FROM users u
        LEFT JOIN user_roles r ON r.user_id = u.id
        ORDER BY u.email ASC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    if rows.is_empty() {
        println!("No users.");
        pool.close().await;
        return Ok(());
    }

    for row in &rows {
        let id: String = row.get("id");
        let email: String = row.get("email");
        let role: Option<String> = row.get("role");
        println!(
            "{}  {}  [{}]",
            id,
            email,
            role.as_deref().unwrap_or("unassigned")
        );
    }

    pool.close().await;
    Ok(())
}
