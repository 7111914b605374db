//! User store

use sqlx::{Row, SqlitePool};

use super::{parse_ts, parse_ts_or_now};
use crate::error::Result;
use crate::models::{User, UserRole};

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                user_id, fullname, email, password_hash, role, is_active,
                created_at, updated_at, last_login_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                fullname = excluded.fullname,
                email = excluded.email,
                password_hash = excluded.password_hash,
                role = excluded.role,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at,
                last_login_at = excluded.last_login_at
            "#,
        )
        .bind(&user.id)
        .bind(&user.fullname)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(match user.role {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        })
        .bind(user.is_active as i64)
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .bind(user.last_login_at.map(|ts| ts.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> User {
        User {
            id: row.get("user_id"),
            fullname: row.get("fullname"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            role: match row.get::<String, _>("role").as_str() {
                "admin" => UserRole::Admin,
                _ => UserRole::User,
            },
            is_active: row.get::<i64, _>("is_active") != 0,
            created_at: parse_ts_or_now(row.get("created_at")),
            updated_at: parse_ts_or_now(row.get("updated_at")),
            last_login_at: parse_ts(row.get("last_login_at")),
        }
    }

    pub async fn find_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| Self::row_to_user(&row)))
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| Self::row_to_user(&row)))
    }
}
