use crate::sqlite_column;
use crate::sqlite_persistence::{
    read_schema_version, Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
    BASE_DB_VERSION, DEFAULT_TIMESTAMP,
};
use crate::user::*;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{debug, info};

use super::auth::CredentialsHasher;

/// V 0
const USER_TABLE_V_0: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_unique = true
        ),
        sqlite_column!("handle", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_user_handle", "handle")],
};
const AUTH_TOKEN_TABLE_V_0: Table = Table {
    name: "auth_token",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("value", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!("last_used", &SqlType::Integer),
    ],
    indices: &[("idx_auth_token_value", "value")],
};
const USER_PASSWORD_CREDENTIALS_V_0: Table = Table {
    name: "user_password_credentials",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            is_unique = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("salt", &SqlType::Text, non_null = true),
        sqlite_column!("hash", &SqlType::Text, non_null = true),
        sqlite_column!("hasher", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
};

/// V 1: credit balance and subscription flag on the user row.
const USER_TABLE_V_1: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_unique = true
        ),
        sqlite_column!("handle", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "free_credits",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!(
            "subscription_active",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[("idx_user_handle", "handle")],
};

pub const VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[
            USER_TABLE_V_0,
            AUTH_TOKEN_TABLE_V_0,
            USER_PASSWORD_CREDENTIALS_V_0,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            USER_TABLE_V_1,
            AUTH_TOKEN_TABLE_V_0,
            USER_PASSWORD_CREDENTIALS_V_0,
        ],
        migration: Some(|conn: &Connection| {
            conn.execute(
                "ALTER TABLE user ADD COLUMN free_credits INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
            conn.execute(
                "ALTER TABLE user ADD COLUMN subscription_active INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
            Ok(())
        }),
    },
];

#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = if db_path.exists() {
            Connection::open_with_flags(
                db_path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_context(|| format!("Failed to open user db at {:?}", db_path))?
        } else {
            info!("Creating user db at {:?}", db_path);
            let conn = Connection::open(db_path)
                .with_context(|| format!("Failed to create user db at {:?}", db_path))?;
            VERSIONED_SCHEMAS
                .last()
                .context("No user db schema defined")?
                .create(&conn)?;
            conn
        };
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let version = read_schema_version(&conn)?;
        match VERSIONED_SCHEMAS.get(version) {
            Some(schema) => schema.validate(&conn)?,
            None => bail!("User db version {} is too new", version),
        }

        Self::migrate_if_needed(&conn, version)?;

        Ok(SqliteUserStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate_if_needed(conn: &Connection, version: usize) -> Result<()> {
        let mut latest_from = version;
        for schema in VERSIONED_SCHEMAS.iter().skip(version + 1) {
            if let Some(migration_fn) = schema.migration {
                info!(
                    "Migrating user db from version {} to {}",
                    latest_from, schema.version
                );
                migration_fn(conn)?;
                latest_from = schema.version;
            }
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest_from),
            [],
        )?;
        Ok(())
    }
}

fn system_time_from_column_result(value: i64) -> SystemTime {
    SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(value as u64)
}

fn auth_token_from_row(row: &rusqlite::Row) -> rusqlite::Result<AuthToken> {
    Ok(AuthToken {
        user_id: row.get(0)?,
        value: AuthTokenValue(row.get(1)?),
        created: system_time_from_column_result(row.get(2)?),
        last_used: row
            .get::<usize, Option<i64>>(3)?
            .map(system_time_from_column_result),
    })
}

impl UserStore for SqliteUserStore {
    fn create_user(&self, user_handle: &str, free_credits: u32) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user (handle, free_credits) VALUES (?1, ?2)",
            params![user_handle, free_credits],
        )
        .with_context(|| format!("Failed to create user {}", user_handle))?;
        Ok(conn.last_insert_rowid() as usize)
    }

    fn get_user_id(&self, user_handle: &str) -> Result<Option<usize>> {
        let conn = self.conn.lock().unwrap();
        let id = conn
            .query_row(
                "SELECT id FROM user WHERE handle = ?1",
                params![user_handle],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn get_user_profile(&self, user_id: usize) -> Result<Option<UserProfile>> {
        let conn = self.conn.lock().unwrap();
        let profile = conn
            .query_row(
                "SELECT id, handle, free_credits, subscription_active FROM user WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok(UserProfile {
                        user_id: row.get(0)?,
                        user_handle: row.get(1)?,
                        free_credits: row.get(2)?,
                        subscription_active: row.get::<_, i64>(3)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }
}

impl UserCreditsStore for SqliteUserStore {
    fn get_credit_status(&self, user_id: usize) -> Result<Option<CreditStatus>> {
        let conn = self.conn.lock().unwrap();
        let status = conn
            .query_row(
                "SELECT free_credits, subscription_active FROM user WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok(CreditStatus {
                        free_credits: row.get(0)?,
                        subscription_active: row.get::<_, i64>(1)? != 0,
                    })
                },
            )
            .optional()?;
        Ok(status)
    }

    fn try_consume_credit(&self, user_id: usize) -> Result<Option<u32>> {
        let conn = self.conn.lock().unwrap();
        let remaining = conn
            .query_row(
                "UPDATE user SET free_credits = free_credits - 1 \
                 WHERE id = ?1 AND free_credits > 0 RETURNING free_credits",
                params![user_id],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to consume credit of user {}", user_id))?;
        debug!("Consume credit user_id={} -> {:?}", user_id, remaining);
        Ok(remaining)
    }

    fn set_subscription_active(&self, user_id: usize, active: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE user SET subscription_active = ?1 WHERE id = ?2",
            params![active as i64, user_id],
        )?;
        if updated == 0 {
            bail!("User {} not found", user_id);
        }
        Ok(())
    }

    fn set_free_credits(&self, user_id: usize, free_credits: u32) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE user SET free_credits = ?1 WHERE id = ?2",
            params![free_credits, user_id],
        )?;
        if updated == 0 {
            bail!("User {} not found", user_id);
        }
        Ok(())
    }
}

impl UserAuthTokenStore for SqliteUserStore {
    fn get_user_auth_token(&self, value: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let conn = self.conn.lock().unwrap();
        let token = conn
            .query_row(
                "SELECT user_id, value, created, last_used FROM auth_token WHERE value = ?1",
                params![value.0],
                auth_token_from_row,
            )
            .optional()?;
        Ok(token)
    }

    fn delete_user_auth_token(&self, value: &AuthTokenValue) -> Result<Option<AuthToken>> {
        let token = match self.get_user_auth_token(value)? {
            Some(token) => token,
            None => return Ok(None),
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM auth_token WHERE value = ?1",
            params![token.value.0],
        )?;
        Ok(Some(token))
    }

    fn update_user_auth_token_last_used_timestamp(&self, value: &AuthTokenValue) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "UPDATE auth_token SET last_used = {} WHERE value = ?1",
                DEFAULT_TIMESTAMP
            ),
            params![value.0],
        )?;
        Ok(())
    }

    fn add_user_auth_token(&self, token: &AuthToken) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO auth_token (value, user_id) VALUES (?1, ?2)",
            params![token.value.0, token.user_id],
        )?;
        Ok(())
    }
}

impl UserAuthCredentialsStore for SqliteUserStore {
    fn get_password_credentials(
        &self,
        user_handle: &str,
    ) -> Result<Option<UsernamePasswordCredentials>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT c.user_id, c.salt, c.hash, c.hasher, c.created \
                 FROM user_password_credentials c JOIN user u ON u.id = c.user_id \
                 WHERE u.handle = ?1",
                params![user_handle],
                |row| {
                    Ok((
                        row.get::<_, usize>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((user_id, salt, hash, hasher, created)) = row else {
            return Ok(None);
        };
        Ok(Some(UsernamePasswordCredentials {
            user_id,
            salt,
            hash,
            hasher: CredentialsHasher::from_str(&hasher)?,
            created: system_time_from_column_result(created),
        }))
    }

    fn set_password_credentials(&self, credentials: &UsernamePasswordCredentials) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user_password_credentials (user_id, salt, hash, hasher) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(user_id) DO UPDATE SET \
             salt = excluded.salt, hash = excluded.hash, hasher = excluded.hasher",
            params![
                credentials.user_id,
                credentials.salt,
                credentials.hash,
                credentials.hasher.to_string()
            ],
        )
        .with_context(|| {
            format!(
                "Failed to store password credentials of user {}",
                credentials.user_id
            )
        })?;
        Ok(())
    }
}
