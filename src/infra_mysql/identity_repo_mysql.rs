use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlDatabaseError, MySqlRow};
use sqlx::{MySqlConnection, MySqlPool, Row};
use uuid::Uuid;

pub struct MySqlIdentityRepo {
    pool: MySqlPool,
}

impl MySqlIdentityRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlIdentityRepo { pool }
    }
}

const ER_DUP_ENTRY: u16 = 1062;

fn store_err(e: sqlx::Error) -> AuthError {
    AuthError::InternalFailure(e.to_string())
}

fn is_dup_login(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db
            .try_downcast_ref::<MySqlDatabaseError>()
            .is_some_and(|mysql| mysql.number() == ER_DUP_ENTRY),
        _ => false,
    }
}

fn row_to_record(row: MySqlRow) -> Result<IdentityRecord, AuthError> {
    let user_id_bytes: Vec<u8> = row.try_get("user_id").map_err(store_err)?;
    let user_id = UserId(
        Uuid::from_slice(&user_id_bytes).map_err(|e| AuthError::InternalFailure(e.to_string()))?,
    );
    let login: String = row.try_get("login").map_err(store_err)?;
    let username: String = row.try_get("username").map_err(store_err)?;
    let role: String = row.try_get("role").map_err(store_err)?;
    let password_hash: String = row.try_get("password_hash").map_err(store_err)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(store_err)?;

    Ok(IdentityRecord {
        user_id,
        login,
        username,
        role: Role(role),
        password_hash,
        created_at,
    })
}

pub(super) async fn login_exists(conn: &mut MySqlConnection, login: &str) -> Result<bool, AuthError> {
    let row = sqlx::query("SELECT 1 FROM identity WHERE login = ? AND deleted_at IS NULL")
        .bind(login)
        .fetch_optional(conn)
        .await
        .map_err(store_err)?;
    Ok(row.is_some())
}

pub(super) async fn insert_identity(
    conn: &mut MySqlConnection,
    record: &IdentityRecord,
) -> Result<(), AuthError> {
    sqlx::query(
        r#"
INSERT INTO identity (user_id, login, username, role, password_hash, created_at)
VALUES (?, ?, ?, ?, ?, ?)
"#,
    )
    .bind(record.user_id.0.as_bytes() as &[u8])
    .bind(&record.login)
    .bind(&record.username)
    .bind(record.role.as_str())
    .bind(&record.password_hash)
    .bind(record.created_at)
    .execute(conn)
    .await
    .map_err(|e| {
        if is_dup_login(&e) {
            AuthError::IdentityExists
        } else {
            store_err(e)
        }
    })?;

    Ok(())
}

#[async_trait::async_trait]
impl IdentityRepo for MySqlIdentityRepo {
    async fn find_by_login(&self, login: &str) -> Result<Option<IdentityRecord>, AuthError> {
        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT user_id, login, username, role, password_hash, created_at
FROM identity
WHERE login = ? AND deleted_at IS NULL
"#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row_opt.map(row_to_record).transpose()
    }
}
