//! User accounts and the heart-ledger write-back.

use chrono::{DateTime, Utc};
use echopod_core::hearts::HeartState;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::store::{date_from_sql, date_to_sql, ts_from_sql, ts_to_sql, Store};

/// Column list shared by every user SELECT, in `map_user` order.
const USER_COLUMNS: &str = "id, username, email, password_hash, is_admin, is_vip, is_active, \
     created_at, last_login, hearts, bonus_hearts, max_hearts, last_heart_update, \
     last_daily_reset, is_newbie, newbie_protection_count, consecutive_correct";

/// A stored user account.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Row id.
    pub id: i64,
    /// Unique login name.
    pub username: String,
    /// Contact address (synthesized at registration).
    pub email: String,
    /// Argon2 PHC hash of the password. Never serialized.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Administrator flag.
    pub is_admin: bool,
    /// VIP flag (may create courses).
    pub is_vip: bool,
    /// Soft-delete / suspension flag.
    pub is_active: bool,
    /// Account creation time.
    pub created_at: DateTime<Utc>,
    /// Most recent successful login, if any.
    pub last_login: Option<DateTime<Utc>>,
    /// Embedded heart-ledger state.
    #[serde(flatten)]
    pub hearts: HeartState,
}

/// Fields required to create an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Unique login name.
    pub username: String,
    /// Contact address.
    pub email: String,
    /// Argon2 PHC hash of the password.
    pub password_hash: String,
    /// Administrator flag.
    pub is_admin: bool,
    /// VIP flag.
    pub is_vip: bool,
    /// Initial ledger state.
    pub hearts: HeartState,
}

/// Admin-editable account fields; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    /// New login name.
    pub username: Option<String>,
    /// New password hash.
    pub password_hash: Option<String>,
    /// New VIP flag.
    pub is_vip: Option<bool>,
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let last_login: Option<String> = row.get(8)?;
    let last_heart_update: String = row.get(12)?;
    let last_daily_reset: String = row.get(13)?;
    let created_at: String = row.get(7)?;

    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        is_admin: row.get(4)?,
        is_vip: row.get(5)?,
        is_active: row.get(6)?,
        created_at: ts_from_sql(7, &created_at)?,
        last_login: last_login.as_deref().map(|s| ts_from_sql(8, s)).transpose()?,
        hearts: HeartState {
            hearts: row.get(9)?,
            bonus_hearts: row.get(10)?,
            max_hearts: row.get(11)?,
            last_heart_update: ts_from_sql(12, &last_heart_update)?,
            last_daily_reset: date_from_sql(13, &last_daily_reset)?,
            is_newbie: row.get(14)?,
            newbie_protection_count: row.get(15)?,
            consecutive_correct: row.get(16)?,
        },
    })
}

impl Store {
    /// Inserts a new account and returns its id.
    ///
    /// A username (or synthesized email) collision is reported as
    /// [`StoreError::UsernameTaken`].
    pub fn insert_user(&self, new_user: &NewUser, now: DateTime<Utc>) -> Result<i64> {
        let h = &new_user.hearts;
        let result = self.conn().execute(
            "INSERT INTO users (username, email, password_hash, is_admin, is_vip, is_active,
                 created_at, hearts, bonus_hearts, max_hearts, last_heart_update,
                 last_daily_reset, is_newbie, newbie_protection_count, consecutive_correct)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                new_user.username,
                new_user.email,
                new_user.password_hash,
                new_user.is_admin,
                new_user.is_vip,
                ts_to_sql(now),
                h.hearts,
                h.bonus_hearts,
                h.max_hearts,
                ts_to_sql(h.last_heart_update),
                date_to_sql(h.last_daily_reset),
                h.is_newbie,
                h.newbie_protection_count,
                h.consecutive_correct,
            ],
        );

        match result {
            Ok(_) => Ok(self.conn().last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::UsernameTaken {
                    username: new_user.username.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Loads a user by id.
    pub fn find_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Loads a user by login name.
    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Lists every account, oldest first.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
        let users = stmt
            .query_map([], map_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Total number of accounts.
    pub fn count_users(&self) -> Result<i64> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Writes back the heart ledger for one user in a single statement.
    ///
    /// This is the atomic commit-field-update the ledger transitions rely
    /// on; nothing else about the row is touched.
    pub fn update_hearts(&self, user_id: i64, hearts: &HeartState) -> Result<()> {
        self.conn().execute(
            "UPDATE users SET hearts = ?1, bonus_hearts = ?2, max_hearts = ?3,
                 last_heart_update = ?4, last_daily_reset = ?5, is_newbie = ?6,
                 newbie_protection_count = ?7, consecutive_correct = ?8
             WHERE id = ?9",
            params![
                hearts.hearts,
                hearts.bonus_hearts,
                hearts.max_hearts,
                ts_to_sql(hearts.last_heart_update),
                date_to_sql(hearts.last_daily_reset),
                hearts.is_newbie,
                hearts.newbie_protection_count,
                hearts.consecutive_correct,
                user_id,
            ],
        )?;
        Ok(())
    }

    /// Replaces a user's password hash.
    pub fn update_password(&self, user_id: i64, password_hash: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, user_id],
        )?;
        Ok(())
    }

    /// Stamps the most recent successful login.
    pub fn set_last_login(&self, user_id: i64, now: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![ts_to_sql(now), user_id],
        )?;
        Ok(())
    }

    /// Applies an admin edit to an account.
    ///
    /// A username collision with another account is reported as
    /// [`StoreError::UsernameTaken`].
    pub fn update_user(&self, user_id: i64, update: &UserUpdate) -> Result<()> {
        if let Some(ref username) = update.username {
            let clash: Option<i64> = self
                .conn()
                .query_row(
                    "SELECT id FROM users WHERE username = ?1 AND id != ?2",
                    params![username, user_id],
                    |row| row.get(0),
                )
                .optional()?;
            if clash.is_some() {
                return Err(StoreError::UsernameTaken {
                    username: username.clone(),
                });
            }
            self.conn().execute(
                "UPDATE users SET username = ?1 WHERE id = ?2",
                params![username, user_id],
            )?;
        }
        if let Some(ref hash) = update.password_hash {
            self.update_password(user_id, hash)?;
        }
        if let Some(is_vip) = update.is_vip {
            self.conn().execute(
                "UPDATE users SET is_vip = ?1 WHERE id = ?2",
                params![is_vip, user_id],
            )?;
        }
        Ok(())
    }

    /// Deletes an account together with its progress, courses, and
    /// sentences. Stored file paths must be collected by the caller before
    /// this runs.
    pub fn delete_user(&self, user_id: i64) -> Result<()> {
        let conn = self.conn();
        // Progress rows owned by the user, plus anyone's progress against
        // the user's courses; both would otherwise dangle.
        conn.execute(
            "DELETE FROM level_completions WHERE user_id = ?1
                 OR course_id IN (SELECT id FROM courses WHERE user_id = ?1)",
            params![user_id],
        )?;
        conn.execute(
            "DELETE FROM user_progress WHERE user_id = ?1
                 OR course_id IN (SELECT id FROM courses WHERE user_id = ?1)",
            params![user_id],
        )?;
        conn.execute(
            "DELETE FROM sentences WHERE course_id IN
                 (SELECT id FROM courses WHERE user_id = ?1)",
            params![user_id],
        )?;
        conn.execute("DELETE FROM courses WHERE user_id = ?1", params![user_id])?;
        conn.execute("DELETE FROM users WHERE id = ?1", params![user_id])?;
        Ok(())
    }
}
