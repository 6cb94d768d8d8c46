// File: streamcore-core/src/repositories/sqlite.rs

use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use tokio::runtime::Runtime;
use tracing::info;

use streamcore_common::error::Error;
use streamcore_common::models::{
    AttendanceRecord, CommandDefinition, CommandStats, CommandType, NewCommand, PermissionLevel,
    Platform,
};
use streamcore_common::traits::{AttendanceRepository, CommandRepository};

const COMMAND_COLUMNS: &str = r#"
    id, name, command_type, response_template, cooldown_seconds, permission,
    active, active_twitch, active_kick, active_youtube, uses, counter_value
"#;

/// SQLite-backed storage for commands and attendance.
///
/// The collaborator traits are synchronous (they are called from bus handlers
/// on connector threads), so the repository owns a small tokio runtime and
/// blocks on each query. Must not be called from inside another runtime.
pub struct SqliteRepository {
    pool: Pool<Sqlite>,
    runtime: Runtime,
}

impl SqliteRepository {
    /// Opens (creating if needed) the database file and applies migrations.
    pub fn open(path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let repo = Self::connect(options, 4)?;
        info!("SQLite database opened at {}", path.display());
        Ok(repo)
    }

    /// A private database that lives as long as this repository.
    pub fn in_memory() -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Every connection to :memory: is a separate database; keep exactly one.
        Self::connect(options, 1)
    }

    fn connect(options: SqliteConnectOptions, max_connections: u32) -> Result<Self, Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("streamcore-db")
            .enable_all()
            .build()?;

        let pool = runtime.block_on(async {
            SqlitePoolOptions::new()
                .max_connections(max_connections)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .acquire_timeout(Duration::from_secs(10))
                .connect_with(options)
                .await
        })?;

        runtime.block_on(sqlx::migrate!("./migrations").run(&pool))?;
        Ok(Self { pool, runtime })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }
}

fn command_from_row(r: &SqliteRow) -> Result<CommandDefinition, Error> {
    let mut active_on = BTreeSet::new();
    if r.try_get::<bool, _>("active_twitch")? {
        active_on.insert(Platform::Twitch);
    }
    if r.try_get::<bool, _>("active_kick")? {
        active_on.insert(Platform::Kick);
    }
    if r.try_get::<bool, _>("active_youtube")? {
        active_on.insert(Platform::YouTube);
    }
    Ok(CommandDefinition {
        id: r.try_get("id")?,
        name: r.try_get("name")?,
        command_type: CommandType::from_str(r.try_get::<&str, _>("command_type")?)?,
        response_template: r.try_get("response_template")?,
        cooldown_seconds: r.try_get::<i64, _>("cooldown_seconds")?.max(0) as u32,
        permission: PermissionLevel::from_str(r.try_get::<&str, _>("permission")?)?,
        active: r.try_get("active")?,
        active_on,
        uses: r.try_get::<i64, _>("uses")?.max(0) as u64,
        counter_value: r.try_get::<i64, _>("counter_value")?.max(0) as u64,
    })
}

fn attendance_from_row(r: &SqliteRow) -> Result<AttendanceRecord, Error> {
    Ok(AttendanceRecord {
        id: r.try_get("id")?,
        nickname: r.try_get("nickname")?,
        platform: Platform::from_str(r.try_get::<&str, _>("platform")?)?,
        total_count: r.try_get::<i64, _>("total_count")?.max(0) as u64,
    })
}

/// Maps a UNIQUE violation on `commands.name` to the domain error.
fn map_unique(err: sqlx::Error, name: &str) -> Error {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return Error::DuplicateCommand(name.to_string());
        }
    }
    Error::Database(err)
}

impl CommandRepository for SqliteRepository {
    fn get_command(&self, name: &str) -> Result<Option<CommandDefinition>, Error> {
        let sql = format!("SELECT {COMMAND_COLUMNS} FROM commands WHERE name = ?");
        let row = self.block_on(
            sqlx::query(&sql)
                .bind(name.trim().to_lowercase())
                .fetch_optional(&self.pool),
        )?;
        row.as_ref().map(command_from_row).transpose()
    }

    fn list_commands(&self) -> Result<Vec<CommandDefinition>, Error> {
        let sql = format!("SELECT {COMMAND_COLUMNS} FROM commands ORDER BY name");
        let rows = self.block_on(sqlx::query(&sql).fetch_all(&self.pool))?;
        rows.iter().map(command_from_row).collect()
    }

    fn create_command(&self, cmd: &NewCommand) -> Result<i64, Error> {
        let name = cmd.normalized_name()?;
        let result = self.block_on(
            sqlx::query(
                r#"
                INSERT INTO commands (
                    name, command_type, response_template, cooldown_seconds, permission,
                    active, active_twitch, active_kick, active_youtube
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
                .bind(&name)
                .bind(cmd.command_type.as_str())
                .bind(&cmd.response_template)
                .bind(i64::from(cmd.cooldown_seconds))
                .bind(cmd.permission.as_str())
                .bind(cmd.active)
                .bind(cmd.active_on.contains(&Platform::Twitch))
                .bind(cmd.active_on.contains(&Platform::Kick))
                .bind(cmd.active_on.contains(&Platform::YouTube))
                .execute(&self.pool),
        )
            .map_err(|e| map_unique(e, &name))?;
        Ok(result.last_insert_rowid())
    }

    fn update_command(&self, id: i64, cmd: &NewCommand) -> Result<(), Error> {
        let name = cmd.normalized_name()?;
        let result = self.block_on(
            sqlx::query(
                r#"
                UPDATE commands SET
                    name = ?, command_type = ?, response_template = ?, cooldown_seconds = ?,
                    permission = ?, active = ?,
                    active_twitch = ?, active_kick = ?, active_youtube = ?
                WHERE id = ?
                "#,
            )
                .bind(&name)
                .bind(cmd.command_type.as_str())
                .bind(&cmd.response_template)
                .bind(i64::from(cmd.cooldown_seconds))
                .bind(cmd.permission.as_str())
                .bind(cmd.active)
                .bind(cmd.active_on.contains(&Platform::Twitch))
                .bind(cmd.active_on.contains(&Platform::Kick))
                .bind(cmd.active_on.contains(&Platform::YouTube))
                .bind(id)
                .execute(&self.pool),
        )
            .map_err(|e| map_unique(e, &name))?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("command {id}")));
        }
        Ok(())
    }

    fn delete_command(&self, id: i64) -> Result<(), Error> {
        let result = self.block_on(
            sqlx::query("DELETE FROM commands WHERE id = ?")
                .bind(id)
                .execute(&self.pool),
        )?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("command {id}")));
        }
        Ok(())
    }

    fn set_command_active(&self, id: i64, active: bool) -> Result<(), Error> {
        let result = self.block_on(
            sqlx::query("UPDATE commands SET active = ? WHERE id = ?")
                .bind(active)
                .bind(id)
                .execute(&self.pool),
        )?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("command {id}")));
        }
        Ok(())
    }

    fn increment_counter(&self, name: &str) -> Result<u64, Error> {
        let row = self.block_on(
            sqlx::query(
                "UPDATE commands SET counter_value = counter_value + 1 WHERE name = ? RETURNING counter_value",
            )
                .bind(name.trim().to_lowercase())
                .fetch_optional(&self.pool),
        )?;
        match row {
            Some(r) => Ok(r.try_get::<i64, _>("counter_value")?.max(0) as u64),
            None => Err(Error::NotFound(format!("command {name}"))),
        }
    }

    fn increment_uses(&self, name: &str) -> Result<(), Error> {
        let result = self.block_on(
            sqlx::query("UPDATE commands SET uses = uses + 1 WHERE name = ?")
                .bind(name.trim().to_lowercase())
                .execute(&self.pool),
        )?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("command {name}")));
        }
        Ok(())
    }

    fn command_stats(&self) -> Result<CommandStats, Error> {
        let (totals, popular) = self.block_on(async {
            let totals = sqlx::query(
                r#"
                SELECT
                    COUNT(*)                  AS total,
                    COALESCE(SUM(active), 0)  AS active,
                    COALESCE(SUM(uses), 0)    AS uses
                FROM commands
                "#,
            )
                .fetch_one(&self.pool)
                .await?;
            let popular = sqlx::query("SELECT name FROM commands ORDER BY uses DESC, id ASC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
            Ok::<_, sqlx::Error>((totals, popular))
        })?;

        Ok(CommandStats {
            active: totals.try_get::<i64, _>("active")?.max(0) as u64,
            total: totals.try_get::<i64, _>("total")?.max(0) as u64,
            uses: totals.try_get::<i64, _>("uses")?.max(0) as u64,
            popular: popular.map(|r| r.try_get::<String, _>("name")).transpose()?,
        })
    }
}

impl AttendanceRepository for SqliteRepository {
    fn register_attendance(&self, nickname: &str, platform: Platform) -> Result<u64, Error> {
        let row = self.block_on(
            sqlx::query(
                r#"
                INSERT INTO attendance (nickname, platform, total_count)
                VALUES (?, ?, 1)
                ON CONFLICT(nickname, platform) DO UPDATE SET
                    total_count = total_count + 1
                RETURNING total_count
                "#,
            )
                .bind(nickname.trim().to_lowercase())
                .bind(platform.as_str())
                .fetch_one(&self.pool),
        )?;
        Ok(row.try_get::<i64, _>("total_count")?.max(0) as u64)
    }

    fn list_attendance(&self) -> Result<Vec<AttendanceRecord>, Error> {
        let rows = self.block_on(
            sqlx::query(
                "SELECT id, nickname, platform, total_count FROM attendance ORDER BY total_count DESC, nickname ASC",
            )
                .fetch_all(&self.pool),
        )?;
        rows.iter().map(attendance_from_row).collect()
    }

    fn delete_attendance(&self, id: i64) -> Result<(), Error> {
        let result = self.block_on(
            sqlx::query("DELETE FROM attendance WHERE id = ?")
                .bind(id)
                .execute(&self.pool),
        )?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("attendance record {id}")));
        }
        Ok(())
    }

    fn set_attendance_total(&self, id: i64, total: u64) -> Result<(), Error> {
        let total = i64::try_from(total)
            .map_err(|_| Error::InvalidInput(format!("attendance total {total} is out of range")))?;
        let result = self.block_on(
            sqlx::query("UPDATE attendance SET total_count = ? WHERE id = ?")
                .bind(total)
                .bind(id)
                .execute(&self.pool),
        )?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("attendance record {id}")));
        }
        Ok(())
    }

    fn clear_platform(&self, platform: Platform) -> Result<u64, Error> {
        let result = self.block_on(
            sqlx::query("DELETE FROM attendance WHERE platform = ?")
                .bind(platform.as_str())
                .execute(&self.pool),
        )?;
        Ok(result.rows_affected())
    }
}
