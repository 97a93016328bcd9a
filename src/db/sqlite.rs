use crate::db::models::{NewStorable, StorableRecord};
use crate::db::schema::SQLITE_INIT;
use crate::error::EdaPartsError;
use crate::types::{CadType, StorableKind, StorageStatus};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite, SqliteConnection, Transaction};
use std::str::FromStr;
use std::time::Duration;

pub type SqlitePool = Pool<Sqlite>;

const COLUMNS: &str =
    "id, path, reference, cad_type, description, alias, storage_status, storage_error";

/// Which records share a namespace with a (path, reference) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateScope<'a> {
    /// Any path starting with this prefix (a directory followed by `/`).
    Directory(&'a str),
    /// Exactly this path.
    ExactPath(&'a str),
}

#[derive(Debug, Clone, Copy)]
pub struct DuplicateQuery<'a> {
    pub kind: StorableKind,
    pub cad_type: CadType,
    pub scope: DuplicateScope<'a>,
    pub reference: &'a str,
    pub exclude_id: Option<i64>,
    /// Only consider rows whose file already reached `STORED`.
    pub stored_only: bool,
}

#[derive(Clone)]
pub struct StorableStorage {
    pool: SqlitePool,
}

impl StorableStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database and make sure the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, EdaPartsError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(connect_opts)
            .await?;
        let storage = Self::new(pool);
        storage.init_schema().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, EdaPartsError> {
        Ok(self.pool.begin().await?)
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), EdaPartsError> {
        // execute statements one by one (sqlx::query runs a single statement)
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn get_by_id(
        &self,
        kind: StorableKind,
        id: i64,
    ) -> Result<Option<StorableRecord>, EdaPartsError> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_id(&mut *conn, kind, id).await
    }

    /// One page ordered by id plus the total row count of the table.
    pub async fn list_page(
        &self,
        kind: StorableKind,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<StorableRecord>, i64), EdaPartsError> {
        let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", kind.table()))
            .fetch_one(&self.pool)
            .await?;
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM {} ORDER BY id LIMIT ? OFFSET ?",
            kind.table()
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let records = rows
            .into_iter()
            .map(|row| row_to_model(kind, row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((records, total))
    }

    pub async fn set_status(
        &self,
        kind: StorableKind,
        id: i64,
        status: StorageStatus,
        error: Option<&str>,
    ) -> Result<(), EdaPartsError> {
        sqlx::query(&format!(
            "UPDATE {} SET storage_status = ?, storage_error = ? WHERE id = ?",
            kind.table()
        ))
        .bind(status.as_str())
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Final transition of a successful store; writes the (possibly new) reference too.
    pub async fn mark_stored(
        &self,
        kind: StorableKind,
        id: i64,
        reference: &str,
    ) -> Result<(), EdaPartsError> {
        sqlx::query(&format!(
            "UPDATE {} SET reference = ?, storage_status = ?, storage_error = NULL WHERE id = ?",
            kind.table()
        ))
        .bind(reference)
        .bind(StorageStatus::Stored.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// References of the other records whose file at `path` is already stored.
    pub async fn stored_references(
        &self,
        kind: StorableKind,
        cad_type: CadType,
        path: &str,
        exclude_id: i64,
    ) -> Result<Vec<String>, EdaPartsError> {
        let rows: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT reference FROM {} WHERE path = ? AND cad_type = ? AND id != ? AND storage_status = ?",
            kind.table()
        ))
        .bind(path)
        .bind(cad_type.as_str())
        .bind(exclude_id)
        .bind(StorageStatus::Stored.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(reference,)| reference).collect())
    }

    pub async fn find_duplicate(
        &self,
        query: &DuplicateQuery<'_>,
    ) -> Result<Option<i64>, EdaPartsError> {
        let mut conn = self.pool.acquire().await?;
        find_duplicate(&mut *conn, query).await
    }
}

pub async fn fetch_by_id(
    conn: &mut SqliteConnection,
    kind: StorableKind,
    id: i64,
) -> Result<Option<StorableRecord>, EdaPartsError> {
    let row = sqlx::query(&format!(
        "SELECT {COLUMNS} FROM {} WHERE id = ?",
        kind.table()
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    row.map(|row| row_to_model(kind, row)).transpose()
}

/// Id of the first record colliding with the query, if any.
pub async fn find_duplicate(
    conn: &mut SqliteConnection,
    query: &DuplicateQuery<'_>,
) -> Result<Option<i64>, EdaPartsError> {
    let mut sql = format!(
        "SELECT id FROM {} WHERE cad_type = ? AND reference = ?",
        query.kind.table()
    );
    match query.scope {
        DuplicateScope::Directory(_) => sql.push_str(" AND substr(path, 1, length(?)) = ?"),
        DuplicateScope::ExactPath(_) => sql.push_str(" AND path = ?"),
    }
    if query.exclude_id.is_some() {
        sql.push_str(" AND id != ?");
    }
    if query.stored_only {
        sql.push_str(" AND storage_status = ?");
    }
    sql.push_str(" ORDER BY id LIMIT 1");

    let mut q = sqlx::query_as::<_, (i64,)>(&sql)
        .bind(query.cad_type.as_str())
        .bind(query.reference);
    q = match query.scope {
        DuplicateScope::Directory(prefix) => q.bind(prefix).bind(prefix),
        DuplicateScope::ExactPath(path) => q.bind(path),
    };
    if let Some(id) = query.exclude_id {
        q = q.bind(id);
    }
    if query.stored_only {
        q = q.bind(StorageStatus::Stored.as_str());
    }
    Ok(q.fetch_optional(conn).await?.map(|(id,)| id))
}

pub async fn insert(
    conn: &mut SqliteConnection,
    new: &NewStorable,
) -> Result<StorableRecord, EdaPartsError> {
    let row = sqlx::query(&format!(
        r#"INSERT INTO {} (path, reference, cad_type, description, alias, storage_status)
           VALUES (?, ?, ?, ?, ?, ?)
           RETURNING {COLUMNS}"#,
        new.kind.table()
    ))
    .bind(new.path.as_str())
    .bind(new.reference.as_str())
    .bind(new.cad_type.as_str())
    .bind(new.description.as_deref())
    .bind(new.alias.as_deref())
    .bind(StorageStatus::NotStored.as_str())
    .fetch_one(conn)
    .await?;
    row_to_model(new.kind, row)
}

/// Put a record back to `NOT_STORED` ahead of a new store attempt.
pub async fn reset_storage(
    conn: &mut SqliteConnection,
    kind: StorableKind,
    id: i64,
) -> Result<(), EdaPartsError> {
    sqlx::query(&format!(
        "UPDATE {} SET storage_status = ?, storage_error = NULL WHERE id = ?",
        kind.table()
    ))
    .bind(StorageStatus::NotStored.as_str())
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}

fn row_to_model(kind: StorableKind, row: SqliteRow) -> Result<StorableRecord, EdaPartsError> {
    let id: i64 = row.try_get("id")?;
    let path: String = row.try_get("path")?;
    let reference: String = row.try_get("reference")?;
    let cad_type_str: String = row.try_get("cad_type")?;
    let description: Option<String> = row.try_get("description")?;
    let alias: Option<String> = row.try_get("alias")?;
    let status_str: String = row.try_get("storage_status")?;
    let storage_error: Option<String> = row.try_get("storage_error")?;

    let cad_type =
        CadType::from_str(&cad_type_str).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let storage_status =
        StorageStatus::from_str(&status_str).map_err(|e| sqlx::Error::Decode(e.into()))?;

    Ok(StorableRecord {
        id,
        kind,
        path,
        reference,
        cad_type,
        description,
        alias,
        storage_status,
        storage_error,
    })
}
