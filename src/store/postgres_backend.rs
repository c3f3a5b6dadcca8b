//! PostgreSQL storage backend.
//!
//! This module provides a persistent implementation of the `StorageBackend` trait
//! using PostgreSQL. Filters are translated into `WHERE` clauses with
//! `sqlx::QueryBuilder`; folder cascades rely on `ON DELETE CASCADE` foreign keys.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::backend::{StorageBackend, StorageError};
use super::filter::{DeliveryAttemptFilter, EmailFilter, FolderFilter, NullableSet};
use super::patch::{EmailChange, FolderChange};
use super::types::{DeliveryAttempt, Email, Folder, NewDeliveryAttempt, NewEmail, NewFolder};

/// Schema applied by [`PostgresStorageBackend::ensure_schema`].
const SCHEMA_SQL: &str = include_str!("../../migrations/0001_email_templates.sql");

const FOLDER_COLUMNS: &str = "id, parent_id, name, description, system_flag, updated, created";
const EMAIL_COLUMNS: &str = "id, folder_id, from_email, from_name, subject, html, text, \
                             description, system_flag, updated, created";
const LOG_COLUMNS: &str = "id, from_email, from_name, subject, to_email, html, text, status, \
                           message_id, errors, created";

/// PostgreSQL storage backend.
///
/// Table structure:
/// - `email_folders` - Folder tree, unique on `(COALESCE(parent_id, 0), name)`
/// - `emails` - Templates, optionally filed under a folder
/// - `email_logs` - Append-only delivery attempts
pub struct PostgresStorageBackend {
    pool: PgPool,
}

impl PostgresStorageBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes that do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        tracing::info!("Email template schema ensured");
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct DeliveryAttemptRow {
    id: i64,
    from_email: String,
    from_name: String,
    subject: String,
    to_email: String,
    html: String,
    text: String,
    status: String,
    message_id: Option<String>,
    errors: Option<String>,
    created: DateTime<Utc>,
}

impl TryFrom<DeliveryAttemptRow> for DeliveryAttempt {
    type Error = StorageError;

    fn try_from(row: DeliveryAttemptRow) -> Result<Self, Self::Error> {
        Ok(DeliveryAttempt {
            id: row.id,
            from_email: row.from_email,
            from_name: row.from_name,
            subject: row.subject,
            to_email: row.to_email,
            html: row.html,
            text: row.text,
            status: row.status.parse().map_err(StorageError::Corrupt)?,
            message_id: row.message_id,
            error_detail: row.errors,
            created_at: row.created,
        })
    }
}

fn map_write_error(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StorageError::UniqueViolation(db_err.message().to_string());
        }
        if db_err.is_foreign_key_violation() {
            return StorageError::MissingFolder(db_err.message().to_string());
        }
    }
    StorageError::Postgres(err)
}

fn push_in<'a, T>(qb: &mut QueryBuilder<'a, Postgres>, column: &str, values: &Option<Vec<T>>)
where
    T: Clone + Send + sqlx::Type<Postgres> + sqlx::Encode<'a, Postgres> + 'a,
    Vec<T>: sqlx::Type<Postgres> + sqlx::Encode<'a, Postgres>,
{
    if let Some(values) = values {
        qb.push(" AND ")
            .push(column)
            .push(" = ANY(")
            .push_bind(values.clone())
            .push(")");
    }
}

fn push_nullable_in(
    qb: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    set: &Option<NullableSet<i64>>,
) {
    let Some(set) = set else { return };

    match (set.values.is_empty(), set.include_null) {
        (false, true) => {
            qb.push(" AND (")
                .push(column)
                .push(" = ANY(")
                .push_bind(set.values.clone())
                .push(") OR ")
                .push(column)
                .push(" IS NULL)");
        }
        (true, true) => {
            qb.push(" AND ").push(column).push(" IS NULL");
        }
        (false, false) => {
            qb.push(" AND ")
                .push(column)
                .push(" = ANY(")
                .push_bind(set.values.clone())
                .push(")");
        }
        (true, false) => {}
    }
}

fn push_flag(qb: &mut QueryBuilder<'_, Postgres>, flag: Option<bool>) {
    if let Some(flag) = flag {
        qb.push(" AND system_flag = ").push_bind(flag);
    }
}

fn folder_query(filter: &FolderFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {} FROM email_folders WHERE TRUE",
        FOLDER_COLUMNS
    ));
    push_in(&mut qb, "id", &filter.id_in);
    push_nullable_in(&mut qb, "parent_id", &filter.parent_id_in);
    push_in(&mut qb, "name", &filter.name_in);
    push_flag(&mut qb, filter.system_flag);
    qb.push(" ORDER BY id");
    qb
}

fn email_query(filter: &EmailFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM emails WHERE TRUE", EMAIL_COLUMNS));
    push_in(&mut qb, "id", &filter.id_in);
    push_nullable_in(&mut qb, "folder_id", &filter.folder_id_in);
    push_flag(&mut qb, filter.system_flag);
    qb.push(" ORDER BY id");
    qb
}

fn delivery_attempt_query(filter: &DeliveryAttemptFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM email_logs WHERE TRUE", LOG_COLUMNS));
    push_in(&mut qb, "id", &filter.id_in);
    push_in(&mut qb, "from_email", &filter.from_email_in);
    push_in(&mut qb, "from_name", &filter.from_name_in);
    push_in(&mut qb, "to_email", &filter.to_email_in);
    let statuses = filter.status_in.as_ref().map(|statuses| {
        statuses
            .iter()
            .map(|s| s.as_str().to_string())
            .collect::<Vec<_>>()
    });
    push_in(&mut qb, "status", &statuses);
    push_in(&mut qb, "message_id", &filter.message_id_in);
    qb.push(" ORDER BY id");
    qb
}

fn folder_update(id: i64, changes: &[FolderChange]) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("UPDATE email_folders SET ");
    let mut set = qb.separated(", ");
    for change in changes {
        set.push(change.column());
        set.push_unseparated(" = ");
        match change {
            FolderChange::ParentId(v) => set.push_bind_unseparated(*v),
            FolderChange::Name(v) | FolderChange::Description(v) => {
                set.push_bind_unseparated(v.clone())
            }
            FolderChange::UpdatedAt(v) => set.push_bind_unseparated(*v),
        };
    }
    if changes.is_empty() {
        qb.push("id = id");
    }
    qb.push(" WHERE id = ").push_bind(id);
    qb
}

fn email_update(id: i64, changes: &[EmailChange]) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("UPDATE emails SET ");
    let mut set = qb.separated(", ");
    for change in changes {
        set.push(change.column());
        set.push_unseparated(" = ");
        match change {
            EmailChange::FolderId(v) => set.push_bind_unseparated(*v),
            EmailChange::FromEmail(v)
            | EmailChange::FromName(v)
            | EmailChange::Subject(v)
            | EmailChange::Html(v)
            | EmailChange::Text(v)
            | EmailChange::Description(v) => set.push_bind_unseparated(v.clone()),
            EmailChange::UpdatedAt(v) => set.push_bind_unseparated(*v),
        };
    }
    if changes.is_empty() {
        qb.push("id = id");
    }
    qb.push(" WHERE id = ").push_bind(id);
    qb
}

#[async_trait]
impl StorageBackend for PostgresStorageBackend {
    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn insert_folder(&self, folder: NewFolder) -> Result<Folder, StorageError> {
        let now = Utc::now();
        let created: Folder = sqlx::query_as(&format!(
            r#"
            INSERT INTO email_folders (parent_id, name, description, system_flag, updated, created)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING {}
            "#,
            FOLDER_COLUMNS
        ))
        .bind(folder.parent_id)
        .bind(&folder.name)
        .bind(&folder.description)
        .bind(folder.system_flag)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        tracing::trace!(folder_id = created.id, "Folder inserted into PostgreSQL");
        Ok(created)
    }

    async fn find_folders(&self, filter: &FolderFilter) -> Result<Vec<Folder>, StorageError> {
        let folders = folder_query(filter)
            .build_query_as::<Folder>()
            .fetch_all(&self.pool)
            .await?;
        Ok(folders)
    }

    async fn update_folder(&self, id: i64, changes: &[FolderChange]) -> Result<u64, StorageError> {
        let result = folder_update(id, changes)
            .build()
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;
        Ok(result.rows_affected())
    }

    async fn delete_folder(&self, id: i64) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM email_folders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_email(&self, email: NewEmail) -> Result<Email, StorageError> {
        let now = Utc::now();
        let created: Email = sqlx::query_as(&format!(
            r#"
            INSERT INTO emails (folder_id, from_email, from_name, subject, html, text,
                                description, system_flag, updated, created)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING {}
            "#,
            EMAIL_COLUMNS
        ))
        .bind(email.folder_id)
        .bind(&email.from_email)
        .bind(&email.from_name)
        .bind(&email.subject)
        .bind(&email.html)
        .bind(&email.text)
        .bind(&email.description)
        .bind(email.system_flag)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        tracing::trace!(email_id = created.id, "Email template inserted into PostgreSQL");
        Ok(created)
    }

    async fn find_emails(&self, filter: &EmailFilter) -> Result<Vec<Email>, StorageError> {
        let emails = email_query(filter)
            .build_query_as::<Email>()
            .fetch_all(&self.pool)
            .await?;
        Ok(emails)
    }

    async fn update_email(&self, id: i64, changes: &[EmailChange]) -> Result<u64, StorageError> {
        let result = email_update(id, changes)
            .build()
            .execute(&self.pool)
            .await
            .map_err(map_write_error)?;
        Ok(result.rows_affected())
    }

    async fn delete_email(&self, id: i64) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM emails WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_delivery_attempt(
        &self,
        attempt: NewDeliveryAttempt,
    ) -> Result<DeliveryAttempt, StorageError> {
        let row: DeliveryAttemptRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO email_logs (from_email, from_name, subject, to_email, html, text,
                                    status, message_id, errors, created)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            LOG_COLUMNS
        ))
        .bind(&attempt.from_email)
        .bind(&attempt.from_name)
        .bind(&attempt.subject)
        .bind(&attempt.to_email)
        .bind(&attempt.html)
        .bind(&attempt.text)
        .bind(attempt.status.as_str())
        .bind(&attempt.message_id)
        .bind(&attempt.error_detail)
        .bind(attempt.created_at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_delivery_attempts(
        &self,
        filter: &DeliveryAttemptFilter,
    ) -> Result<Vec<DeliveryAttempt>, StorageError> {
        let rows = delivery_attempt_query(filter)
            .build_query_as::<DeliveryAttemptRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(DeliveryAttempt::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::DeliveryStatus;

    #[test]
    fn test_no_filters_selects_everything() {
        let qb = folder_query(&FolderFilter::default());
        assert!(qb.sql().ends_with("FROM email_folders WHERE TRUE ORDER BY id"));
    }

    #[test]
    fn test_nullable_set_with_values_and_null() {
        let filter = FolderFilter {
            parent_id_in: Some(NullableSet::of(vec![5]).with_null()),
            ..Default::default()
        };
        let qb = folder_query(&filter);
        assert!(qb
            .sql()
            .contains(" AND (parent_id = ANY($1) OR parent_id IS NULL)"));
    }

    #[test]
    fn test_nullable_set_only_null() {
        let filter = EmailFilter {
            folder_id_in: Some(NullableSet::only_null()),
            system_flag: Some(true),
            ..Default::default()
        };
        let qb = email_query(&filter);
        assert!(qb
            .sql()
            .contains(" AND folder_id IS NULL AND system_flag = $1"));
    }

    #[test]
    fn test_nullable_set_only_values() {
        let filter = EmailFilter {
            id_in: Some(vec![1, 2]),
            folder_id_in: Some(NullableSet::of(vec![3])),
            ..Default::default()
        };
        let qb = email_query(&filter);
        assert!(qb
            .sql()
            .contains(" AND id = ANY($1) AND folder_id = ANY($2)"));
    }

    #[test]
    fn test_delivery_attempt_filters_are_anded() {
        let filter = DeliveryAttemptFilter {
            to_email_in: Some(vec!["a@b.com".to_string()]),
            status_in: Some(vec![DeliveryStatus::Error]),
            ..Default::default()
        };
        let qb = delivery_attempt_query(&filter);
        assert!(qb
            .sql()
            .contains(" AND to_email = ANY($1) AND status = ANY($2) ORDER BY id"));
    }

    #[test]
    fn test_update_sets_only_listed_columns() {
        let changes = [
            FolderChange::ParentId(None),
            FolderChange::UpdatedAt(Utc::now()),
        ];
        let qb = folder_update(7, &changes);
        assert_eq!(
            qb.sql(),
            "UPDATE email_folders SET parent_id = $1, updated = $2 WHERE id = $3"
        );
    }

    #[test]
    fn test_email_update_sql() {
        let changes = [
            EmailChange::Html("<b>hi</b>".to_string()),
            EmailChange::UpdatedAt(Utc::now()),
        ];
        let qb = email_update(3, &changes);
        assert_eq!(qb.sql(), "UPDATE emails SET html = $1, updated = $2 WHERE id = $3");
    }

    use sqlx::error::ErrorKind;

    #[derive(Debug)]
    struct ConstraintError(ErrorKind);

    impl std::fmt::Display for ConstraintError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "constraint {:?}", self.0)
        }
    }

    impl std::error::Error for ConstraintError {}

    impl sqlx::error::DatabaseError for ConstraintError {
        fn message(&self) -> &str {
            "violates constraint"
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.0 {
                ErrorKind::UniqueViolation => ErrorKind::UniqueViolation,
                ErrorKind::ForeignKeyViolation => ErrorKind::ForeignKeyViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    #[test]
    fn test_write_errors_map_to_typed_variants() {
        let unique = sqlx::Error::database(ConstraintError(ErrorKind::UniqueViolation));
        assert!(matches!(map_write_error(unique), StorageError::UniqueViolation(_)));

        let foreign = sqlx::Error::database(ConstraintError(ErrorKind::ForeignKeyViolation));
        assert!(matches!(map_write_error(foreign), StorageError::MissingFolder(_)));

        let other = sqlx::Error::database(ConstraintError(ErrorKind::Other));
        assert!(matches!(map_write_error(other), StorageError::Postgres(_)));
        assert!(matches!(
            map_write_error(sqlx::Error::PoolTimedOut),
            StorageError::Postgres(_)
        ));
    }

    #[test]
    fn test_schema_declares_cascades_and_unique_index() {
        assert!(SCHEMA_SQL.contains("ON DELETE CASCADE"));
        assert!(SCHEMA_SQL.contains("idx_email_folders_parent_name"));
    }
}
