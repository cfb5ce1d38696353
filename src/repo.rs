use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::model::{FormRecord, FormType};
use crate::time::now_ms;

const FORM_COLUMNS: &str =
    "id, incident_name, form_type, status, form_data, created_at, updated_at";

fn row_to_form(row: &SqliteRow) -> Result<FormRecord, sqlx::Error> {
    let form_type: String = row.try_get("form_type")?;
    let form_type = form_type
        .parse::<FormType>()
        .map_err(|err| sqlx::Error::Decode(Box::new(err)))?;
    Ok(FormRecord {
        id: Some(row.try_get("id")?),
        incident_name: row.try_get("incident_name")?,
        form_type,
        status: row.try_get("status")?,
        form_data: row.try_get("form_data")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn rows_to_forms(rows: Vec<SqliteRow>) -> Result<Vec<FormRecord>, sqlx::Error> {
    rows.iter().map(row_to_form).collect()
}

pub async fn insert_form(
    pool: &SqlitePool,
    incident_name: &str,
    form_type: FormType,
    form_data: &str,
) -> Result<i64, sqlx::Error> {
    let now = now_ms();
    let res = sqlx::query(
        "INSERT INTO forms (incident_name, form_type, status, form_data, created_at, updated_at) \
         VALUES (?, ?, 'draft', ?, ?, ?)",
    )
    .bind(incident_name)
    .bind(form_type.code())
    .bind(form_data)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(res.last_insert_rowid())
}

/// Insert a complete record inside an open transaction, keeping its status and timestamps.
/// When `keep_id` is set the record's own id is reused.
pub async fn insert_record_tx(
    tx: &mut Transaction<'_, Sqlite>,
    record: &FormRecord,
    keep_id: bool,
) -> Result<i64, sqlx::Error> {
    let id = if keep_id { record.id } else { None };
    let res = sqlx::query(
        "INSERT INTO forms (id, incident_name, form_type, status, form_data, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&record.incident_name)
    .bind(record.form_type.code())
    .bind(&record.status)
    .bind(&record.form_data)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(res.last_insert_rowid())
}

pub async fn get_form(pool: &SqlitePool, id: i64) -> Result<Option<FormRecord>, sqlx::Error> {
    let sql = format!("SELECT {FORM_COLUMNS} FROM forms WHERE id = ?");
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    row.as_ref().map(row_to_form).transpose()
}

/// Case-insensitive substring match on incident name; `None` lists every form.
pub async fn search_forms(
    pool: &SqlitePool,
    incident_name: Option<&str>,
) -> Result<Vec<FormRecord>, sqlx::Error> {
    let filter = incident_name.map(str::trim).filter(|s| !s.is_empty());
    let rows = match filter {
        Some(needle) => {
            let sql = format!(
                "SELECT {FORM_COLUMNS} FROM forms \
                 WHERE incident_name LIKE ? ESCAPE '\\' \
                 ORDER BY updated_at DESC, id DESC"
            );
            sqlx::query(&sql)
                .bind(like_pattern(needle))
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!("SELECT {FORM_COLUMNS} FROM forms ORDER BY updated_at DESC, id DESC");
            sqlx::query(&sql).fetch_all(pool).await?
        }
    };
    rows_to_forms(rows)
}

pub async fn list_forms(pool: &SqlitePool) -> Result<Vec<FormRecord>, sqlx::Error> {
    search_forms(pool, None).await
}

/// Every form in insertion order, as written to exports and backups.
pub async fn list_forms_by_id(pool: &SqlitePool) -> Result<Vec<FormRecord>, sqlx::Error> {
    let sql = format!("SELECT {FORM_COLUMNS} FROM forms ORDER BY id");
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows_to_forms(rows)
}

/// Returns false when no form has the given id.
pub async fn update_form_data(
    pool: &SqlitePool,
    id: i64,
    form_data: &str,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("UPDATE forms SET form_data = ?, updated_at = ? WHERE id = ?")
        .bind(form_data)
        .bind(now_ms())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn delete_form(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let res = sqlx::query("DELETE FROM forms WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn count_forms(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM forms")
        .fetch_one(pool)
        .await
}

pub async fn clear_forms_tx(tx: &mut Transaction<'_, Sqlite>) -> Result<u64, sqlx::Error> {
    let res = sqlx::query("DELETE FROM forms").execute(&mut **tx).await?;
    Ok(res.rows_affected())
}

fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_pool;

    #[tokio::test]
    async fn insert_and_get() {
        let pool = open_memory_pool().await.unwrap();
        let id = insert_form(&pool, "Creek Fire", FormType::Ics201, r#"{"a":1}"#)
            .await
            .unwrap();
        let form = get_form(&pool, id).await.unwrap().expect("stored");
        assert_eq!(form.id, Some(id));
        assert_eq!(form.incident_name, "Creek Fire");
        assert_eq!(form.form_type, FormType::Ics201);
        assert_eq!(form.status, "draft");
        assert_eq!(form.created_at, form.updated_at);
        assert!(get_form(&pool, id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_escapes_wildcards() {
        let pool = open_memory_pool().await.unwrap();
        insert_form(&pool, "Creek Fire", FormType::Ics201, "{}").await.unwrap();
        insert_form(&pool, "River Flood", FormType::Ics213, "{}").await.unwrap();
        insert_form(&pool, "100% Burn", FormType::Ics214, "{}").await.unwrap();

        let fire = search_forms(&pool, Some("fire")).await.unwrap();
        assert_eq!(fire.len(), 1);
        assert_eq!(fire[0].incident_name, "Creek Fire");

        let pct = search_forms(&pool, Some("%")).await.unwrap();
        assert_eq!(pct.len(), 1);
        assert_eq!(pct[0].incident_name, "100% Burn");

        assert_eq!(search_forms(&pool, None).await.unwrap().len(), 3);
        assert_eq!(search_forms(&pool, Some("  ")).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_rows() {
        let pool = open_memory_pool().await.unwrap();
        let id = insert_form(&pool, "Storm", FormType::Ics209, "{}").await.unwrap();
        assert!(update_form_data(&pool, id, r#"{"b":2}"#).await.unwrap());
        assert!(!update_form_data(&pool, id + 1, "{}").await.unwrap());
        assert_eq!(
            get_form(&pool, id).await.unwrap().unwrap().form_data,
            r#"{"b":2}"#
        );
        assert!(delete_form(&pool, id).await.unwrap());
        assert!(!delete_form(&pool, id).await.unwrap());
        assert_eq!(count_forms(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn store_rejects_malformed_json() {
        let pool = open_memory_pool().await.unwrap();
        let err = insert_form(&pool, "Storm", FormType::Ics209, "{bad").await;
        assert!(err.is_err());
    }

    #[test]
    fn like_pattern_escapes() {
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
        assert_eq!(like_pattern("fire"), "%fire%");
    }
}
