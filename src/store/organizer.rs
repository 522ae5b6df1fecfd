//! Row-level SQL for organizer entities.
//!
//! Free functions over a `libsql::Connection` so they run the same inside
//! a transaction (which derefs to its connection) and outside one. Table and
//! column names come from the schema registry or from static field lists,
//! never from model output.

use libsql::{Connection, Row, Value, params, params::Params};

use crate::answers::{FieldChange, FieldValue, Ownership, SchemaEntry, SchemaRegistry};
use crate::error::DatabaseError;
use crate::organizer::{CatalogItem, EntityKind, Link, Subtask, Task, TaskStatus, User, WireDateTime};

fn to_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Integer(i) => Value::Integer(*i),
        FieldValue::Bool(b) => Value::Integer(i64::from(*b)),
        FieldValue::Timestamp(t) => Value::Text(t.to_string()),
    }
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> Value {
    match s {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

/// Read a nullable text column.
fn text_column(row: &Row, idx: i32) -> Result<Option<String>, libsql::Error> {
    match row.get_value(idx)? {
        Value::Text(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

/// Read a nullable integer column.
fn int_column(row: &Row, idx: i32) -> Result<Option<i64>, libsql::Error> {
    match row.get_value(idx)? {
        Value::Integer(i) => Ok(Some(i)),
        _ => Ok(None),
    }
}

fn query_err(op: &str) -> impl Fn(libsql::Error) -> DatabaseError + '_ {
    move |e| DatabaseError::from_libsql(op, e)
}

/// Insert one entity row and return its id.
///
/// For user-owned kinds the owner column is stamped here; any `user_id`
/// the caller might have smuggled in is not part of `fields`.
pub async fn insert_entity(
    conn: &Connection,
    entry: &SchemaEntry,
    owner_id: i64,
    fields: &[FieldChange],
) -> Result<i64, DatabaseError> {
    let mut columns: Vec<&str> = Vec::with_capacity(fields.len() + 1);
    let mut values: Vec<Value> = Vec::with_capacity(fields.len() + 1);
    if entry.ownership == Ownership::User {
        columns.push("user_id");
        values.push(Value::Integer(owner_id));
    }
    for field in fields {
        columns.push(field.column);
        values.push(to_value(&field.value));
    }
    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING id",
        entry.table,
        columns.join(", "),
        placeholders.join(", ")
    );

    let op = format!("insert {}", entry.key);
    let mut rows = conn
        .query(&sql, Params::Positional(values))
        .await
        .map_err(query_err(&op))?;
    let row = rows
        .next()
        .await
        .map_err(query_err(&op))?
        .ok_or_else(|| DatabaseError::Query(format!("{op}: no id returned")))?;
    row.get::<i64>(0).map_err(query_err(&op))
}

/// Whether `id` names a row of this kind belonging to `owner_id`.
///
/// Subtasks belong to the owner of their parent task. With `live_only` the
/// row (and for subtasks, the parent) must not be soft-deleted.
pub async fn owned_row_exists(
    conn: &Connection,
    entry: &SchemaEntry,
    owner_id: i64,
    id: i64,
    live_only: bool,
) -> Result<bool, DatabaseError> {
    let sql = match (entry.ownership, live_only) {
        (Ownership::User, false) => {
            format!("SELECT 1 FROM {} WHERE id = ?1 AND user_id = ?2", entry.table)
        }
        (Ownership::User, true) => format!(
            "SELECT 1 FROM {} WHERE id = ?1 AND user_id = ?2 AND is_deleted = 0",
            entry.table
        ),
        (Ownership::ParentTask, false) => "SELECT 1 FROM subtasks s JOIN tasks t ON t.id = s.task_id \
             WHERE s.id = ?1 AND t.user_id = ?2"
            .to_string(),
        (Ownership::ParentTask, true) => "SELECT 1 FROM subtasks s JOIN tasks t ON t.id = s.task_id \
             WHERE s.id = ?1 AND t.user_id = ?2 AND s.is_deleted = 0 AND t.is_deleted = 0"
            .to_string(),
    };
    let op = format!("lookup {}", entry.key);
    let mut rows = conn
        .query(&sql, params![id, owner_id])
        .await
        .map_err(query_err(&op))?;
    Ok(rows.next().await.map_err(query_err(&op))?.is_some())
}

/// Apply column changes to one row and bump its `updated` stamp.
pub async fn update_entity(
    conn: &Connection,
    entry: &SchemaEntry,
    id: i64,
    changes: &[FieldChange],
) -> Result<(), DatabaseError> {
    let mut assignments: Vec<String> = Vec::with_capacity(changes.len() + 1);
    let mut values: Vec<Value> = Vec::with_capacity(changes.len() + 2);
    for (i, change) in changes.iter().enumerate() {
        assignments.push(format!("{} = ?{}", change.column, i + 1));
        values.push(to_value(&change.value));
    }
    assignments.push(format!("updated = ?{}", values.len() + 1));
    values.push(Value::Text(WireDateTime::now().to_string()));
    values.push(Value::Integer(id));

    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        entry.table,
        assignments.join(", "),
        values.len()
    );
    conn.execute(&sql, Params::Positional(values))
        .await
        .map_err(query_err(&format!("update {}", entry.key)))?;
    Ok(())
}

/// Soft-delete the row, or remove it when the kind has no soft-delete flag.
pub async fn delete_entity(
    conn: &Connection,
    entry: &SchemaEntry,
    id: i64,
) -> Result<(), DatabaseError> {
    let sql = if entry.soft_delete {
        format!(
            "UPDATE {} SET is_deleted = 1, updated = ?2 WHERE id = ?1",
            entry.table
        )
    } else {
        format!("DELETE FROM {} WHERE id = ?1", entry.table)
    };
    let op = format!("delete {}", entry.key);
    if entry.soft_delete {
        conn.execute(&sql, params![id, WireDateTime::now().to_string()])
            .await
            .map_err(query_err(&op))?;
    } else {
        conn.execute(&sql, params![id]).await.map_err(query_err(&op))?;
    }
    Ok(())
}

/// Current name of a row, if it exists.
pub async fn entity_name(
    conn: &Connection,
    entry: &SchemaEntry,
    id: i64,
) -> Result<Option<String>, DatabaseError> {
    let sql = format!("SELECT name FROM {} WHERE id = ?1", entry.table);
    let op = format!("read {} name", entry.key);
    let mut rows = conn.query(&sql, params![id]).await.map_err(query_err(&op))?;
    match rows.next().await.map_err(query_err(&op))? {
        Some(row) => Ok(Some(row.get::<String>(0).map_err(query_err(&op))?)),
        None => Ok(None),
    }
}

/// Live rows of one kind owned by `owner_id`, oldest first.
pub async fn catalog(
    conn: &Connection,
    entry: &SchemaEntry,
    owner_id: i64,
) -> Result<Vec<CatalogItem>, DatabaseError> {
    let sql = match entry.ownership {
        Ownership::User => format!(
            "SELECT id, name, NULL FROM {} WHERE user_id = ?1 AND is_deleted = 0 ORDER BY id",
            entry.table
        ),
        Ownership::ParentTask => "SELECT s.id, s.name, s.task_id FROM subtasks s \
             JOIN tasks t ON t.id = s.task_id \
             WHERE t.user_id = ?1 AND t.is_deleted = 0 AND s.is_deleted = 0 \
             ORDER BY s.task_id, s.position, s.id"
            .to_string(),
    };
    let op = format!("catalog {}", entry.key);
    let mut rows = conn.query(&sql, params![owner_id]).await.map_err(query_err(&op))?;
    let mut items = Vec::new();
    while let Some(row) = rows.next().await.map_err(query_err(&op))? {
        items.push(CatalogItem {
            id: row.get(0).map_err(query_err(&op))?,
            name: row.get(1).map_err(query_err(&op))?,
            parent_id: int_column(&row, 2).map_err(query_err(&op))?,
        });
    }
    Ok(items)
}

/// Link two entities. Re-linking an existing pair is a no-op.
pub async fn link_entities(
    conn: &Connection,
    a: (EntityKind, i64),
    b: (EntityKind, i64),
) -> Result<(), DatabaseError> {
    let table = EntityKind::link_table(a.0, b.0).ok_or_else(|| {
        DatabaseError::Constraint(format!("{} and {} cannot be linked", a.0, b.0))
    })?;
    let (first, second) = if a.0.index() < b.0.index() { (a, b) } else { (b, a) };
    let sql = format!(
        "INSERT OR IGNORE INTO {table} ({}_id, {}_id) VALUES (?1, ?2)",
        first.0.singular(),
        second.0.singular()
    );
    conn.execute(&sql, params![first.1, second.1])
        .await
        .map_err(query_err(&format!("link {table}")))?;
    Ok(())
}

/// All links between live entities of `owner_id`.
pub async fn list_links(
    conn: &Connection,
    registry: &SchemaRegistry,
    owner_id: i64,
) -> Result<Vec<Link>, DatabaseError> {
    let mut links = Vec::new();
    for (i, &a) in EntityKind::LINKABLE.iter().enumerate() {
        for &b in &EntityKind::LINKABLE[i + 1..] {
            let Some(table) = EntityKind::link_table(a, b) else {
                continue;
            };
            let sql = format!(
                "SELECT l.{a}_id, l.{b}_id FROM {table} l \
                 JOIN {at} x ON x.id = l.{a}_id \
                 JOIN {bt} y ON y.id = l.{b}_id \
                 WHERE x.user_id = ?1 AND x.is_deleted = 0 AND y.is_deleted = 0 \
                 ORDER BY l.{a}_id, l.{b}_id",
                a = a.singular(),
                b = b.singular(),
                at = registry.entry(a).table,
                bt = registry.entry(b).table,
            );
            let op = format!("list {table}");
            let mut rows = conn.query(&sql, params![owner_id]).await.map_err(query_err(&op))?;
            while let Some(row) = rows.next().await.map_err(query_err(&op))? {
                links.push(Link {
                    table: table.clone(),
                    left_id: row.get(0).map_err(query_err(&op))?,
                    right_id: row.get(1).map_err(query_err(&op))?,
                });
            }
        }
    }
    Ok(links)
}

// ── Users ───────────────────────────────────────────────────────────

fn row_to_user(row: &Row) -> Result<User, libsql::Error> {
    Ok(User {
        id: row.get(0)?,
        tg_id: row.get(1)?,
        name: text_column(row, 2)?,
        last_name: text_column(row, 3)?,
    })
}

/// Register a chat identity, refreshing the name if it is already known.
pub async fn upsert_user(
    conn: &Connection,
    tg_id: i64,
    name: Option<&str>,
    last_name: Option<&str>,
) -> Result<User, DatabaseError> {
    let mut rows = conn
        .query(
            "INSERT INTO users (tg_id, name, last_name) VALUES (?1, ?2, ?3)
             ON CONFLICT(tg_id) DO UPDATE SET
                name = excluded.name,
                last_name = excluded.last_name,
                updated = datetime('now')
             RETURNING id, tg_id, name, last_name",
            params![tg_id, opt_text(name), opt_text(last_name)],
        )
        .await
        .map_err(query_err("upsert user"))?;
    let row = rows
        .next()
        .await
        .map_err(query_err("upsert user"))?
        .ok_or_else(|| DatabaseError::Query("upsert user: no row returned".into()))?;
    row_to_user(&row).map_err(query_err("upsert user"))
}

pub async fn get_user_by_tg_id(conn: &Connection, tg_id: i64) -> Result<Option<User>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT id, tg_id, name, last_name FROM users WHERE tg_id = ?1",
            params![tg_id],
        )
        .await
        .map_err(query_err("get user"))?;
    match rows.next().await.map_err(query_err("get user"))? {
        Some(row) => Ok(Some(row_to_user(&row).map_err(query_err("get user"))?)),
        None => Ok(None),
    }
}

// ── Tasks ───────────────────────────────────────────────────────────

const TASK_COLUMNS: &str =
    "id, user_id, name, description, status, deadline, is_deleted, created, updated";

fn parse_time(raw: &str) -> Result<WireDateTime, DatabaseError> {
    WireDateTime::parse(raw)
        .map_err(|e| DatabaseError::Serialization(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_optional_time(raw: Option<String>) -> Result<Option<WireDateTime>, DatabaseError> {
    raw.as_deref().map(parse_time).transpose()
}

fn row_to_task(row: &Row) -> Result<Task, DatabaseError> {
    let op = "read task";
    let status: String = row.get(4).map_err(query_err(op))?;
    let created: String = row.get(7).map_err(query_err(op))?;
    let updated: String = row.get(8).map_err(query_err(op))?;
    Ok(Task {
        id: row.get(0).map_err(query_err(op))?,
        user_id: row.get(1).map_err(query_err(op))?,
        name: row.get(2).map_err(query_err(op))?,
        description: text_column(row, 3).map_err(query_err(op))?,
        status: status.parse::<TaskStatus>().map_err(DatabaseError::Serialization)?,
        deadline: parse_optional_time(text_column(row, 5).map_err(query_err(op))?)?,
        is_deleted: row.get::<i64>(6).map_err(query_err(op))? != 0,
        created: parse_time(&created)?,
        updated: parse_time(&updated)?,
    })
}

/// Task by id within owner scope, including soft-deleted rows.
pub async fn get_task(conn: &Connection, owner_id: i64, id: i64) -> Result<Option<Task>, DatabaseError> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND user_id = ?2");
    let mut rows = conn
        .query(&sql, params![id, owner_id])
        .await
        .map_err(query_err("get task"))?;
    match rows.next().await.map_err(query_err("get task"))? {
        Some(row) => Ok(Some(row_to_task(&row)?)),
        None => Ok(None),
    }
}

/// Live tasks of the owner, newest first.
pub async fn list_tasks(conn: &Connection, owner_id: i64) -> Result<Vec<Task>, DatabaseError> {
    let sql = format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 AND is_deleted = 0 ORDER BY id DESC"
    );
    let mut rows = conn
        .query(&sql, params![owner_id])
        .await
        .map_err(query_err("list tasks"))?;
    let mut tasks = Vec::new();
    while let Some(row) = rows.next().await.map_err(query_err("list tasks"))? {
        tasks.push(row_to_task(&row)?);
    }
    Ok(tasks)
}

/// Live subtasks of a task in display order.
pub async fn list_subtasks(conn: &Connection, task_id: i64) -> Result<Vec<Subtask>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT id, task_id, name, position, deadline, is_done, is_deleted
             FROM subtasks WHERE task_id = ?1 AND is_deleted = 0
             ORDER BY position, id",
            params![task_id],
        )
        .await
        .map_err(query_err("list subtasks"))?;
    let op = "read subtask";
    let mut subtasks = Vec::new();
    while let Some(row) = rows.next().await.map_err(query_err("list subtasks"))? {
        subtasks.push(Subtask {
            id: row.get(0).map_err(query_err(op))?,
            task_id: row.get(1).map_err(query_err(op))?,
            name: row.get(2).map_err(query_err(op))?,
            position: row.get(3).map_err(query_err(op))?,
            deadline: parse_optional_time(text_column(&row, 4).map_err(query_err(op))?)?,
            is_done: row.get::<i64>(5).map_err(query_err(op))? != 0,
            is_deleted: row.get::<i64>(6).map_err(query_err(op))? != 0,
        });
    }
    Ok(subtasks)
}

pub async fn set_task_status(
    conn: &Connection,
    id: i64,
    status: TaskStatus,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE tasks SET status = ?1, updated = ?2 WHERE id = ?3",
        params![status.as_str(), WireDateTime::now().to_string(), id],
    )
    .await
    .map_err(query_err("set task status"))?;
    Ok(())
}
