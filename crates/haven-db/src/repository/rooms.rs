//! Room repository: room versions, the event graph, and current state.
//!
//! Only the bookkeeping needed to append membership events lives here. State
//! resolution is not performed: the current state row for a `(type, state_key)`
//! is simply the last event written for it.

use serde_json::Value;
use sqlx::{PgConnection, PgPool};

/// A forward extremity of a room's event graph.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LatestEvent {
    pub event_id: String,
    pub depth: i64,
    /// `hashes.sha256` of the stored event, needed by v1-format references.
    pub sha256: Option<String>,
}

/// A current-state entry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StateRef {
    pub event_type: String,
    pub state_key: String,
    pub event_id: String,
    pub sha256: Option<String>,
}

/// An event ready to be appended to `room_events`.
#[derive(Debug)]
pub struct NewEvent<'a> {
    pub event_id: &'a str,
    pub room_id: &'a str,
    pub event_type: &'a str,
    pub state_key: Option<&'a str>,
    pub sender: &'a str,
    pub depth: i64,
    pub origin_server_ts: i64,
    pub event_json: &'a Value,
    /// Outliers are stored (e.g. state received over federation) but never
    /// become forward extremities.
    pub is_outlier: bool,
}

/// Room version of a room this server knows about, `None` if the room is absent.
pub async fn room_version(pool: &PgPool, room_id: &str) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT room_version FROM rooms WHERE room_id = $1")
        .bind(room_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(v,)| v))
}

/// Current forward extremities of a room.
pub async fn latest_events(pool: &PgPool, room_id: &str) -> Result<Vec<LatestEvent>, sqlx::Error> {
    sqlx::query_as::<_, LatestEvent>(
        r#"
        SELECT e.event_id, e.depth, e.event_json->'hashes'->>'sha256' AS sha256
        FROM room_forward_extremities f
        JOIN room_events e ON e.event_id = f.event_id
        WHERE f.room_id = $1
        ORDER BY e.depth DESC, e.event_id
        "#,
    )
    .bind(room_id)
    .fetch_all(pool)
    .await
}

/// Current-state entries for the requested `(event_type, state_key)` tuples.
pub async fn state_refs(
    pool: &PgPool,
    room_id: &str,
    wanted: &[(String, String)],
) -> Result<Vec<StateRef>, sqlx::Error> {
    let (types, keys): (Vec<String>, Vec<String>) = wanted.iter().cloned().unzip();
    sqlx::query_as::<_, StateRef>(
        r#"
        SELECT s.event_type, s.state_key, s.event_id, e.event_json->'hashes'->>'sha256' AS sha256
        FROM room_state s
        JOIN room_events e ON e.event_id = s.event_id
        WHERE s.room_id = $1
          AND (s.event_type, s.state_key) IN (SELECT * FROM UNNEST($2::text[], $3::text[]))
        ORDER BY s.event_type, s.state_key
        "#,
    )
    .bind(room_id)
    .bind(types)
    .bind(keys)
    .fetch_all(pool)
    .await
}

/// Record a room and its version if it isn't known yet.
pub async fn ensure_room(
    conn: &mut PgConnection,
    room_id: &str,
    room_version: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO rooms (room_id, room_version)
        VALUES ($1, $2)
        ON CONFLICT (room_id) DO NOTHING
        "#,
    )
    .bind(room_id)
    .bind(room_version)
    .execute(conn)
    .await?;
    Ok(())
}

/// Append an event. Returns `false` if the event was already stored.
pub async fn insert_event(
    conn: &mut PgConnection,
    event: &NewEvent<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO room_events
            (event_id, room_id, event_type, state_key, sender, depth,
             origin_server_ts, event_json, is_outlier)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (event_id) DO NOTHING
        "#,
    )
    .bind(event.event_id)
    .bind(event.room_id)
    .bind(event.event_type)
    .bind(event.state_key)
    .bind(event.sender)
    .bind(event.depth)
    .bind(event.origin_server_ts)
    .bind(event.event_json)
    .bind(event.is_outlier)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Make `event_id` a forward extremity, retiring the events it references.
pub async fn advance_forward_extremities(
    conn: &mut PgConnection,
    room_id: &str,
    event_id: &str,
    prev_event_ids: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM room_forward_extremities WHERE room_id = $1 AND event_id = ANY($2)")
        .bind(room_id)
        .bind(prev_event_ids)
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        r#"
        INSERT INTO room_forward_extremities (room_id, event_id)
        VALUES ($1, $2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(room_id)
    .bind(event_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Point the current state for `(event_type, state_key)` at `event_id`.
pub async fn set_current_state(
    conn: &mut PgConnection,
    room_id: &str,
    event_type: &str,
    state_key: &str,
    event_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO room_state (room_id, event_type, state_key, event_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (room_id, event_type, state_key) DO UPDATE SET event_id = EXCLUDED.event_id
        "#,
    )
    .bind(room_id)
    .bind(event_type)
    .bind(state_key)
    .bind(event_id)
    .execute(conn)
    .await?;
    Ok(())
}
