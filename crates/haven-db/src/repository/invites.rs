//! Invite repository: pending invites used to pick servers for a join.

use sqlx::{PgConnection, PgPool};

/// User IDs of everyone with a pending invite for `target_user_id` to `room_id`,
/// oldest invite first.
pub async fn inviter_ids(
    pool: &PgPool,
    room_id: &str,
    target_user_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT sender_user_id FROM room_invites
        WHERE room_id = $1 AND target_user_id = $2 AND NOT retired
        ORDER BY invited_at, invite_event_id
        "#,
    )
    .bind(room_id)
    .bind(target_user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(sender,)| sender).collect())
}

/// Mark every pending invite for the user to the room as consumed.
pub async fn retire_invites(
    conn: &mut PgConnection,
    room_id: &str,
    target_user_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE room_invites SET retired = TRUE
        WHERE room_id = $1 AND target_user_id = $2 AND NOT retired
        "#,
    )
    .bind(room_id)
    .bind(target_user_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
