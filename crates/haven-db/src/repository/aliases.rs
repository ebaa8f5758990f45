//! Room alias directory for aliases owned by this server.

use sqlx::PgPool;

/// Resolve a local alias (`#foo:this.server`) to its room ID.
pub async fn room_id_for_alias(pool: &PgPool, alias: &str) -> Result<Option<String>, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT room_id FROM room_aliases WHERE alias = $1")
        .bind(alias)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(room_id,)| room_id))
}
