//! Profile repository: display name and avatar lookups for local users.

use sqlx::PgPool;

/// A local user's public profile.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct Profile {
    pub localpart: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Find the profile of a local user by localpart.
pub async fn find_by_localpart(
    pool: &PgPool,
    localpart: &str,
) -> Result<Option<Profile>, sqlx::Error> {
    sqlx::query_as::<_, Profile>(
        "SELECT localpart, display_name, avatar_url FROM profiles WHERE localpart = $1",
    )
    .bind(localpart)
    .fetch_optional(pool)
    .await
}
