use sqlx::PgExecutor;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
    pub created_at: i64,
}

pub async fn get(db: impl PgExecutor<'_>, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT id, email, name, is_admin, created_at FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await
}
