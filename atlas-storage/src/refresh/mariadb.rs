use async_trait::async_trait;
use sqlx::{mysql::MySqlRow, MySqlConnection, MySqlPool, Row};

use atlas_slo::{errors, Result};

use super::{NewRefreshToken, RefreshToken, RefreshTokenStore};

#[derive(Clone, Debug)]
pub struct RefreshTokenImpl {
    pool: MySqlPool,
}

impl RefreshTokenImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

async fn delete_then_insert(
    conn: &mut MySqlConnection,
    token: &NewRefreshToken,
) -> Result<()> {
    sqlx::query(r#"DELETE FROM `refresh_tokens` WHERE `user_id` = ?;"#)
        .bind(token.user_id)
        .execute(&mut *conn)
        .await
        .map_err(errors::any)?;
    sqlx::query(
        r#"INSERT INTO `refresh_tokens`
        (`user_id`,`token_hash`,`expires_at`)
        VALUES(?,?,?);"#,
    )
    .bind(token.user_id)
    .bind(&token.token_hash)
    .bind(token.expires_at)
    .execute(&mut *conn)
    .await
    .map_err(errors::any)?;
    Ok(())
}

fn token_from_row(row: &MySqlRow) -> Result<RefreshToken> {
    Ok(RefreshToken {
        id: row.try_get("id").map_err(errors::any)?,
        user_id: row.try_get("user_id").map_err(errors::any)?,
        token_hash: row.try_get("token_hash").map_err(errors::any)?,
        created_at: row.try_get("created_at").map_err(errors::any)?,
        expires_at: row.try_get("expires_at").map_err(errors::any)?,
        revoked_at: row.try_get("revoked_at").map_err(errors::any)?,
    })
}

#[async_trait]
impl RefreshTokenStore for RefreshTokenImpl {
    #[tracing::instrument(skip_all)]
    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>> {
        sqlx::query(
            r#"SELECT `id`,`user_id`,`token_hash`,`created_at`,`expires_at`,`revoked_at`
            FROM `refresh_tokens` WHERE `token_hash` = ?;"#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(errors::any)?
        .as_ref()
        .map(token_from_row)
        .transpose()
    }

    #[tracing::instrument(skip_all, fields(user_id = token.user_id))]
    async fn replace_for_user(&self, token: &NewRefreshToken) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(errors::any)?;
        delete_then_insert(&mut tx, token).await?;
        tx.commit().await.map_err(errors::any)
    }

    #[tracing::instrument(skip_all, fields(user_id = token.user_id))]
    async fn rotate(
        &self,
        old_hash: &str,
        token: &NewRefreshToken,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(errors::any)?;
        // the row lock taken here serializes concurrent rotations of one secret
        let consumed = sqlx::query(
            r#"DELETE FROM `refresh_tokens`
            WHERE `token_hash` = ? AND `user_id` = ?;"#,
        )
        .bind(old_hash)
        .bind(token.user_id)
        .execute(&mut *tx)
        .await
        .map_err(errors::any)?
        .rows_affected();
        if consumed != 1 {
            tx.rollback().await.map_err(errors::any)?;
            return Ok(false);
        }
        delete_then_insert(&mut tx, token).await?;
        tx.commit().await.map_err(errors::any)?;
        Ok(true)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_for_user(&self, user_id: u64) -> Result<u64> {
        Ok(sqlx::query(r#"DELETE FROM `refresh_tokens` WHERE `user_id` = ?;"#)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(errors::any)?
            .rows_affected())
    }
}
