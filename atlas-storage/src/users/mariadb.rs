use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{mysql::MySqlRow, MySqlPool, Row};

use atlas_slo::{errors, Result};

use super::{User, UserStore};

#[derive(Clone, Debug)]
pub struct UserImpl {
    pool: MySqlPool,
}

impl UserImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn roles_of(&self, user_id: u64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"SELECT r.`name` FROM `roles` r
            INNER JOIN `user_roles` ur ON ur.`role_id` = r.`id`
            WHERE ur.`user_id` = ?
            ORDER BY r.`name`;"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(errors::any)?;
        rows.iter()
            .map(|row| row.try_get("name").map_err(errors::any))
            .collect()
    }

    async fn with_roles(&self, row: Option<MySqlRow>) -> Result<Option<User>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let mut user = user_from_row(&row)?;
        user.roles = self.roles_of(user.id).await?;
        Ok(Some(user))
    }
}

fn user_from_row(row: &MySqlRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id").map_err(errors::any)?,
        username: row.try_get("username").map_err(errors::any)?,
        password_hash: row.try_get("password_hash").map_err(errors::any)?,
        roles: Vec::new(),
        created_at: row.try_get("created_at").map_err(errors::any)?,
    })
}

#[async_trait]
impl UserStore for UserImpl {
    #[tracing::instrument(skip(self))]
    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"SELECT `id`,`username`,`password_hash`,`created_at`
            FROM `users` WHERE `username` = ?;"#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(errors::any)?;
        self.with_roles(row).await
    }

    #[tracing::instrument(skip(self))]
    async fn find_by_id(&self, id: u64) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"SELECT `id`,`username`,`password_hash`,`created_at`
            FROM `users` WHERE `id` = ?;"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(errors::any)?;
        self.with_roles(row).await
    }

    #[tracing::instrument(skip(self, password_hash))]
    async fn create(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Option<User>> {
        let result = sqlx::query(
            r#"INSERT INTO `users` (`username`,`password_hash`) VALUES(?,?);"#,
        )
        .bind(username)
        .bind(password_hash)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => self.find_by_username(username).await,
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Ok(None)
            }
            Err(err) => Err(errors::any(err)),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn list(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(
            r#"SELECT `id`,`username`,`password_hash`,`created_at`
            FROM `users` ORDER BY `id`;"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(errors::any)?;

        let grants = sqlx::query(
            r#"SELECT ur.`user_id`, r.`name` FROM `user_roles` ur
            INNER JOIN `roles` r ON r.`id` = ur.`role_id`
            ORDER BY r.`name`;"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(errors::any)?;
        let mut roles: HashMap<u64, Vec<String>> = HashMap::new();
        for row in grants {
            roles
                .entry(row.try_get("user_id").map_err(errors::any)?)
                .or_default()
                .push(row.try_get("name").map_err(errors::any)?);
        }

        rows.iter()
            .map(|row| {
                let mut user = user_from_row(row)?;
                user.roles = roles.remove(&user.id).unwrap_or_default();
                Ok(user)
            })
            .collect()
    }

    #[tracing::instrument(skip(self))]
    async fn grant_role(
        &self,
        username: &str,
        role: &str,
    ) -> Result<Option<User>> {
        let mut tx = self.pool.begin().await.map_err(errors::any)?;
        let Some(user_id) =
            sqlx::query(r#"SELECT `id` FROM `users` WHERE `username` = ?;"#)
                .bind(username)
                .fetch_optional(&mut *tx)
                .await
                .map_err(errors::any)?
                .map(|row| row.try_get::<u64, _>("id"))
                .transpose()
                .map_err(errors::any)?
        else {
            return Ok(None);
        };

        sqlx::query(r#"INSERT IGNORE INTO `roles` (`name`) VALUES(?);"#)
            .bind(role)
            .execute(&mut *tx)
            .await
            .map_err(errors::any)?;
        let role_id = sqlx::query(r#"SELECT `id` FROM `roles` WHERE `name` = ?;"#)
            .bind(role)
            .fetch_one(&mut *tx)
            .await
            .map_err(errors::any)?
            .try_get::<u64, _>("id")
            .map_err(errors::any)?;
        sqlx::query(
            r#"INSERT IGNORE INTO `user_roles` (`user_id`,`role_id`) VALUES(?,?);"#,
        )
        .bind(user_id)
        .bind(role_id)
        .execute(&mut *tx)
        .await
        .map_err(errors::any)?;
        tx.commit().await.map_err(errors::any)?;

        self.find_by_id(user_id).await
    }
}

#[cfg(test)]
mod tests {
    const SCHEMA: &str =
        include_str!("../../migrations/20240601000000_init.sql");

    fn column(name: &str) -> &'static str {
        SCHEMA
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with(&format!("`{name}`")))
            .unwrap()
    }

    // `find_by_username` and the role lookups compare with `=`, which
    // follows the column collation.
    #[test]
    fn names_compare_byte_for_byte() {
        for name in ["username", "name"] {
            assert!(
                column(name).contains("COLLATE utf8mb4_bin"),
                "`{name}` must not use a case-insensitive collation"
            );
        }
    }
}
