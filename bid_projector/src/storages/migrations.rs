use sqlx::postgres::PgPool;
use sqlx::Row;

pub const SCRIPTS_UP: [(&str, &str); 4] = [
    (
        "2024-11-09-120000_create_table_bids_history",
        include_str!("./migrations/2024-11-09-120000_create_table_bids_history/up.sql"),
    ),
    (
        "2024-11-09-120100_index_bids_history_desc",
        include_str!("./migrations/2024-11-09-120100_index_bids_history_desc/up.sql"),
    ),
    (
        "2024-11-09-120200_index_bids_history_asc",
        include_str!("./migrations/2024-11-09-120200_index_bids_history_asc/up.sql"),
    ),
    (
        "2024-11-09-120300_create_table_auctions_view",
        include_str!("./migrations/2024-11-09-120300_create_table_auctions_view/up.sql"),
    ),
];

pub struct Migrations {}

impl Migrations {
    pub fn new() -> Self {
        Self {}
    }

    async fn insert_migration(&self, pool: &PgPool, version: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO __schema_migrations (version) VALUES ($1)")
            .bind(version)
            .execute(pool)
            .await?;
        Ok(())
    }

    async fn create_table(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        log::debug!("creating migration table __schema_migrations");
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS __schema_migrations (
                version VARCHAR(50) PRIMARY KEY NOT NULL,
                run_on TIMESTAMP NOT NULL DEFAULT current_timestamp
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn exists(&self, pool: &PgPool, version: &str) -> Result<bool, sqlx::Error> {
        log::trace!("check if migration {} exists", version);
        let row = sqlx::query("SELECT COUNT(*) FROM __schema_migrations WHERE version = $1")
            .bind(version)
            .fetch_one(pool)
            .await?;
        let count: i64 = row.try_get(0)?;

        Ok(count > 0)
    }

    fn parse_name(&self, name: &str) -> String {
        let v: Vec<&str> = name.split('_').collect();
        if !v.is_empty() {
            v[0].replace('-', "")
        } else {
            "".to_string()
        }
    }

    /// Migrate all scripts up
    pub async fn up(&self, pool: &PgPool, scripts: &[(&str, &str)]) -> Result<(), sqlx::Error> {
        log::info!("migrating up to __schema_migrations");
        self.create_table(pool).await?;
        for (name, script) in scripts {
            let version = &self.parse_name(name);
            if !self.exists(pool, version).await? {
                log::debug!("run migration {}", name);
                sqlx::query(script).execute(pool).await?;
                self.insert_migration(pool, version).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_versions_are_unique() {
        let migrations = Migrations::new();
        let mut versions: Vec<String> = SCRIPTS_UP
            .iter()
            .map(|(name, _)| migrations.parse_name(name))
            .collect();
        versions.sort();
        versions.dedup();
        assert_eq!(SCRIPTS_UP.len(), versions.len());
    }
}
