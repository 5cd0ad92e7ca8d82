/// Database connection configuration. `from_env` reads `ORCH_DATABASE_URL`,
/// falling back to [`DbConfig::DEFAULT_URL`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub database_url: String,
}

impl DbConfig {
    pub const DEFAULT_URL: &'static str = "postgresql://localhost:5432/orchestrator";

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }

    pub fn from_env() -> Self {
        let database_url =
            std::env::var("ORCH_DATABASE_URL").unwrap_or_else(|_| Self::DEFAULT_URL.to_owned());
        Self { database_url }
    }

    pub fn database_name(&self) -> &str {
        self.database_url.rsplit('/').next().unwrap_or_default()
    }

    /// URL pointing at the `postgres` maintenance database in the same
    /// cluster, used for `CREATE DATABASE`/`DROP DATABASE`.
    pub fn maintenance_url(&self) -> String {
        match self.database_url.rfind('/') {
            Some(idx) => format!("{}/postgres", &self.database_url[..idx]),
            None => self.database_url.clone(),
        }
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_name_is_the_final_path_segment() {
        let cfg = DbConfig::new("postgresql://localhost:5432/orchestrator");
        assert_eq!(cfg.database_name(), "orchestrator");
    }

    #[test]
    fn maintenance_url_swaps_in_postgres() {
        let cfg = DbConfig::new("postgresql://localhost:5432/orchestrator");
        assert_eq!(cfg.maintenance_url(), "postgresql://localhost:5432/postgres");
    }

    #[test]
    fn default_url_is_used_when_env_missing() {
        assert_eq!(DbConfig::DEFAULT_URL, "postgresql://localhost:5432/orchestrator");
    }
}
