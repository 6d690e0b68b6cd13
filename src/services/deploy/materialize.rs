//! Stack configuration materialization
//!
//! Renders the environment file and the database bootstrap SQL consumed by
//! the container stack. Rendering is deterministic, so re-running a deploy
//! overwrites the files with identical bytes.

use std::path::Path;

use crate::config::stack::COMPOSE_FILE;
use crate::config::EnvConfig;
use crate::infra::{LogLevel, LogSink};

/// Bootstrap SQL filename, mounted into the database's initdb directory
pub const INIT_SQL_FILE: &str = "initdb/init-analytics.sql";

/// Write the stack's compose file, environment file, bootstrap SQL and data
/// directories
pub fn materialize(config: &EnvConfig, sink: &LogSink) -> std::io::Result<()> {
    let dir = &config.stack_dir;

    std::fs::create_dir_all(dir.join("data/processed"))?;
    std::fs::create_dir_all(dir.join("initdb"))?;

    write_file(&dir.join(COMPOSE_FILE), &render_compose_file(config))?;
    write_file(&dir.join(".env"), &render_env_file(config))?;
    write_file(&dir.join(INIT_SQL_FILE), &render_init_sql(config))?;

    sink.record(
        LogLevel::Warning,
        "Stack credentials are materialized in plaintext in .env",
    );
    sink.record(
        LogLevel::Info,
        &format!("Stack configuration materialized in {}", dir.display()),
    );
    Ok(())
}

fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    std::fs::write(path, content)
}

/// Compose file for the stack
///
/// The ETL image carries the external load job; it is built and pushed
/// elsewhere, so `compose build` has nothing to do here.
pub fn render_compose_file(config: &EnvConfig) -> String {
    let db = &config.database;
    let dash = &config.dashboard;
    format!(
        r#"# Generated by covidviz-agent. Re-running deploy overwrites this file.
services:
  postgres-analytics:
    image: postgres:15-alpine
    restart: unless-stopped
    environment:
      POSTGRES_USER: {user}
      POSTGRES_PASSWORD: {password}
      POSTGRES_DB: {database}
    ports:
      - "{db_port}:5432"
    volumes:
      - postgres-data:/var/lib/postgresql/data
      - ./initdb:/docker-entrypoint-initdb.d:ro

  redis:
    image: redis:7-alpine
    restart: unless-stopped
    ports:
      - "6379:6379"

  grafana:
    image: grafana/grafana:10.4.2
    restart: unless-stopped
    env_file: .env
    ports:
      - "{gf_port}:3000"
    depends_on:
      - postgres-analytics

  airflow-webserver:
    image: apache/airflow:2.9.1
    restart: unless-stopped
    env_file: .env
    command: standalone
    ports:
      - "{af_port}:8080"
    depends_on:
      - postgres-analytics

  etl-agent:
    image: covidviz/etl:latest
    restart: unless-stopped
    env_file: .env
    volumes:
      - ./data:/app/data
      - ./logs:/app/logs
    depends_on:
      - postgres-analytics
      - redis

volumes:
  postgres-data:
"#,
        user = db.user,
        password = db.password,
        database = db.database,
        db_port = db.port,
        gf_port = dash.grafana_port,
        af_port = dash.airflow_port,
    )
}

/// Environment file consumed by the compose stack at service start
pub fn render_env_file(config: &EnvConfig) -> String {
    let db = &config.database;
    let dash = &config.dashboard;
    format!(
        r#"# Generated by covidviz-agent. Re-running deploy overwrites this file.
POSTGRES_HOST={host}
POSTGRES_PORT={port}
POSTGRES_USER={user}
POSTGRES_PASSWORD={password}
POSTGRES_DB={database}
DATABASE_URL={url}
REDIS_URL={redis}
GF_SECURITY_ADMIN_USER={gf_user}
GF_SECURITY_ADMIN_PASSWORD={gf_password}
GRAFANA_PORT={gf_port}
AIRFLOW_PORT={af_port}
"#,
        host = db.host,
        port = db.port,
        user = db.user,
        password = db.password,
        database = db.database,
        url = db.url(),
        redis = config.cache.url,
        gf_user = dash.grafana_admin_user,
        gf_password = dash.grafana_admin_password,
        gf_port = dash.grafana_port,
        af_port = dash.airflow_port,
    )
}

/// Database bootstrap: extensions, analytics role and grants
///
/// Runs once at database initialization. Every statement is idempotent.
/// The analytical index statements are kept but disabled; the ETL job owns
/// the table schema and creates them when the tables exist.
pub fn render_init_sql(config: &EnvConfig) -> String {
    let db = &config.database;
    format!(
        r#"-- Bootstrap for the analytics database. Safe to re-run.
CREATE EXTENSION IF NOT EXISTS pg_stat_statements;
CREATE EXTENSION IF NOT EXISTS pg_trgm;

DO $$
BEGIN
   IF NOT EXISTS (SELECT FROM pg_roles WHERE rolname = '{user}') THEN
      CREATE ROLE {user} LOGIN PASSWORD '{password}';
   END IF;
END
$$;

GRANT ALL PRIVILEGES ON DATABASE {database} TO {user};

-- CREATE INDEX IF NOT EXISTS ix_covid_country_date
--     ON covid_daily_data (iso_code, date);
-- CREATE INDEX IF NOT EXISTS ix_covid_date_incidence
--     ON covid_daily_data (date, incidence_rate_100k);
"#,
        user = db.user,
        password = db.password,
        database = db.database,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> EnvConfig {
        let mut config = EnvConfig::from_env();
        config.stack_dir =
            std::env::temp_dir().join(format!("materialize-test-{}", uuid::Uuid::new_v4()));
        config
    }

    fn temp_sink() -> LogSink {
        let dir = std::env::temp_dir().join(format!("materialize-sink-{}", uuid::Uuid::new_v4()));
        LogSink::new(dir, 7)
    }

    #[test]
    fn test_materialize_twice_is_byte_identical() {
        let config = test_config();
        let sink = temp_sink();

        materialize(&config, &sink).unwrap();
        let env_first = std::fs::read(config.stack_dir.join(".env")).unwrap();
        let sql_first = std::fs::read(config.stack_dir.join(INIT_SQL_FILE)).unwrap();
        let compose_first = std::fs::read(config.stack_dir.join(COMPOSE_FILE)).unwrap();

        materialize(&config, &sink).unwrap();
        let env_second = std::fs::read(config.stack_dir.join(".env")).unwrap();
        let sql_second = std::fs::read(config.stack_dir.join(INIT_SQL_FILE)).unwrap();
        let compose_second = std::fs::read(config.stack_dir.join(COMPOSE_FILE)).unwrap();

        assert_eq!(env_first, env_second);
        assert_eq!(sql_first, sql_second);
        assert_eq!(compose_first, compose_second);
    }

    #[test]
    fn test_compose_file_covers_the_stack() {
        let config = test_config();
        let rendered = render_compose_file(&config);
        for service in crate::config::stack::stack_services(&config) {
            assert!(
                rendered.contains(&format!("  {}:", service.compose_service)),
                "compose file missing {}",
                service.compose_service
            );
        }
    }

    #[test]
    fn test_materialize_creates_data_directories() {
        let config = test_config();
        materialize(&config, &temp_sink()).unwrap();
        assert!(config.stack_dir.join("data/processed").is_dir());
    }

    #[test]
    fn test_env_file_surface() {
        let config = test_config();
        let rendered = render_env_file(&config);
        for key in [
            "POSTGRES_USER=",
            "POSTGRES_PASSWORD=",
            "DATABASE_URL=",
            "REDIS_URL=",
            "GF_SECURITY_ADMIN_USER=",
            "GF_SECURITY_ADMIN_PASSWORD=",
        ] {
            assert!(rendered.contains(key), "missing {}", key);
        }
    }

    #[test]
    fn test_init_sql_is_idempotent_flavored() {
        let config = test_config();
        let sql = render_init_sql(&config);
        assert!(sql.contains("CREATE EXTENSION IF NOT EXISTS pg_stat_statements;"));
        assert!(sql.contains("IF NOT EXISTS (SELECT FROM pg_roles"));
        // index creation stays disabled
        assert!(sql.contains("-- CREATE INDEX IF NOT EXISTS ix_covid_country_date"));
    }
}
