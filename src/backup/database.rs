//! Database engines and their dump/replay commands
//!
//! The engine is inferred from the environment a container declares. The
//! commands run inside the container through `sh -c`, so credentials are
//! read from the container's own environment and never appear on the host
//! command line.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    Postgres,
    Mysql,
    Mariadb,
    Mongodb,
}

impl DatabaseEngine {
    /// Infer the engine from declared environment variables
    ///
    /// `MARIADB_*` is checked before `MYSQL_*` because MariaDB images accept
    /// both prefixes.
    pub fn detect(env: &[(String, String)]) -> Option<Self> {
        let has = |prefix: &str| env.iter().any(|(k, _)| k.starts_with(prefix));
        if has("POSTGRES_") {
            Some(DatabaseEngine::Postgres)
        } else if has("MARIADB_") {
            Some(DatabaseEngine::Mariadb)
        } else if has("MYSQL_") {
            Some(DatabaseEngine::Mysql)
        } else if has("MONGO_INITDB_") {
            Some(DatabaseEngine::Mongodb)
        } else {
            None
        }
    }

    /// Artifact file extension
    pub fn extension(&self) -> &'static str {
        match self {
            DatabaseEngine::Mongodb => "archive",
            _ => "sql",
        }
    }

    /// Command producing a full dump on stdout
    pub fn dump_command(&self) -> Vec<String> {
        shell(match self {
            DatabaseEngine::Postgres => {
                r#"exec pg_dumpall --clean --if-exists -U "${POSTGRES_USER:-postgres}""#
            }
            DatabaseEngine::Mysql => {
                r#"exec mysqldump --all-databases --single-transaction -uroot -p"$MYSQL_ROOT_PASSWORD""#
            }
            DatabaseEngine::Mariadb => {
                r#"exec mariadb-dump --all-databases --single-transaction -uroot -p"${MARIADB_ROOT_PASSWORD:-$MYSQL_ROOT_PASSWORD}""#
            }
            DatabaseEngine::Mongodb => {
                r#"exec mongodump --archive -u "$MONGO_INITDB_ROOT_USERNAME" -p "$MONGO_INITDB_ROOT_PASSWORD" --authenticationDatabase admin"#
            }
        })
    }

    /// Command replaying a dump read from stdin
    ///
    /// Postgres stops at the first SQL error. The connecting role always
    /// exists and cannot be dropped, so its DROP/CREATE lines are removed.
    pub fn restore_command(&self) -> Vec<String> {
        shell(match self {
            DatabaseEngine::Postgres => {
                r#"u="${POSTGRES_USER:-postgres}"; sed -e "/^DROP ROLE IF EXISTS $u;\$/d" -e "/^CREATE ROLE $u;\$/d" | psql -v ON_ERROR_STOP=1 -U "$u" -d postgres"#
            }
            DatabaseEngine::Mysql => r#"exec mysql -uroot -p"$MYSQL_ROOT_PASSWORD""#,
            DatabaseEngine::Mariadb => {
                r#"exec mariadb -uroot -p"${MARIADB_ROOT_PASSWORD:-$MYSQL_ROOT_PASSWORD}""#
            }
            DatabaseEngine::Mongodb => {
                r#"exec mongorestore --archive --drop -u "$MONGO_INITDB_ROOT_USERNAME" -p "$MONGO_INITDB_ROOT_PASSWORD" --authenticationDatabase admin"#
            }
        })
    }
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DatabaseEngine::Postgres => "postgres",
            DatabaseEngine::Mysql => "mysql",
            DatabaseEngine::Mariadb => "mariadb",
            DatabaseEngine::Mongodb => "mongodb",
        };
        write!(f, "{}", s)
    }
}

fn shell(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(keys: &[&str]) -> Vec<(String, String)> {
        keys.iter().map(|k| (k.to_string(), "x".to_string())).collect()
    }

    #[test]
    fn test_detect() {
        assert_eq!(
            DatabaseEngine::detect(&env(&["PATH", "POSTGRES_PASSWORD"])),
            Some(DatabaseEngine::Postgres)
        );
        assert_eq!(
            DatabaseEngine::detect(&env(&["MYSQL_ROOT_PASSWORD"])),
            Some(DatabaseEngine::Mysql)
        );
        assert_eq!(
            DatabaseEngine::detect(&env(&["MYSQL_DATABASE", "MARIADB_ROOT_PASSWORD"])),
            Some(DatabaseEngine::Mariadb)
        );
        assert_eq!(
            DatabaseEngine::detect(&env(&["MONGO_INITDB_ROOT_USERNAME"])),
            Some(DatabaseEngine::Mongodb)
        );
        assert_eq!(DatabaseEngine::detect(&env(&["REDIS_PASSWORD"])), None);
    }

    #[test]
    fn test_commands_read_credentials_in_container() {
        let cmd = DatabaseEngine::Mysql.dump_command();
        assert_eq!(&cmd[..2], &["sh", "-c"]);
        assert!(cmd[2].contains("$MYSQL_ROOT_PASSWORD"));
        assert_eq!(DatabaseEngine::Mongodb.extension(), "archive");
        assert_eq!(DatabaseEngine::Postgres.extension(), "sql");
    }

    #[test]
    fn test_postgres_replay_stops_on_sql_error() {
        let restore = DatabaseEngine::Postgres.restore_command();
        assert!(restore[2].contains("ON_ERROR_STOP=1"));
        assert!(!restore[2].contains("ON_ERROR_STOP=0"));
        assert!(restore[2].contains("/^CREATE ROLE $u;"));

        let dump = DatabaseEngine::Postgres.dump_command();
        assert!(dump[2].contains("--clean --if-exists"));
    }
}
