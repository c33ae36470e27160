//! Database type definitions
//!
//! This module defines the database families a backend can belong to.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported database types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// MySQL/MariaDB database, the dialect the generated SQL targets
    #[default]
    Mysql,
    /// SQLite database
    Sqlite,
}

impl DatabaseType {
    /// Convert database type to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            DatabaseType::Mysql => "mysql",
            DatabaseType::Sqlite => "sqlite",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(DatabaseType::Mysql),
            "sqlite" | "sqlite3" => Ok(DatabaseType::Sqlite),
            _ => Err(format!("Invalid database type: '{}'", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_to_str() {
        assert_eq!(DatabaseType::Mysql.to_str(), "mysql");
        assert_eq!(DatabaseType::Sqlite.to_str(), "sqlite");
        assert_eq!(DatabaseType::default(), DatabaseType::Mysql);
    }

    #[test]
    fn test_database_type_from_str() {
        assert_eq!("MySQL".parse::<DatabaseType>().ok(), Some(DatabaseType::Mysql));
        assert_eq!("mariadb".parse::<DatabaseType>().ok(), Some(DatabaseType::Mysql));
        assert_eq!("sqlite3".parse::<DatabaseType>().ok(), Some(DatabaseType::Sqlite));
        assert_eq!("postgres".parse::<DatabaseType>().ok(), None);
    }
}
