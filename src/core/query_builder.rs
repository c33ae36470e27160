//! SQL statement builders
//!
//! Builders emit `?`-placeholder SQL together with the values to bind, so no
//! value ever reaches the server as text. A [`Statement`] can still render
//! its literal form for logging.

use super::value::DatabaseValue;
use crate::model::render_value;

/// SQL comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Equal to (=)
    Eq,
    /// IS NULL
    IsNull,
}

/// WHERE clause condition
#[derive(Debug, Clone)]
pub struct Condition {
    column: String,
    operator: Operator,
    value: Option<DatabaseValue>,
}

impl Condition {
    fn eq(column: &str, value: DatabaseValue) -> Self {
        Self {
            column: column.to_string(),
            operator: Operator::Eq,
            value: Some(value),
        }
    }

    fn is_null(column: &str) -> Self {
        Self {
            column: column.to_string(),
            operator: Operator::IsNull,
            value: None,
        }
    }

    fn to_sql(&self) -> String {
        match self.operator {
            Operator::Eq => format!("{} = ?", self.column),
            Operator::IsNull => format!("{} IS NULL", self.column),
        }
    }
}

fn where_clause(conditions: &[Condition]) -> String {
    if conditions.is_empty() {
        return String::new();
    }
    let predicates: Vec<String> = conditions.iter().map(Condition::to_sql).collect();
    format!(" WHERE {}", predicates.join(" AND "))
}

fn where_params(conditions: &[Condition]) -> impl Iterator<Item = DatabaseValue> + '_ {
    conditions.iter().filter_map(|cond| cond.value.clone())
}

/// SQL text with its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<DatabaseValue>,
}

impl Statement {
    /// Pair SQL with the values bound to its placeholders, in order
    pub fn new(sql: impl Into<String>, params: Vec<DatabaseValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// SQL text with `?` placeholders
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Values bound to the placeholders
    pub fn params(&self) -> &[DatabaseValue] {
        &self.params
    }

    /// Split into SQL and parameters
    pub fn into_parts(self) -> (String, Vec<DatabaseValue>) {
        (self.sql, self.params)
    }

    /// The statement with every placeholder replaced by its literal value
    ///
    /// Meant for logs. Placeholders inside quoted identifiers or strings are
    /// left alone; surplus placeholders stay as `?`.
    pub fn to_literal_sql(&self) -> String {
        let mut out = String::with_capacity(self.sql.len() + self.params.len() * 8);
        let mut params = self.params.iter();
        let mut quote: Option<char> = None;

        for c in self.sql.chars() {
            match (quote, c) {
                (None, '?') => match params.next() {
                    Some(value) => out.push_str(&render_value(value)),
                    None => out.push('?'),
                },
                (None, '\'' | '"' | '`') => {
                    quote = Some(c);
                    out.push(c);
                }
                (Some(open), _) if open == c => {
                    quote = None;
                    out.push(c);
                }
                _ => out.push(c),
            }
        }
        out
    }
}

/// SELECT query builder
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    table: String,
    columns: Vec<String>,
    where_conditions: Vec<Condition>,
    limit: Option<usize>,
}

impl SelectBuilder {
    /// Create a new SELECT query builder
    ///
    /// # Example
    ///
    /// ```
    /// use rust_model_mapper::core::query_builder::SelectBuilder;
    ///
    /// let query = SelectBuilder::new("users")
    ///     .columns(&["id", "name", "email"])
    ///     .build();
    /// assert_eq!(query, "SELECT id, name, email FROM users");
    /// ```
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: vec!["*".to_string()],
            where_conditions: Vec::new(),
            limit: None,
        }
    }

    /// Select specific columns
    #[must_use]
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Select a prebuilt column list verbatim
    #[must_use]
    pub fn column_list(mut self, list: impl Into<String>) -> Self {
        self.columns = vec![list.into()];
        self
    }

    /// Add a WHERE column = value condition
    #[must_use]
    pub fn where_eq(mut self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.where_conditions.push(Condition::eq(column, value.into()));
        self
    }

    /// Add a WHERE column IS NULL condition
    #[must_use]
    pub fn where_null(mut self, column: &str) -> Self {
        self.where_conditions.push(Condition::is_null(column));
        self
    }

    /// Add LIMIT clause
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Build the SQL query string
    pub fn build(&self) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.columns.join(", "), self.table);
        sql.push_str(&where_clause(&self.where_conditions));
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        sql
    }

    /// Get the parameter values for parameterized queries
    pub fn params(&self) -> Vec<DatabaseValue> {
        where_params(&self.where_conditions).collect()
    }

    /// Build the SQL and parameters together
    pub fn statement(&self) -> Statement {
        Statement::new(self.build(), self.params())
    }
}

/// INSERT query builder
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    table: String,
    columns: Vec<String>,
    values: Vec<DatabaseValue>,
}

impl InsertBuilder {
    /// Create a new INSERT query builder
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Add a column-value pair
    #[must_use]
    pub fn value(mut self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.columns.push(column.to_string());
        self.values.push(value.into());
        self
    }

    /// Build the SQL query string; column names are backtick quoted
    pub fn build(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| format!("`{}`", c)).collect();
        let placeholders = vec!["?"; self.values.len()];
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders.join(", ")
        )
    }

    /// Get the parameter values
    pub fn params(&self) -> Vec<DatabaseValue> {
        self.values.clone()
    }

    /// Build the SQL and parameters together
    pub fn statement(&self) -> Statement {
        Statement::new(self.build(), self.params())
    }
}

/// UPDATE query builder
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    table: String,
    set_columns: Vec<String>,
    set_values: Vec<DatabaseValue>,
    where_conditions: Vec<Condition>,
}

impl UpdateBuilder {
    /// Create a new UPDATE query builder
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            set_columns: Vec::new(),
            set_values: Vec::new(),
            where_conditions: Vec::new(),
        }
    }

    /// Set a column value
    #[must_use]
    pub fn set(mut self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.set_columns.push(column.to_string());
        self.set_values.push(value.into());
        self
    }

    /// Add a WHERE condition
    #[must_use]
    pub fn where_eq(mut self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.where_conditions.push(Condition::eq(column, value.into()));
        self
    }

    /// Build the SQL query string
    pub fn build(&self) -> String {
        let set_clauses: Vec<String> = self
            .set_columns
            .iter()
            .map(|col| format!("{} = ?", col))
            .collect();

        let mut sql = format!("UPDATE {} SET {}", self.table, set_clauses.join(", "));
        sql.push_str(&where_clause(&self.where_conditions));
        sql
    }

    /// Get the parameter values (SET values followed by WHERE values)
    pub fn params(&self) -> Vec<DatabaseValue> {
        let mut params = self.set_values.clone();
        params.extend(where_params(&self.where_conditions));
        params
    }

    /// Build the SQL and parameters together
    pub fn statement(&self) -> Statement {
        Statement::new(self.build(), self.params())
    }
}

/// DELETE query builder
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    table: String,
    where_conditions: Vec<Condition>,
}

impl DeleteBuilder {
    /// Create a new DELETE query builder
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            where_conditions: Vec::new(),
        }
    }

    /// Add a WHERE condition
    #[must_use]
    pub fn where_eq(mut self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.where_conditions.push(Condition::eq(column, value.into()));
        self
    }

    /// Build the SQL query string
    pub fn build(&self) -> String {
        format!(
            "DELETE FROM {}{}",
            self.table,
            where_clause(&self.where_conditions)
        )
    }

    /// Get the parameter values
    pub fn params(&self) -> Vec<DatabaseValue> {
        where_params(&self.where_conditions).collect()
    }

    /// Build the SQL and parameters together
    pub fn statement(&self) -> Statement {
        Statement::new(self.build(), self.params())
    }
}
