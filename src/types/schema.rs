//! Column and schema definitions for tuple vectors.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::DataType;

/// Shared reference to a [`Schema`].
pub type SchemaRef = Arc<Schema>;

/// Back-reference from a column to the table source it originates from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableSourceReference {
    /// Unique id of the table source within a plan.
    pub id: u32,
    /// Table name.
    pub name: String,
    /// Alias used in the query (defaults to the name).
    pub alias: String,
}

impl TableSourceReference {
    /// Creates a new table source reference.
    #[must_use]
    pub fn new(id: u32, name: impl Into<String>, alias: impl Into<String>) -> Self {
        TableSourceReference {
            id,
            name: name.into(),
            alias: alias.into(),
        }
    }
}

/// A column in a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Declared data type.
    pub data_type: DataType,
    /// Originating table source, if any.
    #[serde(default)]
    pub table_source: Option<TableSourceReference>,
    /// True for an unresolved wildcard column.
    #[serde(default)]
    pub asterisk: bool,
}

impl Column {
    /// Creates a new column.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Column {
            name: name.into(),
            data_type,
            table_source: None,
            asterisk: false,
        }
    }

    /// Creates an asterisk (wildcard) column.
    #[must_use]
    pub fn asterisk(table_source: Option<TableSourceReference>) -> Self {
        Column {
            name: "*".to_string(),
            data_type: DataType::Any,
            table_source,
            asterisk: true,
        }
    }

    /// Sets the table source of this column.
    #[must_use]
    pub fn with_table_source(mut self, table_source: TableSourceReference) -> Self {
        self.table_source = Some(table_source);
        self
    }

    /// Returns the alias qualified name (`alias.name`) when a source is known.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.table_source {
            Some(ts) => format!("{}.{}", ts.alias, self.name),
            None => self.name.clone(),
        }
    }

    /// Returns true if this column is referenced by `name`.
    ///
    /// Matches either the plain column name or an `alias.name` qualified name,
    /// case insensitively.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        if self.name.eq_ignore_ascii_case(name) {
            return true;
        }
        match (&self.table_source, name.rsplit_once('.')) {
            (Some(ts), Some((alias, column))) => {
                ts.alias.eq_ignore_ascii_case(alias) && self.name.eq_ignore_ascii_case(column)
            }
            _ => false,
        }
    }
}

/// Ordered set of columns describing a tuple vector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Creates a schema from columns.
    #[must_use]
    pub fn new(columns: Vec<Column>) -> Self {
        Schema { columns }
    }

    /// Creates an empty schema.
    #[must_use]
    pub fn empty() -> Self {
        Schema::default()
    }

    /// Creates an asterisk schema, resolved at runtime from the first batch.
    #[must_use]
    pub fn asterisk(table_source: Option<TableSourceReference>) -> Self {
        Schema {
            columns: vec![Column::asterisk(table_source)],
        }
    }

    /// Returns the columns.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if there are no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns true if any column is an unresolved wildcard.
    #[must_use]
    pub fn is_asterisk(&self) -> bool {
        self.columns.iter().any(|c| c.asterisk)
    }

    /// Returns a column by ordinal.
    #[must_use]
    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    /// Returns the ordinal of the first column matching `name`.
    ///
    /// Exact (case sensitive) names win over case insensitive and qualified
    /// matches.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .or_else(|| self.columns.iter().position(|c| c.matches(name)))
    }

    /// Returns a new schema with the columns of `self` followed by `other`.
    #[must_use]
    pub fn concat(&self, other: &Schema) -> Schema {
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        Schema { columns }
    }

    /// Returns a new schema with `column` appended.
    #[must_use]
    pub fn with_column(&self, column: Column) -> Schema {
        let mut columns = self.columns.clone();
        columns.push(column);
        Schema { columns }
    }

    /// Returns the column names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", c.qualified_name(), c.data_type))
            .collect();
        write!(f, "[{}]", cols.join(", "))
    }
}
