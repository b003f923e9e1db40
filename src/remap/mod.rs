//! Identifier remapping engine.
//!
//! Dependent tables are described declaratively: which column holds a legacy
//! reference, what shape it has, where the canonical value lands, and which
//! execution strategy fits the table's size. The engine consumes these
//! descriptors together with a built [`IdentifierIndex`]; nothing about a
//! concrete table is hardcoded in the rewrite logic itself.

pub mod bulk;
pub mod hierarchy;
pub mod index;

pub use bulk::{remap, UNRESOLVED_REF};
pub use index::IdentifierIndex;

use crate::error::MigrateError;

/// Shape of a legacy reference column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnShape {
    /// One integer column holding a single legacy id.
    Scalar,
    /// A text column holding a JSON array of legacy ids.
    IdList,
}

impl ColumnShape {
    fn sql_type(self) -> &'static str {
        match self {
            ColumnShape::Scalar => "INTEGER",
            ColumnShape::IdList => "TEXT",
        }
    }
}

/// How rewritten values reach the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    /// Rewrite the legacy column in place; rename it once all data is new.
    InPlaceRenamed { new_name: String },
    /// Keep the legacy column and land canonical values in an added column.
    NewColumn { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefColumn {
    pub name: String,
    pub shape: ColumnShape,
    pub write: WriteMode,
}

impl RefColumn {
    /// Column the rewritten value is written to.
    fn target(&self) -> &str {
        match &self.write {
            WriteMode::InPlaceRenamed { .. } => &self.name,
            WriteMode::NewColumn { name } => name,
        }
    }
}

/// Execution strategy, chosen per table by expected size and criticality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Fetch every row, update row by row, rename, all in one transaction.
    /// For tables bounded by the number of logical entities.
    Transactional,
    /// One bulk UPDATE per index entry plus one orphan sweep, outside any
    /// transaction. For tables whose row count scales with recorded events;
    /// statement count is bounded by index size, not row count.
    BatchedByEntry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapTable {
    pub table: String,
    pub key_column: Option<String>,
    pub columns: Vec<RefColumn>,
    pub strategy: Strategy,
}

impl RemapTable {
    pub fn new(table: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            table: table.into(),
            key_column: None,
            columns: Vec::new(),
            strategy,
        }
    }

    pub fn key_column(mut self, key_column: impl Into<String>) -> Self {
        self.key_column = Some(key_column.into());
        self
    }

    /// Scalar reference rewritten in place, column renamed afterwards.
    pub fn scalar_renamed(
        mut self,
        name: impl Into<String>,
        new_name: impl Into<String>,
    ) -> Self {
        self.columns.push(RefColumn {
            name: name.into(),
            shape: ColumnShape::Scalar,
            write: WriteMode::InPlaceRenamed {
                new_name: new_name.into(),
            },
        });
        self
    }

    /// Scalar reference resolved into a freshly added column; the legacy
    /// column is left untouched.
    pub fn scalar_into(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.columns.push(RefColumn {
            name: name.into(),
            shape: ColumnShape::Scalar,
            write: WriteMode::NewColumn {
                name: target.into(),
            },
        });
        self
    }

    /// JSON id-list rewritten in place, column renamed afterwards.
    pub fn id_list_renamed(
        mut self,
        name: impl Into<String>,
        new_name: impl Into<String>,
    ) -> Self {
        self.columns.push(RefColumn {
            name: name.into(),
            shape: ColumnShape::IdList,
            write: WriteMode::InPlaceRenamed {
                new_name: new_name.into(),
            },
        });
        self
    }

    pub fn validate(&self) -> Result<(), MigrateError> {
        if self.columns.is_empty() {
            return Err(MigrateError::Validation(format!(
                "remap of '{}' must declare at least one reference column",
                self.table
            )));
        }
        if self.strategy == Strategy::Transactional && self.key_column.is_none() {
            return Err(MigrateError::Validation(format!(
                "transactional remap of '{}' requires a key column",
                self.table
            )));
        }
        for column in &self.columns {
            if self.strategy == Strategy::BatchedByEntry && column.shape == ColumnShape::IdList {
                return Err(MigrateError::Validation(format!(
                    "id-list column '{}' on '{}' cannot use the batched strategy",
                    column.name, self.table
                )));
            }
        }
        Ok(())
    }
}
