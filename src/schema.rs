//! Static column schemas for the pharmacy tables.
//!
//! Each logical table declares its columns and their warehouse types once.
//! The filter compiler uses these declarations to pick value formatting and
//! to reject filters on columns that do not exist.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical column type, as declared in the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    String,
    Integer,
    Numeric,
    Date,
    Timestamp,
    Boolean,
}

impl ColumnType {
    /// Returns the BigQuery type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Numeric => "NUMERIC",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
            Self::Boolean => "BOOLEAN",
        }
    }

    /// Parses a type name, accepting the standard SQL aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "STRING" => Some(Self::String),
            "INTEGER" | "INT64" => Some(Self::Integer),
            "NUMERIC" | "DECIMAL" | "BIGNUMERIC" | "BIGDECIMAL" => Some(Self::Numeric),
            "DATE" => Some(Self::Date),
            "TIMESTAMP" => Some(Self::Timestamp),
            "BOOLEAN" | "BOOL" => Some(Self::Boolean),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared columns of one logical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    name: &'static str,
    columns: &'static [(&'static str, ColumnType)],
}

impl TableSchema {
    pub const fn new(name: &'static str, columns: &'static [(&'static str, ColumnType)]) -> Self {
        Self { name, columns }
    }

    /// Returns the logical table name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Looks up a column, returning its canonical name and declared type.
    pub fn column(&self, column: &str) -> Option<(&'static str, ColumnType)> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .copied()
    }

    /// Returns the declared type of a column, or `None` if it is not declared.
    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.column(column).map(|(_, ty)| ty)
    }

    /// Iterates over the declared columns in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = (&'static str, ColumnType)> + '_ {
        self.columns.iter().copied()
    }

    /// Renders the schema as `- column (TYPE)` lines for tool descriptions.
    pub fn describe(&self) -> String {
        self.columns
            .iter()
            .map(|(name, ty)| format!("- {name} ({ty})"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub const INVENTORY: TableSchema = TableSchema::new(
    "Inventory",
    &[
        ("id", ColumnType::String),
        ("name", ColumnType::String),
        ("genericName", ColumnType::String),
        ("ndc", ColumnType::String),
        ("currentStock", ColumnType::Integer),
        ("minThreshold", ColumnType::Integer),
        ("maxStock", ColumnType::Integer),
        ("lastReorder", ColumnType::Date),
        ("needsReorder", ColumnType::Boolean),
        ("supplier", ColumnType::String),
        ("costPerUnit", ColumnType::Numeric),
        ("expirationDate", ColumnType::Date),
        ("lotNumber", ColumnType::String),
        ("location", ColumnType::String),
        ("created_at", ColumnType::Timestamp),
        ("updated_at", ColumnType::Timestamp),
    ],
);

pub const PRESCRIPTIONS: TableSchema = TableSchema::new(
    "Prescriptions",
    &[
        ("id", ColumnType::String),
        ("patientId", ColumnType::String),
        ("patientName", ColumnType::String),
        ("medication", ColumnType::String),
        ("dosage", ColumnType::String),
        ("quantity", ColumnType::Integer),
        ("status", ColumnType::String),
        ("prescribedBy", ColumnType::String),
        ("dateCreated", ColumnType::Timestamp),
        ("dateFilled", ColumnType::Timestamp),
        ("agentId", ColumnType::String),
        ("insuranceStatus", ColumnType::String),
        ("priority", ColumnType::String),
        ("estimatedCompletion", ColumnType::Timestamp),
        ("copayAmount", ColumnType::Numeric),
        ("refillsRemaining", ColumnType::Integer),
        ("instructions", ColumnType::String),
        ("warnings", ColumnType::String),
        ("created_at", ColumnType::Timestamp),
        ("updated_at", ColumnType::Timestamp),
    ],
);

pub const USERS: TableSchema = TableSchema::new(
    "Users",
    &[
        ("id", ColumnType::String),
        ("name", ColumnType::String),
        ("role", ColumnType::String),
        ("email", ColumnType::String),
        ("phone", ColumnType::String),
        ("DateOfBirth", ColumnType::Date),
        ("created_at", ColumnType::Timestamp),
        ("updated_at", ColumnType::Timestamp),
    ],
);

/// The pharmacy tables exposed over HTTP and to the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Inventory,
    Prescriptions,
    Users,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Inventory, Table::Prescriptions, Table::Users];

    /// Returns the column schema for this table.
    pub fn schema(&self) -> &'static TableSchema {
        match self {
            Self::Inventory => &INVENTORY,
            Self::Prescriptions => &PRESCRIPTIONS,
            Self::Users => &USERS,
        }
    }

    /// Returns the table as a lowercase identifier for URLs and config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inventory => "inventory",
            Self::Prescriptions => "prescriptions",
            Self::Users => "users",
        }
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inventory" => Ok(Self::Inventory),
            "prescriptions" | "prescription" => Ok(Self::Prescriptions),
            "users" | "user" => Ok(Self::Users),
            _ => Err(format!("Unknown table: {}", s)),
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
