//! Target table descriptors.

use std::fmt;

use serde::Serialize;

/// One column of a target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type as written in the DDL, possibly empty.
    pub declared_type: String,
    pub nullable: bool,
    pub has_default: bool,
    pub is_primary_key: bool,
    /// 1-based position within the primary key, 0 if not part of it.
    pub pk_position: u32,
}

impl ColumnInfo {
    /// Only the exact type name `INTEGER` makes a primary key a rowid alias.
    /// `INT PRIMARY KEY` is an ordinary column.
    fn is_integer_type(&self) -> bool {
        self.declared_type.eq_ignore_ascii_case("INTEGER")
    }
}

/// A foreign key from the target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyInfo {
    pub columns: Vec<String>,
    pub references_table: String,
    /// Empty entries mean the referenced table's primary key.
    pub references_columns: Vec<String>,
}

impl fmt::Display for ForeignKeyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let targets: Vec<&str> = self
            .references_columns
            .iter()
            .map(|c| if c.is_empty() { "<pk>" } else { c.as_str() })
            .collect();
        write!(
            f,
            "({}) -> {}({})",
            self.columns.join(", "),
            self.references_table,
            targets.join(", ")
        )
    }
}

/// Introspected shape of a target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn primary_key(&self) -> Vec<&str> {
        let mut pk: Vec<&ColumnInfo> = self.columns.iter().filter(|c| c.is_primary_key).collect();
        pk.sort_by_key(|c| c.pk_position);
        pk.into_iter().map(|c| c.name.as_str()).collect()
    }

    /// Single-column integer primary key, which SQLite fills automatically.
    pub fn auto_key(&self) -> Option<&ColumnInfo> {
        let mut pk = self.columns.iter().filter(|c| c.is_primary_key);
        match (pk.next(), pk.next()) {
            (Some(col), None) if col.is_integer_type() => Some(col),
            _ => None,
        }
    }

    /// Columns a row must supply: NOT NULL, no default, not auto-generated.
    pub fn required_columns(&self) -> Vec<&str> {
        let auto = self.auto_key().map(|c| c.name.as_str());
        self.columns
            .iter()
            .filter(|c| !c.nullable && !c.has_default)
            .filter(|c| Some(c.name.as_str()) != auto)
            .map(|c| c.name.as_str())
            .collect()
    }
}

impl fmt::Display for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "table {}", self.name)?;
        for col in &self.columns {
            let mut flags = Vec::new();
            if col.is_primary_key {
                flags.push("primary key");
            }
            if !col.nullable {
                flags.push("not null");
            }
            if col.has_default {
                flags.push("default");
            }
            let ty = if col.declared_type.is_empty() {
                "ANY"
            } else {
                col.declared_type.as_str()
            };
            if flags.is_empty() {
                writeln!(f, "  {} {}", col.name, ty)?;
            } else {
                writeln!(f, "  {} {} [{}]", col.name, ty, flags.join(", "))?;
            }
        }
        writeln!(f, "required: {}", self.required_columns().join(", "))?;
        for fk in &self.foreign_keys {
            writeln!(f, "foreign key {fk}")?;
        }
        Ok(())
    }
}
