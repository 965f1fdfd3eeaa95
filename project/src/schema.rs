//! Table schemas.

use ntuple_expr::ValueType;

use crate::error::ProjectError;

/// One named, typed column of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name, the symbol formulas use to read it.
    pub name: String,
    /// Type of the column's values.
    pub ty: ValueType,
}

impl Column {
    /// Creates a column descriptor.
    pub fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Ordered list of uniquely named columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    /// Builds a schema, rejecting repeated column names.
    pub fn new(columns: Vec<Column>) -> Result<Self, ProjectError> {
        for (index, column) in columns.iter().enumerate() {
            if columns[..index].iter().any(|seen| seen.name == column.name) {
                return Err(ProjectError::DuplicateColumn {
                    name: column.name.clone(),
                });
            }
        }
        Ok(Self { columns })
    }

    /// The columns in table order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Looks a column up by name.
    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Position of a column within the schema.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn columns_are_found_by_name() {
        let schema = Schema::new(vec![
            Column::new("pt", ValueType::Float),
            Column::new("njets", ValueType::Int),
        ])
        .unwrap();

        assert_eq!(schema.len(), 2);
        assert_eq!(schema.get("njets").unwrap().ty, ValueType::Int);
        assert_eq!(schema.index_of("pt"), Some(0));
        assert_eq!(schema.index_of("eta"), None);
    }

    #[test]
    fn repeated_names_are_rejected() {
        let result = Schema::new(vec![
            Column::new("pt", ValueType::Float),
            Column::new("pt", ValueType::Int),
        ]);
        assert_matches!(
            result,
            Err(ProjectError::DuplicateColumn { name }) if name == "pt"
        );
    }
}
