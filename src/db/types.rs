/// A value bound as a statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Int64(i64),
    Text(String),
    /// Stored as BYTEA.
    Bytes(Vec<u8>),
    Address([u8; 20]),
    Bytes32([u8; 32]),
    /// Decimal string for wei amounts and other uint256 values, stored as
    /// NUMERIC.
    Numeric(String),
}

impl DbValue {
    /// Optional 32-byte word, NULL when absent.
    pub fn opt_bytes32(value: Option<[u8; 32]>) -> Self {
        value.map(DbValue::Bytes32).unwrap_or(DbValue::Null)
    }
}

/// A row write produced by a transformer. Operations handed to an
/// `OperationSink` together are applied in one transaction.
///
/// On a conflict over `conflict_columns` the existing row has its
/// `update_columns` overwritten, or is left alone when there are none.
#[derive(Debug, Clone, PartialEq)]
pub struct DbOperation {
    pub table: String,
    pub columns: Vec<String>,
    pub values: Vec<DbValue>,
    pub conflict_columns: Vec<String>,
    pub update_columns: Vec<String>,
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|c| c.to_string()).collect()
}

impl DbOperation {
    pub fn upsert(
        table: &str,
        columns: &[&str],
        values: Vec<DbValue>,
        conflict_columns: &[&str],
        update_columns: &[&str],
    ) -> Self {
        DbOperation {
            table: table.to_string(),
            columns: owned(columns),
            values,
            conflict_columns: owned(conflict_columns),
            update_columns: owned(update_columns),
        }
    }

    /// Insert that silently does nothing when a row with the same
    /// `conflict_columns` already exists.
    pub fn insert_ignore(
        table: &str,
        columns: &[&str],
        values: Vec<DbValue>,
        conflict_columns: &[&str],
    ) -> Self {
        Self::upsert(table, columns, values, conflict_columns, &[])
    }

    /// The values of the conflict columns, in `conflict_columns` order.
    #[cfg(test)]
    pub fn conflict_key(&self) -> Vec<&DbValue> {
        self.conflict_columns
            .iter()
            .filter_map(|c| self.columns.iter().position(|col| col == c))
            .filter_map(|i| self.values.get(i))
            .collect()
    }
}
