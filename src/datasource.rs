//! Table scan backends.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::context::ExecutionContext;
use crate::error::{Result, VexecError};
use crate::executor::{no_such_element, DescribeProperties, TupleIterator, TupleIteratorRef};
use crate::expression::ExpressionRef;
use crate::types::{Column, Schema, SchemaRef, TableSourceReference, Value};
use crate::vector::{SelectionVector, TupleVector};

/// Options passed from a scan operator to its datasource.
#[derive(Debug, Clone)]
pub struct DatasourceOptions {
    /// Maximum rows per produced batch.
    pub batch_size: usize,
}

impl DatasourceOptions {
    /// Creates options with the given batch size.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        DatasourceOptions {
            batch_size: batch_size.max(1),
        }
    }
}

/// A backend producing the rows of one table source.
pub trait Datasource: fmt::Debug + Send + Sync {
    /// Returns the schema, an asterisk schema if only known at runtime.
    fn schema(&self) -> SchemaRef;

    /// Starts scanning.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan cannot be started.
    fn execute<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        options: &DatasourceOptions,
    ) -> Result<TupleIteratorRef<'a>>;

    /// Returns the properties shown when describing the scan.
    fn describe_properties(&self) -> DescribeProperties {
        Vec::new()
    }
}

/// Shared reference to a datasource.
pub type DatasourceRef = Arc<dyn Datasource>;

#[derive(Debug, Clone)]
struct Seek {
    column: String,
    values: ExpressionRef,
}

/// Datasource over an in-memory batch.
///
/// Rows are produced in `batch_size` slices. A seek restricts the scan to
/// rows whose key column equals one of the values of an expression
/// evaluated over the context's outer tuple vector, the access pattern of
/// an index lookup driven by a correlated join.
#[derive(Debug, Clone)]
pub struct MemoryDatasource {
    data: TupleVector,
    asterisk: bool,
    estimated_row_count: Option<usize>,
    seek: Option<Seek>,
}

impl MemoryDatasource {
    /// Creates a datasource whose columns belong to `table_source`.
    #[must_use]
    pub fn new(table_source: &TableSourceReference, data: TupleVector) -> Self {
        let columns: Vec<Column> = data
            .schema()
            .columns()
            .iter()
            .map(|c| c.clone().with_table_source(table_source.clone()))
            .collect();
        let row_count = data.row_count();
        let data = TupleVector::try_new_with_row_count(
            Arc::new(Schema::new(columns)),
            data.columns().to_vec(),
            row_count,
        )
        .unwrap_or(data);
        MemoryDatasource {
            data,
            asterisk: false,
            estimated_row_count: Some(row_count),
            seek: None,
        }
    }

    /// Reports an asterisk schema so the real schema is only seen at runtime.
    #[must_use]
    pub fn with_asterisk_schema(mut self) -> Self {
        self.asterisk = true;
        self
    }

    /// Overrides the row count hint; None reports an unknown size.
    #[must_use]
    pub fn with_estimated_row_count(mut self, estimate: Option<usize>) -> Self {
        self.estimated_row_count = estimate;
        self
    }

    /// Restricts scans to rows where `column` equals a value of `values`
    /// evaluated over the outer tuple vector.
    #[must_use]
    pub fn with_seek(mut self, column: impl Into<String>, values: ExpressionRef) -> Self {
        self.seek = Some(Seek {
            column: column.into(),
            values,
        });
        self
    }

    /// Returns the backing data.
    #[must_use]
    pub fn data(&self) -> &TupleVector {
        &self.data
    }

    fn seek_selection(&self, seek: &Seek, ctx: &ExecutionContext) -> Result<SelectionVector> {
        let outer = ctx.statement().outer_tuple_vector().ok_or_else(|| {
            VexecError::invalid_argument("Seek scan requires an outer tuple vector")
        })?;
        let keys: Vec<Value> = seek
            .values
            .eval(&outer, ctx)?
            .values()
            .into_iter()
            .filter(|v| !v.is_null())
            .collect();
        let column = self.data.column_by_name(&seek.column).ok_or_else(|| {
            VexecError::InvalidExpression(format!("Seek column not found: {}", seek.column))
        })?;
        let selection: SelectionVector = (0..self.data.row_count())
            .filter(|&row| {
                let value = column.get_value(row);
                keys.iter()
                    .any(|k| value.compare(k) == Some(std::cmp::Ordering::Equal))
            })
            .collect();
        trace!(keys = keys.len(), rows = selection.len(), "memory seek");
        Ok(selection)
    }
}

impl Datasource for MemoryDatasource {
    fn schema(&self) -> SchemaRef {
        if self.asterisk {
            let table_source = self
                .data
                .schema()
                .columns()
                .first()
                .and_then(|c| c.table_source.clone());
            Arc::new(Schema::asterisk(table_source))
        } else {
            self.data.schema().clone()
        }
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        options: &DatasourceOptions,
    ) -> Result<TupleIteratorRef<'a>> {
        let (data, estimate) = match &self.seek {
            Some(seek) => {
                let selection = self.seek_selection(seek, ctx)?;
                let len = selection.len();
                (self.data.select(&selection), Some(len))
            }
            None => (self.data.clone(), self.estimated_row_count),
        };
        Ok(Box::new(MemoryIterator {
            data,
            offset: 0,
            batch_size: options.batch_size,
            estimated_row_count: estimate,
        }))
    }

    fn describe_properties(&self) -> DescribeProperties {
        let mut properties = vec![("Rows".to_string(), self.data.row_count().to_string())];
        if let Some(seek) = &self.seek {
            properties.push(("Seek".to_string(), format!("{} = {}", seek.column, seek.values)));
        }
        properties
    }
}

struct MemoryIterator {
    data: TupleVector,
    offset: usize,
    batch_size: usize,
    estimated_row_count: Option<usize>,
}

impl TupleIterator for MemoryIterator {
    fn has_next(&mut self) -> Result<bool> {
        Ok(self.offset < self.data.row_count())
    }

    fn next(&mut self) -> Result<TupleVector> {
        if self.offset >= self.data.row_count() {
            return Err(no_such_element("MemoryDatasource"));
        }
        let len = self.batch_size.min(self.data.row_count() - self.offset);
        let batch = self.data.slice(self.offset, len);
        self.offset += len;
        Ok(batch)
    }

    fn estimated_row_count(&self) -> Option<usize> {
        self.estimated_row_count
    }

    fn close(&mut self) {
        self.offset = self.data.row_count();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{collect_batches, ExecutorConfig};
    use crate::expression::ScalarExpression;
    use crate::types::DataType;
    use crate::vector::ValueVector;

    fn table() -> MemoryDatasource {
        let schema = Arc::new(Schema::new(vec![Column::new("id", DataType::Int64)]));
        let ids = (0..5).map(Value::Int64).collect();
        let data =
            TupleVector::try_new(schema, vec![ValueVector::from_values(DataType::Int64, ids)])
                .unwrap();
        MemoryDatasource::new(&TableSourceReference::new(0, "t", "t"), data)
    }

    #[test]
    fn test_batches_respect_batch_size() {
        let ctx = ExecutionContext::new(ExecutorConfig::default());
        let source = table();
        let iter = source.execute(&ctx, &DatasourceOptions::new(2)).unwrap();
        let batches = collect_batches(iter).unwrap();
        let sizes: Vec<usize> = batches.iter().map(TupleVector::row_count).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(batches[0].schema().index_of("t.id"), Some(0));
    }

    #[test]
    fn test_seek_reads_outer_values() {
        let ctx = ExecutionContext::default();
        let source = table().with_seek("id", ScalarExpression::column("k", DataType::Int64).into_ref());
        let outer_schema = Arc::new(Schema::new(vec![Column::new("k", DataType::Int64)]));
        let outer = TupleVector::try_new(
            outer_schema,
            vec![ValueVector::from_values(
                DataType::Int64,
                vec![Value::Int64(3), Value::Null, Value::Int64(1)],
            )],
        )
        .unwrap();
        let _guard = ctx.push_outer(outer);
        let batches = collect_batches(source.execute(&ctx, &DatasourceOptions::new(10)).unwrap())
            .unwrap();
        assert_eq!(batches[0].rows(), vec![vec![Value::Int64(1)], vec![Value::Int64(3)]]);
    }

    #[test]
    fn test_seek_without_outer_fails() {
        let ctx = ExecutionContext::default();
        let source = table().with_seek("id", ScalarExpression::column("k", DataType::Int64).into_ref());
        assert!(source.execute(&ctx, &DatasourceOptions::new(10)).is_err());
    }
}
