//! Table scan operator.

use crate::context::ExecutionContext;
use crate::datasource::{DatasourceOptions, DatasourceRef};
use crate::error::Result;
use crate::executor::{DescribeProperties, PhysicalOperator, TupleIteratorRef};
use crate::plan::{NodeId, PhysicalPlan};
use crate::types::{SchemaRef, TableSourceReference};

/// Scan operator reading a table source through its datasource.
#[derive(Debug, Clone)]
pub struct TableScan {
    node_id: NodeId,
    table_source: TableSourceReference,
    datasource: DatasourceRef,
}

impl TableScan {
    /// Creates a new scan of `table_source`.
    #[must_use]
    pub fn new(
        node_id: NodeId,
        table_source: TableSourceReference,
        datasource: DatasourceRef,
    ) -> Self {
        TableScan {
            node_id,
            table_source,
            datasource,
        }
    }

    /// Returns the scanned table source.
    #[must_use]
    pub fn table_source(&self) -> &TableSourceReference {
        &self.table_source
    }
}

impl PhysicalOperator for TableScan {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    fn name(&self) -> &'static str {
        "Scan"
    }

    fn schema(&self) -> SchemaRef {
        self.datasource.schema()
    }

    fn children(&self) -> Vec<&PhysicalPlan> {
        Vec::new()
    }

    fn execute<'a>(&'a self, ctx: &'a ExecutionContext) -> Result<TupleIteratorRef<'a>> {
        let options = DatasourceOptions::new(ctx.config().batch_size);
        self.datasource.execute(ctx, &options)
    }

    fn describe_properties(&self, _ctx: &ExecutionContext) -> DescribeProperties {
        let mut properties = vec![(
            "Table".to_string(),
            if self.table_source.alias == self.table_source.name {
                self.table_source.name.clone()
            } else {
                format!("{} {}", self.table_source.name, self.table_source.alias)
            },
        )];
        properties.extend(self.datasource.describe_properties());
        properties
    }
}
