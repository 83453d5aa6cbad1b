//! Fluent query builder
//!
//! `client.from(table)` returns a [`TableQuery`]; its methods start a chain of
//! modifiers that ends in an awaitable terminal. Modifiers are collected into a
//! backend-neutral [`Query`] so both backends apply identical semantics.
//!
//! ```ignore
//! let posts = client
//!     .from(Table::Posts)
//!     .select("*")
//!     .eq("author_id", user_id)
//!     .order("created_at", Order::desc())
//!     .await;
//! ```

use std::collections::BTreeMap;
use std::future::IntoFuture;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::backend::Backend;
use crate::error::DbError;
use crate::projection::{Embed, Projection};
use crate::record::{compare_values, to_row, Record, Row, ID};
use crate::response::{guarded, Response};
use crate::table::Table;
use crate::DbResult;

/// Equality filter added by `.eq(column, value)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn matches(&self, record: &Record) -> bool {
        record.get(&self.column).unwrap_or(&Value::Null) == &self.value
    }
}

/// Options for `.order(column, opts)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub ascending: bool,
}

impl Order {
    pub fn asc() -> Self {
        Order { ascending: true }
    }

    pub fn desc() -> Self {
        Order { ascending: false }
    }
}

impl Default for Order {
    fn default() -> Self {
        Order::asc()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

/// Everything a read or delete needs to know, independent of backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: Table,
    /// Empty means every column.
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            columns: Vec::new(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }

    /// The id pinned by an `eq("id", ..)` filter, if any.
    pub fn id_filter(&self) -> Option<&str> {
        self.filters
            .iter()
            .find(|f| f.column == ID)
            .and_then(|f| f.value.as_str())
    }

    /// Filter, order (stable), limit and project `records`.
    pub fn apply<'a>(&self, records: impl IntoIterator<Item = &'a Record>) -> Vec<Record> {
        let mut rows: Vec<&Record> = records.into_iter().filter(|r| self.matches(r)).collect();

        if let Some(order) = &self.order {
            // `sort_by` is stable: equal keys keep insertion order.
            rows.sort_by(|a, b| {
                let ord = compare_values(
                    a.get(&order.column).unwrap_or(&Value::Null),
                    b.get(&order.column).unwrap_or(&Value::Null),
                );
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows.into_iter()
            .map(|r| r.clone().project(&self.columns))
            .collect()
    }
}

/// Resolved target of an update: which id, which patch, which guards.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateTarget {
    pub id: String,
    pub patch: Row,
    pub filters: Vec<Filter>,
}

impl UpdateTarget {
    /// The patch's `id` wins; otherwise an `eq("id", ..)` filter names the target.
    pub fn resolve(patch: Row, filters: Vec<Filter>) -> DbResult<Self> {
        let from_patch = match patch.get(ID) {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id.clone()),
            Some(other) => return Err(DbError::invalid(format!("id must be a string, got {other}"))),
        };
        let id = from_patch
            .or_else(|| {
                filters
                    .iter()
                    .find(|f| f.column == ID)
                    .and_then(|f| f.value.as_str().map(str::to_string))
            })
            .ok_or_else(|| {
                DbError::invalid("update needs an `id` in the patch or an eq(\"id\", ..) filter")
            })?;
        Ok(Self { id, patch, filters })
    }

    /// All extra filters must hold on the stored record.
    pub fn accepts(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// `client.from(table)`
#[derive(Clone)]
pub struct TableQuery {
    backend: Arc<dyn Backend>,
    table: Table,
}

impl TableQuery {
    pub(crate) fn new(backend: Arc<dyn Backend>, table: Table) -> Self {
        Self { backend, table }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn select(self, projection: &str) -> SelectQuery {
        let (query, embeds) = match Projection::parse(self.table, projection) {
            Ok(Projection { columns, embeds }) => (
                Ok(Query {
                    columns,
                    ..Query::new(self.table)
                }),
                embeds,
            ),
            Err(err) => (Err(err), Vec::new()),
        };
        SelectQuery {
            backend: self.backend,
            query,
            embeds,
        }
    }

    pub fn insert(self, row: impl Serialize) -> InsertQuery {
        InsertQuery {
            backend: self.backend,
            table: self.table,
            row: to_row(row),
        }
    }

    pub fn insert_many<T: Serialize>(self, rows: impl IntoIterator<Item = T>) -> InsertManyQuery {
        InsertManyQuery {
            backend: self.backend,
            table: self.table,
            rows: rows.into_iter().map(to_row).collect(),
        }
    }

    pub fn update(self, patch: impl Serialize) -> UpdateQuery {
        UpdateQuery {
            backend: self.backend,
            table: self.table,
            patch: to_row(patch),
            filters: Vec::new(),
        }
    }

    pub fn delete(self) -> DeleteQuery {
        DeleteQuery {
            backend: self.backend,
            query: Query::new(self.table),
        }
    }
}

fn filter(column: impl Into<String>, value: impl Into<Value>) -> Filter {
    Filter {
        column: column.into(),
        value: value.into(),
    }
}

/// Multi-record read. Await it for every match, or end with `.single()`.
pub struct SelectQuery {
    backend: Arc<dyn Backend>,
    query: DbResult<Query>,
    embeds: Vec<Embed>,
}

impl SelectQuery {
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Ok(query) = &mut self.query {
            query.filters.push(filter(column, value));
        }
        self
    }

    /// Sort by one column. A later call replaces an earlier one.
    pub fn order(mut self, column: impl Into<String>, opts: Order) -> Self {
        if let Ok(query) = &mut self.query {
            query.order = Some(OrderBy {
                column: column.into(),
                ascending: opts.ascending,
            });
        }
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        if let Ok(query) = &mut self.query {
            query.limit = Some(count);
        }
        self
    }

    pub fn single(self) -> SingleQuery {
        SingleQuery { inner: self }
    }
}

impl IntoFuture for SelectQuery {
    type Output = Response<Vec<Record>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            let SelectQuery {
                backend,
                query,
                embeds,
            } = self;
            let result = match query {
                Ok(query) => {
                    guarded("table.select", fetch(backend.as_ref(), query, &embeds)).await
                }
                Err(err) => Err(err),
            };
            Response::<Vec<Record>>::from(result)
        })
    }
}

/// Run `query`, then attach each embed from one read of its related table.
async fn fetch(
    backend: &dyn Backend,
    mut query: Query,
    embeds: &[Embed],
) -> DbResult<Vec<Record>> {
    if embeds.is_empty() {
        return backend.select(&query).await;
    }

    // Foreign keys must survive the base read; the projection is applied last.
    let columns = std::mem::take(&mut query.columns);
    let rows = backend.select(&query).await?;

    let mut related: BTreeMap<Table, Vec<Record>> = BTreeMap::new();
    for embed in embeds {
        if !related.contains_key(&embed.table) {
            let all = backend.select(&Query::new(embed.table)).await?;
            related.insert(embed.table, all);
        }
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let values: Vec<(String, Value)> = embeds
                .iter()
                .map(|embed| {
                    let others = related
                        .get(&embed.table)
                        .map(Vec::as_slice)
                        .unwrap_or_default();
                    (embed.alias.clone(), embed.resolve(&row, others))
                })
                .collect();
            values
                .into_iter()
                .fold(row, |row, (alias, value)| row.with_field(alias, value))
                .project(&columns)
        })
        .collect())
}

/// First matching record, or an empty response when nothing matches.
pub struct SingleQuery {
    inner: SelectQuery,
}

impl IntoFuture for SingleQuery {
    type Output = Response<Record>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            let SelectQuery {
                backend,
                query,
                embeds,
            } = self.inner;
            let result = match query {
                Ok(mut query) => {
                    query.limit = Some(query.limit.map_or(1, |l| l.min(1)));
                    guarded("table.single", fetch(backend.as_ref(), query, &embeds))
                        .await
                        .map(|rows| rows.into_iter().next())
                }
                Err(err) => Err(err),
            };
            Response::<Record>::from(result)
        })
    }
}

pub struct InsertQuery {
    backend: Arc<dyn Backend>,
    table: Table,
    row: DbResult<Row>,
}

impl IntoFuture for InsertQuery {
    type Output = Response<Record>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            let InsertQuery {
                backend,
                table,
                row,
            } = self;
            let result = match row {
                Ok(row) => guarded("table.insert", backend.insert(table, vec![row]))
                    .await
                    .and_then(|rows| {
                        rows.into_iter().next().ok_or_else(|| {
                            DbError::BackendFailure("insert returned no record".to_string())
                        })
                    }),
                Err(err) => Err(err),
            };
            Response::<Record>::from(result)
        })
    }
}

pub struct InsertManyQuery {
    backend: Arc<dyn Backend>,
    table: Table,
    rows: DbResult<Vec<Row>>,
}

impl IntoFuture for InsertManyQuery {
    type Output = Response<Vec<Record>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            let InsertManyQuery {
                backend,
                table,
                rows,
            } = self;
            let result = match rows {
                Ok(rows) => guarded("table.insert_many", backend.insert(table, rows)).await,
                Err(err) => Err(err),
            };
            Response::<Vec<Record>>::from(result)
        })
    }
}

/// Shallow-merge update of one record.
pub struct UpdateQuery {
    backend: Arc<dyn Backend>,
    table: Table,
    patch: DbResult<Row>,
    filters: Vec<Filter>,
}

impl UpdateQuery {
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(filter(column, value));
        self
    }
}

impl IntoFuture for UpdateQuery {
    type Output = Response<Record>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            let UpdateQuery {
                backend,
                table,
                patch,
                filters,
            } = self;
            let result = match patch.and_then(|patch| UpdateTarget::resolve(patch, filters)) {
                Ok(target) => guarded("table.update", backend.update(table, target)).await,
                Err(err) => Err(err),
            };
            Response::<Record>::from(result)
        })
    }
}

/// Removes matching records; with no `eq` the whole table is cleared.
pub struct DeleteQuery {
    backend: Arc<dyn Backend>,
    query: Query,
}

impl DeleteQuery {
    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.filters.push(filter(column, value));
        self
    }
}

impl IntoFuture for DeleteQuery {
    type Output = Response<()>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            let DeleteQuery { backend, query } = self;
            let result = guarded("table.delete", backend.delete(&query)).await;
            Response::unit(result.map(|_| ()))
        })
    }
}
