//! Select projections and embedded related resources
//!
//! A projection is a comma-separated list of columns, `*`, and embeds:
//!
//! - `profiles:author_id (id, username)` follows the base row's `author_id` to
//!   one profile (to-one) and attaches it under `profiles`.
//! - `likes (count)` attaches `[{"count": n}]` with the number of likes whose
//!   foreign key points back at the base row (to-many).
//! - `comments (*)` attaches every matching comment as an array.
//!
//! Relationships come from [`Table::references`]. Embeds do not nest.

use serde_json::{json, Map, Value};

use crate::error::DbError;
use crate::record::Record;
use crate::table::Table;
use crate::DbResult;

/// How a related table joins onto the base table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// `base.column == related.id`
    ToOne { column: String },
    /// `related.column == base.id`
    ToMany { column: String },
}

/// What an embed attaches for each base row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// Related rows projected to these columns. Empty means every column.
    Columns(Vec<String>),
    /// `[{"count": n}]`
    Count,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    /// Key the resolved value is attached under.
    pub alias: String,
    pub table: Table,
    pub link: Link,
    pub shape: Shape,
}

/// A parsed `select(..)` argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    /// Columns to keep, embed aliases included. Empty means every column.
    pub columns: Vec<String>,
    pub embeds: Vec<Embed>,
}

impl Projection {
    /// Parse a projection against `base`. `""` and `*` select everything.
    pub fn parse(base: Table, projection: &str) -> DbResult<Self> {
        let mut wildcard = false;
        let mut columns = Vec::new();
        let mut embeds: Vec<Embed> = Vec::new();

        for item in split_top_level(projection)? {
            if item == "*" {
                wildcard = true;
            } else if let Some(open) = item.find('(') {
                let embed = parse_embed(base, &item[..open], &item[open..])?;
                if embeds.iter().any(|e| e.alias == embed.alias) {
                    return Err(DbError::invalid(format!(
                        "embed alias used twice: {}",
                        embed.alias
                    )));
                }
                embeds.push(embed);
            } else if item.contains(':') || item.contains(')') {
                return Err(DbError::invalid(format!("malformed column: {item}")));
            } else {
                columns.push(item.to_string());
            }
        }

        if wildcard {
            columns.clear();
        } else if !columns.is_empty() || !embeds.is_empty() {
            columns.extend(embeds.iter().map(|e| e.alias.clone()));
        }
        Ok(Self { columns, embeds })
    }
}

/// Split on commas that are not inside parentheses. Empty items are dropped.
fn split_top_level(projection: &str) -> DbResult<Vec<&str>> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in projection.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| DbError::invalid(format!("unbalanced `)` in: {projection}")))?;
            }
            ',' if depth == 0 => {
                items.push(projection[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(DbError::invalid(format!("unclosed `(` in: {projection}")));
    }
    items.push(projection[start..].trim());
    Ok(items.into_iter().filter(|item| !item.is_empty()).collect())
}

fn parse_embed(base: Table, head: &str, body: &str) -> DbResult<Embed> {
    let inner = body
        .trim()
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| DbError::invalid(format!("malformed embed: {head}{body}")))?;
    if inner.contains('(') {
        return Err(DbError::invalid(format!("nested embeds are not supported: {head}{body}")));
    }

    let (alias, target) = match head.split_once(':') {
        Some((alias, target)) => (alias.trim(), target.trim()),
        None => (head.trim(), head.trim()),
    };
    if alias.is_empty() || target.is_empty() {
        return Err(DbError::invalid(format!("malformed embed: {head}{body}")));
    }

    let (table, link) = resolve_link(base, target)?;
    let shape = parse_shape(inner);
    if shape == Shape::Count && matches!(link, Link::ToOne { .. }) {
        return Err(DbError::invalid(format!(
            "count needs a to-many embed, {target} is to-one"
        )));
    }
    Ok(Embed {
        alias: alias.to_string(),
        table,
        link,
        shape,
    })
}

/// A target is either a related table name or a foreign-key column of `base`.
fn resolve_link(base: Table, target: &str) -> DbResult<(Table, Link)> {
    let Ok(related) = target.parse::<Table>() else {
        return base
            .references()
            .iter()
            .find(|(column, _)| *column == target)
            .map(|(column, table)| {
                (
                    *table,
                    Link::ToOne {
                        column: column.to_string(),
                    },
                )
            })
            .ok_or_else(|| {
                DbError::invalid(format!("{base} has no relationship named {target}"))
            });
    };

    let outgoing = single_column(base, related, target)?;
    if let Some(column) = outgoing {
        return Ok((related, Link::ToOne { column }));
    }
    match single_column(related, base, target)? {
        Some(column) => Ok((related, Link::ToMany { column })),
        None => Err(DbError::invalid(format!(
            "no relationship between {base} and {related}"
        ))),
    }
}

/// The one column of `from` that points at `to`; several is ambiguous.
fn single_column(from: Table, to: Table, target: &str) -> DbResult<Option<String>> {
    let mut hits = from.references().iter().filter(|(_, t)| *t == to);
    match (hits.next(), hits.next()) {
        (None, _) => Ok(None),
        (Some((column, _)), None) => Ok(Some(column.to_string())),
        (Some(_), Some(_)) => Err(DbError::invalid(format!(
            "{target} is ambiguous: {from} has several foreign keys to {to}"
        ))),
    }
}

fn parse_shape(inner: &str) -> Shape {
    let cols: Vec<&str> = inner
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();
    match cols.as_slice() {
        ["count"] => Shape::Count,
        cols if cols.contains(&"*") => Shape::Columns(Vec::new()),
        cols => Shape::Columns(cols.iter().map(|c| c.to_string()).collect()),
    }
}

impl Embed {
    /// The value attached to `base` given every row of the related table.
    pub fn resolve(&self, base: &Record, related: &[Record]) -> Value {
        match &self.link {
            Link::ToOne { column } => {
                let Some(key) = base.get(column).and_then(Value::as_str) else {
                    return Value::Null;
                };
                match related.iter().find(|r| r.id() == key) {
                    Some(row) => self.project(row),
                    None => self
                        .table
                        .dangling_placeholder()
                        .map(|ghost| Value::Object(self.keep(ghost)))
                        .unwrap_or(Value::Null),
                }
            }
            Link::ToMany { column } => {
                let id = Value::String(base.id().to_string());
                let rows = related.iter().filter(|r| r.get(column) == Some(&id));
                match &self.shape {
                    Shape::Count => json!([{ "count": rows.count() }]),
                    Shape::Columns(_) => Value::Array(rows.map(|r| self.project(r)).collect()),
                }
            }
        }
    }

    fn project(&self, row: &Record) -> Value {
        Value::Object(self.keep(row.fields().clone()))
    }

    fn keep(&self, fields: Map<String, Value>) -> Map<String, Value> {
        match &self.shape {
            Shape::Columns(cols) if !cols.is_empty() => fields
                .into_iter()
                .filter(|(key, _)| cols.iter().any(|c| c == key))
                .collect(),
            _ => fields,
        }
    }
}
