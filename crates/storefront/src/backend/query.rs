//! REST query builder.
//!
//! Builds the table path and query-string parameters for the backend's REST
//! layer: `select` projections with nested embeds, `col=op.value` filters,
//! ordering, limits, and upsert conflict targets.

use std::fmt::Display;

/// A table request under construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    table: String,
    params: Vec<(String, String)>,
}

impl Query {
    /// Start a query against `table`.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            params: Vec::new(),
        }
    }

    /// Column projection, e.g. `*, order_items(*, products(*))`.
    ///
    /// Whitespace is stripped so projections can be written readably.
    #[must_use]
    pub fn select(mut self, columns: &str) -> Self {
        let columns: String = columns.chars().filter(|c| !c.is_whitespace()).collect();
        self.params.push(("select".to_string(), columns));
        self
    }

    /// `column = value`.
    #[must_use]
    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "eq", value)
    }

    /// `column <> value`.
    #[must_use]
    pub fn neq(self, column: &str, value: impl Display) -> Self {
        self.filter(column, "neq", value)
    }

    /// `column IN (values)`.
    #[must_use]
    pub fn is_in<I>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Display,
    {
        let list = values
            .into_iter()
            .map(|v| quote_list_item(&v.to_string()))
            .collect::<Vec<_>>()
            .join(",");
        self.filter(column, "in", format!("({list})"))
    }

    /// Sort by `column`. Can be called repeatedly for secondary keys.
    #[must_use]
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let dir = if ascending { "asc" } else { "desc" };
        let term = format!("{column}.{dir}");
        if let Some((_, existing)) = self.params.iter_mut().find(|(k, _)| k == "order") {
            existing.push(',');
            existing.push_str(&term);
        } else {
            self.params.push(("order".to_string(), term));
        }
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.params.push(("limit".to_string(), limit.to_string()));
        self
    }

    /// Conflict target for upserts, e.g. `cart_id,product_id,variant_id`.
    #[must_use]
    pub fn on_conflict(mut self, columns: &str) -> Self {
        self.params
            .push(("on_conflict".to_string(), columns.to_string()));
        self
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Query-string pairs in insertion order.
    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    fn filter(mut self, column: &str, op: &str, value: impl Display) -> Self {
        self.params
            .push((column.to_string(), format!("{op}.{value}")));
        self
    }
}

/// Quote an `in.(...)` list item when it contains reserved characters.
fn quote_list_item(value: &str) -> String {
    if value.contains([',', '(', ')', '"', ' ']) {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}
