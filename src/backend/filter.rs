use std::cmp::Ordering;

use serde_json::Value;

use crate::common::RecordId;

/// Row predicate understood by both the REST and the in-memory store.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn id_eq(field: impl Into<String>, id: &RecordId) -> Self {
        Filter::Eq(field.into(), id.to_value())
    }

    /// Messages exchanged between `a` and `b`, whichever side sent them.
    pub fn conversation(a: &RecordId, b: &RecordId) -> Self {
        Filter::Or(vec![
            Filter::And(vec![
                Filter::id_eq("sender_id", a),
                Filter::id_eq("receiver_id", b),
            ]),
            Filter::And(vec![
                Filter::id_eq("sender_id", b),
                Filter::id_eq("receiver_id", a),
            ]),
        ])
    }

    pub fn matches(&self, record: &Value) -> bool {
        match self {
            Filter::Eq(field, expected) => record
                .get(field)
                .is_some_and(|actual| values_equal(actual, expected)),
            Filter::And(parts) => parts.iter().all(|part| part.matches(record)),
            Filter::Or(parts) => parts.iter().any(|part| part.matches(record)),
        }
    }

    /// PostgREST query parameters. Top-level conjunctions become separate
    /// parameters, disjunctions use the `or=(...)` form.
    pub fn to_query_params(&self) -> Vec<(String, String)> {
        match self {
            Filter::Eq(field, value) => vec![(field.clone(), format!("eq.{}", render_value(value)))],
            Filter::And(parts) => parts.iter().flat_map(Filter::to_query_params).collect(),
            Filter::Or(parts) => vec![("or".to_string(), format!("({})", join_nested(parts)))],
        }
    }

    /// Filter string for a realtime `postgres_changes` binding. Realtime only
    /// filters on a single column, so anything else is evaluated client-side.
    pub fn to_realtime_filter(&self) -> Option<String> {
        match self {
            Filter::Eq(field, value) => Some(format!("{field}=eq.{}", render_value(value))),
            _ => None,
        }
    }

    fn to_nested(&self) -> String {
        match self {
            Filter::Eq(field, value) => format!("{field}.eq.{}", render_value(value)),
            Filter::And(parts) => format!("and({})", join_nested(parts)),
            Filter::Or(parts) => format!("or({})", join_nested(parts)),
        }
    }
}

fn join_nested(parts: &[Filter]) -> String {
    parts
        .iter()
        .map(Filter::to_nested)
        .collect::<Vec<_>>()
        .join(",")
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Equality with ids in mind: `1` and `"1"` are the same key.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            render_value(left) == render_value(right)
        }
        _ => left == right,
    }
}

/// Ordering used for `order by`; numbers numerically, strings lexically,
/// nulls first.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => render_value(left).cmp(&render_value(right)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub field: String,
    pub direction: Direction,
}

/// A read against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub select: Vec<String>,
    pub filter: Option<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select: Vec::new(),
            filter: None,
            order: None,
            limit: None,
        }
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select = fields.iter().map(|field| field.to_string()).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order = Some(Order {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn to_query_params(&self) -> Vec<(String, String)> {
        let select = if self.select.is_empty() {
            "*".to_string()
        } else {
            self.select.join(",")
        };
        let mut params = vec![("select".to_string(), select)];
        if let Some(filter) = &self.filter {
            params.extend(filter.to_query_params());
        }
        if let Some(order) = &self.order {
            let direction = match order.direction {
                Direction::Ascending => "asc",
                Direction::Descending => "desc",
            };
            params.push(("order".to_string(), format!("{}.{direction}", order.field)));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids() -> (RecordId, RecordId) {
        (RecordId::from(1), RecordId::from(2))
    }

    #[test]
    fn conversation_predicate_is_symmetric() {
        let (a, b) = ids();
        let rows = [
            json!({"sender_id": 1, "receiver_id": 2}),
            json!({"sender_id": 2, "receiver_id": 1}),
            json!({"sender_id": 1, "receiver_id": 3}),
            json!({"sender_id": 3, "receiver_id": 2}),
            json!({"sender_id": "2", "receiver_id": "1"}),
        ];
        let forward = Filter::conversation(&a, &b);
        let backward = Filter::conversation(&b, &a);
        for row in &rows {
            assert_eq!(forward.matches(row), backward.matches(row), "row {row}");
        }
        let matched = rows.iter().filter(|row| forward.matches(row)).count();
        assert_eq!(matched, 3);
    }

    #[test]
    fn renders_postgrest_or_clause() {
        let (a, b) = ids();
        let query = Query::from("messages")
            .filter(Filter::conversation(&a, &b))
            .order("timestamp", Direction::Ascending);
        assert_eq!(
            query.to_query_params(),
            vec![
                ("select".to_string(), "*".to_string()),
                (
                    "or".to_string(),
                    "(and(sender_id.eq.1,receiver_id.eq.2),and(sender_id.eq.2,receiver_id.eq.1))"
                        .to_string()
                ),
                ("order".to_string(), "timestamp.asc".to_string()),
            ]
        );
    }

    #[test]
    fn realtime_filter_only_for_single_column() {
        let (a, b) = ids();
        assert_eq!(
            Filter::id_eq("receiver_id", &a).to_realtime_filter().as_deref(),
            Some("receiver_id=eq.1")
        );
        assert!(Filter::conversation(&a, &b).to_realtime_filter().is_none());
    }

    #[test]
    fn ordering_handles_mixed_values() {
        assert_eq!(compare_values(&json!(1), &json!(2)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&json!(null), &json!("a")), Ordering::Less);
    }
}
