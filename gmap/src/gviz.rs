//! Google Visualization DataTable JSON, the format the dashboard charts load.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl Column {
    pub fn number(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind: "number",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct Cell {
    v: Value,
}

#[derive(Debug, Clone, Serialize)]
struct Row {
    c: Vec<Cell>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataTable {
    cols: Vec<Column>,
    rows: Vec<Row>,
}

impl DataTable {
    pub fn new(cols: Vec<Column>) -> Self {
        Self {
            cols,
            rows: Vec::new(),
        }
    }

    /// Append a row; values are matched to columns by position.
    pub fn push_row<I, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let c = values.into_iter().map(|v| Cell { v: v.into() }).collect();
        self.rows.push(Row { c });
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
