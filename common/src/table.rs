use std::{cmp::Ordering, collections::HashMap, fmt, io};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("no column named `{0}`")]
    MissingColumn(String),
    #[error("column `{column}` holds non-numeric value `{value}` at row {row}")]
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },
    #[error("failed to write csv")]
    Csv(#[from] csv::Error),
    #[error("failed to flush csv")]
    Io(#[from] io::Error),
}

/// A single table cell. Captured strings that look like integer or float
/// literals are stored numerically; everything else stays text. `Null` fills
/// the holes that appear when files contribute different column sets.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Numeric-looking strings become numbers, everything else stays text.
    pub fn parse(s: &str) -> Value {
        if let Ok(i) = s.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Text(s.to_owned())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Int(i) => Some(i as f64),
            Value::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Total order used for group keys: nulls first, then numbers by value,
    /// then text lexicographically.
    pub fn cmp_ord(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Text(a), Text(b)) => a.cmp(b),
            (Text(_), _) => Ordering::Greater,
            (_, Text(_)) => Ordering::Less,
            (a, b) => a
                .as_f64()
                .partial_cmp(&b.as_f64())
                .unwrap_or(Ordering::Equal),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::Text(v)
    }
}

/// Flat result table: one row per measurement match, columns in
/// first-appearance order. Rows sourced from files with differing capture
/// sets are padded with [`Value::Null`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

/// Borrowed view of one table row.
#[derive(Clone, Copy)]
pub struct RowView<'a> {
    table: &'a Table,
    idx: usize,
}

impl<'a> RowView<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        self.table
            .col_idx(column)
            .map(|i| &self.table.rows[self.idx][i])
    }

    pub fn f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Value::as_f64)
    }

    pub fn i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    pub fn str(&self, column: &str) -> Option<&'a str> {
        self.get(column).and_then(Value::as_str)
    }
}

impl Table {
    pub fn new() -> Table {
        Table::default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn col_idx(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    fn empty_like(&self) -> Table {
        Table {
            columns: self.columns.clone(),
            index: self.index.clone(),
            rows: Vec::new(),
        }
    }

    /// Appends a row given as (column, value) pairs. Unknown columns extend
    /// the table (existing rows are padded with nulls); a repeated column
    /// name within one call is last-write-wins.
    pub fn push_row<I: IntoIterator<Item = (String, Value)>>(&mut self, fields: I) {
        let mut row = vec![Value::Null; self.columns.len()];
        for (name, value) in fields {
            let idx = match self.col_idx(&name) {
                Some(i) => i,
                None => {
                    let i = self.columns.len();
                    self.index.insert(name.clone(), i);
                    self.columns.push(name);
                    for r in &mut self.rows {
                        r.push(Value::Null);
                    }
                    row.push(Value::Null);
                    i
                }
            };
            row[idx] = value;
        }
        self.rows.push(row);
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        self.col_idx(column)
            .and_then(|i| self.rows.get(row).map(|r| &r[i]))
    }

    pub fn rows(&self) -> impl Iterator<Item = RowView<'_>> {
        (0..self.rows.len()).map(move |idx| RowView { table: self, idx })
    }

    pub fn filter(&self, pred: impl Fn(RowView<'_>) -> bool) -> Table {
        let mut out = self.empty_like();
        for idx in 0..self.rows.len() {
            if pred(RowView { table: self, idx }) {
                out.rows.push(self.rows[idx].clone());
            }
        }
        out
    }

    /// Adds or overwrites a column computed from each row.
    pub fn with_column(mut self, name: &str, f: impl Fn(RowView<'_>) -> Value) -> Table {
        let values: Vec<Value> = (0..self.rows.len())
            .map(|idx| f(RowView { table: &self, idx }))
            .collect();
        match self.col_idx(name) {
            Some(i) => {
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row[i] = v;
                }
            }
            None => {
                self.index.insert(name.to_owned(), self.columns.len());
                self.columns.push(name.to_owned());
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.push(v);
                }
            }
        }
        self
    }

    /// Non-null values of a column as floats. A text value is an error.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>, TableError> {
        let idx = self
            .col_idx(name)
            .ok_or_else(|| TableError::MissingColumn(name.to_owned()))?;
        let mut out = Vec::with_capacity(self.rows.len());
        for (i, row) in self.rows.iter().enumerate() {
            match &row[idx] {
                Value::Null => {}
                v => out.push(v.as_f64().ok_or_else(|| TableError::NonNumeric {
                    column: name.to_owned(),
                    row: i,
                    value: v.to_string(),
                })?),
            }
        }
        Ok(out)
    }

    /// Splits the table by key columns, groups ordered by key
    /// ([`Value::cmp_ord`] lexicographically), rows keeping their original
    /// order within each group.
    pub fn group_by(&self, keys: &[&str]) -> Result<Vec<(Vec<Value>, Table)>, TableError> {
        let idxs = keys
            .iter()
            .map(|k| {
                self.col_idx(k)
                    .ok_or_else(|| TableError::MissingColumn((*k).to_owned()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        order.sort_by(|&a, &b| {
            for &idx in &idxs {
                let ord = self.rows[a][idx].cmp_ord(&self.rows[b][idx]);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.cmp(&b)
        });

        let mut groups: Vec<(Vec<Value>, Table)> = Vec::new();
        for &row_idx in &order {
            let key: Vec<Value> = idxs.iter().map(|&i| self.rows[row_idx][i].clone()).collect();
            let row = self.rows[row_idx].clone();
            let same_key = groups.last().is_some_and(|(k, _)| {
                k.iter()
                    .zip(&key)
                    .all(|(a, b)| a.cmp_ord(b) == Ordering::Equal)
            });
            if same_key {
                if let Some((_, t)) = groups.last_mut() {
                    t.rows.push(row);
                }
            } else {
                let mut t = self.empty_like();
                t.rows.push(row);
                groups.push((key, t));
            }
        }
        Ok(groups)
    }

    /// Row-wise concatenation; the column set is the union.
    pub fn concat<I: IntoIterator<Item = Table>>(tables: I) -> Table {
        let mut out = Table::new();
        for t in tables {
            let Table { columns, rows, .. } = t;
            for row in rows {
                out.push_row(columns.iter().cloned().zip(row));
            }
        }
        out.coerce_columns();
        out
    }

    /// Column-wide dtype resolution: an all-integer column stays integer; one
    /// float promotes every integer in the column; any text leaves the column
    /// untouched (mixed).
    pub fn coerce_columns(&mut self) {
        for idx in 0..self.columns.len() {
            let mut any_float = false;
            let mut any_text = false;
            for row in &self.rows {
                match row[idx] {
                    Value::Float(_) => any_float = true,
                    Value::Text(_) => any_text = true,
                    _ => {}
                }
            }
            if any_text || !any_float {
                continue;
            }
            for row in &mut self.rows {
                if let Value::Int(i) = row[idx] {
                    row[idx] = Value::Float(i as f64);
                }
            }
        }
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<(), TableError> {
        let mut w = csv::Writer::from_writer(writer);
        w.write_record(&self.columns)?;
        for row in &self.rows {
            w.write_record(row.iter().map(|v| v.to_string()))?;
        }
        w.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fields: &[(&str, Value)]) -> Vec<(String, Value)> {
        fields
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn parse_numeric_looking_strings() {
        assert_eq!(Value::parse("12"), Value::Int(12));
        assert_eq!(Value::parse("-3"), Value::Int(-3));
        assert_eq!(Value::parse("12.5"), Value::Float(12.5));
        assert_eq!(Value::parse("1e3"), Value::Float(1000.0));
        assert_eq!(Value::parse("2:torus"), Value::Text("2:torus".to_owned()));
        assert_eq!(Value::parse(""), Value::Text(String::new()));
    }

    #[test]
    fn push_row_pads_column_union_with_nulls() {
        let mut t = Table::new();
        t.push_row(row(&[("a", Value::Int(1))]));
        t.push_row(row(&[("b", Value::Int(2))]));
        assert_eq!(t.columns(), &["a".to_owned(), "b".to_owned()]);
        assert_eq!(t.get(0, "b"), Some(&Value::Null));
        assert_eq!(t.get(1, "a"), Some(&Value::Null));
        assert_eq!(t.get(1, "b"), Some(&Value::Int(2)));
    }

    #[test]
    fn duplicate_field_in_one_row_is_last_write_wins() {
        let mut t = Table::new();
        t.push_row(row(&[("a", Value::Int(1)), ("a", Value::Int(7))]));
        assert_eq!(t.get(0, "a"), Some(&Value::Int(7)));
    }

    #[test]
    fn coerce_promotes_ints_next_to_floats() {
        let mut t = Table::new();
        t.push_row(row(&[("x", Value::Int(12))]));
        t.push_row(row(&[("x", Value::Float(12.5))]));
        t.coerce_columns();
        assert_eq!(t.get(0, "x"), Some(&Value::Float(12.0)));
        assert_eq!(t.get(1, "x"), Some(&Value::Float(12.5)));
    }

    #[test]
    fn coerce_leaves_mixed_text_columns_alone() {
        let mut t = Table::new();
        t.push_row(row(&[("x", Value::Int(12))]));
        t.push_row(row(&[("x", Value::Text("n/a".to_owned()))]));
        t.push_row(row(&[("x", Value::Float(1.5))]));
        t.coerce_columns();
        assert_eq!(t.get(0, "x"), Some(&Value::Int(12)));
        assert_eq!(t.get(1, "x"), Some(&Value::Text("n/a".to_owned())));
    }

    #[test]
    fn filter_and_with_column() {
        let mut t = Table::new();
        for i in 0..4 {
            t.push_row(row(&[("i", Value::Int(i)), ("time", Value::Int(i * 100))]));
        }
        let t = t.filter(|r| r.i64("i").is_some_and(|i| i >= 1));
        assert_eq!(t.len(), 3);
        let t = t.with_column("twice", |r| match r.i64("time") {
            Some(v) => Value::Int(v * 2),
            None => Value::Null,
        });
        assert_eq!(t.get(0, "twice"), Some(&Value::Int(200)));
    }

    #[test]
    fn group_by_sorts_keys_and_partitions_rows() {
        let mut t = Table::new();
        for (p, v) in [("b", 1), ("a", 2), ("b", 3), ("a", 4)] {
            t.push_row(row(&[
                ("policy", Value::Text(p.to_owned())),
                ("v", Value::Int(v)),
            ]));
        }
        let groups = t.group_by(&["policy"]).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, vec![Value::Text("a".to_owned())]);
        assert_eq!(groups[0].1.numeric_column("v").unwrap(), vec![2.0, 4.0]);
        assert_eq!(groups[1].1.numeric_column("v").unwrap(), vec![1.0, 3.0]);
        let total: usize = groups.iter().map(|(_, g)| g.len()).sum();
        assert_eq!(total, t.len());
    }

    #[test]
    fn group_by_numeric_keys_sort_by_value() {
        let mut t = Table::new();
        for n in [16, 1, 4] {
            t.push_row(row(&[("n", Value::Int(n))]));
        }
        let groups = t.group_by(&["n"]).unwrap();
        let keys: Vec<i64> = groups.iter().map(|(k, _)| k[0].as_i64().unwrap()).collect();
        assert_eq!(keys, vec![1, 4, 16]);
    }

    #[test]
    fn concat_unions_columns() {
        let mut a = Table::new();
        a.push_row(row(&[("x", Value::Int(1))]));
        let mut b = Table::new();
        b.push_row(row(&[("y", Value::Float(2.0))]));
        let t = Table::concat([a, b]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(0, "y"), Some(&Value::Null));
        assert_eq!(t.get(1, "y"), Some(&Value::Float(2.0)));
    }

    #[test]
    fn csv_export_writes_header_and_rows() {
        let mut t = Table::new();
        t.push_row(row(&[
            ("name", Value::Text("get".to_owned())),
            ("acc", Value::Int(100)),
        ]));
        t.push_row(row(&[("name", Value::Text("put".to_owned()))]));
        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "name,acc\nget,100\nput,\n");
    }

    #[test]
    fn numeric_column_skips_nulls_and_rejects_text() {
        let mut t = Table::new();
        t.push_row(row(&[("x", Value::Int(1))]));
        t.push_row(row(&[("y", Value::Int(9))]));
        t.push_row(row(&[("x", Value::Float(2.5))]));
        assert_eq!(t.numeric_column("x").unwrap(), vec![1.0, 2.5]);

        let mut t = Table::new();
        t.push_row(row(&[("x", Value::Text("oops".to_owned()))]));
        assert!(matches!(
            t.numeric_column("x"),
            Err(TableError::NonNumeric { .. })
        ));
        assert!(matches!(
            t.numeric_column("missing"),
            Err(TableError::MissingColumn(_))
        ));
    }
}
