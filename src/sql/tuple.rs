//! `Tuple`: the executor pipeline's row representation. Keys are always
//! qualified as `"table_or_alias.column"`; unqualified column references
//! are resolved at lookup time by scanning for a unique suffix match,
//! which is what gives joins their "qualified first, fall back to
//! unqualified, fail on ambiguity" behavior joins rely on.

use crate::error::{Error, Result};
use crate::types::Scalar;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct Tuple {
    columns: BTreeMap<String, Scalar>,
}

impl Tuple {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_row(qualifier: &str, values: impl IntoIterator<Item = (String, Scalar)>) -> Self {
        let mut columns = BTreeMap::new();
        for (name, value) in values {
            columns.insert(format!("{qualifier}.{name}"), value);
        }
        Self { columns }
    }

    pub fn insert(&mut self, qualified_key: String, value: Scalar) {
        self.columns.insert(qualified_key, value);
    }

    pub fn merge(left: &Tuple, right: &Tuple) -> Tuple {
        let mut columns = left.columns.clone();
        for (k, v) in &right.columns {
            columns.insert(k.clone(), v.clone());
        }
        Tuple { columns }
    }

    pub fn get_qualified(&self, table: &str, name: &str) -> Option<&Scalar> {
        self.columns.get(&format!("{table}.{name}"))
    }

    /// Resolve a (possibly unqualified) column reference. Qualified
    /// lookups are exact; unqualified lookups first try `name` as a flat
    /// key (the executor's synthetic projection/aggregate tuples are keyed
    /// this way, and an aggregate's canonical form like `SUM(t.salary)`
    /// embeds a `.` that would otherwise confuse the suffix scan below),
    /// then fall back to scanning qualified keys whose suffix after the
    /// last `.` equals `name`, erroring on more than one match.
    pub fn resolve(&self, table: Option<&str>, name: &str) -> Result<&Scalar> {
        if let Some(t) = table {
            return self
                .columns
                .get(&format!("{t}.{name}"))
                .ok_or_else(|| Error::Schema(format!("no column '{t}.{name}' in scope")));
        }
        if let Some(v) = self.columns.get(name) {
            return Ok(v);
        }
        let mut found: Option<&Scalar> = None;
        for (key, value) in &self.columns {
            if key.rsplit_once('.').map(|(_, col)| col) == Some(name) {
                if found.is_some() {
                    return Err(Error::Validation(format!("ambiguous column reference '{name}'")));
                }
                found = Some(value);
            }
        }
        found.ok_or_else(|| Error::Schema(format!("no column '{name}' in scope")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Scalar)> {
        self.columns.iter()
    }

    /// All distinct unqualified column names, in first-seen (qualified)
    /// order, for `SELECT *` projection.
    pub fn unqualified_names(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for key in self.columns.keys() {
            let name = key.rsplit_once('.').map(|(_, c)| c).unwrap_or(key.as_str());
            if !seen.iter().any(|s: &String| s == name) {
                seen.push(name.to_string());
            }
        }
        seen
    }
}
