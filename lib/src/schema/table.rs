// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tables and the table forest.
//!
//! A connector declares its tables once as a [`Tables`] value. Each table may
//! carry child tables in `relations`; a child is resolved once per row of its
//! parent. The forest is never mutated: filtering produces a new forest that
//! shares the unchanged parts.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::column::Column;
use super::resource::Resource;
use crate::client::ClientMeta;

/// Fetches the raw API items of a table.
///
/// `parent` is the parent row for child tables. It is `None` for root tables
/// and for child tables selected without their parent, in which case the
/// resolver enumerates the parents itself.
#[async_trait]
pub trait TableResolver: Send + Sync {
    async fn resolve(
        &self,
        client: &dyn ClientMeta,
        parent: Option<&Resource>,
    ) -> Result<Vec<Value>>;

    /// Called for incremental tables once every item of a [`resolve`] call
    /// became a row. `items` are the items returned by that call.
    ///
    /// Cursors belong here: a call with a failed row is never committed, so
    /// its items are fetched again on the next sync.
    ///
    /// [`resolve`]: TableResolver::resolve
    async fn commit(&self, _client: &dyn ClientMeta, _items: &[Value]) -> Result<()> {
        Ok(())
    }
}

/// Splits one client into several scoped clients (per folder, per cloud...).
pub type Multiplexer = fn(&Arc<dyn ClientMeta>) -> Vec<Arc<dyn ClientMeta>>;

/// A named, schema-bearing extraction unit.
#[derive(Clone)]
pub struct Table {
    pub name: String,
    pub description: String,
    pub columns: Vec<Column>,
    pub resolver: Arc<dyn TableResolver>,
    pub multiplex: Option<Multiplexer>,
    pub relations: Vec<Arc<Table>>,
    /// Name of the parent table, if this is a child table.
    pub parent: Option<String>,
    /// Incremental tables keep a cursor in the bookmark store.
    pub is_incremental: bool,
}

impl Table {
    /// Create a table with the `_cq_id` and `_cq_parent_id` columns.
    pub fn new(name: impl Into<String>, resolver: Arc<dyn TableResolver>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            columns: vec![Column::cq_id(), Column::cq_parent_id()],
            resolver,
            multiplex: None,
            relations: Vec::new(),
            parent: None,
            is_incremental: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_columns(mut self, columns: Vec<Column>) -> Self {
        self.columns.extend(columns);
        self
    }

    pub fn with_multiplex(mut self, multiplex: Multiplexer) -> Self {
        self.multiplex = Some(multiplex);
        self
    }

    pub fn incremental(mut self) -> Self {
        self.is_incremental = true;
        self
    }

    /// Attach a child table. The child's `parent` is set to this table.
    pub fn with_relation(mut self, mut child: Table) -> Self {
        child.parent = Some(self.name.clone());
        self.relations.push(Arc::new(child));
        self
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    /// Whether this is a child table. Among the roots of a filtered forest this
    /// marks a table scheduled without its parent.
    pub fn is_child(&self) -> bool {
        self.parent.is_some()
    }

    /// Serializable description of the table, without its relations.
    pub fn schema(&self) -> TableSchema {
        TableSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parent: self.parent.clone(),
            is_incremental: self.is_incremental,
            columns: self.columns.clone(),
        }
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("columns", &self.columns.len())
            .field("relations", &self.relations)
            .finish()
    }
}

/// Table definition as sent to destinations in migrate messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub is_incremental: bool,
    pub columns: Vec<Column>,
}

/// An ordered forest of tables.
#[derive(Clone, Default)]
pub struct Tables(Vec<Arc<Table>>);

impl Tables {
    pub fn new(tables: Vec<Table>) -> Self {
        Self(tables.into_iter().map(Arc::new).collect())
    }

    pub(crate) fn from_roots(roots: Vec<Arc<Table>>) -> Self {
        Self(roots)
    }

    /// Root tables in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Table>> {
        self.0.iter()
    }

    /// Number of root tables.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All tables, parents before children, in declaration order.
    pub fn flatten(&self) -> Vec<Arc<Table>> {
        fn visit(table: &Arc<Table>, out: &mut Vec<Arc<Table>>) {
            out.push(table.clone());
            for child in &table.relations {
                visit(child, out);
            }
        }

        let mut out = Vec::new();
        for table in &self.0 {
            visit(table, &mut out);
        }
        out
    }

    /// Names of all tables in flattened order.
    pub fn names(&self) -> Vec<String> {
        self.flatten().iter().map(|t| t.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Table>> {
        self.flatten().into_iter().find(|t| t.name == name)
    }

    /// Check that names are unique and every table has a primary key.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for table in self.flatten() {
            if !seen.insert(table.name.clone()) {
                bail!("duplicate table name {}", table.name);
            }
            if table.primary_keys().next().is_none() {
                bail!("table {} has no primary key", table.name);
            }
            let mut columns = HashSet::new();
            for column in &table.columns {
                if !columns.insert(column.name.as_str()) {
                    bail!("table {} has duplicate column {}", table.name, column.name);
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Tables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a Tables {
    type Item = &'a Arc<Table>;
    type IntoIter = std::slice::Iter<'a, Arc<Table>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
