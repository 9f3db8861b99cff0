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

//! Pruning of the table forest by include and skip patterns.

use globset::{Glob, GlobMatcher};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

use super::table::{Table, Tables};
use crate::error::FilterError;

/// How a table's parent fared during the walk.
#[derive(Debug, Clone)]
enum ParentState {
    /// The table is a root of the full forest.
    Root,
    /// The parent is part of the selection.
    Retained,
    /// The parent was not selected. Holds the nearest unselected ancestor.
    Missing(String),
    /// An ancestor matched a skip pattern.
    Excluded(String),
}

struct Patterns {
    option: &'static str,
    raw: Vec<String>,
    matchers: Vec<GlobMatcher>,
}

impl Patterns {
    fn compile(option: &'static str, raw: &[String]) -> Result<Self, FilterError> {
        let matchers = raw
            .iter()
            .map(|pattern| {
                Glob::new(pattern)
                    .map(|g| g.compile_matcher())
                    .map_err(|e| FilterError::InvalidPattern {
                        pattern: pattern.clone(),
                        reason: e.kind().to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            option,
            raw: raw.to_vec(),
            matchers,
        })
    }

    fn is_match(&self, name: &str) -> bool {
        self.matchers.iter().any(|m| m.is_match(name))
    }

    fn is_exact(&self, name: &str) -> bool {
        self.raw.iter().any(|p| p == name)
    }

    /// Every pattern has to select at least one table.
    fn check_all_used(&self, names: &[String]) -> Result<(), FilterError> {
        for (pattern, matcher) in self.raw.iter().zip(&self.matchers) {
            if !names.iter().any(|n| matcher.is_match(n)) {
                return Err(FilterError::NoMatch {
                    option: self.option,
                    pattern: pattern.clone(),
                });
            }
        }
        Ok(())
    }
}

struct Walk {
    include: Patterns,
    skip: Patterns,
    skip_dependent_tables: bool,
    order: HashMap<String, usize>,
    roots: Vec<Arc<Table>>,
}

impl Walk {
    /// Visit `table` and its descendants. Returns the pruned table when it
    /// should hang under its (retained) parent.
    fn visit(
        &mut self,
        table: &Arc<Table>,
        parent: ParentState,
    ) -> Result<Option<Arc<Table>>, FilterError> {
        if let ParentState::Excluded(ancestor) = &parent {
            if !self.skip_dependent_tables && self.include.is_exact(&table.name) {
                return Err(FilterError::MissingAncestor {
                    table: table.name.clone(),
                    ancestor: ancestor.clone(),
                });
            }
            for child in &table.relations {
                self.visit(child, parent.clone())?;
            }
            return Ok(None);
        }

        if self.skip.is_match(&table.name) {
            debug!("Skipping table {} and its dependents", table.name);
            for child in &table.relations {
                self.visit(child, ParentState::Excluded(table.name.clone()))?;
            }
            return Ok(None);
        }

        let pulled_in =
            matches!(parent, ParentState::Retained) && !self.skip_dependent_tables;
        if !self.include.is_match(&table.name) && !pulled_in {
            for child in &table.relations {
                self.visit(child, ParentState::Missing(table.name.clone()))?;
            }
            return Ok(None);
        }

        if let ParentState::Missing(ancestor) = &parent {
            if !self.skip_dependent_tables {
                return Err(FilterError::MissingAncestor {
                    table: table.name.clone(),
                    ancestor: ancestor.clone(),
                });
            }
        }

        let mut relations = Vec::with_capacity(table.relations.len());
        for child in &table.relations {
            if let Some(kept) = self.visit(child, ParentState::Retained)? {
                relations.push(kept);
            }
        }

        let unchanged = relations.len() == table.relations.len()
            && relations
                .iter()
                .zip(&table.relations)
                .all(|(a, b)| Arc::ptr_eq(a, b));
        let pruned = if unchanged {
            table.clone()
        } else {
            Arc::new(Table {
                relations,
                ..Table::clone(table)
            })
        };

        match parent {
            ParentState::Retained => Ok(Some(pruned)),
            _ => {
                if table.is_child() {
                    debug!("Table {} will be synced without its parent", table.name);
                }
                self.roots.push(pruned);
                Ok(None)
            }
        }
    }
}

impl Tables {
    /// Select the tables named by `include` and not named by `skip`.
    ///
    /// Patterns are globs; an empty `include` selects everything. Unless
    /// `skip_dependent_tables` is set, the children of a selected table are
    /// selected too, and a selected table whose parent is not selected is an
    /// error. With `skip_dependent_tables`, such a table becomes a root of the
    /// result. Descendants of a skipped table are never selected.
    ///
    /// The result keeps declaration order.
    pub fn filter_dfs(
        &self,
        include: &[String],
        skip: &[String],
        skip_dependent_tables: bool,
    ) -> Result<Tables, FilterError> {
        let include_all = ["*".to_string()];
        let include = if include.is_empty() {
            &include_all[..]
        } else {
            include
        };

        let names = self.names();
        let include = Patterns::compile("tables", include)?;
        let skip = Patterns::compile("skip_tables", skip)?;
        include.check_all_used(&names)?;
        skip.check_all_used(&names)?;

        let mut walk = Walk {
            include,
            skip,
            skip_dependent_tables,
            order: names
                .into_iter()
                .enumerate()
                .map(|(i, n)| (n, i))
                .collect(),
            roots: Vec::new(),
        };

        for table in self.iter() {
            walk.visit(table, ParentState::Root)?;
        }

        let order = walk.order;
        let mut roots = walk.roots;
        roots.sort_by_key(|t| order.get(&t.name).copied().unwrap_or(usize::MAX));
        Ok(Tables::from_roots(roots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientMeta;
    use crate::schema::{Column, ColumnType, Resource, TableResolver};
    use async_trait::async_trait;
    use serde_json::Value;

    struct Empty;

    #[async_trait]
    impl TableResolver for Empty {
        async fn resolve(
            &self,
            _client: &dyn ClientMeta,
            _parent: Option<&Resource>,
        ) -> anyhow::Result<Vec<Value>> {
            Ok(Vec::new())
        }
    }

    fn table(name: &str) -> Table {
        Table::new(name, Arc::new(Empty))
            .with_columns(vec![Column::new("id", ColumnType::String, "/id").primary_key()])
    }

    /// `{A, B(parent=A), C}`
    fn abc() -> Tables {
        Tables::new(vec![table("A").with_relation(table("B")), table("C")])
    }

    /// `{a -> a1 -> a11, b, c -> c1}`
    fn deep() -> Tables {
        Tables::new(vec![
            table("a").with_relation(table("a1").with_relation(table("a11"))),
            table("b"),
            table("c").with_relation(table("c1")),
        ])
    }

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_child_without_parent_names_missing_ancestor() {
        let err = abc().filter_dfs(&s(&["B"]), &[], false).unwrap_err();
        assert_eq!(
            err,
            FilterError::MissingAncestor {
                table: "B".to_string(),
                ancestor: "A".to_string(),
            }
        );
    }

    #[test]
    fn test_child_without_parent_with_skip_dependent() {
        let filtered = abc().filter_dfs(&s(&["B"]), &[], true).unwrap();
        assert_eq!(filtered.names(), s(&["B"]));
        assert!(filtered.iter().next().unwrap().is_child());
    }

    #[test]
    fn test_empty_include_selects_everything() {
        let filtered = deep().filter_dfs(&[], &[], false).unwrap();
        assert_eq!(filtered.names(), deep().names());
    }

    #[test]
    fn test_dependents_follow_parent() {
        let filtered = deep().filter_dfs(&s(&["a"]), &[], false).unwrap();
        assert_eq!(filtered.names(), s(&["a", "a1", "a11"]));

        let filtered = deep().filter_dfs(&s(&["a"]), &[], true).unwrap();
        assert_eq!(filtered.names(), s(&["a"]));
    }

    #[test]
    fn test_skipped_parent_drops_descendants() {
        let filtered = deep().filter_dfs(&[], &s(&["a1"]), false).unwrap();
        assert_eq!(filtered.names(), s(&["a", "b", "c", "c1"]));
    }

    #[test]
    fn test_explicit_child_of_skipped_parent() {
        let err = deep()
            .filter_dfs(&s(&["a", "a11"]), &s(&["a1"]), false)
            .unwrap_err();
        assert_eq!(
            err,
            FilterError::MissingAncestor {
                table: "a11".to_string(),
                ancestor: "a1".to_string(),
            }
        );

        // with skip_dependent_tables the child is dropped, never an orphan
        let filtered = deep()
            .filter_dfs(&s(&["a", "a11"]), &s(&["a1"]), true)
            .unwrap();
        assert_eq!(filtered.names(), s(&["a"]));
    }

    #[test]
    fn test_skip_dependent_never_keeps_excluded_descendants() {
        let filtered = deep().filter_dfs(&s(&["*"]), &s(&["a"]), true).unwrap();
        for name in filtered.names() {
            assert!(!name.starts_with('a'), "unexpected {name}");
        }
    }

    #[test]
    fn test_orphans_keep_declaration_order() {
        let filtered = deep()
            .filter_dfs(&s(&["c1", "b", "a11"]), &[], true)
            .unwrap();
        assert_eq!(filtered.names(), s(&["a11", "b", "c1"]));
    }

    #[test]
    fn test_glob_patterns() {
        let filtered = deep().filter_dfs(&s(&["a*"]), &[], true).unwrap();
        assert_eq!(filtered.names(), s(&["a", "a1", "a11"]));
    }

    #[test]
    fn test_pattern_without_matches() {
        let err = abc().filter_dfs(&s(&["nope"]), &[], false).unwrap_err();
        assert_eq!(err.to_string(), "tables include a pattern nope with no matches");

        let err = abc().filter_dfs(&[], &s(&["X*"]), false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "skip_tables include a pattern X* with no matches"
        );
    }

    #[test]
    fn test_invalid_pattern() {
        let err = abc().filter_dfs(&s(&["[A"]), &[], false).unwrap_err();
        assert!(matches!(err, FilterError::InvalidPattern { .. }));
    }

    #[test]
    fn test_filter_is_stable_and_leaves_registry_untouched() {
        let tables = deep();
        let first = tables.filter_dfs(&s(&["a", "c"]), &s(&["a11"]), false).unwrap();
        let second = tables.filter_dfs(&s(&["a", "c"]), &s(&["a11"]), false).unwrap();
        assert_eq!(first.names(), s(&["a", "a1", "c", "c1"]));
        assert_eq!(first.names(), second.names());
        assert_eq!(tables.names(), s(&["a", "a1", "a11", "b", "c", "c1"]));
    }
}
