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

mod column;
mod filter;
mod resource;
mod table;

pub use column::{Column, ColumnType, ValueSource, CQ_ID_COLUMN, CQ_PARENT_ID_COLUMN};
pub use resource::Resource;
pub use table::{Multiplexer, Table, TableResolver, TableSchema, Tables};
