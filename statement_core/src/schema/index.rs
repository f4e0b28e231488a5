//! Index definitions collected from `index` / `unique_index` tags

use crate::schema::field::Field;
use crate::schema::naming::NamingStrategy;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
}

/// Fields sharing an index name form one composite index, in field order
pub(crate) fn parse_indexes(table: &str, fields: &[Arc<Field>], naming: &NamingStrategy) -> Vec<Index> {
    let mut indexes: Vec<Index> = Vec::new();
    for field in fields {
        let declared = [(field.index.as_deref(), false), (field.unique_index.as_deref(), true)];
        for (tag, unique) in declared {
            let Some(tag) = tag else { continue };
            let name = if tag.is_empty() {
                naming.index_name(table, &field.db_name)
            } else {
                tag.to_string()
            };
            match indexes.iter_mut().find(|idx| idx.name == name) {
                Some(existing) => {
                    existing.unique |= unique;
                    existing.columns.push(field.db_name.clone());
                }
                None => indexes.push(Index {
                    name,
                    unique: unique || field.unique,
                    columns: vec![field.db_name.clone()],
                }),
            }
        }
    }
    indexes
}
