//! Lookup-path resolution through the foreign-key graph
//!
//! A tag `anchor_id.faction_id.faction_name` on a `room` column reads: follow
//! `room.anchor_id` to its foreign table, from there follow `faction_id`, and
//! take `faction_name` from the table reached. Every segment but the last must
//! be a foreign field of the table the walk is on.

use crate::collection::DbMeta;
use crate::errors::DomainError;
use crate::model::ForeignRef;

/// Maximum number of segments in a lookup tag
pub const MAX_TAG_DEPTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupHop {
    /// Foreign field followed on the current table
    pub field: String,
    pub foreign: ForeignRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupPath {
    /// Column carrying the tag
    pub column: String,
    pub hops: Vec<LookupHop>,
    /// Field read from the last table reached
    pub last_field: String,
    pub segments: Vec<String>,
}

impl LookupPath {
    pub fn depth(&self) -> usize {
        self.hops.len()
    }

    /// Table the final value is read from
    pub fn target_table(&self) -> Option<&str> {
        self.hops.last().map(|h| h.foreign.table.as_str())
    }
}

/// Resolve `tag` declared on `column` of `table` within one database
pub fn parse_lookup_tag(
    db: &DbMeta,
    db_name: &str,
    table: &str,
    column: &str,
    tag: &str,
) -> Result<LookupPath, DomainError> {
    let segments: Vec<String> = tag.split('.').map(str::to_string).collect();
    if segments.len() > MAX_TAG_DEPTH {
        return Err(DomainError::LookupTooDeep {
            tag: tag.to_string(),
            depth: segments.len(),
            max: MAX_TAG_DEPTH,
        });
    }
    if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
        return Err(DomainError::LookupMalformed {
            tag: tag.to_string(),
        });
    }

    let mut current = db.table(table).ok_or_else(|| DomainError::UnknownTable {
        db: db_name.to_string(),
        table: table.to_string(),
    })?;
    let mut hops = Vec::with_capacity(segments.len() - 1);

    for pair in segments.windows(2) {
        let (segment, next) = (&pair[0], &pair[1]);
        let foreign = current
            .foreign_fields()
            .find(|f| &f.name == segment)
            .and_then(|f| f.foreign.clone())
            .ok_or_else(|| DomainError::LookupNotForeign {
                tag: tag.to_string(),
                db: db_name.to_string(),
                table: current.table_name.clone(),
                field: segment.clone(),
            })?;

        if foreign.db_name != db_name {
            return Err(DomainError::LookupMismatch {
                tag: tag.to_string(),
                db: db_name.to_string(),
                table: current.table_name.clone(),
                field: segment.clone(),
                reason: format!("foreign db={} differs from lookup db", foreign.db_name),
            });
        }

        let target = db.table(&foreign.table).ok_or_else(|| DomainError::UnknownTable {
            db: db_name.to_string(),
            table: foreign.table.clone(),
        })?;
        if target.field(next).is_none() {
            return Err(DomainError::LookupMismatch {
                tag: tag.to_string(),
                db: db_name.to_string(),
                table: current.table_name.clone(),
                field: segment.clone(),
                reason: format!("foreign table {} has no field {}", target.table_name, next),
            });
        }

        hops.push(LookupHop {
            field: segment.clone(),
            foreign,
        });
        current = target;
    }

    Ok(LookupPath {
        column: column.to_string(),
        hops,
        last_field: segments[segments.len() - 1].clone(),
        segments,
    })
}
