//! LIMIT / OFFSET
//!
//! Counts are rendered literally; dialects without `LIMIT` override the
//! clause (see `Dialect::build_clause`).

use super::Builder;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limit {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Limit {
    pub fn new(limit: Option<u64>, offset: Option<u64>) -> Self {
        Self { limit, offset }
    }

    pub fn build(&self, builder: &mut dyn Builder) {
        let mut wrote = false;
        if let Some(limit) = self.limit {
            builder.write_str(&format!("LIMIT {limit}"));
            wrote = true;
        }
        if let Some(offset) = self.offset.filter(|o| *o > 0) {
            if wrote {
                builder.write_char(' ');
            }
            builder.write_str(&format!("OFFSET {offset}"));
        }
    }
}
