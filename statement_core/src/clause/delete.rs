//! DELETE

use super::Builder;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Delete {
    pub modifier: String,
}

impl Delete {
    pub fn build(&self, builder: &mut dyn Builder) {
        builder.write_str("DELETE");
        if !self.modifier.is_empty() {
            builder.write_char(' ');
            builder.write_str(&self.modifier);
        }
    }
}
