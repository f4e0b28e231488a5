//! Table, column, join-table and index naming

use heck::ToSnakeCase;

/// Derives database identifiers from Rust type and field names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamingStrategy {
    pub table_prefix: String,
    pub singular_table: bool,
}

impl NamingStrategy {
    pub fn new(table_prefix: impl Into<String>, singular_table: bool) -> Self {
        Self {
            table_prefix: table_prefix.into(),
            singular_table,
        }
    }

    pub fn from_config(config: &config::OrmConfig) -> Self {
        Self::new(config.table_prefix.clone(), config.singular_table)
    }

    /// `UserProfile` becomes `user_profiles` (or `user_profile` when singular)
    pub fn table_name(&self, type_name: &str) -> String {
        let snake = type_name.to_snake_case();
        if self.singular_table {
            format!("{}{}", self.table_prefix, snake)
        } else {
            format!("{}{}", self.table_prefix, pluralize_last(&snake))
        }
    }

    pub fn column_name(&self, field_name: &str) -> String {
        field_name.to_snake_case()
    }

    /// Join table of a many-to-many relation, named by the `many2many` tag
    pub fn join_table_name(&self, name: &str) -> String {
        format!("{}{}", self.table_prefix, name.to_snake_case())
    }

    pub fn index_name(&self, table: &str, column: &str) -> String {
        format!("idx_{table}_{column}")
    }

    /// Default foreign key column pointing at `owner`'s `primary`
    pub fn foreign_key(&self, owner: &str, primary: &str) -> String {
        format!("{}_{}", owner.to_snake_case(), primary.to_snake_case())
    }
}

fn pluralize_last(snake: &str) -> String {
    match snake.rsplit_once('_') {
        Some((head, last)) => format!("{head}_{}", pluralizer::pluralize(last, 2, false)),
        None => pluralizer::pluralize(snake, 2, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_plural_snake_case() {
        let naming = NamingStrategy::default();
        assert_eq!(naming.table_name("User"), "users");
        assert_eq!(naming.table_name("UserProfile"), "user_profiles");
        assert_eq!(naming.table_name("Company"), "companies");
    }

    #[test]
    fn prefix_and_singular_apply() {
        let naming = NamingStrategy::new("t_", true);
        assert_eq!(naming.table_name("OrderItem"), "t_order_item");
        assert_eq!(naming.join_table_name("UserLanguages"), "t_user_languages");
    }

    #[test]
    fn derived_identifiers() {
        let naming = NamingStrategy::default();
        assert_eq!(naming.column_name("CreatedAt"), "created_at");
        assert_eq!(naming.index_name("users", "email"), "idx_users_email");
        assert_eq!(naming.foreign_key("User", "id"), "user_id");
    }
}
