//! Default stages of every chain
//!
//! Names carry the `orm:` prefix so user stages can be placed relative to
//! them with `before`/`after`, or swapped out with `replace`.

pub(crate) mod associations;
pub(crate) mod create;
pub(crate) mod delete;
pub(crate) mod domain;
pub(crate) mod helper;
pub(crate) mod hooks;
pub(crate) mod preload;
pub(crate) mod query;
pub(crate) mod row;
pub(crate) mod scan;
pub(crate) mod transaction;
pub(crate) mod update;

use crate::callbacks::{sync_stage, Callbacks};
use crate::errors::OrmError;
use crate::statement::Statement;

fn wants_transaction(stmt: &Statement) -> bool {
    !stmt.flags.skip_default_transaction
}

pub fn register_defaults(callbacks: &Callbacks) -> Result<(), OrmError> {
    let create = callbacks.create();
    create
        .when(wants_transaction)
        .register("orm:begin_transaction", transaction::begin)?;
    create.register_stage("orm:before_create", sync_stage(hooks::before_create))?;
    create.register_stage("orm:check_extra", sync_stage(domain::check_extra_create))?;
    create.register(
        "orm:save_before_associations",
        associations::save_before_associations,
    )?;
    create.register("orm:create", create::create)?;
    create.register(
        "orm:save_after_associations",
        associations::save_after_associations,
    )?;
    create.register_stage("orm:after_create", sync_stage(hooks::after_create))?;
    create.register(
        "orm:commit_or_rollback_transaction",
        transaction::commit_or_rollback,
    )?;

    let query = callbacks.query();
    query.register("orm:query", query::query)?;
    query.register("orm:preload", preload::preload)?;
    query.register_stage("orm:after_query", sync_stage(hooks::after_query))?;

    let update = callbacks.update();
    update
        .when(wants_transaction)
        .register("orm:begin_transaction", transaction::begin)?;
    update.register_stage(
        "orm:setup_reflect_value",
        sync_stage(update::setup_reflect_value),
    )?;
    update.register_stage("orm:before_update", sync_stage(hooks::before_update))?;
    update.register_stage("orm:check_extra", sync_stage(domain::check_extra_update))?;
    update.register(
        "orm:save_before_associations",
        associations::save_before_associations,
    )?;
    update.register("orm:update", update::update)?;
    update.register(
        "orm:save_after_associations",
        associations::save_after_associations,
    )?;
    update.register_stage("orm:after_update", sync_stage(hooks::after_update))?;
    update.register(
        "orm:commit_or_rollback_transaction",
        transaction::commit_or_rollback,
    )?;

    let delete = callbacks.delete();
    delete
        .when(wants_transaction)
        .register("orm:begin_transaction", transaction::begin)?;
    delete.register_stage("orm:before_delete", sync_stage(hooks::before_delete))?;
    delete.register(
        "orm:delete_before_associations",
        associations::delete_before_associations,
    )?;
    delete.register("orm:delete", delete::delete)?;
    delete.register_stage("orm:after_delete", sync_stage(hooks::after_delete))?;
    delete.register(
        "orm:commit_or_rollback_transaction",
        transaction::commit_or_rollback,
    )?;

    callbacks.row().register("orm:row", row::row)?;
    callbacks.raw().register("orm:raw", row::raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::CallbackKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_chains_run_in_registration_order() {
        let callbacks = Callbacks::new();
        register_defaults(&callbacks).unwrap();
        assert_eq!(
            callbacks.processor(CallbackKind::Create).names().unwrap(),
            vec![
                "orm:begin_transaction",
                "orm:before_create",
                "orm:check_extra",
                "orm:save_before_associations",
                "orm:create",
                "orm:save_after_associations",
                "orm:after_create",
                "orm:commit_or_rollback_transaction",
            ]
        );
        assert_eq!(
            callbacks.query().names().unwrap(),
            vec!["orm:query", "orm:preload", "orm:after_query"]
        );
        assert_eq!(callbacks.row().names().unwrap(), vec!["orm:row"]);
    }

    #[test]
    fn user_stage_lands_before_the_insert() {
        let callbacks = Callbacks::new();
        register_defaults(&callbacks).unwrap();
        callbacks
            .create()
            .before("orm:create")
            .after("orm:save_before_associations")
            .register_stage("audit", sync_stage(|_| {}))
            .unwrap();
        let names = callbacks.create().names().unwrap();
        let audit = names.iter().position(|n| n == "audit").unwrap();
        let create = names.iter().position(|n| n == "orm:create").unwrap();
        assert_eq!(audit + 1, create);
    }
}
