//! User hook stages
//!
//! Each stage calls the hooks the record type declared, once per record,
//! and stops at the first failing hook.

use crate::model::Hook;
use crate::statement::Statement;

fn call_hooks(stmt: &mut Statement, hooks: &[Hook]) {
    if stmt.error.is_some() || stmt.flags.skip_hooks || stmt.flags.update_column {
        return;
    }
    run_hooks(stmt, hooks);
}

pub(crate) fn run_hooks(stmt: &mut Statement, hooks: &[Hook]) {
    let Some(schema) = stmt.schema.clone() else {
        return;
    };
    let wanted: Vec<Hook> = hooks
        .iter()
        .copied()
        .filter(|hook| schema.hooks.contains(*hook))
        .collect();
    if wanted.is_empty() || !stmt.dest.has_records() {
        return;
    }

    let session = stmt.hook_session();
    let mut failure = None;
    let mut records = stmt.dest.record_muts();
    'records: for record in records.iter_mut() {
        let record = &mut **record;
        if !schema.is_record(record) {
            continue;
        }
        for hook in &wanted {
            if let Err(err) = schema.call_hook(record, *hook, &session) {
                failure = Some(err);
                break 'records;
            }
        }
    }
    drop(records);
    if let Some(err) = failure {
        stmt.add_error(err);
    }
}

pub(crate) fn before_create(stmt: &mut Statement) {
    call_hooks(stmt, &[Hook::BeforeSave, Hook::BeforeCreate]);
}

pub(crate) fn after_create(stmt: &mut Statement) {
    call_hooks(stmt, &[Hook::AfterCreate, Hook::AfterSave]);
}

pub(crate) fn before_update(stmt: &mut Statement) {
    call_hooks(stmt, &[Hook::BeforeSave, Hook::BeforeUpdate]);
}

pub(crate) fn after_update(stmt: &mut Statement) {
    call_hooks(stmt, &[Hook::AfterUpdate, Hook::AfterSave]);
}

pub(crate) fn before_delete(stmt: &mut Statement) {
    call_hooks(stmt, &[Hook::BeforeDelete]);
}

pub(crate) fn after_delete(stmt: &mut Statement) {
    call_hooks(stmt, &[Hook::AfterDelete]);
}

pub(crate) fn after_query(stmt: &mut Statement) {
    call_hooks(stmt, &[Hook::AfterFind]);
}

/// Runs on a failed chain; hook failures are appended to the chain's error
pub(crate) fn after_error(stmt: &mut Statement) {
    if stmt.error.is_none() || stmt.flags.skip_hooks {
        return;
    }
    if stmt.error.as_ref().is_some_and(|e| e.is_not_found()) {
        return;
    }
    run_hooks(stmt, &[Hook::AfterError]);
}
