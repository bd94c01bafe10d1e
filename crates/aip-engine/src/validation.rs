//! Per-block validation stage
//!
//! Each pass runs every validator concurrently over the same read-only block.
//! Errors are then put to the exception handler one by one. In a
//! validation-only run the rows named by accepted row errors are removed and
//! the block is validated again from the first validator.
//!
//! A further pass only happens when the previous one shrank the block, so the
//! loop ends after at most `rows + 1` passes. `max_validation_passes` is a
//! hard stop on top of that.

use aip_common::types::{DataBlock, Table};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::collaborators::{ExceptionHandler, ValidationContext, Validator};
use crate::command::ArchiveCommand;
use crate::error::{EngineError, Result};

/// Result of validating one block
#[derive(Debug)]
pub struct ValidationOutcome {
    /// Block with rejected rows removed
    pub block: DataBlock,
    pub passes: usize,
    pub rows_removed: usize,
    /// Errors the handler let through
    pub accepted_errors: usize,
}

#[derive(Clone)]
pub struct ValidationStage {
    validators: Vec<Arc<dyn Validator>>,
    handler: Arc<dyn ExceptionHandler>,
}

impl ValidationStage {
    pub fn new(validators: Vec<Arc<dyn Validator>>, handler: Arc<dyn ExceptionHandler>) -> Self {
        Self { validators, handler }
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    pub async fn validate(
        &self,
        table: &Arc<Table>,
        block: DataBlock,
        is_last_block: bool,
        command: &ArchiveCommand,
        token: &CancellationToken,
    ) -> Result<ValidationOutcome> {
        let ctx = ValidationContext::new(token.clone(), command.validation_only);
        let mut outcome = ValidationOutcome {
            block,
            passes: 0,
            rows_removed: 0,
            accepted_errors: 0,
        };

        loop {
            if token.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            if outcome.passes >= command.max_validation_passes.max(1) {
                return Err(EngineError::invariant(format!(
                    "validation of {} did not settle after {} passes",
                    table.target_name, outcome.passes
                )));
            }
            outcome.passes += 1;

            let (block, errors) = self.run_pass(table, outcome.block, is_last_block, &ctx, token).await?;
            outcome.block = block;
            if errors.is_empty() {
                break;
            }

            let mut rejected = Vec::new();
            for error in errors {
                if error.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                if !self.handler.handle(&error) {
                    return Err(EngineError::AlreadyHandled(Box::new(error)));
                }
                outcome.accepted_errors += 1;
                if let EngineError::Recoverable(e) = &error {
                    if command.validation_only {
                        rejected.extend_from_slice(&e.rows);
                    }
                }
            }

            let removed = outcome.block.remove_rows(&rejected);
            if removed == 0 {
                break;
            }
            outcome.rows_removed += removed;
            tracing::debug!(
                table = %table.target_name,
                removed,
                remaining = outcome.block.len(),
                pass = outcome.passes,
                "Removed rejected rows, validating again"
            );
        }

        for validator in &self.validators {
            validator.commit(table, &outcome.block);
        }
        Ok(outcome)
    }

    /// One pass of every validator; the block is handed back untouched
    async fn run_pass(
        &self,
        table: &Arc<Table>,
        block: DataBlock,
        is_last_block: bool,
        ctx: &ValidationContext,
        token: &CancellationToken,
    ) -> Result<(DataBlock, Vec<EngineError>)> {
        let shared = Arc::new(block);
        let mut workers = JoinSet::new();
        for validator in &self.validators {
            let validator = Arc::clone(validator);
            let table = Arc::clone(table);
            let block = Arc::clone(&shared);
            let ctx = ctx.clone();
            workers.spawn_blocking(move || {
                let result = validator.validate(&table, &block, is_last_block, &ctx);
                if let Err(e) = &result {
                    tracing::debug!(validator = validator.name(), table = %table.target_name, error = %e, "Validator failed");
                }
                result
            });
        }

        let mut errors = Vec::new();
        loop {
            let joined = tokio::select! {
                _ = token.cancelled() => {
                    workers.abort_all();
                    return Err(EngineError::Cancelled);
                }
                joined = workers.join_next() => joined,
            };
            match joined {
                None => break,
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => errors.push(e),
                Some(Err(e)) => errors.push(EngineError::Task(e)),
            }
        }

        let block = Arc::try_unwrap(shared).unwrap_or_else(|shared| (*shared).clone());
        Ok((block, errors))
    }
}
