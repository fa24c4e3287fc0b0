use std::time::Instant;

use anyhow::Result;
use tracing::{error, info};

use patchbay_registry::CommandSet;
use patchbay_types::RawResult;

use crate::context::RequestContext;

/// Invoke the requested command, when the request authenticated.
///
/// Handler faults are contained and logged so a broken command cannot take
/// down the endpoint. In debug mode the fault propagates instead, giving
/// the caller the full error chain.
pub(crate) fn dispatch(commands: &CommandSet, ctx: &mut RequestContext) -> Result<RawResult> {
    let Some(name) = ctx.command.clone() else {
        return Ok(RawResult::None);
    };
    if !ctx.authenticated {
        return Ok(RawResult::None);
    }
    let Some(command) = commands.get(&name) else {
        return Ok(RawResult::None);
    };

    let started = Instant::now();
    let invoked = command.invoke(&ctx.args);
    if ctx.profile {
        info!(
            command = %name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "profiled command call"
        );
    }

    match invoked {
        Ok(outcome) => {
            ctx.kind = outcome.kind;
            if outcome.message.is_some() {
                ctx.message = outcome.message;
            }
            Ok(outcome.data)
        }
        Err(error) => {
            if ctx.debug {
                return Err(error);
            }
            error!(
                command = %name,
                args = ?ctx.args.keys().collect::<Vec<_>>(),
                error = %error,
                "command failed"
            );
            Ok(RawResult::None)
        }
    }
}
