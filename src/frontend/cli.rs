//! One-shot command line front-end.

use tracing::{error, info};

use super::{Completion, Target, describe_error, execute};
use crate::engine::MacroRunner;
use crate::error::EngineError;

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILED: u8 = 1;
/// Unknown macro or unusable configuration.
pub const EXIT_USAGE: u8 = 2;

/// Run one request and return the process exit code. No action means wake
/// only, which succeeds as soon as the broadcast is sent.
pub fn run_once(runner: &dyn MacroRunner, action: Option<&str>) -> u8 {
    let target = action.map_or(Target::Wake, Target::parse);

    match execute(runner, &target) {
        Ok(completion) => report(&completion),
        Err(EngineError::UnknownMacro(name)) => {
            error!(
                "Action '{}' not found. Available actions: {}",
                name,
                runner.macro_names().join(", ")
            );
            EXIT_USAGE
        }
        Err(e) => {
            error!("{}", describe_error(&e));
            EXIT_FAILED
        }
    }
}

fn report(completion: &Completion) -> u8 {
    if completion.is_success() {
        info!("{}", completion.message());
        EXIT_OK
    } else {
        error!("{}", completion.message());
        EXIT_FAILED
    }
}
