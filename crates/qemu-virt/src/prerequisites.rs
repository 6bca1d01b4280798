use std::ffi::OsStr;

use crate::error::{LaunchError, LaunchResult};

/// Verify that every program the run will execute can be found.
///
/// Accepts bare names (searched in `PATH`) and explicit paths. Collects all
/// failures and returns them in a single `Prerequisites` error.
pub fn check_prerequisites<'a>(
    programs: impl IntoIterator<Item = (&'a str, &'a OsStr)>,
) -> LaunchResult<()> {
    let mut errors = Vec::new();

    for (label, program) in programs {
        if which::which(program).is_err() {
            errors.push(format!(
                "{label} not found: {}",
                program.to_string_lossy()
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(LaunchError::Prerequisites(errors.join("; ")))
    }
}
