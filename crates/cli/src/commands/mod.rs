pub(crate) mod inspect;
pub(crate) mod keygen;
pub(crate) mod operations;
pub(crate) mod probe;
pub(crate) mod progress;
pub(crate) mod store;

use std::process;

use crate::{report_error, OutputFormat};

/// Report `msg` and exit with status 1.
pub(crate) fn fail(msg: &str, output: OutputFormat, quiet: bool) -> ! {
    report_error(msg, output, quiet);
    process::exit(1);
}

pub(crate) fn runtime(output: OutputFormat, quiet: bool) -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => fail(&format!("failed to create tokio runtime: {}", e), output, quiet),
    }
}
