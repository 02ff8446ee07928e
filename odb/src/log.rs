//! Logging macros and pass summaries.
//!
//! Unit tests route the macros to `println!`; everything else goes through
//! the `log` facade.

#[cfg(test)]
#[allow(unused_imports)]
pub(crate) use std::{
    println as trace, println as debug, println as info, println as warn, println as error,
};

#[cfg(not(test))]
#[allow(unused_imports)]
pub(crate) use log::{debug, error, info, trace, warn};

/// The outcome of a pass over a block, such as a replay or a global connect.
///
/// [`Log::log`] writes the summary at info level and each warning at warn
/// level.
pub trait Log {
    /// One line describing what the pass did.
    fn summary(&self) -> String;

    /// Things the pass skipped or could not do.
    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }

    fn log(&self) {
        info!("{}", self.summary());
        for warning in self.warnings() {
            warn!("{warning}");
        }
    }
}
