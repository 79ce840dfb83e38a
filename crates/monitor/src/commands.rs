/// `check` subcommand.
mod check;

/// `run` subcommand.
mod run;

/// `watch` subcommand.
mod watch;

pub(crate) use check::check;
pub(crate) use run::run;
pub(crate) use watch::watch;
