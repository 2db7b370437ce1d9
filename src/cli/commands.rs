use clap::Subcommand;

use super::key::KeyArgs;
use super::nav::NavArgs;
use super::sanitize::SanitizeArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Sanitize a script file (or stdin) and print the result
    Sanitize(SanitizeArgs),

    /// Show what the navigation arbiter decides for a request
    Nav(NavArgs),

    /// Check whether a storage write to KEY would be discarded
    Key(KeyArgs),

    /// Print the effective engine configuration
    Config,
}
