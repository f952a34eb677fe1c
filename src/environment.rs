use std::env;
use std::str::FromStr;
use tracing::warn;

/// Reads and parses an environment variable, falling back to a default.
///
/// Unset variables fall back silently; values that fail to parse are logged
/// and ignored.
///
/// # Arguments
/// - `var`: The name of the environment variable.
/// - `default`: Value used when the variable is unset or malformed.
///
/// # Returns
/// - The parsed value or `default`
pub fn get_env_var_or<T: FromStr>(var: &str, default: T) -> T {
    match env::var(var) {
        Ok(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Ignoring malformed value for {}: {:?}", var, value);
                default
            }
        },
        Err(_) => default,
    }
}
