use std::{env, fmt::Display, str::FromStr};

pub fn get_env_var<T: FromStr + Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(val) => val.parse::<T>().unwrap_or_else(|_| {
            eprintln!(
                "invalid '{name}' environment value: {val}, using the default value '{default}'"
            );

            default
        }),
        Err(_) => default,
    }
}

/// Non-empty value of an environment variable, if set.
pub fn get_optional_env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|val| !val.is_empty())
}
