use std::env;
use std::fmt::Debug;
use std::path::PathBuf;
use std::str::FromStr;

/// Returns the value of the named environment variable if it exists or panics.
pub fn get_variable(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| panic!("must define {} environment variable", name))
}

/// Returns the parsed value of the named environment variable, or
/// `default` if it isn't defined. Panics if the value can't be parsed.
pub fn get_variable_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Debug,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .unwrap_or_else(|e| panic!("parse {} environment variable: {:?}", name, e)),
        Err(_) => default,
    }
}

#[cfg(feature = "which")]
pub fn get_ffprobe(env: Option<String>) -> Option<PathBuf> {
    use which::which;

    which("ffprobe")
        .ok()
        .or_else(move || env.map(PathBuf::from))
}

#[cfg(not(feature = "which"))]
pub fn get_ffprobe(env: Option<String>) -> Option<PathBuf> {
    env.map(PathBuf::from)
}
