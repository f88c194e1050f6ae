// src/credentials.rs

//! Credential resolution for phase processes.
//!
//! Each target environment has one secret variable. Its name is derived from
//! the environment name with any ordering prefix removed, so `01-TEST` and
//! `TEST` share a slot. The child environment is our own ambient
//! environment, with that variable overridden only when the operator
//! supplied a non-empty secret for this invocation.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::config::CredentialsSection;
use crate::types::Secret;

static ORDERING_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[-_. ]+").expect("static regex"));

/// Strip a leading ordering prefix (`"03-ACCEPT"` -> `"ACCEPT"`).
///
/// A name that is *only* a prefix is returned unchanged.
pub fn normalize_environment(environment: &str) -> &str {
    match ORDERING_PREFIX.find(environment) {
        Some(m) if m.end() < environment.len() => &environment[m.end()..],
        _ => environment,
    }
}

/// Name of the variable holding the secret for `environment`.
pub fn secret_variable_name(environment: &str, cfg: &CredentialsSection) -> String {
    let slot: String = normalize_environment(environment)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}{}{}", cfg.prefix, slot, cfg.suffix)
}

/// Build the process environment for a phase.
pub fn resolve_environment<I>(
    environment: &str,
    secret: Option<&Secret>,
    ambient: I,
    cfg: &CredentialsSection,
) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: HashMap<String, String> = ambient.into_iter().collect();
    let var = secret_variable_name(environment, cfg);

    match secret {
        Some(secret) if !secret.is_empty() => {
            debug!(environment, variable = %var, "using operator-supplied secret");
            env.insert(var, secret.expose().to_string());
        }
        _ => {
            debug!(
                environment,
                variable = %var,
                present = env.contains_key(&var),
                "no secret supplied; keeping ambient value"
            );
        }
    }

    env
}

/// [`resolve_environment`] against this process's own environment.
pub fn resolve_from_process(
    environment: &str,
    secret: Option<&Secret>,
    cfg: &CredentialsSection,
) -> HashMap<String, String> {
    resolve_environment(environment, secret, std::env::vars(), cfg)
}
