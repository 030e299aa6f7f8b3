// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wrapper script templating

use crate::protocol::ProtocolTimings;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

// Regex pattern for {variable_name} - this is a constant valid pattern
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*)\}").expect("constant regex pattern is valid")
});

/// Interpolate `{name}` placeholders with values from the vars map.
///
/// Unknown template variables are left as-is, which keeps shell constructs
/// like `${f#prefix}` untouched.
pub fn interpolate(template: &str, vars: &HashMap<String, String>) -> String {
    VAR_PATTERN
        .replace_all(template, |caps: &regex::Captures| {
            let name = &caps[1];
            vars.get(name)
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .to_string()
}

/// Render a template file with the given bindings
pub fn render_command_template(
    path: &Path,
    vars: &HashMap<String, String>,
) -> std::io::Result<String> {
    let template = std::fs::read_to_string(path)?;
    Ok(interpolate(&template, vars))
}

/// Default wrapper body for process-style backends.
///
/// The wrapper owns one protocol directory: it executes dispatched
/// `pool_cmd.<id>.sh` scripts, reports exit codes as `<id>.pool.exit`, honors
/// the `stop` file, and self-terminates once the controller's heartbeat has
/// been absent for `heartbeat_tolerance` consecutive checks.
pub const WRAPPER_TEMPLATE: &str = r##"#!/bin/bash
# Pool wrapper for {pool_name}. Runs dispatched command scripts until told
# to stop or until the controller's heartbeat goes quiet.
{debug_trace}
cd "{tmp_dir}" || exit 1

tick=0
missed=0
while true; do
    if [ -e stop ]; then
        exit 0
    fi

    for f in pool_cmd.*.sh; do
        [ -e "$f" ] || continue
        id="${f#pool_cmd.}"
        id="${id%.sh}"
        bash "$f" >> cmd.out 2>> cmd.err
        echo $? > "$id.pool.exit"
        rm -f "$f"
    done

    tick=$((tick + 1))
    if [ "$tick" -ge {heartbeat_check_ticks} ]; then
        tick=0
        if [ -e heartbeat ]; then
            rm -f heartbeat
            missed=0
        else
            missed=$((missed + 1))
            if [ "$missed" -ge {heartbeat_tolerance} ]; then
                exit 1
            fi
        fi
    fi

    sleep {poll_secs}
done
"##;

/// Render the default wrapper script for one wrapper directory
pub fn render_wrapper_script(
    pool_name: &str,
    tmp_dir: &Path,
    timings: &ProtocolTimings,
    debug: bool,
) -> String {
    let mut vars = HashMap::new();
    vars.insert("pool_name".to_string(), pool_name.to_string());
    vars.insert("tmp_dir".to_string(), tmp_dir.display().to_string());
    vars.insert(
        "poll_secs".to_string(),
        format!("{}", timings.wrapper_poll.as_secs_f64()),
    );
    vars.insert(
        "heartbeat_check_ticks".to_string(),
        timings.heartbeat_check_ticks().to_string(),
    );
    vars.insert(
        "heartbeat_tolerance".to_string(),
        timings.heartbeat_tolerance.to_string(),
    );
    vars.insert(
        "debug_trace".to_string(),
        if debug { "set -x" } else { "" }.to_string(),
    );
    interpolate(WRAPPER_TEMPLATE, &vars)
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
