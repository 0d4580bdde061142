//! Best-effort loading of SQL schema scripts.
//!
//! Scripts are split into statements with a line-based heuristic: `--` comments are
//! stripped, blank lines skipped, and single-quote parity is tracked across lines so
//! that a semicolon inside a string literal does not end a statement. The heuristic
//! does not understand escaped quotes or quoted comment markers; schema scripts are
//! expected to be plain.
//!
//! Execution is best effort. Dropping an object that does not exist is routine when
//! re-running a script, so that failure is only logged at debug; any other failure
//! is logged at warn and loading continues with the next statement, which can leave
//! a schema partially applied.

use rusqlite::Connection;
use tracing::{debug, warn};

/// Splits a script into executable statements.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut buf = String::new();
    let mut in_quote = false;
    for line in script.lines() {
        let input = match line.find("--") {
            Some(i) => &line[..i],
            None => line,
        };
        if input.trim().is_empty() {
            continue;
        }
        buf.push_str(input);
        buf.push(' ');
        for _ in input.matches('\'') {
            in_quote = !in_quote;
        }
        if in_quote {
            continue;
        }
        // A statement ends at a semicolon past the last quote on the line.
        let tail = match input.rfind('\'') {
            Some(i) => &input[i + 1..],
            None => input,
        };
        if tail.contains(';') {
            statements.push(String::from(buf.trim()));
            buf.clear();
        }
    }
    statements
}

fn is_benign(sql: &str, message: &str) -> bool {
    // Re-running a script drops objects before creating them, so a missing
    // object on DROP is expected noise.
    sql.to_uppercase().starts_with("DROP")
        && (message.contains("no such") || message.contains("does not exist"))
}

/// Runs every statement in the script against the connection, returning how
/// many executed successfully.
pub fn load_sql(conn: &Connection, script: &str) -> usize {
    let mut applied = 0;
    for sql in split_statements(script) {
        debug!(sql = sql.as_str(), "running script statement");
        match conn.execute_batch(&sql) {
            Ok(()) => applied += 1,
            Err(e) => {
                let message = e.to_string();
                if is_benign(&sql, &message) {
                    debug!(sql = sql.as_str(), message = message.as_str(), "ignoring benign script failure");
                } else {
                    warn!(sql = sql.as_str(), message = message.as_str(), "script statement failed");
                }
            }
        }
    }
    applied
}
