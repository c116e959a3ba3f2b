//! Hygiene: coding standards for the engine's library sources.
//!
//! Every rule is a substring with a budget. Sibling `*_test.rs` files are
//! exempt, and so are comment lines. The CLI binary is exempt from the
//! console-output rule only, since printing is its job. Budgets only ratchet
//! down.
#![allow(clippy::absurd_extreme_comparisons)]

use std::fs;
use std::path::{Path, PathBuf};

struct Rule {
    pattern: &'static str,
    budget: usize,
    hint: &'static str,
    /// File names the rule does not apply to.
    exempt: &'static [&'static str],
}

// Panics: library code propagates errors through `Result`.
const PANICS: &[Rule] = &[
    Rule { pattern: ".unwrap()", budget: 0, hint: "propagate with `?` or recover", exempt: &[] },
    Rule { pattern: ".expect(", budget: 0, hint: "propagate with `?` or recover", exempt: &[] },
    Rule { pattern: "panic!(", budget: 0, hint: "return an error enum variant", exempt: &[] },
    Rule { pattern: "unreachable!(", budget: 0, hint: "make the state unrepresentable", exempt: &[] },
    Rule { pattern: "todo!(", budget: 0, hint: "finish the stub", exempt: &[] },
    Rule { pattern: "unimplemented!(", budget: 0, hint: "finish the stub", exempt: &[] },
];

// Silent loss: an error or warning must reach a result, a log or a caller.
const SILENT_LOSS: &[Rule] = &[
    Rule { pattern: "let _ =", budget: 0, hint: "inspect the value or log it", exempt: &[] },
    Rule { pattern: ".ok()", budget: 0, hint: "report the error instead of dropping it", exempt: &[] },
];

// Output: diagnostics go through `tracing` or into import/export results.
const OUTPUT: &[Rule] = &[
    Rule { pattern: "println!(", budget: 0, hint: "use tracing or return the text", exempt: &["main.rs"] },
    Rule { pattern: "eprintln!(", budget: 0, hint: "use tracing or push a warning", exempt: &["main.rs"] },
    Rule { pattern: "dbg!(", budget: 0, hint: "remove debugging output", exempt: &[] },
];

// Allowances: geometry compares with a tolerance, and dead code gets deleted.
const ALLOWANCES: &[Rule] = &[
    Rule { pattern: "#[allow(dead_code)]", budget: 0, hint: "delete the unused item", exempt: &[] },
    Rule { pattern: "clippy::float_cmp", budget: 0, hint: "compare with a tolerance", exempt: &[] },
];

/// Library sources under `src/`, excluding sibling test files.
fn source_files() -> Vec<(PathBuf, String)> {
    let mut files = Vec::new();
    collect(Path::new("src"), &mut files);
    files
}

fn collect(dir: &Path, out: &mut Vec<(PathBuf, String)>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for path in entries.flatten().map(|e| e.path()) {
        if path.is_dir() {
            collect(&path, out);
        } else if path.extension().is_some_and(|e| e == "rs")
            && !path.to_string_lossy().ends_with("_test.rs")
        {
            if let Ok(content) = fs::read_to_string(&path) {
                out.push((path, content));
            }
        }
    }
}

/// Code lines of `content` containing `pattern`.
fn hits(content: &str, pattern: &str) -> usize {
    content
        .lines()
        .map(str::trim_start)
        .filter(|line| !line.starts_with("//"))
        .filter(|line| line.contains(pattern))
        .count()
}

fn check(rules: &[Rule]) {
    let files = source_files();
    assert!(!files.is_empty(), "no sources found; run from the crate root");

    let mut failures = Vec::new();
    for rule in rules {
        let offenders: Vec<(String, usize)> = files
            .iter()
            .filter(|(path, _)| {
                let name = path.file_name().unwrap_or_default().to_string_lossy();
                !rule.exempt.contains(&name.as_ref())
            })
            .map(|(path, content)| (path.display().to_string(), hits(content, rule.pattern)))
            .filter(|(_, count)| *count > 0)
            .collect();
        let count: usize = offenders.iter().map(|(_, c)| c).sum();
        if count > rule.budget {
            let listing: Vec<String> = offenders.iter().map(|(p, c)| format!("    {p}: {c}")).collect();
            failures.push(format!(
                "`{}`: found {count}, budget {} ({})\n{}",
                rule.pattern,
                rule.budget,
                rule.hint,
                listing.join("\n")
            ));
        }
    }
    assert!(failures.is_empty(), "hygiene budget exceeded:\n{}", failures.join("\n"));
}

#[test]
fn no_panics_in_library_code() {
    check(PANICS);
}

#[test]
fn no_silently_dropped_errors() {
    check(SILENT_LOSS);
}

#[test]
fn no_console_output_outside_the_cli() {
    check(OUTPUT);
}

#[test]
fn no_lint_allowances() {
    check(ALLOWANCES);
}
