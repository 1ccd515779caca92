use tracing::warn;

use kvsim_core::Simulator;

use crate::directive::{parse_line, Directive, LineOutcome};

/// Runs a whole transcript and returns the report as one line per entry.
/// Joining with `"\n"` (plus a trailing newline) reproduces the exact text
/// the CLI writes to stdout.
pub fn run(input: &str) -> Vec<String> {
    let mut out = Vec::new();
    for (id, lines) in segment(input) {
        if let Some(id) = id {
            out.push(String::new());
            out.push(format!("============== TEST {id} ==============="));
            out.push(String::new());
        }
        out.extend(run_segment(&lines));
    }
    out
}

/// Runs one segment against a fresh `Simulator`, appending an implicit
/// `dump()` if the segment never issued an explicit dump directive.
fn run_segment(lines: &[String]) -> Vec<String> {
    let mut sim = Simulator::new();
    let mut out = Vec::new();
    let mut saw_dump = false;
    for raw in lines {
        match parse_line(raw) {
            LineOutcome::Blank => {}
            LineOutcome::Unparseable(text) => {
                warn!(target: "kvsim", line = %text, "could not parse directive");
                out.push(format!("Warning: Could not parse line: {text}"));
            }
            LineOutcome::Directive(d) => match d {
                Directive::Begin(t) => out.extend(sim.begin(&t)),
                Directive::End(t) => out.extend(sim.end(&t)),
                Directive::Read(t, i) => out.extend(sim.read(&t, i)),
                Directive::Write(t, i, v) => out.extend(sim.write(&t, i, v)),
                Directive::Fail(s) => out.extend(sim.fail(s)),
                Directive::Recover(s) => out.extend(sim.recover(s)),
                Directive::DumpAll => {
                    out.extend(sim.dump());
                    saw_dump = true;
                }
                Directive::DumpVar(i) => {
                    out.extend(sim.dump_variable(i));
                    saw_dump = true;
                }
                Directive::DumpSite(s) => {
                    out.extend(sim.dump_site(s));
                    saw_dump = true;
                }
                Directive::Reset => sim.reset(),
            },
        }
    }
    if !saw_dump {
        out.extend(sim.dump());
    }
    out
}

/// Splits a transcript into independent `// Test <id>` segments. Content
/// before the first marker (or the whole input, if there is no marker)
/// forms a leading segment with no id and no printed header.
fn segment(input: &str) -> Vec<(Option<String>, Vec<String>)> {
    let mut out = Vec::new();
    let mut current_id: Option<String> = None;
    let mut current_lines: Vec<String> = Vec::new();
    let mut any_marker = false;
    for raw in input.lines() {
        if let Some(id) = match_test_marker(raw) {
            if any_marker || !current_lines.is_empty() {
                out.push((current_id.take(), std::mem::take(&mut current_lines)));
            }
            current_id = Some(id);
            any_marker = true;
        } else {
            current_lines.push(raw.to_string());
        }
    }
    out.push((current_id, current_lines));
    out
}

fn match_test_marker(raw: &str) -> Option<String> {
    let id = raw.trim().strip_prefix("// Test")?.trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}
