use kvsim_core::{SiteId, VarId, Value};

/// One parsed line of a transcript. Every directive in the grammar maps to
/// exactly one variant; the driver turns each into a single `Simulator`
/// call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Directive {
    Begin(String),
    End(String),
    Read(String, VarId),
    Write(String, VarId, Value),
    Fail(SiteId),
    Recover(SiteId),
    DumpAll,
    DumpVar(VarId),
    DumpSite(SiteId),
    Reset,
}

/// Result of feeding one raw transcript line through the parser.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LineOutcome {
    /// Blank after `//` comment stripping; nothing to do.
    Blank,
    Directive(Directive),
    /// The line, after comment stripping and trimming, matched nothing in
    /// the grammar. Carries the stripped text so the driver can report the
    /// warning against what was actually looked at, not the raw line.
    Unparseable(String),
}

/// Parses one line: strips a trailing `//` comment, trims, then matches it
/// against the directive grammar. `//` anywhere (including as the entire
/// line) introduces a comment; callers that need to recognize `// Test
/// <id>` segment markers must check the raw line before calling this, since
/// here a whole-line comment is indistinguishable from any other.
pub fn parse_line(raw: &str) -> LineOutcome {
    let without_comment = match raw.find("//") {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    let line = without_comment.trim();
    if line.is_empty() {
        return LineOutcome::Blank;
    }
    match parse_directive(line) {
        Some(d) => LineOutcome::Directive(d),
        None => LineOutcome::Unparseable(line.to_string()),
    }
}

fn parse_directive(line: &str) -> Option<Directive> {
    let open = line.find('(')?;
    if !line.ends_with(')') {
        return None;
    }
    let name = line[..open].trim();
    let args_str = &line[open + 1..line.len() - 1];
    let args: Vec<&str> = if args_str.trim().is_empty() {
        Vec::new()
    } else {
        args_str.split(',').map(str::trim).collect()
    };

    match name {
        "begin" => match args.as_slice() {
            [t] if !t.is_empty() => Some(Directive::Begin((*t).to_string())),
            _ => None,
        },
        "end" => match args.as_slice() {
            [t] if !t.is_empty() => Some(Directive::End((*t).to_string())),
            _ => None,
        },
        "R" => match args.as_slice() {
            [t, var] if !t.is_empty() => parse_var(var).map(|i| Directive::Read((*t).to_string(), i)),
            _ => None,
        },
        "W" => match args.as_slice() {
            [t, var, value] if !t.is_empty() => {
                let i = parse_var(var)?;
                let v: Value = value.parse().ok()?;
                Some(Directive::Write((*t).to_string(), i, v))
            }
            _ => None,
        },
        "fail" => match args.as_slice() {
            [s] => s.parse::<SiteId>().ok().map(Directive::Fail),
            _ => None,
        },
        "recover" => match args.as_slice() {
            [s] => s.parse::<SiteId>().ok().map(Directive::Recover),
            _ => None,
        },
        "dump" => match args.as_slice() {
            [] => Some(Directive::DumpAll),
            [arg] => {
                if let Some(i) = parse_var(arg) {
                    Some(Directive::DumpVar(i))
                } else {
                    arg.parse::<SiteId>().ok().map(Directive::DumpSite)
                }
            }
            _ => None,
        },
        "reset" => match args.as_slice() {
            [] => Some(Directive::Reset),
            _ => None,
        },
        _ => None,
    }
}

/// Parses an `xN` variable reference.
fn parse_var(s: &str) -> Option<VarId> {
    s.strip_prefix('x')?.parse().ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_every_directive_shape() {
        assert_eq!(
            parse_line("begin(T1)"),
            LineOutcome::Directive(Directive::Begin("T1".to_string()))
        );
        assert_eq!(
            parse_line("end(T1)"),
            LineOutcome::Directive(Directive::End("T1".to_string()))
        );
        assert_eq!(
            parse_line("R(T1, x2)"),
            LineOutcome::Directive(Directive::Read("T1".to_string(), 2))
        );
        assert_eq!(
            parse_line("W(T1,x2,-5)"),
            LineOutcome::Directive(Directive::Write("T1".to_string(), 2, -5))
        );
        assert_eq!(parse_line("fail(3)"), LineOutcome::Directive(Directive::Fail(3)));
        assert_eq!(
            parse_line("recover(3)"),
            LineOutcome::Directive(Directive::Recover(3))
        );
        assert_eq!(parse_line("dump()"), LineOutcome::Directive(Directive::DumpAll));
        assert_eq!(parse_line("dump(x4)"), LineOutcome::Directive(Directive::DumpVar(4)));
        assert_eq!(parse_line("dump(7)"), LineOutcome::Directive(Directive::DumpSite(7)));
        assert_eq!(parse_line("reset()"), LineOutcome::Directive(Directive::Reset));
    }

    #[test]
    fn strips_trailing_comments_and_tolerates_whitespace() {
        assert_eq!(
            parse_line("  begin(T1)   // starts T1"),
            LineOutcome::Directive(Directive::Begin("T1".to_string()))
        );
        assert_eq!(parse_line("   // just a comment"), LineOutcome::Blank);
        assert_eq!(parse_line("   "), LineOutcome::Blank);
    }

    #[test]
    fn unparseable_lines_are_reported_verbatim_after_stripping() {
        assert_eq!(
            parse_line("begin(T1"),
            LineOutcome::Unparseable("begin(T1".to_string())
        );
        assert_eq!(
            parse_line("frobnicate(T1)"),
            LineOutcome::Unparseable("frobnicate(T1)".to_string())
        );
        assert_eq!(parse_line("W(T1,x2)"), LineOutcome::Unparseable("W(T1,x2)".to_string()));
    }
}
