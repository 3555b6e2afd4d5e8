//! Post-processing hook.
//!
//! After a recording finalizes, the configured command line is tokenized
//! shell-style, `%`-substituted with recording facts and spawned with
//! inherited stdio. Nobody waits for it; reaping is the process runtime's
//! business.

use std::collections::HashMap;
use std::process::Command;
use std::sync::Arc;

use super::DvrEntry;

/// Tokenizes a command string, honoring single/double quotes and
/// backslash escapes.
pub fn split_args(s: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut cur = String::new();
    let mut in_arg = false;
    let mut quote: Option<char> = None;
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else if c == '\\' {
                    if let Some(n) = chars.next() {
                        cur.push(n);
                    }
                } else {
                    cur.push(c);
                }
            }
            None => {
                if c.is_whitespace() {
                    if in_arg {
                        args.push(std::mem::take(&mut cur));
                        in_arg = false;
                    }
                } else if c == '\'' || c == '"' {
                    quote = Some(c);
                    in_arg = true;
                } else if c == '\\' {
                    in_arg = true;
                    if let Some(n) = chars.next() {
                        cur.push(n);
                    }
                } else {
                    in_arg = true;
                    cur.push(c);
                }
            }
        }
    }
    if in_arg {
        args.push(cur);
    }
    args
}

/// Substitutes `%key` tokens from the map; unknown keys stay verbatim.
pub fn format_arg(arg: &str, map: &HashMap<char, String>) -> String {
    let mut out = String::with_capacity(arg.len());
    let mut chars = arg.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(k) => match map.get(&k) {
                Some(v) => out.push_str(v),
                None => {
                    out.push('%');
                    out.push(k);
                }
            },
            None => out.push('%'),
        }
    }
    out
}

/// Builds the substitution map for an entry.
fn substitution_map(entry: &DvrEntry) -> HashMap<char, String> {
    let filename = entry
        .filename()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let basename = entry
        .filename()
        .and_then(|p| p.file_name().map(|f| f.to_string_lossy().into_owned()))
        .unwrap_or_default();
    let error = entry.state.lock().last_error.label().to_owned();

    let mut map = HashMap::new();
    map.insert('f', filename); // full path to recording
    map.insert('b', basename); // basename of recording
    map.insert('c', entry.channel().name().to_owned()); // channel name
    map.insert('C', entry.creator().to_owned()); // user who created this recording
    map.insert('t', entry.title().to_owned()); // program title
    map.insert('d', entry.description().unwrap_or("").to_owned()); // program description
    map.insert('e', error); // error message
    map.insert('S', entry.start_time().to_string()); // start time, unix epoch
    map.insert('E', entry.stop_time().to_string()); // stop time, unix epoch
    map
}

/// Tokenizes, substitutes and spawns the post-processor without waiting.
pub fn spawn(entry: &Arc<DvrEntry>, cmdline: &str) {
    let raw = split_args(cmdline);
    if raw.is_empty() {
        return;
    }
    let map = substitution_map(entry);
    let args: Vec<String> = raw.iter().map(|a| format_arg(a, &map)).collect();

    match Command::new(&args[0]).args(&args[1..]).spawn() {
        Ok(child) => {
            log::debug!(
                target: "dvr",
                "postprocessor \"{}\" spawned, pid {}",
                args[0],
                child.id()
            );
        }
        Err(e) => {
            log::error!(
                target: "dvr",
                "unable to spawn postprocessor \"{}\": {}",
                args[0],
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn splits_on_whitespace_with_quotes_and_escapes() {
        assert_eq!(split_args("a b  c"), vec!["a", "b", "c"]);
        assert_eq!(split_args("a 'b c' d"), vec!["a", "b c", "d"]);
        assert_eq!(split_args(r#"a "b 'x' c""#), vec!["a", "b 'x' c"]);
        assert_eq!(split_args(r"a\ b c"), vec!["a b", "c"]);
        assert_eq!(split_args(r#"'it\'s'"#), vec!["it's"]);
        assert_eq!(split_args("   "), Vec::<String>::new());
    }

    #[test]
    fn substitutes_known_keys_and_keeps_unknown() {
        let mut map = HashMap::new();
        map.insert('f', "/rec/a.ts".to_owned());
        map.insert('t', "Show".to_owned());
        assert_eq!(format_arg("%f", &map), "/rec/a.ts");
        assert_eq!(format_arg("pre-%t-post", &map), "pre-Show-post");
        assert_eq!(format_arg("%x", &map), "%x");
        assert_eq!(format_arg("100%", &map), "100%");
    }

    #[test]
    fn entry_map_carries_recording_facts() {
        let ctx = crate::context::PvrContext::new();
        let ch = ctx.create_channel("News");
        let cfg = Arc::new(crate::config::DvrConfig::default());
        let entry = DvrEntry::builder(&ch, "Bulletin", cfg)
            .creator("alice")
            .description("late news")
            .window(100, 200)
            .build();
        let map = substitution_map(&entry);
        assert_eq!(map[&'c'], "News");
        assert_eq!(map[&'t'], "Bulletin");
        assert_eq!(map[&'C'], "alice");
        assert_eq!(map[&'d'], "late news");
        assert_eq!(map[&'S'], "100");
        assert_eq!(map[&'E'], "200");
        assert_eq!(map[&'e'], "OK");
        ctx.shutdown();
    }
}
