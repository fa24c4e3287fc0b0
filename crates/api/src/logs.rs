use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde_json::{Value, json};
use tracing::debug;

use patchbay_config::ConfigHandle;
use patchbay_registry::Command;
use patchbay_types::{Args, CommandOutcome};

/// Name of the daemon log file inside the configured log directory.
pub const LOG_FILENAME: &str = "patchbay.log";

/// One line of the daemon log: `time - LEVEL :: thread : message`.
static LOG_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}) - (\w+) :: (.*?) : (.*)$")
        .expect("log line regex should compile")
});

const GET_LOGS_DOC: &str = r#"Get the Patchbay logs.

```
Required parameters:
    None

Optional parameters:
    sort (str):         "time", "thread", "msg", "loglevel"
    search (str):       A string to search for
    order (str):        "desc" or "asc"
    regex (str):        A regex string to search for
    start (int):        Row number to start from
    end (int):          Row number to end at

Returns:
    json:
        [{"loglevel": "DEBUG",
          "msg": "Ready to serve requests",
          "thread": "main",
          "time": "2016-05-08 09:36:51"
          },
         {...},
         {...}
         ]
```"#;

pub(crate) fn command(config: Arc<ConfigHandle>) -> Command {
    Command::new("get_logs", move |args| get_logs(&config, args))
        .with_doc(GET_LOGS_DOC)
        .with_params(&["sort", "search", "order", "regex", "start", "end"])
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct LogEntry {
    time: String,
    loglevel: String,
    thread: String,
    msg: String,
}

impl LogEntry {
    fn to_value(&self) -> Value {
        json!({
            "time": self.time,
            "loglevel": self.loglevel,
            "thread": self.thread,
            "msg": self.msg,
        })
    }

    fn matches(&self, needle: &str) -> bool {
        [&self.time, &self.loglevel, &self.thread, &self.msg]
            .iter()
            .any(|value| value.to_lowercase().contains(needle))
    }

    /// Concatenated key/value text the `regex` filter runs against.
    fn haystack(&self) -> String {
        format!(
            "time{} loglevel{} thread{} msg{}",
            self.time, self.loglevel, self.thread, self.msg
        )
    }
}

fn get_logs(config: &ConfigHandle, args: &Args) -> Result<CommandOutcome> {
    let log_dir = config.log_dir();
    let logfile = Path::new(&log_dir).join(LOG_FILENAME);
    let text = fs::read_to_string(&logfile)
        .with_context(|| format!("reading log file {}", logfile.display()))?;
    let mut entries = parse_log(&text);

    let start = args.usize_arg("start").unwrap_or(0);
    let end = args.usize_arg("end").unwrap_or(0);
    if start > 0 || end > 0 {
        debug!(start, end, "slicing the log");
        entries = slice_rows(entries, start, end);
    }

    if let Some(field) = args.str_arg("sort").filter(|field| !field.is_empty()) {
        debug!(field = %field, "sorting the log");
        sort_entries(&mut entries, &field)?;
    }

    if let Some(search) = args.str_arg("search").filter(|search| !search.is_empty()) {
        debug!(search = %search, "searching log values");
        let needle = search.to_lowercase();
        let matched: Vec<LogEntry> =
            entries.iter().filter(|entry| entry.matches(&needle)).cloned().collect();
        if !matched.is_empty() {
            entries = matched;
        }
    }

    if let Some(pattern) = args.str_arg("regex").filter(|pattern| !pattern.is_empty()) {
        debug!(pattern = %pattern, "filtering log using regex");
        let filter = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("compiling log filter regex {pattern:?}"))?;
        let matched: Vec<LogEntry> = entries
            .iter()
            .filter(|entry| filter.is_match(&entry.haystack()))
            .cloned()
            .collect();
        if !matched.is_empty() {
            entries = matched;
        }
    }

    if args.str_arg("order").as_deref().unwrap_or("desc") == "desc" {
        entries.reverse();
    }

    let rows: Vec<Value> = entries.iter().map(LogEntry::to_value).collect();
    Ok(CommandOutcome::data(Value::Array(rows)))
}

/// Parse the log text into entries. Lines that do not match the format are
/// traceback continuations and get appended to the previous entry's message.
fn parse_log(text: &str) -> Vec<LogEntry> {
    let mut entries: Vec<LogEntry> = Vec::new();
    for line in text.lines() {
        match LOG_LINE.captures(line) {
            Some(caps) => entries.push(LogEntry {
                time: caps[1].to_string(),
                loglevel: caps[2].to_string(),
                thread: caps[3].to_string(),
                msg: caps[4].to_string(),
            }),
            None => {
                if let Some(previous) = entries.last_mut() {
                    previous.msg.push('\n');
                    previous.msg.push_str(line);
                }
            }
        }
    }
    entries
}

/// Row slice with clamped bounds; an inverted range yields nothing.
fn slice_rows(entries: Vec<LogEntry>, start: usize, end: usize) -> Vec<LogEntry> {
    let lo = start.min(entries.len());
    let hi = end.min(entries.len());
    if lo < hi { entries[lo..hi].to_vec() } else { Vec::new() }
}

fn sort_entries(entries: &mut [LogEntry], field: &str) -> Result<()> {
    match field {
        "time" => entries.sort_by(|a, b| a.time.cmp(&b.time)),
        "loglevel" => entries.sort_by(|a, b| a.loglevel.cmp(&b.loglevel)),
        "thread" => entries.sort_by(|a, b| a.thread.cmp(&b.thread)),
        "msg" => entries.sort_by(|a, b| a.msg.cmp(&b.msg)),
        other => bail!("unknown sort field: {other}"),
    }
    Ok(())
}
