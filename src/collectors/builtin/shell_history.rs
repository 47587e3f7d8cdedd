use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::collectors::builtin::rfc3339_from_epoch;
use crate::collectors::module::{Module, ModuleParams, RunSummary};
use crate::utils::data_writer::DataWriter;

const NAME: &str = "shell_history";

lazy_static! {
    /// `#1700000000` line written by bash when HISTTIMEFORMAT is set.
    static ref BASH_TIMESTAMP: Regex = Regex::new(r"^#(\d{9,11})\s*$").unwrap();
    /// `: <start>:<duration>;<command>` zsh EXTENDED_HISTORY line.
    static ref ZSH_EXTENDED: Regex = Regex::new(r"^: *(\d+):(\d+);(.*)$").unwrap();
}

/// One command recovered from a history file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// 1-based line of the command in the file.
    pub line: usize,
    pub command: String,
    pub timestamp: Option<i64>,
    pub duration_secs: Option<u64>,
}

pub fn parse_bash_history(content: &str) -> Vec<HistoryEntry> {
    let mut entries = Vec::new();
    let mut pending_timestamp = None;

    for (index, line) in content.lines().enumerate() {
        if let Some(caps) = BASH_TIMESTAMP.captures(line) {
            pending_timestamp = caps[1].parse().ok();
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        entries.push(HistoryEntry {
            line: index + 1,
            command: line.to_string(),
            timestamp: pending_timestamp.take(),
            duration_secs: None,
        });
    }
    entries
}

/// Parse zsh history, joining `\`-continued multi-line commands.
pub fn parse_zsh_history(content: &str) -> Vec<HistoryEntry> {
    let mut entries: Vec<HistoryEntry> = Vec::new();
    let mut continuing = false;

    for (index, line) in content.lines().enumerate() {
        if continuing {
            if let Some(last) = entries.last_mut() {
                last.command.push('\n');
                last.command.push_str(line.trim_end_matches('\\'));
            }
            continuing = line.ends_with('\\');
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        let entry = match ZSH_EXTENDED.captures(line) {
            Some(caps) => HistoryEntry {
                line: index + 1,
                command: caps[3].trim_end_matches('\\').to_string(),
                timestamp: caps[1].parse().ok(),
                duration_secs: caps[2].parse().ok(),
            },
            None => HistoryEntry {
                line: index + 1,
                command: line.trim_end_matches('\\').to_string(),
                timestamp: None,
                duration_secs: None,
            },
        };
        continuing = line.ends_with('\\');
        entries.push(entry);
    }
    entries
}

struct Shell {
    label: &'static str,
    file_name: &'static str,
    parse: fn(&str) -> Vec<HistoryEntry>,
}

const SHELLS: &[Shell] = &[
    Shell {
        label: "bash",
        file_name: ".bash_history",
        parse: parse_bash_history,
    },
    Shell {
        label: "zsh",
        file_name: ".zsh_history",
        parse: parse_zsh_history,
    },
];

/// Bash and zsh command history of every local account.
pub struct ShellHistoryModule;

impl ShellHistoryModule {
    pub fn new() -> Self {
        Self
    }

    /// `(user, home)` pairs: `root`, `home/*` and `Users/*` under the input dir.
    fn home_directories(params: &ModuleParams) -> Vec<(String, PathBuf)> {
        let mut homes = vec![("root".to_string(), params.input_path("/root"))];
        for base in ["/home", "/Users"] {
            let Ok(entries) = fs::read_dir(params.input_path(base)) else {
                continue;
            };
            let mut users: Vec<_> = entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .map(|e| (e.file_name().to_string_lossy().to_string(), e.path()))
                .collect();
            users.sort();
            homes.extend(users);
        }
        homes
    }

    fn collect_file(
        params: &ModuleParams,
        shell: &Shell,
        user: &str,
        path: &Path,
        writer: &mut DataWriter,
        summary: &mut RunSummary,
    ) {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                summary.warn(NAME, format!("cannot read {}: {}", path.display(), e));
                return;
            }
        };
        let content = String::from_utf8_lossy(&bytes);
        let entries = (shell.parse)(&content);
        debug!("[{}] {} entries in {}", NAME, entries.len(), path.display());

        let source = path.to_string_lossy().to_string();
        for entry in entries {
            let event_time = entry
                .timestamp
                .and_then(rfc3339_from_epoch)
                .unwrap_or_default();
            let record = params
                .record(event_time, source.clone())
                .with("user", user)
                .with("shell", shell.label)
                .with("line", entry.line)
                .with("command", entry.command)
                .with("duration_secs", entry.duration_secs);
            summary.write(NAME, writer, &record);
        }
    }
}

impl Default for ShellHistoryModule {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for ShellHistoryModule {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Bash and zsh command history of every local account"
    }

    fn run(&self, params: &ModuleParams) -> Result<RunSummary> {
        let mut summary = RunSummary::new();
        let homes = Self::home_directories(params);

        for shell in SHELLS {
            let mut writer = params
                .create_writer(NAME, Some(shell.label))
                .with_context(|| format!("Failed to open {} history output", shell.label))?;

            for (user, home) in &homes {
                let path = home.join(shell.file_name);
                if path.is_file() {
                    Self::collect_file(params, shell, user, &path, &mut writer, &mut summary);
                }
            }

            summary.finish_writer(writer)?;
        }

        Ok(summary)
    }
}
