//! Event-handler agent discovery.
//!
//! A handler for event `<name>` is the agent definition
//! `<project_root>/.claude/agents/event-handlers/<name>-handler.md`.

use std::path::{Path, PathBuf};

pub const HANDLERS_DIR: &str = ".claude/agents/event-handlers";

#[derive(Debug, Clone)]
pub struct HandlerRegistry {
    handlers_dir: PathBuf,
}

impl HandlerRegistry {
    pub fn new(project_root: &Path) -> Self {
        Self {
            handlers_dir: project_root.join(HANDLERS_DIR),
        }
    }

    /// Handler name for an event name.
    pub fn handler_name(event_name: &str) -> String {
        format!("{}-handler", event_name)
    }

    pub fn handlers_dir(&self) -> &Path {
        &self.handlers_dir
    }

    pub fn handler_path(&self, handler_name: &str) -> PathBuf {
        self.handlers_dir.join(format!("{}.md", handler_name))
    }

    /// Names containing path separators or starting with a dot never match.
    pub fn exists(&self, handler_name: &str) -> bool {
        if handler_name.is_empty()
            || handler_name.starts_with('.')
            || handler_name.contains(['/', '\\'])
        {
            return false;
        }
        self.handler_path(handler_name).is_file()
    }

    /// Sorted names of all handler definitions; empty when the directory is
    /// missing or unreadable.
    pub fn discover(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.handlers_dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "md"))
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
#[path = "tests/handlers_tests.rs"]
mod tests;
