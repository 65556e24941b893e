//! Route table registry (`/etc/iproute2/rt_tables`) editing.

use std::fmt;
use std::path::{Path, PathBuf};

use hostnet_common::{HostnetError, HostnetResult};
use serde::Serialize;
use tracing::Span;

use crate::backup::{FileOps, LocalFs, commit_with_backup};
use crate::context::HostContext;

/// Table numbers handed out by [`RouteTableRegistry::add_table`] are below this.
pub const TABLE_NUMBER_LIMIT: u32 = 255;

/// One `<number> <name>` line of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteTableEntry {
    /// Table number.
    pub number: u32,
    /// Table name; empty if the line carries only a number.
    pub name: String,
}

impl fmt::Display for RouteTableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.number, self.name)
    }
}

/// Parse the registry into entries, skipping blank and `#` lines.
///
/// # Errors
///
/// Returns [`HostnetError::Parse`] if an entry does not start with a number.
pub fn parse_registry(text: &str) -> HostnetResult<Vec<RouteTableEntry>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let mut words = line.split_whitespace();
            let number = words.next().unwrap_or_default();
            let number = number.parse().map_err(|_| {
                HostnetError::parse(
                    "route table registry",
                    format!("bad table number in {line:?}"),
                )
            })?;
            Ok(RouteTableEntry {
                number,
                name: words.next().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// Smallest table number below [`TABLE_NUMBER_LIMIT`] not used by `entries`.
#[must_use]
pub fn first_free_number(entries: &[RouteTableEntry]) -> Option<u32> {
    (0..TABLE_NUMBER_LIMIT).find(|n| !entries.iter().any(|e| e.number == *n))
}

/// Editor for the route table registry.
///
/// Every edit goes through a backup copy: the live file is either fully
/// rewritten or left with its original content. Concurrent writers are not
/// detected.
pub struct RouteTableRegistry {
    path: PathBuf,
    backup: PathBuf,
    fs: Box<dyn FileOps>,
    span: Span,
}

impl RouteTableRegistry {
    /// Registry at the location configured in `ctx`.
    #[must_use]
    pub fn new(ctx: &HostContext) -> Self {
        Self {
            path: ctx.paths().rt_tables.clone(),
            backup: ctx.paths().rt_tables_backup(),
            fs: Box::new(LocalFs),
            span: ctx.span().clone(),
        }
    }

    /// Registry at an explicit path, backed up next to it.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut backup = path.clone().into_os_string();
        backup.push(".bck");
        Self {
            path,
            backup: PathBuf::from(backup),
            fs: Box::new(LocalFs),
            span: Span::current(),
        }
    }

    /// Use different file operations (e.g. privileged helpers).
    #[must_use]
    pub fn with_fs(mut self, fs: impl FileOps + 'static) -> Self {
        self.fs = Box::new(fs);
        self
    }

    /// Registry file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Backup file used during edits.
    #[must_use]
    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    /// Current registry entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read or parsed.
    pub fn entries(&self) -> HostnetResult<Vec<RouteTableEntry>> {
        parse_registry(&self.read()?)
    }

    /// Entry named `name`, if registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be read or parsed.
    pub fn find(&self, name: &str) -> HostnetResult<Option<RouteTableEntry>> {
        Ok(self.entries()?.into_iter().find(|e| e.name == name))
    }

    /// Register a new table under the first free number.
    ///
    /// # Errors
    ///
    /// Returns [`HostnetError::RouteTablesExhausted`] when every number is in
    /// use, or a backup/commit error if the file cannot be updated.
    pub fn add_table(&self, name: &str) -> HostnetResult<RouteTableEntry> {
        let _span = self.span.enter();

        let content = self.read()?;
        let entries = parse_registry(&content)?;
        let number =
            first_free_number(&entries).ok_or_else(|| HostnetError::RouteTablesExhausted {
                path: self.path.clone(),
            })?;
        tracing::debug!(number, name, "New route table number");

        let entry = RouteTableEntry {
            number,
            name: name.to_string(),
        };
        let mut updated = content;
        if updated.is_empty() || updated.ends_with('\n') {
            updated.push_str(&format!("{entry}\n"));
        } else {
            // No final newline: start a new line and keep it unterminated.
            updated.push_str(&format!("\n{entry}"));
        }

        self.commit(&updated)?;
        tracing::info!(number, name, "Route table added");
        Ok(entry)
    }

    /// Remove every entry named `name`, returning how many were removed.
    ///
    /// An entry matches when its second word is `name`. All other lines,
    /// comments and blank lines included, are kept verbatim. A file without
    /// a final newline still has none afterwards.
    ///
    /// # Errors
    ///
    /// Returns a backup/commit error if the file cannot be updated.
    pub fn delete_table(&self, name: &str) -> HostnetResult<usize> {
        let _span = self.span.enter();

        let content = self.read()?;
        let mut kept = String::with_capacity(content.len());
        let mut removed = 0;
        let mut dropped_last = false;
        for line in content.split_inclusive('\n') {
            dropped_last = !line.trim_start().starts_with('#')
                && line.split_whitespace().nth(1) == Some(name);
            if dropped_last {
                removed += 1;
            } else {
                kept.push_str(line);
            }
        }
        if dropped_last && !content.ends_with('\n') && kept.ends_with('\n') {
            kept.pop();
        }

        self.commit(&kept)?;
        tracing::info!(name, removed, "Route table deleted");
        Ok(removed)
    }

    fn read(&self) -> HostnetResult<String> {
        self.fs
            .read_to_string(&self.path)
            .map_err(|e| HostnetError::from_io(e, "read route table registry"))
    }

    fn commit(&self, contents: &str) -> HostnetResult<()> {
        commit_with_backup(self.fs.as_ref(), &self.path, &self.backup, contents).inspect_err(
            |e| tracing::warn!(path = %self.path.display(), error = %e, "Registry not updated"),
        )
    }
}

impl fmt::Debug for RouteTableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTableRegistry")
            .field("path", &self.path)
            .field("backup", &self.backup)
            .finish_non_exhaustive()
    }
}
