// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command-line options of the rsync client.
//!
//! Options are collected in a [`CommandOptions`] value by applying [`Applier`]s,
//! then validated and rendered in one pass by [`CommandOptions::to_args`].
//! Caller-supplied `--info` values and extra flags go through a strict allow-list
//! so nothing but well-formed flags ever reaches the client startup script.
//!
//! # Example
//!
//! ```rust
//! use pvc_transfer::transfer::rsync::options::{CommandOptions, DeleteDestination};
//!
//! let args = CommandOptions::with_defaults(&[&DeleteDestination(true)])
//!     .to_args()
//!     .unwrap();
//! assert!(args.contains(&"--delete".to_string()));
//! ```

use crate::errors::TransferError;
use regex::Regex;
use std::sync::LazyLock;

const OPT_RECURSIVE: &str = "--recursive";
const OPT_SYMLINKS: &str = "--links";
const OPT_PERMISSIONS: &str = "--perms";
const OPT_MOD_TIMES: &str = "--times";
const OPT_DEVICE_FILES: &str = "--devices";
const OPT_SPECIAL_FILES: &str = "--specials";
const OPT_OWNER: &str = "--owner";
const OPT_GROUP: &str = "--group";
const OPT_HARD_LINKS: &str = "--hard-links";
const OPT_PARTIAL: &str = "--partial";
const OPT_DELETE: &str = "--delete";
const OPT_HUMAN_READABLE: &str = "--human-readable";

/// `--info` flags enabled by [`StandardProgress`]
const STANDARD_PROGRESS_INFO: [&str; 7] = [
    "COPY2", "DEL2", "REMOVE2", "SKIP2", "FLIST2", "PROGRESS2", "STATS2",
];

static INFO_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]+\d?$").expect("info option pattern must compile")
});

static EXTRA_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-{1,2}([a-z0-9]+-)*[a-z0-9]+$").expect("extra option pattern must compile")
});

/// Something that adjusts [`CommandOptions`].
pub trait Applier {
    fn apply_to(&self, options: &mut CommandOptions);
}

/// Flags of one rsync invocation, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOptions {
    pub recursive: bool,
    pub sym_links: bool,
    pub permissions: bool,
    pub mod_times: bool,
    pub device_files: bool,
    pub special_files: bool,
    pub owners: bool,
    pub groups: bool,
    pub hard_links: bool,
    pub delete: bool,
    pub partial: bool,
    pub bw_limit: Option<i64>,
    pub human_readable: bool,
    pub log_file: Option<String>,
    pub info: Vec<String>,
    pub extras: Vec<String>,
}

impl CommandOptions {
    /// Archive semantics and standard progress, then `appliers` on top.
    #[must_use]
    pub fn with_defaults(appliers: &[&dyn Applier]) -> Self {
        let mut options = Self::default();
        options.apply(&[&ArchiveFiles(true), &StandardProgress(true)]);
        options.apply(appliers);
        options
    }

    pub fn apply(&mut self, appliers: &[&dyn Applier]) {
        for applier in appliers {
            applier.apply_to(self);
        }
    }

    /// Validate and render the flags.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::InvalidCommandOptions`] listing every rejected value.
    pub fn to_args(&self) -> Result<Vec<String>, TransferError> {
        let mut errors = Vec::new();
        let mut args: Vec<String> = [
            (self.recursive, OPT_RECURSIVE),
            (self.sym_links, OPT_SYMLINKS),
            (self.permissions, OPT_PERMISSIONS),
            (self.device_files, OPT_DEVICE_FILES),
            (self.special_files, OPT_SPECIAL_FILES),
            (self.mod_times, OPT_MOD_TIMES),
            (self.owners, OPT_OWNER),
            (self.groups, OPT_GROUP),
            (self.hard_links, OPT_HARD_LINKS),
            (self.delete, OPT_DELETE),
            (self.partial, OPT_PARTIAL),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, flag)| flag.to_string())
        .collect();

        if let Some(limit) = self.bw_limit {
            if limit > 0 {
                args.push(format!("--bwlimit={limit}"));
            } else {
                errors.push(format!("rsync bwlimit value must be a positive integer, got {limit}"));
            }
        }

        if self.human_readable {
            args.push(OPT_HUMAN_READABLE.to_string());
        }

        if let Some(log_file) = &self.log_file {
            if is_safe_path(log_file) {
                args.push(format!("--log-file={log_file}"));
            } else {
                errors.push(format!("invalid rsync log file path {log_file}"));
            }
        }

        if !self.info.is_empty() {
            let mut valid = Vec::new();
            for option in &self.info {
                if INFO_OPTION.is_match(option) {
                    valid.push(option.trim().to_string());
                } else {
                    errors.push(format!("invalid value {option} for rsync option --info"));
                }
            }
            if !valid.is_empty() {
                args.push(format!("--info={}", valid.join(",")));
            }
        }

        for extra in &self.extras {
            if EXTRA_OPTION.is_match(extra) {
                args.push(extra.clone());
            } else {
                errors.push(format!("invalid rsync option {extra}"));
            }
        }

        if errors.is_empty() {
            Ok(args)
        } else {
            Err(TransferError::InvalidCommandOptions(errors))
        }
    }
}

fn is_safe_path(path: &str) -> bool {
    path.starts_with('/')
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-'))
}

/// Recurse and preserve links, permissions, times, ownership, devices,
/// special files and hard links.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArchiveFiles(pub bool);

impl Applier for ArchiveFiles {
    fn apply_to(&self, options: &mut CommandOptions) {
        let enabled = self.0;
        options.recursive = enabled;
        options.sym_links = enabled;
        options.permissions = enabled;
        options.mod_times = enabled;
        options.owners = enabled;
        options.groups = enabled;
        options.device_files = enabled;
        options.special_files = enabled;
        options.hard_links = enabled;
    }
}

/// Preserve owner and group only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreserveOwnership(pub bool);

impl Applier for PreserveOwnership {
    fn apply_to(&self, options: &mut CommandOptions) {
        options.owners = self.0;
        options.groups = self.0;
    }
}

/// Delete files on the destination that are absent on the source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeleteDestination(pub bool);

impl Applier for DeleteDestination {
    fn apply_to(&self, options: &mut CommandOptions) {
        options.delete = self.0;
    }
}

/// Keep partially transferred files so a retry can resume them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartialTransfer(pub bool);

impl Applier for PartialTransfer {
    fn apply_to(&self, options: &mut CommandOptions) {
        options.partial = self.0;
    }
}

/// Human-readable per-file and summary progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StandardProgress(pub bool);

impl Applier for StandardProgress {
    fn apply_to(&self, options: &mut CommandOptions) {
        if self.0 {
            options.info = STANDARD_PROGRESS_INFO.iter().map(ToString::to_string).collect();
        } else {
            options.info.clear();
        }
        options.human_readable = self.0;
    }
}

/// Bandwidth limit in KiB/s; must be positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BandwidthLimit(pub i64);

impl Applier for BandwidthLimit {
    fn apply_to(&self, options: &mut CommandOptions) {
        options.bw_limit = Some(self.0);
    }
}

/// Write the client log to an absolute path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFile(pub String);

impl Applier for LogFile {
    fn apply_to(&self, options: &mut CommandOptions) {
        options.log_file = Some(self.0.clone());
    }
}

/// Replace the `--info` flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfoOptions(pub Vec<String>);

impl Applier for InfoOptions {
    fn apply_to(&self, options: &mut CommandOptions) {
        options.info.clone_from(&self.0);
    }
}

/// Additional raw flags such as `--checksum` or `-z`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtraOptions(pub Vec<String>);

impl Applier for ExtraOptions {
    fn apply_to(&self, options: &mut CommandOptions) {
        options.extras.extend(self.0.iter().cloned());
    }
}

#[cfg(test)]
#[path = "options_tests.rs"]
mod options_tests;
