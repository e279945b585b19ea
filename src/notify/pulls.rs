//! Choosing which pull requests a comment lands on.
//!
//! A pull request relates to a source when one of its changed files sits
//! under the source path, or under one of the paths listed in the
//! manifest-generate-paths annotation.

use crate::extract::MANIFEST_GENERATE_PATHS_ANNOTATION;
use crate::github::PullRequest;
use crate::model::Application;

/// Canonical repository-relative paths from the manifest-generate-paths annotation.
///
/// Entries are separated by `;`. Absolute entries are rooted at the
/// repository; relative ones are resolved against every source path. An
/// empty entry disables the annotation entirely.
pub fn manifest_generate_paths(app: &Application) -> Vec<String> {
    let Some(annotation) = app.annotation(MANIFEST_GENERATE_PATHS_ANNOTATION) else {
        return Vec::new();
    };
    let sources = app.spec.all_sources();

    let mut paths = Vec::new();
    for entry in annotation.split(';') {
        if entry.is_empty() {
            return Vec::new();
        }
        if let Some(rooted) = entry.strip_prefix('/') {
            paths.push(rooted.to_string());
            continue;
        }
        for source in &sources {
            let joined = if source.path.is_empty() {
                clean_path(entry)
            } else {
                clean_path(&format!("{}/{entry}", source.path))
            };
            paths.push(joined.trim_start_matches('/').to_string());
        }
    }
    paths.dedup();
    paths
}

/// The pull requests touching `source_path` or any of `manifest_paths`.
pub fn related<'a>(
    pulls: &'a [PullRequest],
    source_path: &str,
    manifest_paths: &[String],
) -> Vec<&'a PullRequest> {
    pulls
        .iter()
        .filter(|pull| {
            pull.files.iter().any(|file| {
                file.starts_with(source_path)
                    || manifest_paths.iter().any(|p| file.starts_with(p.as_str()))
            })
        })
        .collect()
}

/// Lexically normalizes a slash-separated path: drops `.` and empty
/// segments and resolves `..` against its parent.
fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|s| *s != "..") {
                    segments.pop();
                } else if !rooted {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
