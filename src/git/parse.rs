//! Git output parsing functions.

use std::collections::BTreeSet;

const ARROW: &str = " => ";

/// Expand git's rename notation into the affected paths.
///
/// `dir/{old => new}/file.png` names both `dir/old/file.png` and
/// `dir/new/file.png`; a whole-path rename is rendered without braces
/// as `old.png => new.png`. A plain path comes back as a one-element
/// vector. Pairs are returned sorted.
pub fn expand_rename_path(path: &str) -> Vec<String> {
    let Some(open) = path.find('{') else {
        return match path.split_once(ARROW) {
            Some((old, new)) => sorted_pair(old.to_string(), new.to_string()),
            None => vec![path.to_string()],
        };
    };
    let Some(close) = path[open..].find('}').map(|offset| open + offset) else {
        return vec![path.to_string()];
    };
    let Some((old, new)) = path[open + 1..close].split_once(ARROW) else {
        return vec![path.to_string()];
    };
    let prefix = &path[..open];
    let suffix = &path[close + 1..];
    sorted_pair(
        splice_rename_side(prefix, old, suffix),
        splice_rename_side(prefix, new, suffix),
    )
}

/// Reassemble one side of a brace rename, collapsing the doubled
/// separator left behind by an empty side (`dir/{ => sub}/file`).
fn splice_rename_side(prefix: &str, side: &str, suffix: &str) -> String {
    let mut joined = format!("{prefix}{side}{suffix}");
    while joined.contains("//") {
        joined = joined.replace("//", "/");
    }
    joined.trim_start_matches('/').to_string()
}

fn sorted_pair(a: String, b: String) -> Vec<String> {
    if a == b {
        return vec![a];
    }
    let mut pair = vec![a, b];
    pair.sort();
    pair
}

/// Parse `git branch [--remote] --contains` output into branch names.
///
/// Markers and whitespace are stripped, the detached-HEAD line is
/// dropped, and remote entries lose their leading remote segment so
/// `origin/feature/x` and `upstream/feature/x` both become
/// `feature/x`. Names come back sorted and de-duplicated.
pub fn parse_contains_branches(output: &str, remote: bool) -> Vec<String> {
    let mut names = BTreeSet::new();
    for line in output.lines() {
        let cleaned: String = line
            .chars()
            .filter(|c| *c != '*' && !c.is_whitespace())
            .collect();
        if cleaned.is_empty() || cleaned.starts_with('(') {
            continue;
        }
        // The symbolic remote HEAD renders as "origin/HEAD -> origin/main".
        let cleaned = cleaned.rsplit("->").next().unwrap_or(&cleaned);
        let name = if remote {
            match cleaned.split_once('/') {
                Some((_, rest)) => rest.to_string(),
                None => cleaned.to_string(),
            }
        } else {
            cleaned.to_string()
        };
        if !name.is_empty() {
            names.insert(name);
        }
    }
    names.into_iter().collect()
}

/// Parse `--pretty=format:%H` log output into SHAs, newest first.
pub fn parse_log_shas(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|line| line.trim().trim_matches('"'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `--name-only` output into changed paths, expanding any rename
/// notation that slips through.
pub fn parse_name_only_changes(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .flat_map(expand_rename_path)
        .collect()
}

/// Parse `for-each-ref --format='%(refname:short) %(objectname)'`.
pub fn parse_branch_heads(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let (name, sha) = line.trim().rsplit_once(' ')?;
            if name.is_empty() || sha.is_empty() {
                return None;
            }
            Some((name.to_string(), sha.to_string()))
        })
        .collect()
}

/// Parse `rev-list --parents -n 1 <sha>`: the first field is the commit
/// itself, the rest are its parents.
pub fn parse_parents(output: &str) -> Vec<String> {
    output
        .split_whitespace()
        .skip(1)
        .map(str::to_string)
        .collect()
}
