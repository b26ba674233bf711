//! Path keyword expansion and wildcard matching.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use itertools::Itertools;

use hifitime::{
    efmt::Format,
    prelude::{Epoch, Formatter, TimeScale},
};

use crate::errors::Error;

/// Expands path keywords from the session start time and station id:
/// `%Y %y %m %d %h %M %S` (calendar fields), `%n` (day of year),
/// `%W` (GPS week), `%D` (day of week), `%r` (station id), `%%`.
/// Time keywords without a known session time are a configuration
/// error.
pub fn expand_keywords(
    path: &str,
    time: Option<Epoch>,
    staid: &str,
) -> Result<String, Error> {
    let mut output = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();

    let fields = time.map(|t| {
        let t = t.to_time_scale(TimeScale::GPST);
        let (week, tow_nanos) = t.to_time_of_week();
        let (y, m, d, hh, mm, ss, _) = t.to_gregorian(TimeScale::GPST);
        (t, week, tow_nanos / 86_400_000_000_000, y, m, d, hh, mm, ss)
    });

    while let Some(c) = chars.next() {
        if c != '%' {
            output.push(c);
            continue;
        }

        let Some(keyword) = chars.next() else {
            output.push('%');
            break;
        };

        if keyword == '%' {
            output.push('%');
            continue;
        }

        if keyword == 'r' {
            if staid.is_empty() {
                return Err(Error::Config(format!(
                    "unresolvable keyword %r in {}",
                    path,
                )));
            }
            output.push_str(staid);
            continue;
        }

        let Some((t, week, dow, y, m, d, hh, mm, ss)) = fields else {
            return Err(Error::Config(format!(
                "unresolvable keyword %{} in {}",
                keyword, path,
            )));
        };

        match keyword {
            'Y' => output.push_str(&format!("{:04}", y)),
            'y' => output.push_str(&format!("{:02}", y % 100)),
            'm' => output.push_str(&format!("{:02}", m)),
            'd' => output.push_str(&format!("{:02}", d)),
            'h' => output.push_str(&format!("{:02}", hh)),
            'M' => output.push_str(&format!("{:02}", mm)),
            'S' => output.push_str(&format!("{:02}", ss)),
            'n' => {
                let format = Format::from_str("%j").unwrap();
                output.push_str(&Formatter::new(t, format).to_string());
            },
            'W' => output.push_str(&format!("{:04}", week)),
            'D' => output.push_str(&format!("{}", dow)),
            other => {
                // not a keyword, keep verbatim
                output.push('%');
                output.push(other);
            },
        }
    }

    Ok(output)
}

/// Expands `*` and `?` in the file name portion of a path, returning
/// the sorted matches. Patterns without wildcards pass through as-is.
pub fn expand_wildcards(pattern: &str) -> Vec<String> {
    let path = Path::new(pattern);

    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return vec![pattern.to_string()];
    };

    if !name.contains(['*', '?']) {
        return vec![pattern.to_string()];
    }

    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let directory = parent.unwrap_or(Path::new("."));

    let Ok(entries) = fs::read_dir(directory) else {
        return Vec::new();
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str().map(|s| s.to_string()))
        .filter(|candidate| glob_match(name, candidate))
        .map(|candidate| match parent {
            Some(parent) => parent.join(candidate).display().to_string(),
            None => candidate,
        })
        .sorted()
        .collect()
}

fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();

    fn matches(pattern: &[char], candidate: &[char]) -> bool {
        match (pattern.first(), candidate.first()) {
            (None, None) => true,
            (Some('*'), _) => {
                matches(&pattern[1..], candidate)
                    || (!candidate.is_empty() && matches(pattern, &candidate[1..]))
            },
            (Some('?'), Some(_)) => matches(&pattern[1..], &candidate[1..]),
            (Some(p), Some(c)) if p == c => matches(&pattern[1..], &candidate[1..]),
            _ => false,
        }
    }

    matches(&pattern, &candidate)
}
