use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::warn;

use crate::enrich::canonical_callsign;

/// Outcome of rewriting the airline table in code order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOutcome {
    Missing,
    Sorted(usize),
}

pub fn load_airlines(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let lines = read_lines(path)?;
    Ok(parse_airlines(&lines).into_iter().collect())
}

pub fn load_routes(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let mut routes = HashMap::new();
    for line in read_lines(path)? {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() < 3 || parts[0].is_empty() {
            continue;
        }
        routes.insert(
            canonical_callsign(parts[0]),
            format!("{}/{}", parts[1], parts[2]),
        );
    }
    Ok(routes)
}

pub fn append_route(path: &Path, callsign: &str, origin: &str, dest: &str) -> Result<()> {
    append_line(path, &format!("{callsign},{origin},{dest}"))
}

pub fn append_airline(path: &Path, code: &str, name: &str) -> Result<()> {
    append_line(path, &format!("{code},{name}"))
}

/// Rewrites the airline table sorted by code. Lines that are not
/// `CODE,Name` pairs are dropped.
pub fn sort_airline_file(path: &Path) -> Result<SortOutcome> {
    if !path.exists() {
        return Ok(SortOutcome::Missing);
    }
    let mut entries = parse_airlines(&read_lines(path)?);
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut text = String::new();
    for (code, name) in &entries {
        text.push_str(code);
        text.push(',');
        text.push_str(name);
        text.push('\n');
    }
    fs::write(path, text)
        .with_context(|| format!("Failed to write airlines: {}", path.display()))?;
    Ok(SortOutcome::Sorted(entries.len()))
}

/// Reads a table file line by line. Lines that are not valid UTF-8 are
/// skipped rather than failing the whole file.
fn read_lines(path: &Path) -> Result<Vec<String>> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut lines = Vec::new();
    for (idx, raw) in bytes.split(|b| *b == b'\n').enumerate() {
        match std::str::from_utf8(raw) {
            Ok(line) => lines.push(line.trim_end_matches('\r').to_string()),
            Err(_) => warn!("{}:{}: skipping line that is not UTF-8", path.display(), idx + 1),
        }
    }
    Ok(lines)
}

fn parse_airlines(lines: &[String]) -> Vec<(String, String)> {
    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once(','))
        .map(|(code, name)| (code.trim().to_ascii_uppercase(), name.trim().to_string()))
        .filter(|(code, name)| !code.is_empty() && !name.is_empty())
        .collect()
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut needs_newline = false;
    let len = file.metadata().map(|m| m.len()).unwrap_or(0);
    if len > 0 {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        needs_newline = last[0] != b'\n';
    }

    let mut text = String::with_capacity(line.len() + 2);
    if needs_newline {
        text.push('\n');
    }
    text.push_str(line);
    text.push('\n');
    file.write_all(text.as_bytes())
        .with_context(|| format!("Failed to append to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        append_airline, append_route, load_airlines, load_routes, sort_airline_file, SortOutcome,
    };
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file(name: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        dir.push(format!("flight-tracker-test-{name}-{suffix}"));
        let _ = fs::create_dir_all(&dir);
        dir.push(name);
        dir
    }

    fn cleanup(path: &PathBuf) {
        let _ = fs::remove_file(path);
        let _ = fs::remove_dir(path.parent().unwrap());
    }

    #[test]
    fn missing_files_load_empty() {
        let path = temp_file("nothing.txt");
        assert!(load_airlines(&path).unwrap().is_empty());
        assert!(load_routes(&path).unwrap().is_empty());
        assert_eq!(sort_airline_file(&path).unwrap(), SortOutcome::Missing);
        cleanup(&path);
    }

    #[test]
    fn airlines_parse_and_normalise() {
        let path = temp_file("airlines.txt");
        fs::write(&path, "baw,British Airways\nEZY, easyJet \ngarbage\n,Nameless\n").unwrap();
        let airlines = load_airlines(&path).unwrap();
        assert_eq!(airlines.len(), 2);
        assert_eq!(airlines.get("BAW").map(String::as_str), Some("British Airways"));
        assert_eq!(airlines.get("EZY").map(String::as_str), Some("easyJet"));
        cleanup(&path);
    }

    #[test]
    fn routes_skip_comments_and_short_lines() {
        let path = temp_file("routes.txt");
        fs::write(
            &path,
            "# callsign,origin,dest\n\nezy12ab,BRS,AMS\nRYR1,STN\nBAW2,LHR,JFK,extra\n",
        )
        .unwrap();
        let routes = load_routes(&path).unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes.get("EZY12AB").map(String::as_str), Some("BRS/AMS"));
        assert_eq!(routes.get("BAW2").map(String::as_str), Some("LHR/JFK"));
        cleanup(&path);
    }

    #[test]
    fn bad_utf8_line_is_skipped() {
        let path = temp_file("latin1.txt");
        let mut bytes = b"BAW,British Airways\r\n".to_vec();
        bytes.extend_from_slice(b"AEA,Air Europa Espa\xf1a\n");
        bytes.extend_from_slice(b"EZY,easyJet\n");
        fs::write(&path, &bytes).unwrap();
        let airlines = load_airlines(&path).unwrap();
        assert_eq!(airlines.len(), 2);
        assert_eq!(airlines.get("BAW").map(String::as_str), Some("British Airways"));
        assert_eq!(airlines.get("EZY").map(String::as_str), Some("easyJet"));

        fs::write(&path, b"EZY12AB,BRS,AMS\n\xff\xfe,LHR,JFK\nBAW2,LHR,JFK\n").unwrap();
        let routes = load_routes(&path).unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes.get("BAW2").map(String::as_str), Some("LHR/JFK"));
        cleanup(&path);
    }

    #[test]
    fn append_adds_newline_when_missing() {
        let path = temp_file("append.txt");
        fs::write(&path, "BAW,British Airways").unwrap();
        append_airline(&path, "EZY", "easyJet").unwrap();
        append_route(&path, "EZY12AB", "BRS", "AMS").unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "BAW,British Airways\nEZY,easyJet\nEZY12AB,BRS,AMS\n");
        cleanup(&path);
    }

    #[test]
    fn sort_rewrites_in_code_order() {
        let path = temp_file("sort.txt");
        fs::write(&path, "RYR,Ryanair\n\nbaw,British Airways\nnot a row\nEZY,easyJet").unwrap();
        assert_eq!(sort_airline_file(&path).unwrap(), SortOutcome::Sorted(3));
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "BAW,British Airways\nEZY,easyJet\nRYR,Ryanair\n");
        cleanup(&path);
    }
}
