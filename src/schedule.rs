//! Experiment schedule: which node starts when, for how long.
//!
//! Built once at controller startup from two row-aligned tables:
//!
//! ```text
//! devicesim.csv        addr.csv
//! start_time,duration  address
//! 0,300                10.0.0.11:8000
//! 30,120.5             10.0.0.12:8000
//! ```
//!
//! Row i of both tables describes the same target. Client addresses live in
//! a separate single-column table.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::error::LoadError;

/// One scheduled start signal.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    /// Seconds from experiment start.
    pub fire_time: u64,
    /// Seconds the workload runs before self-stopping; <= 0 means stop.
    pub duration: f64,
    pub target_address: String,
}

/// Entries in table order. Use [`Schedule::sorted`] for dispatch order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    entries: Vec<ScheduleEntry>,
}

impl Schedule {
    pub fn new(entries: Vec<ScheduleEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by fire time. The sort is stable, so ties keep
    /// their table order.
    pub fn sorted(&self) -> Vec<ScheduleEntry> {
        let mut entries = self.entries.clone();
        entries.sort_by_key(|e| e.fire_time);
        entries
    }

    /// Distinct target addresses in first-seen order.
    pub fn target_addresses(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter(|e| seen.insert(e.target_address.as_str()))
            .map(|e| e.target_address.clone())
            .collect()
    }
}

/// Client fleet addresses, in table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientAddressList {
    addresses: Vec<String>,
}

impl ClientAddressList {
    pub fn new(addresses: Vec<String>) -> Self {
        Self { addresses }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.addresses
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Relative sleeps between consecutive fire times, starting from 0.
///
/// `fire_times` must already be sorted. Summing the result reproduces the
/// input (see [`cumulative_offsets`]).
pub fn sleep_intervals(fire_times: &[u64]) -> Vec<Duration> {
    let mut previous = 0u64;
    fire_times
        .iter()
        .map(|&t| {
            let interval = t.saturating_sub(previous);
            previous = previous.max(t);
            Duration::from_secs(interval)
        })
        .collect()
}

/// Running sum of `intervals`.
pub fn cumulative_offsets(intervals: &[Duration]) -> Vec<Duration> {
    let mut total = Duration::ZERO;
    intervals
        .iter()
        .map(|&i| {
            total += i;
            total
        })
        .collect()
}

/// Load and join the node table and the address table.
pub fn load_schedule(node_table: &Path, address_table: &Path) -> Result<Schedule, LoadError> {
    let nodes = parse_node_rows(node_table, &read_table(node_table)?)?;
    let addresses = parse_address_rows(address_table, &read_table(address_table)?)?;

    if nodes.len() != addresses.len() {
        return Err(LoadError::RowCountMismatch {
            node_rows: nodes.len(),
            address_rows: addresses.len(),
        });
    }

    let entries = nodes
        .into_iter()
        .zip(addresses)
        .map(|((fire_time, duration), target_address)| ScheduleEntry {
            fire_time,
            duration,
            target_address,
        })
        .collect();
    Ok(Schedule::new(entries))
}

/// Load the single-column client address table.
pub fn load_client_addresses(path: &Path) -> Result<ClientAddressList, LoadError> {
    let addresses = parse_address_rows(path, &read_table(path)?)?;
    Ok(ClientAddressList::new(addresses))
}

fn read_table(path: &Path) -> Result<String, LoadError> {
    std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Split `text` into (line number, cells). Blank lines are skipped and a
/// leading header row whose first cell is `header` is dropped.
fn table_rows<'a>(text: &'a str, header: &str) -> Vec<(usize, Vec<&'a str>)> {
    let mut rows: Vec<(usize, Vec<&str>)> = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| (i + 1, line.split(',').map(str::trim).collect()))
        .collect();
    if let Some((_, first)) = rows.first() {
        if first[0].eq_ignore_ascii_case(header) {
            rows.remove(0);
        }
    }
    rows
}

/// Parse `start_time,duration` rows.
pub fn parse_node_rows(path: &Path, text: &str) -> Result<Vec<(u64, f64)>, LoadError> {
    let malformed = |line: usize, message: String| LoadError::Malformed {
        path: path.to_path_buf(),
        line,
        message,
    };

    table_rows(text, "start_time")
        .into_iter()
        .map(|(line, cells)| {
            if cells.len() < 2 {
                return Err(malformed(
                    line,
                    format!("expected start_time,duration but found {} column(s)", cells.len()),
                ));
            }
            let start: i64 = cells[0]
                .parse()
                .map_err(|e| malformed(line, format!("start_time '{}': {e}", cells[0])))?;
            let fire_time = u64::try_from(start)
                .map_err(|_| malformed(line, format!("start_time {start} is negative")))?;
            let duration: f64 = cells[1]
                .parse()
                .map_err(|e| malformed(line, format!("duration '{}': {e}", cells[1])))?;
            if !duration.is_finite() {
                return Err(malformed(line, format!("duration {duration} is not finite")));
            }
            Ok((fire_time, duration))
        })
        .collect()
}

/// Parse single-column `host:port` rows. Extra columns are ignored.
pub fn parse_address_rows(path: &Path, text: &str) -> Result<Vec<String>, LoadError> {
    table_rows(text, "address")
        .into_iter()
        .map(|(line, cells)| {
            let address = cells[0];
            validate_address(address).map_err(|message| LoadError::Malformed {
                path: path.to_path_buf(),
                line,
                message,
            })?;
            Ok(address.to_string())
        })
        .collect()
}

fn validate_address(address: &str) -> Result<(), String> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| format!("address '{address}' is not host:port"))?;
    if host.is_empty() {
        return Err(format!("address '{address}' has no host"));
    }
    port.parse::<u16>()
        .map_err(|_| format!("address '{address}' has invalid port '{port}'"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn table(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn entry(fire_time: u64, duration: f64, addr: &str) -> ScheduleEntry {
        ScheduleEntry {
            fire_time,
            duration,
            target_address: addr.to_string(),
        }
    }

    #[test]
    fn intervals_sum_back_to_fire_times() {
        let fire_times = [0, 0, 3, 7, 7, 20, 21];
        let intervals = sleep_intervals(&fire_times);
        assert_eq!(
            intervals,
            [0, 0, 3, 4, 0, 13, 1].map(Duration::from_secs).to_vec()
        );
        let expected: Vec<Duration> = fire_times.iter().map(|&t| Duration::from_secs(t)).collect();
        assert_eq!(cumulative_offsets(&intervals), expected);
    }

    #[test]
    fn intervals_of_empty_schedule() {
        assert!(sleep_intervals(&[]).is_empty());
        assert!(cumulative_offsets(&[]).is_empty());
    }

    #[test]
    fn first_interval_counts_from_zero() {
        assert_eq!(sleep_intervals(&[5]), vec![Duration::from_secs(5)]);
    }

    #[test]
    fn sorted_is_stable_on_ties() {
        let schedule = Schedule::new(vec![
            entry(10, 1.0, "a:1"),
            entry(0, 2.0, "b:1"),
            entry(10, 3.0, "c:1"),
            entry(0, 4.0, "d:1"),
        ]);
        let order: Vec<String> = schedule
            .sorted()
            .into_iter()
            .map(|e| e.target_address)
            .collect();
        assert_eq!(order, vec!["b:1", "d:1", "a:1", "c:1"]);
        // Table order is untouched.
        assert_eq!(schedule.entries()[0].target_address, "a:1");
    }

    #[test]
    fn target_addresses_are_distinct() {
        let schedule = Schedule::new(vec![
            entry(0, 5.0, "10.0.0.1:8000"),
            entry(3, 2.0, "10.0.0.2:8000"),
            entry(9, -1.0, "10.0.0.1:8000"),
        ]);
        assert_eq!(
            schedule.target_addresses(),
            vec!["10.0.0.1:8000", "10.0.0.2:8000"]
        );
    }

    #[test]
    fn load_joins_tables_by_row() {
        let nodes = table("0,5\n3,2.5\n");
        let addrs = table("10.0.0.1:8000\n10.0.0.2:8000\n");

        let schedule = load_schedule(nodes.path(), addrs.path()).unwrap();
        assert_eq!(
            schedule.entries(),
            &[entry(0, 5.0, "10.0.0.1:8000"), entry(3, 2.5, "10.0.0.2:8000")]
        );
    }

    #[test]
    fn load_skips_headers_and_blank_lines() {
        let nodes = table("start_time,duration\n\n 7 , 1.5 \n");
        let addrs = table("address\nnode-a:8000\n\n");

        let schedule = load_schedule(nodes.path(), addrs.path()).unwrap();
        assert_eq!(schedule.entries(), &[entry(7, 1.5, "node-a:8000")]);
    }

    #[test]
    fn load_rejects_row_count_mismatch() {
        let nodes = table("0,5\n3,2\n");
        let addrs = table("10.0.0.1:8000\n");

        let err = load_schedule(nodes.path(), addrs.path()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::RowCountMismatch {
                node_rows: 2,
                address_rows: 1
            }
        ));
    }

    #[test]
    fn load_rejects_non_numeric_cells() {
        let nodes = table("0,5\nsoon,2\n");
        let addrs = table("a:1\nb:2\n");

        let err = load_schedule(nodes.path(), addrs.path()).unwrap_err();
        match err {
            LoadError::Malformed { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("soon"));
            }
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn load_rejects_negative_start_time() {
        let path = Path::new("devicesim.csv");
        let err = parse_node_rows(path, "-3,5\n").unwrap_err();
        assert!(err.to_string().contains("negative"));
    }

    #[test]
    fn load_rejects_missing_duration_column() {
        let path = Path::new("devicesim.csv");
        let err = parse_node_rows(path, "3\n").unwrap_err();
        assert!(err.to_string().contains("1 column"));
    }

    #[test]
    fn load_rejects_bad_addresses() {
        let path = Path::new("addr.csv");
        assert!(parse_address_rows(path, "10.0.0.1\n").is_err());
        assert!(parse_address_rows(path, ":8000\n").is_err());
        assert!(parse_address_rows(path, "host:http\n").is_err());
        assert!(parse_address_rows(path, "host:8000,ignored\n").is_ok());
    }

    #[test]
    fn load_reports_missing_file() {
        let addrs = table("a:1\n");
        let err = load_schedule(Path::new("/nonexistent/devicesim.csv"), addrs.path()).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn load_client_addresses_in_order() {
        let clients = table("c1:8001\nc2:8001\n");
        let list = load_client_addresses(clients.path()).unwrap();
        assert_eq!(list.as_slice(), &["c1:8001", "c2:8001"]);
        assert_eq!(list.len(), 2);
    }
}
