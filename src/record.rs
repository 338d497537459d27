//! Persisted instance records and time-window input.
//!
//! After an optimal solve the instance parameters are appended as one JSON line
//! to a run log (`customers.log` by default):
//!
//! ```json
//! {"num_customers":2,"num_vehicles":1,"num_goods":3,
//!  "time_for_sent":{"1":{"start":{"hour":8,"minute":0},"end":{"hour":9,"minute":30}}}}
//! ```
//!
//! The same `time_for_sent` map is accepted as a standalone windows file.

use crate::error::Result;
use crate::instance::{ClockTime, Instance, InstanceBuilder};
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Default run log location.
pub const DEFAULT_LOG_PATH: &str = "customers.log";

/// Delivery window as two clock times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub start: ClockTime,
    pub end: ClockTime,
}

/// Windows keyed by customer id.
pub type WindowMap = BTreeMap<usize, WindowRecord>;

/// Parameters of one solved instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub num_customers: usize,
    pub num_vehicles: usize,
    pub num_goods: usize,
    #[serde(default)]
    pub time_for_sent: WindowMap,
}

impl InstanceRecord {
    pub fn from_instance(instance: &Instance) -> Self {
        let time_for_sent = instance
            .customers
            .iter()
            .filter_map(|c| {
                c.window.map(|w| (c.id, WindowRecord { start: w.start_clock(), end: w.end_clock() }))
            })
            .collect();
        InstanceRecord {
            num_customers: instance.num_customers(),
            num_vehicles: instance.num_vehicles(),
            num_goods: instance.num_goods,
            time_for_sent,
        }
    }

    /// Builder reproducing the recorded counts and windows.
    pub fn to_builder(&self) -> InstanceBuilder {
        apply_windows(
            InstanceBuilder::new(self.num_customers, self.num_vehicles, self.num_goods),
            &self.time_for_sent,
        )
    }
}

/// Register every window of `windows` on `builder`.
pub fn apply_windows(builder: InstanceBuilder, windows: &WindowMap) -> InstanceBuilder {
    windows
        .iter()
        .fold(builder, |b, (&customer, w)| b.clock_window(customer, w.start, w.end))
}

/// Read a `time_for_sent`-shaped JSON file.
pub fn load_windows<P: AsRef<Path>>(path: P) -> Result<WindowMap> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Append-only JSON-lines log of solved instances.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl Default for RunLog {
    fn default() -> Self {
        RunLog::new(DEFAULT_LOG_PATH)
    }
}

impl RunLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        RunLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &InstanceRecord) -> Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{}", line)?;
        log::debug!("appended record for {} customers to {:?}", record.num_customers, self.path);
        Ok(())
    }

    /// Every record in the log, oldest first. A missing log reads as empty.
    pub fn read_all(&self) -> Result<Vec<InstanceRecord>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

/// Local wall-clock time, used as the default answer to window prompts.
pub fn current_clock_time() -> ClockTime {
    let now = chrono::Local::now();
    ClockTime::new(now.hour(), now.minute())
}

/// Ask for one window per customer on `input`.
///
/// Blank answers (or end of input) fall back to `default`. Range checks are left
/// to the instance builder so that errors name the customer.
pub fn prompt_windows<R: BufRead, W: Write>(
    num_customers: usize,
    input: &mut R,
    output: &mut W,
    default: ClockTime,
) -> Result<WindowMap> {
    let mut windows = WindowMap::new();
    for customer in 1..=num_customers {
        let label = format!("ID_{}", customer);
        let start = ClockTime::new(
            ask(input, output, &format!("Enter start hour for customer {}", label), default.hour)?,
            ask(input, output, &format!("Enter start minute for customer {}", label), default.minute)?,
        );
        let end = ClockTime::new(
            ask(input, output, &format!("Enter end hour for customer {}", label), default.hour)?,
            ask(input, output, &format!("Enter end minute for customer {}", label), default.minute)?,
        );
        windows.insert(customer, WindowRecord { start, end });
    }
    Ok(windows)
}

fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str, default: u32) -> Result<u32> {
    loop {
        write!(output, "{} [{}]: ", question, default)?;
        output.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(default);
        }
        let answer = line.trim();
        if answer.is_empty() {
            return Ok(default);
        }
        match answer.parse::<u32>() {
            Ok(v) => return Ok(v),
            Err(_) => writeln!(output, "Invalid time input. Use integers for hours and minutes.")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::InstanceBuilder;
    use std::io::Cursor;

    fn temp_path(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("vrptw_milp_{}_{}", std::process::id(), name));
        let _ = std::fs::remove_file(&p);
        p
    }

    #[test]
    fn test_record_round_trip() {
        let instance = InstanceBuilder::new(3, 2, 4)
            .clock_window(1, ClockTime::new(8, 0), ClockTime::new(9, 30))
            .clock_window(2, ClockTime::new(10, 15), ClockTime::new(12, 0))
            .clock_window(3, ClockTime::new(0, 0), ClockTime::new(23, 59))
            .build()
            .unwrap();
        let record = InstanceRecord::from_instance(&instance);

        let log = RunLog::new(temp_path("round_trip.log"));
        log.append(&record).unwrap();
        log.append(&record).unwrap();
        let back = log.read_all().unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0], record);
        assert_eq!(back[1].time_for_sent[&2].start, ClockTime::new(10, 15));

        let rebuilt = back[0].to_builder().build().unwrap();
        assert_eq!(rebuilt.num_customers(), 3);
        assert_eq!(rebuilt.num_vehicles(), 2);
        assert_eq!(rebuilt.window(1).unwrap().start(), 480);
        assert_eq!(rebuilt.window(1).unwrap().end(), 570);

        let _ = std::fs::remove_file(log.path());
    }

    #[test]
    fn test_missing_log_is_empty() {
        let log = RunLog::new(temp_path("missing.log"));
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_windows_file_uses_string_keys() {
        let path = temp_path("windows.json");
        std::fs::write(
            &path,
            r#"{"1": {"start": {"hour": 8, "minute": 0}, "end": {"hour": 8, "minute": 45}}}"#,
        )
        .unwrap();
        let windows = load_windows(&path).unwrap();
        assert_eq!(windows[&1].end, ClockTime::new(8, 45));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_prompt_defaults_and_retries() {
        let mut input = Cursor::new("8\nabc\n30\n\n\n");
        let mut output = Vec::new();
        let windows = prompt_windows(1, &mut input, &mut output, ClockTime::new(14, 5)).unwrap();
        let w = windows[&1];
        assert_eq!(w.start, ClockTime::new(8, 30));
        assert_eq!(w.end, ClockTime::new(14, 5));
        let transcript = String::from_utf8(output).unwrap();
        assert!(transcript.contains("Invalid time input"));
        assert!(transcript.contains("customer ID_1"));
    }
}
