//! scenario.rs — Event store for one simulation run
//!
//! Loads a labeled event table (CSV) into an immutable column store of RX
//! events plus the scenario's federate receiver set.
//!
//! Federates are designated from the *full* table (TX rows included): a
//! federate may have no receptions in some rows, and every detector must see
//! the same federate set for comparisons to be fair.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use rid_types::{ClaimedVelocity, EventType, HostClass, RxEvent, TransmissionKey, Vec3};
use tracing::{debug, warn};

use crate::error::{EvalError, Result};

// ── Column layout ─────────────────────────────────────────────────────────────

const REQUIRED_COLUMNS: [&str; 14] = [
    "time", "event_type", "host_id", "host_type", "serial_number", "rid_timestamp",
    "pos_x", "pos_y", "pos_z",
    "rid_pos_x", "rid_pos_y", "rid_pos_z",
    "rssi", "is_spoofed",
];

const VELOCITY_COLUMNS: [&str; 3] = ["rid_speed_vertical", "rid_speed_horizontal", "rid_heading"];

/// Header name → column index, validated once per file.
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn from_headers(path: &Path, headers: &csv::StringRecord) -> Result<Self> {
        if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
            return Err(EvalError::input_format(path, "table has no header row"));
        }
        let index: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_string(), i))
            .collect();

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| !index.contains_key(*c))
            .collect();
        if !missing.is_empty() {
            return Err(EvalError::input_format(
                path,
                format!("missing required column(s): {}", missing.join(", ")),
            ));
        }
        Ok(Self { index })
    }

    fn has(&self, name: &str) -> bool { self.index.contains_key(name) }

    fn raw<'r>(&self, record: &'r csv::StringRecord, name: &str) -> &'r str {
        self.index
            .get(name)
            .and_then(|&i| record.get(i))
            .map(str::trim)
            .unwrap_or("")
    }
}

/// Parses one row, producing errors that name file, line and field.
struct RowReader<'a> {
    path: &'a Path,
    cols: &'a Columns,
    record: &'a csv::StringRecord,
    line: u64,
}

impl RowReader<'_> {
    fn err(&self, field: &str, detail: impl std::fmt::Display) -> EvalError {
        EvalError::input_format(self.path, format!("line {}: field `{field}`: {detail}", self.line))
    }

    fn text(&self, field: &str) -> &str { self.cols.raw(self.record, field) }

    fn f64(&self, field: &str) -> Result<f64> {
        let v = self.text(field);
        if v.is_empty() {
            return Err(self.err(field, "missing value"));
        }
        v.parse::<f64>().map_err(|e| self.err(field, format!("`{v}`: {e}")))
    }

    fn opt_f64(&self, field: &str) -> Result<Option<f64>> {
        let v = self.text(field);
        if v.is_empty() || v.eq_ignore_ascii_case("nan") {
            return Ok(None);
        }
        v.parse::<f64>().map(Some).map_err(|e| self.err(field, format!("`{v}`: {e}")))
    }

    /// Integers may have been written as floats (`12.0`) by the upstream converter.
    fn int(&self, field: &str) -> Result<i64> {
        let v = self.text(field);
        if v.is_empty() {
            return Err(self.err(field, "missing value"));
        }
        if let Ok(i) = v.parse::<i64>() {
            return Ok(i);
        }
        match v.parse::<f64>() {
            Ok(f) if f.is_finite() && f.fract() == 0.0 => Ok(f as i64),
            _ => Err(self.err(field, format!("`{v}` is not an integer"))),
        }
    }

    fn bool(&self, field: &str) -> Result<bool> {
        match self.text(field) {
            "1" | "1.0" | "true" | "True" | "TRUE" => Ok(true),
            "0" | "0.0" | "false" | "False" | "FALSE" => Ok(false),
            "" => Err(self.err(field, "missing value")),
            other => Err(self.err(field, format!("`{other}` is not a boolean"))),
        }
    }

    fn vec3(&self, prefix: &str) -> Result<Vec3> {
        Ok(Vec3::new(
            self.f64(&format!("{prefix}_x"))?,
            self.f64(&format!("{prefix}_y"))?,
            self.f64(&format!("{prefix}_z"))?,
        ))
    }

    fn host_id(&self) -> Result<u32> {
        let id = self.int("host_id")?;
        u32::try_from(id).map_err(|_| self.err("host_id", format!("{id} out of range")))
    }

    fn rx_event(&self) -> Result<RxEvent> {
        let host_class = HostClass::from_label(self.text("host_type"))
            .ok_or_else(|| self.err("host_type", format!("unknown class `{}`", self.text("host_type"))))?;
        let serial = self.int("serial_number")?;
        let serial_number = u64::try_from(serial)
            .map_err(|_| self.err("serial_number", format!("{serial} is negative")))?;

        let rid_velocity = if VELOCITY_COLUMNS.iter().all(|c| self.cols.has(c)) {
            match (
                self.opt_f64("rid_speed_vertical")?,
                self.opt_f64("rid_speed_horizontal")?,
                self.opt_f64("rid_heading")?,
            ) {
                (Some(v), Some(h), Some(hd)) => Some(ClaimedVelocity {
                    vertical_mps: v,
                    horizontal_mps: h,
                    heading_deg: hd,
                }),
                _ => None,
            }
        } else {
            None
        };

        let kf_nis = if self.cols.has("kf_nis") { self.opt_f64("kf_nis")? } else { None };

        Ok(RxEvent {
            time: self.f64("time")?,
            host_id: self.host_id()?,
            host_class,
            serial_number,
            rid_timestamp: self.int("rid_timestamp")?,
            rx_pos: self.vec3("pos")?,
            rid_pos: self.vec3("rid_pos")?,
            rid_velocity,
            rssi: self.f64("rssi")?,
            is_spoofed: self.bool("is_spoofed")?,
            kf_nis,
        })
    }
}

// ── Scenario ──────────────────────────────────────────────────────────────────

/// RX events of one scenario, stored column-wise. Immutable once built.
#[derive(Debug, Clone)]
pub struct Scenario {
    scenario_id:   String,
    time:          Vec<f64>,
    host_id:       Vec<u32>,
    host_class:    Vec<HostClass>,
    serial_number: Vec<u64>,
    rid_timestamp: Vec<i64>,
    is_spoofed:    Vec<bool>,
    rx_pos:        Vec<Vec3>,
    rid_pos:       Vec<Vec3>,
    rid_velocity:  Vec<Option<ClaimedVelocity>>,
    rssi:          Vec<f64>,
    kf_nis:        Vec<Option<f64>>,
    /// Sorted ascending
    federate_host_ids: Vec<u32>,
}

impl Scenario {
    /// Build from RX events in table order. `federate_host_ids` is sorted and deduplicated.
    pub fn from_events(
        scenario_id: impl Into<String>,
        events: Vec<RxEvent>,
        federate_host_ids: impl IntoIterator<Item = u32>,
    ) -> Self {
        let federates: BTreeSet<u32> = federate_host_ids.into_iter().collect();
        let n = events.len();
        let mut s = Self {
            scenario_id: scenario_id.into(),
            time: Vec::with_capacity(n),
            host_id: Vec::with_capacity(n),
            host_class: Vec::with_capacity(n),
            serial_number: Vec::with_capacity(n),
            rid_timestamp: Vec::with_capacity(n),
            is_spoofed: Vec::with_capacity(n),
            rx_pos: Vec::with_capacity(n),
            rid_pos: Vec::with_capacity(n),
            rid_velocity: Vec::with_capacity(n),
            rssi: Vec::with_capacity(n),
            kf_nis: Vec::with_capacity(n),
            federate_host_ids: federates.into_iter().collect(),
        };
        for e in events {
            s.time.push(e.time);
            s.host_id.push(e.host_id);
            s.host_class.push(e.host_class);
            s.serial_number.push(e.serial_number);
            s.rid_timestamp.push(e.rid_timestamp);
            s.is_spoofed.push(e.is_spoofed);
            s.rx_pos.push(e.rx_pos);
            s.rid_pos.push(e.rid_pos);
            s.rid_velocity.push(e.rid_velocity);
            s.rssi.push(e.rssi);
            s.kf_nis.push(e.kf_nis);
        }
        s
    }

    pub fn scenario_id(&self) -> &str { &self.scenario_id }
    pub fn n_events(&self) -> usize { self.time.len() }
    pub fn n_spoofed(&self) -> usize { self.is_spoofed.iter().filter(|&&s| s).count() }
    pub fn n_benign(&self) -> usize { self.n_events() - self.n_spoofed() }

    pub fn time(&self) -> &[f64] { &self.time }
    pub fn host_id(&self) -> &[u32] { &self.host_id }
    pub fn serial_number(&self) -> &[u64] { &self.serial_number }
    pub fn rid_timestamp(&self) -> &[i64] { &self.rid_timestamp }
    pub fn is_spoofed(&self) -> &[bool] { &self.is_spoofed }
    pub fn rx_pos(&self) -> &[Vec3] { &self.rx_pos }
    pub fn rid_pos(&self) -> &[Vec3] { &self.rid_pos }
    pub fn rssi(&self) -> &[f64] { &self.rssi }
    pub fn kf_nis(&self) -> &[Option<f64>] { &self.kf_nis }
    pub fn federate_host_ids(&self) -> &[u32] { &self.federate_host_ids }

    pub fn is_federate(&self, host_id: u32) -> bool {
        self.federate_host_ids.binary_search(&host_id).is_ok()
    }

    /// `true` for events received by a federate.
    pub fn federate_mask(&self) -> Vec<bool> {
        self.host_id.iter().map(|&h| self.is_federate(h)).collect()
    }

    pub fn transmission_key(&self, i: usize) -> TransmissionKey {
        TransmissionKey::new(self.serial_number[i], self.rid_timestamp[i])
    }

    /// Event indices grouped by transmission, iterated in ascending
    /// `(rid_timestamp, serial_number)` order.
    pub fn transmissions(&self) -> BTreeMap<TransmissionKey, Vec<usize>> {
        let mut groups: BTreeMap<TransmissionKey, Vec<usize>> = BTreeMap::new();
        for i in 0..self.n_events() {
            groups.entry(self.transmission_key(i)).or_default().push(i);
        }
        groups
    }

    /// Per-event scores as CSV, with the claimed velocity echoed when the
    /// table carried it. `flagged` is empty without a threshold.
    pub fn write_scores<W: std::io::Write>(
        &self,
        scores: &[f64],
        threshold: Option<f64>,
        out: W,
    ) -> csv::Result<()> {
        let mut wtr = csv::Writer::from_writer(out);
        wtr.write_record([
            "time", "host_id", "host_type", "serial_number", "rid_timestamp",
            "rid_speed_vertical", "rid_speed_horizontal", "rid_heading",
            "is_spoofed", "score", "flagged",
        ])?;
        let opt = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
        for (i, &score) in scores.iter().enumerate().take(self.n_events()) {
            let vel = self.rid_velocity[i];
            wtr.write_record([
                self.time[i].to_string(),
                self.host_id[i].to_string(),
                self.host_class[i].to_string(),
                self.serial_number[i].to_string(),
                self.rid_timestamp[i].to_string(),
                opt(vel.map(|v| v.vertical_mps)),
                opt(vel.map(|v| v.horizontal_mps)),
                opt(vel.map(|v| v.heading_deg)),
                self.is_spoofed[i].to_string(),
                score.to_string(),
                threshold.map(|t| (score >= t).to_string()).unwrap_or_default(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Federates: the `num_federates` smallest ids among hosts explicitly labeled
/// `federate`, or failing that among hosts labeled `benign`.
fn designate_federates(benign: &BTreeSet<u32>, labeled: &BTreeSet<u32>, num_federates: usize) -> Vec<u32> {
    let pool = if labeled.is_empty() { benign } else { labeled };
    pool.iter().copied().take(num_federates).collect()
}

/// Load one scenario table. Only `RX` rows become events.
pub fn load_scenario(path: &Path, num_federates: usize) -> Result<Scenario> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|source| EvalError::Csv { path: path.to_path_buf(), source })?;

    let headers = rdr
        .headers()
        .map_err(|source| EvalError::Csv { path: path.to_path_buf(), source })?
        .clone();
    let cols = Columns::from_headers(path, &headers)?;

    let mut benign_hosts = BTreeSet::new();
    let mut labeled_federates = BTreeSet::new();
    let mut events = Vec::new();
    let mut n_rows = 0usize;

    for result in rdr.records() {
        let record = result.map_err(|source| EvalError::Csv { path: path.to_path_buf(), source })?;
        n_rows += 1;
        let row = RowReader {
            path,
            cols: &cols,
            record: &record,
            line: record.position().map(|p| p.line()).unwrap_or(n_rows as u64 + 1),
        };

        // Federate designation looks at every row, not just receptions
        match HostClass::from_label(row.text("host_type")) {
            Some(HostClass::Benign) => { benign_hosts.insert(row.host_id()?); }
            Some(HostClass::Federate) => { labeled_federates.insert(row.host_id()?); }
            _ => {}
        }

        if EventType::from_label(row.text("event_type")) == Some(EventType::Rx) {
            events.push(row.rx_event()?);
        }
    }

    let federates = designate_federates(&benign_hosts, &labeled_federates, num_federates);
    if federates.len() < num_federates {
        warn!(
            "{}: only {} benign host(s) available for {num_federates} federates",
            path.display(), federates.len()
        );
    }

    let scenario_id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    debug!(
        "Loaded {scenario_id}: {n_rows} rows, {} RX events, federates {federates:?}",
        events.len()
    );

    Ok(Scenario::from_events(scenario_id, events, federates))
}

/// Sorted `*.csv` files of a dataset directory, optionally truncated.
pub fn dataset_files(dir: &Path, limit: Option<usize>) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|source| EvalError::Io { path: dir.to_path_buf(), source })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "csv"))
        .collect();
    files.sort();
    if let Some(limit) = limit {
        files.truncate(limit);
    }
    if files.is_empty() {
        return Err(EvalError::EmptyDataset(dir.to_path_buf()));
    }
    Ok(files)
}

/// Load every scenario of a dataset directory, in file-name order.
pub fn load_dataset(dir: &Path, limit: Option<usize>, num_federates: usize) -> Result<Vec<Scenario>> {
    dataset_files(dir, limit)?
        .iter()
        .map(|p| load_scenario(p, num_federates))
        .collect()
}
