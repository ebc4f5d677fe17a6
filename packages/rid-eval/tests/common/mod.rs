//! Synthetic scenarios for the integration tests.
//!
//! Six fixed federate receivers (hosts 1..=6) plus one non-federate (host 7).
//! Serial 10 is an honest drone; serial 20 tells the truth until
//! `spoof_from_s` and then claims a position `offset_m` away along x.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{ChiSquared, Distribution};
use rid_eval::Scenario;
use rid_types::{HostClass, RxEvent, Vec3};

pub const FEDERATES: [(u32, Vec3); 6] = [
    (1, Vec3::new(0.0, 0.0, 0.0)),
    (2, Vec3::new(200.0, 0.0, 0.0)),
    (3, Vec3::new(0.0, 200.0, 0.0)),
    (4, Vec3::new(0.0, 0.0, 100.0)),
    (5, Vec3::new(200.0, 200.0, 80.0)),
    (6, Vec3::new(200.0, 0.0, 60.0)),
];
pub const OUTSIDER: (u32, Vec3) = (7, Vec3::new(100.0, 250.0, 0.0));

pub const TX_POWER_DBM: f64 = 16.0;

pub struct Synth {
    pub seed: u64,
    pub steps: i64,
    pub spoof_from_s: f64,
    pub offset_m: f64,
}

impl Default for Synth {
    fn default() -> Self {
        Self { seed: 7, steps: 20, spoof_from_s: 5.0, offset_m: 80.0 }
    }
}

fn noiseless_rssi(tx: Vec3, rx: Vec3) -> f64 {
    TX_POWER_DBM - 20.0 * tx.dist(&rx).max(0.1).log10()
}

impl Synth {
    /// RX events in table order (transmission by transmission).
    pub fn events(&self) -> Vec<RxEvent> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        // Spoofed receptions carry inflated single-receiver NIS
        let nis = ChiSquared::new(1.0).unwrap();

        let mut events = Vec::new();
        for k in 0..self.steps {
            let t = k as f64;
            let honest = Vec3::new(60.0 + 2.0 * t, 80.0, 30.0);
            let spoofer = Vec3::new(120.0, 60.0 + 2.0 * t, 40.0);
            let spoofing = t >= self.spoof_from_s;
            let claimed = if spoofing { Vec3::new(spoofer.x - self.offset_m, spoofer.y, spoofer.z) } else { spoofer };

            for (serial, truth, claim, spoofed) in [(10u64, honest, honest, false), (20, spoofer, claimed, spoofing)] {
                for &(host_id, rx_pos) in FEDERATES.iter().chain(std::iter::once(&OUTSIDER)) {
                    let base: f64 = nis.sample(&mut rng);
                    events.push(RxEvent {
                        time: t + host_id as f64 * 1e-3,
                        host_id,
                        host_class: HostClass::Benign,
                        serial_number: serial,
                        rid_timestamp: k * 1000,
                        rx_pos,
                        rid_pos: claim,
                        rid_velocity: None,
                        rssi: noiseless_rssi(truth, rx_pos),
                        is_spoofed: spoofed,
                        kf_nis: Some(if spoofed { 10.0 * base } else { base }),
                    });
                }
            }
        }
        events
    }

    pub fn scenario(&self, id: &str) -> Scenario {
        Scenario::from_events(id, self.events(), FEDERATES.iter().map(|f| f.0))
    }
}

pub const CSV_HEADER: &str = "time,event_type,host_id,host_type,serial_number,rid_timestamp,\
pos_x,pos_y,pos_z,rid_pos_x,rid_pos_y,rid_pos_z,rssi,is_spoofed,kf_nis";

/// Write events as an RX-only table; the spoofer's own TX rows are added so
/// host 20 appears in the table with its class.
pub fn write_table(dir: &Path, name: &str, events: &[RxEvent]) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "{CSV_HEADER}").unwrap();
    writeln!(f, "0.0,TX,20,spoofer,20,0,120,60,40,120,60,40,,,").unwrap();
    for e in events {
        writeln!(
            f,
            "{},RX,{},{},{},{},{},{},{},{},{},{},{},{},{}",
            e.time, e.host_id, e.host_class, e.serial_number, e.rid_timestamp,
            e.rx_pos.x, e.rx_pos.y, e.rx_pos.z,
            e.rid_pos.x, e.rid_pos.y, e.rid_pos.z,
            e.rssi, if e.is_spoofed { "True" } else { "False" },
            e.kf_nis.map(|v| v.to_string()).unwrap_or_default(),
        )
        .unwrap();
    }
    path
}
