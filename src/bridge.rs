//! Fixed-layout records exchanged with a network simulator
//!
//! The simulator side declares both structures `__attribute__((packed))`,
//! so fields follow each other without padding, little-endian:
//!
//! ```text
//! EnvRecord (38 bytes)                 ActRecord (5 bytes)
//!  0  power         f64                 0  station_id  u32
//!  8  time          f64                 4  mcs         u8
//! 16  cw            u32
//! 20  n_failed      u32
//! 24  n_successful  u32
//! 28  n_wifi        u32
//! 32  mcs           u8
//! 33  station_id    u32
//! 37  kind          u8
//! ```

use crate::error::{Result, RlibError};
use crate::spaces::{Observation, Value};

/// What an [`EnvRecord`] reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Outcome of a transmission opportunity; an action is expected in return
    Transmission = 0,
    /// The simulation has ended
    Finished = 1,
}

impl TryFrom<u8> for RecordKind {
    type Error = RlibError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(RecordKind::Transmission),
            1 => Ok(RecordKind::Finished),
            other => Err(RlibError::Record(format!("unknown record kind {}", other))),
        }
    }
}

/// Observation record written by the simulator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvRecord {
    pub power: f64,
    pub time: f64,
    pub cw: u32,
    pub n_failed: u32,
    pub n_successful: u32,
    pub n_wifi: u32,
    pub mcs: u8,
    pub station_id: u32,
    pub kind: RecordKind,
}

/// Response record written by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActRecord {
    pub station_id: u32,
    pub mcs: u8,
}

/// Sequential little-endian reader over a fixed-size buffer
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8], expected: usize, name: &str) -> Result<Self> {
        if bytes.len() != expected {
            return Err(RlibError::Record(format!(
                "{} must be {} bytes, got {}",
                name,
                expected,
                bytes.len()
            )));
        }
        Ok(Self { bytes, offset: 0 })
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.offset..self.offset + N]);
        self.offset += N;
        out
    }

    fn f64(&mut self) -> f64 {
        f64::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }
}

impl EnvRecord {
    pub const SIZE: usize = 38;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..8].copy_from_slice(&self.power.to_le_bytes());
        out[8..16].copy_from_slice(&self.time.to_le_bytes());
        out[16..20].copy_from_slice(&self.cw.to_le_bytes());
        out[20..24].copy_from_slice(&self.n_failed.to_le_bytes());
        out[24..28].copy_from_slice(&self.n_successful.to_le_bytes());
        out[28..32].copy_from_slice(&self.n_wifi.to_le_bytes());
        out[32] = self.mcs;
        out[33..37].copy_from_slice(&self.station_id.to_le_bytes());
        out[37] = self.kind as u8;
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes, Self::SIZE, "EnvRecord")?;
        Ok(Self {
            power: r.f64(),
            time: r.f64(),
            cw: r.u32(),
            n_failed: r.u32(),
            n_successful: r.u32(),
            n_wifi: r.u32(),
            mcs: r.u8(),
            station_id: r.u32(),
            kind: RecordKind::try_from(r.u8())?,
        })
    }

    /// Raw observation for the rate adaptation extension
    pub fn to_observation(&self) -> Observation {
        let mut obs = Observation::new();
        obs.insert("power".into(), Value::Float(self.power));
        obs.insert("time".into(), Value::Float(self.time));
        obs.insert("cw".into(), Value::from(self.cw));
        obs.insert("n_failed".into(), Value::from(self.n_failed));
        obs.insert("n_successful".into(), Value::from(self.n_successful));
        obs.insert("n_wifi".into(), Value::from(self.n_wifi));
        obs.insert("mcs".into(), Value::Int(self.mcs as i64));
        obs
    }
}

impl ActRecord {
    pub const SIZE: usize = 5;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.station_id.to_le_bytes());
        out[4] = self.mcs;
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes, Self::SIZE, "ActRecord")?;
        Ok(Self {
            station_id: r.u32(),
            mcs: r.u8(),
        })
    }
}
