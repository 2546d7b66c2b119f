//! Checkpoint files
//!
//! A checkpoint directory written by [`crate::RLib::save`] looks like:
//!
//! ```text
//! <dir>/rlib.json            library metadata (agent, params, extension, instances)
//! <dir>/agent_<id>/...       instance state, written by the agent
//! ```
//!
//! Deep agents store their Q-network with burn's named MessagePack recorder
//! (`network.mpk`) next to a JSON file holding the remaining state.

use crate::error::Result;
use crate::spaces::Params;
use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::Backend,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the metadata file inside a checkpoint directory
pub const METADATA_FILE: &str = "rlib.json";

/// Metadata saved by [`crate::RLib::save`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RlibMetadata {
    /// Crate version that wrote the checkpoint
    pub version: String,

    /// Agent type name
    pub agent: String,

    /// Parameters the agent was built from
    pub params: Params,

    /// Extension type name, `None` in no-extension mode
    pub extension: Option<String>,

    /// Ids of the saved instances
    pub instances: Vec<usize>,
}

impl RlibMetadata {
    pub fn new(
        agent: &str,
        params: Params,
        extension: Option<&str>,
        instances: Vec<usize>,
    ) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            agent: agent.to_string(),
            params,
            extension: extension.map(str::to_string),
            instances,
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        write_json(&dir.join(METADATA_FILE), self)
    }

    pub fn load(dir: &Path) -> Result<Self> {
        read_json(&dir.join(METADATA_FILE))
    }
}

/// Directory holding the state of one agent instance
pub fn instance_dir(dir: &Path, agent_id: usize) -> PathBuf {
    dir.join(format!("agent_{}", agent_id))
}

/// Serialize `value` as pretty JSON, creating parent directories if needed
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

/// Save module weights to `<path>.mpk`
pub fn save_module<B: Backend, M: Module<B>>(module: &M, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    <NamedMpkFileRecorder<FullPrecisionSettings> as Recorder<B>>::record(
        &recorder,
        module.clone().into_record(),
        path.to_path_buf(),
    )?;
    Ok(())
}

/// Load weights saved by [`save_module`] into `module`
pub fn load_module<B: Backend, M: Module<B>>(
    module: M,
    path: &Path,
    device: &B::Device,
) -> Result<M> {
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let record: M::Record = <NamedMpkFileRecorder<FullPrecisionSettings> as Recorder<B>>::load(
        &recorder,
        path.to_path_buf(),
        device,
    )?;
    Ok(module.load_record(record))
}
