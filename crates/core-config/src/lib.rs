//! Configuration loading and validation.
//!
//! Options come from an optional `wmc.toml` (working directory first, then
//! the platform config dir) with unknown fields tolerated, overridden by
//! CLI flags in the binary, and are validated into one immutable [`Config`]
//! that is passed by reference everywhere. There are no option singletons.

use anyhow::{bail, Result};
use serde::Deserialize;
use std::{fs, path::PathBuf, time::Duration};
use tracing::{info, warn};

/// The memory model driving consistency checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    Sc,
    Tso,
    Ra,
    #[default]
    Rc11,
    Imm,
    Lkmm,
}

impl Model {
    /// Whether the model consumes dependency (ppo) views.
    pub fn tracks_deps(self) -> bool {
        matches!(self, Model::Imm | Model::Lkmm)
    }
}

impl std::str::FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sc" => Ok(Model::Sc),
            "tso" => Ok(Model::Tso),
            "ra" => Ok(Model::Ra),
            "rc11" => Ok(Model::Rc11),
            "imm" => Ok(Model::Imm),
            "lkmm" => Ok(Model::Lkmm),
            other => Err(format!("unknown model `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulePolicy {
    #[default]
    Ltr,
    Arbitrary,
    Wf,
    Wfr,
}

impl SchedulePolicy {
    pub fn is_seeded(self) -> bool {
        matches!(self, SchedulePolicy::Arbitrary | SchedulePolicy::Wfr)
    }
}

impl std::str::FromStr for SchedulePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ltr" => Ok(SchedulePolicy::Ltr),
            "arbitrary" => Ok(SchedulePolicy::Arbitrary),
            "wf" => Ok(SchedulePolicy::Wf),
            "wfr" => Ok(SchedulePolicy::Wfr),
            other => Err(format!("unknown schedule policy `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundType {
    #[default]
    None,
    Context,
    Round,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    Writeback,
    #[default]
    Ordered,
    Data,
}

/// Raw file contents; every field optional so partial files are fine and
/// unknown fields are ignored for forward evolution.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub model: Option<Model>,
    #[serde(default)]
    pub schedule_policy: Option<SchedulePolicy>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub bound: Option<u32>,
    #[serde(default)]
    pub bound_type: Option<BoundType>,
    #[serde(default)]
    pub bounds_histogram: Option<bool>,
    #[serde(default)]
    pub symmetry_reduction: Option<bool>,
    #[serde(default)]
    pub ipr: Option<bool>,
    #[serde(default)]
    pub disable_bam: Option<bool>,
    #[serde(default)]
    pub lapor: Option<bool>,
    #[serde(default)]
    pub confirmation_annot: Option<bool>,
    #[serde(default)]
    pub helper_annot: Option<bool>,
    #[serde(default)]
    pub final_write_annot: Option<bool>,
    #[serde(default)]
    pub linearizability_collect: Option<bool>,
    #[serde(default)]
    pub linearizability_check: Option<bool>,
    #[serde(default)]
    pub persevere: Option<bool>,
    #[serde(default)]
    pub journal_data: Option<JournalMode>,
    #[serde(default)]
    pub block_size: Option<u64>,
    #[serde(default)]
    pub max_file_size: Option<u64>,
    #[serde(default)]
    pub dump_graphs: Option<bool>,
    #[serde(default)]
    pub stop_on_first_error: Option<bool>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// The validated, immutable option record handed to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub model: Model,
    pub schedule_policy: SchedulePolicy,
    pub seed: u64,
    pub bound: Option<u32>,
    pub bound_type: BoundType,
    pub bounds_histogram: bool,
    pub symmetry_reduction: bool,
    pub ipr: bool,
    pub disable_bam: bool,
    pub confirmation_annot: bool,
    pub helper_annot: bool,
    pub final_write_annot: bool,
    pub linearizability_collect: bool,
    pub linearizability_check: bool,
    pub persevere: bool,
    pub journal_data: JournalMode,
    pub block_size: u64,
    pub max_file_size: u64,
    pub dump_graphs: bool,
    pub stop_on_first_error: bool,
    pub timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        ConfigFile::default().validate().expect("defaults are valid")
    }
}

/// Best-effort config path: working directory first, then the platform
/// config dir.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("wmc.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("wmc").join("wmc.toml");
    }
    PathBuf::from("wmc.toml")
}

/// Load a config file, falling back to defaults when the file is missing.
/// A malformed file is an error: silently ignoring checker options would
/// change what gets verified.
pub fn load_from(path: Option<PathBuf>) -> Result<ConfigFile> {
    let path = path.unwrap_or_else(discover);
    match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => {
                info!(target: "config", path = %path.display(), "config_loaded");
                Ok(file)
            }
            Err(e) => bail!("malformed config {}: {e}", path.display()),
        },
        Err(_) => Ok(ConfigFile::default()),
    }
}

impl ConfigFile {
    /// Resolve defaults and check option interactions.
    pub fn validate(self) -> Result<Config> {
        if self.lapor.unwrap_or(false) {
            bail!("lock-aware partial order reduction is currently disabled");
        }
        if self.linearizability_collect.unwrap_or(false)
            && self.linearizability_check.unwrap_or(false)
        {
            bail!("linearizability collect and check are mutually exclusive");
        }
        let model = self.model.unwrap_or_default();
        let schedule_policy = self.schedule_policy.unwrap_or_default();
        if self.seed.is_some() && !schedule_policy.is_seeded() {
            warn!(target: "config", "seed has no effect under this schedule policy");
        }
        let bound = self.bound;
        let bound_type = match (bound, self.bound_type.unwrap_or_default()) {
            // A bound without a type defaults to context bounding.
            (Some(_), BoundType::None) => BoundType::Context,
            (None, t) if t != BoundType::None => {
                bail!("bound_type set without a bound");
            }
            (_, t) => t,
        };
        let mut symmetry_reduction = self.symmetry_reduction.unwrap_or(false);
        let mut ipr = self.ipr.unwrap_or(true);
        if model.tracks_deps() {
            if symmetry_reduction {
                warn!(
                    target: "config",
                    "symmetry reduction has no effect under dependency-tracking models"
                );
                symmetry_reduction = false;
            }
            ipr = false;
        }
        Ok(Config {
            model,
            schedule_policy,
            seed: self.seed.unwrap_or(42),
            bound,
            bound_type,
            bounds_histogram: self.bounds_histogram.unwrap_or(false),
            symmetry_reduction,
            ipr,
            disable_bam: self.disable_bam.unwrap_or(false),
            confirmation_annot: self.confirmation_annot.unwrap_or(false),
            helper_annot: self.helper_annot.unwrap_or(false),
            final_write_annot: self.final_write_annot.unwrap_or(false),
            linearizability_collect: self.linearizability_collect.unwrap_or(false),
            linearizability_check: self.linearizability_check.unwrap_or(false),
            persevere: self.persevere.unwrap_or(false),
            journal_data: self.journal_data.unwrap_or_default(),
            block_size: self.block_size.unwrap_or(512),
            max_file_size: self.max_file_size.unwrap_or(64 * 1024),
            dump_graphs: self.dump_graphs.unwrap_or(false),
            stop_on_first_error: self.stop_on_first_error.unwrap_or(false),
            timeout: self.timeout_secs.map(Duration::from_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_when_missing_file() {
        let file = load_from(Some(PathBuf::from("__nonexistent_hopefully__.toml"))).unwrap();
        let cfg = file.validate().unwrap();
        assert_eq!(cfg.model, Model::Rc11);
        assert_eq!(cfg.schedule_policy, SchedulePolicy::Ltr);
        assert!(cfg.ipr);
    }

    #[test]
    fn parses_model_and_bound() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "model = \"imm\"\nbound = 2\nbound_type = \"round\"\n")
            .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf()))
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(cfg.model, Model::Imm);
        assert_eq!(cfg.bound, Some(2));
        assert_eq!(cfg.bound_type, BoundType::Round);
    }

    #[test]
    fn bound_without_type_defaults_to_context() {
        let cfg = ConfigFile { bound: Some(1), ..Default::default() }
            .validate()
            .unwrap();
        assert_eq!(cfg.bound_type, BoundType::Context);
    }

    #[test]
    fn bound_type_without_bound_is_rejected() {
        let file = ConfigFile { bound_type: Some(BoundType::Round), ..Default::default() };
        assert!(file.validate().is_err());
    }

    #[test]
    fn lapor_is_rejected() {
        let file = ConfigFile { lapor: Some(true), ..Default::default() };
        assert!(file.validate().is_err());
    }

    #[test]
    fn ipr_and_symmetry_are_dropped_under_imm() {
        let cfg = ConfigFile {
            model: Some(Model::Imm),
            ipr: Some(true),
            symmetry_reduction: Some(true),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert!(!cfg.ipr);
        assert!(!cfg.symmetry_reduction);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "model = [broken\n").unwrap();
        assert!(load_from(Some(tmp.path().to_path_buf())).is_err());
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "model = \"sc\"\nfuture_option = true\n").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf()))
            .unwrap()
            .validate()
            .unwrap();
        assert_eq!(cfg.model, Model::Sc);
    }
}
