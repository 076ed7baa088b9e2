use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::agent::{Role, TrainableAgent};
use crate::checkpoint::codec;
use crate::checkpoint::metadata::TrainingState;
use crate::error::CheckpointError;

const STATE_FILE: &str = "training_state.json";
const STEP_PREFIX: &str = "step_";
const FINAL_NAME: &str = "final";
const PROBE_FILE: &str = ".write_probe";

/// Configuration for the checkpoint manager.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CheckpointManagerConfig {
    /// Number of periodic checkpoints retained; `final` is never pruned.
    pub keep_last_n: usize,
}

impl Default for CheckpointManagerConfig {
    fn default() -> Self {
        CheckpointManagerConfig { keep_last_n: 5 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointKind {
    Periodic,
    Final,
}

/// Name of the weight blob for `role` inside a checkpoint directory.
pub fn blob_file_name(role: Role) -> String {
    format!("{}_agent.{}", role, codec::EXTENSION)
}

/// Manages saving, loading, listing, and pruning checkpoints.
pub struct CheckpointManager {
    dir: PathBuf,
    config: CheckpointManagerConfig,
}

impl CheckpointManager {
    /// Create the checkpoint root and verify it accepts writes.
    pub fn new(dir: impl Into<PathBuf>, config: CheckpointManagerConfig) -> Result<Self, CheckpointError> {
        let dir = dir.into();
        let unwritable = |source: std::io::Error| CheckpointError::Unwritable {
            path: dir.clone(),
            source,
        };
        fs::create_dir_all(&dir).map_err(unwritable)?;
        let probe = dir.join(PROBE_FILE);
        fs::write(&probe, b"ok").map_err(unwritable)?;
        fs::remove_file(&probe).map_err(unwritable)?;
        Ok(CheckpointManager { dir, config })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write every agent's compressed weights plus the training state.
    pub fn save(
        &self,
        agents: &[&dyn TrainableAgent],
        state: &TrainingState,
        kind: CheckpointKind,
    ) -> Result<PathBuf, CheckpointError> {
        let dir_name = match kind {
            CheckpointKind::Periodic => format!("{}{}", STEP_PREFIX, state.global_timesteps),
            CheckpointKind::Final => FINAL_NAME.to_string(),
        };
        let tmp_dir = self.dir.join(format!("{}.tmp", dir_name));
        let final_dir = self.dir.join(&dir_name);

        if tmp_dir.exists() {
            fs::remove_dir_all(&tmp_dir)?;
        }
        fs::create_dir_all(&tmp_dir)?;

        for agent in agents {
            let role = agent.role();
            let weights = agent
                .export_weights()
                .map_err(|source| CheckpointError::WeightExport { role, source })?;
            fs::write(tmp_dir.join(blob_file_name(role)), codec::compress(&weights)?)?;
        }

        let mut state = state.clone();
        state.checkpoint_format = codec::FORMAT.to_string();
        state.timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        fs::write(tmp_dir.join(STATE_FILE), serde_json::to_string_pretty(&state)?)?;

        // Atomic rename
        if final_dir.exists() {
            fs::remove_dir_all(&final_dir)?;
        }
        fs::rename(&tmp_dir, &final_dir)?;

        self.update_latest_symlink(&dir_name)?;
        if kind == CheckpointKind::Periodic {
            self.prune_old_checkpoints()?;
        }

        info!(path = %final_dir.display(), step = state.global_timesteps, "saved checkpoint");
        Ok(final_dir)
    }

    /// Restore agents from a checkpoint directory and return its training state.
    ///
    /// A role without a weight blob keeps its in-memory weights.
    pub fn load(
        &self,
        dir: &Path,
        agents: &mut [&mut dyn TrainableAgent],
    ) -> Result<TrainingState, CheckpointError> {
        if !dir.is_dir() {
            return Err(CheckpointError::DirNotFound(dir.to_path_buf()));
        }
        let state = read_state(dir)?;
        if state.checkpoint_format != codec::FORMAT {
            warn!(
                format = %state.checkpoint_format,
                "unexpected checkpoint format, decoding as {}",
                codec::FORMAT
            );
        }

        for agent in agents.iter_mut() {
            let role = agent.role();
            let path = dir.join(blob_file_name(role));
            if !path.exists() {
                warn!(%role, path = %path.display(), "weight blob missing, keeping current weights");
            } else {
                let packed = fs::read(&path)?;
                let weights = codec::decompress(&packed)
                    .map_err(|source| CheckpointError::Codec { path, source })?;
                agent
                    .import_weights(&weights)
                    .map_err(|source| CheckpointError::WeightImport { role, source })?;
            }
            agent.restore_entropy_coef(*state.entropy_coefs.get(role));
        }

        info!(path = %dir.display(), step = state.global_timesteps, "loaded checkpoint");
        Ok(state)
    }

    /// Directory the `latest` symlink points at.
    pub fn latest(&self) -> Result<PathBuf, CheckpointError> {
        let latest_link = self.dir.join("latest");
        if latest_link.symlink_metadata().is_err() {
            return Err(CheckpointError::DirNotFound(latest_link));
        }
        let resolved = fs::read_link(&latest_link)?;
        Ok(if resolved.is_relative() {
            self.dir.join(resolved)
        } else {
            resolved
        })
    }

    /// Periodic checkpoints sorted by step (ascending).
    pub fn list_checkpoints(&self) -> Result<Vec<(u64, PathBuf)>, CheckpointError> {
        let mut results = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if name_str.ends_with(".tmp") {
                continue;
            }
            if let Some(step) = name_str
                .strip_prefix(STEP_PREFIX)
                .and_then(|s| s.parse::<u64>().ok())
            {
                results.push((step, path));
            }
        }
        results.sort_by_key(|(step, _)| *step);
        Ok(results)
    }

    /// Delete all but the most recent `keep_last_n` periodic checkpoints.
    fn prune_old_checkpoints(&self) -> Result<(), CheckpointError> {
        let checkpoints = self.list_checkpoints()?;
        let excess = checkpoints.len().saturating_sub(self.config.keep_last_n);
        for (step, path) in checkpoints.into_iter().take(excess) {
            fs::remove_dir_all(&path)?;
            info!(step, "pruned checkpoint");
        }
        Ok(())
    }

    /// Update the `latest` symlink to point to the given checkpoint directory name.
    fn update_latest_symlink(&self, dir_name: &str) -> Result<(), CheckpointError> {
        let link_path = self.dir.join("latest");
        if link_path.symlink_metadata().is_ok() {
            fs::remove_file(&link_path)?;
        }
        std::os::unix::fs::symlink(dir_name, &link_path)?;
        Ok(())
    }
}

fn read_state(dir: &Path) -> Result<TrainingState, CheckpointError> {
    let path = dir.join(STATE_FILE);
    let json = fs::read_to_string(&path).map_err(|e| CheckpointError::StateRead {
        path: path.clone(),
        source: e,
    })?;
    serde_json::from_str(&json).map_err(|e| CheckpointError::StateParse { path, source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ImpalaAgent, RoleMap, TrainBackend};
    use crate::checkpoint::metadata::CheckpointMetrics;
    use crate::config::AppConfig;
    use crate::error::AgentError;

    /// Agent whose "weights" are an arbitrary byte string.
    struct BlobAgent {
        role: Role,
        weights: Vec<u8>,
        coef: f32,
    }

    impl BlobAgent {
        fn new(role: Role, weights: &[u8]) -> Self {
            BlobAgent {
                role,
                weights: weights.to_vec(),
                coef: 0.01,
            }
        }
    }

    impl TrainableAgent for BlobAgent {
        fn role(&self) -> Role {
            self.role
        }
        fn export_weights(&self) -> Result<Vec<u8>, AgentError> {
            Ok(self.weights.clone())
        }
        fn import_weights(&mut self, bytes: &[u8]) -> Result<(), AgentError> {
            if bytes.is_empty() {
                return Err(AgentError::Record("empty".into()));
            }
            self.weights = bytes.to_vec();
            Ok(())
        }
        fn entropy_coef(&self) -> f32 {
            self.coef
        }
        fn restore_entropy_coef(&mut self, coef: f32) {
            self.coef = coef;
        }
    }

    fn state(step: u64) -> TrainingState {
        TrainingState {
            global_timesteps: step,
            timestamp: 0,
            checkpoint_format: String::new(),
            entropy_coefs: RoleMap::new(0.007, 0.004),
            versions: RoleMap::default(),
            metrics: CheckpointMetrics::default(),
            config: AppConfig::default(),
        }
    }

    fn manager(dir: &Path, keep_last_n: usize) -> CheckpointManager {
        CheckpointManager::new(dir, CheckpointManagerConfig { keep_last_n }).unwrap()
    }

    #[test]
    fn test_save_layout() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 5);
        let tumor = BlobAgent::new(Role::Tumor, b"tumor-weights");
        let sink = BlobAgent::new(Role::SinkDesigner, b"sink-weights");

        let path = manager
            .save(&[&tumor, &sink], &state(1000), CheckpointKind::Periodic)
            .unwrap();
        assert_eq!(path, dir.path().join("step_1000"));
        assert!(path.join("tumor_agent.bin.gz").exists());
        assert!(path.join("sink_designer_agent.bin.gz").exists());
        assert!(!dir.path().join("step_1000.tmp").exists());

        // Blobs on disk are gzip, not raw weights
        let raw = fs::read(path.join("tumor_agent.bin.gz")).unwrap();
        assert_ne!(raw, b"tumor-weights");
        assert_eq!(codec::decompress(&raw).unwrap(), b"tumor-weights");

        let saved = read_state(&path).unwrap();
        assert_eq!(saved.checkpoint_format, "gzip");
        assert_eq!(saved.global_timesteps, 1000);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 5);
        let tumor = BlobAgent::new(Role::Tumor, b"tumor-v1");
        let sink = BlobAgent::new(Role::SinkDesigner, b"sink-v1");
        let path = manager
            .save(&[&tumor, &sink], &state(2500), CheckpointKind::Periodic)
            .unwrap();

        let mut tumor2 = BlobAgent::new(Role::Tumor, b"fresh");
        let mut sink2 = BlobAgent::new(Role::SinkDesigner, b"fresh");
        let loaded = manager.load(&path, &mut [&mut tumor2, &mut sink2]).unwrap();
        assert_eq!(loaded.global_timesteps, 2500);
        assert_eq!(tumor2.weights, b"tumor-v1");
        assert_eq!(sink2.weights, b"sink-v1");
        assert!((tumor2.coef - 0.007).abs() < 1e-9);
        assert!((sink2.coef - 0.004).abs() < 1e-9);
    }

    #[test]
    fn test_network_weights_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 5);
        let mut config = AppConfig::default();
        config.agent.hidden_dim = 8;
        config.env.obs_dim = 8;
        let source = ImpalaAgent::<TrainBackend>::new(Role::SinkDesigner, &config, Default::default());
        let path = manager.save(&[&source], &state(10), CheckpointKind::Final).unwrap();

        let mut target = ImpalaAgent::<TrainBackend>::new(Role::SinkDesigner, &config, Default::default());
        manager.load(&path, &mut [&mut target]).unwrap();
        assert_eq!(
            source.export_weights().unwrap(),
            target.export_weights().unwrap()
        );
    }

    #[test]
    fn test_missing_blob_keeps_current_weights() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 5);
        let tumor = BlobAgent::new(Role::Tumor, b"tumor-v1");
        let path = manager
            .save(&[&tumor], &state(100), CheckpointKind::Periodic)
            .unwrap();

        let mut tumor2 = BlobAgent::new(Role::Tumor, b"fresh");
        let mut sink2 = BlobAgent::new(Role::SinkDesigner, b"untouched");
        let loaded = manager.load(&path, &mut [&mut tumor2, &mut sink2]).unwrap();
        assert_eq!(loaded.global_timesteps, 100);
        assert_eq!(tumor2.weights, b"tumor-v1");
        assert_eq!(sink2.weights, b"untouched");
    }

    #[test]
    fn test_corrupt_blob_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 5);
        let tumor = BlobAgent::new(Role::Tumor, b"tumor-v1");
        let path = manager
            .save(&[&tumor], &state(100), CheckpointKind::Periodic)
            .unwrap();
        fs::write(path.join(blob_file_name(Role::Tumor)), b"garbage").unwrap();

        let mut tumor2 = BlobAgent::new(Role::Tumor, b"fresh");
        let err = manager.load(&path, &mut [&mut tumor2]).unwrap_err();
        assert!(matches!(err, CheckpointError::Codec { .. }), "got: {err}");
    }

    #[test]
    fn test_rejected_weights_is_import_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 5);
        let empty = BlobAgent::new(Role::SinkDesigner, b"");
        let path = manager
            .save(&[&empty], &state(100), CheckpointKind::Periodic)
            .unwrap();

        let mut sink = BlobAgent::new(Role::SinkDesigner, b"fresh");
        let err = manager.load(&path, &mut [&mut sink]).unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::WeightImport {
                role: Role::SinkDesigner,
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_network_payload_is_import_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 5);
        let mut config = AppConfig::default();
        config.agent.hidden_dim = 8;
        config.env.obs_dim = 8;
        let source = ImpalaAgent::<TrainBackend>::new(Role::Tumor, &config, Default::default());
        let path = manager.save(&[&source], &state(10), CheckpointKind::Periodic).unwrap();
        // Valid gzip around bytes that are not a network record
        fs::write(
            path.join(blob_file_name(Role::Tumor)),
            codec::compress(&[1, 2, 3]).unwrap(),
        )
        .unwrap();

        let mut target = ImpalaAgent::<TrainBackend>::new(Role::Tumor, &config, Default::default());
        let before = target.export_weights().unwrap();
        let err = manager.load(&path, &mut [&mut target]).unwrap_err();
        assert!(matches!(
            err,
            CheckpointError::WeightImport {
                role: Role::Tumor,
                source: AgentError::Record(_),
            }
        ));
        assert_eq!(before, target.export_weights().unwrap());
        assert_eq!(target.version(), 0);
    }

    #[test]
    fn test_load_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 5);
        let err = manager
            .load(&dir.path().join("step_1"), &mut [])
            .unwrap_err();
        assert!(matches!(err, CheckpointError::DirNotFound(_)));
    }

    #[test]
    fn test_list_checkpoints_sorted_numerically() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 10);
        let tumor = BlobAgent::new(Role::Tumor, b"w");
        for step in [900, 10_000, 2000] {
            manager
                .save(&[&tumor], &state(step), CheckpointKind::Periodic)
                .unwrap();
        }
        manager.save(&[&tumor], &state(12_000), CheckpointKind::Final).unwrap();
        fs::create_dir_all(dir.path().join("step_50.tmp")).unwrap();

        let steps: Vec<u64> = manager
            .list_checkpoints()
            .unwrap()
            .into_iter()
            .map(|(s, _)| s)
            .collect();
        assert_eq!(steps, vec![900, 2000, 10_000]);
    }

    #[test]
    fn test_pruning_keeps_last_n_and_final() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 2);
        let tumor = BlobAgent::new(Role::Tumor, b"w");

        manager.save(&[&tumor], &state(50), CheckpointKind::Final).unwrap();
        for step in 1..=5u64 {
            manager
                .save(&[&tumor], &state(step * 100), CheckpointKind::Periodic)
                .unwrap();
        }

        let steps: Vec<u64> = manager
            .list_checkpoints()
            .unwrap()
            .into_iter()
            .map(|(s, _)| s)
            .collect();
        assert_eq!(steps, vec![400, 500]);
        assert!(dir.path().join("final").join(STATE_FILE).exists());
    }

    #[test]
    fn test_latest_symlink() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), 5);
        let tumor = BlobAgent::new(Role::Tumor, b"w");

        assert!(matches!(manager.latest(), Err(CheckpointError::DirNotFound(_))));
        manager.save(&[&tumor], &state(100), CheckpointKind::Periodic).unwrap();
        manager.save(&[&tumor], &state(200), CheckpointKind::Periodic).unwrap();
        assert_eq!(manager.latest().unwrap(), dir.path().join("step_200"));

        manager.save(&[&tumor], &state(250), CheckpointKind::Final).unwrap();
        let latest = manager.latest().unwrap();
        assert_eq!(latest, dir.path().join("final"));
        let mut restored = BlobAgent::new(Role::Tumor, b"fresh");
        assert_eq!(
            manager.load(&latest, &mut [&mut restored]).unwrap().global_timesteps,
            250
        );
    }

    #[test]
    fn test_unwritable_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not_a_dir");
        fs::write(&file, b"x").unwrap();
        let result = CheckpointManager::new(&file, CheckpointManagerConfig::default());
        assert!(matches!(result, Err(CheckpointError::Unwritable { .. })));
    }
}
