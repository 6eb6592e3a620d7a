use serde::{Deserialize, Serialize};
use tracing::debug;

use agora_types::Entity;

use crate::error::{GateError, GateResult};

/// The single gate every fetched or locally authored entity passes before
/// merge: ok, or a rejection with a reason.
///
/// Implementations cover bounds, fingerprint recomputation, proof-of-work
/// and signature checks, versioned per entity schema. The full
/// cryptographic implementations live outside this workspace; [`GatePipeline`]
/// composes whatever stages are installed.
pub trait EntityVerifier: Send + Sync {
    fn verify(&self, entity: &Entity) -> GateResult<()>;

    /// Stage name for logs and reports.
    fn name(&self) -> &'static str;
}

/// Accepts everything. Used by tests and by single-node setups where
/// verification is disabled by configuration.
pub struct PermissiveGate;

impl EntityVerifier for PermissiveGate {
    fn verify(&self, _entity: &Entity) -> GateResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "permissive"
    }
}

/// Configuration for the locally owned structural stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateConfig {
    /// Ceiling on any single text field, in bytes.
    pub max_field_bytes: usize,
    /// When `true`, the pipeline accepts everything without running stages.
    pub permissive: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_field_bytes: 65_536,
            permissive: false,
        }
    }
}

/// Structural bounds checks: identity columns present, text fields under
/// the configured ceiling. This is the only stage implemented locally.
pub struct FieldBoundsGate {
    config: GateConfig,
}

impl FieldBoundsGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    fn check_len(&self, field: &str, value: &str) -> GateResult<()> {
        if value.len() > self.config.max_field_bytes {
            return Err(GateError::Bounds(format!(
                "{field} is {} bytes (ceiling {})",
                value.len(),
                self.config.max_field_bytes
            )));
        }
        Ok(())
    }
}

impl EntityVerifier for FieldBoundsGate {
    fn verify(&self, entity: &Entity) -> GateResult<()> {
        if !entity.identity_present() {
            return Err(GateError::Bounds("identity columns empty".into()));
        }
        match entity {
            Entity::Board(b) => {
                self.check_len("name", &b.name)?;
                self.check_len("description", &b.description)?;
            }
            Entity::Thread(t) => {
                self.check_len("name", &t.name)?;
                self.check_len("body", &t.body)?;
                self.check_len("link", &t.link)?;
            }
            Entity::Post(p) => self.check_len("body", &p.body)?,
            Entity::Key(k) => {
                self.check_len("key", &k.key)?;
                self.check_len("info", &k.info)?;
            }
            Entity::Vote(_) | Entity::Truststate(_) => {}
            Entity::Address(a) => self.check_len("location", &a.location)?,
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "field-bounds"
    }
}

/// Fail-fast composition of verifier stages.
///
/// The first stage that rejects stops evaluation. An empty pipeline (or a
/// permissive config) accepts everything, which is how deployments plug the
/// external cryptographic chain in: install it as a stage.
pub struct GatePipeline {
    stages: Vec<Box<dyn EntityVerifier>>,
    permissive: bool,
}

impl GatePipeline {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            stages: Vec::new(),
            permissive: config.permissive,
        }
    }

    /// The standard local pipeline: bounds only; cryptographic stages are
    /// installed by the embedding process.
    pub fn with_default_stages(config: GateConfig) -> Self {
        let permissive = config.permissive;
        Self {
            stages: vec![Box::new(FieldBoundsGate::new(config))],
            permissive,
        }
    }

    pub fn add_stage(&mut self, stage: Box<dyn EntityVerifier>) {
        self.stages.push(stage);
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

impl EntityVerifier for GatePipeline {
    fn verify(&self, entity: &Entity) -> GateResult<()> {
        if self.permissive {
            return Ok(());
        }
        for stage in &self.stages {
            if let Err(err) = stage.verify(entity) {
                debug!(stage = stage.name(), %err, "entity rejected");
                return Err(err);
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "pipeline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::{Board, Fingerprint, Post, Timestamp};

    fn board() -> Entity {
        Entity::Board(Board {
            fingerprint: Fingerprint::new("b1"),
            name: "rust".into(),
            creation: Timestamp::new(1),
            ..Default::default()
        })
    }

    #[test]
    fn permissive_gate_accepts_anything() {
        let empty = Entity::Post(Post::default());
        assert!(PermissiveGate.verify(&empty).is_ok());
    }

    #[test]
    fn bounds_gate_rejects_empty_identity() {
        let gate = FieldBoundsGate::new(GateConfig::default());
        let err = gate.verify(&Entity::Post(Post::default())).unwrap_err();
        assert!(matches!(err, GateError::Bounds(_)));
        assert!(gate.verify(&board()).is_ok());
    }

    #[test]
    fn bounds_gate_rejects_oversize_fields() {
        // The fixture's name is 4 bytes; a 3-byte ceiling must reject it.
        let gate = FieldBoundsGate::new(GateConfig {
            max_field_bytes: 3,
            permissive: false,
        });
        let err = gate.verify(&board()).unwrap_err();
        assert!(matches!(err, GateError::Bounds(_)));
    }

    #[test]
    fn bounds_gate_accepts_fields_exactly_at_the_ceiling() {
        let gate = FieldBoundsGate::new(GateConfig {
            max_field_bytes: 4,
            permissive: false,
        });
        assert!(gate.verify(&board()).is_ok());
    }

    #[test]
    fn pipeline_is_fail_fast() {
        struct AlwaysReject;
        impl EntityVerifier for AlwaysReject {
            fn verify(&self, _: &Entity) -> GateResult<()> {
                Err(GateError::Signature("nope".into()))
            }
            fn name(&self) -> &'static str {
                "always-reject"
            }
        }

        let mut pipeline = GatePipeline::with_default_stages(GateConfig::default());
        pipeline.add_stage(Box::new(AlwaysReject));
        let err = pipeline.verify(&board()).unwrap_err();
        assert!(matches!(err, GateError::Signature(_)));
    }

    #[test]
    fn permissive_pipeline_skips_stages() {
        let mut config = GateConfig::default();
        config.permissive = true;
        let mut pipeline = GatePipeline::with_default_stages(config);
        pipeline.add_stage(Box::new(FieldBoundsGate::new(GateConfig::default())));
        // Would fail bounds (empty identity) if stages ran.
        assert!(pipeline.verify(&Entity::Post(Post::default())).is_ok());
    }
}
