//! Shadow-then-promote replacement of a function or procedure.
//!
//! The unit is first registered under a temporary shadow name. Only if that
//! succeeds is the production name replaced. The shadow is dropped afterwards
//! (or after a failed replacement) when its argument signature is known,
//! since the platform needs the full signature to drop an overloaded name.
//! A dropped shadow's staged files are removed too. Every step runs in the
//! one platform session, where the temporary shadow lives.
//!
//! Phase transitions:
//!
//! ```text
//! Start -> ShadowRegistering -> SignatureExtraction -> MainRegistering -> CleaningUp -> Done
//!                  |                                        |
//!                  v                                        v
//!               Aborted <------------------------------ RollingBack
//! ```

use crate::component::{DeployableUnit, EntityKind};
use crate::error::Result;
use crate::inspector;
use crate::registrar::{shadow_name, Registrar};
use crate::session::Session;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    ShadowRegistering,
    SignatureExtraction,
    MainRegistering,
    RollingBack,
    CleaningUp,
    Done,
    Aborted,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::ShadowRegistering => "shadow_registering",
            Phase::SignatureExtraction => "signature_extraction",
            Phase::MainRegistering => "main_registering",
            Phase::RollingBack => "rolling_back",
            Phase::CleaningUp => "cleaning_up",
            Phase::Done => "done",
            Phase::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Aborted)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationAttempt {
    pub entity_name: String,
    pub is_temporary: bool,
    pub succeeded: bool,
    /// Argument types as reported by the platform. Shadows only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromotionReport {
    pub target: String,
    pub kind: EntityKind,
    pub phase: Phase,
    pub attempts: Vec<RegistrationAttempt>,
    pub shadow_dropped: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PromotionReport {
    /// The shadow survived the run and has to be dropped by hand.
    pub fn shadow_left_behind(&self) -> bool {
        !self.shadow_dropped && self.attempts.iter().any(|a| a.is_temporary && a.succeeded)
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

struct Promotion {
    report: PromotionReport,
}

impl Promotion {
    fn new(unit: &DeployableUnit) -> Self {
        let now = Utc::now();
        Self {
            report: PromotionReport {
                target: unit.name.clone(),
                kind: unit.kind,
                phase: Phase::Start,
                attempts: Vec::new(),
                shadow_dropped: false,
                started_at: now,
                finished_at: now,
            },
        }
    }

    fn enter(&mut self, next: Phase) {
        tracing::debug!(
            target_entity = %self.report.target,
            from = %self.report.phase,
            to = %next,
            "promotion phase"
        );
        self.report.phase = next;
        if next.is_terminal() {
            self.report.finished_at = Utc::now();
        }
    }

    fn record(&mut self, entity_name: &str, is_temporary: bool, succeeded: bool, signature: Option<String>) {
        self.report.attempts.push(RegistrationAttempt {
            entity_name: entity_name.to_string(),
            is_temporary,
            succeeded,
            signature,
        });
    }
}

/// Replace `unit` in production through a temporary shadow.
///
/// On failure the error of the failing registration is returned unchanged,
/// after a best-effort drop of the shadow.
pub fn promote(
    session: &mut dyn Session,
    unit: &DeployableUnit,
    registrar: &Registrar,
) -> Result<PromotionReport> {
    let kind = unit.kind;
    let shadow = shadow_name(&unit.name);
    let mut run = Promotion::new(unit);

    run.enter(Phase::ShadowRegistering);
    tracing::info!(entity = %shadow, %kind, "registering shadow");
    if let Err(e) = registrar.register(session, unit, &shadow, true) {
        run.record(&shadow, true, false, None);
        run.enter(Phase::Aborted);
        tracing::error!(entity = %shadow, error = %e, "shadow registration failed, production untouched");
        return Err(e);
    }

    run.enter(Phase::SignatureExtraction);
    let signature = inspector::entity_signature(session, &shadow, kind);
    if signature.is_none() {
        tracing::warn!(entity = %shadow, "shadow signature unknown, it will not be dropped");
    }
    run.record(&shadow, true, true, signature.clone());

    run.enter(Phase::MainRegistering);
    tracing::info!(entity = %unit.name, %kind, "replacing production");
    if let Err(e) = registrar.register(session, unit, &unit.name, false) {
        run.record(&unit.name, false, false, None);
        run.enter(Phase::RollingBack);
        tracing::error!(entity = %unit.name, error = %e, "production registration failed");
        if drop_shadow(session, &shadow, signature.as_deref(), kind) {
            registrar.unstage_temporary(session, unit, &shadow);
        }
        run.enter(Phase::Aborted);
        return Err(e);
    }
    run.record(&unit.name, false, true, None);

    run.enter(Phase::CleaningUp);
    run.report.shadow_dropped = drop_shadow(session, &shadow, signature.as_deref(), kind);
    if run.report.shadow_dropped {
        registrar.unstage_temporary(session, unit, &shadow);
    }

    run.enter(Phase::Done);
    tracing::info!(entity = %unit.name, %kind, "deployed");
    Ok(run.report)
}

/// Returns true if the shadow was dropped. Never fails.
fn drop_shadow(
    session: &mut dyn Session,
    shadow: &str,
    signature: Option<&str>,
    kind: EntityKind,
) -> bool {
    let Some(signature) = signature else {
        return false;
    };
    if !inspector::entity_exists(session, shadow, kind) {
        tracing::debug!(entity = shadow, "shadow not found, nothing to drop");
        return false;
    }
    match inspector::drop_entity(session, shadow, signature, kind) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(entity = shadow, error = %e, "failed to drop shadow");
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SnowdevError;
    use crate::registrar::RegistrationOptions;
    use crate::session::fake::FakePlatform;
    use std::path::Path;
    use tempfile::TempDir;

    const UDF_SRC: &str = "def handler() -> str:\n    return 'ok'\n";
    const SPROC_SRC: &str = "from snowflake.snowpark import Session\n\n\
                             def handler(session: Session, day: str) -> str:\n    return day\n";

    fn unit(dir: &Path, kind: EntityKind, name: &str, source: &str) -> DeployableUnit {
        let path = dir.join(format!("{name}.py"));
        std::fs::write(&path, source).unwrap();
        DeployableUnit {
            kind,
            name: name.to_string(),
            source: path,
            packages: vec!["pandas".to_string()],
            imports: Vec::new(),
            stage: "SNOWDEV".to_string(),
        }
    }

    fn registrar() -> Registrar {
        Registrar::new(RegistrationOptions {
            python_runtime: "3.10".to_string(),
            execute_as: None,
        })
    }

    #[test]
    fn happy_path_drops_shadow_with_empty_signature() {
        let dir = TempDir::new().unwrap();
        let f = unit(dir.path(), EntityKind::Function, "F", UDF_SRC);
        let mut platform = FakePlatform::new();

        let report = promote(&mut platform, &f, &registrar()).unwrap();

        assert_eq!(report.phase, Phase::Done);
        assert!(report.shadow_dropped);
        assert!(!report.shadow_left_behind());
        assert!(platform.exists("F"));
        assert!(!platform.exists("temp_F"));
        assert_eq!(platform.statements_starting_with("DROP"), vec!["DROP FUNCTION temp_F()"]);

        let creates = platform.statements_starting_with("CREATE");
        assert!(creates[0].starts_with("CREATE TEMPORARY FUNCTION temp_F("));
        assert!(creates[1].starts_with("CREATE OR REPLACE FUNCTION F("));

        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.attempts[0].entity_name, "temp_F");
        assert_eq!(report.attempts[0].signature.as_deref(), Some(""));
        assert!(report.attempts[1].succeeded && !report.attempts[1].is_temporary);
        assert!(report.finished_at >= report.started_at);
    }

    #[test]
    fn main_failure_drops_shadow_and_returns_original_error() {
        let dir = TempDir::new().unwrap();
        let f = unit(dir.path(), EntityKind::Function, "F", UDF_SRC);
        let mut platform = FakePlatform::new();
        platform
            .entities
            .insert("F".to_string(), "F(NUMBER) RETURN NUMBER".to_string());
        platform
            .fail_create
            .insert("F".to_string(), "package unavailable".to_string());

        let err = promote(&mut platform, &f, &registrar()).unwrap_err();

        match err {
            SnowdevError::Platform { message, .. } => assert_eq!(message, "package unavailable"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!platform.exists("temp_F"));
        assert_eq!(platform.statements_starting_with("DROP"), vec!["DROP FUNCTION temp_F()"]);
        assert_eq!(platform.statements_starting_with("REMOVE").len(), 1);
        assert_eq!(platform.entities["F"], "F(NUMBER) RETURN NUMBER");
    }

    #[test]
    fn shadow_is_gone_before_the_session_ends() {
        let dir = TempDir::new().unwrap();
        let f = unit(dir.path(), EntityKind::Function, "F", UDF_SRC);
        let mut platform = FakePlatform::new();

        let report = promote(&mut platform, &f, &registrar()).unwrap();
        assert!(!report.shadow_left_behind());
        assert_eq!(platform.statements_starting_with("DROP"), vec!["DROP FUNCTION temp_F()"]);
        assert!(!platform.exists("temp_F"));

        platform.end_session();
        assert!(platform.exists("F"));
        assert_eq!(platform.entities.keys().collect::<Vec<_>>(), vec!["F"]);
    }

    #[test]
    fn dropped_shadow_files_are_unstaged() {
        let dir = TempDir::new().unwrap();
        let f = unit(dir.path(), EntityKind::Function, "F", UDF_SRC);
        let mut platform = FakePlatform::new();

        promote(&mut platform, &f, &registrar()).unwrap();
        assert_eq!(
            platform.statements_starting_with("REMOVE"),
            vec!["REMOVE @SNOWDEV/udf/temp/temp_F/"]
        );
        assert!(platform.puts.iter().any(|(_, target)| target == "@SNOWDEV/udf/temp/temp_F"));
    }

    #[test]
    fn unstage_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let f = unit(dir.path(), EntityKind::Function, "F", UDF_SRC);
        let mut platform = FakePlatform::new().failing_on("REMOVE", "stage locked");

        let report = promote(&mut platform, &f, &registrar()).unwrap();
        assert_eq!(report.phase, Phase::Done);
        assert!(report.shadow_dropped);
    }

    #[test]
    fn unknown_signature_leaves_shadow_in_place() {
        let dir = TempDir::new().unwrap();
        let p = unit(dir.path(), EntityKind::Procedure, "P", SPROC_SRC);
        let mut platform = FakePlatform::new();
        platform.fail_show.insert("TEMP_P".to_string());

        let report = promote(&mut platform, &p, &registrar()).unwrap();

        assert_eq!(report.phase, Phase::Done);
        assert!(!report.shadow_dropped);
        assert!(report.shadow_left_behind());
        assert!(platform.exists("P"));
        assert!(platform.exists("temp_P"));
        assert!(platform.statements_starting_with("DROP").is_empty());
        assert!(platform.statements_starting_with("REMOVE").is_empty());
        assert_eq!(platform.entities["P"], "P(STRING) RETURN STRING");
    }

    #[test]
    fn procedure_shadow_dropped_with_typed_signature() {
        let dir = TempDir::new().unwrap();
        let p = unit(dir.path(), EntityKind::Procedure, "P", SPROC_SRC);
        let mut platform = FakePlatform::new();

        promote(&mut platform, &p, &registrar()).unwrap();

        assert_eq!(
            platform.statements_starting_with("DROP"),
            vec!["DROP PROCEDURE temp_P(STRING)"]
        );
    }

    #[test]
    fn shadow_failure_never_touches_production() {
        let dir = TempDir::new().unwrap();
        let f = unit(dir.path(), EntityKind::Function, "F", UDF_SRC);
        let mut platform = FakePlatform::new();
        platform
            .fail_create
            .insert("TEMP_F".to_string(), "invalid handler".to_string());

        assert!(promote(&mut platform, &f, &registrar()).is_err());
        assert!(platform.statements_starting_with("CREATE OR REPLACE").is_empty());
        assert!(platform.statements_starting_with("DROP").is_empty());
        assert!(platform.puts.iter().all(|(_, target)| target.contains("/temp/")));
        assert!(!platform.exists("F"));
    }

    #[test]
    fn rollback_without_signature_skips_drop() {
        let dir = TempDir::new().unwrap();
        let f = unit(dir.path(), EntityKind::Function, "F", UDF_SRC);
        let mut platform = FakePlatform::new();
        platform.fail_show.insert("TEMP_F".to_string());
        platform.fail_create.insert("F".to_string(), "quota".to_string());

        assert!(promote(&mut platform, &f, &registrar()).is_err());
        assert!(platform.statements_starting_with("DROP").is_empty());
        assert!(platform.exists("temp_F"));
    }

    #[test]
    fn cleanup_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let f = unit(dir.path(), EntityKind::Function, "F", UDF_SRC);
        let mut platform = FakePlatform::new();
        platform.fail_drop = true;

        let report = promote(&mut platform, &f, &registrar()).unwrap();
        assert_eq!(report.phase, Phase::Done);
        assert!(!report.shadow_dropped);
        assert!(platform.exists("F"));
    }

    #[test]
    fn promoting_twice_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let f = unit(dir.path(), EntityKind::Function, "F", UDF_SRC);
        let mut platform = FakePlatform::new();

        promote(&mut platform, &f, &registrar()).unwrap();
        let first = platform.entities.clone();
        promote(&mut platform, &f, &registrar()).unwrap();

        assert_eq!(platform.entities, first);
        assert_eq!(platform.statements_starting_with("DROP").len(), 2);
    }

    #[test]
    fn report_serializes_phase_names() {
        let dir = TempDir::new().unwrap();
        let f = unit(dir.path(), EntityKind::Function, "F", UDF_SRC);
        let mut platform = FakePlatform::new();
        let report = promote(&mut platform, &f, &registrar()).unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["phase"], "done");
        assert_eq!(json["kind"], "function");
        assert_eq!(json["attempts"][0]["signature"], "");
        assert!(json["attempts"][1].get("signature").is_none());
    }
}
