//! Picks the deployment workflow for a component kind.

use crate::channel::ChannelClient;
use crate::component::{ComponentKind, DeployableUnit, EntityKind};
use crate::config::Config;
use crate::error::Result;
use crate::pipe::{self, PipeRun};
use crate::promotion::{self, PromotionReport};
use crate::registrar::{RegistrationOptions, Registrar};
use crate::session::{self, PutResult, Session};
use crate::stage;
use crate::streamlit::{self, StreamlitDeployment};
use crate::task::{self, TaskAction, TaskDeployment};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeployOutcome {
    Entity(PromotionReport),
    Streamlit(StreamlitDeployment),
    Task(TaskDeployment),
    Pipe(PipeRun),
}

pub struct DeploymentManager<'a> {
    root: &'a Path,
    config: &'a Config,
}

impl<'a> DeploymentManager<'a> {
    pub fn new(root: &'a Path, config: &'a Config) -> Self {
        Self { root, config }
    }

    /// Deploy one component. `action` only applies to tasks.
    pub fn deploy(
        &self,
        session: &mut dyn Session,
        channel: &mut ChannelClient,
        kind: ComponentKind,
        name: &str,
        action: Option<TaskAction>,
    ) -> Result<DeployOutcome> {
        if action.is_some() && kind != ComponentKind::Task {
            tracing::warn!(%kind, name, "--action only applies to tasks, ignoring");
        }
        match kind {
            ComponentKind::Udf => self
                .deploy_entity(session, channel, EntityKind::Function, name)
                .map(DeployOutcome::Entity),
            ComponentKind::Sproc => self
                .deploy_entity(session, channel, EntityKind::Procedure, name)
                .map(DeployOutcome::Entity),
            ComponentKind::Streamlit => {
                streamlit::deploy_streamlit(session, self.root, self.config, name)
                    .map(DeployOutcome::Streamlit)
            }
            ComponentKind::Task => {
                task::deploy_task(session, self.root, self.config, name, action)
                    .map(DeployOutcome::Task)
            }
            ComponentKind::Pipe => pipe::run_pipe(session, self.root, name).map(DeployOutcome::Pipe),
        }
    }

    /// Check packages against the channel, stage `uploads/`, then promote.
    pub fn deploy_entity(
        &self,
        session: &mut dyn Session,
        channel: &mut ChannelClient,
        kind: EntityKind,
        name: &str,
    ) -> Result<PromotionReport> {
        let unit = DeployableUnit::load(self.root, kind, name, &self.config.stage)?;
        tracing::debug!(packages = ?unit.packages, imports = ?unit.imports, "loaded {kind}");

        tracing::info!(packages = ?unit.package_names(), "checking package availability");
        channel.check(&unit.packages, &self.config.packages.skip_check)?;

        if kind == EntityKind::Procedure {
            stage::upload_component_files(session, unit.dir(), &self.config.stage, name)?;
        }

        let registrar = Registrar::new(RegistrationOptions::from_config(self.config, kind));
        promotion::promote(session, &unit, &registrar)
    }

    /// Upload `static/` to `@<db>.<schema>.<stage>/static`.
    pub fn upload_static(&self, session: &mut dyn Session) -> Result<Vec<PutResult>> {
        let database = session::current_database(session)?;
        let schema = session::current_schema(session)?;
        let target = stage::qualified_stage(&database, &schema, &self.config.stage);
        stage::upload_static(session, self.root, &target)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SnowdevError;
    use crate::promotion::Phase;
    use crate::session::fake::{scalar_row, FakePlatform};
    use tempfile::TempDir;

    const MANIFEST: &str = "[tool.poetry.dependencies]\npython = \"^3.10\"\npandas = \"1.5.3\"\n";

    fn channel(server: &mut mockito::Server) -> ChannelClient {
        server
            .mock("GET", "/channeldata.json")
            .with_status(200)
            .with_body(r#"{"packages": {"pandas": {}}}"#)
            .create();
        ChannelClient::new(&server.url()).unwrap()
    }

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let udf = dir.path().join("src/udf/score");
        std::fs::create_dir_all(&udf).unwrap();
        std::fs::write(udf.join("app.py"), "def handler(x: float) -> float:\n    return x\n").unwrap();
        std::fs::write(udf.join("app.toml"), MANIFEST).unwrap();

        let sproc = dir.path().join("src/sproc/train");
        std::fs::create_dir_all(sproc.join("uploads")).unwrap();
        std::fs::write(
            sproc.join("app.py"),
            "def handler(session: Session) -> str:\n    return 'ok'\n",
        )
        .unwrap();
        std::fs::write(sproc.join("uploads/model.pkl"), b"\x00").unwrap();
        dir
    }

    #[test]
    fn function_is_promoted() {
        let dir = project();
        let config = Config::new("p");
        let mut server = mockito::Server::new();
        let mut channel = channel(&mut server);
        let mut platform = FakePlatform::new();

        let outcome = DeploymentManager::new(dir.path(), &config)
            .deploy(&mut platform, &mut channel, ComponentKind::Udf, "score", None)
            .unwrap();

        match outcome {
            DeployOutcome::Entity(report) => assert_eq!(report.phase, Phase::Done),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(platform.entities["SCORE"], "SCORE(FLOAT) RETURN FLOAT");
        let create = &platform.statements_starting_with("CREATE OR REPLACE FUNCTION")[0];
        assert!(create.contains("PACKAGES = ('pandas==1.5.3')"));
    }

    #[test]
    fn unavailable_package_stops_before_platform() {
        let dir = project();
        std::fs::write(
            dir.path().join("src/udf/score/app.toml"),
            "[tool.poetry.dependencies]\nleft-pad = \"*\"\n",
        )
        .unwrap();
        let config = Config::new("p");
        let mut server = mockito::Server::new();
        let mut channel = channel(&mut server);
        let mut platform = FakePlatform::new();

        let err = DeploymentManager::new(dir.path(), &config)
            .deploy(&mut platform, &mut channel, ComponentKind::Udf, "score", None)
            .unwrap_err();
        assert!(matches!(err, SnowdevError::PackagesUnavailable(ref p) if p == &["left-pad"]));
        assert!(platform.log.is_empty());
        assert!(platform.puts.is_empty());
    }

    #[test]
    fn skip_check_allows_private_packages() {
        let dir = project();
        std::fs::write(
            dir.path().join("src/udf/score/app.toml"),
            "[tool.poetry.dependencies]\nleft-pad = \"*\"\n",
        )
        .unwrap();
        let mut config = Config::new("p");
        config.packages.skip_check = vec!["left-pad".to_string()];
        let mut server = mockito::Server::new();
        let mut channel = channel(&mut server);

        DeploymentManager::new(dir.path(), &config)
            .deploy(&mut FakePlatform::new(), &mut channel, ComponentKind::Udf, "score", None)
            .unwrap();
    }

    #[test]
    fn procedure_uploads_then_promotes_as_caller() {
        let dir = project();
        let config = Config::new("p");
        let mut server = mockito::Server::new();
        let mut channel = channel(&mut server);
        let mut platform = FakePlatform::new();

        DeploymentManager::new(dir.path(), &config)
            .deploy(&mut platform, &mut channel, ComponentKind::Sproc, "train", None)
            .unwrap();

        assert_eq!(platform.puts[0].1, "@SNOWDEV/train");
        assert_eq!(platform.puts[1].1, "@SNOWDEV/sproc/temp/temp_train");
        let create = &platform.statements_starting_with("CREATE OR REPLACE PROCEDURE")[0];
        assert!(create.ends_with("EXECUTE AS CALLER"));
        assert!(create.contains("'snowflake-snowpark-python'"));
    }

    #[test]
    fn missing_component() {
        let dir = project();
        let config = Config::new("p");
        let mut server = mockito::Server::new();
        let mut channel = channel(&mut server);
        let err = DeploymentManager::new(dir.path(), &config)
            .deploy(&mut FakePlatform::new(), &mut channel, ComponentKind::Udf, "nope", None)
            .unwrap_err();
        assert!(matches!(err, SnowdevError::ComponentNotFound { .. }));
    }

    #[test]
    fn upload_static_targets_qualified_stage() {
        let dir = project();
        std::fs::create_dir_all(dir.path().join("static/packages")).unwrap();
        std::fs::write(dir.path().join("static/packages/lib.zip"), b"zip").unwrap();
        let config = Config::new("p");
        let mut platform = FakePlatform::new()
            .with_rows("SELECT current_database()", vec![scalar_row("ANALYTICS")])
            .with_rows("SELECT current_schema()", vec![scalar_row("PUBLIC")]);

        let results = DeploymentManager::new(dir.path(), &config)
            .upload_static(&mut platform)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(platform.puts[0].1, "@ANALYTICS.PUBLIC.SNOWDEV/static/packages");
    }
}
