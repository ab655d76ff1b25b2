use super::ComponentArgs;
use crate::output::print_json;
use anyhow::Context;
use snowdev_core::channel::ChannelClient;
use snowdev_core::deploy::{DeployOutcome, DeploymentManager};
use snowdev_core::promotion::{Phase, PromotionReport};
use snowdev_core::task::TaskAction;
use std::path::Path;

pub fn run(
    root: &Path,
    args: &ComponentArgs,
    action: Option<TaskAction>,
    json: bool,
) -> anyhow::Result<()> {
    let (kind, name) = args.selected()?;
    let config = super::load_config(root)?;
    let mut connection = super::connect()?;
    let mut channel = ChannelClient::new(&config.channel.url)?;

    tracing::info!(%kind, name, "deploying");
    let outcome =
        DeploymentManager::new(root, &config).deploy(&mut connection, &mut channel, kind, name, action);
    super::disconnect(connection);
    let outcome =
        outcome.with_context(|| format!("failed to deploy {} '{name}'", kind.label()))?;

    if json {
        return print_json(&outcome);
    }
    match &outcome {
        DeployOutcome::Entity(report) => print_promotion(report),
        DeployOutcome::Streamlit(app) => {
            println!("Deployed Streamlit app \"{}\"", app.display_name);
            println!("  root:      {}", app.root_location);
            println!("  warehouse: {}", app.warehouse);
            println!("  files:     {}", app.files.len());
        }
        DeployOutcome::Task(task) => {
            println!("Deployed task '{}' ({} statements)", task.name, task.statements.len());
            if let Some(action) = task.action {
                println!("  action: {action}");
            }
        }
        DeployOutcome::Pipe(pipe) => {
            println!("Ran pipe '{}' ({} statements)", pipe.name, pipe.statements.len());
        }
    }
    Ok(())
}

fn print_promotion(report: &PromotionReport) {
    if report.phase == Phase::Done {
        println!("Promoted {} '{}'", report.kind, report.target);
    } else {
        println!("{} '{}' ended in phase {}", report.kind, report.target, report.phase);
    }
    for attempt in &report.attempts {
        let label = if attempt.is_temporary { "shadow" } else { "main" };
        let result = if attempt.succeeded { "ok" } else { "failed" };
        match &attempt.signature {
            Some(sig) => println!("  {label:<7}{} {result} ({sig})", attempt.entity_name),
            None => println!("  {label:<7}{} {result}", attempt.entity_name),
        }
    }
    if report.shadow_left_behind() {
        println!("  note: shadow was not dropped; remove it manually if it still exists");
    }
}
