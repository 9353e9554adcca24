//! Replicate subcommand - create an element from a template in a fixture.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{eyre, WrapErr};
use serde::Serialize;

use crate::config::Config;
use crate::context::Context;
use crate::models::Entity;
use crate::repositories::{Fixture, InMemoryRepository};
use crate::services::{PlaceholderMap, TemplateHandler, TemplateOutcome, TemplateRequest};

/// Replicate a template held in a JSON repository fixture.
#[derive(Parser)]
pub struct ReplicateCommand {
    /// JSON file with the types, entities and relationships to load.
    #[arg(long)]
    pub fixture: PathBuf,

    /// GUID of the template entity.
    #[arg(long)]
    pub template: String,

    /// User the replication runs as.
    #[arg(long, default_value = "cli")]
    pub user: String,

    /// Qualified name of the new element.
    #[arg(long)]
    pub qualified_name: Option<String>,

    /// Type the template must be an instance of.
    #[arg(long = "type")]
    pub type_name: Option<String>,

    /// Copy everything anchored to the template, not just the template entity.
    #[arg(long)]
    pub deep: bool,

    /// Mark the new element as a template substitute.
    #[arg(long)]
    pub as_substitute: bool,

    /// Placeholder value, as KEY=VALUE. May be repeated.
    #[arg(long = "placeholder", value_parser = parse_key_value)]
    pub placeholders: Vec<(String, String)>,

    /// Property set on the new element, as KEY=VALUE. May be repeated.
    #[arg(long = "property", value_parser = parse_key_value)]
    pub properties: Vec<(String, String)>,
}

/// What the command prints.
#[derive(Serialize)]
struct ReplicateReport {
    outcome: TemplateOutcome,
    entities: Vec<Entity>,
}

impl ReplicateCommand {
    /// Run the replicate command.
    pub async fn run(self, config: Config) -> color_eyre::Result<()> {
        let content = std::fs::read_to_string(&self.fixture)
            .wrap_err_with(|| format!("Failed to read {}", self.fixture.display()))?;
        let fixture: Fixture = serde_json::from_str(&content)
            .wrap_err_with(|| format!("Failed to parse {}", self.fixture.display()))?;

        let repo = Arc::new(InMemoryRepository::from_fixture(fixture)?);
        tracing::info!(
            entities = repo.entities().len(),
            relationships = repo.relationships().len(),
            "Loaded repository fixture"
        );

        let ctx = Context::new(repo.clone(), config);
        let handler: TemplateHandler = ctx.resolve();

        let mut request = TemplateRequest::new(&self.template)
            .deep_copy(self.deep)
            .as_substitute(self.as_substitute)
            .with_placeholders(self.placeholders.into_iter().collect::<PlaceholderMap>());
        if let Some(name) = &self.qualified_name {
            request = request.with_unique_key(name);
        }
        if let Some(type_name) = &self.type_name {
            request = request.with_type_hint(type_name);
        }
        for (name, value) in &self.properties {
            request = request.with_property(name, value.as_str());
        }

        let outcome = handler.replicate(&self.user, request).await.map_err(|e| {
            tracing::error!(error = %e, code = e.code(), "Replication failed");
            eyre!("Replication failed: {}", e)
        })?;

        let entities = outcome
            .copies
            .iter()
            .filter_map(|copy| repo.entity(&copy.guid))
            .collect();
        let report = ReplicateReport { outcome, entities };
        println!("{}", serde_json::to_string_pretty(&report)?);

        Ok(())
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{}`", s))?;
    if key.is_empty() {
        return Err(format!("empty key in `{}`", s));
    }
    Ok((key.to_string(), value.to_string()))
}
