use std::path::PathBuf;

use anyhow::Result;

use crate::api::{self, AppState};
use crate::config::Settings;
use crate::crud::FlashcardStore;
use crate::llm::{Backend, resolve_api_key};
use crate::palette::Palette;
use crate::pipeline::PipelineSettings;

#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub output: Option<PathBuf>,
}

impl ServeArgs {
    pub fn apply(&self, mut settings: Settings) -> Result<Settings> {
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(output) = &self.output {
            settings.output_dir = Some(output.clone());
        }
        settings.validate()?;
        Ok(settings)
    }
}

/// The backend is built without a health check, so the server starts even while the
/// model server is down; `/api/backend/test` reports on it.
pub async fn run(settings: Settings, args: ServeArgs) -> Result<()> {
    let settings = args.apply(settings)?;
    let api_key = resolve_api_key(&settings.backend)?;
    let backend = Backend::from_config(&settings.backend, api_key)?;
    let store = FlashcardStore::new(settings.resolve_output_dir()?, settings.storage_mode);

    println!(
        "{} http://{}:{} {}",
        Palette::paint(Palette::SUCCESS, "Serving on"),
        settings.server.host,
        settings.server.port,
        Palette::dim(format!("(cards in {})", store.output_dir().display()))
    );
    let state = AppState::new(backend, store, PipelineSettings::from(&settings));
    api::serve(state, &settings.server.host, settings.server.port).await
}
