use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use craft_warden::ServerWrapper;
use craft_warden::console::ChatKind;
use craft_warden::error::Result;
use craft_warden::server::{ConfigurationRequired, SessionObserver};
use craft_warden::version::{InstanceStore, ServerType, VersionCatalog, VersionDescriptor};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{EnvFilter, fmt};

/// Catalog that knows a single, pre-downloaded jar.
struct SingleVersion(VersionDescriptor);

#[async_trait]
impl VersionCatalog for SingleVersion {
    async fn find_current(&self, server_type: ServerType) -> Result<Option<VersionDescriptor>> {
        Ok((self.0.server_type == server_type).then(|| self.0.clone()))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<VersionDescriptor>> {
        Ok((self.0.id == id).then(|| self.0.clone()))
    }

    async fn find_by_name(
        &self,
        server_type: ServerType,
        version_name: &str,
    ) -> Result<Option<VersionDescriptor>> {
        Ok((self.0.server_type == server_type && self.0.version_name == version_name)
            .then(|| self.0.clone()))
    }

    async fn record(
        &self,
        server_type: ServerType,
        version_name: &str,
        release_timestamp: DateTime<Utc>,
    ) -> Result<VersionDescriptor> {
        Ok(VersionDescriptor {
            id: self.0.id + 1,
            version_name: version_name.to_string(),
            server_type,
            release_timestamp,
        })
    }
}

#[derive(Default)]
struct MemoryStore(Mutex<Option<i64>>);

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn save_current_version(&self, version_id: i64) -> Result<()> {
        *self.0.lock().unwrap() = Some(version_id);
        Ok(())
    }
}

/// Prints what happens on the server.
struct Console;

#[async_trait]
impl SessionObserver for Console {
    async fn chat(&self, _kind: &ChatKind, user: &str, text: &str) {
        println!("<{}> {}", user, text);
    }

    async fn player_logged_in(&self, user: &str, external_id: Option<&str>) {
        println!("{} joined ({})", user, external_id.unwrap_or("offline"));
    }

    async fn player_logged_out(&self, user: &str) {
        println!("{} left", user);
    }

    async fn configuration_required(&self, reason: ConfigurationRequired) {
        println!("Server needs attention: {:?}", reason);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG=craft_warden=debug,console=info shows lifecycle and console records
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demos/survival.yaml".to_string());
    let mut config = craft_warden::Config::from_file(&config_path)
        .with_context(|| format!("loading {}", config_path))?;

    // The jar is expected at <artifactDir>/release_1.jar
    config.current_version_id = Some(1);
    let catalog = SingleVersion(VersionDescriptor {
        id: 1,
        version_name: "1.21.4".to_string(),
        server_type: config.server.server_type,
        release_timestamp: Utc::now(),
    });

    let wrapper = ServerWrapper::new(
        config,
        Arc::new(catalog),
        Arc::new(MemoryStore::default()),
        Arc::new(Console),
    )
    .await?;

    wrapper.accept_eula().await?;
    wrapper.start().await.context("starting server")?;
    println!("Server is {:?}, press Ctrl-C to stop", wrapper.status());

    tokio::signal::ctrl_c().await?;

    wrapper.stop(false).await?;
    for event in wrapper.supervisor().lifecycle().get_all_events(None)? {
        println!("{:?} {:?}", event.event, event.details);
    }

    Ok(())
}
