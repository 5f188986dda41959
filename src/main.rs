use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use digitd::api;
use digitd::registry::ModelRegistry;
use digitd::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "digitd", version, about = "Handwritten digit recognition service")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:5000")]
    bind: String,

    /// Directory holding the trained model archives.
    #[arg(long, env = "MODELS_DIR", default_value = "models")]
    models_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "digitd=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let registry = ModelRegistry::load(&args.models_dir).with_context(|| {
        format!(
            "loading models from {}",
            args.models_dir.display()
        )
    })?;
    info!("serving models: {:?}", registry.loaded_names());

    let app = api::create_router(AppState {
        registry: Arc::new(registry),
    });

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("binding {}", args.bind))?;
    info!("listening on {}", args.bind);
    axum::serve(listener, app).await?;

    Ok(())
}
