use clap::{Parser, Subcommand};
use culture_sync::apis::{CulturePortalApi, TourApi};
use culture_sync::config::Config;
use culture_sync::enrich::{MediaStore, SupabaseMediaStore};
use culture_sync::pipeline::SyncPipeline;
use culture_sync::storage::storage_from_env;
use culture_sync::translate::{OpenAiTranslator, TranslateApi};
use culture_sync::types::EventSourceApi;
use culture_sync::{logging, metrics, server};
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Parser)]
#[command(name = "culture_sync")]
#[command(about = "Cultural event sync pipeline with multilingual localization")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one blocking sync for the date window
    Sync {
        /// Window start (YYYYMMDD); defaults to one month ago
        #[arg(long)]
        start_date: Option<String>,
        /// Window end (YYYYMMDD); defaults to one month ahead
        #[arg(long)]
        end_date: Option<String>,
        /// Target languages, comma-separated (e.g. ko,en,ja,zh)
        #[arg(long)]
        languages: Option<String>,
    },
    /// Serve the HTTP admin/status surface
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

/// Construct every external collaborator once and hand them to the
/// pipeline. Optional collaborators downgrade to passthrough behavior when
/// their credentials are absent; only the primary source is mandatory.
fn build_pipeline(config: &Config) -> Result<Arc<SyncPipeline>, Box<dyn std::error::Error>> {
    let sources: Vec<Arc<dyn EventSourceApi>> = vec![
        Arc::new(CulturePortalApi::new(&config.portal)?),
        Arc::new(TourApi::new(&config.tour)?),
    ];

    let translator: Option<Arc<dyn TranslateApi>> = OpenAiTranslator::from_env(&config.translator)
        .map(|t| Arc::new(t) as Arc<dyn TranslateApi>);
    if translator.is_none() {
        warn!("OPENAI_API_KEY not set, localized documents will keep source-language text");
    }

    let media: Option<Arc<dyn MediaStore>> =
        SupabaseMediaStore::from_env().map(|m| Arc::new(m) as Arc<dyn MediaStore>);
    if media.is_none() {
        warn!("Media storage not configured, original provider image URLs will be kept");
    }

    let storage = storage_from_env();

    Ok(Arc::new(SyncPipeline::new(
        sources,
        translator,
        media,
        storage,
        config.sync.languages.clone(),
        config.sync.page_size,
    )))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load_or_default();

    match cli.command {
        Commands::Sync {
            start_date,
            end_date,
            languages,
        } => {
            println!("🔄 Running sync pipeline...");
            let pipeline = build_pipeline(&config)?;

            let target_languages = languages
                .map(|list| list.split(',').map(|s| s.trim().to_string()).collect());

            match pipeline
                .run_sync(start_date.as_deref(), end_date.as_deref(), target_languages)
                .await
            {
                Ok(summary) => {
                    println!("\n📊 Sync Results:");
                    println!("   Events found: {}", summary.events_found);
                    println!("   Events processed: {}", summary.events_processed);
                }
                Err(e) => {
                    error!("Sync run failed: {}", e);
                    println!("❌ Sync run failed: {}", e);
                    return Err(e.into());
                }
            }
        }
        Commands::Serve { port } => {
            println!("🚀 Starting sync service...");
            metrics::init_metrics();
            let pipeline = build_pipeline(&config)?;
            server::start_server(pipeline, port).await?;
        }
    }
    Ok(())
}
