use actix_cors::Cors;
use actix_files::{Files, NamedFile};
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;

use autopatch_backend::ai::OpenAIClient;
use autopatch_backend::browser::create_launcher;
use autopatch_backend::config::Config;
use autopatch_backend::controllers;
use autopatch_backend::crew::{load_agent_presets, AgentFactory};
use autopatch_backend::gateway::{self, EventBroadcaster};
use autopatch_backend::scan::ScanManager;
use autopatch_backend::tools;
use autopatch_backend::AppState;

/// Serve the UI's index.html for unknown paths
async fn index_fallback(static_dir: web::Data<PathBuf>) -> actix_web::Result<NamedFile> {
    Ok(NamedFile::open(static_dir.join("index.html"))?)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::other(e)
    })?;
    let port = config.port;

    if config.llm.api_key.is_empty() {
        log::warn!("OPENROUTER_API_KEY is not set; scans will fail at the first model call");
    }

    log::info!("Using config directory: {:?}", config.config_dir);
    let presets = load_agent_presets(&config.config_dir);

    log::info!("Initializing tool registry");
    let tool_registry = Arc::new(tools::create_default_registry());
    log::info!("Registered {} tools", tool_registry.len());

    let launcher = create_launcher(&config).map_err(std::io::Error::other)?;
    log::info!("Browser backend: {}", launcher.name());

    let llm = Arc::new(OpenAIClient::from_config(&config.llm).map_err(std::io::Error::other)?);
    log::info!("LLM endpoint {} with model {}", config.llm.endpoint, config.llm.model);

    let factory = Arc::new(AgentFactory::new(
        llm,
        tool_registry.clone(),
        presets,
        config.max_tool_iterations,
    ));
    let broadcaster = Arc::new(EventBroadcaster::new());
    let scans = Arc::new(ScanManager::new(
        factory,
        launcher.clone(),
        config.crawl,
        broadcaster.clone(),
        config.max_concurrent_scans,
    ));

    let static_dir = if config.static_dir.join("index.html").exists() {
        log::info!("Serving UI from: {:?}", config.static_dir);
        Some(config.static_dir.clone())
    } else {
        log::warn!("No index.html in {:?} - static file serving disabled", config.static_dir);
        None
    };

    log::info!("Starting Autopatch server on port {}", port);
    log::info!("WebSocket Gateway available at /ws");

    let launcher_name = launcher.name();

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let mut app = App::new()
            .app_data(web::Data::new(AppState {
                config: config.clone(),
                scans: Arc::clone(&scans),
                broadcaster: Arc::clone(&broadcaster),
                launcher_name,
            }))
            // WebSocket data for /ws route
            .app_data(web::Data::new(Arc::clone(&scans)))
            .app_data(web::Data::new(Arc::clone(&broadcaster)))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::scans::config)
            .route("/ws", web::get().to(gateway::actix_ws::ws_handler));

        if let Some(dir) = &static_dir {
            app = app
                .app_data(web::Data::new(dir.clone()))
                .service(
                    Files::new("/", dir.clone())
                        .index_file("index.html")
                        .default_handler(web::to(index_fallback)),
                );
        }

        app
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
