pub mod bus;
pub mod config;
pub mod db;
pub mod events;
pub mod models;
pub mod routes;
pub mod store;

use bus::{EventBus, PubSub};
use config::AppConfig;
use db::Db;
use rocket_cors::CorsOptions;
use std::sync::Arc;
use store::Stores;

pub fn rocket() -> rocket::Rocket<rocket::Build> {
    rocket_with_config(AppConfig::from_env())
}

/// Build against a specific SQLite path with default settings (embedded
/// event bus). Used by the test harness.
pub fn rocket_with_db(db_path: &str) -> rocket::Rocket<rocket::Build> {
    rocket_with_config(AppConfig {
        database_url: db_path.to_string(),
        ..AppConfig::default()
    })
}

pub fn rocket_with_config(config: AppConfig) -> rocket::Rocket<rocket::Build> {
    // Ensure the data directory exists
    if let Some(parent) = std::path::Path::new(config.database_path()).parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let db = Arc::new(Db::open(config.database_path(), config.auto_migrate));
    let stores = Stores::sqlite(db);

    let cors = CorsOptions::default()
        .to_cors()
        .expect("Failed to create CORS");

    let figment = rocket::Config::figment()
        .merge(("address", config.host.clone()))
        .merge(("port", config.port))
        .merge(("log_level", config.rocket_log_level()))
        .merge(("shutdown.grace", 5));

    let pubsub_enabled = config.pubsub_enabled;
    let nats_url = config.nats_url.clone();

    rocket::custom(figment)
        .manage(stores)
        .attach(cors)
        .attach(rocket::fairing::AdHoc::on_ignite(
            "Event Bus",
            move |rocket| async move {
                let pubsub = if !pubsub_enabled {
                    println!("📡 Event bus disabled (PUBSUB_ENABLED=false); SSE will poll");
                    PubSub { bus: None }
                } else {
                    match EventBus::connect(&nats_url).await {
                        Ok(bus) => {
                            if nats_url.is_empty() {
                                println!("📡 Event bus: embedded broker started");
                            } else {
                                println!("📡 Event bus: connected to {nats_url}");
                            }
                            PubSub { bus: Some(bus) }
                        }
                        Err(e) => {
                            eprintln!("⚠️  Event bus unavailable: {e} (SSE will poll)");
                            PubSub { bus: None }
                        }
                    }
                };
                rocket.manage(pubsub)
            },
        ))
        .register(
            "/",
            rocket::catchers![
                routes::not_found,
                routes::unauthorized,
                routes::bad_request,
                routes::unprocessable,
            ],
        )
        .mount(
            "/",
            rocket::routes![
                routes::up,
                routes::enroll,
                routes::config,
                routes::logger,
                routes::distributed_read,
                routes::distributed_write,
                routes::create_campaign,
                routes::list_campaigns,
                routes::get_campaign,
                routes::list_hosts,
                routes::get_host,
                routes::queue_host_query,
                routes::host_results_stream,
                routes::campaign_results_stream,
                routes::api_campaign_results_stream,
            ],
        )
}
