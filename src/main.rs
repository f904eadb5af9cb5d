use queryops::config::AppConfig;

#[rocket::main]
async fn main() {
    let config = AppConfig::from_env();
    if let Err(e) = queryops::rocket_with_config(config).launch().await {
        eprintln!("QueryOps failed to start: {e}");
        std::process::exit(1);
    }
}
