use artisanshub_backend::config::AppConfig;
use artisanshub_backend::services::visibility;
use artisanshub_backend::state::AppState;
use std::env;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let mut args = env::args().skip(1);
    let slug = args.next().unwrap_or_else(|| {
        eprintln!("Usage: cargo run --bin set-featured <SLUG> [on|off]");
        std::process::exit(1);
    });
    let featured = match args.next().as_deref() {
        None | Some("on") => true,
        Some("off") => false,
        Some(other) => {
            eprintln!("Expected 'on' or 'off', got '{}'", other);
            std::process::exit(1);
        }
    };

    let config = AppConfig::default();
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }
    if env::var("DATABASE_URL").is_err() {
        eprintln!("DATABASE_URL must be set; the in-memory store has nothing to feature.");
        std::process::exit(1);
    }

    let state = match AppState::from_config(config).await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Error connecting: {}", e);
            std::process::exit(1);
        }
    };

    match visibility::set_featured(&state, &slug, featured).await {
        Ok(profile) => {
            println!("\nArtist   : {}", profile.artist_name);
            println!("Slug     : {}", profile.slug);
            println!("Featured : {}\n", profile.is_featured);
        }
        Err(e) => {
            eprintln!("Error updating artist: {}", e);
            std::process::exit(1);
        }
    }
}
