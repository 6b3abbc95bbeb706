//! ArtisansHub Backend - binary entry point
//! Delegates to the library for all app logic.

#[tokio::main]
async fn main() {
    artisanshub_backend::run().await;
}
