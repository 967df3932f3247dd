use minesduel_client::{ClientConfig, MinesweeperClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = ClientConfig::from_env();
    let client = MinesweeperClient::new(&config.server_url)?;

    let games = client.open_games().await?;
    if games.is_empty() {
        println!("No games are waiting for a second player.");
        return Ok(());
    }

    println!("Games waiting for an opponent:");
    for game in games {
        let host = game
            .players
            .first()
            .map(|p| p.username.as_str())
            .unwrap_or("?");
        println!(
            "  {}  {}'s game ({}x{}, {} mines)",
            game.id, host, game.rows, game.columns, game.mine_count
        );
    }

    println!("Realtime endpoint: {}", client.websocket_url()?);
    Ok(())
}
