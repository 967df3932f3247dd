use std::env;

use minesduel_client::{
    DuelGame, Game, GameParams, MoveOutcome, TurnIndicator, TurnView, derive,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let username = env::args().nth(1).unwrap_or_else(|| "alice".to_string());
    let join_id = env::args().nth(2);

    // Server address and timings come from MINESDUEL_* variables
    let mut game = DuelGame::from_env()?;

    let view = match join_id {
        Some(game_id) => game.join(&game_id, &username).await?,
        None => {
            let params = GameParams {
                rows: 8,
                columns: 8,
                mine_count: 10,
            };
            game.create_and_join(params, &username).await?
        }
    };
    println!("Playing game {} as {}", view.game_id, username);
    print_status(&view);

    while let Some(update) = game.next_update().await {
        if let Some(snapshot) = game.session().game() {
            display_board(snapshot);
        }
        print_status(&update.view);

        match update.view.indicator {
            TurnIndicator::Won | TurnIndicator::Lost => break,
            TurnIndicator::YourTurn => {
                let Some(snapshot) = game.session().game() else {
                    continue;
                };
                let player = game.session().player();
                // Reveal the first cell the gate accepts
                let target = snapshot
                    .cells()
                    .find(|c| derive::is_move_eligible(snapshot, player, c.row, c.column))
                    .map(|c| (c.row, c.column));

                if let Some((row, col)) = target {
                    println!("Revealing ({}, {})...", row, col);
                    match game.attempt_move(row, col).await {
                        Ok(MoveOutcome::Submitted) => {}
                        Ok(MoveOutcome::Ignored(reason)) => println!("Move ignored: {:?}", reason),
                        Err(e) => {
                            println!("Move failed: {}", e);
                            game.dismiss_error();
                        }
                    }
                }
            }
            _ => {}
        }
    }

    game.exit();
    println!("Left the game");
    Ok(())
}

fn print_status(view: &TurnView) {
    let headline = match view.indicator {
        TurnIndicator::Won => "You won!",
        TurnIndicator::Lost => "You lost.",
        TurnIndicator::WaitingForOpponent => "Waiting for an opponent...",
        TurnIndicator::YourTurn => "Your turn",
        TurnIndicator::OpponentsTurn => "Opponent is playing...",
    };
    println!("{}  (mines left: {})", headline, view.remaining_mines);

    for standing in &view.standings {
        let marker = if standing.is_winner {
            "*"
        } else if standing.is_turn_holder {
            ">"
        } else {
            " "
        };
        println!(
            "  {} {}: {}",
            marker, standing.player.username, standing.player.score
        );
    }
}

fn display_board(game: &Game) {
    println!("Board state:");
    for (row, cells) in game.board.iter().enumerate() {
        print!("  ");
        for cell in cells {
            print!("{:2}", cell.glyph());
        }
        println!("  {}", row);
    }

    // Print column numbers
    print!("  ");
    for column in 0..game.columns {
        print!("{:2}", column);
    }
    println!();
}
