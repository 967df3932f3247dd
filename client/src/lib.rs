//! Client Library for turn-based two-player minesweeper
//!
//! The server owns the game: it places mines, reveals cells, keeps score and
//! decides whose turn it is. This crate keeps a local copy of the latest game
//! snapshot, derives what a frontend needs to show from it, and only lets
//! moves through when they can succeed.
//!
//! ## Usage
//!
//! ### High-Level Interface (Recommended)
//!
//! [`DuelGame`] joins a game over HTTP, follows it over the realtime channel
//! and gates moves:
//!
//! ```rust,no_run
//! use minesduel_client::{ClientConfig, DuelGame, GameParams, MoveOutcome, TurnIndicator};
//!
//! #[tokio::main]
//! async fn main() -> minesduel_client::Result<()> {
//!     let mut game = DuelGame::new(ClientConfig::new("http://localhost:8080"))?;
//!
//!     // Create a game and wait for an opponent
//!     game.create_and_join(GameParams::default(), "alice").await?;
//!
//!     while let Some(update) = game.next_update().await {
//!         match update.view.indicator {
//!             TurnIndicator::YourTurn => {
//!                 if let MoveOutcome::Ignored(reason) = game.attempt_move(0, 0).await? {
//!                     println!("Move ignored: {:?}", reason);
//!                 }
//!             }
//!             TurnIndicator::Won | TurnIndicator::Lost => break,
//!             _ => {}
//!         }
//!     }
//!
//!     game.exit();
//!     Ok(())
//! }
//! ```
//!
//! ### Low-Level Interface
//!
//! The pieces can also be driven separately: [`MinesweeperClient`] for the
//! REST API, [`SubscriptionManager`] for the snapshot stream, [`GameSession`]
//! for local identity and the functions in [`derive`] for turn state.

mod client;
mod config;
pub mod derive;
mod error;
mod game;
mod gate;
mod realtime;
mod session;

pub use client::MinesweeperClient;
pub use config::ClientConfig;
pub use derive::{Ineligible, Phase, Standing, TurnIndicator, TurnView};
pub use error::{Error, Result};
pub use game::{DuelGame, SessionUpdate};
pub use gate::{MoveOutcome, MoveSubmitter, attempt_move};
pub use realtime::{ConnectionStatus, SubscriptionManager};
pub use session::{GameSession, Reconciled};

// Re-export common types for convenience
pub use minesduel_common::{models::*, protocol};
