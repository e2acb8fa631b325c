//! Rock-paper-scissors domain module (event-sourced).
//!
//! Best of three: the first player to win two rounds wins the game. A tied
//! round is replayed without advancing the round counter.

pub mod game;

pub use game::{
    Answer, GAME_TYPE, Game, GameEvent, GameFinished, GameStarted, GameState, Player,
    PlayerAnswered, RoundFinished, RoundStarted, RoundTied, WINS_NEEDED, reducer,
};
