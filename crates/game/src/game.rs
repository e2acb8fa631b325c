use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use replaykit_core::{Aggregate, AggregateId, DomainError, DomainResult};
use replaykit_events::{ConfigurationError, DomainEvent, Reducer};

/// Aggregate type (and feed name) of games.
pub const GAME_TYPE: &str = "game";

/// Round wins required to win the game.
pub const WINS_NEEDED: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Player(String);

impl Player {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Player {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl core::fmt::Display for Player {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Answer {
    Rock,
    Paper,
    Scissors,
}

impl Answer {
    pub fn beats(self, other: Answer) -> bool {
        matches!(
            (self, other),
            (Answer::Rock, Answer::Scissors)
                | (Answer::Paper, Answer::Rock)
                | (Answer::Scissors, Answer::Paper)
        )
    }
}

/// Folded state of a game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameState {
    game_id: Option<AggregateId>,
    players: Vec<Player>,
    round: u32,
    answers: Vec<(Player, Answer)>,
    wins: BTreeMap<Player, u32>,
    winner: Option<Player>,
}

impl GameState {
    pub fn game_id(&self) -> Option<AggregateId> {
        self.game_id
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn wins(&self, player: &Player) -> u32 {
        self.wins.get(player).copied().unwrap_or(0)
    }

    pub fn winner(&self) -> Option<&Player> {
        self.winner.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.winner.is_some()
    }

    fn answer_of(&self, player: &Player) -> Option<Answer> {
        self.answers.iter().find(|(p, _)| p == player).map(|(_, a)| *a)
    }

    fn game_started(&mut self, event: &GameEvent) {
        if let GameEvent::GameStarted(e) = event {
            self.game_id = Some(e.game_id);
            self.players = vec![e.player1.clone(), e.player2.clone()];
        }
    }

    fn round_started(&mut self, event: &GameEvent) {
        if let GameEvent::RoundStarted(e) = event {
            self.round = e.round;
            self.answers.clear();
        }
    }

    fn player_answered(&mut self, event: &GameEvent) {
        if let GameEvent::PlayerAnswered(e) = event {
            self.answers.push((e.player.clone(), e.answer));
        }
    }

    fn round_finished(&mut self, event: &GameEvent) {
        if let GameEvent::RoundFinished(e) = event {
            *self.wins.entry(e.winner.clone()).or_insert(0) += 1;
            self.answers.clear();
        }
    }

    fn round_tied(&mut self, event: &GameEvent) {
        if let GameEvent::RoundTied(_) = event {
            self.answers.clear();
        }
    }

    fn game_finished(&mut self, event: &GameEvent) {
        if let GameEvent::GameFinished(e) = event {
            self.winner = Some(e.winner.clone());
        }
    }
}

/// Reducer for game streams.
pub fn reducer() -> Result<Reducer<GameState, GameEvent>, ConfigurationError> {
    Reducer::builder()
        .on("GameStarted", GameState::game_started)
        .on("RoundStarted", GameState::round_started)
        .on("PlayerAnswered", GameState::player_answered)
        .on("RoundFinished", GameState::round_finished)
        .on("RoundTied", GameState::round_tied)
        .on("GameFinished", GameState::game_finished)
        .build()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStarted {
    pub game_id: AggregateId,
    pub player1: Player,
    pub player2: Player,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStarted {
    pub game_id: AggregateId,
    pub round: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAnswered {
    pub game_id: AggregateId,
    pub player: Player,
    pub answer: Answer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundFinished {
    pub game_id: AggregateId,
    pub winner: Player,
    pub loser: Player,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundTied {
    pub game_id: AggregateId,
    pub answer: Answer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameFinished {
    pub game_id: AggregateId,
    pub winner: Player,
    pub loser: Player,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GameEvent {
    GameStarted(GameStarted),
    RoundStarted(RoundStarted),
    PlayerAnswered(PlayerAnswered),
    RoundFinished(RoundFinished),
    RoundTied(RoundTied),
    GameFinished(GameFinished),
}

impl DomainEvent for GameEvent {
    const EVENT_TYPES: &'static [&'static str] = &[
        "GameStarted",
        "RoundStarted",
        "PlayerAnswered",
        "RoundFinished",
        "RoundTied",
        "GameFinished",
    ];

    fn event_type(&self) -> &'static str {
        match self {
            GameEvent::GameStarted(_) => "GameStarted",
            GameEvent::RoundStarted(_) => "RoundStarted",
            GameEvent::PlayerAnswered(_) => "PlayerAnswered",
            GameEvent::RoundFinished(_) => "RoundFinished",
            GameEvent::RoundTied(_) => "RoundTied",
            GameEvent::GameFinished(_) => "GameFinished",
        }
    }
}

/// Aggregate root: Game.
#[derive(Debug, Clone)]
pub struct Game {
    state: GameState,
}

impl Aggregate for Game {
    type State = GameState;
    type Event = GameEvent;

    const AGGREGATE_TYPE: &'static str = GAME_TYPE;

    fn from_state(state: Self::State) -> Self {
        Self { state }
    }

    fn state(&self) -> &Self::State {
        &self.state
    }
}

impl Game {
    pub fn start_game(
        &self,
        game_id: AggregateId,
        player1: Player,
        player2: Player,
    ) -> DomainResult<Vec<GameEvent>> {
        if self.state.game_id.is_some() {
            return Err(DomainError::rule("game already started"));
        }
        if player1 == player2 {
            return Err(DomainError::validation("a game needs two distinct players"));
        }
        Ok(vec![
            GameEvent::GameStarted(GameStarted {
                game_id,
                player1,
                player2,
            }),
            GameEvent::RoundStarted(RoundStarted { game_id, round: 1 }),
        ])
    }

    pub fn show_hand(&self, player: Player, answer: Answer) -> DomainResult<Vec<GameEvent>> {
        let game_id = self
            .state
            .game_id
            .ok_or_else(|| DomainError::rule("game not started"))?;
        if self.state.is_finished() {
            return Err(DomainError::rule("game already finished"));
        }
        let opponent = self
            .state
            .players
            .iter()
            .find(|p| **p != player)
            .cloned()
            .filter(|_| self.state.players.contains(&player))
            .ok_or_else(|| DomainError::rule(format!("'{player}' is not playing this game")))?;

        match self.state.answer_of(&player) {
            Some(previous) if previous == answer => return Ok(vec![]),
            Some(_) => {
                return Err(DomainError::rule(format!(
                    "'{player}' already answered this round"
                )));
            }
            None => {}
        }

        let mut events = vec![GameEvent::PlayerAnswered(PlayerAnswered {
            game_id,
            player: player.clone(),
            answer,
        })];

        let Some(opponent_answer) = self.state.answer_of(&opponent) else {
            return Ok(events);
        };

        if answer == opponent_answer {
            events.push(GameEvent::RoundTied(RoundTied { game_id, answer }));
            return Ok(events);
        }

        let (winner, loser) = if answer.beats(opponent_answer) {
            (player, opponent)
        } else {
            (opponent, player)
        };

        events.push(GameEvent::RoundFinished(RoundFinished {
            game_id,
            winner: winner.clone(),
            loser: loser.clone(),
        }));

        if self.state.wins(&winner) + 1 >= WINS_NEEDED {
            events.push(GameEvent::GameFinished(GameFinished {
                game_id,
                winner,
                loser,
            }));
        } else {
            events.push(GameEvent::RoundStarted(RoundStarted {
                game_id,
                round: self.state.round + 1,
            }));
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lisa() -> Player {
        Player::from("Lisa")
    }

    fn bob() -> Player {
        Player::from("Bob")
    }

    /// Replays the events of each command in turn, like loading between calls.
    fn game_from(commands: &[&dyn Fn(&Game) -> DomainResult<Vec<GameEvent>>]) -> (Game, Vec<GameEvent>) {
        let reducer = reducer().unwrap();
        let mut history = Vec::new();
        for command in commands {
            let game = Game::from_state(reducer.replay(&history).unwrap());
            history.extend(command(&game).unwrap());
        }
        (Game::from_state(reducer.replay(&history).unwrap()), history)
    }

    fn start(g: &Game) -> DomainResult<Vec<GameEvent>> {
        g.start_game(AggregateId::new(), lisa(), bob())
    }

    fn types(events: &[GameEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event_type()).collect()
    }

    #[test]
    fn start_game_emits_game_and_round_started() {
        let (game, _) = game_from(&[]);
        let events = game.start_game(AggregateId::new(), lisa(), bob()).unwrap();
        assert_eq!(types(&events), ["GameStarted", "RoundStarted"]);
        match &events[0] {
            GameEvent::GameStarted(e) => {
                assert_eq!(e.player1, lisa());
                assert_eq!(e.player2, bob());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn first_player_shows_hand() {
        let (game, _) = game_from(&[&start]);
        let events = game.show_hand(lisa(), Answer::Rock).unwrap();
        assert_eq!(types(&events), ["PlayerAnswered"]);
    }

    #[test]
    fn same_answer_yields_no_new_events() {
        let (game, _) = game_from(&[&start, &|g: &Game| g.show_hand(lisa(), Answer::Rock)]);
        assert!(game.show_hand(lisa(), Answer::Rock).unwrap().is_empty());
    }

    #[test]
    fn changing_an_answer_is_a_rule_violation() {
        let (game, _) = game_from(&[&start, &|g: &Game| g.show_hand(lisa(), Answer::Rock)]);
        let err = game.show_hand(lisa(), Answer::Paper).unwrap_err();
        assert!(matches!(err, DomainError::RuleViolation(_)));
    }

    #[test]
    fn second_player_finishes_round() {
        let (game, _) = game_from(&[&start, &|g: &Game| g.show_hand(lisa(), Answer::Rock)]);
        let events = game.show_hand(bob(), Answer::Paper).unwrap();
        assert_eq!(types(&events), ["PlayerAnswered", "RoundFinished", "RoundStarted"]);
        match &events[1] {
            GameEvent::RoundFinished(e) => {
                assert_eq!(e.winner, bob());
                assert_eq!(e.loser, lisa());
            }
            other => panic!("unexpected event {other:?}"),
        }
        match &events[2] {
            GameEvent::RoundStarted(e) => assert_eq!(e.round, 2),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn second_player_ties_round_without_advancing() {
        let (game, _) = game_from(&[&start, &|g: &Game| g.show_hand(lisa(), Answer::Rock)]);
        let events = game.show_hand(bob(), Answer::Rock).unwrap();
        assert_eq!(types(&events), ["PlayerAnswered", "RoundTied"]);
        match &events[1] {
            GameEvent::RoundTied(e) => assert_eq!(e.answer, Answer::Rock),
            other => panic!("unexpected event {other:?}"),
        }

        // The tied round is replayed: both players may answer again.
        let (game, _) = game_from(&[
            &start,
            &|g: &Game| g.show_hand(lisa(), Answer::Rock),
            &|g: &Game| g.show_hand(bob(), Answer::Rock),
        ]);
        assert_eq!(game.state().round(), 1);
        assert_eq!(types(&game.show_hand(lisa(), Answer::Paper).unwrap()), ["PlayerAnswered"]);
    }

    #[test]
    fn last_round_finishes_the_game() {
        let (game, _) = game_from(&[
            &start,
            &|g: &Game| g.show_hand(lisa(), Answer::Rock),
            &|g: &Game| g.show_hand(bob(), Answer::Paper),
            &|g: &Game| g.show_hand(bob(), Answer::Rock),
            &|g: &Game| g.show_hand(lisa(), Answer::Paper),
            &|g: &Game| g.show_hand(lisa(), Answer::Rock),
        ]);

        let events = game.show_hand(bob(), Answer::Paper).unwrap();
        assert_eq!(types(&events), ["PlayerAnswered", "RoundFinished", "GameFinished"]);
        match &events[2] {
            GameEvent::GameFinished(e) => {
                assert_eq!(e.winner, bob());
                assert_eq!(e.loser, lisa());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn wins_after_two_rounds() {
        let (game, _) = game_from(&[
            &start,
            &|g: &Game| g.show_hand(lisa(), Answer::Rock),
            &|g: &Game| g.show_hand(bob(), Answer::Paper),
            &|g: &Game| g.show_hand(bob(), Answer::Paper),
        ]);

        let events = game.show_hand(lisa(), Answer::Rock).unwrap();
        assert_eq!(events.len(), 3);
        match &events[2] {
            GameEvent::GameFinished(e) => assert_eq!(e.winner, bob()),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn playing_after_the_game_finished_is_a_rule_violation() {
        let (game, history) = game_from(&[
            &start,
            &|g: &Game| g.show_hand(lisa(), Answer::Rock),
            &|g: &Game| g.show_hand(bob(), Answer::Paper),
            &|g: &Game| g.show_hand(bob(), Answer::Paper),
            &|g: &Game| g.show_hand(lisa(), Answer::Rock),
        ]);
        assert_eq!(history.last().map(|e| e.event_type()), Some("GameFinished"));
        assert_eq!(game.state().winner(), Some(&bob()));

        let err = game.show_hand(lisa(), Answer::Scissors).unwrap_err();
        assert_eq!(err, DomainError::rule("game already finished"));
    }

    #[test]
    fn strangers_and_unstarted_games_are_rejected() {
        let (game, _) = game_from(&[]);
        assert!(matches!(
            game.show_hand(lisa(), Answer::Rock),
            Err(DomainError::RuleViolation(_))
        ));

        let (game, _) = game_from(&[&start]);
        assert!(matches!(
            game.show_hand(Player::from("Eve"), Answer::Rock),
            Err(DomainError::RuleViolation(_))
        ));
    }

    fn answer() -> impl Strategy<Value = Answer> {
        prop_oneof![Just(Answer::Rock), Just(Answer::Paper), Just(Answer::Scissors)]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: repeating an accepted command against the state it produced
        /// yields zero events, and replay is deterministic.
        #[test]
        fn repeated_commands_are_no_ops(moves in prop::collection::vec((any::<bool>(), answer()), 1..16)) {
            let reducer = reducer().unwrap();
            let mut history = Game::from_state(GameState::default())
                .start_game(AggregateId::new(), lisa(), bob())
                .unwrap();

            for (first, answer) in moves {
                let player = if first { lisa() } else { bob() };
                let game = Game::from_state(reducer.replay(&history).unwrap());
                let Ok(events) = game.show_hand(player.clone(), answer) else {
                    continue;
                };
                history.extend(events.clone());

                let after = Game::from_state(reducer.replay(&history).unwrap());
                if events.len() == 1 {
                    prop_assert!(after.show_hand(player, answer).unwrap().is_empty());
                }
            }

            prop_assert_eq!(reducer.replay(&history).unwrap(), reducer.replay(&history).unwrap());
        }
    }
}
