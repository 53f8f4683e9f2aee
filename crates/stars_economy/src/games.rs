//! # Game Engine
//!
//! **Pure outcome policies for flip, crash and slot**
//!
//! The engine turns a wager into an [`Outcome`]; it never touches the
//! ledger. Every probability comes from [`GamesConfig`] so operators can
//! retune RTP without a rebuild.
//!
//! ## Draw order
//!
//! The order of random draws is part of each policy and must not change:
//!
//! - **Flip**: special-event draw first (forced loss), then the win draw
//! - **Crash**: instant-crash draw, range draw, multiplier draw, then the
//!   simulated cash-out draw bounded by `multiplier * cashout_fraction`
//! - **Slot**: one integer over `1..=total_combinations`
//!
//! Uniform draws use `low + (high - low) * u` with `u` in `[0, 1)`, so a
//! cash-out bound below 1.0 simply draws downward instead of failing.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::config::{CrashConfig, FlipConfig, GamesConfig, SlotConfig};
use crate::error::{EconomyError, EconomyResult};
use crate::fixed_point::{Amount, Delta, Multiplier};
use crate::ledger::TxCategory;

/// Game variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GameKind {
    /// Coin flip.
    Flip,
    /// Crash-style multiplier.
    Crash,
    /// Slot machine.
    Slot,
}

impl GameKind {
    /// All variants.
    pub const ALL: [Self; 3] = [Self::Flip, Self::Crash, Self::Slot];

    /// Stable lowercase identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flip => "flip",
            Self::Crash => "crash",
            Self::Slot => "slot",
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameKind {
    type Err = EconomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flip" => Ok(Self::Flip),
            "crash" => Ok(Self::Crash),
            "slot" => Ok(Self::Slot),
            other => Err(EconomyError::UnknownGame(other.to_string())),
        }
    }
}

/// Result of one play.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outcome {
    /// The game played.
    pub game: GameKind,
    /// Whether the player won.
    pub win: bool,
    /// Reported multiplier: the payout factor on a win; on a loss 1.0 for
    /// crash and 0 for flip and slot.
    pub multiplier: Multiplier,
    /// `wager * multiplier` on a win, zero on a loss.
    pub payout: Amount,
}

impl Outcome {
    fn loss(game: GameKind, multiplier: Multiplier) -> Self {
        Self { game, win: false, multiplier, payout: Amount::ZERO }
    }

    fn win(game: GameKind, wager: Amount, multiplier: Multiplier) -> EconomyResult<Self> {
        Ok(Self {
            game,
            win: true,
            multiplier,
            payout: wager.mul_multiplier(multiplier)?,
        })
    }

    /// The ledger posting for this outcome: `payout - wager` as a game win,
    /// or `-wager` as a game loss. The wager is always collected.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::ArithmeticOverflow` if the amounts exceed `i64`.
    pub fn posting(&self, wager: Amount) -> EconomyResult<(Delta, TxCategory)> {
        if self.win {
            Ok((Delta::between(self.payout, wager)?, TxCategory::GameWin))
        } else {
            Ok((wager.debit()?, TxCategory::GameLose))
        }
    }

    /// Transaction note, e.g. `Win in crash: x1.37`.
    #[must_use]
    pub fn note(&self) -> String {
        if self.win {
            format!("Win in {}: {}", self.game, self.multiplier)
        } else {
            format!("Loss in {}", self.game)
        }
    }
}

/// Uniform draw in `[low, high)`; inverted bounds draw downward.
fn uniform<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    low + (high - low) * rng.gen::<f64>()
}

fn multiplier_from(value: f64) -> EconomyResult<Multiplier> {
    Multiplier::try_from(value).map_err(EconomyError::InvalidConfig)
}

/// Stateless outcome generator.
#[derive(Clone, Debug, Default)]
pub struct GameEngine {
    config: GamesConfig,
}

impl GameEngine {
    /// Creates an engine with the given policies.
    #[must_use]
    pub const fn new(config: GamesConfig) -> Self {
        Self { config }
    }

    /// The active policies.
    #[must_use]
    pub const fn config(&self) -> &GamesConfig {
        &self.config
    }

    /// Plays one round.
    ///
    /// # Errors
    ///
    /// Returns `EconomyError::InvalidWager` for a zero wager and
    /// `EconomyError::ArithmeticOverflow` if the payout does not fit.
    pub fn play<R: Rng + ?Sized>(
        &self,
        game: GameKind,
        wager: Amount,
        rng: &mut R,
    ) -> EconomyResult<Outcome> {
        if wager.is_zero() {
            return Err(EconomyError::InvalidWager(wager));
        }

        match game {
            GameKind::Flip => Self::roll_flip(&self.config.flip, wager, rng),
            GameKind::Crash => Self::roll_crash(&self.config.crash, wager, rng),
            GameKind::Slot => Self::roll_slot(&self.config.slot, wager, rng),
        }
    }

    fn roll_flip<R: Rng + ?Sized>(
        policy: &FlipConfig,
        wager: Amount,
        rng: &mut R,
    ) -> EconomyResult<Outcome> {
        // The special event short-circuits the win draw.
        if rng.gen::<f64>() < policy.special_event_chance {
            return Ok(Outcome::loss(GameKind::Flip, Multiplier::ZERO));
        }
        if rng.gen::<f64>() < policy.win_chance {
            Outcome::win(GameKind::Flip, wager, policy.multiplier)
        } else {
            Ok(Outcome::loss(GameKind::Flip, Multiplier::ZERO))
        }
    }

    fn roll_crash<R: Rng + ?Sized>(
        policy: &CrashConfig,
        wager: Amount,
        rng: &mut R,
    ) -> EconomyResult<Outcome> {
        if rng.gen::<f64>() < policy.instant_crash_chance {
            return Ok(Outcome::loss(GameKind::Crash, Multiplier::ONE));
        }

        let (low, high) = if rng.gen::<f64>() < policy.high_multiplier_chance {
            policy.high_multiplier_range
        } else {
            policy.low_multiplier_range
        };
        let crash_at = uniform(rng, low, high);
        let cashout = uniform(rng, 1.0, crash_at * policy.cashout_fraction);

        if cashout > 1.0 {
            Outcome::win(GameKind::Crash, wager, multiplier_from(crash_at)?)
        } else {
            Ok(Outcome::loss(GameKind::Crash, Multiplier::ONE))
        }
    }

    fn roll_slot<R: Rng + ?Sized>(
        policy: &SlotConfig,
        wager: Amount,
        rng: &mut R,
    ) -> EconomyResult<Outcome> {
        if policy.total_combinations == 0 {
            return Err(EconomyError::InvalidConfig(
                "games.slot.total_combinations: must be positive".to_string(),
            ));
        }
        let combination = rng.gen_range(1..=policy.total_combinations);
        if combination <= policy.winning_combinations {
            Outcome::win(GameKind::Slot, wager, policy.win_multiplier)
        } else {
            Ok(Outcome::loss(GameKind::Slot, Multiplier::ZERO))
        }
    }

    /// Plays `iterations` rounds with a fixed wager and tallies the results.
    ///
    /// Used to check a retuned config's win rate and RTP before shipping it.
    ///
    /// # Errors
    ///
    /// Same as [`GameEngine::play`].
    pub fn simulate<R: Rng + ?Sized>(
        &self,
        game: GameKind,
        wager: Amount,
        iterations: u32,
        rng: &mut R,
    ) -> EconomyResult<GameStatistics> {
        let mut stats = GameStatistics::default();

        for _ in 0..iterations {
            let outcome = self.play(game, wager, rng)?;
            stats.plays += 1;
            stats.wagered_micros += u128::from(wager.micros());
            if outcome.win {
                stats.wins += 1;
                stats.paid_micros += u128::from(outcome.payout.micros());
            }
        }

        Ok(stats)
    }
}

/// Tally from [`GameEngine::simulate`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GameStatistics {
    /// Rounds played.
    pub plays: u64,
    /// Rounds won.
    pub wins: u64,
    /// Total wagered, in micro-units.
    pub wagered_micros: u128,
    /// Total paid out on wins, in micro-units.
    pub paid_micros: u128,
}

impl GameStatistics {
    /// Fraction of rounds won.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn win_rate(&self) -> f64 {
        if self.plays == 0 {
            return 0.0;
        }
        self.wins as f64 / self.plays as f64
    }

    /// Return to player: paid out / wagered.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rtp(&self) -> f64 {
        if self.wagered_micros == 0 {
            return 0.0;
        }
        self.paid_micros as f64 / self.wagered_micros as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(0x5EED)
    }

    #[test]
    fn test_parse_game_ids() {
        assert_eq!("crash".parse::<GameKind>().unwrap(), GameKind::Crash);
        assert_eq!(
            "roulette".parse::<GameKind>(),
            Err(EconomyError::UnknownGame("roulette".to_string()))
        );
        for game in GameKind::ALL {
            assert_eq!(game.to_string().parse::<GameKind>().unwrap(), game);
        }
    }

    #[test]
    fn test_zero_wager_rejected() {
        let engine = GameEngine::default();
        let err = engine.play(GameKind::Flip, Amount::ZERO, &mut rng()).unwrap_err();
        assert_eq!(err, EconomyError::InvalidWager(Amount::ZERO));
    }

    #[test]
    fn test_flip_win_rate() {
        let engine = GameEngine::default();
        let stats = engine.simulate(GameKind::Flip, Amount::ONE, 100_000, &mut rng()).unwrap();
        let expected = 0.49 * (1.0 - 0.015);
        assert!((stats.win_rate() - expected).abs() < 0.01, "win rate {}", stats.win_rate());
    }

    #[test]
    fn test_slot_win_rate() {
        let engine = GameEngine::default();
        let stats = engine.simulate(GameKind::Slot, Amount::ONE, 100_000, &mut rng()).unwrap();
        assert!((stats.win_rate() - 1.0 / 27.0).abs() < 0.005, "win rate {}", stats.win_rate());
    }

    #[test]
    fn test_special_event_always_loses() {
        let mut config = GamesConfig::default();
        config.flip.special_event_chance = 1.0;
        config.flip.win_chance = 1.0;
        let engine = GameEngine::new(config);
        let stats = engine.simulate(GameKind::Flip, Amount::ONE, 1_000, &mut rng()).unwrap();
        assert_eq!(stats.wins, 0);
    }

    #[test]
    fn test_crash_low_range_never_wins() {
        // 1.1 * 0.8 < 1.0, so a low-range round can never cash out above 1.0.
        let mut config = GamesConfig::default();
        config.crash.instant_crash_chance = 0.0;
        config.crash.high_multiplier_chance = 0.0;
        let engine = GameEngine::new(config);
        let mut rng = rng();
        for _ in 0..1_000 {
            let outcome = engine.play(GameKind::Crash, Amount::ONE, &mut rng).unwrap();
            assert!(!outcome.win);
            assert_eq!(outcome.multiplier, Multiplier::ONE);
        }
    }

    #[test]
    fn test_crash_win_pays_realized_multiplier() {
        let mut config = GamesConfig::default();
        config.crash.instant_crash_chance = 0.0;
        config.crash.high_multiplier_chance = 1.0;
        let engine = GameEngine::new(config);
        let mut rng = rng();
        let wager = Amount::from_whole(10);

        let mut wins = 0;
        for _ in 0..1_000 {
            let outcome = engine.play(GameKind::Crash, wager, &mut rng).unwrap();
            if outcome.win {
                wins += 1;
                assert!(outcome.multiplier >= Multiplier::try_from(1.5).unwrap());
                assert!(outcome.multiplier <= Multiplier::from_whole(5));
                assert_eq!(outcome.payout, wager.mul_multiplier(outcome.multiplier).unwrap());
            }
        }
        assert!(wins > 0);
    }

    #[test]
    fn test_instant_crash() {
        let mut config = GamesConfig::default();
        config.crash.instant_crash_chance = 1.0;
        let engine = GameEngine::new(config);
        let outcome = engine.play(GameKind::Crash, Amount::ONE, &mut rng()).unwrap();
        assert_eq!(outcome, Outcome::loss(GameKind::Crash, Multiplier::ONE));
    }

    #[test]
    fn test_posting_collects_wager() {
        let wager = Amount::from_whole(5);
        let win = Outcome::win(GameKind::Flip, wager, Multiplier::from_whole(2)).unwrap();
        assert_eq!(
            win.posting(wager).unwrap(),
            (Amount::from_whole(5).credit().unwrap(), TxCategory::GameWin)
        );
        assert_eq!(win.note(), "Win in flip: x2.00");

        let loss = Outcome::loss(GameKind::Slot, Multiplier::ZERO);
        assert_eq!(
            loss.posting(wager).unwrap(),
            (Amount::from_whole(5).debit().unwrap(), TxCategory::GameLose)
        );
        assert_eq!(loss.note(), "Loss in slot");
    }

    #[test]
    fn test_same_seed_same_outcomes() {
        let engine = GameEngine::default();
        let mut a = rng();
        let mut b = rng();
        for game in GameKind::ALL {
            for _ in 0..100 {
                assert_eq!(
                    engine.play(game, Amount::ONE, &mut a).unwrap(),
                    engine.play(game, Amount::ONE, &mut b).unwrap()
                );
            }
        }
    }
}
