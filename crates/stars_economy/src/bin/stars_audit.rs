//! # Stars Audit
//!
//! Replays a journal, prints the admin aggregates and checks that every
//! account's transactions sum to its balance. Exits 1 on any discrepancy.
//!
//! The journal is only read, never locked or truncated, so the tool can be
//! pointed at the journal of a running economy.
//!
//! With `--simulate <rounds>` it also reports win rate and RTP per game for
//! the given config, wagering `--wager <amount>` STAR per round (default 1).

use std::process::ExitCode;
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use stars_economy::{
    AllowAll, Amount, Economy, EconomyConfig, GameEngine, GameKind, TxCategory,
    WithdrawalStatus,
};

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn main() -> ExitCode {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         STARS ECONOMY AUDIT                                      ║");
    println!("║         Journal replay + balance invariant check                 ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let args: Vec<String> = std::env::args().collect();

    let Some(journal_path) = flag_value(&args, "--journal") else {
        println!("Usage: stars_audit --journal <path> [--config <economy.toml>]");
        println!();
        println!("Options:");
        println!("  --config <path>      Economy config (defaults if omitted)");
        println!("  --simulate <rounds>  Report win rate and RTP per game");
        println!("  --wager <amount>     Stake per simulated round (default 1)");
        return ExitCode::from(2);
    };

    let config = match flag_value(&args, "--config") {
        Some(path) => match EconomyConfig::from_toml_file(path) {
            Ok(c) => c,
            Err(e) => {
                println!("Error: {e}");
                return ExitCode::from(2);
            }
        },
        None => EconomyConfig::default(),
    };

    if let Some(rounds) = flag_value(&args, "--simulate") {
        let Ok(rounds) = rounds.parse::<u32>() else {
            println!("Error: --simulate expects a number of rounds");
            return ExitCode::from(2);
        };
        let wager = match flag_value(&args, "--wager").map(str::parse::<Amount>) {
            None => Amount::ONE,
            Some(Ok(wager)) => wager,
            Some(Err(e)) => {
                println!("Error: --wager: {e}");
                return ExitCode::from(2);
            }
        };
        print_simulation(&config, rounds, wager);
    }

    if !std::path::Path::new(journal_path).exists() {
        println!("Error: {journal_path} does not exist");
        return ExitCode::from(2);
    }

    println!("Replaying journal: {journal_path}");
    let (economy, recovery) = match Economy::inspect(journal_path, config, Arc::new(AllowAll)) {
        Ok(opened) => opened,
        Err(e) => {
            println!("Error: Could not replay journal: {e}");
            return ExitCode::FAILURE;
        }
    };

    let stats = match economy.stats() {
        Ok(s) => s,
        Err(e) => {
            println!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let pending = economy.list_withdrawals(Some(WithdrawalStatus::Pending));

    println!();
    println!("┌─ JOURNAL ──────────────────────────────────────────────────────┐");
    println!("│ Committed units:    {}", recovery.committed_units);
    println!("│ Discarded units:    {}", recovery.discarded_units);
    println!("│ Uncommitted bytes:  {}", recovery.truncated_bytes);
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();
    println!("┌─ ECONOMY ──────────────────────────────────────────────────────┐");
    println!("│ Users:              {}", stats.total_users);
    println!("│ Total balance:      {} STAR", stats.total_balance);
    println!("│ Total income:       {} STAR", stats.total_income);
    println!("│ Pending withdrawals: {}", pending.len());
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();
    println!("┌─ BY CATEGORY ──────────────────────────────────────────────────┐");
    for category in TxCategory::ALL {
        match economy.ledger().category_total(&[category]) {
            Ok(total) => println!("│ {:<16} {total} STAR", category.as_str()),
            Err(e) => println!("│ {:<16} error: {e}", category.as_str()),
        }
    }
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();

    let discrepancies = economy.audit();
    if discrepancies.is_empty() {
        println!("✅ Every balance matches its transaction log");
        return ExitCode::SUCCESS;
    }

    println!("❌ {} account(s) out of balance:", discrepancies.len());
    for d in &discrepancies {
        println!(
            "   account {}: balance {} vs transactions {} micro-STAR",
            d.account, d.balance, d.transaction_sum_micros
        );
    }
    ExitCode::FAILURE
}

fn print_simulation(config: &EconomyConfig, rounds: u32, wager: Amount) {
    let engine = GameEngine::new(config.games.clone());
    let mut rng = ChaCha20Rng::from_entropy();

    println!("┌─ SIMULATION ({rounds} rounds of {wager} STAR) ──────────────────┐");
    for game in GameKind::ALL {
        match engine.simulate(game, wager, rounds, &mut rng) {
            Ok(stats) => println!(
                "│ {:<6} win rate {:>6.2}%   RTP {:>6.2}%",
                game.as_str(),
                stats.win_rate() * 100.0,
                stats.rtp() * 100.0
            ),
            Err(e) => println!("│ {:<6} error: {e}", game.as_str()),
        }
    }
    println!("└──────────────────────────────────────────────────────────────────┘");
    println!();
}
