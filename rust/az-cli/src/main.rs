//! az: CLI binary for the az search engine.
//!
//! Subcommands:
//! - search    iterative UCB search from a fresh reference game
//! - halving   Gumbel sequential-halving root selection

use std::env;
use std::process;
use std::time::Instant;

use az_core::{Config, Game, Predictor};
use az_games::{DiceRace, FaceValuePredictor, NumberPick};
use az_logging::{
    now_ms, ActionStatsV1, CountersV1, FlushEventV1, NdjsonWriter, SearchEventV1, VersionInfoV1,
};
use az_mcts::{CancelToken, HalvingConfig, Mcts, MctsConfig, SearchResult, UniformPredictor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Ucb,
    Halving,
}

impl Mode {
    fn name(self) -> &'static str {
        match self {
            Mode::Ucb => "ucb",
            Mode::Halving => "halving",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GameKind {
    NumberPick,
    DiceRace,
}

struct Options {
    config: Config,
    game: GameKind,
    players: usize,
    rounds: u32,
    target: u32,
    events: Option<String>,
    /// Tags every event of this run.
    search_id: u64,
}

fn print_help() {
    eprintln!(
        r#"az - batched MCTS on reference games

USAGE:
    az <COMMAND> [OPTIONS]

COMMANDS:
    search      Iterative UCB search from the initial position
    halving     Gumbel sequential-halving root selection

OPTIONS:
    -h, --help          Print this help message
    -V, --version       Print version

Run `az <COMMAND> --help` for command options.
"#
    );
}

fn print_command_help(mode: Mode) {
    println!(
        r#"az {name}

USAGE:
    az {name} [--config PATH] [--game number-pick|dice-race] [--players N]
              [--rounds N] [--target N] [--simulations N] [--batch-size N]
              [--candidates N] [--seed S] [--events PATH] [--search-id N]

OPTIONS:
    --config PATH      YAML config (default: built-in defaults)
    --game NAME        number-pick (default) or dice-race
    --players N        Number of players (default: 2)
    --rounds N         NumberPick rounds (default: 2)
    --target N         DiceRace target (default: 30)
    --simulations N    Override the simulation budget
    --batch-size N     Override search.batch_size
    --candidates N     Override gumbel.initial_action_count
    --seed S           Override search.seed
    --events PATH      Append NDJSON events here (overrides logging.events_path)
    --search-id N      Id written into every event (default: start time in ms)
"#,
        name = mode.name()
    );
}

fn parse_value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    if i + 1 >= args.len() {
        eprintln!("Missing value for {flag}");
        process::exit(1);
    }
    args[i + 1].parse().unwrap_or_else(|_| {
        eprintln!("Invalid {flag} value: {}", args[i + 1]);
        process::exit(1);
    })
}

fn parse_options(mode: Mode, args: &[String]) -> Options {
    let mut config_path: Option<String> = None;
    let mut game = GameKind::NumberPick;
    let mut players: usize = 2;
    let mut rounds: u32 = 2;
    let mut target: u32 = 30;
    let mut simulations: Option<u32> = None;
    let mut batch_size: Option<usize> = None;
    let mut candidates: Option<u32> = None;
    let mut seed: Option<u64> = None;
    let mut events: Option<String> = None;
    let mut search_id: Option<u64> = None;

    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_command_help(mode);
                process::exit(0);
            }
            "--config" => {
                config_path = Some(parse_value(args, i, "--config"));
                i += 2;
            }
            "--game" => {
                let name: String = parse_value(args, i, "--game");
                game = match name.as_str() {
                    "number-pick" => GameKind::NumberPick,
                    "dice-race" => GameKind::DiceRace,
                    other => {
                        eprintln!("Unknown game: {other}");
                        process::exit(1);
                    }
                };
                i += 2;
            }
            "--players" => {
                players = parse_value(args, i, "--players");
                i += 2;
            }
            "--rounds" => {
                rounds = parse_value(args, i, "--rounds");
                i += 2;
            }
            "--target" => {
                target = parse_value(args, i, "--target");
                i += 2;
            }
            "--simulations" => {
                simulations = Some(parse_value(args, i, "--simulations"));
                i += 2;
            }
            "--batch-size" => {
                batch_size = Some(parse_value(args, i, "--batch-size"));
                i += 2;
            }
            "--candidates" => {
                candidates = Some(parse_value(args, i, "--candidates"));
                i += 2;
            }
            "--seed" => {
                seed = Some(parse_value(args, i, "--seed"));
                i += 2;
            }
            "--events" => {
                events = Some(parse_value(args, i, "--events"));
                i += 2;
            }
            "--search-id" => {
                search_id = Some(parse_value(args, i, "--search-id"));
                i += 2;
            }
            other => {
                eprintln!("Unknown option for `az {}`: {}", mode.name(), other);
                eprintln!("Run `az {} --help` for usage.", mode.name());
                process::exit(1);
            }
        }
    }

    let mut config = match &config_path {
        Some(p) => Config::load(p).unwrap_or_else(|e| {
            eprintln!("Failed to load config {p}: {e}");
            process::exit(1);
        }),
        None => Config::default(),
    };
    if let Some(n) = simulations {
        config.search.simulations = n;
        config.gumbel.simulations = n;
    }
    if let Some(n) = batch_size {
        config.search.batch_size = n;
    }
    if let Some(n) = candidates {
        config.gumbel.initial_action_count = n;
    }
    if let Some(s) = seed {
        config.search.seed = s;
    }
    let events = events.or_else(|| config.logging.events_path.clone());

    Options {
        config,
        game,
        players,
        rounds,
        target,
        events,
        search_id: search_id.unwrap_or_else(now_ms),
    }
}

fn run<G, P>(
    mode: Mode,
    opts: &Options,
    game_name: &str,
    game: &G,
    root: G::State,
    predictor: &mut P,
) where
    G: Game,
    P: Predictor<G>,
{
    let mcts = Mcts::new(MctsConfig::from(&opts.config.search)).unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });
    let halving = HalvingConfig::from(&opts.config.gumbel);
    let cancel = CancelToken::new();

    let t0 = Instant::now();
    let res = match mode {
        Mode::Ucb => mcts.run_search(game, root, predictor, &cancel),
        Mode::Halving => mcts.run_halving(game, root, predictor, &halving, &cancel),
    }
    .unwrap_or_else(|e| {
        eprintln!("Search failed: {e}");
        process::exit(1);
    });
    let wall_ms = t0.elapsed().as_millis() as u64;

    print_result(&res);

    if let Some(path) = &opts.events {
        let simulations = match mode {
            Mode::Ucb => opts.config.search.simulations,
            Mode::Halving => halving.simulations,
        };
        if let Err(e) = write_events(
            path,
            opts.config.logging.flush_every_lines,
            &search_event(mode, opts.search_id, game_name, simulations, wall_ms, &res),
            &res,
        ) {
            eprintln!("Failed to write events to {path}: {e}");
            process::exit(1);
        }
    }
}

fn print_result<A: std::fmt::Debug + PartialEq>(res: &SearchResult<A>) {
    println!("{:>8} {:>8} {:>8} {:>7}  values", "action", "prior", "logit", "visits");
    for s in &res.actions {
        let values: Vec<String> = s.values.iter().map(|v| format!("{v:.3}")).collect();
        println!(
            "{:>8} {:>8.4} {:>8.3} {:>7}  [{}]",
            format!("{:?}", s.action),
            s.prior,
            s.logit,
            s.visits,
            values.join(", ")
        );
    }
    if let Some(best) = res.most_visited() {
        println!("most visited: {:?}", best.action);
    }
    if let Some(chosen) = &res.chosen {
        println!("chosen: {chosen:?}");
    }
    let c = res.counters;
    println!(
        "nodes: states={} actions={} terminal={} inference_calls={} evictions={}",
        c.state_nodes, c.action_nodes, c.terminal_states, c.inference_calls, c.evictions
    );
}

fn search_event<A: std::fmt::Debug + PartialEq>(
    mode: Mode,
    search_id: u64,
    game: &str,
    simulations: u32,
    wall_ms: u64,
    res: &SearchResult<A>,
) -> SearchEventV1 {
    let c = res.counters;
    SearchEventV1 {
        event: "search".to_string(),
        ts_ms: now_ms(),
        v: VersionInfoV1::new(az_mcts::VERSION),
        search_id,
        game: game.to_string(),
        mode: mode.name().to_string(),
        simulations,
        wall_ms,
        root_player: res.root_player,
        root_values: res.root_values.as_slice().to_vec(),
        chosen: res.chosen.as_ref().map(|a| format!("{a:?}")),
        most_visited: res.most_visited().map(|s| format!("{:?}", s.action)),
        actions: res
            .actions
            .iter()
            .map(|s| ActionStatsV1 {
                action: format!("{:?}", s.action),
                prior: s.prior,
                logit: s.logit,
                visits: s.visits,
                values: s.values.as_slice().to_vec(),
            })
            .collect(),
        counters: CountersV1 {
            action_nodes: c.action_nodes,
            state_nodes: c.state_nodes,
            terminal_states: c.terminal_states,
            inference_calls: c.inference_calls,
            evictions: c.evictions,
        },
    }
}

fn write_events<A>(
    path: &str,
    flush_every_lines: u64,
    search: &SearchEventV1,
    res: &SearchResult<A>,
) -> Result<(), az_logging::NdjsonError> {
    let mut w = NdjsonWriter::open_append_with_flush(path, flush_every_lines)?;
    for (index, f) in res.flushes.iter().enumerate() {
        w.write_event(&FlushEventV1 {
            event: "flush".to_string(),
            ts_ms: search.ts_ms,
            search_id: search.search_id,
            index: index as u32,
            batch_size: f.batch_size,
            resumed: f.resumed,
        })?;
    }
    w.write_event(search)?;
    w.flush()
}

fn cmd_search(mode: Mode, args: &[String]) {
    let opts = parse_options(mode, args);
    match opts.game {
        GameKind::NumberPick => {
            let game = NumberPick::new(opts.players, opts.rounds);
            let mut predictor = FaceValuePredictor::new(game, 1.0 / game.num_players() as f32);
            run(mode, &opts, "number_pick", &game, game.initial(), &mut predictor);
        }
        GameKind::DiceRace => {
            let game = DiceRace::new(opts.players, opts.target);
            let mut predictor = UniformPredictor::new(&game);
            run(mode, &opts, "dice_race", &game, game.initial(), &mut predictor);
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        process::exit(0);
    }

    match args[1].as_str() {
        "-h" | "--help" | "help" => {
            print_help();
        }
        "-V" | "--version" => {
            println!("az {}", env!("CARGO_PKG_VERSION"));
        }
        "search" => {
            cmd_search(Mode::Ucb, &args[2..]);
        }
        "halving" => {
            cmd_search(Mode::Halving, &args[2..]);
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            process::exit(1);
        }
    }
}
