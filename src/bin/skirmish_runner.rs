//! Headless Skirmish Runner
//!
//! Deploys two armed squads on an open map, marches one toward the other and
//! lets them trade fire. Prints a JSON (or text) summary of the outcome.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use glam::IVec3;
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use squad_tactics::battle::{
    Agent, AgentStats, AgentType, BattleEventType, BattleState, DamageType, Equipment,
    EquipmentSlot, Facing, GridMap, TableAnimationPack, WeaponSpec, WeaponStatus,
    TICKS_PER_FRAME_UNIT,
};
use squad_tactics::core::types::{tile_distance, tile_of, ItemId, OwnerId, UnitId};
use squad_tactics::core::{BattleConfig, Result};

const BLUE: OwnerId = OwnerId(0);
const RED: OwnerId = OwnerId(1);

/// Headless Skirmish Runner - two squads, one map
#[derive(Parser, Debug)]
#[command(name = "skirmish_runner")]
#[command(about = "Run a squad skirmish and print a summary")]
struct Args {
    /// Ticks to simulate
    #[arg(long, default_value_t = 14_400)]
    ticks: u64,

    /// Random seed, overrides the config
    #[arg(long)]
    seed: Option<u64>,

    /// Battle config TOML file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Map edge length in tiles
    #[arg(long, default_value_t = 32)]
    map_size: i32,

    /// Soldiers per side
    #[arg(long, default_value_t = 4)]
    squad: u32,

    /// Output format: json or text
    #[arg(long, default_value = "json")]
    format: String,
}

/// Per-side tally
#[derive(Serialize, Default)]
struct SideSummary {
    deployed: usize,
    standing: usize,
    unconscious: usize,
    dead: usize,
    shots_fired: usize,
}

/// JSON output structure
#[derive(Serialize)]
struct SkirmishResult {
    ticks: u64,
    seed: u64,
    mode: String,
    blue: SideSummary,
    red: SideSummary,
    events: usize,
}

fn rifleman(id: u32) -> Agent {
    let stats = AgentStats {
        health: 40,
        time_units: 60,
        speed: 50,
    };
    let rifle = Equipment::weapon(
        ItemId(id),
        "rifle",
        WeaponSpec {
            fire_delay: 144,
            range: 20.0,
            power: 26,
            clip_size: 20,
        },
        EquipmentSlot::RightHand,
    )
    .with_spare_clips(2);
    Agent::new(format!("rifleman-{}", id), AgentType::human(), stats).with_equipment(rifle)
}

fn deploy(battle: &mut BattleState, owner: OwnerId, column: i32, facing: Facing, count: u32) -> Vec<UnitId> {
    let middle = battle.map.size().y / 2;
    (0..count as i32)
        .map(|i| {
            let row = middle - count as i32 / 2 + i;
            let item = 1000 * (owner.0 + 1) + i as u32;
            battle.spawn_unit(owner, rifleman(item), IVec3::new(column, row, 0), facing)
        })
        .collect()
}

/// Nearest enemy the unit can see
fn pick_target(battle: &BattleState, id: UnitId) -> Option<UnitId> {
    let unit = battle.unit(id)?;
    unit.visible_units
        .iter()
        .filter_map(|other| battle.unit(*other))
        .filter(|other| other.owner != unit.owner && other.is_conscious())
        .min_by_key(|other| (tile_distance(unit.tile(), other.tile()), other.id))
        .map(|other| other.id)
}

/// Resolve shots fired since `from` against whoever stands at the aim point
fn resolve_shots(battle: &mut BattleState, from: usize) {
    let shots: Vec<(UnitId, ItemId, glam::Vec3)> = battle.battle_log[from..]
        .iter()
        .filter_map(|e| match e.event_type {
            BattleEventType::WeaponFired { unit, item, target } => Some((unit, item, target)),
            _ => None,
        })
        .collect();

    let kinetic = DamageType::kinetic();
    for (shooter, item, aim) in shots {
        let Some(origin) = battle.unit(shooter).map(|u| u.position) else {
            continue;
        };
        let power = battle
            .unit(shooter)
            .and_then(|u| u.agent.item(item))
            .and_then(|i| i.weapon_spec())
            .map_or(0, |spec| spec.power);
        let victim = battle
            .map
            .units_at(tile_of(aim))
            .into_iter()
            .find(|id| *id != shooter);
        let Some(victim) = victim else {
            continue;
        };
        if !battle.rng.gen_bool(0.6) {
            info!(%shooter, %victim, "shot missed");
            continue;
        }
        let direction = (aim - origin).normalize_or_zero();
        battle.hit_unit(victim, power, &kinetic, aim, direction);
    }
}

fn summarize(battle: &BattleState, owner: OwnerId) -> SideSummary {
    let mut summary = SideSummary::default();
    for unit in battle.units.values().filter(|u| u.owner == owner) {
        summary.deployed += 1;
        if unit.is_dead() {
            summary.dead += 1;
        } else if unit.is_unconscious() {
            summary.unconscious += 1;
        } else {
            summary.standing += 1;
        }
    }
    summary.shots_fired = battle
        .events_of(|e| matches!(e, BattleEventType::WeaponFired { .. }))
        .filter(|e| match e.event_type {
            BattleEventType::WeaponFired { unit, .. } => battle.owner_of(unit) == Some(owner),
            _ => false,
        })
        .count();
    summary
}

fn side_standing(battle: &BattleState, owner: OwnerId) -> bool {
    battle
        .units
        .values()
        .any(|u| u.owner == owner && u.is_conscious() && !u.is_gone())
}

fn run(args: &Args) -> Result<SkirmishResult> {
    let mut config = match &args.config {
        Some(path) => BattleConfig::load(path)?,
        None => BattleConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    let seed = config.seed;
    let mode = format!("{:?}", config.mode);

    let size = args.map_size.max(12);
    let map = GridMap::new(IVec3::new(size, size, 1));
    let mut battle = BattleState::new(Box::new(map), Box::new(TableAnimationPack::new(4, 3, 2)), config);

    let blue = deploy(&mut battle, BLUE, 2, Facing::East, args.squad);
    let red = deploy(&mut battle, RED, size - 3, Facing::West, args.squad);
    battle.start_battle();
    info!(blue = blue.len(), red = red.len(), seed, "skirmish deployed");

    let rally = IVec3::new(size / 2 - 2, size / 2, 0);
    if battle.group_move(&blue, rally, true).is_none() {
        warn!(?rally, "blue squad could not march");
    }

    let step = TICKS_PER_FRAME_UNIT;
    while battle.tick < args.ticks {
        let events_before = battle.battle_log.len();
        battle.update(step);
        resolve_shots(&mut battle, events_before);

        let ids: Vec<UnitId> = battle.units.keys().copied().collect();
        for id in ids {
            let idle_shooter = battle
                .unit(id)
                .is_some_and(|u| u.is_conscious() && !u.is_gone() && !u.is_attacking());
            if !idle_shooter {
                continue;
            }
            if let Some(target) = pick_target(&battle, id) {
                battle.command(id, |unit, battle| {
                    unit.start_attacking_unit(battle, target, WeaponStatus::FiringRightHand)
                });
            }
        }

        if !side_standing(&battle, BLUE) || !side_standing(&battle, RED) {
            break;
        }
    }
    battle.end_battle();

    Ok(SkirmishResult {
        ticks: battle.tick,
        seed,
        mode,
        blue: summarize(&battle, BLUE),
        red: summarize(&battle, RED),
        events: battle.battle_log.len(),
    })
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("squad_tactics=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match run(&args) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.format == "text" {
        println!("Skirmish ({}, seed {}) ran {} ticks", result.mode, result.seed, result.ticks);
        for (name, side) in [("Blue", &result.blue), ("Red", &result.red)] {
            println!(
                "  {}: {} deployed, {} standing, {} unconscious, {} dead, {} shots",
                name, side.deployed, side.standing, side.unconscious, side.dead, side.shots_fired
            );
        }
        println!("  {} events logged", result.events);
    } else {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}
