//! Property tests for battle unit invariants

use glam::IVec3;
use proptest::prelude::*;
use squad_tactics::battle::*;
use squad_tactics::core::types::{OwnerId, UnitId};
use squad_tactics::core::BattleConfig;

fn soldier() -> Agent {
    let stats = AgentStats {
        health: 40,
        time_units: 60,
        speed: 50,
    };
    Agent::new("soldier", AgentType::human(), stats)
}

fn open_battle(size: i32) -> BattleState {
    let map = GridMap::new(IVec3::new(size, size, 1));
    let mut battle = BattleState::new(Box::new(map), Box::new(TableAnimationPack::new(2, 2, 1)), BattleConfig::default());
    battle.start_battle();
    battle
}

fn spawn(battle: &mut BattleState, at: (i32, i32)) -> UnitId {
    battle.spawn_unit(OwnerId(0), soldier(), IVec3::new(at.0, at.1, 0), Facing::East)
}

#[derive(Debug, Clone)]
enum Order {
    Goto(i32, i32),
    ReachGoal,
    Snooze(u32),
    Kneel,
    Stand,
    Wait(u32),
}

fn order() -> impl Strategy<Value = Order> {
    prop_oneof![
        (0..12i32, 0..12i32).prop_map(|(x, y)| Order::Goto(x, y)),
        Just(Order::ReachGoal),
        (1..60u32).prop_map(Order::Snooze),
        Just(Order::Kneel),
        Just(Order::Stand),
        (1..40u32).prop_map(Order::Wait),
    ]
}

proptest! {
    #[test]
    fn stun_never_exceeds_health(damage in 0..500i32, power in 1..2000i32, health in 1..80i32) {
        let mut battle = open_battle(8);
        let id = spawn(&mut battle, (3, 3));
        battle.command(id, |unit, battle| {
            unit.agent.modified_stats.health = health;
            unit.deal_damage(battle, damage, false, BodyPart::Body, power);
        });
        let unit = battle.unit(id).unwrap();
        prop_assert!(unit.stun_damage() <= unit.health());
        prop_assert!(unit.stun_damage() <= power);
        prop_assert_eq!(unit.health(), health);
    }

    #[test]
    fn partial_steps_never_pass_the_goal(steps in prop::collection::vec(1..24u32, 1..300), length in 1..6i32) {
        let mut battle = open_battle(12);
        let id = spawn(&mut battle, (1, 4));
        let goal = IVec3::new(1 + length, 4, 0);
        battle.command(id, |unit, battle| unit.set_mission(battle, Mission::goto_location(goal)));
        let goal_x = goal.x as f32 + 0.5;
        let mut last_x = 1.5;
        for ticks in steps {
            battle.update(ticks);
            let x = battle.unit(id).unwrap().position.x;
            prop_assert!(x + 1e-4 >= last_x);
            prop_assert!(x <= goal_x + 1e-4);
            last_x = x;
        }
    }

    #[test]
    fn queue_holds_at_most_one_reach_goal(orders in prop::collection::vec(order(), 1..40)) {
        let mut battle = open_battle(12);
        let id = spawn(&mut battle, (5, 5));
        for order in orders {
            match order {
                Order::Goto(x, y) => {
                    battle.command(id, |unit, battle| unit.add_mission(battle, Mission::goto_location(IVec3::new(x, y, 0))));
                }
                Order::ReachGoal => {
                    battle.command(id, |unit, battle| unit.add_mission(battle, Mission::reach_goal()));
                }
                Order::Snooze(ticks) => {
                    battle.command(id, |unit, battle| unit.add_mission(battle, Mission::snooze(ticks)));
                }
                Order::Kneel => {
                    battle.command(id, |unit, battle| {
                        let change = Mission::change_body_state(unit, battle.config.mode, BodyState::Kneeling);
                        unit.set_mission(battle, change)
                    });
                }
                Order::Stand => {
                    battle.command(id, |unit, battle| {
                        let change = Mission::change_body_state(unit, battle.config.mode, BodyState::Standing);
                        unit.set_mission(battle, change)
                    });
                }
                Order::Wait(ticks) => battle.update(ticks),
            }
            let unit = battle.unit(id).unwrap();
            let reach_goals = unit
                .missions
                .iter()
                .filter(|m| m.mission_type() == MissionType::ReachGoal)
                .count();
            prop_assert!(reach_goals <= 1);
            prop_assert!(unit.agent.is_body_state_allowed(unit.current_body_state));
            prop_assert!(battle.map.contains(unit.tile()));
        }
    }
}
