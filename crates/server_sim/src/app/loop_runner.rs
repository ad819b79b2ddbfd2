use std::process::ExitCode;

use multifix::{
    HookResult, MultifixConfig, MultifixPlugin, TriggerEvent, TriggerPhase, PLUGIN_NAME, ServerClock,
};
use serde::Serialize;
use tracing::{debug, error, info};

use super::bootstrap::AppWiring;
use super::scenario::{to_vec3, Scenario, ScenarioAction, SimError};
use super::world::{GravityStats, MovementContext, SimHookSite, SimSetting, SimWorld};

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SimReport {
    pub(crate) plugin: &'static str,
    pub(crate) map: String,
    pub(crate) ticks: u64,
    pub(crate) final_time: f64,
    pub(crate) setting: String,
    pub(crate) setting_value: f64,
    pub(crate) default_value: f64,
    pub(crate) active_overrides: usize,
    pub(crate) pending_timers: usize,
    pub(crate) hooks_attached: usize,
    pub(crate) players: Vec<PlayerReport>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PlayerReport {
    pub(crate) index: u32,
    pub(crate) name: String,
    pub(crate) bot: bool,
    pub(crate) position: [f32; 3],
    pub(crate) velocity: [f32; 3],
    pub(crate) jumps: u32,
    pub(crate) jump_blocked: bool,
    pub(crate) gravity_seen: Option<GravityStats>,
}

impl SimReport {
    pub(crate) fn player(&self, index: u32) -> Option<&PlayerReport> {
        self.players.iter().find(|player| player.index == index)
    }
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let report = match simulate(app.config, &app.scenario) {
        Ok(report) => report,
        Err(err) => {
            error!(error = %err, "simulation_failed");
            return ExitCode::FAILURE;
        }
    };
    match serde_json::to_string_pretty(&report).map_err(SimError::Report) {
        Ok(encoded) => {
            println!("{encoded}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "report_failed");
            ExitCode::FAILURE
        }
    }
}

/// Plays `scenario` against a freshly loaded plugin. Each tick advances the
/// clock, runs due timers, applies due scenario steps and then moves every
/// pawn in turn with the movement hooks around its step.
pub(crate) fn simulate(config: MultifixConfig, scenario: &Scenario) -> Result<SimReport, SimError> {
    let setting = SimSetting::new(&config.watched_setting, scenario.engine_gravity);
    let mut hooks = SimHookSite::default();
    let mut world = SimWorld::default();
    for player in &scenario.players {
        world.connect(player);
    }

    let mut plugin = MultifixPlugin::load(config, setting.clone(), &mut hooks)?;
    plugin.on_map_start(&scenario.map);
    let mut map = scenario.map.clone();

    let dt_seconds = 1.0 / f64::from(scenario.tick_rate);
    let total_ticks = scenario.total_ticks();
    let mut steps = scenario.steps.iter().peekable();
    info!(
        map = %map,
        tick_rate = scenario.tick_rate,
        total_ticks,
        players = scenario.players.len(),
        "simulation_started"
    );

    for tick in 0..total_ticks {
        world.advance_to(tick as f64 * dt_seconds);

        for action in world.take_due_timers() {
            plugin.run_deferred(action, &mut world);
        }

        let now = world.current_time();
        while let Some(step) = steps.next_if(|step| step.at <= now) {
            apply_action(&step.action, &mut plugin, &mut world, &setting, &mut map);
        }

        for controller_index in world.pawn_indices() {
            let context = MovementContext { controller_index };
            plugin.on_movement_pre(&world, &context);
            world.step_pawn(controller_index, setting.current(), dt_seconds as f32);
            plugin.on_movement_post(&world, &context);
        }
    }

    let report = build_report(&plugin, &world, &setting, map, total_ticks);
    plugin.unload(&mut hooks);
    info!(
        ticks = report.ticks,
        final_time = report.final_time,
        setting_value = report.setting_value,
        active_overrides = report.active_overrides,
        "simulation_finished"
    );
    Ok(SimReport {
        hooks_attached: hooks.attached_count(),
        ..report
    })
}

fn apply_action(
    action: &ScenarioAction,
    plugin: &mut MultifixPlugin<SimSetting>,
    world: &mut SimWorld,
    setting: &SimSetting,
    map: &mut String,
) {
    match action {
        ScenarioAction::TriggerEnter {
            player,
            trigger,
            class,
        } => {
            let event = trigger_event(TriggerPhase::Enter, *player, trigger, class, world);
            plugin.on_trigger_event(&event, world);
        }
        ScenarioAction::TriggerExit {
            player,
            trigger,
            class,
        } => {
            let event = trigger_event(TriggerPhase::Exit, *player, trigger, class, world);
            plugin.on_trigger_event(&event, world);
        }
        ScenarioAction::Jump { player } => {
            if !world.jump(*player) {
                debug!(index = player, "jump_ignored_not_grounded");
                return;
            }
            let slot = world.slot_of(*player);
            if plugin.on_player_jump(slot, world) == HookResult::Handled {
                debug!(index = player, "jump_handled_by_plugin");
            }
        }
        ScenarioAction::SetVelocity { player, velocity } => {
            world.set_velocity(*player, to_vec3(*velocity));
        }
        ScenarioAction::Connect { player } => {
            world.connect(player);
        }
        ScenarioAction::Disconnect { player } => {
            if let Some(slot) = world.slot_of(*player) {
                plugin.on_player_disconnect(slot);
            }
            world.disconnect(*player);
        }
        ScenarioAction::MapStart {
            map: next_map,
            engine_gravity,
        } => {
            if let Some(value) = engine_gravity {
                setting.engine_set(*value);
            }
            plugin.on_map_start(next_map);
            *map = next_map.clone();
        }
    }
}

fn trigger_event(
    phase: TriggerPhase,
    player: u32,
    trigger: &str,
    class: &str,
    world: &SimWorld,
) -> TriggerEvent {
    TriggerEvent {
        phase,
        trigger_class: class.to_string(),
        trigger_name: trigger.to_string(),
        activator: world.slot_of(player),
    }
}

fn build_report(
    plugin: &MultifixPlugin<SimSetting>,
    world: &SimWorld,
    setting: &SimSetting,
    map: String,
    ticks: u64,
) -> SimReport {
    let players = world
        .players()
        .map(|(index, player)| {
            let (position, velocity) = player
                .pawn
                .as_ref()
                .map(|pawn| {
                    (
                        [pawn.position.x, pawn.position.y, pawn.position.z],
                        [pawn.velocity.x, pawn.velocity.y, pawn.velocity.z],
                    )
                })
                .unwrap_or_default();
            PlayerReport {
                index,
                name: player.name.clone(),
                bot: player.is_bot,
                position,
                velocity,
                jumps: player.jumps,
                jump_blocked: world
                    .slot_of(index)
                    .is_some_and(|slot| plugin.dispatcher().is_jump_blocked(slot)),
                gravity_seen: player.gravity_seen,
            }
        })
        .collect();

    SimReport {
        plugin: PLUGIN_NAME,
        map,
        ticks,
        final_time: world.current_time(),
        setting: plugin.impersonator().setting_name().to_string(),
        setting_value: setting.current(),
        default_value: plugin.impersonator().default_value(),
        active_overrides: plugin.impersonator().table().len(),
        pending_timers: world.pending_timers(),
        hooks_attached: 0,
        players,
    }
}
