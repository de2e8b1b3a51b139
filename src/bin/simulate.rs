use chain_tag_server::chain_ring::ChainRing;
use chain_tag_server::config::SessionConfig;
use chain_tag_server::death_resolver::DeathReport;
use chain_tag_server::respawn::{SpawnLocator, StateReset, ZoneGeometry};
use chain_tag_server::rng::Rng;
use chain_tag_server::session::ChainTagSession;
use chain_tag_server::types::{
    DeathCause, DeathClassification, DeathOutcome, HitVerdict, Location, ParticipantId,
    SessionEndReason, SessionEvent,
};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tracing::Level;

const STEP_MS: u64 = 1_000;
const DEFAULT_MAX_STEPS: u64 = 3_600;
const NATURAL_CAUSES: [DeathCause; 5] = [
    DeathCause::Fall,
    DeathCause::Fire,
    DeathCause::Drowning,
    DeathCause::Void,
    DeathCause::Zone,
];

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long)]
    players: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    max_steps: Option<u64>,
    #[arg(long)]
    match_id: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    participants: usize,
    #[serde(rename = "maxSteps")]
    max_steps: u64,
    seed: u32,
}

#[derive(Clone, Debug, Default, Serialize)]
struct ScenarioCounters {
    #[serde(rename = "correctCaptures")]
    correct_captures: u32,
    #[serde(rename = "wrongCaptures")]
    wrong_captures: u32,
    #[serde(rename = "naturalDeaths")]
    natural_deaths: u32,
    #[serde(rename = "followerDeaths")]
    follower_deaths: u32,
    #[serde(rename = "blockedHits")]
    blocked_hits: u32,
    successions: u32,
    #[serde(rename = "ringBreaks")]
    ring_breaks: u32,
    departures: u32,
    respawns: u32,
}

impl ScenarioCounters {
    fn absorb(&mut self, other: &ScenarioCounters) {
        self.correct_captures += other.correct_captures;
        self.wrong_captures += other.wrong_captures;
        self.natural_deaths += other.natural_deaths;
        self.follower_deaths += other.follower_deaths;
        self.blocked_hits += other.blocked_hits;
        self.successions += other.successions;
        self.ring_breaks += other.ring_breaks;
        self.departures += other.departures;
        self.respawns += other.respawns;
    }
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    seed: u32,
    participants: usize,
    reason: SessionEndReason,
    winner: Option<ParticipantId>,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    steps: u64,
    #[serde(flatten)]
    counters: ScenarioCounters,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    step: u64,
    message: String,
}

/// Every occurrence is kept with its step; `distinct` lists each message once.
#[derive(Debug, Default)]
struct AnomalyLog {
    records: Vec<AnomalyRecord>,
    distinct: Vec<String>,
    seen: HashSet<String>,
}

impl AnomalyLog {
    fn record(&mut self, step: u64, message: String) {
        if self.seen.insert(message.clone()) {
            self.distinct.push(message.clone());
        }
        self.records.push(AnomalyRecord { step, message });
    }
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
    finished_step: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunSummary {
    match_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenario_count: usize,
    anomaly_count: usize,
    victories: usize,
    average_steps: u64,
    reason_counts: BTreeMap<String, usize>,
    totals: ScenarioCounters,
    scenarios: Vec<ScenarioResultLine>,
}

impl RunSummary {
    fn collect(
        match_id: String,
        started_at_ms: u64,
        finished_at_ms: u64,
        runs: &[ScenarioRunResult],
    ) -> Self {
        let mut reason_counts = BTreeMap::new();
        let mut totals = ScenarioCounters::default();
        let mut anomaly_count = 0;
        let mut total_steps = 0;
        for run in runs {
            *reason_counts
                .entry(end_reason_key(run.result.reason))
                .or_insert(0) += 1;
            totals.absorb(&run.result.counters);
            anomaly_count += run.anomaly_records.len();
            total_steps += run.finished_step;
        }
        let victories = runs
            .iter()
            .filter(|run| run.result.winner.is_some())
            .count();
        Self {
            match_id,
            started_at_ms,
            finished_at_ms,
            scenario_count: runs.len(),
            anomaly_count,
            victories,
            average_steps: total_steps.checked_div(runs.len() as u64).unwrap_or(0),
            reason_counts,
            totals,
            scenarios: runs.iter().map(|run| run.result.clone()).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogLine<'a> {
    timestamp_ms: u64,
    level: &'a str,
    event: &'a str,
    match_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<u64>,
    details: Value,
}

/// Writes one JSON line per simulator event to stderr.
struct RunLog {
    match_id: String,
}

impl RunLog {
    fn emit(
        &self,
        level: &str,
        event: &str,
        scenario: Option<&Scenario>,
        step: Option<u64>,
        details: Value,
    ) {
        let line = LogLine {
            timestamp_ms: now_ms(),
            level,
            event,
            match_id: &self.match_id,
            scenario: scenario.map(|scenario| scenario.name.as_str()),
            seed: scenario.map(|scenario| scenario.seed),
            step,
            details,
        };
        eprintln!(
            "{}",
            serde_json::to_string(&line).expect("log line should serialize")
        );
    }
}

/// Random arena: every participant stands somewhere inside a square zone and
/// safe-location searches occasionally fail.
struct SimWorld {
    rng: Rng,
    zone_size: u32,
}

impl SimWorld {
    fn new(seed: u32) -> Self {
        Self {
            rng: Rng::new(seed.rotate_left(7)),
            zone_size: 200,
        }
    }

    fn jitter(&mut self, center: Location, radius: u32) -> Location {
        let radius = radius as i32;
        Location {
            x: center.x + f64::from(self.rng.int(-radius, radius)),
            y: center.y,
            z: center.z + f64::from(self.rng.int(-radius, radius)),
        }
    }
}

impl SpawnLocator for SimWorld {
    fn find_safe_location(
        &mut self,
        center: Location,
        radius: u32,
        _min_distance: u32,
        _attempts: u32,
    ) -> Option<Location> {
        if self.rng.bool(0.15) {
            return None;
        }
        Some(self.jitter(center, radius))
    }
}

impl StateReset for SimWorld {
    fn reset(&mut self, _participant: &ParticipantId) {}
}

impl ZoneGeometry for SimWorld {
    fn zone_center(&self) -> Location {
        Location {
            x: 0.0,
            y: 64.0,
            z: 0.0,
        }
    }

    fn zone_size(&self) -> u32 {
        self.zone_size
    }

    fn world_spawn(&self) -> Location {
        self.zone_center()
    }

    fn location_of(&self, participant: &ParticipantId) -> Option<Location> {
        let hash = participant
            .as_str()
            .bytes()
            .fold(0u32, |acc, byte| acc.wrapping_mul(31) ^ u32::from(byte));
        let half = self.zone_size / 2;
        Some(Location {
            x: f64::from(hash % self.zone_size) - f64::from(half),
            y: 64.0,
            z: f64::from((hash / 7) % self.zone_size) - f64::from(half),
        })
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let log = RunLog {
        match_id: cli
            .match_id
            .clone()
            .unwrap_or_else(|| default_match_id(seed_hint, run_started_at_ms)),
    };

    let base_config = match cli.config.as_deref() {
        Some(path) => match SessionConfig::load(path) {
            Ok(config) => config,
            Err(error) => {
                log.emit(
                    "error",
                    "config_load_failed",
                    None,
                    None,
                    json!({
                        "path": path.to_string_lossy(),
                        "error": error.to_string(),
                    }),
                );
                std::process::exit(2);
            }
        },
        None => SessionConfig::default(),
    };

    let mut runs = Vec::with_capacity(scenarios.len());
    for scenario in &scenarios {
        log.emit(
            "info",
            "scenario_started",
            Some(scenario),
            None,
            json!({
                "participants": scenario.participants,
                "maxSteps": scenario.max_steps,
            }),
        );
        let run = run_scenario(scenario, &base_config);

        for anomaly in &run.anomaly_records {
            log.emit(
                "warn",
                "anomaly_detected",
                Some(scenario),
                Some(anomaly.step),
                json!({ "message": anomaly.message }),
            );
        }
        log.emit(
            "info",
            "scenario_finished",
            Some(scenario),
            Some(run.finished_step),
            json!({
                "reason": run.result.reason,
                "winner": run.result.winner,
                "correctCaptures": run.result.counters.correct_captures,
                "wrongCaptures": run.result.counters.wrong_captures,
                "anomalyCount": run.anomaly_records.len(),
            }),
        );

        println!(
            "{}",
            serde_json::to_string(&run.result).expect("scenario result should serialize")
        );
        runs.push(run);
    }

    let summary = RunSummary::collect(log.match_id.clone(), run_started_at_ms, now_ms(), &runs);
    let has_anomaly = runs.iter().any(|run| !run.result.anomalies.is_empty());

    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            log.emit(
                "error",
                "summary_write_failed",
                None,
                None,
                json!({
                    "path": path.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
    }

    log.emit(
        "info",
        "run_finished",
        None,
        None,
        json!({
            "scenarioCount": summary.scenario_count,
            "victories": summary.victories,
            "anomalyCount": summary.anomaly_count,
            "averageSteps": summary.average_steps,
            "reasonCounts": summary.reason_counts,
            "summaryOut": cli.summary_out.as_ref().map(|path| path.to_string_lossy()),
        }),
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

fn init_tracing(raw_level: &str) {
    let level = raw_level.parse::<Level>().unwrap_or(Level::WARN);
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn run_scenario(scenario: &Scenario, base_config: &SessionConfig) -> ScenarioRunResult {
    let mut config = base_config.clone();
    config.seed = Some(scenario.seed);
    config.max_participants = config.max_participants.max(scenario.participants);
    config.min_participants = config.min_participants.min(scenario.participants);

    let mut session = ChainTagSession::new(config);
    let mut rng = Rng::new(scenario.seed ^ 0x9e37_79b9);
    let mut world = SimWorld::new(scenario.seed);
    let mut counters = ScenarioCounters::default();
    let mut anomalies = AnomalyLog::default();

    for idx in 0..scenario.participants {
        if let Err(error) = session.join(ParticipantId::new(format!("p{:02}", idx + 1))) {
            anomalies.record(0, format!("join rejected: {error}"));
        }
    }

    let mut now_ms = 0u64;
    match session.on_session_start(now_ms) {
        Ok(order) => {
            let shape = ChainRing::ring_shape(session.registry());
            if !shape.is_single_cycle() || shape.cycles[0].len() != order.len() {
                anomalies.record(
                    0,
                    "initial ring is not a single cycle over every participant".to_string(),
                );
            }
        }
        Err(error) => anomalies.record(0, format!("session did not start: {error}")),
    }
    session.drain_events();

    let poll_every_steps = (session.config().win_poll_interval_ms / STEP_MS).max(1);
    let mut step = 0u64;
    let mut summary = None;
    while session.is_running() && step < scenario.max_steps {
        step += 1;
        now_ms += STEP_MS;

        session.respawn_due(now_ms, &mut world);
        if let Some(outcome) = simulate_action(&mut session, &mut rng, now_ms, &mut counters) {
            if let Some(message) = check_death_outcome(&session, &outcome) {
                anomalies.record(step, message);
            }
        }
        if step % poll_every_steps == 0 {
            session.poll_win_condition(now_ms);
        }

        count_events(&session.drain_events(), &mut counters);
        for message in collect_session_anomalies(&session) {
            anomalies.record(step, message);
        }
        if let Some(ended) = session.take_summary() {
            summary = Some(ended);
        }
    }

    let summary = match summary {
        Some(summary) => Some(summary),
        None => session.stop(now_ms).ok(),
    };
    count_events(&session.drain_events(), &mut counters);
    let (reason, winner, ended_at_ms) = match summary {
        Some(summary) => (summary.reason, summary.winner, summary.ended_at_ms),
        None => (SessionEndReason::Stopped, None, now_ms),
    };

    ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            seed: scenario.seed,
            participants: scenario.participants,
            reason,
            winner,
            duration_ms: ended_at_ms,
            steps: step,
            counters,
            anomalies: anomalies.distinct,
        },
        anomaly_records: anomalies.records,
        finished_step: step,
    }
}

fn simulate_action(
    session: &mut ChainTagSession,
    rng: &mut Rng,
    now_ms: u64,
    counters: &mut ScenarioCounters,
) -> Option<DeathOutcome> {
    let alive: Vec<ParticipantId> = session
        .registry()
        .ids()
        .into_iter()
        .filter(|id| session.pending_respawn(id).is_none())
        .collect();
    if alive.is_empty() {
        return None;
    }

    let roll = rng.next_f32();
    if roll < 0.5 {
        let attacker = alive[rng.pick_index(alive.len())].clone();
        let target = session
            .participant(&attacker)
            .and_then(|participant| participant.chase_target().cloned())
            .filter(|target| alive.contains(target) && *target != attacker);
        let victim = match target {
            Some(target) if rng.bool(0.6) => target,
            _ => {
                let others: Vec<&ParticipantId> =
                    alive.iter().filter(|id| **id != attacker).collect();
                if others.is_empty() {
                    return None;
                }
                others[rng.pick_index(others.len())].clone()
            }
        };
        match session.on_combat_hit(&attacker, &victim, now_ms) {
            HitVerdict::Recorded if rng.bool(0.4) => {
                let killer = rng.bool(0.5).then(|| attacker.clone());
                Some(session.on_death(&DeathReport::new(
                    victim,
                    killer,
                    DeathCause::Combat,
                    now_ms,
                )))
            }
            HitVerdict::BlockedSameTeam => {
                counters.blocked_hits += 1;
                None
            }
            _ => None,
        }
    } else if roll < 0.62 {
        let victim = alive[rng.pick_index(alive.len())].clone();
        let cause = NATURAL_CAUSES[rng.pick_index(NATURAL_CAUSES.len())];
        let report = DeathReport::new(victim, None, cause, now_ms);
        Some(session.on_death(&report))
    } else if roll < 0.64 {
        let ids = session.registry().ids();
        let leaving = ids[rng.pick_index(ids.len())].clone();
        session.on_participant_leave(&leaving, now_ms);
        None
    } else {
        None
    }
}

fn check_death_outcome(session: &ChainTagSession, outcome: &DeathOutcome) -> Option<String> {
    if !session.is_running() {
        return None;
    }
    match outcome.classification {
        DeathClassification::CorrectCapture | DeathClassification::WrongCapture => {
            let owner = session.owner_of(&outcome.victim);
            if owner.is_none() || owner != outcome.resolved_killer {
                return Some(format!(
                    "capture of {} left owner {:?}, expected {:?}",
                    outcome.victim, owner, outcome.resolved_killer
                ));
            }
            None
        }
        DeathClassification::NaturalDeath if outcome.place_near_owner => {
            Some(format!(
                "natural death of {} asked for owner placement",
                outcome.victim
            ))
        }
        _ => None,
    }
}

fn collect_session_anomalies(session: &ChainTagSession) -> Vec<String> {
    let mut anomalies = Vec::new();
    if !session.is_running() {
        return anomalies;
    }

    let shape = ChainRing::ring_shape(session.registry());
    if shape.cycles.len() > 1 {
        anomalies.push(format!(
            "hunter ring split into {} cycles",
            shape.cycles.len()
        ));
    }

    for id in session.snapshot(0).pending_respawns {
        if session.participant(&id).is_none() {
            anomalies.push(format!("pending respawn for departed participant: {id}"));
        }
    }

    for participant in session.registry().iter() {
        if participant.chase_target().is_some() && participant.owner().is_some() {
            anomalies.push(format!(
                "participant has both target and owner: {}",
                participant.id()
            ));
        }
    }
    anomalies
}

fn count_events(events: &[SessionEvent], counters: &mut ScenarioCounters) {
    for event in events {
        match event {
            SessionEvent::CorrectCapture { .. } => counters.correct_captures += 1,
            SessionEvent::WrongCapture { .. } => counters.wrong_captures += 1,
            SessionEvent::NaturalDeath { .. } => counters.natural_deaths += 1,
            SessionEvent::FollowerDeath { .. } => counters.follower_deaths += 1,
            SessionEvent::HunterSucceeded { .. } => counters.successions += 1,
            SessionEvent::RingBroken { .. } => counters.ring_breaks += 1,
            SessionEvent::ParticipantLeft { .. } => counters.departures += 1,
            SessionEvent::Respawned { .. } => counters.respawns += 1,
            _ => {}
        }
    }
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = cli.seed.unwrap_or_else(now_ms) as u32;
    let max_steps = cli.max_steps.unwrap_or(DEFAULT_MAX_STEPS).max(1);

    if let Some(players) = cli.players {
        let participants = players.clamp(2, 64);
        return vec![Scenario {
            name: format!("custom-p{participants}"),
            participants,
            max_steps,
            seed,
        }];
    }

    vec![
        Scenario {
            name: "duel-p2".to_string(),
            participants: 2,
            max_steps,
            seed,
        },
        Scenario {
            name: "ring-check-p6".to_string(),
            participants: 6,
            max_steps,
            seed: seed.wrapping_add(1),
        },
        Scenario {
            name: "full-lobby-p10".to_string(),
            participants: 10,
            max_steps,
            seed: seed.wrapping_add(2),
        },
    ]
}

fn default_match_id(seed: u32, timestamp_ms: u64) -> String {
    format!("chain-tag-{seed:08x}-{timestamp_ms}")
}

fn end_reason_key(reason: SessionEndReason) -> String {
    match reason {
        SessionEndReason::Victory => "victory",
        SessionEndReason::NoContestants => "no_contestants",
        SessionEndReason::Stopped => "stopped",
    }
    .to_string()
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, summary).map_err(io::Error::from)
}
