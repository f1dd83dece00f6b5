//! Fleet Simulator CLI
//!
//! Drives a simulated delivery fleet through the telemetry engine and prints
//! the resulting driver leaderboard.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use fleet_simulator::{DrivingProfile, FleetOptions, FleetSimulator, SimulatorConfig};

#[derive(Parser, Debug)]
#[command(name = "fleet-simulator")]
#[command(about = "Simulate a delivery fleet against the telemetry engine")]
struct Args {
    /// Number of vehicles
    #[arg(short, long, default_value = "4")]
    vehicles: usize,

    /// Delivery stops per route
    #[arg(short, long, default_value = "6")]
    stops: usize,

    /// Random seed, fresh when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Simulated seconds between samples
    #[arg(long, default_value = "5")]
    tick_s: u32,

    /// Wall-clock pause between samples in milliseconds
    #[arg(long, default_value = "0")]
    tick_ms: u64,

    /// Chance per tick of a speeding burst
    #[arg(long, default_value = "0.02")]
    speeding_chance: f64,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print the full report as JSON on stdout
    #[arg(long)]
    report_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = SimulatorConfig::from_env();

    // Initialize tracing
    let json = args.json_logs || config.json_logs;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .init();

    info!(version = fleet_simulator::VERSION, "Starting fleet simulation");

    let options = FleetOptions {
        vehicles: args.vehicles,
        stops: args.stops,
        tick_s: args.tick_s,
        tick_delay: Duration::from_millis(args.tick_ms),
        seed: args.seed.unwrap_or_else(rand::random),
        profile: DrivingProfile {
            speeding_chance: args.speeding_chance.clamp(0.0, 1.0),
            ..DrivingProfile::default()
        },
        ..FleetOptions::default()
    };
    info!(
        vehicles = options.vehicles,
        stops = options.stops,
        seed = options.seed,
        "Fleet configured"
    );

    let simulator = FleetSimulator::new(&config, options).await?;
    let report = simulator.run().await?;

    info!("=== FINAL LEADERBOARD ===");
    for entry in &report.leaderboard {
        info!(
            "#{} {} - {:.2} ({}) | {} trips, {:.1} km",
            entry.rank,
            entry.name,
            entry.overall_score,
            entry.grade.as_str(),
            entry.total_trips,
            entry.total_distance_km
        );
    }

    for trip in &report.trips {
        info!(
            trip_id = %trip.id,
            distance_km = format!("{:.2}", trip.total_distance_km),
            max_speed_kmh = format!("{:.1}", trip.max_speed_kmh),
            violations = trip.violations,
            "Trip summary"
        );
    }

    info!(
        samples = report.stats.samples,
        rejected = report.stats.rejected,
        events = ?report.stats.events,
        geofence_transitions = report.stats.geofence_transitions,
        "Totals"
    );
    info!(
        invoice = %report.invoice.invoice_number,
        amount = %report.invoice.formatted_amount(),
        status = report.invoice.status.as_str(),
        "Subscription billed"
    );

    if args.report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
