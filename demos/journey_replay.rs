//! Replay a recorded GPS log through a journey session.
//!
//! Run with: cargo run --example journey_replay

use std::sync::Arc;

use hitch_core::{
    Appreciation, Direction, GpsPoint, JourneyConfig, JourneySession, LocationUpdate, ManualStep,
    MemoryTravelStore, PushLocationTracker, Spot, StepType, UserId,
};

const MINUTE: i64 = 60_000;

fn main() {
    let tracker = Arc::new(PushLocationTracker::new());
    let store = Arc::new(MemoryTravelStore::new());
    let session = JourneySession::new(Arc::clone(&tracker), store, JourneyConfig::default());

    // Toll gate south of Lyon
    let spot = Spot::new(
        GpsPoint::new(45.7086, 4.8531),
        "A7 toll Vienne",
        Appreciation::Perfect,
        Direction::South,
        vec!["Marseille".into(), "Valence".into()],
        "demo",
        0,
    );
    session.update_nearby_spots(vec![spot]);

    let start = hitch_core::now_ms();
    if !session.start_journey("Lyon", "Valence", UserId::new("demo-user")) {
        eprintln!("Could not start the journey");
        return;
    }

    // (minute offset, lat, lng, speed m/s)
    let log: &[(i64, f64, f64, Option<f64>)] = &[
        (0, 45.7086, 4.8531, None),
        (2, 45.7087, 4.8530, None),
        (5, 45.7086, 4.8532, None),
        (14, 45.7086, 4.8531, None),
        (15, 45.6500, 4.8600, Some(25.0)),
        (30, 45.2000, 4.8700, Some(30.0)),
        (45, 44.9500, 4.8900, Some(28.0)),
        (46, 44.9330, 4.8920, None),
        (50, 44.9331, 4.8921, None),
        (57, 44.9330, 4.8920, None),
    ];

    for &(minute, lat, lng, speed) in log {
        let mut fix = LocationUpdate::new(lat, lng, start + minute * MINUTE);
        if let Some(speed) = speed {
            fix = fix.with_speed(speed);
        }
        tracker.push(fix);
        println!("+{:>2} min  {:?}", minute, session.journey_state().status);
    }

    session.add_manual_step(ManualStep {
        step_type: Some(StepType::Walking),
        notes: Some("Walked to the station".to_string()),
        ..ManualStep::default()
    });

    let Some(travel) = session.stop_journey() else {
        eprintln!("No journey in progress");
        return;
    };

    println!("\nTravel {} -> {} ({} steps)", travel.origin, travel.destination, travel.steps.len());
    for step in &travel.steps {
        let minutes = step
            .duration_minutes()
            .map_or("open".to_string(), |m| format!("{:.0} min", m));
        println!("  {:<10} {}", step.step_type.as_str(), minutes);
    }
    println!("Total waiting: {:.0} min", travel.total_wait_time);
}
