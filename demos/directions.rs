//! Compute a route with OpenRouteService and list the spots along it.
//! Run with: ORS_API_KEY=... cargo run --example directions --features http

use hitch_core::{
    Appreciation, Direction, GpsPoint, MemorySpotStore, NavigationSession, OrsClient, RoutingConfig, Spot,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = RoutingConfig::from_env();
    if config.api_key.is_none() {
        eprintln!("ORS_API_KEY is not set, the request will fail");
    }
    let client = OrsClient::new(config)?;

    let spots = MemorySpotStore::with_spots(vec![
        Spot::new(GpsPoint::new(45.7086, 4.8531), "A7 toll Vienne", Appreciation::Perfect, Direction::South, vec![], "demo", 0),
        Spot::new(GpsPoint::new(45.0430, 4.8700), "A7 Saint-Rambert", Appreciation::Good, Direction::South, vec![], "demo", 0),
    ]);

    let mut navigation = NavigationSession::new(client, spots);
    navigation.set_destination(GpsPoint::new(44.9334, 4.8924), "Valence");

    let lyon = GpsPoint::new(45.7640, 4.8357);
    match navigation.start_navigation(lyon).await {
        Ok(()) => {
            let state = navigation.state();
            if let Some(route) = &state.route {
                println!(
                    "Route to {}: {} km, {} min, {} points",
                    route.destination_name,
                    route.distance_km,
                    route.duration_minutes,
                    route.polyline.len()
                );
            }
            for s in &state.spots_on_route {
                println!("  {} ({}m from route)", s.spot.road_name, s.distance_from_route_meters);
            }
        }
        Err(failure) => eprintln!("Routing failed: {}", failure),
    }

    Ok(())
}
