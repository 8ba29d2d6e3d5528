//! Find hitchhiking spots along a driving route.
//!
//! Run with: cargo run --example route_spots

use hitch_core::{
    decode_polyline, distance_to_destination, find_spots_along_route, Appreciation, Direction, GpsPoint,
    NavigationRoute, Spot, MAX_DISTANCE_FROM_ROUTE_METERS,
};

fn main() {
    // Reference polyline from the Google encoding docs (California coast)
    let polyline = decode_polyline("_p~iF~ps|U_ulLnnqC_mqNvxq`@");
    println!("Decoded {} route points", polyline.len());

    let origin = polyline[0];
    let destination = polyline[polyline.len() - 1];
    let route = NavigationRoute::new(origin, destination, "Point Arena", polyline, 790_000.0, 32_400.0, 0);

    let spots = vec![
        Spot::new(GpsPoint::new(38.5, -120.201), "Highway 50 on-ramp", Appreciation::Perfect, Direction::NorthWest, vec!["Sacramento".into()], "demo", 0),
        Spot::new(GpsPoint::new(40.7, -120.95), "Susanville gas station", Appreciation::Good, Direction::West, vec![], "demo", 0),
        Spot::new(GpsPoint::new(39.0, -123.0), "Ukiah rest area", Appreciation::Bad, Direction::North, vec![], "demo", 0),
    ];

    println!(
        "Route to {}: {} km, {} min, corridor {}m\n",
        route.destination_name, route.distance_km, route.duration_minutes, MAX_DISTANCE_FROM_ROUTE_METERS
    );

    let on_route = find_spots_along_route(&route, &spots);
    if on_route.is_empty() {
        println!("No spots along this route");
    }
    for (i, s) in on_route.iter().enumerate() {
        println!(
            "{}. {} ({}, facing {})",
            i + 1,
            s.spot.road_name,
            s.spot.appreciation.as_str(),
            s.spot.direction
        );
        println!(
            "   {}m from route, near point #{}, {:.1} km from destination",
            s.distance_from_route_meters,
            s.closest_route_point_index,
            distance_to_destination(&s.spot.coordinates, &route.destination) / 1000.0
        );
    }

    println!("\n{} of {} spots skipped", spots.len() - on_route.len(), spots.len());
}
