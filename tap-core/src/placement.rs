use rand::Rng;
use tap_types::{PlayArea, Position};

/// Uniformly random top-left corner for a square footprint of `size`, chosen
/// so the whole footprint stays inside `area`.
pub fn random_position<R: Rng + ?Sized>(rng: &mut R, area: PlayArea, size: u32) -> Position {
    let (max_x, max_y) = area.max_origin(size);
    Position {
        x: rng.random_range(0..=max_x),
        y: rng.random_range(0..=max_y),
    }
}
