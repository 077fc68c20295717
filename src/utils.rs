use std::time::Duration;

/// Axis offsets of the Von Neumann neighborhood: left, right, up, down.
pub const NEIGHBOR_OFFSETS: [(isize, isize); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

/// Coordinates of the in-bounds lateral neighbors of `(x, y)` in a
/// `width x height` grid. No wraparound.
pub fn von_neumann_neighbors(
    x: usize,
    y: usize,
    width: usize,
    height: usize,
) -> impl Iterator<Item = (usize, usize)> {
    NEIGHBOR_OFFSETS.into_iter().filter_map(move |(dx, dy)| {
        let nx = x.checked_add_signed(dx)?;
        let ny = y.checked_add_signed(dy)?;
        (nx < width && ny < height).then_some((nx, ny))
    })
}

/// Splits a duration into hours, minutes and seconds.
pub fn hms(elapsed: Duration) -> (u64, u64, u64) {
    let secs = elapsed.as_secs();
    (secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Change from `previous` to `current` in percentage points, 0 when there is
/// no previous value.
pub fn percent_delta(previous: Option<f32>, current: f32) -> f32 {
    previous.map_or(0.0, |p| (current - p) * 100.0)
}
