//! Generators for synthetic decoder output.
//!
//! The external decoder prints `latitude longitude value fieldTag` per line;
//! the plain-text radiation feed prints `value latitude longitude`. These
//! helpers build predictable payloads in both formats.

/// Every grid point of an extent at `step`, row-major.
pub fn grid_points(extent: (f64, f64, f64, f64), step: f64) -> Vec<(f64, f64)> {
    let (min_lat, max_lat, min_long, max_long) = extent;
    let n_lat = ((max_lat - min_lat) / step + 1e-6).floor() as usize + 1;
    let n_long = ((max_long - min_long) / step + 1e-6).floor() as usize + 1;

    let mut points = Vec::with_capacity(n_lat * n_long);
    for i in 0..n_lat {
        for j in 0..n_long {
            points.push((min_lat + i as f64 * step, min_long + j as f64 * step));
        }
    }
    points
}

/// Decoder output with the same `value` at every grid point.
///
/// # Example
///
/// ```
/// use test_utils::uniform_decoder_output;
///
/// let out = uniform_decoder_output((0.0, 1.0, 0.0, 1.0), 1.0, 20.0, "TMP");
/// assert_eq!(out.lines().count(), 4);
/// assert_eq!(out.lines().next(), Some("0 0 20 TMP"));
/// ```
pub fn uniform_decoder_output(
    extent: (f64, f64, f64, f64),
    step: f64,
    value: f64,
    tag: &str,
) -> String {
    decoder_output(extent, step, tag, |_, _| value)
}

/// Decoder output with a value computed from each point.
pub fn decoder_output<F>(extent: (f64, f64, f64, f64), step: f64, tag: &str, mut value: F) -> String
where
    F: FnMut(f64, f64) -> f64,
{
    grid_points(extent, step)
        .into_iter()
        .map(|(lat, long)| format!("{} {} {} {}\n", lat, long, value(lat, long), tag))
        .collect()
}

/// Plain-text feed lines (`value latitude longitude`) for every grid point.
pub fn text_feed_output(extent: (f64, f64, f64, f64), step: f64, value: f64) -> String {
    grid_points(extent, step)
        .into_iter()
        .map(|(lat, long)| format!("{} {} {}\n", value, lat, long))
        .collect()
}

/// Lines a decoder might emit that do not match the tuple format.
pub fn garbage_lines() -> &'static str {
    "\n# header\nnot a number at all\n1.0 2.0\n1.0 abc 3.0 TMP\n"
}
