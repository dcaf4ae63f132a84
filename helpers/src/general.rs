/// format_laptime formats a duration in seconds as `m:ss.mmm`, e.g. `1:34.512`. Negative and
/// non-finite inputs are shown as `0:00.000`.
pub fn format_laptime(t: f64) -> String {
    if !t.is_finite() || t <= 0.0 {
        return String::from("0:00.000");
    }

    // round to milliseconds first so that 59.9996s does not print as 0:60.000
    let t_ms = (t * 1000.0).round() as u64;
    let minutes = t_ms / 60_000;
    let seconds = (t_ms % 60_000) as f64 / 1000.0;

    format!("{}:{:06.3}", minutes, seconds)
}

/// format_racetime formats the race clock as `h:mm:ss.s`, e.g. `0:01:35.2`.
pub fn format_racetime(t: f64) -> String {
    if !t.is_finite() || t <= 0.0 {
        return String::from("0:00:00.0");
    }

    let t_ds = (t * 10.0).round() as u64;
    let hours = t_ds / 36_000;
    let minutes = (t_ds % 36_000) / 600;
    let seconds = (t_ds % 600) as f64 / 10.0;

    format!("{}:{:02}:{:04.1}", hours, minutes, seconds)
}

/// parse_laptime is the inverse of format_laptime. Plain seconds (`94.5`), `m:ss.mmm` and
/// `h:mm:ss.s` are accepted.
pub fn parse_laptime(s: &str) -> Option<f64> {
    let s = s.trim();

    if let Ok(t) = s.parse::<f64>() {
        return Some(t);
    }

    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [m, sec] => Some(m.parse::<u64>().ok()? as f64 * 60.0 + sec.parse::<f64>().ok()?),
        [h, m, sec] => Some(
            h.parse::<u64>().ok()? as f64 * 3600.0
                + m.parse::<u64>().ok()? as f64 * 60.0
                + sec.parse::<f64>().ok()?,
        ),
        _ => None,
    }
}

/// lerp_2d returns the point at fraction t between a and b. t is clamped to [0.0, 1.0].
pub fn lerp_2d(a: [f64; 2], b: [f64; 2], t: f64) -> [f64; 2] {
    let t = clamp_unit(t);
    [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t]
}

/// clamp_unit clamps x to [0.0, 1.0]. NaN becomes 0.0.
pub fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}
