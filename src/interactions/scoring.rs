use crate::interactions::config::MatchConfig;

/// Distance-based confidence for a match at `distance_nm`.
///
/// Returns 0.0 beyond the threshold (or for a zero threshold), which the
/// matcher treats as "no match".
pub fn distance_confidence(distance_nm: f64, config: &MatchConfig) -> f64 {
    let threshold = config.distance_threshold_nm;
    if threshold.is_nan()
        || threshold <= 0.0
        || !distance_nm.is_finite()
        || distance_nm > threshold
    {
        return 0.0;
    }

    let inner = threshold * config.inner_radius_ratio.clamp(0.0, 1.0);
    if distance_nm <= inner {
        return 1.0;
    }

    let span = threshold - inner;
    let progress = (distance_nm - inner) / span;
    1.0 - (1.0 - config.min_confidence) * progress
}

/// Adds `bonus` when the controller belongs to one of the flight's airports
/// (callsign prefixed with the ICAO code, e.g. `YSSY_TWR`). Capped at 1.0.
pub fn apply_airport_affinity(
    confidence: f64,
    controller_callsign: &str,
    airports: &[&str],
    bonus: f64,
) -> f64 {
    let callsign = controller_callsign.to_ascii_uppercase();
    let affine = airports
        .iter()
        .map(|icao| icao.trim().to_ascii_uppercase())
        .filter(|icao| !icao.is_empty())
        .any(|icao| callsign.starts_with(&icao));

    if affine {
        (confidence + bonus).min(1.0)
    } else {
        confidence
    }
}
