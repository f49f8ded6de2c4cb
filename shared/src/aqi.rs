//! Air Quality Index bands and the marker palette used for sensor overlays.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Color for readings that carry no usable AQI.
pub const MISSING_COLOR: &str = "#888888";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiBand {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiBand {
    pub const ALL: [AqiBand; 6] = [
        Self::Good,
        Self::Moderate,
        Self::UnhealthyForSensitiveGroups,
        Self::Unhealthy,
        Self::VeryUnhealthy,
        Self::Hazardous,
    ];

    /// Bands are closed on their upper bound: 50 is still `Good`.
    pub fn from_aqi(aqi: f64) -> Self {
        if aqi <= 50.0 {
            Self::Good
        } else if aqi <= 100.0 {
            Self::Moderate
        } else if aqi <= 150.0 {
            Self::UnhealthyForSensitiveGroups
        } else if aqi <= 200.0 {
            Self::Unhealthy
        } else if aqi <= 300.0 {
            Self::VeryUnhealthy
        } else {
            Self::Hazardous
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            Self::Good => "#00e400",
            Self::Moderate => "#ffff00",
            Self::UnhealthyForSensitiveGroups => "#ff7e00",
            Self::Unhealthy => "#ff0000",
            Self::VeryUnhealthy => "#99004c",
            Self::Hazardous => "#7e0023",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Moderate => "Moderate",
            Self::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            Self::Unhealthy => "Unhealthy",
            Self::VeryUnhealthy => "Very Unhealthy",
            Self::Hazardous => "Hazardous",
        }
    }

    pub fn range_label(self) -> &'static str {
        match self {
            Self::Good => "0-50",
            Self::Moderate => "51-100",
            Self::UnhealthyForSensitiveGroups => "101-150",
            Self::Unhealthy => "151-200",
            Self::VeryUnhealthy => "201-300",
            Self::Hazardous => "300+",
        }
    }
}

pub fn band(aqi: Option<f64>) -> Option<AqiBand> {
    aqi.filter(|v| !v.is_nan()).map(AqiBand::from_aqi)
}

pub fn color(aqi: Option<f64>) -> &'static str {
    band(aqi).map(AqiBand::color).unwrap_or(MISSING_COLOR)
}

/// Legend rows in display order: `(color, "Label (range)")`.
pub fn legend() -> Vec<(&'static str, String)> {
    AqiBand::ALL
        .iter()
        .map(|b| (b.color(), format!("{} ({})", b.label(), b.range_label())))
        .collect()
}

/// Station feeds report the index as a number, a numeric string, or `"-"`
/// when a station is offline.
pub fn deserialize_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_palette() {
        assert_eq!(color(Some(0.0)), "#00e400");
        assert_eq!(color(Some(75.0)), "#ffff00");
        assert_eq!(color(Some(125.0)), "#ff7e00");
        assert_eq!(color(Some(175.0)), "#ff0000");
        assert_eq!(color(Some(250.0)), "#99004c");
        assert_eq!(color(Some(350.0)), "#7e0023");
        assert_eq!(color(None), "#888888");
    }

    #[test]
    fn upper_bounds_are_inclusive() {
        assert_eq!(AqiBand::from_aqi(50.0), AqiBand::Good);
        assert_eq!(AqiBand::from_aqi(50.5), AqiBand::Moderate);
        assert_eq!(AqiBand::from_aqi(100.0), AqiBand::Moderate);
        assert_eq!(AqiBand::from_aqi(150.0), AqiBand::UnhealthyForSensitiveGroups);
        assert_eq!(AqiBand::from_aqi(200.0), AqiBand::Unhealthy);
        assert_eq!(AqiBand::from_aqi(300.0), AqiBand::VeryUnhealthy);
        assert_eq!(AqiBand::from_aqi(300.1), AqiBand::Hazardous);
    }

    #[test]
    fn nan_counts_as_missing() {
        assert_eq!(color(Some(f64::NAN)), MISSING_COLOR);
        assert_eq!(band(Some(f64::NAN)), None);
    }

    #[test]
    fn legend_covers_every_band() {
        let rows = legend();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0], ("#00e400", "Good (0-50)".to_string()));
        assert_eq!(rows[5], ("#7e0023", "Hazardous (300+)".to_string()));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_band_is_monotonic(a in -10.0f64..600.0, b in -10.0f64..600.0) {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                prop_assert!(AqiBand::from_aqi(lo) <= AqiBand::from_aqi(hi));
            }

            #[test]
            fn prop_color_matches_band(aqi in 0.0f64..1000.0) {
                prop_assert_eq!(color(Some(aqi)), AqiBand::from_aqi(aqi).color());
            }
        }
    }
}
