//! Quality modes and level selection.

/// How the player should pick a rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityMode {
    /// Engine-driven adaptive bitrate.
    #[default]
    Auto,
    /// Pin to the rendition with this vertical resolution.
    Fixed { height: u32 },
}

impl QualityMode {
    pub fn fixed(height: u32) -> Self {
        Self::Fixed { height }
    }
}

impl std::fmt::Display for QualityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Fixed { height } => write!(f, "{height}p"),
        }
    }
}

impl std::str::FromStr for QualityMode {
    type Err = String;

    /// Accepts `auto`, `720` or `720p`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        let digits = s.strip_suffix(['p', 'P']).unwrap_or(s);
        digits
            .parse::<u32>()
            .map(|height| Self::Fixed { height })
            .map_err(|_| format!("invalid quality `{s}`: expected `auto` or a height like `720p`"))
    }
}

/// One variant stream of an adaptive manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    /// Media playlist URI, resolved against the master playlist.
    pub uri: String,
    /// Vertical resolution; 0 when the manifest does not advertise one.
    pub height: u32,
    /// Advertised peak bandwidth in bits per second.
    pub bandwidth: u64,
}

impl Level {
    /// Rendition label in backend form, e.g. `720p`.
    pub fn label(&self) -> String {
        format!("{}p", self.height)
    }
}

/// Pick the level for a fixed-height request.
///
/// Exact height match wins; otherwise the level with the smallest absolute
/// height difference, ties broken by first occurrence. Levels without an
/// advertised height are skipped in the nearest-neighbor pass, but a level is
/// always returned when any exist; transient level-list states must never
/// leave playback unpinned.
pub fn select_level(levels: &[Level], height: u32) -> Option<usize> {
    if levels.is_empty() {
        return None;
    }

    if let Some(exact) = levels.iter().position(|l| l.height == height) {
        return Some(exact);
    }

    let mut best = 0usize;
    let mut best_diff = u32::MAX;
    for (index, level) in levels.iter().enumerate() {
        if level.height == 0 {
            continue;
        }
        let diff = level.height.abs_diff(height);
        if diff < best_diff {
            best_diff = diff;
            best = index;
        }
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(height: u32) -> Level {
        Level {
            uri: format!("{height}p/index.m3u8"),
            height,
            bandwidth: u64::from(height) * 5_000,
        }
    }

    #[test]
    fn exact_height_is_selected() {
        let levels = [level(480), level(720), level(1080)];
        assert_eq!(select_level(&levels, 720), Some(1));
    }

    #[test]
    fn nearest_height_is_selected_when_exact_missing() {
        let levels = [level(480), level(720), level(1080)];
        // 900 is 180 away from 720 and 1080 alike; first occurrence wins.
        assert_eq!(select_level(&levels, 900), Some(1));
        assert_eq!(select_level(&levels, 1440), Some(2));
        assert_eq!(select_level(&levels, 144), Some(0));
    }

    #[test]
    fn tie_breaks_to_first_occurrence() {
        let levels = [level(1080), level(720), level(480)];
        // 900 now ties between index 0 (1080) and index 1 (720).
        assert_eq!(select_level(&levels, 900), Some(0));
    }

    #[test]
    fn unadvertised_heights_are_skipped_in_fallback() {
        let levels = [level(0), level(480)];
        assert_eq!(select_level(&levels, 1080), Some(1));
    }

    #[test]
    fn all_unadvertised_still_selects_something() {
        let levels = [level(0), level(0)];
        assert_eq!(select_level(&levels, 720), Some(0));
    }

    #[test]
    fn empty_levels_select_nothing() {
        assert_eq!(select_level(&[], 720), None);
    }

    #[test]
    fn quality_mode_parses() {
        assert_eq!("auto".parse::<QualityMode>().unwrap(), QualityMode::Auto);
        assert_eq!(
            "720p".parse::<QualityMode>().unwrap(),
            QualityMode::fixed(720)
        );
        assert_eq!(
            "1080".parse::<QualityMode>().unwrap(),
            QualityMode::fixed(1080)
        );
        assert!("best".parse::<QualityMode>().is_err());
    }
}
