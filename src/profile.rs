//! Staged ramp of concurrent users.
//!
//! A [`LoadProfile`] is a list of [`Stage`]s, each moving the number of running
//! users linearly from the previous target to its own target over its duration.
//! Goose runs profiles natively as a test plan, so the profile is handed to the
//! attack as a `"{users},{timespan};..."` string.

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::LoadTestError;

/// Duration of the warm-up stage of [`LoadProfile::standard`].
pub const WARM_UP: Duration = Duration::from_secs(10);
/// Duration of the sustained load stage of [`LoadProfile::standard`].
pub const SUSTAINED_LOAD: Duration = Duration::from_secs(30);
/// Duration of the ramp-down stage of [`LoadProfile::standard`].
pub const RAMP_DOWN: Duration = Duration::from_secs(10);

/// One step of the ramp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stage {
    /// Number of users running when the stage ends.
    pub target: usize,
    /// How long it takes to get there.
    pub duration: Duration,
}

/// Ordered ramp stages, starting from zero users.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadProfile {
    stages: Vec<Stage>,
}

impl LoadProfile {
    /// Build a profile from explicit stages.
    pub fn new(stages: Vec<Stage>) -> Self {
        LoadProfile { stages }
    }

    /// Warm up to a tenth of `users`, hold at `users`, then ramp down to zero.
    pub fn standard(users: usize) -> Self {
        let warm_up = if users == 0 { 0 } else { (users / 10).max(1) };
        LoadProfile::new(vec![
            Stage {
                target: warm_up,
                duration: WARM_UP,
            },
            Stage {
                target: users,
                duration: SUSTAINED_LOAD,
            },
            Stage {
                target: 0,
                duration: RAMP_DOWN,
            },
        ])
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// The highest number of users any stage asks for.
    pub fn max_target(&self) -> usize {
        self.stages.iter().map(|stage| stage.target).max().unwrap_or(0)
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|stage| stage.duration).sum()
    }

    /// Number of users the ramp asks for `elapsed` after the start.
    ///
    /// Interpolates linearly inside a stage, so the result always lies between
    /// the targets of the surrounding stage boundaries: never below zero, never
    /// above [`LoadProfile::max_target`].
    pub fn target_at(&self, elapsed: Duration) -> usize {
        let mut previous = 0;
        let mut started = Duration::ZERO;
        for stage in &self.stages {
            let ends = started + stage.duration;
            if elapsed < ends {
                let progress = (elapsed - started).as_secs_f64() / stage.duration.as_secs_f64();
                let from = previous as f64;
                let to = stage.target as f64;
                return (from + (to - from) * progress).round() as usize;
            }
            previous = stage.target;
            started = ends;
        }
        previous
    }

    /// Confirm the profile can be run with at most `users` concurrent users.
    pub fn validate(&self, users: usize) -> Result<(), LoadTestError> {
        if self.stages.is_empty() {
            return Err(LoadTestError::InvalidProfile {
                detail: "at least one stage is required".to_string(),
            });
        }
        if let Some(stage) = self.stages.iter().find(|stage| stage.target > users) {
            return Err(LoadTestError::InvalidProfile {
                detail: format!(
                    "stage target of {} users exceeds the configured {} users",
                    stage.target, users
                ),
            });
        }
        Ok(())
    }

    /// Render the profile as a Goose `--test-plan` value.
    pub fn to_test_plan(&self) -> String {
        self.stages
            .iter()
            .map(|stage| format!("{},{}s", stage.target, stage.duration.as_secs()))
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl fmt::Display for LoadProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_test_plan())
    }
}

/// Parse the `"{users},{timespan};{users},{timespan}"` format Goose uses for test plans.
///
/// Time span can be an integer number of seconds, or use "h", "m", and "s" in that
/// order: 20, 20s, 3m, 2h, 1h20m, 3h30m10s.
impl FromStr for LoadProfile {
    type Err = LoadTestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let re = Regex::new(r"^\s*(\d+)\s*,\s*(\d+|(\d+h)?(\d+m)?(\d+s)?)\s*$").map_err(|e| {
            LoadTestError::InvalidProfile {
                detail: e.to_string(),
            }
        })?;

        let mut stages = Vec::new();
        for line in s.split(';').filter(|line| !line.trim().is_empty()) {
            let invalid = || LoadTestError::InvalidProfile {
                detail: format!(
                    "invalid stage '{}', expected \"{{users}},{{timespan}}\"",
                    line.trim()
                ),
            };
            let cap = re.captures(line).ok_or_else(invalid)?;
            let target = cap[1].parse::<usize>().map_err(|_| invalid())?;
            let duration = parse_timespan(&cap[2]).ok_or_else(invalid)?;
            stages.push(Stage { target, duration });
        }

        if stages.is_empty() {
            return Err(LoadTestError::InvalidProfile {
                detail: "at least one stage is required".to_string(),
            });
        }
        Ok(LoadProfile::new(stages))
    }
}

/// Parse a time span such as `45`, `30s`, `2m` or `1h2m3s`.
pub fn parse_timespan(time_str: &str) -> Option<Duration> {
    if let Ok(seconds) = u64::from_str(time_str) {
        return Some(Duration::from_secs(seconds));
    }
    if time_str.is_empty() {
        return None;
    }

    let re = Regex::new(r"^((?P<hours>\d+)h)?((?P<minutes>\d+)m)?((?P<seconds>\d+)s)?$").ok()?;
    let caps = re.captures(time_str)?;
    let unit = |name: &str| -> u64 {
        caps.name(name)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    Some(Duration::from_secs(
        unit("hours") * 3_600 + unit("minutes") * 60 + unit("seconds"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_profile_matches_warm_up_load_ramp_down() {
        let profile = LoadProfile::standard(3000);
        assert_eq!(
            profile.stages(),
            &[
                Stage {
                    target: 300,
                    duration: Duration::from_secs(10)
                },
                Stage {
                    target: 3000,
                    duration: Duration::from_secs(30)
                },
                Stage {
                    target: 0,
                    duration: Duration::from_secs(10)
                },
            ]
        );
        assert_eq!(profile.total_duration(), Duration::from_secs(50));
        assert_eq!(profile.to_test_plan(), "300,10s;3000,30s;0,10s");
    }

    #[test]
    fn tiny_user_counts_still_warm_up() {
        assert_eq!(LoadProfile::standard(5).stages()[0].target, 1);
        assert_eq!(LoadProfile::standard(1).stages()[0].target, 1);
        assert_eq!(LoadProfile::standard(0).stages()[0].target, 0);
    }

    #[test]
    fn target_at_interpolates_inside_stages() {
        let profile = LoadProfile::standard(3000);
        assert_eq!(profile.target_at(Duration::ZERO), 0);
        assert_eq!(profile.target_at(Duration::from_secs(5)), 150);
        assert_eq!(profile.target_at(Duration::from_secs(10)), 300);
        assert_eq!(profile.target_at(Duration::from_secs(25)), 1650);
        assert_eq!(profile.target_at(Duration::from_secs(40)), 3000);
        assert_eq!(profile.target_at(Duration::from_secs(45)), 1500);
        assert_eq!(profile.target_at(Duration::from_secs(50)), 0);
        assert_eq!(profile.target_at(Duration::from_secs(500)), 0);
    }

    #[test]
    fn target_at_stays_within_bounds() {
        for users in [1, 7, 10, 99, 3000] {
            let profile = LoadProfile::standard(users);
            let mut elapsed = Duration::ZERO;
            while elapsed <= profile.total_duration() + Duration::from_secs(1) {
                let target = profile.target_at(elapsed);
                assert!(target <= users, "{} users at {:?}", target, elapsed);
                elapsed += Duration::from_millis(250);
            }
        }
    }

    #[test]
    fn zero_length_stages_jump() {
        let profile: LoadProfile = "10,0;10,5s;0,0".parse().unwrap();
        assert_eq!(profile.target_at(Duration::ZERO), 10);
        assert_eq!(profile.target_at(Duration::from_secs(3)), 10);
        assert_eq!(profile.target_at(Duration::from_secs(5)), 0);
    }

    #[test]
    fn parses_goose_test_plans() {
        let profile: LoadProfile = " 10 , 1m30s ; 100,2h; 0,45 ".parse().unwrap();
        assert_eq!(
            profile.stages(),
            &[
                Stage {
                    target: 10,
                    duration: Duration::from_secs(90)
                },
                Stage {
                    target: 100,
                    duration: Duration::from_secs(7200)
                },
                Stage {
                    target: 0,
                    duration: Duration::from_secs(45)
                },
            ]
        );
        assert_eq!(profile.max_target(), 100);
    }

    #[test]
    fn rejects_malformed_plans() {
        assert!("".parse::<LoadProfile>().is_err());
        assert!("10".parse::<LoadProfile>().is_err());
        assert!("10,10x".parse::<LoadProfile>().is_err());
        assert!("-1,10s".parse::<LoadProfile>().is_err());
    }

    #[test]
    fn validate_bounds_targets() {
        let profile = LoadProfile::standard(100);
        assert!(profile.validate(100).is_ok());
        assert!(matches!(
            profile.validate(99),
            Err(LoadTestError::InvalidProfile { .. })
        ));
        assert!(LoadProfile::new(Vec::new()).validate(10).is_err());
    }

    #[test]
    fn timespans() {
        assert_eq!(parse_timespan("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_timespan("1h2m3s"), Some(Duration::from_secs(3_723)));
        assert_eq!(parse_timespan("3m"), Some(Duration::from_secs(180)));
        assert_eq!(parse_timespan("foo"), None);
        assert_eq!(parse_timespan(""), None);
    }
}
