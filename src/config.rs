use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::tracking::vehicle::MovementSettings;
use crate::tracking::{default_direction_buckets, DirectionBucket};

const DEFAULT_CLASS_TO_TRACK: &str = "person";
const DEFAULT_DETECTED_COUNT: u32 = 4;
const DEFAULT_GONE_SECONDS: f64 = 3.0;
const DEFAULT_MATCH_CONFIDENCE: f32 = 0.4;
const DEFAULT_FRAME_RATE: u32 = 30;
const DEFAULT_VIDEO_MAX_SECONDS: f64 = 30.0;
const DEFAULT_OUTPUT_DIRECTORY: &str = "output";
const DEFAULT_MODEL_NAME: &str = "unknown";
const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";
const DEFAULT_MIN_INSTANCES: u32 = 2;
const DEFAULT_DETER_DELAY_SECS: f64 = 8.0;
const DEFAULT_DETER_RATE_LIMIT_SECS: f64 = 60.0;
const DEFAULT_WATERING_DURATION_SECS: u32 = 10;
const DEFAULT_NOTIFY_COOLDOWN_SECS: u64 = 300;
const DEFAULT_VEHICLE_CLASS: &str = "truck";
const DEFAULT_VEHICLE_MIN_AREA: f64 = 15.0;
const DEFAULT_VEHICLE_MOVEMENT_PCT: f64 = 20.0;
const DEFAULT_VEHICLE_DETECTION_FRAMES: u32 = 3;
const DEFAULT_VEHICLE_VIDEO_MAX_SECONDS: f64 = 10.0;
const DEFAULT_VEHICLE_ALERT_COOLDOWN_SECS: f64 = 10.0;
const DEFAULT_VEHICLE_IMAGE_COOLDOWN_SECS: f64 = 2.0;
const DEFAULT_LATITUDE: f64 = 51.5;
const DEFAULT_LONGITUDE: f64 = -0.116;
const DEFAULT_DAYLIGHT_MARGIN_MINUTES: f64 = 30.0;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct WatcherConfigFile {
    class_to_track: Option<String>,
    class_detected_count: Option<u32>,
    class_gone_seconds: Option<f64>,
    class_match_confidence: Option<f32>,
    frame_rate: Option<u32>,
    video_max_seconds: Option<f64>,
    save_detection_images: Option<bool>,
    save_detection_video: Option<bool>,
    output_directory: Option<PathBuf>,
    model_name: Option<String>,
    class_mask_path: Option<PathBuf>,
    secondary_classes: Option<Vec<String>>,
    announce_on_start: Option<bool>,
    announce_command: Option<String>,
    ffmpeg_path: Option<PathBuf>,
    directional: Option<DirectionalConfigFile>,
    abort: Option<AbortConfigFile>,
    deterrent: Option<DeterrentConfigFile>,
    notify: Option<NotifyConfigFile>,
    secondary_tracking: Option<SecondaryTrackingConfigFile>,
    daytime_only: Option<bool>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    daylight_margin_minutes: Option<f64>,
    utc_offset_hours: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct DirectionalConfigFile {
    label_prefix: Option<String>,
    min_instances: Option<u32>,
    buckets: Option<Vec<BucketConfigFile>>,
    announce_label: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct BucketConfigFile {
    name: String,
    from: u32,
    to: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct AbortConfigFile {
    class: Option<String>,
    min_visible_seconds: f64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct DeterrentConfigFile {
    enabled: Option<bool>,
    delay_seconds: Option<f64>,
    rate_limit_seconds: Option<f64>,
    watering_duration_sec: Option<u32>,
    linktap_username: Option<String>,
    linktap_api_key: Option<String>,
    linktap_gateway_id: Option<String>,
    linktap_taplinker_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct NotifyConfigFile {
    dwell_seconds: Option<f64>,
    cooldown_seconds: Option<u64>,
    pushsafer_key: Option<String>,
    pushsafer_device: Option<String>,
    notify_vehicles: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct SecondaryTrackingConfigFile {
    class: Option<String>,
    min_confidence: Option<f32>,
    min_area_percentage: Option<f64>,
    movement_threshold_percent: Option<f64>,
    detection_frames: Option<u32>,
    video_max_seconds: Option<f64>,
    alert_cooldown_seconds: Option<f64>,
    image_cooldown_seconds: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub class_to_track: String,
    /// Consecutive qualifying frames that start a session.
    pub detect_threshold: u32,
    pub gone_seconds: f64,
    pub match_confidence: f32,
    pub frame_rate: u32,
    pub video_max_seconds: f64,
    pub save_images: bool,
    pub save_video: bool,
    pub output_directory: PathBuf,
    pub model_name: String,
    pub mask_path: Option<PathBuf>,
    pub secondary_classes: Vec<String>,
    pub announce_on_start: bool,
    pub announce_command: Option<String>,
    pub ffmpeg_path: PathBuf,
    pub directional: Option<DirectionalSettings>,
    pub abort: Option<AbortSettings>,
    pub deterrent: Option<DeterrentSettings>,
    pub notify: Option<NotifySettings>,
    pub secondary_tracking: Option<SecondaryTrackingSettings>,
    /// Skip frames captured outside the daylight active period.
    pub daytime_only: bool,
    pub daylight: DaylightSettings,
}

#[derive(Debug, Clone)]
pub struct DaylightSettings {
    pub latitude: f64,
    /// Positive east.
    pub longitude: f64,
    pub margin_minutes: f64,
    /// Offset of frame timestamps from UTC. The host time zone when unset.
    pub utc_offset_hours: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DirectionalSettings {
    pub label_prefix: String,
    pub min_instances: u32,
    pub buckets: Vec<DirectionBucket>,
    pub announce_label: bool,
}

#[derive(Debug, Clone)]
pub struct AbortSettings {
    /// Class whose presence share measures visibility.
    pub class: String,
    pub min_visible_seconds: f64,
}

#[derive(Debug, Clone)]
pub struct DeterrentSettings {
    pub delay_seconds: f64,
    pub rate_limit_seconds: f64,
    pub duration_secs: u32,
    pub linktap: Option<LinkTapSettings>,
}

#[derive(Debug, Clone)]
pub struct LinkTapSettings {
    pub username: String,
    pub api_key: String,
    pub gateway_id: String,
    pub taplinker_id: String,
}

#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub dwell_seconds: Option<f64>,
    pub cooldown_seconds: u64,
    pub pushsafer_key: Option<String>,
    pub pushsafer_device: Option<String>,
    pub notify_vehicles: bool,
}

#[derive(Debug, Clone)]
pub struct SecondaryTrackingSettings {
    pub class: String,
    pub min_confidence: f32,
    pub min_area_percentage: f64,
    pub movement_threshold_percent: f64,
    pub detection_frames: u32,
    pub video_max_seconds: f64,
    pub alert_cooldown_seconds: f64,
    pub image_cooldown_seconds: f64,
}

impl SecondaryTrackingSettings {
    /// Tracker settings with cooldowns converted to frames.
    pub fn movement_settings(&self, frame_rate: u32) -> MovementSettings {
        let frames = |seconds: f64| (seconds * f64::from(frame_rate)).round().max(0.0) as u32;
        MovementSettings {
            class: self.class.clone(),
            min_confidence: self.min_confidence,
            min_area_percentage: self.min_area_percentage,
            movement_threshold_percent: self.movement_threshold_percent,
            detection_frames: self.detection_frames,
            alert_cooldown_frames: frames(self.alert_cooldown_seconds),
            image_cooldown_frames: frames(self.image_cooldown_seconds),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self::from_file(WatcherConfigFile::default())
    }
}

impl WatcherConfig {
    /// Load from the file named by `WATCHER_CONFIG_FILE` (if any), then
    /// apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WATCHER_CONFIG_FILE")
            .ok()
            .filter(|path| !path.trim().is_empty());
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: WatcherConfigFile) -> Self {
        let class_to_track = file
            .class_to_track
            .unwrap_or_else(|| DEFAULT_CLASS_TO_TRACK.to_string());
        let match_confidence = file
            .class_match_confidence
            .unwrap_or(DEFAULT_MATCH_CONFIDENCE);

        let directional = file.directional.map(|dir| DirectionalSettings {
            label_prefix: dir.label_prefix.unwrap_or_else(|| class_to_track.clone()),
            min_instances: dir.min_instances.unwrap_or(DEFAULT_MIN_INSTANCES),
            buckets: dir
                .buckets
                .map(|buckets| {
                    buckets
                        .into_iter()
                        .map(|b| DirectionBucket::new(b.name, b.from, b.to))
                        .collect()
                })
                .unwrap_or_else(default_direction_buckets),
            announce_label: dir.announce_label.unwrap_or(false),
        });

        let abort = file.abort.map(|abort| AbortSettings {
            class: abort.class.unwrap_or_else(|| class_to_track.clone()),
            min_visible_seconds: abort.min_visible_seconds,
        });

        let deterrent = file
            .deterrent
            .filter(|det| det.enabled.unwrap_or(true))
            .map(|det| {
                let linktap = match (
                    det.linktap_username,
                    det.linktap_api_key,
                    det.linktap_gateway_id,
                    det.linktap_taplinker_id,
                ) {
                    (Some(username), Some(api_key), Some(gateway_id), Some(taplinker_id)) => {
                        Some(LinkTapSettings {
                            username,
                            api_key,
                            gateway_id,
                            taplinker_id,
                        })
                    }
                    _ => None,
                };
                DeterrentSettings {
                    delay_seconds: det.delay_seconds.unwrap_or(DEFAULT_DETER_DELAY_SECS),
                    rate_limit_seconds: det
                        .rate_limit_seconds
                        .unwrap_or(DEFAULT_DETER_RATE_LIMIT_SECS),
                    duration_secs: det
                        .watering_duration_sec
                        .unwrap_or(DEFAULT_WATERING_DURATION_SECS),
                    linktap,
                }
            });

        let notify = file.notify.map(|notify| NotifySettings {
            dwell_seconds: notify.dwell_seconds,
            cooldown_seconds: notify
                .cooldown_seconds
                .unwrap_or(DEFAULT_NOTIFY_COOLDOWN_SECS),
            pushsafer_key: notify.pushsafer_key.filter(|key| !key.trim().is_empty()),
            pushsafer_device: notify.pushsafer_device.filter(|dev| !dev.trim().is_empty()),
            notify_vehicles: notify.notify_vehicles.unwrap_or(true),
        });

        let secondary_tracking = file
            .secondary_tracking
            .map(|sec| SecondaryTrackingSettings {
                class: sec
                    .class
                    .unwrap_or_else(|| DEFAULT_VEHICLE_CLASS.to_string()),
                min_confidence: sec.min_confidence.unwrap_or(match_confidence),
                min_area_percentage: sec.min_area_percentage.unwrap_or(DEFAULT_VEHICLE_MIN_AREA),
                movement_threshold_percent: sec
                    .movement_threshold_percent
                    .unwrap_or(DEFAULT_VEHICLE_MOVEMENT_PCT),
                detection_frames: sec
                    .detection_frames
                    .unwrap_or(DEFAULT_VEHICLE_DETECTION_FRAMES),
                video_max_seconds: sec
                    .video_max_seconds
                    .unwrap_or(DEFAULT_VEHICLE_VIDEO_MAX_SECONDS),
                alert_cooldown_seconds: sec
                    .alert_cooldown_seconds
                    .unwrap_or(DEFAULT_VEHICLE_ALERT_COOLDOWN_SECS),
                image_cooldown_seconds: sec
                    .image_cooldown_seconds
                    .unwrap_or(DEFAULT_VEHICLE_IMAGE_COOLDOWN_SECS),
            });

        Self {
            class_to_track,
            detect_threshold: file.class_detected_count.unwrap_or(DEFAULT_DETECTED_COUNT),
            gone_seconds: file.class_gone_seconds.unwrap_or(DEFAULT_GONE_SECONDS),
            match_confidence,
            frame_rate: file.frame_rate.unwrap_or(DEFAULT_FRAME_RATE),
            video_max_seconds: file.video_max_seconds.unwrap_or(DEFAULT_VIDEO_MAX_SECONDS),
            save_images: file.save_detection_images.unwrap_or(true),
            save_video: file.save_detection_video.unwrap_or(true),
            output_directory: file
                .output_directory
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIRECTORY)),
            model_name: file
                .model_name
                .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
            mask_path: file.class_mask_path,
            secondary_classes: file.secondary_classes.unwrap_or_default(),
            announce_on_start: file.announce_on_start.unwrap_or(false),
            announce_command: file
                .announce_command
                .filter(|cmd| !cmd.trim().is_empty()),
            ffmpeg_path: file
                .ffmpeg_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FFMPEG_PATH)),
            directional,
            abort,
            deterrent,
            notify,
            secondary_tracking,
            daytime_only: file.daytime_only.unwrap_or(false),
            daylight: DaylightSettings {
                latitude: file.latitude.unwrap_or(DEFAULT_LATITUDE),
                longitude: file.longitude.unwrap_or(DEFAULT_LONGITUDE),
                margin_minutes: file
                    .daylight_margin_minutes
                    .unwrap_or(DEFAULT_DAYLIGHT_MARGIN_MINUTES),
                utc_offset_hours: file.utc_offset_hours,
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("WATCHER_OUTPUT_DIRECTORY") {
            if !dir.trim().is_empty() {
                self.output_directory = PathBuf::from(dir);
            }
        }
        if let Ok(class) = std::env::var("WATCHER_CLASS_TO_TRACK") {
            if !class.trim().is_empty() {
                self.class_to_track = class.trim().to_string();
            }
        }
        if let Ok(classes) = std::env::var("WATCHER_SECONDARY_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.secondary_classes = parsed;
            }
        }
        if let Ok(rate) = std::env::var("WATCHER_FRAME_RATE") {
            self.frame_rate = rate
                .trim()
                .parse()
                .map_err(|_| anyhow!("WATCHER_FRAME_RATE must be an integer frame rate"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.frame_rate == 0 {
            return Err(anyhow!("FRAME_RATE must be greater than zero"));
        }
        if self.detect_threshold == 0 {
            return Err(anyhow!("CLASS_DETECTED_COUNT must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.match_confidence) {
            return Err(anyhow!("CLASS_MATCH_CONFIDENCE must be within [0, 1]"));
        }
        non_negative_seconds("CLASS_GONE_SECONDS", self.gone_seconds)?;
        positive_seconds("VIDEO_MAX_SECONDS", self.video_max_seconds)?;
        validate_class_label(&self.class_to_track)?;
        for class in &self.secondary_classes {
            validate_class_label(class)?;
        }
        if let Some(directional) = &self.directional {
            for bucket in &directional.buckets {
                if bucket.from >= bucket.to || bucket.to > 360 {
                    return Err(anyhow!(
                        "direction bucket {} must satisfy 0 <= FROM < TO <= 360",
                        bucket.name
                    ));
                }
            }
        }
        if let Some(abort) = &self.abort {
            validate_class_label(&abort.class)?;
            non_negative_seconds("ABORT.MIN_VISIBLE_SECONDS", abort.min_visible_seconds)?;
        }
        if let Some(deterrent) = &self.deterrent {
            non_negative_seconds("DETERRENT.DELAY_SECONDS", deterrent.delay_seconds)?;
            non_negative_seconds("DETERRENT.RATE_LIMIT_SECONDS", deterrent.rate_limit_seconds)?;
        }
        if let Some(dwell) = self.notify.as_ref().and_then(|n| n.dwell_seconds) {
            non_negative_seconds("NOTIFY.DWELL_SECONDS", dwell)?;
        }
        let daylight = &self.daylight;
        if !(daylight.latitude.is_finite() && (-90.0..=90.0).contains(&daylight.latitude)) {
            return Err(anyhow!("LATITUDE must be within [-90, 90]"));
        }
        if !(daylight.longitude.is_finite() && (-180.0..=180.0).contains(&daylight.longitude)) {
            return Err(anyhow!("LONGITUDE must be within [-180, 180]"));
        }
        non_negative_seconds("DAYLIGHT_MARGIN_MINUTES", daylight.margin_minutes)?;
        if let Some(offset) = daylight.utc_offset_hours {
            if !(offset.is_finite() && (-14.0..=14.0).contains(&offset)) {
                return Err(anyhow!("UTC_OFFSET_HOURS must be within [-14, 14]"));
            }
        }
        if let Some(sec) = &self.secondary_tracking {
            validate_class_label(&sec.class)?;
            let pct = 0.0..=100.0;
            if !pct.contains(&sec.min_area_percentage)
                || sec.min_area_percentage <= 0.0
                || !pct.contains(&sec.movement_threshold_percent)
                || sec.movement_threshold_percent <= 0.0
            {
                return Err(anyhow!(
                    "SECONDARY_TRACKING percentages must be within (0, 100]"
                ));
            }
            if sec.detection_frames == 0 {
                return Err(anyhow!("SECONDARY_TRACKING.DETECTION_FRAMES must be at least 1"));
            }
            positive_seconds("SECONDARY_TRACKING.VIDEO_MAX_SECONDS", sec.video_max_seconds)?;
            non_negative_seconds(
                "SECONDARY_TRACKING.ALERT_COOLDOWN_SECONDS",
                sec.alert_cooldown_seconds,
            )?;
            non_negative_seconds(
                "SECONDARY_TRACKING.IMAGE_COOLDOWN_SECONDS",
                sec.image_cooldown_seconds,
            )?;
        }
        Ok(())
    }

    /// Classes whose presence is counted during a session.
    pub fn monitored_classes(&self) -> Vec<String> {
        let mut classes = self.secondary_classes.clone();
        if let Some(abort) = &self.abort {
            if !classes.contains(&abort.class) {
                classes.push(abort.class.clone());
            }
        }
        classes
    }
}

/// Class labels end up in file names, so only a small alphabet is allowed.
pub fn validate_class_label(label: &str) -> Result<()> {
    static CLASS_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = CLASS_RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());
    if !re.is_match(label) {
        return Err(anyhow!(
            "class label {:?} must match ^[A-Za-z0-9_-]{{1,64}}$",
            label
        ));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<WatcherConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

// NaN fails both comparisons, so each check is written as a negated accept.
fn positive_seconds(key: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        return Err(anyhow!("{} must be a finite number greater than zero", key));
    }
    Ok(())
}

fn non_negative_seconds(key: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value >= 0.0) {
        return Err(anyhow!("{} must be a finite number, zero or more", key));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = WatcherConfig::default();
        assert_eq!(cfg.class_to_track, "person");
        assert_eq!(cfg.detect_threshold, 4);
        assert_eq!(cfg.frame_rate, 30);
        assert!(cfg.save_video && cfg.save_images);
        assert!(cfg.directional.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn directional_section_defaults_prefix_to_class() {
        let file: WatcherConfigFile =
            serde_json::from_str(r#"{"CLASS_TO_TRACK": "dog", "DIRECTIONAL": {}}"#).unwrap();
        let cfg = WatcherConfig::from_file(file);
        let dir = cfg.directional.unwrap();
        assert_eq!(dir.label_prefix, "dog");
        assert_eq!(dir.min_instances, 2);
        assert_eq!(dir.buckets, default_direction_buckets());
    }

    #[test]
    fn disabled_deterrent_is_dropped() {
        let file: WatcherConfigFile =
            serde_json::from_str(r#"{"DETERRENT": {"ENABLED": false}}"#).unwrap();
        assert!(WatcherConfig::from_file(file).deterrent.is_none());
    }

    #[test]
    fn monitored_classes_include_abort_class() {
        let file: WatcherConfigFile = serde_json::from_str(
            r#"{"SECONDARY_CLASSES": ["cat"], "ABORT": {"CLASS": "bird", "MIN_VISIBLE_SECONDS": 2}}"#,
        )
        .unwrap();
        let cfg = WatcherConfig::from_file(file);
        assert_eq!(cfg.monitored_classes(), vec!["cat".to_string(), "bird".to_string()]);
    }

    #[test]
    fn cooldowns_convert_to_frames() {
        let file: WatcherConfigFile =
            serde_json::from_str(r#"{"SECONDARY_TRACKING": {}}"#).unwrap();
        let cfg = WatcherConfig::from_file(file);
        let movement = cfg.secondary_tracking.unwrap().movement_settings(30);
        assert_eq!(movement.class, "truck");
        assert_eq!(movement.alert_cooldown_frames, 300);
        assert_eq!(movement.image_cooldown_frames, 60);
    }

    #[test]
    fn class_labels_are_restricted() {
        assert!(validate_class_label("teddy_bear").is_ok());
        assert!(validate_class_label("../etc").is_err());
        assert!(validate_class_label("").is_err());
    }

    #[test]
    fn non_finite_seconds_are_rejected() {
        for value in [f64::NAN, f64::INFINITY] {
            let mut cfg = WatcherConfig::default();
            cfg.video_max_seconds = value;
            assert!(cfg.validate().is_err(), "video max {}", value);

            let mut cfg = WatcherConfig::default();
            cfg.gone_seconds = value;
            assert!(cfg.validate().is_err(), "gone {}", value);

            let mut cfg = WatcherConfig::default();
            cfg.deterrent = Some(DeterrentSettings {
                delay_seconds: value,
                rate_limit_seconds: 60.0,
                duration_secs: 5,
                linktap: None,
            });
            assert!(cfg.validate().is_err(), "deterrent delay {}", value);

            let mut cfg = WatcherConfig::default();
            cfg.notify = Some(NotifySettings {
                dwell_seconds: Some(value),
                cooldown_seconds: 300,
                pushsafer_key: None,
                pushsafer_device: None,
                notify_vehicles: false,
            });
            assert!(cfg.validate().is_err(), "dwell {}", value);
        }
    }

    #[test]
    fn daylight_keys_are_read_and_checked() {
        let file: WatcherConfigFile = serde_json::from_str(
            r#"{"DAYTIME_ONLY": true, "LATITUDE": 53.4, "LONGITUDE": -2.2, "UTC_OFFSET_HOURS": 1}"#,
        )
        .unwrap();
        let cfg = WatcherConfig::from_file(file);
        assert!(cfg.daytime_only);
        assert_eq!(cfg.daylight.latitude, 53.4);
        assert_eq!(cfg.daylight.margin_minutes, 30.0);
        assert_eq!(cfg.daylight.utc_offset_hours, Some(1.0));
        assert!(cfg.validate().is_ok());

        let mut cfg = WatcherConfig::default();
        assert!(!cfg.daytime_only);
        cfg.daylight.latitude = 91.0;
        assert!(cfg.validate().is_err());
        cfg.daylight.latitude = 51.5;
        cfg.daylight.margin_minutes = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_video_max_is_rejected_but_zero_gone_is_not() {
        let mut cfg = WatcherConfig::default();
        cfg.gone_seconds = 0.0;
        assert!(cfg.validate().is_ok());
        cfg.video_max_seconds = 0.0;
        assert!(cfg.validate().is_err());
    }
}
