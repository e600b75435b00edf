// ABOUTME: Generator configuration
// ABOUTME: Command line flags, key=value config file, defaults, and their precedence-ordered merge

use crate::audio::{OutputLevel, DEFAULT_DEVICE};
use crate::error::Error;
use crate::sync::{SlewPolicy, SyncSchedule};
use crate::timecode::rates::{default_rate, lookup};
use crate::timecode::{CivilZone, FrameRateSpec, TimecodeClock};
use clap::Parser;
use std::path::{Path, PathBuf};
use typed_builder::TypedBuilder;

pub const DEFAULT_CONFIG_FILE: &str = "/etc/ltc-clock.conf";
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_SLEW_PERIOD_SECS: u64 = 30;

/// Validated settings, fixed before the generator starts.
#[derive(Debug, Clone, TypedBuilder)]
pub struct GeneratorConfig {
    #[builder(default = DEFAULT_DEVICE.to_string(), setter(into))]
    pub device: String,
    #[builder(default = default_rate())]
    pub frame_rate: &'static FrameRateSpec,
    #[builder(default)]
    pub ntp_server: Option<String>,
    #[builder(default = DEFAULT_SYNC_INTERVAL_SECS)]
    pub sync_interval_secs: u64,
    #[builder(default = DEFAULT_SLEW_PERIOD_SECS)]
    pub slew_period_secs: u64,
    #[builder(default)]
    pub cpu_core: Option<usize>,
    #[builder(default = false)]
    pub quiet: bool,
    #[builder(default)]
    pub level: OutputLevel,
    #[builder(default)]
    pub zone: CivilZone,
    #[builder(default = true)]
    pub lock_memory: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl GeneratorConfig {
    /// Merge command line over config file over defaults.
    pub fn resolve(cli: &CliArgs, file: Option<&FileSettings>) -> Self {
        let empty = FileSettings::default();
        let file = file.unwrap_or(&empty);

        let zone = if cli.utc {
            CivilZone::Utc
        } else {
            file.zone.unwrap_or_default()
        };

        GeneratorConfig::builder()
            .device(
                cli.device
                    .clone()
                    .or_else(|| file.device.clone())
                    .unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            )
            .frame_rate(cli.frame_rate.or(file.frame_rate).unwrap_or_else(default_rate))
            .ntp_server(cli.ntp_server.clone().or_else(|| file.ntp_server.clone()))
            .sync_interval_secs(
                cli.ntp_sync_interval
                    .or(file.sync_interval_secs)
                    .unwrap_or(DEFAULT_SYNC_INTERVAL_SECS),
            )
            .slew_period_secs(
                cli.ntp_slew_period
                    .or(file.slew_period_secs)
                    .unwrap_or(DEFAULT_SLEW_PERIOD_SECS),
            )
            .cpu_core(cli.cpu_core.or(file.cpu_core))
            .quiet(cli.quiet || file.quiet.unwrap_or(false))
            .level(cli.level.or(file.level).unwrap_or_default())
            .zone(zone)
            .lock_memory(!cli.no_mlock && file.lock_memory.unwrap_or(true))
            .build()
    }

    /// Clock engine for the configured rate and zone.
    pub fn clock(&self) -> TimecodeClock {
        TimecodeClock::new(self.frame_rate).with_zone(self.zone)
    }

    pub fn slew_policy(&self) -> SlewPolicy {
        SlewPolicy::new(self.slew_period_secs, self.frame_rate.fps)
    }

    pub fn sync_schedule(&self) -> SyncSchedule {
        SyncSchedule::every_secs(self.sync_interval_secs)
    }
}

/// Command line of the `ltc-clock` binary.
#[derive(Parser, Debug, Default)]
#[command(name = "ltc-clock", version, about = "Wall-clock synchronized LTC generator")]
pub struct CliArgs {
    /// Suppress the console timecode display
    #[arg(short, long)]
    pub quiet: bool,

    /// Output device name ("default" for the host default)
    #[arg(short, long)]
    pub device: Option<String>,

    /// Config file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Discipline the clock to this NTP server
    #[arg(long)]
    pub ntp_server: Option<String>,

    /// Seconds between NTP syncs
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub ntp_sync_interval: Option<u64>,

    /// Seconds over which an offset change is slewed in
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub ntp_slew_period: Option<u64>,

    /// Pin the process to this CPU core
    #[arg(long)]
    pub cpu_core: Option<usize>,

    /// Output level in dBFS (0 = full scale)
    #[arg(long, allow_negative_numbers = true, value_parser = parse_level)]
    pub level: Option<OutputLevel>,

    /// Derive the date and time of day from UTC instead of local time
    #[arg(long)]
    pub utc: bool,

    /// Do not lock process memory
    #[arg(long)]
    pub no_mlock: bool,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Frame rate: 24, 25, 29.97, 30, 29.97df, 30df
    #[arg(value_parser = lookup)]
    pub frame_rate: Option<&'static FrameRateSpec>,
}

fn parse_level(value: &str) -> Result<OutputLevel, Error> {
    let dbfs: f64 = value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("invalid level '{}'", value)))?;
    OutputLevel::from_dbfs(dbfs)
}

/// Values read from a config file. Unset keys stay `None`.
#[derive(Debug, Clone, Default)]
pub struct FileSettings {
    pub device: Option<String>,
    pub frame_rate: Option<&'static FrameRateSpec>,
    pub ntp_server: Option<String>,
    pub sync_interval_secs: Option<u64>,
    pub slew_period_secs: Option<u64>,
    pub cpu_core: Option<usize>,
    pub quiet: Option<bool>,
    pub level: Option<OutputLevel>,
    pub zone: Option<CivilZone>,
    pub lock_memory: Option<bool>,
    /// Problems found while parsing, one line each.
    pub warnings: Vec<String>,
}

impl FileSettings {
    /// Read `path`. A missing file yields `None`.
    pub fn load(path: &Path) -> Result<Option<Self>, Error> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let settings = Self::parse(&text);
        for warning in &settings.warnings {
            log::warn!("{}: {}", path.display(), warning);
        }
        Ok(Some(settings))
    }

    /// Parse `key=value` lines; `#` starts a comment.
    pub fn parse(text: &str) -> Self {
        let mut settings = Self::default();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                settings
                    .warnings
                    .push(format!("line {}: expected key=value", index + 1));
                continue;
            };
            settings.apply(key.trim(), value.trim());
        }
        settings
    }

    fn apply(&mut self, key: &str, value: &str) {
        match key {
            "device" => self.device = non_empty(value),
            "framerate" => match lookup(value) {
                Ok(rate) => self.frame_rate = Some(rate),
                Err(e) => self.warnings.push(format!("{}, keeping the default", e)),
            },
            "ntp-server" => self.ntp_server = non_empty(value),
            "ntp-sync-interval" => {
                self.sync_interval_secs =
                    Some(self.positive_or(key, value, DEFAULT_SYNC_INTERVAL_SECS))
            }
            "ntp-slew-period" => {
                self.slew_period_secs = Some(self.positive_or(key, value, DEFAULT_SLEW_PERIOD_SECS))
            }
            "cpu-core" => match value.parse() {
                Ok(core) => self.cpu_core = Some(core),
                Err(_) => self.warnings.push(format!("invalid cpu-core '{}'", value)),
            },
            "quiet" => self.quiet = self.flag(key, value),
            "lock-memory" => self.lock_memory = self.flag(key, value),
            "level" => match parse_level(value) {
                Ok(level) => self.level = Some(level),
                Err(e) => self.warnings.push(e.to_string()),
            },
            "timezone" => match CivilZone::parse(value) {
                Some(zone) => self.zone = Some(zone),
                None => self
                    .warnings
                    .push(format!("invalid timezone '{}' (expected local or utc)", value)),
            },
            _ => self.warnings.push(format!("unknown key '{}'", key)),
        }
    }

    fn positive_or(&mut self, key: &str, value: &str, fallback: u64) -> u64 {
        match value.parse::<i64>() {
            Ok(secs) if secs >= 1 => secs as u64,
            _ => {
                self.warnings
                    .push(format!("invalid {} '{}', using {}", key, value, fallback));
                fallback
            }
        }
    }

    fn flag(&mut self, key: &str, value: &str) -> Option<bool> {
        match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                self.warnings.push(format!("invalid {} '{}'", key, value));
                None
            }
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
