use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::fs;
use thiserror::Error;

use crate::constants;
use crate::stage::Pace;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Top-level app configuration. All fields optional so YAML and CLI can be
/// layered; resolve() applies the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub log_level: Option<String>,
    /// Player name to attach to; "-" means first connected player.
    pub player: Option<String>,
    /// "host" or "host:port" to skip discovery.
    pub server: Option<String>,
    /// TTF to rasterize title lines with.
    pub font: Option<PathBuf>,
    pub poll_ms: Option<u64>,
    pub display: Option<DisplayConfig>,
    pub motion: Option<MotionConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DisplayConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub windowed: Option<bool>,
    pub frame_rate: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MotionConfig {
    pub entry_speed: Option<i32>,
    pub exit_speed: Option<i32>,
    pub loop_step: Option<i32>,
    pub scroll_divisor: Option<u64>,
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone)]
#[command(name = "LyMarq", about = "LyMarq now playing display", disable_help_flag = false)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Player name, "-" for the first connected player
    #[arg(long)]
    pub player: Option<String>,
    /// Server "host" or "host:port"; skips discovery
    #[arg(long)]
    pub server: Option<String>,
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub font: Option<PathBuf>,
    #[arg(long)]
    pub poll_ms: Option<u64>,
    #[arg(long)]
    pub width: Option<u32>,
    #[arg(long)]
    pub height: Option<u32>,
    /// Run in a window instead of borderless fullscreen
    #[arg(long, action = ArgAction::SetTrue)]
    pub windowed: bool,
    #[arg(long)]
    pub frame_rate: Option<u32>,
    #[arg(long)]
    pub scroll_divisor: Option<u64>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Fully resolved, validated settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub log_level: String,
    pub player: String,
    pub server: Option<(String, u16)>,
    pub font: PathBuf,
    pub poll_interval: Duration,
    pub width: u32,
    pub height: u32,
    pub windowed: bool,
    pub frame_rate: u32,
    pub pace: Pace,
}

const DEFAULT_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf";

/// Public entry point: parse CLI, read YAML, merge, validate, resolve.
pub fn load() -> Result<Settings, ConfigError> {
    let cli = Cli::parse();

    // 1) defaults (from Default impl)
    let mut cfg = Config::default();

    // 2) YAML file (explicit path or search)
    if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            let y = read_yaml(p)?;
            merge(&mut cfg, y);
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        let y = read_yaml(&p)?;
        merge(&mut cfg, y);
    }

    // 3) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, &cli);

    // 4) Validate
    validate(&cfg)?;

    if cli.dump_config {
        let s = serde_yaml::to_string(&cfg)?;
        println!("{s}");
        std::process::exit(0);
    }

    resolve(&cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/lymarq/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/lymarq/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/lymarq.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["lymarq.yaml", "config.yaml", "config/lymarq.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&s)?;
    Ok(cfg)
}

/// Shallow merge src into dst, Option-by-Option.
fn merge(dst: &mut Config, src: Config) {
    if src.log_level.is_some() { dst.log_level = src.log_level; }
    if src.player.is_some()    { dst.player = src.player; }
    if src.server.is_some()    { dst.server = src.server; }
    if src.font.is_some()      { dst.font = src.font; }
    if src.poll_ms.is_some()   { dst.poll_ms = src.poll_ms; }
    match (&mut dst.display, src.display) {
        (None, Some(c)) => dst.display = Some(c),
        (Some(d), Some(s)) => merge_display(d, s),
        _ => {}
    }
    match (&mut dst.motion, src.motion) {
        (None, Some(c)) => dst.motion = Some(c),
        (Some(d), Some(s)) => merge_motion(d, s),
        _ => {}
    }
}

fn merge_display(dst: &mut DisplayConfig, src: DisplayConfig) {
    if src.width.is_some()      { dst.width = src.width; }
    if src.height.is_some()     { dst.height = src.height; }
    if src.windowed.is_some()   { dst.windowed = src.windowed; }
    if src.frame_rate.is_some() { dst.frame_rate = src.frame_rate; }
}

fn merge_motion(dst: &mut MotionConfig, src: MotionConfig) {
    if src.entry_speed.is_some()    { dst.entry_speed = src.entry_speed; }
    if src.exit_speed.is_some()     { dst.exit_speed = src.exit_speed; }
    if src.loop_step.is_some()      { dst.loop_step = src.loop_step; }
    if src.scroll_divisor.is_some() { dst.scroll_divisor = src.scroll_divisor; }
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if cli.log_level.is_some() { cfg.log_level = cli.log_level.clone(); }
    if cli.player.is_some()    { cfg.player = cli.player.clone(); }
    if cli.server.is_some()    { cfg.server = cli.server.clone(); }
    if cli.font.is_some()      { cfg.font = cli.font.clone(); }
    if cli.poll_ms.is_some()   { cfg.poll_ms = cli.poll_ms; }

    let any_display = cli.width.is_some()
        || cli.height.is_some()
        || cli.frame_rate.is_some()
        || cli.windowed;
    if any_display && cfg.display.is_none() {
        cfg.display = Some(DisplayConfig::default());
    }
    if let Some(display) = cfg.display.as_mut() {
        if cli.width.is_some()      { display.width = cli.width; }
        if cli.height.is_some()     { display.height = cli.height; }
        if cli.frame_rate.is_some() { display.frame_rate = cli.frame_rate; }
        if cli.windowed             { display.windowed = Some(true); }
    }

    if cli.scroll_divisor.is_some() {
        if cfg.motion.is_none() {
            cfg.motion = Some(MotionConfig::default());
        }
        if let Some(motion) = cfg.motion.as_mut() {
            motion.scroll_divisor = cli.scroll_divisor;
        }
    }
}

/// Put any invariants here (required fields, ranges, etc.)
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if let Some(display) = cfg.display.as_ref() {
        if let (Some(w), Some(h)) = (display.width, display.height) {
            if w == 0 || h == 0 {
                return Err(ConfigError::Validation("display width/height must be > 0".into()));
            }
        }
        if let Some(fps) = display.frame_rate {
            if fps == 0 || fps > 240 {
                return Err(ConfigError::Validation("frame_rate must be 1..=240".into()));
            }
        }
    }
    if let Some(motion) = cfg.motion.as_ref() {
        if motion.scroll_divisor == Some(0) {
            return Err(ConfigError::Validation("scroll_divisor must be >= 1".into()));
        }
        let entry = motion.entry_speed.unwrap_or(constants::ENTRY_SPEED);
        let exit = motion.exit_speed.unwrap_or(constants::EXIT_SPEED);
        if entry <= 0 || exit <= 0 {
            return Err(ConfigError::Validation("speeds must be positive".into()));
        }
        if entry >= exit {
            // retiring items must visibly clear faster than entering ones
            return Err(ConfigError::Validation("entry_speed must be < exit_speed".into()));
        }
    }
    if let Some(poll) = cfg.poll_ms {
        if poll < 100 {
            return Err(ConfigError::Validation("poll_ms must be >= 100".into()));
        }
    }
    Ok(())
}

fn resolve(cfg: &Config) -> Result<Settings, ConfigError> {
    let display = cfg.display.clone().unwrap_or_default();
    let motion = cfg.motion.clone().unwrap_or_default();

    let server = match cfg.server.as_deref() {
        None => None,
        Some(s) => Some(parse_server(s)?),
    };

    Ok(Settings {
        log_level: cfg.log_level.clone().unwrap_or_else(|| "info".to_string()),
        player: cfg.player.clone().unwrap_or_else(|| "-".to_string()),
        server,
        font: cfg.font.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_FONT)),
        poll_interval: Duration::from_millis(cfg.poll_ms.unwrap_or(constants::POLL_INTERVAL_MS)),
        width: display.width.unwrap_or(constants::VIEWPORT_WIDTH),
        height: display.height.unwrap_or(constants::VIEWPORT_HEIGHT),
        windowed: display.windowed.unwrap_or(false),
        frame_rate: display.frame_rate.unwrap_or(constants::FRAME_RATE),
        pace: Pace {
            entry_speed: motion.entry_speed.unwrap_or(constants::ENTRY_SPEED),
            exit_speed: motion.exit_speed.unwrap_or(constants::EXIT_SPEED),
            loop_step: motion.loop_step.unwrap_or(constants::LOOP_STEP),
            scroll_divisor: motion.scroll_divisor.unwrap_or(constants::SCROLL_DIVISOR),
        },
    })
}

fn parse_server(s: &str) -> Result<(String, u16), ConfigError> {
    match s.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                ConfigError::Validation(format!("bad server port in '{}'", s))
            })?;
            Ok((host.to_string(), port))
        }
        None => Ok((s.to_string(), 9000)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_layers_options() {
        let mut base = Config::default();
        merge(&mut base, Config {
            player: Some("Den".into()),
            display: Some(DisplayConfig { width: Some(800), ..Default::default() }),
            ..Default::default()
        });
        merge(&mut base, Config {
            display: Some(DisplayConfig { height: Some(480), ..Default::default() }),
            ..Default::default()
        });

        let d = base.display.unwrap();
        assert_eq!(d.width, Some(800));
        assert_eq!(d.height, Some(480));
        assert_eq!(base.player.as_deref(), Some("Den"));
    }

    #[test]
    fn test_validate_rejects_inverted_speeds() {
        let cfg = Config {
            motion: Some(MotionConfig {
                entry_speed: Some(30),
                exit_speed: Some(10),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_divisor() {
        let cfg = Config {
            motion: Some(MotionConfig {
                scroll_divisor: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn test_resolve_defaults() {
        let settings = resolve(&Config::default()).unwrap();
        assert_eq!(settings.width, constants::VIEWPORT_WIDTH);
        assert_eq!(settings.frame_rate, constants::FRAME_RATE);
        assert_eq!(settings.player, "-");
        assert!(settings.pace.entry_speed < settings.pace.exit_speed);
        assert!(settings.server.is_none());
    }

    #[test]
    fn test_parse_server() {
        assert_eq!(parse_server("10.0.0.2:9002").unwrap(), ("10.0.0.2".into(), 9002));
        assert_eq!(parse_server("lms.local").unwrap(), ("lms.local".into(), 9000));
        assert!(parse_server("lms.local:nope").is_err());
    }
}
